//! Producer engine: publishes a local tree as ResourceSync documents.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use digests::DigestKind;
use dump::{DumpKind, DumpWriter};
use mapper::Mapper;
use model::{Capability, Change, Link, Resource, ResourceContainer, compare};
use scan::ScanBuilder;
use sitemap::{Codec, DocumentKind, ListWriter};

use crate::error::ClientError;

/// Publishes resource lists, change lists, capability lists, source
/// descriptions, and dumps for one mapped tree.
pub struct Producer<'a> {
    mapper: &'a Mapper,
    max_sitemap_entries: Option<usize>,
    checksum: bool,
    pretty: bool,
}

impl<'a> Producer<'a> {
    /// Creates a producer over the given mapping.
    #[must_use]
    pub const fn new(mapper: &'a Mapper) -> Self {
        Self {
            mapper,
            max_sitemap_entries: Some(sitemap::DEFAULT_MAX_SITEMAP_ENTRIES),
            checksum: false,
            pretty: false,
        }
    }

    /// Overrides the per-sitemap entry cap; `None` disables splitting.
    #[must_use]
    pub const fn max_sitemap_entries(mut self, max: Option<usize>) -> Self {
        self.max_sitemap_entries = max;
        self
    }

    /// Computes MD5 digests for every scanned file.
    #[must_use]
    pub const fn checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Pretty-prints the published documents.
    #[must_use]
    pub const fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Scans the mapped tree into a resource list stamped with the scan
    /// time.
    ///
    /// # Errors
    ///
    /// Surfaces scan failures as [`ClientError`].
    pub fn build_resource_list(&self) -> Result<ResourceContainer, ClientError> {
        let mut builder = ScanBuilder::new(self.mapper);
        if self.checksum {
            builder = builder.digests(&[DigestKind::Md5]);
        }
        let mut list = builder.scan()?;
        list.md_mut().at = Some(now());
        Ok(list)
    }

    /// Scans and writes the resource list under `outfile`, splitting into
    /// components plus a sitemapindex when oversized. Returns the written
    /// paths, index last.
    ///
    /// # Errors
    ///
    /// Surfaces scan, mapping, and write failures as [`ClientError`].
    pub fn write_resource_list(&self, outfile: &Path) -> Result<Vec<PathBuf>, ClientError> {
        let list = self.build_resource_list()?;
        let writer = ListWriter::new()
            .codec(self.codec())
            .max_sitemap_entries(self.max_sitemap_entries)
            .allow_multifile(true)
            .mapper(self.mapper);
        let written = writer.write(&list, outfile)?;
        info!(entries = list.len(), files = written.len(), "published resource list");
        Ok(written)
    }

    /// Diffs a previously published resource list against the current tree
    /// into a change list covering `[previous.at, now]`.
    ///
    /// # Errors
    ///
    /// Surfaces scan and comparison failures as [`ClientError`].
    pub fn build_change_list(
        &self,
        previous: &ResourceContainer,
    ) -> Result<ResourceContainer, ClientError> {
        let current = self.build_resource_list()?;
        let partitions = compare(previous, &current, 0.0)?;

        let mut changes = ResourceContainer::new(Capability::ChangeList);
        changes.md_mut().from = previous.md().at;
        changes.md_mut().until = current.md().at;
        for resource in partitions.created.iter() {
            changes.add(resource.clone().with_change(Change::Created))?;
        }
        for resource in partitions.updated.iter() {
            changes.add(resource.clone().with_change(Change::Updated))?;
        }
        for resource in partitions.deleted.iter() {
            let mut deleted = resource.clone().with_change(Change::Deleted);
            deleted.set_path(None);
            changes.add(deleted)?;
        }
        Ok(changes)
    }

    /// Writes a capability list enumerating the given capability documents,
    /// optionally linking the source description that describes it.
    ///
    /// # Errors
    ///
    /// Surfaces write failures as [`ClientError`].
    pub fn write_capability_list(
        &self,
        entries: &[(Capability, String)],
        outfile: &Path,
        described_by: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut list = ResourceContainer::new(Capability::CapabilityList);
        if let Some(up) = described_by {
            list.add_ln(Link::new("up", up));
        }
        for (capability, uri) in entries {
            list.add_replace(
                Resource::new(uri.clone())?.with_capability(capability.as_str()),
            );
        }
        self.write_document(&list, outfile)?;
        info!(entries = list.len(), path = %outfile.display(), "published capability list");
        Ok(())
    }

    /// Writes the well-known source description pointing at the given
    /// capability lists.
    ///
    /// # Errors
    ///
    /// Surfaces write failures as [`ClientError`].
    pub fn write_source_description(
        &self,
        capability_lists: &[String],
        outfile: &Path,
    ) -> Result<(), ClientError> {
        let mut description = ResourceContainer::new(Capability::Description);
        for uri in capability_lists {
            description.add_replace(
                Resource::new(uri.clone())?.with_capability(Capability::CapabilityList.as_str()),
            );
        }
        self.write_document(&description, outfile)?;
        info!(path = %outfile.display(), "published source description");
        Ok(())
    }

    /// Scans the tree and packages its content as a resource dump. Returns
    /// the written archive paths.
    ///
    /// # Errors
    ///
    /// Surfaces scan and packaging failures as [`ClientError`].
    pub fn write_dump(&self, outfile: &Path) -> Result<Vec<PathBuf>, ClientError> {
        let list = self.build_resource_list()?;
        let written = DumpWriter::new(DumpKind::Resource).write(&list, outfile)?;
        info!(archives = written.len(), "published resource dump");
        Ok(written)
    }

    fn codec(&self) -> Codec {
        Codec::new().pretty(self.pretty)
    }

    fn write_document(
        &self,
        collection: &ResourceContainer,
        outfile: &Path,
    ) -> Result<(), ClientError> {
        let xml = self.codec().write(collection, DocumentKind::Sitemap)?;
        std::fs::write(outfile, xml).map_err(|source| ClientError::Io {
            path: outfile.to_path_buf(),
            source,
        })
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree(files: &[(&str, &[u8])]) -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("site");
        fs::create_dir_all(&root).expect("mkdir");
        for (name, content) in files {
            let path = root.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("mkdir");
            }
            fs::write(path, content).expect("write");
        }
        (temp, root)
    }

    #[test]
    fn resource_list_is_stamped_and_canonical() {
        let (_temp, root) = tree(&[("b.txt", b"b"), ("a.txt", b"a")]);
        let mapper = Mapper::from_pair("http://example.com", &root.display().to_string());
        let list = Producer::new(&mapper)
            .build_resource_list()
            .expect("build");
        assert!(list.md().at.is_some());
        let uris: Vec<&str> = list.iter().map(Resource::uri).collect();
        assert_eq!(
            uris,
            vec!["http://example.com/a.txt", "http://example.com/b.txt"]
        );
    }

    #[test]
    fn written_resource_list_parses_back() {
        let (temp, root) = tree(&[("a.txt", b"a")]);
        let mapper = Mapper::from_pair("http://example.com", &root.display().to_string());
        let outfile = temp.path().join("resourcelist.xml");
        let written = Producer::new(&mapper)
            .checksum(true)
            .write_resource_list(&outfile)
            .expect("write");
        assert_eq!(written, vec![outfile.clone()]);

        let xml = fs::read_to_string(&outfile).expect("read");
        let parsed = Codec::new()
            .parse_typed(&xml, Capability::ResourceList)
            .expect("parse");
        assert_eq!(parsed.len(), 1);
        assert!(parsed.iter().next().unwrap().md5().is_some());
    }

    #[test]
    fn change_list_reflects_tree_edits() {
        let (_temp, root) = tree(&[("keep.txt", b"same"), ("old.txt", b"old")]);
        let mapper = Mapper::from_pair("http://example.com", &root.display().to_string());
        let producer = Producer::new(&mapper);
        let mut before = producer.build_resource_list().expect("before");
        // Pin the window start so the change list's `from` is assertable.
        before.md_mut().at = Some(100.0);

        fs::write(root.join("new.txt"), b"new").expect("write");
        fs::write(root.join("old.txt"), b"changed!").expect("write");
        filetime::set_file_mtime(
            root.join("old.txt"),
            filetime::FileTime::from_unix_time(2_000_000_000, 0),
        )
        .expect("mtime");
        fs::remove_file(root.join("keep.txt")).expect("remove");

        let changes = producer.build_change_list(&before).expect("changes");
        assert_eq!(changes.capability(), Capability::ChangeList);
        assert_eq!(changes.md().from, Some(100.0));
        let summary: Vec<(String, Option<Change>)> = changes
            .iter()
            .map(|r| (r.uri().to_string(), r.change()))
            .collect();
        assert!(summary.contains(&(
            "http://example.com/new.txt".to_string(),
            Some(Change::Created)
        )));
        assert!(summary.contains(&(
            "http://example.com/old.txt".to_string(),
            Some(Change::Updated)
        )));
        assert!(summary.contains(&(
            "http://example.com/keep.txt".to_string(),
            Some(Change::Deleted)
        )));
    }

    #[test]
    fn capability_list_and_description_round_trip() {
        let (temp, root) = tree(&[]);
        let mapper = Mapper::from_pair("http://example.com", &root.display().to_string());
        let producer = Producer::new(&mapper);

        let capability_path = temp.path().join("capabilitylist.xml");
        producer
            .write_capability_list(
                &[
                    (
                        Capability::ResourceList,
                        "http://example.com/resourcelist.xml".to_string(),
                    ),
                    (
                        Capability::ChangeList,
                        "http://example.com/changelist.xml".to_string(),
                    ),
                ],
                &capability_path,
                Some("http://example.com/.well-known/resourcesync"),
            )
            .expect("capability list");
        let xml = fs::read_to_string(&capability_path).expect("read");
        let parsed = Codec::new()
            .parse_typed(&xml, Capability::CapabilityList)
            .expect("parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed
                .get("http://example.com/resourcelist.xml")
                .unwrap()
                .capability(),
            Some("resourcelist")
        );
        assert_eq!(parsed.ln()[0].rel(), "up");

        let description_path = temp.path().join("description.xml");
        producer
            .write_source_description(
                &["http://example.com/capabilitylist.xml".to_string()],
                &description_path,
            )
            .expect("description");
        let xml = fs::read_to_string(&description_path).expect("read");
        let parsed = Codec::new().parse(&xml, None).expect("parse").container;
        assert_eq!(parsed.md().capability.as_deref(), Some("description"));
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn dump_packages_scanned_content() {
        let (temp, root) = tree(&[("a.txt", b"payload")]);
        let mapper = Mapper::from_pair("http://example.com", &root.display().to_string());
        let outfile = temp.path().join("dump.zip");
        let written = Producer::new(&mapper).write_dump(&outfile).expect("dump");
        assert_eq!(written, vec![outfile.clone()]);
        let manifest = dump::DumpReader::new()
            .read_manifest(&outfile)
            .expect("manifest");
        assert_eq!(manifest.len(), 1);
    }
}
