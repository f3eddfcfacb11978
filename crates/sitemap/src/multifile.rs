//! Multi-file list engine: bounded sitemap components plus one sitemapindex.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::{debug, info};

use digests::DigestKind;
use fetch::{FetchError, Fetcher};
use mapper::{Mapper, MapperError};
use model::{Capability, ModelError, Resource, ResourceContainer};

use crate::authority::has_authority;
use crate::codec::{Codec, DocumentKind};
use crate::error::SitemapError;

/// Default cap on `<url>` entries per component sitemap.
pub const DEFAULT_MAX_SITEMAP_ENTRIES: usize = 50_000;

/// Errors produced by the multi-file list engine.
///
/// Policy violations (oversized output without permission, part numbers past
/// the computed count) are distinct from parse failures so callers can react
/// by enabling multi-file support rather than treating input as corrupt.
#[derive(Debug, Error)]
pub enum ListError {
    /// The collection needs multi-file output but it was not enabled.
    #[error(
        "collection of {len} entries exceeds {max} per sitemap ({parts} component files needed)"
    )]
    Oversized {
        /// Number of entries in the collection.
        len: usize,
        /// Configured per-sitemap entry cap.
        max: usize,
        /// Component files a multi-file write would produce.
        parts: usize,
    },
    /// A part number past the computed component count was requested.
    #[error("part {part} out of range: collection splits into {parts} parts")]
    PartOutOfRange {
        /// Requested part number.
        part: usize,
        /// Number of parts the collection splits into.
        parts: usize,
    },
    /// An index summary was requested for a collection with no URI to
    /// derive component names from.
    #[error("collection has no URI to derive component names from")]
    NoBasename,
    /// Multi-file translation needs a mapper and none was configured.
    #[error("no mapper configured to translate component locations")]
    NoMapper,
    /// A component location could not be translated between URI and path
    /// space.
    #[error(transparent)]
    Unmappable(#[from] MapperError),
    /// The strict-authority check rejected a component.
    #[error("index '{index_uri}' has no authority over component '{component_uri}'")]
    NotAuthorized {
        /// URI of the sitemapindex.
        index_uri: String,
        /// Rejected component URI.
        component_uri: String,
    },
    /// A component or index file could not be written or inspected.
    #[error("failed to write component '{path}': {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Codec failure on a component or index document.
    #[error(transparent)]
    Sitemap(#[from] SitemapError),
    /// Retrieval failure for a component or index document.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Model failure while merging component resources.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Writes collections as one sitemap or a component set plus sitemapindex.
#[derive(Clone, Copy, Debug)]
pub struct ListWriter<'a> {
    codec: Codec,
    max_entries: Option<usize>,
    allow_multifile: bool,
    mapper: Option<&'a Mapper>,
}

impl Default for ListWriter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ListWriter<'a> {
    /// Creates a writer with the default entry cap and multi-file output
    /// disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            codec: Codec::new(),
            max_entries: Some(DEFAULT_MAX_SITEMAP_ENTRIES),
            allow_multifile: false,
            mapper: None,
        }
    }

    /// Replaces the codec (for pretty output).
    #[must_use]
    pub const fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the per-sitemap entry cap; `None` disables splitting entirely.
    #[must_use]
    pub const fn max_sitemap_entries(mut self, max: Option<usize>) -> Self {
        self.max_entries = max;
        self
    }

    /// Permits multi-file output.
    #[must_use]
    pub const fn allow_multifile(mut self, allow: bool) -> Self {
        self.allow_multifile = allow;
        self
    }

    /// Configures the mapper used to translate component paths to URIs.
    #[must_use]
    pub const fn mapper(mut self, mapper: &'a Mapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Reports whether the collection needs multi-file output: `None` when
    /// it fits a single sitemap (or the cap is disabled), otherwise the
    /// exact number of component files needed.
    #[must_use]
    pub fn requires_multifile(&self, collection: &ResourceContainer) -> Option<usize> {
        let max = self.max_entries?;
        if max == 0 || collection.len() <= max {
            None
        } else {
            Some(collection.len().div_ceil(max))
        }
    }

    /// Computes the slice of the canonically ordered entry sequence that
    /// belongs to `part`, for generating one component on demand.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::PartOutOfRange`] past the computed count.
    pub fn part_range(&self, len: usize, part: usize) -> Result<Range<usize>, ListError> {
        let parts = match self.max_entries {
            Some(max) if max > 0 => len.div_ceil(max).max(1),
            _ => 1,
        };
        if part >= parts {
            return Err(ListError::PartOutOfRange { part, parts });
        }
        match self.max_entries {
            Some(max) if max > 0 => {
                let start = part * max;
                Ok(start..len.min(start + max))
            }
            _ => Ok(0..len),
        }
    }

    /// Serializes one component part without materializing the rest.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::PartOutOfRange`] past the computed count, or a
    /// codec error.
    pub fn part_xml(&self, collection: &ResourceContainer, part: usize) -> Result<String, ListError> {
        let range = self.part_range(collection.len(), part)?;
        let component = component_of(collection, range);
        Ok(self.codec.write(&component, DocumentKind::Sitemap)?)
    }

    /// Serializes the collection as a single document.
    ///
    /// A collection within the cap becomes a plain sitemap. An oversized
    /// collection fails unless multi-file output is permitted, in which
    /// case the sitemapindex summary is produced instead, deriving
    /// component names from the collection's own URI.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::Oversized`] without multi-file permission and
    /// [`ListError::NoBasename`] when an index summary has no URI to name
    /// parts from.
    pub fn as_xml(&self, collection: &ResourceContainer) -> Result<String, ListError> {
        match self.requires_multifile(collection) {
            None => Ok(self.codec.write(collection, DocumentKind::Sitemap)?),
            Some(parts) if !self.allow_multifile => Err(ListError::Oversized {
                len: collection.len(),
                max: self.max_entries.unwrap_or(DEFAULT_MAX_SITEMAP_ENTRIES),
                parts,
            }),
            Some(parts) => {
                let base = collection.uri().ok_or(ListError::NoBasename)?;
                let mut index = ResourceContainer::new_unstamped(collection.capability());
                *index.md_mut() = collection.md().clone();
                for part in 0..parts {
                    index.add_replace(Resource::new(part_name(base, part))?);
                }
                Ok(self.codec.write(&index, DocumentKind::SitemapIndex)?)
            }
        }
    }

    /// Writes the collection to disk under `basename`.
    ///
    /// Within the cap this writes one sitemap file. Otherwise, with
    /// multi-file permitted, entries are partitioned in iteration order
    /// into components named by the 5-digit part convention; each component
    /// copies the parent's metadata and links, and its index entry records
    /// the written file's MD5 and modification time with a `<loc>` mapped
    /// back into URI space. The sitemapindex is written last, at
    /// `basename`. Returns every written path, index last.
    ///
    /// # Errors
    ///
    /// Any component path that cannot be mapped back to a URI is fatal, as
    /// are filesystem and codec failures.
    pub fn write(
        &self,
        collection: &ResourceContainer,
        basename: &Path,
    ) -> Result<Vec<PathBuf>, ListError> {
        let Some(parts) = self.requires_multifile(collection) else {
            let xml = self.codec.write(collection, DocumentKind::Sitemap)?;
            write_file(basename, &xml)?;
            info!(path = %basename.display(), entries = collection.len(), "wrote sitemap");
            return Ok(vec![basename.to_path_buf()]);
        };
        if !self.allow_multifile {
            return Err(ListError::Oversized {
                len: collection.len(),
                max: self.max_entries.unwrap_or(DEFAULT_MAX_SITEMAP_ENTRIES),
                parts,
            });
        }
        let mapper = self.mapper.ok_or(ListError::NoMapper)?;
        // requires_multifile returned Some, so the cap is configured.
        let max = self.max_entries.unwrap_or(DEFAULT_MAX_SITEMAP_ENTRIES);
        let basename_str = basename.to_string_lossy();

        let mut index = ResourceContainer::new_unstamped(collection.capability());
        *index.md_mut() = collection.md().clone();
        let mut written = Vec::with_capacity(parts + 1);
        let mut entries = collection.iter();
        for part in 0..parts {
            let mut component = ResourceContainer::new_unstamped(collection.capability());
            *component.md_mut() = collection.md().clone();
            for link in collection.ln() {
                component.add_ln(link.clone());
            }
            for resource in entries.by_ref().take(max) {
                component.add_replace(resource.clone());
            }
            let part_path = PathBuf::from(part_name(&basename_str, part));
            let xml = self.codec.write(&component, DocumentKind::Sitemap)?;
            write_file(&part_path, &xml)?;
            debug!(path = %part_path.display(), entries = component.len(), "wrote component sitemap");

            let part_uri = mapper.dst_to_src(&part_path.to_string_lossy())?;
            let mut entry = Resource::new(part_uri)?;
            entry.set_md5(
                digests::digest_file(&[DigestKind::Md5], &part_path)
                    .map_err(|source| ListError::Io {
                        path: part_path.clone(),
                        source,
                    })?
                    .md5,
            );
            entry.set_timestamp(Some(file_mtime(&part_path)?));
            index.add_replace(entry);
            written.push(part_path);
        }

        let index_xml = self.codec.write(&index, DocumentKind::SitemapIndex)?;
        write_file(basename, &index_xml)?;
        info!(
            path = %basename.display(),
            parts,
            entries = collection.len(),
            "wrote sitemapindex and components"
        );
        written.push(basename.to_path_buf());
        Ok(written)
    }
}

/// Reads a sitemap or sitemapindex, transparently reassembling components.
pub struct ListReader<'a> {
    codec: Codec,
    fetcher: &'a Fetcher,
    mapper: Option<&'a Mapper>,
    check_authority: bool,
    hint: Option<Capability>,
}

impl<'a> ListReader<'a> {
    /// Creates a reader retrieving documents through `fetcher`.
    #[must_use]
    pub const fn new(fetcher: &'a Fetcher) -> Self {
        Self {
            codec: Codec::new(),
            fetcher,
            mapper: None,
            check_authority: false,
            hint: None,
        }
    }

    /// Configures the mapper used to resolve component URIs to local files
    /// when the parent document was local.
    #[must_use]
    pub const fn mapper(mut self, mapper: &'a Mapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Enables the strict URL-authority check on component URIs.
    #[must_use]
    pub const fn check_authority(mut self, check: bool) -> Self {
        self.check_authority = check;
        self
    }

    /// Pre-selects the document kind for parsing.
    #[must_use]
    pub const fn hint(mut self, capability: Capability) -> Self {
        self.hint = Some(capability);
        self
    }

    /// Reads the document at `uri` into one flat collection.
    ///
    /// A plain sitemap parses directly. A sitemapindex has its components
    /// fetched strictly sequentially in ascending URI order and merged —
    /// unless `index_only` is set, in which case the index's own entries
    /// (the component locations) are returned without fetching.
    ///
    /// # Errors
    ///
    /// Retrieval, parse, authority, and merge failures all surface as
    /// [`ListError`] naming the failing URI.
    pub fn read(&self, uri: &str, index_only: bool) -> Result<ResourceContainer, ListError> {
        let document = self.fetcher.open(uri)?;
        let was_local = document.is_local();
        let parsed = self.codec.parse(document.text()?, self.hint)?;
        let mut container = match parsed.kind {
            DocumentKind::Sitemap => parsed.container,
            DocumentKind::SitemapIndex if index_only => parsed.container,
            DocumentKind::SitemapIndex => self.merge_components(uri, was_local, &parsed.container)?,
        };
        container.set_uri(Some(uri.to_string()));
        Ok(container)
    }

    fn merge_components(
        &self,
        index_uri: &str,
        was_local: bool,
        index: &ResourceContainer,
    ) -> Result<ResourceContainer, ListError> {
        let mut merged = ResourceContainer::new_unstamped(index.capability());
        *merged.md_mut() = index.md().clone();
        for link in index.ln() {
            merged.add_ln(link.clone());
        }
        let mut component_uris: Vec<String> =
            index.iter().map(|entry| entry.uri().to_string()).collect();
        component_uris.sort();

        for component_uri in component_uris {
            if self.check_authority && !has_authority(index_uri, &component_uri) {
                return Err(ListError::NotAuthorized {
                    index_uri: index_uri.to_string(),
                    component_uri,
                });
            }
            // A sitemapindex read from disk pulls its components from disk.
            let target = if was_local && fetch::local_path(&component_uri).is_none() {
                let mapper = self.mapper.ok_or(ListError::NoMapper)?;
                mapper.src_to_dst(&component_uri)?
            } else {
                component_uri.clone()
            };
            let document = self.fetcher.open(&target)?;
            let component = self.codec.parse_expecting(
                document.text()?,
                self.hint.or(Some(index.capability())),
                DocumentKind::Sitemap,
            )?;
            debug!(component = %component_uri, entries = component.len(), "merged component");
            for resource in component.iter() {
                merged.add(resource.clone())?;
            }
        }
        Ok(merged)
    }
}

/// Names the `part`-th component: the 5-digit, zero-padded sequence number
/// goes before the `.xml` suffix (`sitemap.xml` -> `sitemap00000.xml`).
#[must_use]
pub fn part_name(basename: &str, part: usize) -> String {
    match basename.strip_suffix(".xml") {
        Some(stem) => format!("{stem}{part:05}.xml"),
        None => format!("{basename}{part:05}.xml"),
    }
}

fn component_of(collection: &ResourceContainer, range: Range<usize>) -> ResourceContainer {
    let mut component = ResourceContainer::new_unstamped(collection.capability());
    *component.md_mut() = collection.md().clone();
    for link in collection.ln() {
        component.add_ln(link.clone());
    }
    for resource in collection.iter().skip(range.start).take(range.len()) {
        component.add_replace(resource.clone());
    }
    component
}

fn write_file(path: &Path, content: &str) -> Result<(), ListError> {
    fs::write(path, content).map_err(|source| ListError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn file_mtime(path: &Path) -> Result<f64, ListError> {
    let io_error = |source| ListError::Io {
        path: path.to_path_buf(),
        source,
    };
    let modified = fs::metadata(path)
        .map_err(io_error)?
        .modified()
        .map_err(io_error)?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(duration) => Ok(duration.as_secs_f64()),
        Err(_) => Ok(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetch::FetchConfig;

    fn resource(uri: &str) -> Resource {
        Resource::new(uri).expect("valid uri").with_timestamp(1.0)
    }

    fn list_of(count: usize) -> ResourceContainer {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        for index in 0..count {
            list.add(resource(&format!("http://example.com/res{index:03}")))
                .expect("unique uri");
        }
        list
    }

    #[test]
    fn part_names_follow_the_five_digit_convention() {
        assert_eq!(part_name("sitemap.xml", 0), "sitemap00000.xml");
        assert_eq!(part_name("sitemap.xml", 1), "sitemap00001.xml");
        assert_eq!(part_name("/tmp/rl.xml", 12), "/tmp/rl00012.xml");
    }

    #[test]
    fn boundary_lengths_do_not_require_multifile() {
        let writer = ListWriter::new().max_sitemap_entries(Some(3));
        assert_eq!(writer.requires_multifile(&list_of(3)), None);
        assert_eq!(writer.requires_multifile(&list_of(4)), Some(2));
        assert_eq!(writer.requires_multifile(&list_of(7)), Some(3));
        let unlimited = ListWriter::new().max_sitemap_entries(None);
        assert_eq!(unlimited.requires_multifile(&list_of(4)), None);
    }

    #[test]
    fn part_ranges_partition_the_sequence() {
        let writer = ListWriter::new().max_sitemap_entries(Some(2));
        assert_eq!(writer.part_range(5, 0).unwrap(), 0..2);
        assert_eq!(writer.part_range(5, 1).unwrap(), 2..4);
        assert_eq!(writer.part_range(5, 2).unwrap(), 4..5);
        assert!(matches!(
            writer.part_range(5, 3).unwrap_err(),
            ListError::PartOutOfRange { part: 3, parts: 3 }
        ));
    }

    #[test]
    fn part_xml_contains_only_that_slice() {
        let writer = ListWriter::new().max_sitemap_entries(Some(2));
        let xml = writer.part_xml(&list_of(5), 2).unwrap();
        assert!(xml.contains("res004"));
        assert!(!xml.contains("res003"));
    }

    #[test]
    fn as_xml_refuses_oversized_without_permission() {
        let writer = ListWriter::new().max_sitemap_entries(Some(2));
        let error = writer.as_xml(&list_of(5)).unwrap_err();
        assert!(matches!(
            error,
            ListError::Oversized {
                len: 5,
                max: 2,
                parts: 3
            }
        ));
    }

    #[test]
    fn as_xml_with_permission_emits_an_index_summary() {
        let writer = ListWriter::new()
            .max_sitemap_entries(Some(2))
            .allow_multifile(true);
        let collection = list_of(5).with_uri("http://example.com/rl.xml");
        let xml = writer.as_xml(&collection).unwrap();
        assert!(xml.contains("<sitemapindex"));
        for part in ["rl00000.xml", "rl00001.xml", "rl00002.xml"] {
            assert!(xml.contains(part), "missing {part}");
        }
    }

    #[test]
    fn as_xml_index_summary_needs_a_basename() {
        let writer = ListWriter::new()
            .max_sitemap_entries(Some(2))
            .allow_multifile(true);
        assert!(matches!(
            writer.as_xml(&list_of(5)).unwrap_err(),
            ListError::NoBasename
        ));
    }

    #[test]
    fn split_and_rejoin_preserve_length_and_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().display().to_string();
        let mapper = Mapper::from_pair("http://example.com", &root);
        let writer = ListWriter::new()
            .max_sitemap_entries(Some(2))
            .allow_multifile(true)
            .mapper(&mapper);
        let collection = list_of(5);
        let basename = temp.path().join("sitemap.xml");
        let written = writer.write(&collection, &basename).expect("write");
        // k+1 components for max*k + r entries, plus the index.
        assert_eq!(written.len(), 4);
        assert!(written[0].ends_with("sitemap00000.xml"));
        assert!(written[2].ends_with("sitemap00002.xml"));
        assert_eq!(written[3], basename);

        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let reader = ListReader::new(&fetcher).mapper(&mapper);
        let merged = reader
            .read(&basename.display().to_string(), false)
            .expect("read");
        assert_eq!(merged.len(), collection.len());
        let original: Vec<&str> = collection.iter().map(Resource::uri).collect();
        let rejoined: Vec<&str> = merged.iter().map(Resource::uri).collect();
        assert_eq!(original, rejoined);
    }

    #[test]
    fn index_entries_carry_md5_and_mtime() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().display().to_string();
        let mapper = Mapper::from_pair("http://example.com", &root);
        let writer = ListWriter::new()
            .max_sitemap_entries(Some(2))
            .allow_multifile(true)
            .mapper(&mapper);
        let basename = temp.path().join("sitemap.xml");
        writer.write(&list_of(3), &basename).expect("write");

        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let reader = ListReader::new(&fetcher).mapper(&mapper);
        let index = reader
            .read(&basename.display().to_string(), true)
            .expect("read index");
        assert_eq!(index.len(), 2);
        for entry in index.iter() {
            assert!(entry.md5().is_some());
            assert!(entry.timestamp().is_some());
        }
    }

    #[test]
    fn unmappable_component_path_is_fatal_on_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mapper = Mapper::from_pair("http://example.com", "/somewhere/else");
        let writer = ListWriter::new()
            .max_sitemap_entries(Some(2))
            .allow_multifile(true)
            .mapper(&mapper);
        let error = writer
            .write(&list_of(3), &temp.path().join("sitemap.xml"))
            .unwrap_err();
        assert!(matches!(error, ListError::Unmappable(_)));
    }

    #[test]
    fn small_collections_write_one_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let basename = temp.path().join("sitemap.xml");
        let written = ListWriter::new().write(&list_of(2), &basename).expect("write");
        assert_eq!(written, vec![basename.clone()]);

        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let reader = ListReader::new(&fetcher);
        let read_back = reader
            .read(&basename.display().to_string(), false)
            .expect("read");
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back.uri(), Some(basename.display().to_string().as_str()));
    }

    #[test]
    fn authority_check_rejects_foreign_components() {
        let temp = tempfile::tempdir().expect("tempdir");
        let index_path = temp.path().join("index.xml");
        let mut index = ResourceContainer::new(Capability::ResourceList);
        index
            .add(Resource::new("http://elsewhere.org/sitemap00000.xml").unwrap())
            .unwrap();
        let xml = Codec::new()
            .write(&index, DocumentKind::SitemapIndex)
            .unwrap();
        std::fs::write(&index_path, xml).unwrap();

        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let mapper = Mapper::from_pair("http://example.com", &temp.path().display().to_string());
        let reader = ListReader::new(&fetcher).mapper(&mapper).check_authority(true);
        // The local index has no URI authority at all, so any remote
        // component is rejected.
        let error = reader
            .read(&index_path.display().to_string(), false)
            .unwrap_err();
        assert!(matches!(error, ListError::NotAuthorized { .. }));
    }
}
