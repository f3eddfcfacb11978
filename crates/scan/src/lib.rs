#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `scan` builds a resource list from the local filesystem: it traverses
//! each destination tree configured in a [`Mapper`], names every regular
//! file in URI space through the mapper's inverse translation, and records
//! its modification time, length, and (optionally) content digests.
//!
//! # Design
//!
//! - Traversal is depth-first with directory entries sorted
//!   lexicographically before descent, keeping scans deterministic across
//!   platforms and filesystems.
//! - Symbolic links are recorded as neither files nor directories; they
//!   are skipped. Hidden entries (dot-prefixed) are skipped unless
//!   explicitly included.
//! - The result is a canonical resource list: the unique-by-URI storage
//!   orders entries by URI regardless of traversal order, so the scanner
//!   output feeds the comparator directly.
//!
//! # Errors
//!
//! [`ScanError`] captures the offending path for every filesystem failure.
//! A scanned path the mapper cannot translate back to a URI is an error,
//! never a silently dropped entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::debug;

use digests::DigestKind;
use mapper::Mapper;
use model::{Capability, ModelError, Resource, ResourceContainer};

/// Errors produced while scanning destination trees.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Failed to query metadata for an entry.
    #[error("failed to inspect '{path}': {source}")]
    Metadata {
        /// Path whose metadata could not be read.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Failed to read the contents of a directory.
    #[error("failed to read directory '{path}': {source}")]
    ReadDir {
        /// Directory that could not be read.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Failed to digest a file's content.
    #[error("failed to digest '{path}': {source}")]
    Digest {
        /// File that could not be digested.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// A scanned path has no inverse mapping to URI space.
    #[error("scanned path '{0}' maps to no URI")]
    Unmappable(String),
    /// Collection build failure (duplicate URI from overlapping maps).
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Configures a filesystem scan over a mapper's destination trees.
#[derive(Debug)]
pub struct ScanBuilder<'a> {
    mapper: &'a Mapper,
    digests: Vec<DigestKind>,
    include_hidden: bool,
}

impl<'a> ScanBuilder<'a> {
    /// Creates a scan over every destination tree in `mapper`.
    #[must_use]
    pub const fn new(mapper: &'a Mapper) -> Self {
        Self {
            mapper,
            digests: Vec::new(),
            include_hidden: false,
        }
    }

    /// Requests content digests of the given kinds for every file.
    #[must_use]
    pub fn digests(mut self, kinds: &[DigestKind]) -> Self {
        self.digests = kinds.to_vec();
        self
    }

    /// Includes dot-prefixed files and directories.
    #[must_use]
    pub const fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Runs the scan, producing a resource list in canonical URI order.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] on any filesystem failure, unmappable path,
    /// or duplicate URI across overlapping destination trees.
    pub fn scan(&self) -> Result<ResourceContainer, ScanError> {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        for map in self.mapper.maps() {
            let root = PathBuf::from(map.dst());
            let metadata = fs::symlink_metadata(&root).map_err(|source| ScanError::Metadata {
                path: root.clone(),
                source,
            })?;
            if metadata.is_dir() {
                self.scan_directory(&root, &mut list)?;
            } else if metadata.is_file() {
                list.add(self.build_resource(&root, &metadata)?)?;
            }
        }
        debug!(entries = list.len(), "scan complete");
        Ok(list)
    }

    fn scan_directory(
        &self,
        directory: &Path,
        list: &mut ResourceContainer,
    ) -> Result<(), ScanError> {
        let mut stack = vec![directory.to_path_buf()];
        while let Some(current) = stack.pop() {
            let read_dir = fs::read_dir(&current).map_err(|source| ScanError::ReadDir {
                path: current.clone(),
                source,
            })?;
            let mut names = Vec::new();
            for entry in read_dir {
                let entry = entry.map_err(|source| ScanError::ReadDir {
                    path: current.clone(),
                    source,
                })?;
                names.push(entry.file_name());
            }
            names.sort();

            for name in names {
                if !self.include_hidden && name.to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = current.join(&name);
                let metadata =
                    fs::symlink_metadata(&path).map_err(|source| ScanError::Metadata {
                        path: path.clone(),
                        source,
                    })?;
                if metadata.is_dir() {
                    stack.push(path);
                } else if metadata.is_file() {
                    list.add(self.build_resource(&path, &metadata)?)?;
                }
                // Symlinks and special files are not synchronized.
            }
        }
        Ok(())
    }

    fn build_resource(&self, path: &Path, metadata: &fs::Metadata) -> Result<Resource, ScanError> {
        let path_string = path.to_string_lossy();
        let uri = self
            .mapper
            .dst_to_src(&path_string)
            .map_err(|_| ScanError::Unmappable(path_string.into_owned()))?;
        let mut resource = Resource::new(uri)?
            .with_length(metadata.len())
            .with_path(path);
        if let Ok(modified) = metadata.modified()
            && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
        {
            resource.set_timestamp(Some(duration.as_secs_f64()));
        }
        if !self.digests.is_empty() {
            let values =
                digests::digest_file(&self.digests, path).map_err(|source| ScanError::Digest {
                    path: path.to_path_buf(),
                    source,
                })?;
            resource.set_md5(values.md5);
            resource.set_sha1(values.sha1);
            resource.set_sha256(values.sha256);
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    #[test]
    fn scan_names_files_in_uri_space_and_canonical_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join("b.txt"), b"bb");
        write(&temp.path().join("sub/a.txt"), b"a");
        let mapper = Mapper::from_pair("http://example.com", &temp.path().display().to_string());
        let list = ScanBuilder::new(&mapper).scan().expect("scan");

        let uris: Vec<&str> = list.iter().map(Resource::uri).collect();
        assert_eq!(
            uris,
            vec!["http://example.com/b.txt", "http://example.com/sub/a.txt"]
        );
        let entry = list.get("http://example.com/b.txt").unwrap();
        assert_eq!(entry.length(), Some(2));
        assert!(entry.timestamp().is_some());
        assert!(entry.path().is_some());
    }

    #[test]
    fn hidden_entries_are_skipped_by_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join(".hidden"), b"x");
        write(&temp.path().join(".dir/inner.txt"), b"x");
        write(&temp.path().join("seen.txt"), b"x");
        let mapper = Mapper::from_pair("http://example.com", &temp.path().display().to_string());

        let without = ScanBuilder::new(&mapper).scan().expect("scan");
        assert_eq!(without.len(), 1);
        let with = ScanBuilder::new(&mapper)
            .include_hidden(true)
            .scan()
            .expect("scan");
        assert_eq!(with.len(), 3);
    }

    #[test]
    fn requested_digests_are_computed() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join("file.txt"), b"A file\n");
        let mapper = Mapper::from_pair("http://example.com", &temp.path().display().to_string());
        let list = ScanBuilder::new(&mapper)
            .digests(&[DigestKind::Md5, DigestKind::Sha256])
            .scan()
            .expect("scan");
        let entry = list.get("http://example.com/file.txt").unwrap();
        assert_eq!(entry.md5(), Some("j912liHgA/48DCHpkptJHg=="));
        assert!(entry.sha256().is_some());
        assert!(entry.sha1().is_none());
    }

    #[test]
    fn missing_root_is_an_error_with_the_path() {
        let mapper = Mapper::from_pair("http://example.com", "/definitely/missing/root");
        let error = ScanBuilder::new(&mapper).scan().unwrap_err();
        assert!(matches!(error, ScanError::Metadata { ref path, .. } if path.ends_with("root")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_synchronized() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join("real.txt"), b"x");
        symlink(temp.path().join("real.txt"), temp.path().join("link.txt")).expect("symlink");
        let mapper = Mapper::from_pair("http://example.com", &temp.path().display().to_string());
        let list = ScanBuilder::new(&mapper).scan().expect("scan");
        assert_eq!(list.len(), 1);
        assert!(list.contains("http://example.com/real.txt"));
    }
}
