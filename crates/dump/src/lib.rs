#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dump` packages resource content into ZIP archives per the ResourceSync
//! dump conventions: each archive opens with a `manifest.xml` (a
//! resourcedump-manifest or changedump-manifest document) describing the
//! members that follow, and oversized dumps split into numbered parts using
//! the same 5-digit suffix convention as multi-file sitemaps.
//!
//! # Design
//!
//! - [`DumpWriter`] consumes a collection whose entries carry local `path`s,
//!   partitions greedily under the per-part resource-count and content-size
//!   limits, and writes the manifest as the first entry of every part.
//! - Archive member names are the entry's local path made relative; the
//!   manifest records each member under its `path` attribute with a leading
//!   `/`, so extraction is driven entirely by the manifest, not by archive
//!   directory order.
//! - [`DumpReader`] reads the manifest back and extracts members to
//!   mapper-resolved destinations.
//!
//! # Errors
//!
//! [`DumpError`] distinguishes packaging preconditions (an entry without a
//! local path) from archive-format and filesystem failures, all carrying
//! the offending path or URI.

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use mapper::{Mapper, MapperError};
use model::{Capability, ModelError, Resource, ResourceContainer};
use sitemap::{Codec, DocumentKind, SitemapError, part_name};

/// Default cap on resources per dump part.
pub const DEFAULT_MAX_DUMP_RESOURCES: usize = 50_000;
/// Default cap on summed content bytes per dump part (1 GiB).
pub const DEFAULT_MAX_DUMP_SIZE: u64 = 1024 * 1024 * 1024;

/// Name of the manifest entry inside every dump archive.
pub const MANIFEST_NAME: &str = "manifest.xml";

/// Errors produced while writing or reading dump archives.
#[derive(Debug, Error)]
pub enum DumpError {
    /// A collection entry carries no local path to package.
    #[error("resource '{uri}' has no local path to package")]
    NoPath {
        /// URI of the unpackagable entry.
        uri: String,
    },
    /// A file could not be read or written.
    #[error("failed to access '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The archive container reported a failure.
    #[error("archive error in '{path}': {source}")]
    Zip {
        /// Archive being processed.
        path: PathBuf,
        /// Underlying archive error.
        #[source]
        source: ZipError,
    },
    /// The archive has no `manifest.xml`.
    #[error("dump archive '{path}' has no manifest.xml")]
    MissingManifest {
        /// Archive missing its manifest.
        path: PathBuf,
    },
    /// A member listed in the manifest is absent from the archive.
    #[error("archive member '{member}' missing from '{path}'")]
    MissingMember {
        /// Archive being read.
        path: PathBuf,
        /// Member the manifest promised.
        member: String,
    },
    /// Manifest serialization or parsing failed.
    #[error(transparent)]
    Sitemap(#[from] SitemapError),
    /// Collection build failure while assembling a manifest.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// An extracted member's URI has no destination mapping.
    #[error(transparent)]
    Unmappable(#[from] MapperError),
}

/// Dump flavour: plain content dump or change dump.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DumpKind {
    /// Packaged content of a resource list.
    Resource,
    /// Packaged content of a change list.
    Change,
}

impl DumpKind {
    /// Capability of the manifest document inside each archive.
    #[must_use]
    pub const fn manifest_capability(self) -> Capability {
        match self {
            DumpKind::Resource => Capability::ResourceDumpManifest,
            DumpKind::Change => Capability::ChangeDumpManifest,
        }
    }

    /// Capability of the dump document pointing at the archives.
    #[must_use]
    pub const fn dump_capability(self) -> Capability {
        match self {
            DumpKind::Resource => Capability::ResourceDump,
            DumpKind::Change => Capability::ChangeDump,
        }
    }
}

/// Packages collections with local content into dump archives.
#[derive(Clone, Copy, Debug)]
pub struct DumpWriter {
    kind: DumpKind,
    max_resources: usize,
    max_size: u64,
    codec: Codec,
}

impl DumpWriter {
    /// Creates a writer for the given dump flavour with default limits.
    #[must_use]
    pub const fn new(kind: DumpKind) -> Self {
        Self {
            kind,
            max_resources: DEFAULT_MAX_DUMP_RESOURCES,
            max_size: DEFAULT_MAX_DUMP_SIZE,
            codec: Codec::new(),
        }
    }

    /// Caps the number of resources per part.
    #[must_use]
    pub const fn max_resources(mut self, max: usize) -> Self {
        self.max_resources = max;
        self
    }

    /// Caps the summed content bytes per part.
    #[must_use]
    pub const fn max_size(mut self, max: u64) -> Self {
        self.max_size = max;
        self
    }

    /// Writes the collection's content as one or more dump archives.
    ///
    /// A dump within both limits is written at `basename`; an oversized one
    /// splits into parts named by the 5-digit suffix convention. Returns
    /// the written archive paths in part order.
    ///
    /// # Errors
    ///
    /// Every entry must carry a local `path`; failures reading content or
    /// writing archives surface as [`DumpError`].
    pub fn write(
        &self,
        collection: &ResourceContainer,
        basename: &Path,
    ) -> Result<Vec<PathBuf>, DumpError> {
        let parts = self.partition(collection)?;
        let single = parts.len() == 1;
        let basename_str = basename.to_string_lossy();
        let mut written = Vec::with_capacity(parts.len());
        for (number, part) in parts.iter().enumerate() {
            let path = if single {
                basename.to_path_buf()
            } else {
                PathBuf::from(part_name(&basename_str, number))
            };
            self.write_part(part, &path)?;
            written.push(path);
        }
        info!(
            archives = written.len(),
            entries = collection.len(),
            "wrote dump"
        );
        Ok(written)
    }

    /// Partitions entries greedily under both per-part limits. A single
    /// entry larger than the size cap still occupies a part of its own.
    fn partition<'c>(
        &self,
        collection: &'c ResourceContainer,
    ) -> Result<Vec<Vec<&'c Resource>>, DumpError> {
        let mut parts: Vec<Vec<&Resource>> = Vec::new();
        let mut current: Vec<&Resource> = Vec::new();
        let mut current_size = 0u64;
        for resource in collection.iter() {
            let path = resource.path().ok_or_else(|| DumpError::NoPath {
                uri: resource.uri().to_string(),
            })?;
            let size = match resource.length() {
                Some(length) => length,
                None => fs::metadata(path)
                    .map_err(|source| DumpError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?
                    .len(),
            };
            let over_count = current.len() >= self.max_resources.max(1);
            let over_size = !current.is_empty() && current_size + size > self.max_size;
            if over_count || over_size {
                parts.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(resource);
            current_size += size;
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(current);
        }
        Ok(parts)
    }

    fn write_part(&self, part: &[&Resource], path: &Path) -> Result<(), DumpError> {
        let zip_error = |source| DumpError::Zip {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::create(path).map_err(|source| DumpError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut manifest = ResourceContainer::new(self.kind.manifest_capability());
        let mut members = Vec::with_capacity(part.len());
        for resource in part {
            // Partitioning already required a path.
            let local = resource.path().ok_or_else(|| DumpError::NoPath {
                uri: resource.uri().to_string(),
            })?;
            let member = member_name(local);
            let mut entry = (*resource).clone();
            entry.set_path(Some(PathBuf::from(format!("/{member}"))));
            manifest.add_replace(entry);
            members.push((member, local.to_path_buf()));
        }

        let manifest_xml = self.codec.write(&manifest, DocumentKind::Sitemap)?;
        archive
            .start_file(MANIFEST_NAME, options)
            .map_err(zip_error)?;
        archive
            .write_all(manifest_xml.as_bytes())
            .map_err(|source| DumpError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        for (member, local) in members {
            let content = fs::read(&local).map_err(|source| DumpError::Io {
                path: local.clone(),
                source,
            })?;
            archive.start_file(member, options).map_err(zip_error)?;
            archive
                .write_all(&content)
                .map_err(|source| DumpError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        archive.finish().map_err(zip_error)?;
        debug!(path = %path.display(), members = part.len(), "wrote dump part");
        Ok(())
    }
}

/// Reads dump archives back: manifest inspection and content extraction.
#[derive(Clone, Copy, Debug, Default)]
pub struct DumpReader {
    codec: Codec,
}

impl DumpReader {
    /// Creates a reader.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            codec: Codec::new(),
        }
    }

    /// Parses the manifest document of the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::MissingManifest`] when the archive has no
    /// `manifest.xml`, and archive or parse errors otherwise.
    pub fn read_manifest(&self, path: &Path) -> Result<ResourceContainer, DumpError> {
        let mut archive = open_archive(path)?;
        let mut manifest_xml = String::new();
        match archive.by_name(MANIFEST_NAME) {
            Ok(mut member) => {
                member
                    .read_to_string(&mut manifest_xml)
                    .map_err(|source| DumpError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
            }
            Err(ZipError::FileNotFound) => {
                return Err(DumpError::MissingManifest {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(DumpError::Zip {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        Ok(self.codec.parse(&manifest_xml, None)?.container)
    }

    /// Extracts every manifest member to its mapper-resolved destination.
    ///
    /// Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError`] when a member is missing, a URI has no
    /// destination mapping, or a file cannot be written.
    pub fn extract(&self, path: &Path, mapper: &Mapper) -> Result<usize, DumpError> {
        let manifest = self.read_manifest(path)?;
        let mut archive = open_archive(path)?;
        let mut extracted = 0;
        for entry in manifest.iter() {
            let member = entry
                .path()
                .map(|p| p.to_string_lossy().trim_start_matches('/').to_string())
                .ok_or_else(|| DumpError::NoPath {
                    uri: entry.uri().to_string(),
                })?;
            let mut content = Vec::new();
            match archive.by_name(&member) {
                Ok(mut file) => {
                    file.read_to_end(&mut content)
                        .map_err(|source| DumpError::Io {
                            path: path.to_path_buf(),
                            source,
                        })?;
                }
                Err(ZipError::FileNotFound) => {
                    return Err(DumpError::MissingMember {
                        path: path.to_path_buf(),
                        member,
                    });
                }
                Err(source) => {
                    return Err(DumpError::Zip {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
            let destination = PathBuf::from(mapper.src_to_dst(entry.uri())?);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|source| DumpError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::write(&destination, &content).map_err(|source| DumpError::Io {
                path: destination.clone(),
                source,
            })?;
            extracted += 1;
        }
        Ok(extracted)
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<fs::File>, DumpError> {
    let file = fs::File::open(path).map_err(|source| DumpError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(file).map_err(|source| DumpError::Zip {
        path: path.to_path_buf(),
        source,
    })
}

/// Archive member name for a local path: the path made relative with any
/// parent traversals dropped.
fn member_name(path: &Path) -> String {
    let mut segments = Vec::new();
    for component in path.components() {
        if let std::path::Component::Normal(segment) = component {
            segments.push(segment.to_string_lossy().into_owned());
        }
    }
    segments.join("/")
}
