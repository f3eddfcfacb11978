use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the consumer and producer engines.
///
/// Leaf-crate failures pass through transparently; the engine adds only the
/// conditions it owns (state file handling, the unsafe-mapping refusal).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Document retrieval failed.
    #[error(transparent)]
    Fetch(#[from] fetch::FetchError),
    /// Sitemap or sitemapindex processing failed.
    #[error(transparent)]
    List(#[from] sitemap::ListError),
    /// Document codec failure.
    #[error(transparent)]
    Sitemap(#[from] sitemap::SitemapError),
    /// Collection mutation failure.
    #[error(transparent)]
    Model(#[from] model::ModelError),
    /// Comparison precondition failure.
    #[error(transparent)]
    Compare(#[from] model::CompareError),
    /// Destination scan failure.
    #[error(transparent)]
    Scan(#[from] scan::ScanError),
    /// URI/path translation failure.
    #[error(transparent)]
    Mapper(#[from] mapper::MapperError),
    /// Dump packaging failure.
    #[error(transparent)]
    Dump(#[from] dump::DumpError),
    /// A local file could not be read or written.
    #[error("failed to access '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The client state sidecar could not be decoded.
    #[error("failed to parse state file '{path}': {source}")]
    State {
        /// State file path.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// The configured mapping would let a sync overwrite its own source.
    #[error("refusing unsafe mapping: source and destination trees overlap")]
    UnsafeMapping,
}
