#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `fetch` retrieves ResourceSync documents and resource representations.
//! One [`Fetcher`] serves a whole client session: it owns the HTTP client,
//! the session configuration (bearer token, user agent, politeness delay,
//! timeout), and the bookkeeping needed to pace successive requests.
//! `file:`-prefixed and schemeless URIs read from the local filesystem
//! through the same entry point, so a sitemapindex read from disk pulls its
//! components from disk without the caller special-casing.
//!
//! # Design
//!
//! - Configuration lives in an explicit [`FetchConfig`] constructed once per
//!   session and moved into the [`Fetcher`]; nothing is process-global.
//! - Retrieval is synchronous and single-pass. The inter-request delay is
//!   enforced between network requests only; local reads never wait.
//! - Every retrieval returns a fully read [`Document`]; response handles
//!   never outlive the call, so they close on success, parse failure, and
//!   network failure alike.
//!
//! # Errors
//!
//! [`FetchError`] wraps the underlying I/O or HTTP failure together with the
//! URI that was being retrieved. A non-success HTTP status is an error, not
//! an empty document.

use std::cell::Cell;
use std::fs;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Errors produced while retrieving a document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// A local read failed.
    #[error("failed to read '{uri}': {source}")]
    Io {
        /// URI (or path) being read.
        uri: String,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// A network request failed before yielding a status.
    #[error("failed to fetch '{uri}': {source}")]
    Http {
        /// URI being fetched.
        uri: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("'{uri}' returned HTTP status {status}")]
    Status {
        /// URI being fetched.
        uri: String,
        /// HTTP status code received.
        status: u16,
    },
    /// The document was requested as text but is not valid UTF-8.
    #[error("document '{uri}' is not valid UTF-8")]
    NotUtf8 {
        /// URI of the non-text document.
        uri: String,
    },
}

/// Per-session retrieval configuration.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Bearer token attached as an `Authorization` header, if any.
    pub bearer_token: Option<String>,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Minimum pause between successive network requests.
    pub delay: Option<Duration>,
    /// Per-request timeout passed to the HTTP transport.
    pub timeout: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            user_agent: concat!("resync/", env!("CARGO_PKG_VERSION")).to_string(),
            delay: None,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// A fully retrieved document.
#[derive(Clone, Debug)]
pub struct Document {
    uri: String,
    bytes: Vec<u8>,
    content_length: Option<u64>,
    local: bool,
}

impl Document {
    /// Returns the URI the document was retrieved from.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the document content.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the document, returning its content.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the length advertised by the source, when it sent one; local
    /// reads report the file size.
    #[must_use]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Reports whether the document came from the local filesystem.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.local
    }

    /// Returns the content as text.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotUtf8`] when the content is not valid UTF-8.
    pub fn text(&self) -> Result<&str, FetchError> {
        std::str::from_utf8(&self.bytes).map_err(|_| FetchError::NotUtf8 {
            uri: self.uri.clone(),
        })
    }
}

/// Session-scoped document retriever.
pub struct Fetcher {
    config: FetchConfig,
    client: reqwest::blocking::Client,
    last_request: Cell<Option<Instant>>,
}

impl Fetcher {
    /// Builds a fetcher for the given session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let mut builder =
            reqwest::blocking::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self {
            config,
            client,
            last_request: Cell::new(None),
        })
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Retrieves a document from a `http(s)` URI, a `file:` URI, or a plain
    /// local path.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] describing the failing URI on any read,
    /// transport, or status failure.
    pub fn open(&self, uri: &str) -> Result<Document, FetchError> {
        match local_path(uri) {
            Some(path) => self.open_local(uri, path),
            None => self.open_remote(uri),
        }
    }

    fn open_local(&self, uri: &str, path: &str) -> Result<Document, FetchError> {
        let bytes = fs::read(path).map_err(|source| FetchError::Io {
            uri: uri.to_string(),
            source,
        })?;
        debug!(uri, len = bytes.len(), "read local document");
        Ok(Document {
            uri: uri.to_string(),
            content_length: Some(bytes.len() as u64),
            bytes,
            local: true,
        })
    }

    fn open_remote(&self, uri: &str) -> Result<Document, FetchError> {
        self.pause_between_requests();
        let mut request = self.client.get(uri);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|source| FetchError::Http {
            uri: uri.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        let content_length = response.content_length();
        let bytes = response
            .bytes()
            .map_err(|source| FetchError::Http {
                uri: uri.to_string(),
                source,
            })?
            .to_vec();
        debug!(uri, len = bytes.len(), "fetched remote document");
        Ok(Document {
            uri: uri.to_string(),
            bytes,
            content_length,
            local: false,
        })
    }

    fn pause_between_requests(&self) {
        if let (Some(delay), Some(last)) = (self.config.delay, self.last_request.get()) {
            let elapsed = last.elapsed();
            if elapsed < delay {
                thread::sleep(delay - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}

/// Maps a URI to a local filesystem path when it names one: `file:` URIs
/// and anything without an `http(s)` scheme.
#[must_use]
pub fn local_path(uri: &str) -> Option<&str> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return None;
    }
    // file:///path carries an empty authority, file:/path none; both map to
    // the path that follows.
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(rest);
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Some(rest);
    }
    Some(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn local_path_classification() {
        assert_eq!(local_path("http://example.com/x"), None);
        assert_eq!(local_path("https://example.com/x"), None);
        assert_eq!(local_path("file:///tmp/x"), Some("/tmp/x"));
        assert_eq!(local_path("file:/tmp/x"), Some("/tmp/x"));
        assert_eq!(local_path("/tmp/x"), Some("/tmp/x"));
        assert_eq!(local_path("relative/x"), Some("relative/x"));
    }

    #[test]
    fn open_reads_local_files_with_length() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"<urlset/>").expect("write");
        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let document = fetcher
            .open(&file.path().display().to_string())
            .expect("open");
        assert!(document.is_local());
        assert_eq!(document.content_length(), Some(9));
        assert_eq!(document.text().unwrap(), "<urlset/>");
    }

    #[test]
    fn missing_local_file_reports_uri() {
        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let error = fetcher.open("/definitely/missing/doc.xml").unwrap_err();
        assert!(matches!(error, FetchError::Io { ref uri, .. } if uri.contains("missing")));
    }

    #[test]
    fn non_utf8_content_is_a_text_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(&[0xff, 0xfe]).expect("write");
        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        let document = fetcher
            .open(&file.path().display().to_string())
            .expect("open");
        assert!(matches!(document.text(), Err(FetchError::NotUtf8 { .. })));
    }

    #[test]
    fn default_config_carries_version_user_agent() {
        let config = FetchConfig::default();
        assert!(config.user_agent.starts_with("resync/"));
    }
}
