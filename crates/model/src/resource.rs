use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ModelError;
use crate::w3c::{format_w3c, parse_w3c};

/// Change annotation carried by entries of a change list or change dump.
///
/// A resource without an annotation is a plain state record, not a change
/// record. Tokens outside this enum are rejected at parse time; there is no
/// escape hatch for unchecked values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Change {
    /// The resource came into existence at the recorded time.
    Created,
    /// The resource was modified at the recorded time.
    Updated,
    /// The resource ceased to exist at the recorded time.
    Deleted,
}

impl Change {
    /// Returns the wire token for the annotation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Change::Created => "created",
            Change::Updated => "updated",
            Change::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Change {
    type Err = ModelError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "created" => Ok(Change::Created),
            "updated" => Ok(Change::Updated),
            "deleted" => Ok(Change::Deleted),
            other => Err(ModelError::UnknownChange(other.to_string())),
        }
    }
}

/// One `rs:ln` link record: required `rel` and `href` plus any extra
/// attributes in document order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Link {
    rel: String,
    href: String,
    extra: Vec<(String, String)>,
}

impl Link {
    /// Creates a link with the required relation and target.
    #[must_use]
    pub fn new<R: Into<String>, H: Into<String>>(rel: R, href: H) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            extra: Vec::new(),
        }
    }

    /// Appends an extra attribute, preserving insertion order.
    #[must_use]
    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Returns the link relation.
    #[must_use]
    pub fn rel(&self) -> &str {
        &self.rel
    }

    /// Returns the link target.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Returns the extra attributes in insertion order.
    #[must_use]
    pub fn extra(&self) -> &[(String, String)] {
        &self.extra
    }
}

/// One described web resource: a URI plus optional metadata.
///
/// Equality through [`PartialEq`] is the strict form of [`Resource::same_as`]
/// (zero timestamp tolerance). Sync code passes a one-second delta instead, so
/// filesystem mtime truncation does not show up as an update.
#[derive(Clone, Debug)]
pub struct Resource {
    uri: String,
    timestamp: Option<f64>,
    length: Option<u64>,
    md5: Option<String>,
    sha1: Option<String>,
    sha256: Option<String>,
    change: Option<Change>,
    capability: Option<String>,
    path: Option<PathBuf>,
    links: Vec<Link>,
}

impl Resource {
    /// Creates a resource for the given URI.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyUri`] when the URI is empty.
    pub fn new<U: Into<String>>(uri: U) -> Result<Self, ModelError> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(ModelError::EmptyUri);
        }
        Ok(Self {
            uri,
            timestamp: None,
            length: None,
            md5: None,
            sha1: None,
            sha256: None,
            change: None,
            capability: None,
            path: None,
            links: Vec::new(),
        })
    }

    /// Sets the modification timestamp in epoch seconds.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the timestamp from a W3C-Datetime `lastmod` string.
    pub fn with_lastmod(mut self, lastmod: &str) -> Result<Self, ModelError> {
        self.timestamp = Some(parse_w3c(lastmod)?);
        Ok(self)
    }

    /// Sets the byte length.
    #[must_use]
    pub const fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the change annotation.
    #[must_use]
    pub const fn with_change(mut self, change: Change) -> Self {
        self.change = Some(change);
        self
    }

    /// Sets the MD5 digest (base64 form).
    #[must_use]
    pub fn with_md5<D: Into<String>>(mut self, digest: D) -> Self {
        self.md5 = Some(digest.into());
        self
    }

    /// Sets the SHA-1 digest (hex form).
    #[must_use]
    pub fn with_sha1<D: Into<String>>(mut self, digest: D) -> Self {
        self.sha1 = Some(digest.into());
        self
    }

    /// Sets the SHA-256 digest (hex form).
    #[must_use]
    pub fn with_sha256<D: Into<String>>(mut self, digest: D) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    /// Sets the capability name advertised for this entry (capability lists
    /// and source descriptions stamp their members this way).
    #[must_use]
    pub fn with_capability<C: Into<String>>(mut self, capability: C) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Sets the local filesystem path backing this resource.
    #[must_use]
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Appends a per-resource link.
    #[must_use]
    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Returns the resource URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the timestamp in epoch seconds, if known.
    #[must_use]
    pub const fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    /// Returns the timestamp as a W3C-Datetime string, if known.
    #[must_use]
    pub fn lastmod(&self) -> Option<String> {
        self.timestamp.map(format_w3c)
    }

    /// Returns the byte length, if known.
    #[must_use]
    pub const fn length(&self) -> Option<u64> {
        self.length
    }

    /// Returns the MD5 digest, if known.
    #[must_use]
    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    /// Returns the SHA-1 digest, if known.
    #[must_use]
    pub fn sha1(&self) -> Option<&str> {
        self.sha1.as_deref()
    }

    /// Returns the SHA-256 digest, if known.
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Returns the change annotation, if this is a change record.
    #[must_use]
    pub const fn change(&self) -> Option<Change> {
        self.change
    }

    /// Returns the advertised capability name, if any.
    #[must_use]
    pub fn capability(&self) -> Option<&str> {
        self.capability.as_deref()
    }

    /// Returns the local path backing this resource, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the per-resource links in document order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Replaces the timestamp.
    pub const fn set_timestamp(&mut self, timestamp: Option<f64>) {
        self.timestamp = timestamp;
    }

    /// Replaces the byte length.
    pub const fn set_length(&mut self, length: Option<u64>) {
        self.length = length;
    }

    /// Replaces the change annotation.
    pub const fn set_change(&mut self, change: Option<Change>) {
        self.change = change;
    }

    /// Replaces the MD5 digest.
    pub fn set_md5(&mut self, digest: Option<String>) {
        self.md5 = digest;
    }

    /// Replaces the SHA-1 digest.
    pub fn set_sha1(&mut self, digest: Option<String>) {
        self.sha1 = digest;
    }

    /// Replaces the SHA-256 digest.
    pub fn set_sha256(&mut self, digest: Option<String>) {
        self.sha256 = digest;
    }

    /// Replaces the advertised capability name.
    pub fn set_capability(&mut self, capability: Option<String>) {
        self.capability = capability;
    }

    /// Replaces the local path.
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    /// Appends a per-resource link in place.
    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Reports whether this resource describes the same state as `other`,
    /// allowing timestamps to differ by up to `delta` seconds.
    ///
    /// The relation requires: equal URIs; timestamps both absent or both
    /// present within `delta`; equal digests for every digest kind both sides
    /// carry; equal lengths when both sides carry one. Digest kinds or lengths
    /// known on only one side do not count against equality.
    #[must_use]
    pub fn same_as(&self, other: &Resource, delta: f64) -> bool {
        if self.uri != other.uri {
            return false;
        }
        match (self.timestamp, other.timestamp) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                if (a - b).abs() > delta {
                    return false;
                }
            }
            _ => return false,
        }
        for (mine, theirs) in [
            (self.md5.as_deref(), other.md5.as_deref()),
            (self.sha1.as_deref(), other.sha1.as_deref()),
            (self.sha256.as_deref(), other.sha256.as_deref()),
        ] {
            if let (Some(a), Some(b)) = (mine, theirs)
                && a != b
            {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (self.length, other.length)
            && a != b
        {
            return false;
        }
        true
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other, 0.0)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)?;
        if let Some(lastmod) = self.lastmod() {
            write!(f, " [{lastmod}]")?;
        }
        if let Some(change) = self.change {
            write!(f, " ({change})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(uri: &str) -> Resource {
        Resource::new(uri).expect("valid uri")
    }

    #[test]
    fn empty_uri_is_rejected() {
        assert_eq!(Resource::new(""), Err(ModelError::EmptyUri));
    }

    #[test]
    fn change_tokens_round_trip() {
        for change in [Change::Created, Change::Updated, Change::Deleted] {
            assert_eq!(change.as_str().parse::<Change>().unwrap(), change);
        }
        assert!(matches!(
            "renamed".parse::<Change>(),
            Err(ModelError::UnknownChange(_))
        ));
    }

    #[test]
    fn lastmod_reflects_timestamp() {
        let resource = resource("http://example.com/a").with_timestamp(1_357_203_600.0);
        assert_eq!(resource.lastmod().as_deref(), Some("2013-01-03T09:00:00Z"));
    }

    #[test]
    fn with_lastmod_parses_into_timestamp() {
        let resource = resource("http://example.com/a")
            .with_lastmod("2013-01-03T09:00:00Z")
            .unwrap();
        assert_eq!(resource.timestamp(), Some(1_357_203_600.0));
    }

    #[test]
    fn equality_requires_matching_uri() {
        let a = resource("http://example.com/a");
        let b = resource("http://example.com/b");
        assert_ne!(a, b);
    }

    #[test]
    fn equality_with_one_sided_timestamp_fails() {
        let bare = resource("http://example.com/a");
        let stamped = resource("http://example.com/a").with_timestamp(5.0);
        assert_ne!(bare, stamped);
        assert_eq!(bare, resource("http://example.com/a"));
    }

    #[test]
    fn timestamp_delta_is_honoured() {
        let a = resource("http://example.com/a").with_timestamp(100.0);
        let b = resource("http://example.com/a").with_timestamp(100.9);
        assert!(a.same_as(&b, 1.0));
        assert!(!a.same_as(&b, 0.5));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_mismatch_breaks_equality_only_when_both_present() {
        let a = resource("http://example.com/a").with_md5("aaa");
        let b = resource("http://example.com/a").with_md5("bbb");
        let unhashed = resource("http://example.com/a");
        assert_ne!(a, b);
        assert_eq!(a, unhashed);
    }

    #[test]
    fn length_mismatch_breaks_equality_only_when_both_present() {
        let a = resource("http://example.com/a").with_length(7);
        let b = resource("http://example.com/a").with_length(8);
        let unsized_ = resource("http://example.com/a");
        assert_ne!(a, b);
        assert_eq!(a, unsized_);
    }

    #[test]
    fn display_includes_lastmod_and_change() {
        let resource = resource("http://example.com/a")
            .with_timestamp(0.0)
            .with_change(Change::Deleted);
        assert_eq!(
            resource.to_string(),
            "http://example.com/a [1970-01-01T00:00:00Z] (deleted)"
        );
    }

    #[test]
    fn links_keep_insertion_order() {
        let resource = resource("http://example.com/a")
            .with_link(Link::new("describedby", "http://example.com/about"))
            .with_link(Link::new("duplicate", "http://mirror.example.com/a").with_attribute("pri", "1"));
        assert_eq!(resource.links().len(), 2);
        assert_eq!(resource.links()[0].rel(), "describedby");
        assert_eq!(resource.links()[1].extra(), &[("pri".into(), "1".into())]);
    }
}
