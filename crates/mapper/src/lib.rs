#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `mapper` translates between URI space and filesystem path space through an
//! ordered list of prefix pairs. Both the sitemap multi-file engine (to
//! resolve sitemapindex member URIs to local component files and back) and
//! the disk scanner (to name scanned files) translate through the same
//! [`Mapper`].
//!
//! # Design
//!
//! - [`Map`] is one `(source-prefix, destination-prefix)` pair. Trailing
//!   slashes are stripped at construction so an exact-prefix hit still
//!   resolves to `prefix/` canonically on the other side.
//! - [`Mapper`] evaluates pairs in configuration order, first match wins,
//!   mirroring ordered filter-rule evaluation. A miss is a typed error, not
//!   a `None`: callers translating sitemap part paths must treat an
//!   unmappable location as fatal.
//!
//! # Invariants
//!
//! - Within one [`Mapper`] no two pairs share a source prefix and no two
//!   pairs share a destination prefix; violations are construction errors.
//! - For any pair and suffix, `dst_to_src(src_to_dst(src + s)) == src + s`.
//!
//! # Errors
//!
//! All failures surface as [`MapperError`] carrying the offending spec, URI,
//! or path.

use std::fmt;

use thiserror::Error;

/// Errors produced while building or applying a [`Mapper`].
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MapperError {
    /// A mapping spec contained more than one `=` separator.
    #[error("invalid mapping '{0}': expected source=destination")]
    InvalidSpec(String),
    /// Two pairs shared a source prefix.
    #[error("duplicate source prefix '{0}' in mapper")]
    DuplicateSource(String),
    /// Two pairs shared a destination prefix.
    #[error("duplicate destination prefix '{0}' in mapper")]
    DuplicateDestination(String),
    /// No configured pair matched the URI.
    #[error("no mapping matches URI '{0}'")]
    UnmappableUri(String),
    /// No configured pair matched the path.
    #[error("no mapping matches path '{0}'")]
    UnmappablePath(String),
}

/// One source-prefix to destination-prefix pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Map {
    src: String,
    dst: String,
}

impl Map {
    /// Creates a pair, stripping trailing slashes from both prefixes.
    #[must_use]
    pub fn new<S: Into<String>, D: Into<String>>(src: S, dst: D) -> Self {
        Self {
            src: strip_trailing_slash(src.into()),
            dst: strip_trailing_slash(dst.into()),
        }
    }

    /// Returns the source (URI-space) prefix.
    #[must_use]
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Returns the destination (path-space) prefix.
    #[must_use]
    pub fn dst(&self) -> &str {
        &self.dst
    }

    /// Translates a URI under the source prefix to destination space.
    #[must_use]
    pub fn src_to_dst(&self, uri: &str) -> Option<String> {
        translate(uri, &self.src, &self.dst)
    }

    /// Translates a path under the destination prefix to source space.
    #[must_use]
    pub fn dst_to_src(&self, path: &str) -> Option<String> {
        translate(path, &self.dst, &self.src)
    }

    /// Reports whether syncing through this pair could overwrite its own
    /// source: the source is a local path and the two sides are equal or
    /// nested within one another.
    #[must_use]
    pub fn is_unsafe(&self) -> bool {
        if has_scheme(&self.src) {
            return false;
        }
        self.src == self.dst
            || is_path_prefix(&self.src, &self.dst)
            || is_path_prefix(&self.dst, &self.src)
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.src, self.dst)
    }
}

/// Ordered list of [`Map`] pairs with first-match translation.
#[derive(Clone, Debug, Default)]
pub struct Mapper {
    maps: Vec<Map>,
}

impl Mapper {
    /// Builds a mapper from mapping specs.
    ///
    /// Three forms are accepted:
    /// - each spec is `source=destination`;
    /// - exactly two specs neither containing `=` form one (source,
    ///   destination) pair;
    /// - a spec that is a bare URI maps to a synthesized filesystem-safe
    ///   relative path derived from its host and path segments.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError`] for malformed specs or duplicated prefixes.
    pub fn new<S: AsRef<str>>(specs: &[S]) -> Result<Self, MapperError> {
        let mut maps = Vec::with_capacity(specs.len());
        if specs.len() == 2
            && !specs[0].as_ref().contains('=')
            && !specs[1].as_ref().contains('=')
        {
            maps.push(Map::new(specs[0].as_ref(), specs[1].as_ref()));
        } else {
            for spec in specs {
                maps.push(parse_spec(spec.as_ref())?);
            }
        }

        for (index, map) in maps.iter().enumerate() {
            for earlier in &maps[..index] {
                if earlier.src == map.src {
                    return Err(MapperError::DuplicateSource(map.src.clone()));
                }
                if earlier.dst == map.dst {
                    return Err(MapperError::DuplicateDestination(map.dst.clone()));
                }
            }
        }

        Ok(Self { maps })
    }

    /// Builds a mapper from a single (source, destination) pair.
    #[must_use]
    pub fn from_pair<S: Into<String>, D: Into<String>>(src: S, dst: D) -> Self {
        Self {
            maps: vec![Map::new(src, dst)],
        }
    }

    /// Returns the configured pairs in evaluation order.
    #[must_use]
    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    /// Returns the number of configured pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Reports whether no pairs are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Translates a URI to destination space through the first matching
    /// pair.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnmappableUri`] when no pair matches.
    pub fn src_to_dst(&self, uri: &str) -> Result<String, MapperError> {
        self.maps
            .iter()
            .find_map(|map| map.src_to_dst(uri))
            .ok_or_else(|| MapperError::UnmappableUri(uri.to_string()))
    }

    /// Translates a path to source space through the first matching pair.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnmappablePath`] when no pair matches.
    pub fn dst_to_src(&self, path: &str) -> Result<String, MapperError> {
        self.maps
            .iter()
            .find_map(|map| map.dst_to_src(path))
            .ok_or_else(|| MapperError::UnmappablePath(path.to_string()))
    }

    /// Reports whether any configured pair is unsafe per
    /// [`Map::is_unsafe`].
    #[must_use]
    pub fn unsafe_mapping(&self) -> bool {
        self.maps.iter().any(Map::is_unsafe)
    }
}

impl fmt::Display for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for map in &self.maps {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{map}")?;
            first = false;
        }
        Ok(())
    }
}

fn parse_spec(spec: &str) -> Result<Map, MapperError> {
    let mut parts = spec.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(src), None, _) => Ok(Map::new(src, default_destination(src))),
        (Some(src), Some(dst), None) => Ok(Map::new(src, dst)),
        _ => Err(MapperError::InvalidSpec(spec.to_string())),
    }
}

/// Synthesizes a filesystem-safe relative path from a bare source URI by
/// joining its host and path segments with underscores and squashing any
/// character that is not portable in a filename.
fn default_destination(src: &str) -> String {
    let without_scheme = src
        .split_once("://")
        .map_or(src, |(_, rest)| rest)
        .trim_end_matches('/');
    without_scheme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn strip_trailing_slash(mut value: String) -> String {
    while value.len() > 1 && value.ends_with('/') {
        value.pop();
    }
    value
}

/// Prefix translation: `value` must equal `from` or continue it with a `/`
/// separator; the matched remainder is appended to `to`.
fn translate(value: &str, from: &str, to: &str) -> Option<String> {
    if value == from {
        return Some(to.to_string());
    }
    value
        .strip_prefix(from)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| format!("{to}/{rest}"))
}

fn has_scheme(value: &str) -> bool {
    value.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}
