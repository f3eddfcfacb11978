#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `digests` computes the content digests that decorate ResourceSync
//! records and converts them to and from the sitemap `hash` attribute. One
//! streaming pass over a reader can feed any subset of MD5, SHA-1, and
//! SHA-256 simultaneously.
//!
//! # Design
//!
//! - [`Hasher`] wraps the RustCrypto [`digest::Digest`] implementations and
//!   consumes input in fixed 8 KiB blocks, so digesting a large dump member
//!   never buffers the file.
//! - Wire encoding follows the sitemap dialect: MD5 is standard base64
//!   (RFC 4648 alphabet, padded) of the raw 16 bytes, SHA-1 and SHA-256 are
//!   lowercase hex. [`encode_hash_attr`] space-joins `type:value` tokens
//!   into one attribute value; [`parse_hash_attr`] reverses it.
//!
//! # Errors
//!
//! [`parse_hash_attr`] rejects tokens without a `type:` tag and unknown
//! digest types with [`DigestError`]; tolerating them would silently drop
//! verification data.

use std::collections::BTreeMap;
use std::io::{self, Read};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use digest::Digest as _;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

/// Read block size for streaming digest computation.
const BLOCK_SIZE: usize = 8192;

/// Errors produced while decoding a sitemap `hash` attribute.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DigestError {
    /// A token carried no `type:` tag.
    #[error("hash token '{0}' has no type tag")]
    UntypedToken(String),
    /// A token named a digest type outside md5/sha-1/sha-256.
    #[error("unsupported hash type '{0}'")]
    UnsupportedType(String),
    /// The same digest type appeared twice in one attribute.
    #[error("hash type '{0}' listed more than once")]
    DuplicateType(String),
}

/// Digest kinds understood by the sitemap dialect.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum DigestKind {
    /// MD5, encoded as padded standard base64.
    Md5,
    /// SHA-1, encoded as lowercase hex.
    Sha1,
    /// SHA-256, encoded as lowercase hex.
    Sha256,
}

impl DigestKind {
    /// Returns the `hash` attribute type tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DigestKind::Md5 => "md5",
            DigestKind::Sha1 => "sha-1",
            DigestKind::Sha256 => "sha-256",
        }
    }
}

/// Computed digest values, one field per requested kind.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DigestValues {
    /// MD5 in padded standard base64, when requested.
    pub md5: Option<String>,
    /// SHA-1 in lowercase hex, when requested.
    pub sha1: Option<String>,
    /// SHA-256 in lowercase hex, when requested.
    pub sha256: Option<String>,
}

/// Streaming digest computation over any [`Read`] source.
pub struct Hasher {
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
}

impl Hasher {
    /// Creates a hasher computing the given kinds. Duplicate kinds are
    /// collapsed.
    #[must_use]
    pub fn new(kinds: &[DigestKind]) -> Self {
        Self {
            md5: kinds.contains(&DigestKind::Md5).then(Md5::new),
            sha1: kinds.contains(&DigestKind::Sha1).then(Sha1::new),
            sha256: kinds.contains(&DigestKind::Sha256).then(Sha256::new),
        }
    }

    /// Feeds one block of input.
    pub fn update(&mut self, block: &[u8]) {
        if let Some(md5) = &mut self.md5 {
            md5.update(block);
        }
        if let Some(sha1) = &mut self.sha1 {
            sha1.update(block);
        }
        if let Some(sha256) = &mut self.sha256 {
            sha256.update(block);
        }
    }

    /// Consumes the reader in fixed-size blocks, then finalizes.
    ///
    /// # Errors
    ///
    /// Propagates any [`io::Error`] from the reader.
    pub fn digest_reader<R: Read>(mut self, reader: &mut R) -> io::Result<DigestValues> {
        let mut block = [0u8; BLOCK_SIZE];
        loop {
            let read = reader.read(&mut block)?;
            if read == 0 {
                break;
            }
            self.update(&block[..read]);
        }
        Ok(self.finalize())
    }

    /// Finalizes and encodes the computed digests.
    #[must_use]
    pub fn finalize(self) -> DigestValues {
        DigestValues {
            md5: self.md5.map(|md5| BASE64.encode(md5.finalize())),
            sha1: self.sha1.map(|sha1| hex::encode(sha1.finalize())),
            sha256: self.sha256.map(|sha256| hex::encode(sha256.finalize())),
        }
    }
}

/// Digests a whole byte slice in one call.
#[must_use]
pub fn digest_bytes(kinds: &[DigestKind], bytes: &[u8]) -> DigestValues {
    let mut hasher = Hasher::new(kinds);
    hasher.update(bytes);
    hasher.finalize()
}

/// Digests a file's content, streaming in fixed-size blocks.
///
/// # Errors
///
/// Propagates any [`io::Error`] from opening or reading the file.
pub fn digest_file(kinds: &[DigestKind], path: &std::path::Path) -> io::Result<DigestValues> {
    let mut file = std::fs::File::open(path)?;
    Hasher::new(kinds).digest_reader(&mut file)
}

/// Encodes the populated digests as one space-joined `type:value` attribute
/// value, in `md5`, `sha-1`, `sha-256` order. Returns `None` when every
/// field is empty.
#[must_use]
pub fn encode_hash_attr(
    md5: Option<&str>,
    sha1: Option<&str>,
    sha256: Option<&str>,
) -> Option<String> {
    let mut tokens = Vec::new();
    if let Some(value) = md5 {
        tokens.push(format!("md5:{value}"));
    }
    if let Some(value) = sha1 {
        tokens.push(format!("sha-1:{value}"));
    }
    if let Some(value) = sha256 {
        tokens.push(format!("sha-256:{value}"));
    }
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// Parses a `hash` attribute value back into per-kind digest strings.
///
/// # Errors
///
/// Returns [`DigestError`] for untyped tokens, unknown types, or a type
/// listed more than once.
pub fn parse_hash_attr(value: &str) -> Result<DigestValues, DigestError> {
    let mut seen: BTreeMap<DigestKind, String> = BTreeMap::new();
    for token in value.split_ascii_whitespace() {
        let (tag, digest) = token
            .split_once(':')
            .ok_or_else(|| DigestError::UntypedToken(token.to_string()))?;
        let kind = match tag {
            "md5" => DigestKind::Md5,
            "sha-1" | "sha1" => DigestKind::Sha1,
            "sha-256" | "sha256" => DigestKind::Sha256,
            other => return Err(DigestError::UnsupportedType(other.to_string())),
        };
        if seen.insert(kind, digest.to_string()).is_some() {
            return Err(DigestError::DuplicateType(kind.as_str().to_string()));
        }
    }
    Ok(DigestValues {
        md5: seen.remove(&DigestKind::Md5),
        sha1: seen.remove(&DigestKind::Sha1),
        sha256: seen.remove(&DigestKind::Sha256),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn md5_matches_the_reference_literal() {
        let values = digest_bytes(&[DigestKind::Md5], b"A file\n");
        assert_eq!(values.md5.as_deref(), Some("j912liHgA/48DCHpkptJHg=="));
        assert!(values.sha1.is_none());
        assert!(values.sha256.is_none());
    }

    #[test]
    fn sha_digests_are_lowercase_hex() {
        let values = digest_bytes(&[DigestKind::Sha1, DigestKind::Sha256], b"abc");
        assert_eq!(
            values.sha1.as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            values.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn file_digest_streams_blocks() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        // Larger than one read block so the loop iterates.
        let payload = vec![0x61u8; 3 * 8192 + 17];
        file.write_all(&payload).expect("write");
        let from_file =
            digest_file(&[DigestKind::Md5, DigestKind::Sha256], file.path()).expect("digest");
        let from_bytes = digest_bytes(&[DigestKind::Md5, DigestKind::Sha256], &payload);
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn hash_attr_encodes_in_fixed_order() {
        assert_eq!(
            encode_hash_attr(Some("AAAA=="), None, Some("bbbb")).as_deref(),
            Some("md5:AAAA== sha-256:bbbb")
        );
        assert_eq!(encode_hash_attr(None, None, None), None);
    }

    #[test]
    fn hash_attr_round_trips() {
        let values = parse_hash_attr("md5:j912liHgA/48DCHpkptJHg== sha-256:bbbb").unwrap();
        assert_eq!(values.md5.as_deref(), Some("j912liHgA/48DCHpkptJHg=="));
        assert_eq!(values.sha256.as_deref(), Some("bbbb"));
        assert_eq!(
            encode_hash_attr(
                values.md5.as_deref(),
                values.sha1.as_deref(),
                values.sha256.as_deref()
            )
            .as_deref(),
            Some("md5:j912liHgA/48DCHpkptJHg== sha-256:bbbb")
        );
    }

    #[test]
    fn hash_attr_rejects_untyped_and_unknown_tokens() {
        assert_eq!(
            parse_hash_attr("deadbeef").unwrap_err(),
            DigestError::UntypedToken("deadbeef".to_string())
        );
        assert_eq!(
            parse_hash_attr("crc32:1234").unwrap_err(),
            DigestError::UnsupportedType("crc32".to_string())
        );
        assert_eq!(
            parse_hash_attr("md5:a md5:b").unwrap_err(),
            DigestError::DuplicateType("md5".to_string())
        );
    }

    #[test]
    fn empty_attr_parses_to_no_values() {
        assert_eq!(parse_hash_attr("").unwrap(), DigestValues::default());
    }
}
