#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `sitemap` maps collections to and from the ResourceSync sitemap XML
//! dialect and makes arbitrarily large collections representable as a
//! bounded set of component sitemaps plus one sitemapindex.
//!
//! # Design
//!
//! - [`Codec`] is the event-driven serializer/parser. Serialization emits
//!   the two protocol namespaces, the document `rs:md`/`rs:ln` extensions,
//!   and one `<url>` (or `<sitemap>`) element per entry. Parsing enforces
//!   the structural rules of the dialect — exactly one non-empty `<loc>`,
//!   at most one `<lastmod>` and `<rs:md>` per level, required `rs:ln`
//!   attributes, numeric ranges — and reports the root form it found.
//! - Strictness is two-tier by design. The codec tier warns and continues
//!   when capability declarations merely disagree with a caller hint;
//!   [`Codec::parse_typed`] is the strict tier that rejects documents
//!   lacking the capability its kind requires. The tiers are separate
//!   because producer-side tooling reads documents it just wrote (hints
//!   are authoritative), while consumer-side sync must not act on a
//!   document claiming to be something else.
//! - [`ListWriter`] and [`ListReader`] are the multi-file engine:
//!   splitting honours the entry cap and the 5-digit part naming
//!   convention, rejoining fetches components sequentially in ascending
//!   URI order, resolving them through the [`mapper::Mapper`] when the
//!   index itself was local and optionally enforcing the
//!   [`authority::has_authority`] rule first.
//!
//! # Errors
//!
//! Structural failures surface as [`SitemapError`]; multi-file policy
//! violations as the distinct [`ListError`] so callers can enable
//! multi-file support instead of treating input as corrupt. The
//! wrong-root-form variants carry the parsed document for mode-switching
//! recovery.

pub mod authority;
mod codec;
mod error;
mod multifile;

pub use codec::{Codec, DocumentKind, Parsed, RS_NS, SITEMAP_NS};
pub use error::SitemapError;
pub use multifile::{
    DEFAULT_MAX_SITEMAP_ENTRIES, ListError, ListReader, ListWriter, part_name,
};
