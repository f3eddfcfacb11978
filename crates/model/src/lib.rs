#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `model` holds the in-memory document model for the ResourceSync
//! framework: the [`Resource`] value type, the generic [`ResourceContainer`]
//! collection with its two storage disciplines, the [`Capability`] document
//! kind tags, W3C-Datetime conversion, and the merge-join [`compare()`]
//! operation that partitions two collections into same/updated/deleted/
//! created sets.
//!
//! # Design
//!
//! - [`Resource`] is a plain value: URI plus optional timestamp, length,
//!   digests, change annotation, capability name, local path, and links.
//!   State equality is [`Resource::same_as`] with a caller-chosen timestamp
//!   tolerance.
//! - [`ResourceContainer`] replaces a subclass hierarchy with one container
//!   parameterized by a [`Capability`] tag. The tag fixes the storage
//!   discipline: resource lists, dumps, capability lists, and descriptions
//!   key entries by URI in a `BTreeMap` so canonical ascending iteration is
//!   structural; change lists and change dumps append to a `Vec` and keep
//!   event order, duplicates included.
//! - [`compare()`] is a two-pointer merge-join over canonically ordered
//!   input. It refuses append-only collections and checks ascending order
//!   as the cursors advance, so unsorted input fails fast instead of
//!   mispartitioning.
//!
//! # Invariants
//!
//! - A [`Resource`] URI is never empty.
//! - Unique-keyed collections hold at most one entry per URI; `add` reports
//!   a duplicate as a typed error so callers choose skip, replace, or
//!   propagate — duplicate detection is a result, not control flow.
//! - Iteration order is part of each collection's contract: ascending URI
//!   for keyed storage, insertion order for append-only storage.
//!
//! # Errors
//!
//! Mutation and conversion failures surface as [`ModelError`]; comparison
//! precondition failures as [`CompareError`]. Neither is ever silently
//! recovered.

mod capability;
mod compare;
mod container;
mod error;
mod resource;
pub mod w3c;

pub use capability::{Capability, Storage, UnknownCapability};
pub use compare::{CompareError, CompareResult, compare};
pub use container::{Iter, Metadata, ResourceContainer};
pub use error::ModelError;
pub use resource::{Change, Link, Resource};
