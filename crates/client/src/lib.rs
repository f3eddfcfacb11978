#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `client` is the orchestration layer of the workspace: the consumer side
//! ([`Client`]) keeps a local tree synchronized with a ResourceSync source,
//! and the producer side ([`Producer`]) publishes a local tree as
//! ResourceSync documents. Both compose the leaf crates — scanning, the
//! sitemap codec and multi-file engine, fetching, digests, and dump
//! packaging — and add only session policy: what to delete, what to verify,
//! where the last-sync state lives.
//!
//! # Design
//!
//! - The consumer's unit of work is one comparator run: scan the
//!   destination, read the source, partition, then act on each partition
//!   with the source winning every conflict. Incremental sync replaces the
//!   comparison with the source's own change list, pruned to the window
//!   since the recorded last sync and collapsed to one event per URI.
//! - All session configuration is explicit. The fetcher owns its bearer
//!   token and pacing; the client owns its deletion/dry-run/verification
//!   switches; nothing is process-global.
//! - [`ClientState`] persists last-sync timestamps per source URI as a
//!   JSON sidecar in the destination root, keeping repeated incremental
//!   runs cheap.
//!
//! # Errors
//!
//! [`ClientError`] passes leaf failures through transparently and adds the
//! engine's own conditions, including the refusal to run over a mapping
//! whose source and destination trees overlap.

mod client;
mod error;
mod producer;
mod state;

pub use client::{Client, SyncReport};
pub use error::ClientError;
pub use producer::Producer;
pub use state::{ClientState, STATE_FILE};
