//! Sorted merge-join comparison between two collections.

use thiserror::Error;

use crate::capability::{Capability, Storage};
use crate::container::ResourceContainer;
use crate::resource::Resource;

/// Errors produced when the comparison preconditions do not hold.
///
/// The merge-join silently mispartitions on unsorted input, so both failure
/// modes are loud: append-only collections are rejected by kind, and a
/// strict-ascending cursor check backstops the structural guarantee.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CompareError {
    /// An append-only collection (a change list) was offered as input.
    #[error("cannot compare {0} collections: entries are not in URI order")]
    AppendOnlyInput(&'static str),
    /// An input yielded URIs out of strict ascending order.
    #[error("input not in strict ascending URI order at '{uri}'")]
    UnsortedInput {
        /// First URI observed out of order.
        uri: String,
    },
}

/// Four-way partition produced by [`compare`].
///
/// The sets are pairwise disjoint and their URIs partition the union of both
/// inputs' URIs. Entries in `same` and `updated` are taken from `src`, the
/// reference state.
#[derive(Debug)]
pub struct CompareResult {
    /// Present in both with equal state.
    pub same: ResourceContainer,
    /// Present in both with differing state.
    pub updated: ResourceContainer,
    /// Present in `dst` only.
    pub deleted: ResourceContainer,
    /// Present in `src` only.
    pub created: ResourceContainer,
}

/// Partitions `dst` (current state) against `src` (reference state).
///
/// Timestamps within `delta` seconds count as equal, letting callers absorb
/// filesystem mtime truncation; pass `0.0` for strict equality.
///
/// # Errors
///
/// Returns [`CompareError`] when either input is append-only or yields URIs
/// out of strict ascending order.
pub fn compare(
    dst: &ResourceContainer,
    src: &ResourceContainer,
    delta: f64,
) -> Result<CompareResult, CompareError> {
    for input in [dst, src] {
        if input.storage() == Storage::AppendOnly {
            return Err(CompareError::AppendOnlyInput(input.capability().as_str()));
        }
    }

    let mut result = CompareResult {
        same: ResourceContainer::new(Capability::ResourceList),
        updated: ResourceContainer::new(Capability::ResourceList),
        deleted: ResourceContainer::new(Capability::ResourceList),
        created: ResourceContainer::new(Capability::ResourceList),
    };

    let mut dst_iter = Ascending::new(dst.iter());
    let mut src_iter = Ascending::new(src.iter());
    let mut dst_cur = dst_iter.next()?;
    let mut src_cur = src_iter.next()?;

    loop {
        match (dst_cur, src_cur) {
            (Some(d), Some(s)) => {
                if d.uri() == s.uri() {
                    if d.same_as(s, delta) {
                        result.same.add_replace(s.clone());
                    } else {
                        result.updated.add_replace(s.clone());
                    }
                    dst_cur = dst_iter.next()?;
                    src_cur = src_iter.next()?;
                } else if d.uri() < s.uri() {
                    result.deleted.add_replace(d.clone());
                    dst_cur = dst_iter.next()?;
                } else {
                    result.created.add_replace(s.clone());
                    src_cur = src_iter.next()?;
                }
            }
            (Some(d), None) => {
                result.deleted.add_replace(d.clone());
                dst_cur = dst_iter.next()?;
            }
            (None, Some(s)) => {
                result.created.add_replace(s.clone());
                src_cur = src_iter.next()?;
            }
            (None, None) => break,
        }
    }

    Ok(result)
}

/// Cursor wrapper enforcing strict ascending URI order as it advances.
struct Ascending<I> {
    inner: I,
    previous: Option<String>,
}

impl<'a, I: Iterator<Item = &'a Resource>> Ascending<I> {
    fn new(inner: I) -> Self {
        Self {
            inner,
            previous: None,
        }
    }

    fn next(&mut self) -> Result<Option<&'a Resource>, CompareError> {
        let Some(resource) = self.inner.next() else {
            return Ok(None);
        };
        if let Some(previous) = &self.previous
            && previous.as_str() >= resource.uri()
        {
            return Err(CompareError::UnsortedInput {
                uri: resource.uri().to_string(),
            });
        }
        self.previous = Some(resource.uri().to_string());
        Ok(Some(resource))
    }
}
