use std::collections::BTreeMap;
use std::collections::btree_map;
use std::slice;

use tracing::debug;

use crate::capability::{Capability, Storage};
use crate::error::ModelError;
use crate::resource::{Change, Link, Resource};

/// Document-level metadata carried in the root `rs:md` element.
///
/// Timestamps are epoch-second floats; the codec renders them as
/// W3C-Datetime attributes. `capability` holds the string actually written
/// to (or read from) the document, which for freshly built collections is
/// stamped from the container's [`Capability`] tag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// Capability name attribute, if the document declares one.
    pub capability: Option<String>,
    /// Collection state time (`at`).
    pub at: Option<f64>,
    /// Completion time of the enumeration (`completed`).
    pub completed: Option<f64>,
    /// Start of the covered interval (`from`).
    pub from: Option<f64>,
    /// End of the covered interval (`until`).
    pub until: Option<f64>,
}

impl Metadata {
    /// Reports whether no field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.capability.is_none()
            && self.at.is_none()
            && self.completed.is_none()
            && self.from.is_none()
            && self.until.is_none()
    }
}

enum Store {
    Keyed(BTreeMap<String, Resource>),
    Ordered(Vec<Resource>),
}

/// In-memory model of one ResourceSync document: an ordered or keyed set of
/// [`Resource`]s plus document metadata and links.
///
/// The document kind is a [`Capability`] tag rather than a type hierarchy;
/// the tag fixes the storage discipline (unique-by-URI with canonical
/// ascending iteration, or append-only with insertion-order iteration) and
/// drives codec behaviour.
pub struct ResourceContainer {
    capability: Capability,
    uri: Option<String>,
    md: Metadata,
    ln: Vec<Link>,
    store: Store,
}

impl ResourceContainer {
    /// Creates an empty collection of the given kind, stamping the kind's
    /// capability name into the document metadata.
    #[must_use]
    pub fn new(capability: Capability) -> Self {
        let store = match capability.storage() {
            Storage::UniqueByUri => Store::Keyed(BTreeMap::new()),
            Storage::AppendOnly => Store::Ordered(Vec::new()),
        };
        Self {
            capability,
            uri: None,
            md: Metadata {
                capability: Some(capability.as_str().to_string()),
                ..Metadata::default()
            },
            ln: Vec::new(),
            store,
        }
    }

    /// Creates an empty collection parsed from the wild: same storage
    /// discipline, but no capability stamped into the metadata until the
    /// document declares one.
    #[must_use]
    pub fn new_unstamped(capability: Capability) -> Self {
        let mut container = Self::new(capability);
        container.md.capability = None;
        container
    }

    /// Sets the URI identifying the document itself.
    #[must_use]
    pub fn with_uri<U: Into<String>>(mut self, uri: U) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Returns the document kind tag.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.capability
    }

    /// Returns the storage discipline in force.
    #[must_use]
    pub const fn storage(&self) -> Storage {
        match self.store {
            Store::Keyed(_) => Storage::UniqueByUri,
            Store::Ordered(_) => Storage::AppendOnly,
        }
    }

    /// Returns the URI identifying the document, if known.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Replaces the URI identifying the document.
    pub fn set_uri(&mut self, uri: Option<String>) {
        self.uri = uri;
    }

    /// Returns the document metadata.
    #[must_use]
    pub const fn md(&self) -> &Metadata {
        &self.md
    }

    /// Returns the document metadata for mutation.
    pub const fn md_mut(&mut self) -> &mut Metadata {
        &mut self.md
    }

    /// Returns the document-level links.
    #[must_use]
    pub fn ln(&self) -> &[Link] {
        &self.ln
    }

    /// Appends a document-level link.
    pub fn add_ln(&mut self, link: Link) {
        self.ln.push(link);
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.store {
            Store::Keyed(map) => map.len(),
            Store::Ordered(list) => list.len(),
        }
    }

    /// Reports whether the collection has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds one resource.
    ///
    /// # Errors
    ///
    /// For unique-keyed collections, returns [`ModelError::DuplicateUri`]
    /// when an entry with the same URI is already present; use
    /// [`ResourceContainer::add_replace`] to overwrite instead. Append-only
    /// collections accept every entry.
    pub fn add(&mut self, resource: Resource) -> Result<(), ModelError> {
        match &mut self.store {
            Store::Keyed(map) => {
                if map.contains_key(resource.uri()) {
                    return Err(ModelError::DuplicateUri {
                        uri: resource.uri().to_string(),
                        capability: self.capability.as_str(),
                    });
                }
                map.insert(resource.uri().to_string(), resource);
                Ok(())
            }
            Store::Ordered(list) => {
                list.push(resource);
                Ok(())
            }
        }
    }

    /// Adds one resource, overwriting any entry with the same URI.
    ///
    /// Returns the displaced entry when one existed. Append-only collections
    /// never displace.
    pub fn add_replace(&mut self, resource: Resource) -> Option<Resource> {
        match &mut self.store {
            Store::Keyed(map) => map.insert(resource.uri().to_string(), resource),
            Store::Ordered(list) => {
                list.push(resource);
                None
            }
        }
    }

    /// Adds every resource from the iterator, stopping at the first failure.
    ///
    /// Returns the number of entries added.
    pub fn add_iter<I>(&mut self, resources: I) -> Result<usize, ModelError>
    where
        I: IntoIterator<Item = Resource>,
    {
        let mut added = 0;
        for resource in resources {
            self.add(resource)?;
            added += 1;
        }
        Ok(added)
    }

    /// Looks up an entry by URI. Always `None` for append-only collections,
    /// which may hold several entries per URI.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&Resource> {
        match &self.store {
            Store::Keyed(map) => map.get(uri),
            Store::Ordered(_) => None,
        }
    }

    /// Reports whether any entry carries the given URI.
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        match &self.store {
            Store::Keyed(map) => map.contains_key(uri),
            Store::Ordered(list) => list.iter().any(|resource| resource.uri() == uri),
        }
    }

    /// Iterates the entries in the collection's canonical order: ascending
    /// URI for unique-keyed collections, insertion order for append-only
    /// ones.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: match &self.store {
                Store::Keyed(map) => IterInner::Keyed(map.values()),
                Store::Ordered(list) => IterInner::Ordered(list.iter()),
            },
        }
    }

    /// Drops every entry whose timestamp is earlier than `timestamp`.
    ///
    /// Returns the number of entries dropped.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::MissingTimestamp`] before mutating anything
    /// if any entry has no timestamp; pruning by time over undated entries
    /// would silently guess.
    pub fn prune_before(&mut self, timestamp: f64) -> Result<usize, ModelError> {
        if let Some(undated) = self.iter().find(|resource| resource.timestamp().is_none()) {
            return Err(ModelError::MissingTimestamp {
                uri: undated.uri().to_string(),
            });
        }
        let before = self.len();
        let keep = |resource: &Resource| resource.timestamp().is_some_and(|t| t >= timestamp);
        match &mut self.store {
            Store::Keyed(map) => map.retain(|_, resource| keep(resource)),
            Store::Ordered(list) => list.retain(keep),
        }
        let dropped = before - self.len();
        debug!(dropped, cutoff = timestamp, "pruned entries before cutoff");
        Ok(dropped)
    }

    /// Collapses an append-only change sequence so only the most recent
    /// entry per URI survives.
    ///
    /// When the earliest entry for a URI is `created` and the latest is
    /// `deleted`, every entry for that URI is removed: from the observer's
    /// perspective the resource never existed. Unique-keyed collections have
    /// no duplicates to collapse and are left untouched.
    ///
    /// Returns the number of entries removed.
    pub fn prune_dupes(&mut self) -> usize {
        let Store::Ordered(list) = &mut self.store else {
            return 0;
        };
        let mut first_change: BTreeMap<&str, Option<Change>> = BTreeMap::new();
        let mut last_index: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, resource) in list.iter().enumerate() {
            first_change
                .entry(resource.uri())
                .or_insert_with(|| resource.change());
            last_index.insert(resource.uri(), index);
        }
        let mut keep = vec![false; list.len()];
        for (index, resource) in list.iter().enumerate() {
            if last_index.get(resource.uri()) != Some(&index) {
                continue;
            }
            let born_here = first_change.get(resource.uri()) == Some(&Some(Change::Created));
            let dead_now = resource.change() == Some(Change::Deleted);
            keep[index] = !(born_here && dead_now);
        }
        let before = list.len();
        let mut index = 0;
        list.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
        let removed = before - list.len();
        debug!(removed, "collapsed duplicate change entries");
        removed
    }
}

enum IterInner<'a> {
    Keyed(btree_map::Values<'a, String, Resource>),
    Ordered(slice::Iter<'a, Resource>),
}

/// Iterator over a collection's entries in canonical order.
pub struct Iter<'a> {
    inner: IterInner<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Resource;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Keyed(values) => values.next(),
            IterInner::Ordered(entries) => entries.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            IterInner::Keyed(values) => values.size_hint(),
            IterInner::Ordered(entries) => entries.size_hint(),
        }
    }
}

impl<'a> IntoIterator for &'a ResourceContainer {
    type Item = &'a Resource;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for ResourceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceContainer")
            .field("capability", &self.capability)
            .field("uri", &self.uri)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(uri: &str, timestamp: f64) -> Resource {
        Resource::new(uri)
            .expect("valid uri")
            .with_timestamp(timestamp)
    }

    fn change(uri: &str, change: Change, timestamp: f64) -> Resource {
        resource(uri, timestamp).with_change(change)
    }

    #[test]
    fn keyed_add_rejects_duplicates() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        list.add(resource("http://example.com/a", 1.0)).unwrap();
        let error = list.add(resource("http://example.com/a", 2.0)).unwrap_err();
        assert!(matches!(error, ModelError::DuplicateUri { .. }));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn keyed_add_replace_overwrites() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        list.add(resource("http://example.com/a", 1.0)).unwrap();
        let displaced = list.add_replace(resource("http://example.com/a", 2.0));
        assert_eq!(displaced.unwrap().timestamp(), Some(1.0));
        assert_eq!(list.get("http://example.com/a").unwrap().timestamp(), Some(2.0));
    }

    #[test]
    fn keyed_iteration_is_ascending_by_uri() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        for uri in ["http://example.com/c", "http://example.com/a", "http://example.com/b"] {
            list.add(resource(uri, 1.0)).unwrap();
        }
        let uris: Vec<&str> = list.iter().map(Resource::uri).collect();
        assert_eq!(
            uris,
            vec![
                "http://example.com/a",
                "http://example.com/b",
                "http://example.com/c",
            ]
        );
    }

    #[test]
    fn append_only_keeps_duplicates_in_insertion_order() {
        let mut changes = ResourceContainer::new(Capability::ChangeList);
        changes.add(change("http://example.com/a", Change::Created, 1.0)).unwrap();
        changes.add(change("http://example.com/b", Change::Created, 2.0)).unwrap();
        changes.add(change("http://example.com/a", Change::Updated, 3.0)).unwrap();
        assert_eq!(changes.len(), 3);
        let uris: Vec<&str> = changes.iter().map(Resource::uri).collect();
        assert_eq!(
            uris,
            vec!["http://example.com/a", "http://example.com/b", "http://example.com/a"]
        );
        assert!(changes.get("http://example.com/a").is_none());
        assert!(changes.contains("http://example.com/a"));
    }

    #[test]
    fn new_collection_stamps_capability_metadata() {
        let list = ResourceContainer::new(Capability::ChangeList);
        assert_eq!(list.md().capability.as_deref(), Some("changelist"));
        assert!(ResourceContainer::new_unstamped(Capability::ResourceList)
            .md()
            .is_empty());
    }

    #[test]
    fn prune_before_drops_older_entries() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        list.add(resource("http://example.com/old", 10.0)).unwrap();
        list.add(resource("http://example.com/new", 20.0)).unwrap();
        assert_eq!(list.prune_before(15.0).unwrap(), 1);
        assert!(list.contains("http://example.com/new"));
        assert!(!list.contains("http://example.com/old"));
    }

    #[test]
    fn prune_before_keeps_entries_at_the_cutoff() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        list.add(resource("http://example.com/a", 15.0)).unwrap();
        assert_eq!(list.prune_before(15.0).unwrap(), 0);
    }

    #[test]
    fn prune_before_fails_on_missing_timestamp_without_mutating() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        list.add(resource("http://example.com/a", 10.0)).unwrap();
        list.add(Resource::new("http://example.com/undated").unwrap())
            .unwrap();
        let error = list.prune_before(15.0).unwrap_err();
        assert!(matches!(error, ModelError::MissingTimestamp { ref uri } if uri.contains("undated")));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn prune_dupes_keeps_latest_entry_per_uri() {
        let mut changes = ResourceContainer::new(Capability::ChangeList);
        changes.add(change("http://example.com/a", Change::Created, 1.0)).unwrap();
        changes.add(change("http://example.com/a", Change::Updated, 2.0)).unwrap();
        changes.add(change("http://example.com/b", Change::Updated, 2.0)).unwrap();
        assert_eq!(changes.prune_dupes(), 1);
        assert_eq!(changes.len(), 2);
        let survivor = changes.iter().next().unwrap();
        assert_eq!(survivor.uri(), "http://example.com/a");
        assert_eq!(survivor.change(), Some(Change::Updated));
        assert_eq!(survivor.timestamp(), Some(2.0));
    }

    #[test]
    fn prune_dupes_collapses_create_then_delete_to_nothing() {
        let mut changes = ResourceContainer::new(Capability::ChangeList);
        changes.add(change("http://example.com/a", Change::Created, 1.0)).unwrap();
        changes.add(change("http://example.com/a", Change::Updated, 2.0)).unwrap();
        changes.add(change("http://example.com/a", Change::Deleted, 3.0)).unwrap();
        changes.add(change("http://example.com/b", Change::Updated, 2.0)).unwrap();
        assert_eq!(changes.prune_dupes(), 3);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.iter().next().unwrap().uri(), "http://example.com/b");
    }

    #[test]
    fn prune_dupes_keeps_delete_of_preexisting_resource() {
        let mut changes = ResourceContainer::new(Capability::ChangeList);
        changes.add(change("http://example.com/a", Change::Updated, 1.0)).unwrap();
        changes.add(change("http://example.com/a", Change::Deleted, 2.0)).unwrap();
        assert_eq!(changes.prune_dupes(), 1);
        assert_eq!(changes.iter().next().unwrap().change(), Some(Change::Deleted));
    }

    #[test]
    fn prune_dupes_is_a_no_op_for_keyed_collections() {
        let mut list = ResourceContainer::new(Capability::ResourceList);
        list.add(resource("http://example.com/a", 1.0)).unwrap();
        assert_eq!(list.prune_dupes(), 0);
        assert_eq!(list.len(), 1);
    }
}
