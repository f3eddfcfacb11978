//! Consumer engine: applies a source's published state to a local tree.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use tracing::{debug, info, warn};

use digests::DigestKind;
use fetch::Fetcher;
use mapper::Mapper;
use model::{Capability, Change, CompareResult, Resource, ResourceContainer, compare};
use scan::ScanBuilder;
use sitemap::ListReader;

use crate::error::ClientError;
use crate::state::ClientState;

/// Timestamp tolerance for "has this resource changed", absorbing
/// filesystem mtime truncation.
const SYNC_DELTA: f64 = 1.0;

/// Outcome counts of one consumer operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncReport {
    /// Entries already in sync.
    pub same: usize,
    /// Entries fetched because they were absent locally.
    pub created: usize,
    /// Entries re-fetched because they differed.
    pub updated: usize,
    /// Local entries deleted (or eligible for deletion when deletion is
    /// disabled).
    pub deleted: usize,
    /// Entries skipped (deletion disabled, unusable change records).
    pub skipped: usize,
    /// Content bytes fetched.
    pub bytes_fetched: u64,
    /// Whether this run only audited, mutating nothing.
    pub audit_only: bool,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "same={} created={} updated={} deleted={} skipped={} bytes={}",
            self.same, self.created, self.updated, self.deleted, self.skipped, self.bytes_fetched
        )
    }
}

/// Consumer of a ResourceSync source: baseline, incremental, and audit
/// operations against one destination tree.
pub struct Client<'a> {
    fetcher: &'a Fetcher,
    mapper: &'a Mapper,
    checksum: bool,
    delete: bool,
    dryrun: bool,
}

impl<'a> Client<'a> {
    /// Creates a consumer over the given session fetcher and mapping.
    #[must_use]
    pub const fn new(fetcher: &'a Fetcher, mapper: &'a Mapper) -> Self {
        Self {
            fetcher,
            mapper,
            checksum: false,
            delete: false,
            dryrun: false,
        }
    }

    /// Also compares content digests when the source advertises them, and
    /// computes them for local files.
    #[must_use]
    pub const fn checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Permits deletion of local files the source no longer lists.
    #[must_use]
    pub const fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Reports what would change without touching the destination.
    #[must_use]
    pub const fn dryrun(mut self, dryrun: bool) -> Self {
        self.dryrun = dryrun;
        self
    }

    /// Full synchronization against the source's resource list: fetch
    /// created and updated resources, delete (or report) the rest, then
    /// record the completion time in the client state.
    ///
    /// # Errors
    ///
    /// Refuses unsafe mappings up front; otherwise surfaces retrieval,
    /// parse, comparison, and filesystem failures as [`ClientError`].
    pub fn baseline(&self, source_uri: &str) -> Result<SyncReport, ClientError> {
        self.check_mapping()?;
        let source = self.read_source_list(source_uri)?;
        let local = self.scan_destination()?;
        let partitions = compare(&local, &source, SYNC_DELTA)?;
        let mut report = SyncReport {
            same: partitions.same.len(),
            ..SyncReport::default()
        };

        for resource in partitions.created.iter() {
            report.bytes_fetched += self.apply(resource)?;
            report.created += 1;
        }
        for resource in partitions.updated.iter() {
            report.bytes_fetched += self.apply(resource)?;
            report.updated += 1;
        }
        for resource in partitions.deleted.iter() {
            if self.remove(resource)? {
                report.deleted += 1;
            } else {
                report.skipped += 1;
            }
        }
        self.record_completion(source_uri)?;
        info!(source = source_uri, %report, "baseline sync complete");
        Ok(report)
    }

    /// Applies a source's change list: prune to events after the last sync
    /// (or an explicit `from`), collapse duplicates, then apply each change
    /// record with the source winning every conflict.
    ///
    /// # Errors
    ///
    /// As [`Client::baseline`]; additionally fails when pruning by time
    /// over change records without timestamps.
    pub fn incremental(
        &self,
        source_uri: &str,
        from: Option<f64>,
    ) -> Result<SyncReport, ClientError> {
        self.check_mapping()?;
        let reader = ListReader::new(self.fetcher)
            .mapper(self.mapper)
            .hint(Capability::ChangeList);
        let mut changes = reader.read(source_uri, false)?;

        let since = from.or_else(|| {
            self.state_directory()
                .and_then(|directory| ClientState::load(&directory).ok())
                .and_then(|state| state.last_sync(source_uri))
        });
        if let Some(since) = since {
            changes.prune_before(since)?;
        }
        changes.prune_dupes();

        let mut report = SyncReport::default();
        for resource in changes.iter() {
            match resource.change() {
                Some(Change::Created) => {
                    report.bytes_fetched += self.apply(resource)?;
                    report.created += 1;
                }
                Some(Change::Updated) => {
                    report.bytes_fetched += self.apply(resource)?;
                    report.updated += 1;
                }
                Some(Change::Deleted) => {
                    if self.remove(resource)? {
                        report.deleted += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                None => {
                    warn!(uri = resource.uri(), "change list entry without change annotation");
                    report.skipped += 1;
                }
            }
        }
        self.record_completion(source_uri)?;
        info!(source = source_uri, %report, "incremental sync complete");
        Ok(report)
    }

    /// Compares source and destination without mutating anything.
    ///
    /// # Errors
    ///
    /// Surfaces retrieval, parse, and comparison failures as
    /// [`ClientError`].
    pub fn audit(&self, source_uri: &str) -> Result<SyncReport, ClientError> {
        let source = self.read_source_list(source_uri)?;
        let local = self.scan_destination()?;
        let partitions: CompareResult = compare(&local, &source, SYNC_DELTA)?;
        let report = SyncReport {
            same: partitions.same.len(),
            created: partitions.created.len(),
            updated: partitions.updated.len(),
            deleted: partitions.deleted.len(),
            audit_only: true,
            ..SyncReport::default()
        };
        info!(source = source_uri, %report, "audit complete");
        Ok(report)
    }

    fn check_mapping(&self) -> Result<(), ClientError> {
        if self.mapper.unsafe_mapping() {
            return Err(ClientError::UnsafeMapping);
        }
        Ok(())
    }

    /// Reads the source state document. A capability list is followed to
    /// the resource list it advertises.
    fn read_source_list(&self, source_uri: &str) -> Result<ResourceContainer, ClientError> {
        let reader = ListReader::new(self.fetcher).mapper(self.mapper);
        let document = reader.read(source_uri, false)?;
        if document.capability() == Capability::CapabilityList
            && let Some(entry) = document
                .iter()
                .find(|entry| entry.capability() == Some(Capability::ResourceList.as_str()))
        {
            let target = entry.uri().to_string();
            debug!(
                capability_list = source_uri,
                resource_list = %target,
                "following capability list"
            );
            return Ok(reader.read(&target, false)?);
        }
        Ok(document)
    }

    fn scan_destination(&self) -> Result<ResourceContainer, ClientError> {
        let mut builder = ScanBuilder::new(self.mapper);
        if self.checksum {
            builder = builder.digests(&[DigestKind::Md5]);
        }
        Ok(builder.scan()?)
    }

    /// Fetches one resource to its mapped destination. Returns the number
    /// of content bytes fetched (zero on dry runs).
    fn apply(&self, resource: &Resource) -> Result<u64, ClientError> {
        let destination = PathBuf::from(self.mapper.src_to_dst(resource.uri())?);
        if self.dryrun {
            info!(uri = resource.uri(), destination = %destination.display(), "would fetch");
            return Ok(0);
        }
        let document = self.fetcher.open(resource.uri())?;
        if let Some(expected) = resource.length()
            && expected != document.bytes().len() as u64
        {
            warn!(
                uri = resource.uri(),
                expected,
                actual = document.bytes().len(),
                "length mismatch against source record"
            );
        }
        if self.checksum
            && let Some(expected) = resource.md5()
        {
            let actual = digests::digest_bytes(&[DigestKind::Md5], document.bytes());
            if actual.md5.as_deref() != Some(expected) {
                warn!(uri = resource.uri(), "md5 mismatch against source record");
            }
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| ClientError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&destination, document.bytes()).map_err(|source| ClientError::Io {
            path: destination.clone(),
            source,
        })?;
        if let Some(timestamp) = resource.timestamp() {
            let mtime = FileTime::from_unix_time(timestamp as i64, 0);
            filetime::set_file_mtime(&destination, mtime).map_err(|source| ClientError::Io {
                path: destination.clone(),
                source,
            })?;
        }
        debug!(uri = resource.uri(), destination = %destination.display(), "fetched");
        Ok(document.bytes().len() as u64)
    }

    /// Deletes one resource's local file. Returns whether a deletion was
    /// performed (or would be, on dry runs); deletion being disabled skips
    /// instead.
    fn remove(&self, resource: &Resource) -> Result<bool, ClientError> {
        let destination = PathBuf::from(self.mapper.src_to_dst(resource.uri())?);
        if !self.delete {
            info!(
                uri = resource.uri(),
                "deletion disabled; local file retained"
            );
            return Ok(false);
        }
        if self.dryrun {
            info!(uri = resource.uri(), destination = %destination.display(), "would delete");
            return Ok(true);
        }
        match fs::remove_file(&destination) {
            Ok(()) => {
                debug!(destination = %destination.display(), "deleted");
                Ok(true)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                warn!(destination = %destination.display(), "already absent");
                Ok(true)
            }
            Err(source) => Err(ClientError::Io {
                path: destination,
                source,
            }),
        }
    }

    fn state_directory(&self) -> Option<PathBuf> {
        self.mapper
            .maps()
            .first()
            .map(|map| PathBuf::from(map.dst()))
    }

    fn record_completion(&self, source_uri: &str) -> Result<(), ClientError> {
        if self.dryrun {
            return Ok(());
        }
        let Some(directory) = self.state_directory() else {
            return Ok(());
        };
        if !directory.is_dir() {
            return Ok(());
        }
        let mut state = ClientState::load(&directory)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs_f64())
            .unwrap_or(0.0);
        state.set_last_sync(source_uri, now);
        state.save(&directory)
    }
}
