use std::fmt;
use std::str::FromStr;

/// Storage discipline of a collection.
///
/// The discipline is part of the document kind: state documents key entries
/// by URI and iterate in ascending URI order, change documents append and
/// iterate in event order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Storage {
    /// At most one entry per URI; canonical ascending-URI iteration.
    UniqueByUri,
    /// Duplicate URIs permitted; insertion-order iteration.
    AppendOnly,
}

/// Named document role in the ResourceSync framework.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    /// Complete enumeration of a source's resources.
    ResourceList,
    /// Ordered record of resource change events.
    ChangeList,
    /// Enumeration of the capability documents a source offers.
    CapabilityList,
    /// Pointers to packaged resource content archives.
    ResourceDump,
    /// Pointers to packaged change content archives.
    ChangeDump,
    /// Per-archive content listing inside a resource dump.
    ResourceDumpManifest,
    /// Per-archive content listing inside a change dump.
    ChangeDumpManifest,
    /// Well-known description of a source's capability lists.
    Description,
    /// Archived resource lists.
    ResourceListArchive,
    /// Archived change lists.
    ChangeListArchive,
    /// Archived resource dumps.
    ResourceDumpArchive,
    /// Archived change dumps.
    ChangeDumpArchive,
}

impl Capability {
    /// Returns the capability name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Capability::ResourceList => "resourcelist",
            Capability::ChangeList => "changelist",
            Capability::CapabilityList => "capabilitylist",
            Capability::ResourceDump => "resourcedump",
            Capability::ChangeDump => "changedump",
            Capability::ResourceDumpManifest => "resourcedump-manifest",
            Capability::ChangeDumpManifest => "changedump-manifest",
            Capability::Description => "description",
            Capability::ResourceListArchive => "resourcelist-archive",
            Capability::ChangeListArchive => "changelist-archive",
            Capability::ResourceDumpArchive => "resourcedump-archive",
            Capability::ChangeDumpArchive => "changedump-archive",
        }
    }

    /// Returns the storage discipline the document kind mandates.
    #[must_use]
    pub const fn storage(self) -> Storage {
        match self {
            Capability::ChangeList | Capability::ChangeDump | Capability::ChangeDumpManifest => {
                Storage::AppendOnly
            }
            _ => Storage::UniqueByUri,
        }
    }

    /// Reports whether entries of this document kind carry change
    /// annotations.
    #[must_use]
    pub const fn records_changes(self) -> bool {
        matches!(self.storage(), Storage::AppendOnly)
    }

    /// Reports whether the typed parse entry point requires a recognizable
    /// `capability` attribute in the document's `rs:md`.
    ///
    /// Resource lists (and the description / manifest / archive kinds parsed
    /// through them) stay lenient: a bare urlset is a valid resource list.
    #[must_use]
    pub const fn requires_capability_md(self) -> bool {
        matches!(
            self,
            Capability::ChangeList
                | Capability::ResourceDump
                | Capability::ChangeDump
                | Capability::CapabilityList
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a capability name is not part of the framework.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown capability name '{0}'")]
pub struct UnknownCapability(
    /// The unrecognized capability name.
    pub String,
);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "resourcelist" => Ok(Capability::ResourceList),
            "changelist" => Ok(Capability::ChangeList),
            "capabilitylist" => Ok(Capability::CapabilityList),
            "resourcedump" => Ok(Capability::ResourceDump),
            "changedump" => Ok(Capability::ChangeDump),
            "resourcedump-manifest" => Ok(Capability::ResourceDumpManifest),
            "changedump-manifest" => Ok(Capability::ChangeDumpManifest),
            "description" => Ok(Capability::Description),
            "resourcelist-archive" => Ok(Capability::ResourceListArchive),
            "changelist-archive" => Ok(Capability::ChangeListArchive),
            "resourcedump-archive" => Ok(Capability::ResourceDumpArchive),
            "changedump-archive" => Ok(Capability::ChangeDumpArchive),
            other => Err(UnknownCapability(other.to_string())),
        }
    }
}
