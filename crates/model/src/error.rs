use thiserror::Error;

/// Errors produced by model mutation and conversion operations.
///
/// Each variant is narrow enough for callers to catch-and-skip a single
/// failing resource without abandoning a whole collection build.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ModelError {
    /// A resource was constructed with an empty URI.
    #[error("resource URI must not be empty")]
    EmptyUri,
    /// A resource with the same URI is already present in a unique-keyed
    /// collection and replacement was not requested.
    #[error("resource '{uri}' already present in {capability} collection")]
    DuplicateUri {
        /// URI of the rejected resource.
        uri: String,
        /// Capability name of the collection that rejected it.
        capability: &'static str,
    },
    /// A change annotation token was outside `created`/`updated`/`deleted`.
    #[error("unknown change type '{0}'")]
    UnknownChange(String),
    /// A timestamp-based operation found an entry without a timestamp.
    #[error("resource '{uri}' has no timestamp")]
    MissingTimestamp {
        /// URI of the entry lacking a timestamp.
        uri: String,
    },
    /// A datetime string did not match any accepted W3C-Datetime profile.
    #[error("invalid W3C-Datetime '{0}'")]
    InvalidDatetime(String),
}

#[cfg(test)]
mod tests {
    use super::ModelError;

    #[test]
    fn duplicate_uri_names_collection_kind() {
        let error = ModelError::DuplicateUri {
            uri: "http://example.com/a".into(),
            capability: "resourcelist",
        };
        assert_eq!(
            error.to_string(),
            "resource 'http://example.com/a' already present in resourcelist collection"
        );
    }

    #[test]
    fn unknown_change_echoes_token() {
        assert_eq!(
            ModelError::UnknownChange("renamed".into()).to_string(),
            "unknown change type 'renamed'"
        );
    }
}
