//! Last-sync timestamp persistence for the consumer.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClientError;

/// Name of the state sidecar kept in the destination root.
pub const STATE_FILE: &str = ".resync-client-state.json";

/// Per-destination record of when each source was last synchronized.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClientState {
    last_sync: BTreeMap<String, f64>,
}

impl ClientState {
    /// Loads the state sidecar from a destination root. A missing file is
    /// an empty state, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the file exists but cannot be read or
    /// decoded.
    pub fn load(directory: &Path) -> Result<Self, ClientError> {
        let path = directory.join(STATE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ClientError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ClientError::State { path, source })
    }

    /// Writes the state sidecar into a destination root.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] when the file cannot be written.
    pub fn save(&self, directory: &Path) -> Result<(), ClientError> {
        let path = directory.join(STATE_FILE);
        let content = serde_json::to_string_pretty(self).map_err(|source| ClientError::State {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content).map_err(|source| ClientError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "saved client state");
        Ok(())
    }

    /// Returns the last-sync timestamp recorded for a source URI.
    #[must_use]
    pub fn last_sync(&self, uri: &str) -> Option<f64> {
        self.last_sync.get(uri).copied()
    }

    /// Records a sync completion timestamp for a source URI.
    pub fn set_last_sync<U: Into<String>>(&mut self, uri: U, timestamp: f64) {
        self.last_sync.insert(uri.into(), timestamp);
    }

    /// Returns the state file path under a destination root.
    #[must_use]
    pub fn path_in(directory: &Path) -> PathBuf {
        directory.join(STATE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_loads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = ClientState::load(temp.path()).expect("load");
        assert_eq!(state.last_sync("http://example.com/rl.xml"), None);
    }

    #[test]
    fn state_round_trips_through_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut state = ClientState::default();
        state.set_last_sync("http://example.com/rl.xml", 1_357_203_600.5);
        state.save(temp.path()).expect("save");

        let reloaded = ClientState::load(temp.path()).expect("load");
        assert_eq!(
            reloaded.last_sync("http://example.com/rl.xml"),
            Some(1_357_203_600.5)
        );
    }

    #[test]
    fn corrupt_state_is_a_typed_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(ClientState::path_in(temp.path()), "not json").expect("write");
        let error = ClientState::load(temp.path()).unwrap_err();
        assert!(matches!(error, ClientError::State { .. }));
    }
}
