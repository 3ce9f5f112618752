use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use blake3::Hash;

use super::{MigrationContext, PersistedState};
use crate::error::Result;

/// JSON state file that skips writes when the content is unchanged.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    context: MigrationContext,
    fingerprint: Option<Hash>,
}

impl StateFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            context: MigrationContext::default(),
            fingerprint: None,
        }
    }

    pub fn with_context(mut self, context: MigrationContext) -> Self {
        self.context = context;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and migrate the file. A missing file is `Ok(None)`.
    pub fn load(&mut self) -> Result<Option<PersistedState>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let state = PersistedState::from_json(&text, &self.context)?;
        self.fingerprint = Some(blake3::hash(state.to_json()?.as_bytes()));
        Ok(Some(state))
    }

    /// Returns `false` when the serialized state matches the last load or save.
    pub fn save(&mut self, state: &PersistedState) -> Result<bool> {
        let text = state.to_json()?;
        let hash = blake3::hash(text.as_bytes());
        if self.fingerprint.map(|h| h == hash).unwrap_or(false) {
            return Ok(false);
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, text.as_bytes())?;
        fs::rename(&staging, &self.path)?;
        self.fingerprint = Some(hash);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::Counter;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = StateFile::new(dir.path().join("state.json"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn unchanged_state_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut file = StateFile::new(&path);
        let mut state = PersistedState::default();
        state.counters.insert(
            "hp".to_string(),
            Counter {
                current: 2,
                max: None,
            },
        );

        assert!(file.save(&state).unwrap());
        assert!(!file.save(&state).unwrap());

        state.counters.get_mut("hp").unwrap().current = 3;
        assert!(file.save(&state).unwrap());

        let mut reopened = StateFile::new(&path);
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!reopened.save(&loaded).unwrap());
    }
}
