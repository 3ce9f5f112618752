//! Versioned persisted state.
//!
//! Documents are plain JSON. Older layouts are brought forward by the ordered
//! steps in [`migrations`] before being deserialized.

pub mod file;
pub mod migrations;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::counter::Counter;
use crate::error::Result;
use crate::registry::TokenGroup;

pub use file::StateFile;
pub use migrations::{CURRENT_VERSION, MigrationContext, migrate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub counters: BTreeMap<String, Counter>,
    #[serde(default)]
    pub groups: BTreeMap<String, TokenGroup>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            counters: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }
}

impl PersistedState {
    /// Migrate a raw document of any known version and deserialize it.
    pub fn from_value(raw: Value, context: &MigrationContext) -> Result<Self> {
        let migrated = migrate(raw, context);
        Ok(serde_json::from_value(migrated)?)
    }

    pub fn from_json(text: &str, context: &MigrationContext) -> Result<Self> {
        let raw: Value = serde_json::from_str(text)?;
        Self::from_value(raw, context)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_documents_load_unchanged() {
        let mut state = PersistedState::default();
        state.counters.insert(
            "hp".to_string(),
            Counter {
                current: 4,
                max: Some(10),
            },
        );
        let text = state.to_json().unwrap();
        let loaded = PersistedState::from_json(&text, &MigrationContext::default()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn legacy_documents_are_migrated_on_load() {
        let legacy = json!({
            "version": 0.3,
            "debug": false,
            "tokens": {
                "coins": {
                    "tokenName": "coins",
                    "counterName": "gold",
                    "imgSrc": "https://x/images/1/thumb.png",
                    "imgIds": ["a", "b"],
                    "top": 40, "left": 50,
                    "width": 30, "height": 30,
                    "spaceX": 30, "spaceY": 30
                }
            }
        });
        let context = MigrationContext::default().with_legacy_surface("page-1");
        let state = PersistedState::from_value(legacy, &context).unwrap();
        assert_eq!(state.version, CURRENT_VERSION);
        let group = &state.groups["coins"];
        assert_eq!(group.image_source, "https://x/images/1/thumb.png");
        assert_eq!(group.spacing_x, 0.0);
        assert_eq!(group.anchor.left, 50.0);
        assert_eq!(group.per_surface["page-1"].instance_ids, vec!["a", "b"]);
    }
}
