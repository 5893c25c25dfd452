use std::collections::BTreeMap;

use bastion_engine::BlobStorage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PlayerHistory {
    #[serde(default)]
    pub(crate) upgrades: Vec<String>,
}

/// Append-only upgrade history. Active modifiers are never stored; they are
/// recomputed from this history and the loot catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PersistedState {
    #[serde(default)]
    pub(crate) player: PlayerHistory,
    #[serde(default)]
    pub(crate) towers: BTreeMap<String, Vec<String>>,
}

impl PersistedState {
    pub(crate) fn tower_history(&self, tower_key: &str) -> &[String] {
        self.towers
            .get(tower_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub(crate) struct PersistenceStore<S> {
    storage: S,
}

impl<S: BlobStorage> PersistenceStore<S> {
    pub(crate) fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Never fails: a missing, unreadable or corrupted blob yields a fresh
    /// empty state so gameplay can always start.
    pub(crate) fn load(&self) -> PersistedState {
        let raw = match self.storage.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("persist_load_empty");
                return PersistedState::default();
            }
            Err(error) => {
                warn!(error = %error, "persist_load_failed");
                return PersistedState::default();
            }
        };

        match parse_persisted_state(&raw) {
            Ok(state) => {
                info!(
                    player_upgrades = state.player.upgrades.len(),
                    towers = state.towers.len(),
                    "persist_loaded"
                );
                state
            }
            Err(reason) => {
                warn!(reason = %reason, "persist_load_corrupt_using_empty_state");
                PersistedState::default()
            }
        }
    }

    /// Best effort. Returns `true` once the state is durable; a failure is
    /// logged and the caller keeps playing on the in-memory state.
    pub(crate) fn save(&self, state: &PersistedState) -> bool {
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(error) => {
                warn!(error = %error, "persist_encode_failed");
                return false;
            }
        };
        match self.storage.write(&json) {
            Ok(()) => {
                debug!(bytes = json.len(), "persist_saved");
                true
            }
            Err(error) => {
                warn!(error = %error, "persist_save_failed");
                false
            }
        }
    }
}

fn parse_persisted_state(raw: &str) -> Result<PersistedState, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let state = match serde_path_to_error::deserialize::<_, PersistedState>(&mut deserializer) {
        Ok(state) => state,
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            return if path.is_empty() || path == "." {
                Err(format!("parse persisted json: {source}"))
            } else {
                Err(format!("parse persisted json at {path}: {source}"))
            };
        }
    };
    deserializer
        .end()
        .map_err(|error| format!("trailing data after persisted json: {error}"))?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use bastion_engine::{FileBlobStorage, MemoryBlobStorage};
    use tempfile::TempDir;

    use super::*;

    fn sample_state() -> PersistedState {
        let mut towers = BTreeMap::new();
        towers.insert(
            "tower_4_7".to_string(),
            vec![
                "powercore_module".to_string(),
                "overclock_chip".to_string(),
            ],
        );
        PersistedState {
            player: PlayerHistory {
                upgrades: vec!["gold_hoard".to_string()],
            },
            towers,
        }
    }

    #[test]
    fn absent_blob_loads_empty_state() {
        let store = PersistenceStore::new(MemoryBlobStorage::default());
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn corrupted_blob_loads_empty_state() {
        for raw in [
            "{not json",
            "[]",
            r#"{"player": 5}"#,
            r#"{"player": {"upgrades": [1, 2]}}"#,
            r#"{"towers": {"t": "powercore_module"}}"#,
            r#"{"player": {"upgrades": []}} trailing"#,
        ] {
            let store = PersistenceStore::new(MemoryBlobStorage::with_blob(raw));
            let state = store.load();
            assert!(state.player.upgrades.is_empty(), "input {raw}");
            assert!(state.towers.is_empty(), "input {raw}");
        }
    }

    #[test]
    fn missing_keys_default_and_unknown_keys_are_ignored() {
        let store = PersistenceStore::new(MemoryBlobStorage::with_blob(
            r#"{"version": 9, "player": {"upgrades": ["gold_hoard"], "nickname": "x"}}"#,
        ));
        let state = store.load();
        assert_eq!(state.player.upgrades, vec!["gold_hoard".to_string()]);
        assert!(state.towers.is_empty());
    }

    #[test]
    fn blob_uses_documented_shape() {
        let storage = MemoryBlobStorage::default();
        let store = PersistenceStore::new(&storage);
        assert!(store.save(&sample_state()));
        let blob: serde_json::Value =
            serde_json::from_str(&storage.blob().expect("blob")).expect("json");
        assert_eq!(
            blob,
            serde_json::json!({
                "player": { "upgrades": ["gold_hoard"] },
                "towers": { "tower_4_7": ["powercore_module", "overclock_chip"] }
            })
        );
    }

    #[test]
    fn save_then_load_through_file_storage() {
        let temp = TempDir::new().expect("temp");
        let store = PersistenceStore::new(FileBlobStorage::new(
            temp.path().join("saves").join("progression.json"),
        ));
        assert!(store.save(&sample_state()));
        assert_eq!(store.load(), sample_state());
    }

    #[test]
    fn failed_save_reports_false_and_keeps_previous_blob() {
        let storage = MemoryBlobStorage::with_blob(r#"{"player":{"upgrades":[]},"towers":{}}"#);
        storage.set_fail_writes(true);
        let store = PersistenceStore::new(&storage);
        assert!(!store.save(&sample_state()));
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn tower_history_defaults_to_empty() {
        let state = sample_state();
        assert_eq!(state.tower_history("tower_4_7").len(), 2);
        assert!(state.tower_history("tower_0_0").is_empty());
    }
}
