use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Registry-declared agent (NPC persona) belonging to an office.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAgent {
    pub id: String,
    pub agent_identifier: String,
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub agent_email: Option<String>,
    /// Free-form metadata; `spawn`/`spawnConfig` sub-objects carry the
    /// room-seating hints consumed by the reconciler (spec §4.H).
    #[serde(default)]
    pub metadata: Value,
}

impl RegistryAgent {
    /// The `spawn` config object to assemble an NPC payload from, falling
    /// back to `spawnConfig`, then to `metadata` itself (spec §4.H).
    pub fn spawn_metadata(&self) -> &Value {
        if let Some(spawn) = self.metadata.get("spawn") {
            if !spawn.is_null() {
                return spawn;
            }
        }
        if let Some(spawn_config) = self.metadata.get("spawnConfig") {
            if !spawn_config.is_null() {
                return spawn_config;
            }
        }
        &self.metadata
    }

    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).and_then(Value::as_str).map(str::to_owned)
    }

    pub fn metadata_bool(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}
