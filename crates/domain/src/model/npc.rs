use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::room::Position;

/// The full record binding an agent to a room, a seat, and a presence
/// snapshot (spec §3 "Assignment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcAssignment {
    pub agent_id: String,
    #[serde(default)]
    pub registry_agent_id: Option<String>,
    #[serde(default)]
    pub office_id: Option<String>,
    pub name: String,
    pub avatar_id: String,
    #[serde(default)]
    pub workstation_id: Option<String>,
    pub position: Position,
    pub role: String,
    #[serde(default)]
    pub computer_id: Option<usize>,
    #[serde(default)]
    pub voice_agent_id: Option<String>,
    pub namespace_slug: String,
    pub room_id: String,
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub agent_metadata: Value,
}

impl NpcAssignment {
    /// The player key this assignment's Player entity lives under
    /// (spec §3 invariant: `players[npc-K]` exists iff this exists).
    pub fn player_key(&self) -> String {
        format!("npc-{}", self.agent_id)
    }

    /// Rebuilds an `upsertNpc` payload from a persisted row, used by
    /// startup rehydration (spec §4.F "Startup rehydration").
    pub fn to_upsert_payload(&self) -> NpcUpsertPayload {
        NpcUpsertPayload {
            agent_id: self.agent_id.clone(),
            registry_agent_id: self.registry_agent_id.clone(),
            office_id: self.office_id.clone(),
            name: self.name.clone(),
            avatar_id: Some(self.avatar_id.clone()),
            workstation_id: self.workstation_id.clone(),
            position: Some(self.position),
            role: Some(self.role.clone()),
            computer_id: self.computer_id,
            voice_agent_id: self.voice_agent_id.clone(),
            agent_metadata: self.agent_metadata.clone(),
        }
    }

    /// `"office secretary"` (any case) normalises to `"GM"`; a blank role
    /// also normalises to `"GM"` (spec §3 NpcAssignment.role).
    pub fn normalise_role(role: Option<&str>) -> String {
        match role.map(str::trim) {
            None => "GM".to_string(),
            Some(r) if r.is_empty() => "GM".to_string(),
            Some(r) if r.eq_ignore_ascii_case("office secretary") => "GM".to_string(),
            Some(r) => r.to_string(),
        }
    }
}

/// Input to `upsertNpc` (spec §4.F).
#[derive(Debug, Clone, Deserialize)]
pub struct NpcUpsertPayload {
    pub agent_id: String,
    #[serde(default)]
    pub registry_agent_id: Option<String>,
    #[serde(default)]
    pub office_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default)]
    pub workstation_id: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub computer_id: Option<usize>,
    #[serde(default)]
    pub voice_agent_id: Option<String>,
    #[serde(default)]
    pub agent_metadata: Value,
}

/// Options controlling side effects of `upsertNpc` (spec §4.F).
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertNpcOptions {
    pub skip_persistence: bool,
    pub skip_registry_sync: bool,
}

/// Input to `updateNpcState` (spec §4.F).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NpcStateUpdate {
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub anim: Option<String>,
    #[serde(default)]
    pub posture: Option<Posture>,
    #[serde(default)]
    pub workstation_id: Option<String>,
    #[serde(default)]
    pub voice_agent_id: Option<String>,
}

impl NpcStateUpdate {
    /// `true` if at least one field was provided — admin API rejects an
    /// empty patch (spec §4.I `persist`).
    pub fn has_any_field(&self) -> bool {
        self.position.is_some()
            || self.anim.is_some()
            || self.posture.is_some()
            || self.workstation_id.is_some()
            || self.voice_agent_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Sit,
    Stand,
}
