//! Registry reconciliation loop (spec §4.H): bootstrap clears local state
//! and rebuilds it from the Registry, then a periodic tick keeps rooms and
//! NPC seating in sync with whatever the Registry currently says exists.
//!
//! The periodic-background-task shape (interval loop + reentrancy guard
//! via swapped `AtomicBool`) is the teacher's pattern for its own
//! background maintenance loops, generalised here since a slow tick
//! (Registry latency) must not let two ticks run concurrently.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use presence_domain::config::RegistryConfig;
use presence_domain::error::Result;
use presence_domain::model::{NpcUpsertPayload, RegistryAgent, RegistryOffice};
use presence_domain::model::UpsertNpcOptions;
use presence_domain::trace::TraceEvent;
use presence_registry_client::RegistryClient;
use presence_store::Store;

use crate::directory::RoomDirectory;
use crate::room::CreateRoomOptions;

pub struct Reconciler {
    directory: Arc<RoomDirectory>,
    registry: Arc<RegistryClient>,
    store: Arc<Store>,
    config: RegistryConfig,
    in_flight: AtomicBool,
}

impl Reconciler {
    pub fn new(
        directory: Arc<RoomDirectory>,
        registry: Arc<RegistryClient>,
        store: Arc<Store>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            directory,
            registry,
            store,
            config,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Startup bootstrap (spec §4.H "Bootstrap"): wipe local rooms/npcs —
    /// the Registry is authoritative — then run one reconciliation pass to
    /// rebuild state before the gateway starts accepting connections.
    pub async fn bootstrap(&self) -> Result<()> {
        self.store.clear_all_rooms()?;
        self.store.clear_all_npcs()?;
        self.ensure_registry_rooms().await;
        Ok(())
    }

    /// Spawns the periodic tick loop on the current Tokio runtime. Returns
    /// immediately; the loop runs until the process exits.
    pub fn run_periodic(self: Arc<Self>) {
        let interval = Duration::from_millis(self.config.sync_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; bootstrap already ran once
            loop {
                ticker.tick().await;
                self.ensure_registry_rooms().await;
            }
        });
    }

    async fn ensure_registry_rooms(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("skipping reconcile tick — previous tick still in flight");
            return;
        }
        let result = self.ensure_registry_rooms_inner().await;
        self.in_flight.store(false, Ordering::Release);
        if let Err(e) = result {
            tracing::warn!(error = %e, "reconcile tick failed");
        }
    }

    async fn ensure_registry_rooms_inner(&self) -> Result<()> {
        let offices = self.registry.list_offices().await;

        let mut valid = HashSet::new();
        for office in &offices {
            valid.insert(office.slug());
            if let Some(domain) = office.domain_lower() {
                valid.insert(domain.clone());
                if let Some(head) = domain.split('.').next() {
                    valid.insert(head.to_string());
                }
            }
        }

        let mut rooms_created = 0;
        for office in &offices {
            let slug = office.slug();
            if slug.is_empty() {
                continue;
            }
            if self.directory.get_by_namespace(&slug).is_none() {
                match self
                    .directory
                    .create_room(CreateRoomOptions::registry_backed(office))
                    .await
                {
                    Ok(_) => rooms_created += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, office_id = %office.office_id, "failed to create registry-backed room");
                        continue;
                    }
                }
            }

            // Always (re)schedule the agent sync, even for a room that
            // already existed — there's no cheap diff of "did agents
            // change", so every tick just re-patches (spec §9 Open
            // Question (a): intentional, not a missing optimisation).
            let directory = self.directory.clone();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let office = office.clone();
            let default_voice_agent_id = self.config.default_voice_agent_id.clone();
            tokio::spawn(async move {
                schedule_registry_agent_sync(directory, registry, store, office, default_voice_agent_id).await;
            });
        }

        let pruned = self.directory.prune_namespaces_not_in(&valid);

        TraceEvent::ReconcileTick {
            offices: offices.len(),
            rooms_created,
            rooms_pruned: pruned.removed_rooms,
        }
        .emit();

        Ok(())
    }
}

const SYNC_POLL_MAX_ATTEMPTS: u32 = 8;
const SYNC_POLL_MAX_BACKOFF_MS: u64 = 3000;

/// Waits for `office`'s room to be visible in the directory (it may still
/// be in the middle of being created by a concurrent tick), then fetches
/// its agents from the Registry and upserts an NPC per agent. The upsert
/// skips persistence (not `skip_registry_sync`, since we just pulled this
/// from the Registry — saving it back would be a no-op round trip) so a
/// local `store.save_npc` is called explicitly afterward instead.
async fn schedule_registry_agent_sync(
    directory: Arc<RoomDirectory>,
    registry: Arc<RegistryClient>,
    store: Arc<Store>,
    office: RegistryOffice,
    default_voice_agent_id: String,
) {
    let slug = office.slug();
    let mut room = directory.get_by_namespace(&slug);
    let mut attempt: u32 = 0;
    while room.is_none() && attempt < SYNC_POLL_MAX_ATTEMPTS {
        attempt += 1;
        let backoff = (500 * attempt as u64).min(SYNC_POLL_MAX_BACKOFF_MS);
        tokio::time::sleep(Duration::from_millis(backoff)).await;
        room = directory.get_by_namespace(&slug);
    }
    let Some(room) = room else {
        tracing::warn!(office_id = %office.office_id, "room for office never appeared; skipping agent sync");
        return;
    };

    let agents = registry.list_agents(&office.office_id).await;
    for agent in &agents {
        let payload = build_npc_payload(&office, agent, &default_voice_agent_id);
        match room
            .upsert_npc(
                payload,
                UpsertNpcOptions {
                    skip_persistence: true,
                    skip_registry_sync: false,
                },
            )
            .await
        {
            Ok(assignment) => {
                if let Err(e) = store.save_npc(&assignment) {
                    tracing::warn!(error = %e, agent_id = %assignment.agent_id, "failed to persist synced npc");
                }
            }
            Err(e) => tracing::warn!(error = %e, agent_id = %agent.id, "failed to upsert npc during registry sync"),
        }
    }
}

/// Derives the identifier-priority chain (spec §4.H): explicit agent
/// domain/identifier fields on the office/agent metadata win over the
/// agent's own id, and a bare label gets composed with the office's
/// domain (or `slug.base_domain` if the office has none).
pub fn derive_agent_identifier(office: &RegistryOffice, agent: &RegistryAgent, base_domain: &str) -> String {
    let candidate = office
        .metadata
        .get("defaultAgentDomain")
        .and_then(|v| v.as_str())
        .or_else(|| office.metadata.get("agentDomain").and_then(|v| v.as_str()))
        .or_else(|| office.metadata.get("domain").and_then(|v| v.as_str()))
        .map(str::to_string)
        .or_else(|| {
            if agent.agent_identifier.trim().is_empty() {
                None
            } else {
                Some(agent.agent_identifier.clone())
            }
        })
        .or_else(|| office.metadata.get("defaultAgentId").and_then(|v| v.as_str()).map(str::to_string))
        .or_else(|| office.metadata.get("agentIdentifier").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| agent.id.clone());

    if candidate.contains('.') {
        return candidate.to_lowercase();
    }

    let label = sanitise_label(&candidate);
    match office.domain_lower() {
        Some(domain) => format!("{label}.{domain}"),
        None => format!("{label}.{}.{base_domain}", office.slug()),
    }
}

/// Lowercases, replaces non-alphanumeric runs with a single `-`, and trims
/// leading/trailing `-` (spec §4.H "sanitise to a label").
pub fn sanitise_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    let mut last_was_dash = false;
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            label.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            label.push('-');
            last_was_dash = true;
        }
    }
    label.trim_matches('-').to_string()
}

/// Assembles an `upsertNpc` payload for an agent during registry sync
/// (spec §4.H "NPC payload assembly").
pub fn build_npc_payload(office: &RegistryOffice, agent: &RegistryAgent, default_voice_agent_id: &str) -> NpcUpsertPayload {
    let spawn = agent.spawn_metadata();
    let position = spawn
        .get("position")
        .and_then(|p| serde_json::from_value(p.clone()).ok())
        .unwrap_or(presence_domain::model::Position { x: 800.0, y: 200.0 });
    let workstation_id = spawn
        .get("workstationId")
        .and_then(|v| v.as_str())
        .unwrap_or("design-studio")
        .to_string();
    let role = agent.role.clone().unwrap_or_else(|| "GM".to_string());
    let voice_agent_id = spawn
        .get("voiceAgentId")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| agent.agent_email.clone())
        .or_else(|| Some(default_voice_agent_id.to_string()));

    let is_default = office.default_agent_id().as_deref() == Some(agent.id.as_str()) || agent.metadata_bool("default");

    let display_name = spawn
        .get("displayName")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| agent.agent_identifier.clone());
    let nickname = spawn
        .get("nickname")
        .and_then(|v| v.as_str())
        .or_else(|| spawn.get("alias").and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| display_name.clone());

    let agent_identifier = derive_agent_identifier(office, agent, &office.slug());

    let mut metadata = agent.metadata.clone();
    if !metadata.is_object() {
        metadata = serde_json::Value::Object(Default::default());
    }
    let obj = metadata.as_object_mut().expect("forced to object above");
    obj.insert("displayName".into(), serde_json::json!(display_name));
    obj.insert("nickname".into(), serde_json::json!(nickname));
    if let Some(email) = &agent.agent_email {
        obj.insert("defaultAgentEmail".into(), serde_json::json!(email));
    }
    if is_default {
        obj.insert("default".into(), serde_json::json!(true));
        obj.insert("defaultAgentId".into(), serde_json::json!(agent.id));
        if let Some(domain) = office.domain_lower() {
            obj.insert("defaultAgentDomain".into(), serde_json::json!(domain));
            obj.insert("agentDomain".into(), serde_json::json!(agent_identifier));
        }
    }

    NpcUpsertPayload {
        agent_id: agent_identifier,
        registry_agent_id: Some(agent.id.clone()),
        office_id: Some(office.office_id.clone()),
        name: display_name,
        avatar_id: agent.avatar_id.clone(),
        workstation_id: Some(workstation_id),
        position: Some(position),
        role: Some(role),
        computer_id: None,
        voice_agent_id,
        agent_metadata: metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn office(metadata: serde_json::Value) -> RegistryOffice {
        RegistryOffice {
            office_id: "office-1".into(),
            namespace_slug: "Acme".into(),
            domain: Some("Acme.office.xyz".into()),
            display_name: Some("Acme".into()),
            status: Some("active".into()),
            metadata,
        }
    }

    fn agent(id: &str, identifier: &str, metadata: serde_json::Value) -> RegistryAgent {
        RegistryAgent {
            id: id.into(),
            agent_identifier: identifier.into(),
            avatar_id: Some("adam".into()),
            role: None,
            agent_email: None,
            metadata,
        }
    }

    #[test]
    fn sanitise_label_collapses_and_trims() {
        assert_eq!(sanitise_label("  Dr. Ada!! Lovelace  "), "dr-ada-lovelace");
    }

    #[test]
    fn identifier_with_dot_is_used_as_is_lowercased() {
        let office = office(json!({}));
        let agent = agent("a1", "Ada.Office.XYZ", json!({}));
        assert_eq!(derive_agent_identifier(&office, &agent, "office.xyz"), "ada.office.xyz");
    }

    #[test]
    fn bare_identifier_is_composed_with_office_domain() {
        let office = office(json!({}));
        let agent = agent("a1", "Ada Lovelace", json!({}));
        assert_eq!(derive_agent_identifier(&office, &agent, "office.xyz"), "ada-lovelace.acme.office.xyz");
    }

    #[test]
    fn default_agent_domain_metadata_wins_over_agent_identifier() {
        let office = office(json!({ "defaultAgentDomain": "Custom.Domain" }));
        let agent = agent("a1", "Ada Lovelace", json!({}));
        assert_eq!(derive_agent_identifier(&office, &agent, "office.xyz"), "custom.domain");
    }

    #[test]
    fn build_npc_payload_marks_default_agent() {
        let office = office(json!({ "defaultAgentId": "a1" }));
        let agent = agent("a1", "Ada Lovelace", json!({}));
        let payload = build_npc_payload(&office, &agent, "fallback-voice");
        assert_eq!(payload.agent_metadata.get("default").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(payload.workstation_id.as_deref(), Some("design-studio"));
        assert_eq!(payload.voice_agent_id.as_deref(), Some("fallback-voice"));
    }
}
