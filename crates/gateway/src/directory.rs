//! Room namespace registry (spec §4.G), grounded on the teacher's
//! `nodes/registry.rs::NodeRegistry` — a `RwLock<HashMap<...>>` keyed
//! lookup table, generalised here to two maps (by room id, by namespace
//! slug) since callers need both lookups.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use presence_domain::error::{Error, Result};
use presence_domain::model::NpcAssignment;
use presence_domain::trace::TraceEvent;
use presence_registry_client::RegistryClient;
use presence_store::Store;

use crate::room::{CreateRoomOptions, Room};

/// Outcome of a bulk namespace operation (spec §4.G `destroyNamespace`,
/// `pruneNamespacesNotIn`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyResult {
    pub removed_rooms: usize,
    pub removed_agents: usize,
}

pub struct RoomDirectory {
    by_room_id: RwLock<HashMap<String, Arc<Room>>>,
    by_namespace_slug: RwLock<HashMap<String, Arc<Room>>>,
    store: Arc<Store>,
    registry: Arc<RegistryClient>,
    base_domain: String,
}

impl RoomDirectory {
    pub fn new(store: Arc<Store>, registry: Arc<RegistryClient>, base_domain: String) -> Arc<Self> {
        Arc::new(Self {
            by_room_id: RwLock::new(HashMap::new()),
            by_namespace_slug: RwLock::new(HashMap::new()),
            store,
            registry,
            base_domain,
        })
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Creates a room and registers it under both lookup maps. Requires
    /// `Arc<Self>` because the new `Room` needs a `Weak` back-reference to
    /// hand to `dispose()` later.
    pub async fn create_room(
        self: &Arc<Self>,
        opts: CreateRoomOptions,
    ) -> Result<Arc<Room>> {
        let registry_backed = opts.registry_backed;
        let namespace_slug = opts.namespace_slug.to_lowercase();

        let room = Room::create(
            Arc::downgrade(self),
            self.store.clone(),
            self.registry.clone(),
            opts,
        )
        .await?;

        self.by_room_id.write().insert(room.room_id.clone(), room.clone());
        self.by_namespace_slug
            .write()
            .insert(namespace_slug, room.clone());

        TraceEvent::RoomCreated {
            room_id: room.room_id.clone(),
            namespace_slug: room.namespace_slug.clone(),
            registry_backed,
        }
        .emit();

        Ok(room)
    }

    pub fn get_by_room_id(&self, room_id: &str) -> Option<Arc<Room>> {
        self.by_room_id.read().get(room_id).cloned()
    }

    pub fn get_by_namespace(&self, slug: &str) -> Option<Arc<Room>> {
        self.by_namespace_slug.read().get(&slug.to_lowercase()).cloned()
    }

    /// Any currently-registered room, used only to gate
    /// `removeNpcEverywhere` (spec §4.G, §9 Open Question (b) — the gate is
    /// advisory, the removal itself still sweeps every room).
    pub fn get_any_active_room(&self) -> Option<Arc<Room>> {
        self.by_room_id.read().values().next().cloned()
    }

    pub fn list_rooms(&self) -> Vec<Arc<Room>> {
        self.by_room_id.read().values().cloned().collect()
    }

    pub fn find_room_with_agent(&self, agent_id: &str) -> Option<Arc<Room>> {
        let agent_key = agent_id.to_lowercase();
        self.by_room_id
            .read()
            .values()
            .find(|room| room.has_agent(&agent_key))
            .cloned()
    }

    pub fn list_npc_assignments(&self) -> Vec<NpcAssignment> {
        self.by_room_id
            .read()
            .values()
            .flat_map(|room| room.list_npc_assignments())
            .collect()
    }

    /// Compare-on-delete unregistration (spec §4.G "Room teardown"): only
    /// removes the namespace-slug entry if the `Arc` stored there still
    /// points at this exact room — a newer room that has since replaced it
    /// at the same slug is left untouched.
    pub fn unregister_if_matches(&self, room_id: &str, namespace_slug: &str, room_ptr: *const Room) {
        self.by_room_id.write().remove(room_id);

        let mut by_slug = self.by_namespace_slug.write();
        if let Some(stored) = by_slug.get(namespace_slug) {
            if Arc::as_ptr(stored) == room_ptr {
                by_slug.remove(namespace_slug);
            }
        }
    }

    /// Expands `slug` into its destroy candidate set — the slug itself,
    /// its head label before the first `.`, and `slug.base_domain` — then
    /// disposes every room whose namespace/domain/name matches any
    /// candidate (spec §4.G `destroyNamespace`).
    pub fn destroy_namespace(&self, slug: &str) -> Result<DestroyResult> {
        let slug_lower = slug.to_lowercase();
        let mut candidates = HashSet::new();
        candidates.insert(slug_lower.clone());
        if let Some(head) = slug_lower.split('.').next() {
            candidates.insert(head.to_string());
        }
        candidates.insert(format!("{slug_lower}.{}", self.base_domain));

        let matching: Vec<Arc<Room>> = self
            .by_room_id
            .read()
            .values()
            .filter(|room| room.matches_any_candidate(&candidates))
            .cloned()
            .collect();

        let mut removed_rooms = 0;
        let mut removed_agents = 0;

        for room in matching {
            removed_agents += room.list_npc_assignments().len();
            room.dispose();
            if let Err(e) = self.store.delete_room_by_name(&room.name) {
                tracing::warn!(error = %e, room = %room.name, "failed to delete persisted room row");
            }
            removed_rooms += 1;
        }

        // Purge any residual persisted npc rows pointing at a destroyed
        // namespace (e.g. rows left behind by a prior crash before this
        // sweep could run).
        match self.store.all_npcs() {
            Ok(rows) => {
                for row in rows {
                    if candidates.contains(&row.namespace_slug.to_lowercase()) {
                        if let Err(e) = self.store.remove_npc(&row.agent_id) {
                            tracing::warn!(error = %e, agent_id = %row.agent_id, "failed to purge residual npc row");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to scan npcs for residual purge"),
        }

        TraceEvent::NamespaceDestroyed {
            namespace_slug: slug_lower,
            removed_rooms,
            removed_agents,
        }
        .emit();

        Ok(DestroyResult {
            removed_rooms,
            removed_agents,
        })
    }

    /// Disposes every registry-backed room whose namespace slug isn't in
    /// `valid` (spec §4.G `pruneNamespacesNotIn`, called every reconciler
    /// tick). Non-registry rooms (ad hoc/manually created) are never
    /// pruned this way.
    pub fn prune_namespaces_not_in(&self, valid: &HashSet<String>) -> DestroyResult {
        let stale: Vec<Arc<Room>> = self
            .by_room_id
            .read()
            .values()
            .filter(|room| room.is_registry_backed() && !valid.contains(&room.namespace_slug))
            .cloned()
            .collect();

        let mut removed_rooms = 0;
        let mut removed_agents = 0;
        for room in stale {
            removed_agents += room.list_npc_assignments().len();
            room.dispose();
            if let Err(e) = self.store.delete_room_by_name(&room.name) {
                tracing::warn!(error = %e, room = %room.name, "failed to delete pruned room row");
            }
            removed_rooms += 1;
        }

        DestroyResult {
            removed_rooms,
            removed_agents,
        }
    }

    /// Removes an NPC from every room it's seated in (spec §4.G
    /// `removeNpcEverywhere`). Gated on at least one active room existing,
    /// but the sweep itself always covers every registered room regardless
    /// of which one satisfied the gate.
    pub async fn remove_npc_everywhere(&self, agent_id: &str) -> Result<Vec<String>> {
        if self.get_any_active_room().is_none() {
            return Err(Error::NoCapacity("no active rooms".into()));
        }

        let rooms = self.list_rooms();
        let mut removed_from = Vec::new();
        for room in rooms {
            if room.remove_npc(agent_id).await? {
                removed_from.push(room.name.clone());
            }
        }
        Ok(removed_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_store::Store;

    fn sample_directory() -> Arc<RoomDirectory> {
        RoomDirectory::new(
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(RegistryClient::new("http://127.0.0.1:1")),
            "office.xyz".to_string(),
        )
    }

    #[tokio::test]
    async fn create_room_registers_under_both_maps() {
        let directory = sample_directory();
        let room = directory
            .create_room(CreateRoomOptions {
                name: "Public Lobby".into(),
                namespace_slug: "public".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(directory.get_by_room_id(&room.room_id).is_some());
        assert!(directory.get_by_namespace("public").is_some());
        assert!(directory.get_by_namespace("PUBLIC").is_some());
    }

    #[tokio::test]
    async fn dispose_unregisters_from_both_maps() {
        let directory = sample_directory();
        let room = directory
            .create_room(CreateRoomOptions {
                name: "Public Lobby".into(),
                namespace_slug: "public".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        room.dispose();
        assert!(directory.get_by_room_id(&room.room_id).is_none());
        assert!(directory.get_by_namespace("public").is_none());
    }

    #[tokio::test]
    async fn dispose_does_not_clobber_a_newer_room_at_the_same_slug() {
        let directory = sample_directory();
        let first = directory
            .create_room(CreateRoomOptions {
                name: "Room A".into(),
                namespace_slug: "shared".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        // A second room claims the same slug (simulating a recreate race).
        directory.by_namespace_slug.write().remove("shared");
        let second = directory
            .create_room(CreateRoomOptions {
                name: "Room B".into(),
                namespace_slug: "shared".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        first.dispose();
        // first's compare-on-delete must not remove second's registration.
        assert!(directory.get_by_namespace("shared").is_some());
        assert_eq!(directory.get_by_namespace("shared").unwrap().room_id, second.room_id);
    }

    #[tokio::test]
    async fn destroy_namespace_expands_candidates() {
        let directory = sample_directory();
        directory
            .create_room(CreateRoomOptions {
                name: "acme".into(),
                namespace_slug: "acme.office.xyz".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let result = directory.destroy_namespace("acme").unwrap();
        assert_eq!(result.removed_rooms, 1);
        assert!(directory.get_by_namespace("acme.office.xyz").is_none());
    }

    #[tokio::test]
    async fn prune_only_removes_registry_backed_rooms_outside_valid_set() {
        let directory = sample_directory();
        directory
            .create_room(CreateRoomOptions {
                name: "manual".into(),
                namespace_slug: "manual".into(),
                registry_backed: false,
                ..Default::default()
            })
            .await
            .unwrap();
        directory
            .create_room(CreateRoomOptions {
                name: "stale".into(),
                namespace_slug: "stale".into(),
                registry_backed: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let valid = HashSet::new();
        let result = directory.prune_namespaces_not_in(&valid);
        assert_eq!(result.removed_rooms, 1);
        assert!(directory.get_by_namespace("manual").is_some());
        assert!(directory.get_by_namespace("stale").is_none());
    }

    #[tokio::test]
    async fn remove_npc_everywhere_requires_an_active_room() {
        let directory = sample_directory();
        let err = directory.remove_npc_everywhere("agent-1").await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }
}
