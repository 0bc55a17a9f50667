//! The Room Instance (spec §4.F): seeded resource slots, NPC seating,
//! the realtime message dispatch table, and the join/handshake gate.
//!
//! All mutable state lives behind a single `parking_lot::Mutex` rather than
//! the finer-grained locking `RoomDirectory` uses, because spec §5 requires
//! a room's own operations to behave as if single-threaded — one lock per
//! room gives callers that ordering for free instead of asking every caller
//! to serialise through an external queue.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use presence_auth::SecretResolver;
use presence_domain::error::{Error, Result};
use presence_domain::model::{
    NpcAssignment, NpcStateUpdate, NpcUpsertPayload, Player, Position, Posture, ResourceSlot,
    RoomMetadata, RoomRecord, COMPUTER_SLOTS, WHITEBOARD_SLOTS,
};
use presence_domain::trace::TraceEvent;
use presence_protocol::{JoinOptions, NpcClientData, OutboundRoomMessage, RoomMessage};
use presence_registry_client::{AgentPatch, OfficePatch, RegistryClient};
use presence_store::Store;
use serde_json::{json, Value};

use crate::directory::RoomDirectory;
use crate::workstation;

/// A chat line replicated to every connected player (spec §4.F
/// `ADD_CHAT_MESSAGE`).
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub content: String,
    pub session_id: String,
}

/// Who a dispatched outbound message should go to.
#[derive(Debug, Clone)]
pub enum Recipients {
    Others,
    One(String),
}

/// One outbound message produced by [`Room::handle_message`].
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub to: Recipients,
    pub message: OutboundRoomMessage,
}

struct RoomState {
    password_hash: Option<String>,
    metadata: RoomMetadata,
    computers: Vec<ResourceSlot>,
    whiteboards: Vec<ResourceSlot>,
    players: HashMap<String, Player>,
    npc_assignments: HashMap<String, NpcAssignment>,
    chat: Vec<ChatEntry>,
    rehydrated: bool,
    disposed: bool,
}

/// Parameters for creating a new room (spec §4.F "Room creation").
#[derive(Debug, Clone, Default)]
pub struct CreateRoomOptions {
    pub name: String,
    pub namespace_slug: String,
    pub description: Option<String>,
    pub password: Option<String>,
    pub auto_dispose: bool,
    pub registry_backed: bool,
    pub registry_office_id: Option<String>,
    pub registry_id: Option<String>,
    pub registry_domain: Option<String>,
    pub registry_status: Option<String>,
    pub display_name: Option<String>,
    pub registry_metadata: Value,
}

impl CreateRoomOptions {
    /// Builds the create options for a Registry-backed office room (spec
    /// §4.H `ensureRegistryRooms`).
    pub fn registry_backed(office: &presence_domain::model::RegistryOffice) -> Self {
        let slug = office.slug();
        Self {
            name: slug.clone(),
            namespace_slug: slug,
            description: office.display_name.clone(),
            password: None,
            auto_dispose: false,
            registry_backed: true,
            registry_office_id: Some(office.office_id.clone()),
            registry_id: Some(office.office_id.clone()),
            registry_domain: office.domain.clone(),
            registry_status: office.status.clone(),
            display_name: office.display_name.clone(),
            registry_metadata: office.metadata.clone(),
        }
    }
}

fn looks_like_bcrypt_hash(s: &str) -> bool {
    s.starts_with("$2a$") || s.starts_with("$2b$") || s.starts_with("$2y$")
}

/// Live room instance. Held as `Arc<Room>` everywhere — the `RoomDirectory`
/// and any in-flight handshake/admin call share ownership of the same
/// instance rather than copying snapshots.
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub namespace_slug: String,
    directory: Weak<RoomDirectory>,
    store: Arc<Store>,
    registry: Arc<RegistryClient>,
    state: Mutex<RoomState>,
}

impl Room {
    /// Seeds 5 computers and 3 whiteboards, hashes the password (bcrypt
    /// cost 10) unless it's already a bcrypt hash, persists the room row,
    /// and — if registry-backed — patches its `skyofficeWorldId` in the
    /// Registry with the live room id (spec §4.F "Room creation").
    pub async fn create(
        directory: Weak<RoomDirectory>,
        store: Arc<Store>,
        registry: Arc<RegistryClient>,
        opts: CreateRoomOptions,
    ) -> Result<Arc<Room>> {
        let room_id = uuid::Uuid::new_v4().to_string();
        let namespace_slug = opts.namespace_slug.to_lowercase();

        let password_hash = match &opts.password {
            None => None,
            Some(p) if looks_like_bcrypt_hash(p) => Some(p.clone()),
            Some(p) => Some(
                bcrypt::hash(p, 10)
                    .map_err(|e| Error::Internal(format!("hashing room password: {e}")))?,
            ),
        };

        let metadata = RoomMetadata {
            has_password: password_hash.is_some(),
            registry_backed: opts.registry_backed,
            registry_office_id: opts.registry_office_id.clone(),
            registry_id: opts.registry_id.clone(),
            registry_domain: opts.registry_domain.clone(),
            registry_status: opts.registry_status.clone(),
            namespace_slug: Some(namespace_slug.clone()),
            display_name: opts.display_name.clone(),
            registry_metadata: opts.registry_metadata.clone(),
            clients_online_count: 0,
            npc_online_count: 0,
            total_online_count: 0,
        };

        let room = Arc::new(Room {
            room_id,
            name: opts.name.clone(),
            namespace_slug,
            directory,
            store: store.clone(),
            registry: registry.clone(),
            state: Mutex::new(RoomState {
                password_hash,
                metadata,
                computers: vec![ResourceSlot::default(); COMPUTER_SLOTS],
                whiteboards: vec![ResourceSlot::default(); WHITEBOARD_SLOTS],
                players: HashMap::new(),
                npc_assignments: HashMap::new(),
                chat: Vec::new(),
                rehydrated: false,
                disposed: false,
            }),
        });

        let record = {
            let state = room.state.lock();
            RoomRecord {
                name: room.name.clone(),
                description: opts.description.clone(),
                password: state.password_hash.clone(),
                auto_dispose: opts.auto_dispose,
            }
        };
        store
            .save_room(&record)
            .map_err(|e| Error::Persistence(format!("saving room {}: {e}", room.name)))?;

        if opts.registry_backed {
            if let Some(office_id) = &opts.registry_office_id {
                registry
                    .patch_office(
                        office_id,
                        &OfficePatch {
                            skyoffice_world_id: room.room_id.clone(),
                        },
                    )
                    .await;
            }
        }

        Ok(room)
    }

    pub fn is_registry_backed(&self) -> bool {
        self.state.lock().metadata.registry_backed
    }

    pub fn metadata(&self) -> RoomMetadata {
        self.state.lock().metadata.clone()
    }

    pub fn has_agent(&self, agent_key_lower: &str) -> bool {
        self.state.lock().npc_assignments.contains_key(agent_key_lower)
    }

    pub fn list_npc_assignments(&self) -> Vec<NpcAssignment> {
        self.state.lock().npc_assignments.values().cloned().collect()
    }

    /// Whether this room's namespace/domain/name matches any candidate
    /// string (spec §4.G `destroyNamespace` candidate expansion).
    pub fn matches_any_candidate(&self, candidates: &std::collections::HashSet<String>) -> bool {
        if candidates.contains(&self.namespace_slug) {
            return true;
        }
        let state = self.state.lock();
        if let Some(domain) = &state.metadata.registry_domain {
            if candidates.contains(&domain.to_lowercase()) {
                return true;
            }
        }
        candidates.contains(&self.name.to_lowercase())
    }

    /// Tears the room down: clears live state and, if still registered,
    /// asks the directory to drop it (compare-on-delete by raw pointer, so
    /// a room that already lost the race to a newer room at the same
    /// namespace slug doesn't clobber the replacement).
    pub fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.players.clear();
            state.npc_assignments.clear();
            state.computers.iter_mut().for_each(|s| s.connected_user.clear());
            state.whiteboards.iter_mut().for_each(|s| s.connected_user.clear());
        }

        if let Some(dir) = self.directory.upgrade() {
            dir.unregister_if_matches(&self.room_id, &self.namespace_slug, self as *const Room);
        }

        TraceEvent::RoomDisposed {
            room_id: self.room_id.clone(),
            namespace_slug: self.namespace_slug.clone(),
        }
        .emit();
    }

    fn recompute_online_counts(&self) {
        let mut state = self.state.lock();
        let npc_count = state.npc_assignments.len();
        let client_count = state.players.len().saturating_sub(npc_count);
        state.metadata.recompute_online_counts(client_count, npc_count);
    }

    // ── Human join/leave ───────────────────────────────────────────

    pub fn on_join(&self, session_id: &str, name: Option<&str>) {
        {
            let mut state = self.state.lock();
            let mut player = Player::new_at(0.0, 0.0);
            if let Some(n) = name {
                player.name = n.to_string();
            }
            state.players.insert(session_id.to_string(), player);
        }
        self.recompute_online_counts();
    }

    pub fn on_leave(&self, session_id: &str) {
        {
            let mut state = self.state.lock();
            state.players.remove(session_id);
            for slot in state.computers.iter_mut() {
                slot.connected_user.remove(session_id);
            }
            for slot in state.whiteboards.iter_mut() {
                slot.connected_user.remove(session_id);
            }
        }
        self.recompute_online_counts();
    }

    /// Implements the realtime message contract table (spec §4.F). Returns
    /// the set of outbound messages the transport should forward; pure
    /// state mutations (seat connect/disconnect, player updates) return no
    /// dispatches.
    pub fn handle_message(&self, session_id: &str, msg: RoomMessage) -> Vec<Dispatch> {
        let mut state = self.state.lock();
        match msg {
            RoomMessage::ConnectToComputer { computer_id } => {
                if let Some(slot) = state.computers.get_mut(computer_id) {
                    slot.connected_user.insert(session_id.to_string());
                }
                Vec::new()
            }
            RoomMessage::DisconnectFromComputer { computer_id } => {
                if let Some(slot) = state.computers.get_mut(computer_id) {
                    slot.connected_user.remove(session_id);
                }
                Vec::new()
            }
            RoomMessage::StopScreenShare { computer_id } => {
                let mut dispatches = Vec::new();
                if let Some(slot) = state.computers.get(computer_id) {
                    for other in slot.connected_user.iter().filter(|s| s.as_str() != session_id) {
                        dispatches.push(Dispatch {
                            to: Recipients::One(other.clone()),
                            message: OutboundRoomMessage::StopScreenShare {
                                from_session_id: session_id.to_string(),
                            },
                        });
                    }
                }
                dispatches
            }
            RoomMessage::ConnectToWhiteboard { whiteboard_id } => {
                if let Some(slot) = state.whiteboards.get_mut(whiteboard_id) {
                    slot.connected_user.insert(session_id.to_string());
                }
                Vec::new()
            }
            RoomMessage::DisconnectFromWhiteboard { whiteboard_id } => {
                if let Some(slot) = state.whiteboards.get_mut(whiteboard_id) {
                    slot.connected_user.remove(session_id);
                }
                Vec::new()
            }
            RoomMessage::UpdatePlayer { x, y, anim } => {
                if let Some(player) = state.players.get_mut(session_id) {
                    player.x = x;
                    player.y = y;
                    player.anim = anim;
                }
                Vec::new()
            }
            RoomMessage::UpdatePlayerName { name } => {
                if let Some(player) = state.players.get_mut(session_id) {
                    player.name = name;
                }
                Vec::new()
            }
            RoomMessage::ReadyToConnect => {
                if let Some(player) = state.players.get_mut(session_id) {
                    player.ready_to_connect = true;
                }
                Vec::new()
            }
            RoomMessage::VideoConnected => {
                if let Some(player) = state.players.get_mut(session_id) {
                    player.video_connected = true;
                }
                Vec::new()
            }
            RoomMessage::DisconnectStream { client_id } => {
                vec![Dispatch {
                    to: Recipients::One(client_id),
                    message: OutboundRoomMessage::DisconnectStream {
                        from_client_id: session_id.to_string(),
                    },
                }]
            }
            RoomMessage::AddChatMessage { content } => {
                state.chat.push(ChatEntry {
                    content: content.clone(),
                    session_id: session_id.to_string(),
                });
                vec![Dispatch {
                    to: Recipients::Others,
                    message: OutboundRoomMessage::AddChatMessage {
                        content,
                        from_session_id: session_id.to_string(),
                    },
                }]
            }
        }
    }

    // ── NPC lifecycle ──────────────────────────────────────────────

    /// Loads persisted NPCs for this room on first access after startup
    /// (spec §4.F "Startup rehydration"): each is re-upserted with
    /// persistence/registry-sync both skipped, since the row already
    /// reflects what's in the store and the Registry doesn't need to
    /// re-learn about an agent it already knows about.
    async fn ensure_rehydrated(&self) {
        let already = self.state.lock().rehydrated;
        if already {
            return;
        }
        match self.store.npcs_in_room(&self.name) {
            Ok(rows) => {
                for npc in rows {
                    let payload = npc.to_upsert_payload();
                    if let Err(e) = self
                        .upsert_npc(
                            payload,
                            presence_domain::model::UpsertNpcOptions {
                                skip_persistence: true,
                                skip_registry_sync: true,
                            },
                        )
                        .await
                    {
                        tracing::warn!(error = %e, agent_id = %npc.agent_id, "failed to rehydrate npc");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, room = %self.name, "failed to load persisted npcs for rehydration")
            }
        }
        self.state.lock().rehydrated = true;
    }

    /// Seats (or re-seats) an NPC: resolves its computer from
    /// `computerId`/`workstationId`, updates the seat's occupancy, upserts
    /// the `Player` entity, and — unless skipped — persists the row and
    /// patches the Registry (spec §4.F `upsertNpc`).
    pub async fn upsert_npc(
        &self,
        payload: NpcUpsertPayload,
        opts: presence_domain::model::UpsertNpcOptions,
    ) -> Result<NpcAssignment> {
        let agent_key = payload.agent_id.to_lowercase();
        let avatar_id = payload.avatar_id.clone().unwrap_or_else(|| "adam".to_string());
        let position = payload.position.unwrap_or(Position { x: 800.0, y: 200.0 });
        let player_key = format!("npc-{agent_key}");

        let computer_id = {
            let mut state = self.state.lock();

            for slot in state.computers.iter_mut() {
                slot.connected_user.remove(&player_key);
            }

            let computer_id = payload.computer_id.or_else(|| {
                payload
                    .workstation_id
                    .as_deref()
                    .and_then(workstation::resolve_computer_id)
            });

            if let Some(cid) = computer_id {
                if let Some(slot) = state.computers.get_mut(cid) {
                    slot.connected_user.insert(player_key.clone());
                }
            }

            let anim = if computer_id.is_some() {
                format!("{avatar_id}_sit_down")
            } else {
                format!("{avatar_id}_idle_down")
            };

            state.players.insert(
                player_key.clone(),
                Player {
                    x: position.x,
                    y: position.y,
                    anim,
                    name: payload.name.clone(),
                    ready_to_connect: true,
                    video_connected: false,
                },
            );

            computer_id
        };

        let role = NpcAssignment::normalise_role(payload.role.as_deref());
        let assignment = NpcAssignment {
            agent_id: payload.agent_id.clone(),
            registry_agent_id: payload.registry_agent_id.clone(),
            office_id: payload.office_id.clone(),
            name: payload.name.clone(),
            avatar_id,
            workstation_id: payload.workstation_id.clone(),
            position,
            role,
            computer_id,
            voice_agent_id: payload.voice_agent_id.clone(),
            namespace_slug: self.namespace_slug.clone(),
            room_id: self.name.clone(),
            assigned_at: Utc::now(),
            agent_metadata: payload.agent_metadata.clone(),
        };

        self.state
            .lock()
            .npc_assignments
            .insert(agent_key, assignment.clone());

        if !opts.skip_persistence {
            if let Err(e) = self.store.save_npc(&assignment) {
                tracing::warn!(error = %e, agent_id = %assignment.agent_id, "failed to persist npc upsert");
            }
        }

        if !opts.skip_registry_sync {
            if let Some(office_id) = &assignment.office_id {
                let mut metadata = assignment.agent_metadata.clone();
                merge_presence_metadata(&mut metadata, &assignment, true);
                self.registry
                    .patch_agent(
                        office_id,
                        &assignment.agent_id,
                        &AgentPatch {
                            last_seen_at: Some(Utc::now()),
                            metadata,
                        },
                    )
                    .await;
            }
        }

        self.recompute_online_counts();

        TraceEvent::NpcUpserted {
            agent_id: assignment.agent_id.clone(),
            room_id: self.room_id.clone(),
            computer_id: assignment.computer_id,
        }
        .emit();

        Ok(assignment)
    }

    /// Removes an NPC's seat, player entity, and persisted row; marks it
    /// absent in the Registry (spec §4.F `removeNpc`).
    pub async fn remove_npc(&self, agent_id: &str) -> Result<bool> {
        let agent_key = agent_id.to_lowercase();
        let player_key = format!("npc-{agent_key}");

        let assignment = {
            let mut state = self.state.lock();
            let removed = state.npc_assignments.remove(&agent_key);
            state.players.remove(&player_key);
            for slot in state.computers.iter_mut() {
                slot.connected_user.remove(&player_key);
            }
            removed
        };

        let Some(assignment) = assignment else {
            return Ok(false);
        };

        if let Err(e) = self.store.remove_npc(&assignment.agent_id) {
            tracing::warn!(error = %e, agent_id = %assignment.agent_id, "failed to remove persisted npc row");
        }

        if let Some(office_id) = &assignment.office_id {
            let mut metadata = assignment.agent_metadata.clone();
            merge_presence_metadata(&mut metadata, &assignment, false);
            self.registry
                .patch_agent(
                    office_id,
                    &assignment.agent_id,
                    &AgentPatch {
                        last_seen_at: Some(Utc::now()),
                        metadata,
                    },
                )
                .await;
        }

        self.recompute_online_counts();
        TraceEvent::NpcRemoved {
            agent_id: assignment.agent_id.clone(),
            room_id: self.room_id.clone(),
        }
        .emit();
        Ok(true)
    }

    /// Applies a partial state patch to an existing NPC's position/seat/
    /// pose without resetting identity/role fields (spec §4.F
    /// `updateNpcState`). Holds a single lock across the whole read-modify
    /// read cycle so a concurrent `remove_npc` for the same agent can't run
    /// in the middle and leave nothing for the final read to find.
    pub async fn update_npc_state(&self, agent_id: &str, update: NpcStateUpdate) -> Result<NpcAssignment> {
        let agent_key = agent_id.to_lowercase();
        let player_key = format!("npc-{agent_key}");

        let assignment = {
            let mut state = self.state.lock();

            if !state.npc_assignments.contains_key(&agent_key) {
                return Err(Error::NotFound(format!("no npc assignment for {agent_id}")));
            }

            let avatar_id = state
                .npc_assignments
                .get(&agent_key)
                .map(|a| a.avatar_id.clone())
                .unwrap_or_default();

            let anim = update.anim.clone().or_else(|| {
                update.posture.map(|p| match p {
                    Posture::Sit => format!("{avatar_id}_sit_down"),
                    Posture::Stand => format!("{avatar_id}_idle_down"),
                })
            });

            if let Some(a) = state.npc_assignments.get_mut(&agent_key) {
                if let Some(pos) = update.position {
                    a.position = pos;
                }
                if let Some(ws) = &update.workstation_id {
                    a.workstation_id = Some(ws.clone());
                }
                if let Some(voice) = &update.voice_agent_id {
                    a.voice_agent_id = Some(voice.clone());
                }
            }

            if let Some(player) = state.players.get_mut(&player_key) {
                if let Some(pos) = update.position {
                    player.x = pos.x;
                    player.y = pos.y;
                }
                if let Some(anim) = anim {
                    player.anim = anim;
                }
            }

            state
                .npc_assignments
                .get(&agent_key)
                .cloned()
                .expect("just inserted/updated above under the same lock")
        };

        if let Err(e) = self.store.save_npc(&assignment) {
            tracing::warn!(error = %e, agent_id = %assignment.agent_id, "failed to persist npc state update");
        }

        if let Some(office_id) = &assignment.office_id {
            let mut metadata = assignment.agent_metadata.clone();
            merge_presence_metadata(&mut metadata, &assignment, true);
            self.registry
                .patch_agent(
                    office_id,
                    &assignment.agent_id,
                    &AgentPatch {
                        last_seen_at: Some(Utc::now()),
                        metadata,
                    },
                )
                .await;
        }

        Ok(assignment)
    }

    // ── Handshake ──────────────────────────────────────────────────

    /// Implements `onAuth` (spec §4.F): namespace match, password check
    /// (humans and NPCs alike), then — for an NPC handshake (`agentId`
    /// present) — assignment lookup, manager-token verification against the
    /// resolved presence secret, and agentId/namespace claim cross-checks.
    /// Returns `Ok(None)` for a successful human join, `Ok(Some(_))` for a
    /// successful NPC handshake.
    pub async fn on_auth(
        &self,
        opts: &JoinOptions,
        resolver: &SecretResolver,
        directory: &RoomDirectory,
        now_seconds: i64,
    ) -> Result<Option<NpcClientData>> {
        if let Some(requested) = &opts.namespace_slug {
            if requested.to_lowercase() != self.namespace_slug {
                return Err(reject("namespace mismatch", Error::AuthMismatch("namespace mismatch".into())));
            }
        }

        let has_password = self.state.lock().password_hash.is_some();
        if has_password {
            let provided = opts
                .password
                .as_deref()
                .ok_or_else(|| reject("password required", Error::AuthRequired("password required".into())))?;
            let hash = self.state.lock().password_hash.clone().unwrap();
            let ok = bcrypt::verify(provided, &hash).unwrap_or(false);
            if !ok {
                return Err(reject("invalid password", Error::AuthMismatch("invalid password".into())));
            }
        }

        if !opts.is_npc_handshake() {
            return Ok(None);
        }

        let agent_id = opts.agent_id.as_deref().unwrap();
        self.ensure_rehydrated().await;

        let assignment = self.state.lock().npc_assignments.get(&agent_id.to_lowercase()).cloned();
        let Some(assignment) = assignment else {
            // Not seated here — if the agent is actually assigned to a
            // different room (reassigned since the client last looked it
            // up), redirect there instead of a flat 404.
            if let Some(other) = directory.find_room_with_agent(agent_id) {
                if other.room_id != self.room_id {
                    return Err(reject_with_agent(
                        "redirect to assigned room",
                        Error::Redirect { room_id: other.room_id.clone() },
                        agent_id,
                    ));
                }
            }
            return Err(reject_with_agent(
                "no npc assignment",
                Error::NotFound(format!("no npc assignment for {agent_id}")),
                agent_id,
            ));
        };

        let manager_token = opts.manager_token().ok_or_else(|| {
            reject_with_agent(
                "manager token required",
                Error::AuthRequired("manager token required".into()),
                agent_id,
            )
        })?;

        let resolved = resolver
            .resolve(agent_id, assignment.office_id.as_deref())
            .await
            .ok_or_else(|| {
                reject_with_agent(
                    "presence secret unavailable",
                    Error::NoCapacity("presence secret unavailable".into()),
                    agent_id,
                )
            })?;

        let payload = presence_auth::verify(manager_token, &resolved.secret, now_seconds).map_err(|e| {
            reject_with_agent("manager token verification failed", Error::AuthMismatch(e.to_string()), agent_id)
        })?;

        if let Some(token_agent) = &payload.agent_id {
            if token_agent.to_lowercase() != agent_id.to_lowercase() {
                return Err(reject_with_agent(
                    "token agentId mismatch",
                    Error::AuthMismatch("token agentId mismatch".into()),
                    agent_id,
                ));
            }
        }
        if let Some(token_ns) = payload.namespace_claim() {
            if token_ns.to_lowercase() != self.namespace_slug {
                return Err(reject_with_agent(
                    "token namespace mismatch",
                    Error::AuthMismatch("token namespace mismatch".into()),
                    agent_id,
                ));
            }
        }
        if assignment.namespace_slug.to_lowercase() != self.namespace_slug {
            return Err(reject_with_agent(
                "assignment namespace mismatch",
                Error::AuthMismatch("assignment namespace mismatch".into()),
                agent_id,
            ));
        }

        Ok(Some(NpcClientData {
            npc_agent_id: agent_id.to_string(),
            npc_key: assignment.player_key(),
            manager_token_payload: payload,
            presence_secret_source: resolved.source.as_str().to_string(),
        }))
    }
}

fn reject(reason: &str, err: Error) -> Error {
    TraceEvent::HandshakeRejected {
        reason: reason.to_string(),
        status: err.status_code(),
        agent_id: None,
    }
    .emit();
    err
}

fn reject_with_agent(reason: &str, err: Error, agent_id: &str) -> Error {
    TraceEvent::HandshakeRejected {
        reason: reason.to_string(),
        status: err.status_code(),
        agent_id: Some(agent_id.to_string()),
    }
    .emit();
    err
}

/// Builds the metadata object patched back to the Registry on upsert/state
/// update (spec §4.F point 6): position, workstation, voice agent, a
/// `spawn` sub-object mirroring them, and an `isPresentInSkyOffice` flag.
pub fn merge_presence_metadata(metadata: &mut Value, assignment: &NpcAssignment, present: bool) {
    if !metadata.is_object() {
        *metadata = Value::Object(Default::default());
    }
    let obj = metadata.as_object_mut().expect("forced to object above");
    obj.insert("positionX".into(), json!(assignment.position.x));
    obj.insert("positionY".into(), json!(assignment.position.y));
    obj.insert("workstationId".into(), json!(assignment.workstation_id));
    obj.insert("voiceAgentId".into(), json!(assignment.voice_agent_id));
    obj.insert("namespaceSlug".into(), json!(assignment.namespace_slug));
    obj.insert(
        "spawn".into(),
        json!({
            "position": { "x": assignment.position.x, "y": assignment.position.y },
            "workstationId": assignment.workstation_id,
            "voiceAgentId": assignment.voice_agent_id,
        }),
    );
    obj.insert("isPresentInSkyOffice".into(), json!(present));
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_registry_client::RegistryClient;
    use presence_store::Store;

    async fn sample_room() -> Arc<Room> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(RegistryClient::new("http://127.0.0.1:1"));
        Room::create(
            Weak::new(),
            store,
            registry,
            CreateRoomOptions {
                name: "Public Lobby".into(),
                namespace_slug: "public".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_seeds_five_computers_and_three_whiteboards() {
        let room = sample_room().await;
        let state = room.state.lock();
        assert_eq!(state.computers.len(), COMPUTER_SLOTS);
        assert_eq!(state.whiteboards.len(), WHITEBOARD_SLOTS);
    }

    #[tokio::test]
    async fn upsert_npc_seats_at_resolved_workstation() {
        let room = sample_room().await;
        let payload = NpcUpsertPayload {
            agent_id: "a.x.office.xyz".into(),
            registry_agent_id: None,
            office_id: None,
            name: "Ada".into(),
            avatar_id: Some("adam".into()),
            workstation_id: Some("design-studio".into()),
            position: None,
            role: None,
            computer_id: None,
            voice_agent_id: None,
            agent_metadata: Value::Null,
        };
        let assignment = room
            .upsert_npc(payload, presence_domain::model::UpsertNpcOptions::default())
            .await
            .unwrap();
        assert_eq!(assignment.computer_id, Some(0));
        assert_eq!(assignment.role, "GM");
    }

    #[tokio::test]
    async fn remove_npc_clears_assignment_and_seat() {
        let room = sample_room().await;
        let payload = NpcUpsertPayload {
            agent_id: "a.x.office.xyz".into(),
            registry_agent_id: None,
            office_id: None,
            name: "Ada".into(),
            avatar_id: None,
            workstation_id: Some("design-studio".into()),
            position: None,
            role: None,
            computer_id: None,
            voice_agent_id: None,
            agent_metadata: Value::Null,
        };
        room.upsert_npc(payload, presence_domain::model::UpsertNpcOptions::default())
            .await
            .unwrap();
        assert!(room.remove_npc("a.x.office.xyz").await.unwrap());
        assert!(!room.remove_npc("a.x.office.xyz").await.unwrap());
        assert!(room.list_npc_assignments().is_empty());
    }

    #[tokio::test]
    async fn human_join_without_password_succeeds() {
        let room = sample_room().await;
        let resolver_store: Arc<dyn presence_auth::SecretStore> =
            Arc::new(presence_auth::FileSecretStore::new("/tmp"));
        let resolver = SecretResolver::new(
            Arc::new(RegistryClient::new("http://127.0.0.1:1")),
            resolver_store,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
        );
        // directory only needed for redirect lookups on NPC handshakes; a
        // never-upgraded Weak is fine for a human join path.
        let directory = crate::directory::RoomDirectory::new(
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(RegistryClient::new("http://127.0.0.1:1")),
            "office.xyz".into(),
        );
        let opts = JoinOptions {
            namespace_slug: Some("public".into()),
            ..Default::default()
        };
        let result = room.on_auth(&opts, &resolver, &directory, 0).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn on_join_and_leave_track_player_and_seats() {
        let room = sample_room().await;
        room.on_join("sess-1", Some("Mallory"));
        assert_eq!(room.state.lock().players.len(), 1);

        room.handle_message("sess-1", RoomMessage::ConnectToComputer { computer_id: 0 });
        assert!(room.state.lock().computers[0].connected_user.contains("sess-1"));

        room.on_leave("sess-1");
        assert!(room.state.lock().players.is_empty());
        assert!(room.state.lock().computers[0].connected_user.is_empty());
    }

    #[tokio::test]
    async fn connect_and_disconnect_from_computer_toggle_the_seat() {
        let room = sample_room().await;
        room.on_join("sess-1", None);

        let dispatches = room.handle_message("sess-1", RoomMessage::ConnectToComputer { computer_id: 2 });
        assert!(dispatches.is_empty());
        assert!(room.state.lock().computers[2].connected_user.contains("sess-1"));

        let dispatches = room.handle_message("sess-1", RoomMessage::DisconnectFromComputer { computer_id: 2 });
        assert!(dispatches.is_empty());
        assert!(!room.state.lock().computers[2].connected_user.contains("sess-1"));
    }

    #[tokio::test]
    async fn connect_and_disconnect_from_whiteboard_toggle_the_seat() {
        let room = sample_room().await;
        room.on_join("sess-1", None);

        room.handle_message("sess-1", RoomMessage::ConnectToWhiteboard { whiteboard_id: 1 });
        assert!(room.state.lock().whiteboards[1].connected_user.contains("sess-1"));

        room.handle_message("sess-1", RoomMessage::DisconnectFromWhiteboard { whiteboard_id: 1 });
        assert!(!room.state.lock().whiteboards[1].connected_user.contains("sess-1"));
    }

    #[tokio::test]
    async fn stop_screen_share_fans_out_to_others_on_the_same_computer_excluding_sender() {
        let room = sample_room().await;
        room.on_join("sess-1", None);
        room.on_join("sess-2", None);
        room.on_join("sess-3", None);
        room.handle_message("sess-1", RoomMessage::ConnectToComputer { computer_id: 0 });
        room.handle_message("sess-2", RoomMessage::ConnectToComputer { computer_id: 0 });
        room.handle_message("sess-3", RoomMessage::ConnectToComputer { computer_id: 0 });

        let dispatches = room.handle_message("sess-1", RoomMessage::StopScreenShare { computer_id: 0 });
        assert_eq!(dispatches.len(), 2);
        for d in &dispatches {
            match &d.to {
                Recipients::One(session_id) => assert_ne!(session_id, "sess-1"),
                Recipients::Others => panic!("expected targeted recipients, not a broadcast"),
            }
            match &d.message {
                OutboundRoomMessage::StopScreenShare { from_session_id } => {
                    assert_eq!(from_session_id, "sess-1");
                }
                other => panic!("unexpected message variant: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn add_chat_message_broadcasts_to_others_excluding_sender() {
        let room = sample_room().await;
        room.on_join("sess-1", None);

        let dispatches = room.handle_message(
            "sess-1",
            RoomMessage::AddChatMessage {
                content: "hello".into(),
            },
        );
        assert_eq!(dispatches.len(), 1);
        assert!(matches!(dispatches[0].to, Recipients::Others));
        match &dispatches[0].message {
            OutboundRoomMessage::AddChatMessage { content, from_session_id } => {
                assert_eq!(content, "hello");
                assert_eq!(from_session_id, "sess-1");
            }
            other => panic!("unexpected message variant: {other:?}"),
        }
        assert_eq!(room.state.lock().chat.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_stream_targets_the_requested_client() {
        let room = sample_room().await;
        room.on_join("sess-1", None);

        let dispatches = room.handle_message(
            "sess-1",
            RoomMessage::DisconnectStream {
                client_id: "sess-2".into(),
            },
        );
        assert_eq!(dispatches.len(), 1);
        match &dispatches[0].to {
            Recipients::One(session_id) => assert_eq!(session_id, "sess-2"),
            Recipients::Others => panic!("expected a targeted recipient"),
        }
    }

    #[tokio::test]
    async fn namespace_mismatch_is_rejected() {
        let room = sample_room().await;
        let resolver_store: Arc<dyn presence_auth::SecretStore> =
            Arc::new(presence_auth::FileSecretStore::new("/tmp"));
        let resolver = SecretResolver::new(
            Arc::new(RegistryClient::new("http://127.0.0.1:1")),
            resolver_store,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
        );
        let directory = crate::directory::RoomDirectory::new(
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(RegistryClient::new("http://127.0.0.1:1")),
            "office.xyz".into(),
        );
        let opts = JoinOptions {
            namespace_slug: Some("other".into()),
            ..Default::default()
        };
        let err = room.on_auth(&opts, &resolver, &directory, 0).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
