use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Number of computer slots every room seeds on creation (spec §4.F).
pub const COMPUTER_SLOTS: usize = 5;
/// Number of whiteboard slots every room seeds on creation (spec §4.F).
pub const WHITEBOARD_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A live player entity inside a room: either a human client's avatar or
/// the server-authoritative stand-in for an NPC (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub anim: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ready_to_connect: bool,
    #[serde(default)]
    pub video_connected: bool,
}

impl Player {
    pub fn new_at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            anim: String::new(),
            name: String::new(),
            ready_to_connect: false,
            video_connected: false,
        }
    }
}

/// A shared-resource slot (computer or whiteboard): tracks the set of
/// session keys currently connected to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSlot {
    pub connected_user: HashSet<String>,
}

impl ResourceSlot {
    pub fn is_empty(&self) -> bool {
        self.connected_user.is_empty()
    }
}

/// Metadata echoed to the matchmaker for a room instance (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomMetadata {
    pub has_password: bool,
    pub registry_backed: bool,
    #[serde(default)]
    pub registry_office_id: Option<String>,
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub registry_domain: Option<String>,
    #[serde(default)]
    pub registry_status: Option<String>,
    #[serde(default)]
    pub namespace_slug: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub registry_metadata: serde_json::Value,
    pub clients_online_count: usize,
    pub npc_online_count: usize,
    pub total_online_count: usize,
}

impl RoomMetadata {
    pub fn recompute_online_counts(&mut self, clients: usize, npcs: usize) {
        self.clients_online_count = clients;
        self.npc_online_count = npcs;
        self.total_online_count = clients + npcs;
    }
}

/// A persisted row in the `rooms` table (spec §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub password: Option<String>,
    pub auto_dispose: bool,
}
