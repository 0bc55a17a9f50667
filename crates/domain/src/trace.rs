use serde::Serialize;

/// Structured trace events emitted across the presence-orchestrator crates.
///
/// These are logged via `tracing` at the call site (`.emit()`); the enum
/// exists so log fields stay consistent between the places that raise the
/// same kind of event (room lifecycle vs. reconciler vs. handshake).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RoomCreated {
        room_id: String,
        namespace_slug: String,
        registry_backed: bool,
    },
    RoomDisposed {
        room_id: String,
        namespace_slug: String,
    },
    NpcUpserted {
        agent_id: String,
        room_id: String,
        computer_id: Option<usize>,
    },
    NpcRemoved {
        agent_id: String,
        room_id: String,
    },
    NamespaceDestroyed {
        namespace_slug: String,
        removed_rooms: usize,
        removed_agents: usize,
    },
    ReconcileTick {
        offices: usize,
        rooms_created: usize,
        rooms_pruned: usize,
    },
    HandshakeRejected {
        reason: String,
        status: u16,
        agent_id: Option<String>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(trace = %json, "trace_event"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize trace event"),
        }
    }
}
