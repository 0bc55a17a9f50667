//! Admin HTTP API (spec §4.I). Thin JSON handlers over `RoomDirectory`/
//! `Room` — every handler's job is extracting/validating the request and
//! shaping the `{ "success": ... }` envelope; the actual state mutation
//! lives on the domain types.

mod handlers;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/deploy-character", post(handlers::deploy_character))
        .route("/api/npcs", get(handlers::list_npcs))
        .route("/api/rooms/by-namespace/:slug", get(handlers::room_by_namespace))
        .route("/api/offices/:office_id/agents", get(handlers::office_agents))
        .route("/api/rooms/:slug", delete(handlers::destroy_room))
        .route("/api/npcs/:agent_id", delete(handlers::remove_npc_everywhere))
        .route("/api/npcs/:agent_id/persist", post(handlers::persist_npc_state))
        .route("/api/pathfind", post(handlers::pathfind))
        .with_state(state)
}
