use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use presence_domain::error::Error;
use presence_domain::model::{NpcStateUpdate, NpcUpsertPayload, UpsertNpcOptions};
use presence_protocol::PathfindRequest;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

/// Wraps `presence_domain::error::Error` so it can be returned directly
/// from a handler — `status_code()` already implements the exact mapping
/// spec §7 calls for.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "rooms": state.directory.list_rooms().len(),
        "pathfinding": state.pathfind_grid.is_some(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeployCharacterRequest {
    pub namespace_slug: String,
    #[serde(flatten)]
    pub payload: NpcUpsertPayload,
}

/// `POST /api/deploy-character` — seats a single NPC into a named room
/// (spec §4.I), used by operator tooling outside the Registry
/// reconciliation loop to deploy/update one character directly.
pub async fn deploy_character(
    State(state): State<AppState>,
    Json(req): Json<DeployCharacterRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let room = state
        .directory
        .get_by_namespace(&req.namespace_slug)
        .ok_or_else(|| Error::NotFound(format!("no room for namespace {}", req.namespace_slug)))?;

    let assignment = room
        .upsert_npc(req.payload, UpsertNpcOptions::default())
        .await?;

    Ok(Json(json!({ "success": true, "npc": assignment_to_json(&assignment) })))
}

pub async fn list_npcs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let npcs: Vec<_> = state
        .directory
        .list_npc_assignments()
        .iter()
        .map(assignment_to_json)
        .collect();
    Json(json!({ "success": true, "npcs": npcs }))
}

pub async fn room_by_namespace(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let room = state
        .directory
        .get_by_namespace(&slug)
        .ok_or_else(|| Error::NotFound(format!("no room for namespace {slug}")))?;

    Ok(Json(json!({
        "success": true,
        "roomId": room.room_id,
        "name": room.name,
        "namespaceSlug": room.namespace_slug,
        "metadata": room.metadata(),
    })))
}

/// `GET /api/offices/{officeId}/agents` — proxies the Registry's agent
/// list; if the Registry returns nothing (unreachable, or an office with
/// no agents declared yet), falls back to synthesising entries from this
/// gateway's own locally-seated NPCs for that office (spec §4.I "fallback
/// synthesis") so the caller still sees who's actually present.
pub async fn office_agents(
    State(state): State<AppState>,
    Path(office_id): Path<String>,
) -> Json<serde_json::Value> {
    let agents = state.registry.list_agents(&office_id).await;
    if !agents.is_empty() {
        return Json(json!({ "success": true, "agents": agents, "source": "registry" }));
    }

    let synthesized: Vec<_> = state
        .directory
        .list_npc_assignments()
        .into_iter()
        .filter(|a| a.office_id.as_deref() == Some(office_id.as_str()))
        .map(|a| {
            json!({
                "id": a.registry_agent_id.clone().unwrap_or_else(|| a.agent_id.clone()),
                "agentIdentifier": a.agent_id,
                "avatarId": a.avatar_id,
                "role": a.role,
                "metadata": a.agent_metadata,
            })
        })
        .collect();

    Json(json!({ "success": true, "agents": synthesized, "source": "local-fallback" }))
}

#[derive(Debug, Serialize)]
pub struct DestroyRoomResponse {
    pub success: bool,
    pub removed_rooms: usize,
    pub removed_agents: usize,
}

/// `DELETE /api/rooms/{slug}` — destroys every room matching the
/// namespace's candidate set, then fires a best-effort cache-invalidate
/// request at the chat bridge (spec §4.I); the invalidate call's result is
/// never awaited by the response.
pub async fn destroy_room(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<DestroyRoomResponse>> {
    let result = state.directory.destroy_namespace(&slug)?;

    let url = format!("{}/invalidate", state.config.chat_bridge.url);
    let body = json!({ "namespaceSlug": slug });
    tokio::spawn(async move {
        if let Err(e) = reqwest::Client::new().post(&url).json(&body).send().await {
            tracing::warn!(error = %e, url, "chat bridge invalidate call failed");
        }
    });

    Ok(Json(DestroyRoomResponse {
        success: true,
        removed_rooms: result.removed_rooms,
        removed_agents: result.removed_agents,
    }))
}

/// `DELETE /api/npcs/{agentId}` — removes an NPC from every room it's
/// seated in (spec §4.I, §4.G `removeNpcEverywhere`).
pub async fn remove_npc_everywhere(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed_from = state.directory.remove_npc_everywhere(&agent_id).await?;
    Ok(Json(json!({ "success": true, "removedFrom": removed_from })))
}

/// `POST /api/npcs/{agentId}/persist` — applies a partial state patch to
/// an NPC wherever it's currently seated (spec §4.I `updateNpcState`).
/// Rejects an empty patch.
pub async fn persist_npc_state(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(update): Json<NpcStateUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    if !update.has_any_field() {
        return Err(Error::Validation("patch must set at least one field".into()).into());
    }

    let room = state
        .directory
        .find_room_with_agent(&agent_id)
        .ok_or_else(|| Error::NotFound(format!("no seated npc {agent_id}")))?;

    let assignment = room.update_npc_state(&agent_id, update).await?;
    Ok(Json(json!({ "success": true, "npc": assignment_to_json(&assignment) })))
}

/// `POST /api/pathfind` — runs A* off the async runtime via
/// `spawn_blocking` (spec §5 suspension point (vi)); 503 if no grid was
/// configured at startup, 404 if no path exists between the two points.
pub async fn pathfind(
    State(state): State<AppState>,
    Json(req): Json<PathfindRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let grid = state
        .pathfind_grid
        .clone()
        .ok_or_else(|| Error::NoCapacity("no pathfinding grid configured".into()))?;

    let path = tokio::task::spawn_blocking(move || presence_pathfinding::find_path(&grid, req.start, req.target))
        .await
        .map_err(|e| Error::Internal(format!("pathfinding task panicked: {e}")))?;

    match path {
        Some(waypoints) => Ok(Json(json!({ "success": true, "path": waypoints }))),
        None => Err(Error::NotFound("no path between start and target".into()).into()),
    }
}

fn assignment_to_json(a: &presence_domain::model::NpcAssignment) -> serde_json::Value {
    json!({
        "agentId": a.agent_id,
        "officeId": a.office_id,
        "name": a.name,
        "avatarId": a.avatar_id,
        "workstationId": a.workstation_id,
        "position": a.position,
        "role": a.role,
        "computerId": a.computer_id,
        "voiceAgentId": a.voice_agent_id,
        "namespaceSlug": a.namespace_slug,
        "roomId": a.room_id,
    })
}

