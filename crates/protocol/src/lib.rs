//! Realtime message contract and join-handshake payload types (spec §4.F,
//! §4.B, §6).
//!
//! The realtime transport itself (wire framing, matchmaking) is an external
//! collaborator (spec §1 Non-goals); this crate only captures the message
//! names/payloads a `Room` must understand and the manager-token shape an
//! NPC handshake presents.

use presence_domain::model::Position;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in the realtime contract table (spec §4.F). `payload`
/// carries the message-specific fields; unknown payload shapes are kept as
/// `Other` so a malformed client message never panics the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RoomMessage {
    #[serde(rename = "CONNECT_TO_COMPUTER")]
    ConnectToComputer { computer_id: usize },
    #[serde(rename = "DISCONNECT_FROM_COMPUTER")]
    DisconnectFromComputer { computer_id: usize },
    #[serde(rename = "STOP_SCREEN_SHARE")]
    StopScreenShare { computer_id: usize },
    #[serde(rename = "CONNECT_TO_WHITEBOARD")]
    ConnectToWhiteboard { whiteboard_id: usize },
    #[serde(rename = "DISCONNECT_FROM_WHITEBOARD")]
    DisconnectFromWhiteboard { whiteboard_id: usize },
    #[serde(rename = "UPDATE_PLAYER")]
    UpdatePlayer { x: f64, y: f64, anim: String },
    #[serde(rename = "UPDATE_PLAYER_NAME")]
    UpdatePlayerName { name: String },
    #[serde(rename = "READY_TO_CONNECT")]
    ReadyToConnect,
    #[serde(rename = "VIDEO_CONNECTED")]
    VideoConnected,
    #[serde(rename = "DISCONNECT_STREAM")]
    DisconnectStream { client_id: String },
    #[serde(rename = "ADD_CHAT_MESSAGE")]
    AddChatMessage { content: String },
}

/// A message forwarded by the gateway to one or more peer sessions
/// (`STOP_SCREEN_SHARE`, `DISCONNECT_STREAM`, chat fan-out).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutboundRoomMessage {
    #[serde(rename = "STOP_SCREEN_SHARE")]
    StopScreenShare { from_session_id: String },
    #[serde(rename = "DISCONNECT_STREAM")]
    DisconnectStream { from_client_id: String },
    #[serde(rename = "ADD_CHAT_MESSAGE")]
    AddChatMessage {
        content: String,
        from_session_id: String,
    },
}

/// Payload carried inside a manager token (spec §6 "Manager token format").
/// All fields optional; recognised keys are pulled out, everything else is
/// kept in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerTokenPayload {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub namespace_slug: Option<String>,
    #[serde(default)]
    pub office_id: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ManagerTokenPayload {
    /// `namespace` and `namespaceSlug` are accepted interchangeably
    /// (spec §4.B recognised fields); this returns whichever was set.
    pub fn namespace_claim(&self) -> Option<&str> {
        self.namespace
            .as_deref()
            .or(self.namespace_slug.as_deref())
    }
}

/// Join options a client presents at handshake time (spec §4.F `onAuth`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinOptions {
    #[serde(default)]
    pub namespace_slug: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub manager_token: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthOptions>,
}

impl JoinOptions {
    /// The manager token wherever it was supplied: `options.auth.managerToken`
    /// or `options.managerToken` (spec §4.F).
    pub fn manager_token(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .and_then(|a| a.manager_token.as_deref())
            .or(self.manager_token.as_deref())
    }

    pub fn is_npc_handshake(&self) -> bool {
        self.agent_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthOptions {
    #[serde(default)]
    pub manager_token: Option<String>,
}

/// Opaque user-data attached to a client on successful NPC handshake
/// (spec §4.F "On success, attach ...").
#[derive(Debug, Clone, Serialize)]
pub struct NpcClientData {
    pub npc_agent_id: String,
    pub npc_key: String,
    pub manager_token_payload: ManagerTokenPayload,
    pub presence_secret_source: String,
}

/// Validated start/target position pair for a pathfind request (spec §4.I
/// `POST /api/pathfind`).
#[derive(Debug, Clone, Deserialize)]
pub struct PathfindRequest {
    pub start: Position,
    pub target: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_options_prefers_nested_auth_token() {
        let opts = JoinOptions {
            manager_token: Some("outer".into()),
            auth: Some(AuthOptions {
                manager_token: Some("inner".into()),
            }),
            ..Default::default()
        };
        assert_eq!(opts.manager_token(), Some("inner"));
    }

    #[test]
    fn join_options_falls_back_to_flat_token() {
        let opts = JoinOptions {
            manager_token: Some("outer".into()),
            ..Default::default()
        };
        assert_eq!(opts.manager_token(), Some("outer"));
    }

    #[test]
    fn manager_token_payload_namespace_claim_prefers_namespace() {
        let payload = ManagerTokenPayload {
            namespace: Some("alpha".into()),
            namespace_slug: Some("beta".into()),
            ..Default::default()
        };
        assert_eq!(payload.namespace_claim(), Some("alpha"));
    }

    #[test]
    fn room_message_round_trips_through_json() {
        let msg = RoomMessage::UpdatePlayer {
            x: 1.0,
            y: 2.0,
            anim: "adam_idle_down".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: RoomMessage = serde_json::from_str(&json).unwrap();
        match back {
            RoomMessage::UpdatePlayer { x, y, anim } => {
                assert_eq!((x, y, anim.as_str()), (1.0, 2.0, "adam_idle_down"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
