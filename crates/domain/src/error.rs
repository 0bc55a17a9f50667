//! Shared error type for the presence/room orchestrator.
//!
//! Handshake and admin-API failures need an HTTP status alongside the
//! message, so [`Error`] carries a `status_code()` rather than relying on
//! callers to map kinds by hand.

/// Shared error type used across all presence-orchestrator crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("auth required: {0}")]
    AuthRequired(String),

    #[error("auth mismatch: {0}")]
    AuthMismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Namespace handshake redirect: the room the client should retry against.
    #[error("redirect to room {room_id}")]
    Redirect { room_id: String },

    #[error("no capacity: {0}")]
    NoCapacity(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code for this error kind, per spec §7's status mapping.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::AuthRequired(_) | Error::AuthMismatch(_) => 403,
            Error::NotFound(_) => 404,
            Error::Redirect { .. } => 410,
            Error::NoCapacity(_) => 503,
            Error::UpstreamUnavailable(_) => 502,
            Error::Persistence(_) | Error::Io(_) | Error::Json(_) | Error::Internal(_) => 500,
        }
    }
}
