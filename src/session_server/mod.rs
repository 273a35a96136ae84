//! Boundary to the external session server: the separate process that holds
//! one live WhatsApp-protocol socket per instance. Every call here is a
//! suspension point and carries its own timeout; all local state transitions
//! stay synchronous.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use http::HttpSessionServer;

#[derive(Debug, Error)]
pub enum SessionServerError {
    #[error("session server transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("session server request timed out")]
    Timeout,
    #[error("session server rejected request: {status} {message}")]
    Rejected { status: u16, message: String },
}

/// Result of asking the server to start a new socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
    pub initial_status: String,
}

/// Current pairing-code availability for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    pub ready: bool,
    #[serde(default)]
    pub code: Option<String>,
    /// Server is still producing a code; does not consume a polling attempt.
    #[serde(default)]
    pub generating: bool,
}

/// Authoritative status and metadata for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub raw_status: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

/// One entry of the server's live process list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub session_id: String,
    pub raw_status: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

/// Abstracted session server; the engine only ever talks through this trait
/// so tests can script the live side of reconciliation.
#[async_trait]
pub trait SessionServer: Send + Sync {
    async fn create_session(
        &self,
        instance_id: Uuid,
        owner_id: &str,
    ) -> Result<CreatedSession, SessionServerError>;

    async fn pairing_code(&self, session_id: &str) -> Result<PairingCode, SessionServerError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, SessionServerError>;

    async fn list_live_sessions(&self) -> Result<Vec<LiveSession>, SessionServerError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), SessionServerError>;
}
