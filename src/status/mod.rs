use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Canonical connection lifecycle state of an instance.
///
/// Every other module consumes this enum; the raw vendor vocabulary from the
/// session server never leaves [`map_raw_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Initial state, also entered on explicit teardown.
    Disconnected,
    /// Creation requested, waiting for the session server to accept.
    Connecting,
    /// Session accepted, no pairing code available yet.
    WaitingQr,
    /// A pairing code is available for the user to scan.
    QrGenerated,
    /// Peer scanned and authenticated.
    Ready,
    /// Unexpected failure, re-enterable.
    Error,
}

impl ConnectionStatus {
    /// Stable string representation used in the database and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::WaitingQr => "waiting_qr",
            Self::QrGenerated => "qr_generated",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// Whether this state counts as terminal for db-only orphan handling.
    pub fn is_terminal_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "waiting_qr" => Ok(Self::WaitingQr),
            "qr_generated" => Ok(Self::QrGenerated),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Error returned when a stored status string is not part of the closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection status: {0}")]
pub struct UnknownStatus(pub String);

/// Returns whether the state machine allows moving `from` -> `to`.
///
/// Rules:
/// - any state may move to `Disconnected` (explicit teardown) or `Error`
///   (unexpected failure);
/// - `Disconnected` and `Error` may only leave through `Connecting`;
/// - within the pairing pipeline, forward progress may skip intermediate
///   states (webhook deliveries can be missed), and `QrGenerated` may fall
///   back to `WaitingQr` when a code expires.
pub fn is_allowed_transition(from: ConnectionStatus, to: ConnectionStatus) -> bool {
    use ConnectionStatus::*;

    if from == to {
        return true;
    }

    match to {
        Disconnected | Error => true,
        Connecting => matches!(from, Disconnected | Error),
        WaitingQr => matches!(from, Connecting | QrGenerated),
        QrGenerated => matches!(from, Connecting | WaitingQr),
        Ready => matches!(from, Connecting | WaitingQr | QrGenerated),
    }
}

/// Maps the session server's raw status vocabulary to the canonical enum.
///
/// Unknown or empty values map to `None`: callers must leave the stored
/// status untouched (stale-write protection) and keep the raw string only
/// for diagnostics.
pub fn map_raw_status(raw: &str) -> Option<ConnectionStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "created" | "starting" | "connecting" | "pending" | "initializing" => {
            Some(ConnectionStatus::Connecting)
        }
        "waiting_qr" | "waiting_for_qr" | "qr_pending" => Some(ConnectionStatus::WaitingQr),
        "qr" | "qrcode" | "qr_generated" | "pairing" => Some(ConnectionStatus::QrGenerated),
        "open" | "online" | "connected" | "ready" | "inchat" => Some(ConnectionStatus::Ready),
        "close" | "closed" | "disconnect" | "disconnected" | "offline" | "logout" => {
            Some(ConnectionStatus::Disconnected)
        }
        "error" | "failed" | "banned" => Some(ConnectionStatus::Error),
        _ => None,
    }
}
