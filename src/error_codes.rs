//! Structured error codes carried on the wire or reported by collaborators.
//!
//! [`NameRejectReason`] mirrors the `reason` field of the game server's
//! `name_status` reply. [`SignalingErrorKind`] classifies the error types
//! raised by the voice signaling library.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the game server refused a `set_name` request.
///
/// Serialized as lowercase strings (`"empty"`, `"duplicate"`). Any other
/// reason deserializes to [`Other`](NameRejectReason::Other).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameRejectReason {
    /// The name was blank after trimming.
    Empty,
    /// Another player in the room already uses this name (case-insensitive).
    Duplicate,
    /// A reason this client does not know about.
    #[serde(other)]
    Other,
}

impl NameRejectReason {
    /// Returns a human-readable description suitable for the name prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Empty => "The name is empty. Please enter a display name.",
            Self::Duplicate => {
                "This name is already taken by the other player. Please choose another one."
            }
            Self::Other => "The server refused this name. Please choose another one.",
        }
    }
}

impl fmt::Display for NameRejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Duplicate => "duplicate",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Error categories reported by the voice signaling peer.
///
/// Serialized in kebab-case (`"invalid-id"`, `"peer-unavailable"`, ...),
/// matching the signaling library's error `type` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingErrorKind {
    /// The requested peer id contains characters the server refuses.
    InvalidId,
    /// The signaling server could not be reached.
    Network,
    /// The signaling server failed internally.
    ServerError,
    /// The remote peer id is not connected to the signaling server.
    PeerUnavailable,
    /// Any other error type.
    #[serde(other)]
    Other,
}

impl SignalingErrorKind {
    /// Classify a raw error type string from the signaling library.
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "invalid-id" => Self::InvalidId,
            "network" => Self::Network,
            "server-error" => Self::ServerError,
            "peer-unavailable" => Self::PeerUnavailable,
            _ => Self::Other,
        }
    }

    /// Returns a human-readable description for the voice panel.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidId => "Invalid peer id: it contains characters that are not allowed.",
            Self::Network => "Network problem. Check your connection.",
            Self::ServerError => "The voice server failed. Try again later.",
            Self::PeerUnavailable => "Your partner is not available.",
            Self::Other => "Voice connection error.",
        }
    }
}

impl fmt::Display for SignalingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
