//! Error types for the session synchronization client.

use thiserror::Error;

use crate::error_codes::{NameRejectReason, SignalingErrorKind};

/// Errors that can occur anywhere in the synchronization layer.
///
/// Transport and protocol errors are turned into events or status flags at
/// component boundaries; callers only see them as `Err` from the operation
/// that caused them.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The game socket is gone; the owner has to reconnect explicitly.
    #[error("not connected to game server")]
    NotConnected,

    /// The server refused the requested display name.
    #[error("display name rejected: {}", reason.description())]
    InvalidIdentity {
        /// Why the server refused the name.
        reason: NameRejectReason,
    },

    /// A message carried a value outside the closed protocol vocabulary.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A camera mode string is not one of `BASE`, `NVG`, `THERMAL`.
    #[error("invalid camera mode: {0:?}")]
    InvalidMode(String),

    /// The room hazard countdown reached zero before it was resolved.
    #[error("hazard expired before it was resolved")]
    HazardExpired,

    /// The unlock word must be exactly four letters `A`..`Z`.
    #[error("invalid unlock target: {0:?}")]
    InvalidTarget(String),

    /// A slot column index outside `0..4`.
    #[error("slot column {0} out of range")]
    ColumnOutOfRange(usize),

    /// Microphone access was refused. Voice is disabled, the session continues.
    #[error("microphone access denied")]
    MediaPermissionDenied,

    /// A voice call is already active or being set up.
    #[error("a voice call is already in progress")]
    CallInProgress,

    /// `accept`/`reject` without a pending incoming call.
    #[error("no incoming call to answer")]
    NoIncomingCall,

    /// `hang_up` without an active call.
    #[error("no active call")]
    NoActiveCall,

    /// The voice negotiator has been closed.
    #[error("voice channel closed")]
    VoiceClosed,

    /// Every automatic reconnection attempt to the signaling server failed.
    #[error("signaling connection impossible after {attempts} attempts")]
    ConnectionImpossible {
        /// Number of reconnection attempts that were made.
        attempts: u32,
    },

    /// The signaling peer reported an error.
    #[error("signaling error ({}): {message}", kind.description())]
    Signaling {
        /// Classified error kind.
        kind: SignalingErrorKind,
        /// Raw message from the signaling library.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns `true` when the rest of the session can keep going after this
    /// error (the user may retry or pick another option).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::HazardExpired | Self::ConnectionImpossible { .. } | Self::VoiceClosed
        )
    }
}

impl From<NameRejectReason> for SyncError {
    fn from(reason: NameRejectReason) -> Self {
        Self::InvalidIdentity { reason }
    }
}

/// A specialized [`Result`] type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
