//! Signaling broker configuration and the peer abstraction.
//!
//! Offers, answers and ICE candidates never surface here. A
//! [`SignalingPeer`] implementation owns that exchange and reports what the
//! negotiator cares about as a closed [`SignalingEvent`] union.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SyncError;
use crate::error_codes::SignalingErrorKind;
use crate::voice::media::{LocalStream, RemoteStream};

/// Broker host when nothing is configured.
pub const DEFAULT_HOST: &str = "localhost";
/// Broker port when nothing is configured.
pub const DEFAULT_PORT: u16 = 9000;
/// Broker path when nothing is configured.
pub const DEFAULT_PATH: &str = "/";
/// Broker API key when nothing is configured.
pub const DEFAULT_KEY: &str = "peerjs";
/// Public STUN servers used by default.
pub const DEFAULT_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// One ICE server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: String,
}

impl IceServer {
    pub fn new(urls: impl Into<String>) -> Self {
        Self { urls: urls.into() }
    }
}

/// Where the signaling broker lives.
///
/// # Example
///
/// ```
/// use escape_sync_client::voice::SignalingConfig;
///
/// let config = SignalingConfig::new().with_host("voice.example.org").with_secure(true);
/// assert_eq!(config.server_url(), "https://voice.example.org:9000/");
/// assert_eq!(config.ice_servers.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub key: String,
    pub secure: bool,
    pub ice_servers: Vec<IceServer>,
}

impl SignalingConfig {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            key: DEFAULT_KEY.to_string(),
            secure: false,
            ice_servers: DEFAULT_STUN_SERVERS.iter().map(|u| IceServer::new(*u)).collect(),
        }
    }

    /// Defaults overridden by `PEERJS_HOST`, `PEERJS_PORT`, `PEERJS_PATH`,
    /// `PEERJS_KEY` and `PEERJS_SECURE`. Unparsable values are logged and
    /// skipped.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injected lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();
        if let Some(host) = lookup("PEERJS_HOST").filter(|v| !v.is_empty()) {
            config.host = host;
        }
        if let Some(port) = lookup("PEERJS_PORT") {
            match port.trim().parse() {
                Ok(port) => config.port = port,
                Err(e) => warn!(value = %port, "ignoring PEERJS_PORT: {e}"),
            }
        }
        if let Some(path) = lookup("PEERJS_PATH").filter(|v| !v.is_empty()) {
            config.path = path;
        }
        if let Some(key) = lookup("PEERJS_KEY").filter(|v| !v.is_empty()) {
            config.key = key;
        }
        if let Some(secure) = lookup("PEERJS_SECURE") {
            match secure.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.secure = true,
                "0" | "false" | "no" | "" => config.secure = false,
                other => warn!(value = %other, "ignoring PEERJS_SECURE"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Base URL of the broker.
    pub fn server_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a signaling peer reports.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Registered with the broker under `peer_id`.
    Open { peer_id: String },
    /// Lost the broker connection; may be recovered with `reconnect`.
    Disconnected,
    /// The peer is gone for good.
    Closed,
    /// A remote peer is calling.
    IncomingCall { from: String },
    /// The remote audio of the current call arrived.
    RemoteStream { from: String, stream: RemoteStream },
    /// The current call ended on the remote side.
    CallClosed,
    /// Something failed. `kind` is already classified.
    Error {
        kind: SignalingErrorKind,
        message: String,
    },
}

impl SignalingEvent {
    /// Build an [`Error`](Self::Error) from the broker's raw error type.
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self::Error {
            kind: SignalingErrorKind::from_type(kind),
            message: message.into(),
        }
    }
}

/// A peer registered with the signaling broker.
///
/// Implementations wrap a concrete WebRTC stack. At most one call is
/// handled at a time; the negotiator enforces that.
#[async_trait]
pub trait SignalingPeer: Send {
    /// Register with the broker under `peer_id`. Completion is reported
    /// through [`SignalingEvent::Open`].
    async fn open(&mut self, peer_id: &str) -> Result<(), SyncError>;

    /// Re-register after [`SignalingEvent::Disconnected`].
    async fn reconnect(&mut self) -> Result<(), SyncError>;

    /// Call `remote_peer_id`, sending `stream`.
    async fn call(&mut self, remote_peer_id: &str, stream: &LocalStream) -> Result<(), SyncError>;

    /// Answer the pending incoming call with `stream`.
    async fn answer(&mut self, stream: &LocalStream) -> Result<(), SyncError>;

    /// Refuse the pending incoming call.
    async fn reject(&mut self) -> Result<(), SyncError>;

    /// End the current call.
    async fn hang_up(&mut self) -> Result<(), SyncError>;

    /// Leave the broker for good.
    async fn destroy(&mut self) -> Result<(), SyncError>;

    /// Next event, or `None` once the peer is gone.
    ///
    /// Must be cancel-safe: it is used as a `tokio::select!` branch.
    async fn next_event(&mut self) -> Option<SignalingEvent>;
}
