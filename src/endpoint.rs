//! Game backend location.
//!
//! The backend is addressed by its HTTP base URL; the game socket lives at
//! `{ws_base}/ws/{room_id}`, where `ws_base` swaps `http`→`ws` and
//! `https`→`wss`.

/// Environment variable holding the backend HTTP base URL.
pub const BACKEND_URL_ENV: &str = "ESCAPE_BACKEND_URL";

/// Base URL used when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Where the game server lives.
///
/// ```
/// use escape_sync_client::BackendEndpoint;
///
/// let endpoint = BackendEndpoint::new("https://escape.example.org/");
/// assert_eq!(endpoint.ws_base(), "wss://escape.example.org");
/// assert_eq!(
///     endpoint.room_socket_url("R1"),
///     "wss://escape.example.org/ws/R1"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    http_base: String,
}

impl BackendEndpoint {
    /// Use an explicit HTTP base URL. A trailing `/` is dropped.
    pub fn new(http_base: impl Into<String>) -> Self {
        let mut http_base = http_base.into();
        while http_base.ends_with('/') {
            http_base.pop();
        }
        Self { http_base }
    }

    /// Read [`BACKEND_URL_ENV`], falling back to [`DEFAULT_BACKEND_URL`].
    pub fn from_env() -> Self {
        match std::env::var(BACKEND_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    /// The HTTP base URL.
    pub fn http_base(&self) -> &str {
        &self.http_base
    }

    /// The WebSocket base URL. Bases that are already `ws(s)://` pass
    /// through untouched.
    pub fn ws_base(&self) -> String {
        if let Some(rest) = self.http_base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.http_base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.http_base.clone()
        }
    }

    /// Socket URL for one room.
    pub fn room_socket_url(&self, room_id: &str) -> String {
        format!("{}/ws/{room_id}", self.ws_base())
    }
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}
