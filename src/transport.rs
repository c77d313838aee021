//! Transport abstraction for the game-state channel.
//!
//! The [`Transport`] trait is a bidirectional text message channel between
//! one client and the game server for one room. The server speaks JSON text
//! frames, so implementations only shuttle complete strings; framing is their
//! business.
//!
//! Connection setup is not part of the trait. A WebSocket needs a URL, a test
//! double needs channels; build a connected transport first, then hand it to
//! `GameClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use escape_sync_client::error::SyncError;
//! use escape_sync_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     tx: mpsc::UnboundedSender<String>,
//!     rx: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SyncError> {
//!         self.tx
//!             .send(message)
//!             .map_err(|e| SyncError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SyncError>> {
//!         self.rx.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SyncError> {
//!         self.rx.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SyncError;

/// A bidirectional text message transport to the game server.
///
/// Each [`send`](Transport::send) transmits one complete JSON message and
/// each [`recv`](Transport::recv) yields one. Messages must be yielded in the
/// order the server sent them.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: it runs inside
/// `tokio::select!`, and a cancelled call must not lose a message.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransportSend`] if the message could not be sent,
    /// or [`SyncError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), SyncError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` for a complete message
    /// - `Some(Err(e))` for a transport error
    /// - `None` once the server closed the connection
    async fn recv(&mut self) -> Option<Result<String, SyncError>>;

    /// Close the connection. Must be idempotent and must drop anything not
    /// yet sent.
    async fn close(&mut self) -> Result<(), SyncError>;
}
