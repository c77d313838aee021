//! # Escape Sync Client
//!
//! Client-side synchronization layer for a two-player cooperative escape
//! room played in the browser.
//!
//! Both players of a room share one game socket on the backend, a room-wide
//! hazard with a countdown, an unlock minigame that stops it, and an
//! optional peer-to-peer voice channel.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **Typed protocol**: closed [`ClientMessage`] / [`ServerMessage`] unions
//! - **WebSocket built-in**: default `transport-websocket` feature provides `WebSocketTransport`
//! - **Single-task state machines**: view, hazard, minigame and voice are
//!   owned values driven through async `next()` calls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use escape_sync_client::{BackendEndpoint, RoomSession, SessionConfig, SessionUpdate};
//!
//! let endpoint = BackendEndpoint::from_env();
//! let mut session = RoomSession::connect(&endpoint, "R1", SessionConfig::new("Alice")).await?;
//! session.trigger_alarm()?;
//!
//! while let Some(update) = session.next().await {
//!     if let SessionUpdate::MinigameOpened = update {
//!         session.click_slot(0)?;
//!     }
//! }
//! ```

pub mod alarm;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod protocol;
pub mod scheduler;
pub mod scope;
pub mod session;
pub mod slot;
pub mod transport;
pub mod transports;
pub mod view;
pub mod voice;

// Re-export primary types for ergonomic imports.
pub use alarm::{AlarmConfig, AlarmCoordinator, AlarmPhase, AlarmState, RetriggerPolicy};
pub use client::{GameClient, GameClientConfig};
pub use endpoint::BackendEndpoint;
pub use error::{Result, SyncError};
pub use error_codes::{NameRejectReason, SignalingErrorKind};
pub use event::GameEvent;
pub use protocol::{CameraMode, ClientMessage, PlayerId, Position, ServerMessage};
pub use session::{RoomSession, SessionConfig, SessionUpdate};
pub use slot::{SlotConfig, SlotMinigame, SlotOutcome};
pub use transport::Transport;
pub use view::GameView;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
