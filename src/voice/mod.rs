//! Peer-to-peer voice between the two players of a room.
//!
//! The game socket and the voice channel are independent: nothing here
//! assumes any ordering against game messages, and losing voice never ends
//! the game session.

pub mod backoff;
pub mod identity;
pub mod media;
pub mod negotiator;
pub mod signaling;

pub use backoff::{Backoff, BackoffDecision, ReconnectPolicy};
pub use media::{AudioLevelMeter, LocalStream, MediaDevices, MediaTrack, RemoteStream};
pub use negotiator::{CallState, VoiceConfig, VoiceNegotiator, VoiceStatus, VoiceUpdate};
pub use signaling::{IceServer, SignalingConfig, SignalingEvent, SignalingPeer};
