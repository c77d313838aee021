//! Events emitted by [`GameClient`](crate::client::GameClient).
//!
//! Most variants map one-to-one onto a [`ServerMessage`]. `Connected` and
//! `Disconnected` are synthesized by the transport loop, and `name_status` is
//! split into `NameAccepted` / `NameRejected` so the caller can surface the
//! rejection without inspecting flags.

use crate::error_codes::NameRejectReason;
use crate::protocol::{PlayerId, Position, RoomSnapshot, ServerMessage};

/// A typed event from the game socket.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The transport loop started. Always the first event.
    Connected,
    /// Full state for this connection; carries the server-assigned slot.
    GameState {
        player_id: PlayerId,
        image_data: String,
        snapshot: Option<RoomSnapshot>,
        game_started: bool,
    },
    /// Incremental frame for one player.
    Frame {
        player_id: PlayerId,
        image_data: String,
        position: Position,
    },
    /// A player changed camera mode (raw wire value).
    ModeChange { player_id: PlayerId, mode: String },
    /// Scoped discovery event, not yet filtered for visibility.
    DroneDetected {
        player_id: PlayerId,
        position: Option<Position>,
        new_score: Option<u32>,
    },
    /// `set_name` was accepted; the identity is now confirmed.
    NameAccepted { name: String },
    /// `set_name` was refused; the user has to pick another name.
    NameRejected { reason: NameRejectReason },
    /// Hazard snapshot reply.
    AlarmSnapshot {
        active: bool,
        remaining: u32,
        triggered_by: Option<PlayerId>,
    },
    /// Hazard started somewhere in the room.
    AlarmStarted {
        triggered_by: Option<PlayerId>,
        alarm_type: Option<String>,
    },
    /// Hazard stopped somewhere in the room.
    AlarmStopped { stopped_by: Option<PlayerId> },
    /// The active turn moved.
    PlayerSwitched { current_player: PlayerId },
    /// The transport closed. Always the last event; the client never retries.
    Disconnected { reason: Option<String> },
}

impl GameEvent {
    /// Rebuild the wire message this event came from, if any.
    ///
    /// Used to feed the pure filter and reducer, which operate on
    /// [`ServerMessage`]s.
    pub fn to_server_message(&self) -> Option<ServerMessage> {
        let msg = match self {
            Self::Connected | Self::Disconnected { .. } => return None,
            Self::GameState {
                player_id,
                image_data,
                snapshot,
                game_started,
            } => ServerMessage::GameState {
                player_id: *player_id,
                image_data: image_data.clone(),
                game_state: snapshot.clone(),
                game_started: *game_started,
            },
            Self::Frame {
                player_id,
                image_data,
                position,
            } => ServerMessage::Frame {
                player_id: *player_id,
                image_data: image_data.clone(),
                position: *position,
            },
            Self::ModeChange { player_id, mode } => ServerMessage::ModeChange {
                player_id: *player_id,
                mode: mode.clone(),
            },
            Self::DroneDetected {
                player_id,
                position,
                new_score,
            } => ServerMessage::DroneDetected {
                player_id: *player_id,
                position: *position,
                new_score: *new_score,
            },
            Self::NameAccepted { name } => ServerMessage::NameStatus {
                ok: true,
                reason: None,
                name: Some(name.clone()),
            },
            Self::NameRejected { reason } => ServerMessage::NameStatus {
                ok: false,
                reason: Some(*reason),
                name: None,
            },
            Self::AlarmSnapshot {
                active,
                remaining,
                triggered_by,
            } => ServerMessage::AlarmState {
                active: *active,
                remaining: *remaining,
                triggered_by: *triggered_by,
            },
            Self::AlarmStarted {
                triggered_by,
                alarm_type,
            } => ServerMessage::GlobalAlarm {
                triggered_by: *triggered_by,
                alarm_type: alarm_type.clone(),
            },
            Self::AlarmStopped { stopped_by } => ServerMessage::GlobalAlarmStop {
                stopped_by: *stopped_by,
            },
            Self::PlayerSwitched { current_player } => ServerMessage::PlayerSwitched {
                current_player: *current_player,
            },
        };
        Some(msg)
    }
}

/// Convert a decoded server message into an event.
///
/// [`ServerMessage::Unknown`] is handed back as the error; the transport loop
/// logs and ignores such frames.
impl TryFrom<ServerMessage> for GameEvent {
    type Error = ServerMessage;

    fn try_from(msg: ServerMessage) -> Result<Self, Self::Error> {
        let event = match msg {
            ServerMessage::GameState {
                player_id,
                image_data,
                game_state,
                game_started,
            } => Self::GameState {
                player_id,
                image_data,
                snapshot: game_state,
                game_started,
            },
            ServerMessage::Frame {
                player_id,
                image_data,
                position,
            } => Self::Frame {
                player_id,
                image_data,
                position,
            },
            ServerMessage::ModeChange { player_id, mode } => Self::ModeChange { player_id, mode },
            ServerMessage::DroneDetected {
                player_id,
                position,
                new_score,
            } => Self::DroneDetected {
                player_id,
                position,
                new_score,
            },
            ServerMessage::NameStatus {
                ok: true,
                name,
                ..
            } => Self::NameAccepted {
                name: name.unwrap_or_default(),
            },
            ServerMessage::NameStatus {
                ok: false, reason, ..
            } => Self::NameRejected {
                reason: reason.unwrap_or(NameRejectReason::Other),
            },
            ServerMessage::AlarmState {
                active,
                remaining,
                triggered_by,
            } => Self::AlarmSnapshot {
                active,
                remaining,
                triggered_by,
            },
            ServerMessage::GlobalAlarm {
                triggered_by,
                alarm_type,
            } => Self::AlarmStarted {
                triggered_by,
                alarm_type,
            },
            ServerMessage::GlobalAlarmStop { stopped_by } => Self::AlarmStopped { stopped_by },
            ServerMessage::PlayerSwitched { current_player } => {
                Self::PlayerSwitched { current_player }
            }
            ServerMessage::Unknown => return Err(ServerMessage::Unknown),
        };
        Ok(event)
    }
}
