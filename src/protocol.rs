//! Wire-compatible message types for the game-state WebSocket.
//!
//! Every message is a JSON text frame, internally tagged by a snake_case
//! `type` field (`{"type":"set_name","name":"Alice"}`). Both directions are
//! closed unions: inbound frames with a `type` this client does not know
//! deserialize to [`ServerMessage::Unknown`] and are ignored by the caller
//! instead of being trusted by shape. Unknown fields are ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::error_codes::NameRejectReason;

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned player slot (1 or 2) for one connection.
pub type PlayerId = u8;

/// Room identifier as handed out by the lobby (`"a1b2c3d4"`, `"solo-…"`).
pub type RoomId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Camera mode a player looks through.
///
/// On the wire: `"BASE"`, `"NVG"`, `"THERMAL"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CameraMode {
    /// Plain daylight image.
    #[default]
    #[serde(rename = "BASE")]
    Base,
    /// Night-vision lens.
    #[serde(rename = "NVG", alias = "NIGHT_VISION")]
    NightVision,
    /// Thermal lens; the only mode in which the target can be spotted.
    #[serde(rename = "THERMAL")]
    Thermal,
}

impl CameraMode {
    /// The wire spelling of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::NightVision => "NVG",
            Self::Thermal => "THERMAL",
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASE" => Ok(Self::Base),
            "NVG" | "NIGHT_VISION" => Ok(Self::NightVision),
            "THERMAL" => Ok(Self::Thermal),
            other => Err(SyncError::InvalidMode(other.to_string())),
        }
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A point in the 512×512 viewport space used by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One player's entry inside a [`RoomSnapshot`].
///
/// `mode` stays a raw string so that one bad value does not make the whole
/// `game_state` frame undecodable; the view validates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSnapshot {
    #[serde(default = "default_snapshot_mode")]
    pub mode: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub score: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_snapshot_mode() -> String {
    CameraMode::NightVision.as_str().to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            mode: default_snapshot_mode(),
            position: Position::new(400.0, 300.0),
            score: 0,
            active: true,
        }
    }
}

/// The full room state embedded in `game_state` frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RoomSnapshot {
    #[serde(default)]
    pub player1: Option<PlayerSnapshot>,
    #[serde(default)]
    pub player2: Option<PlayerSnapshot>,
    #[serde(default)]
    pub current_player: Option<PlayerId>,
    #[serde(default)]
    pub game_started: bool,
}

impl RoomSnapshot {
    /// Iterate over the players present in the snapshot with their slot.
    pub fn players(&self) -> impl Iterator<Item = (PlayerId, &PlayerSnapshot)> {
        [(1, self.player1.as_ref()), (2, self.player2.as_ref())]
            .into_iter()
            .filter_map(|(id, p)| p.map(|p| (id, p)))
    }
}

/// A connection's identity in the room: server-assigned slot plus the
/// display name the server confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub name: Option<String>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to game server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register or claim a display name. Sent first on every connection.
    SetName { name: String },
    /// Declare the active camera mode.
    ModeChange { mode: CameraMode },
    /// Report the local cursor / viewport position.
    Move { position: Position },
    /// Report an interaction point.
    Click { x: f64, y: f64 },
    /// Ask the server to start the room-wide hazard.
    TriggerAlarm {
        alarm_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        triggered_by: Option<PlayerId>,
    },
    /// Ask the server to stop the room-wide hazard.
    StopAlarm {
        #[serde(skip_serializing_if = "Option::is_none")]
        stopped_by: Option<PlayerId>,
    },
    /// Request the current hazard snapshot (late join / reconnect).
    GetAlarmState,
    /// Hand the active turn to the other player.
    SwitchPlayer,
}

/// Message types sent from game server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Initial or periodic full state for the receiving connection.
    GameState {
        /// Slot assigned to the receiving connection.
        player_id: PlayerId,
        /// Rendered image as a `data:` URL.
        image_data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_state: Option<RoomSnapshot>,
        #[serde(default)]
        game_started: bool,
    },
    /// Incremental update for one player.
    Frame {
        player_id: PlayerId,
        image_data: String,
        position: Position,
    },
    /// A player switched camera mode. `mode` is validated by the view.
    ModeChange { player_id: PlayerId, mode: String },
    /// Identity-scoped discovery event: only `player_id` should react.
    DroneDetected {
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_score: Option<u32>,
    },
    /// Accept / reject reply to `set_name`.
    NameStatus {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<NameRejectReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Hazard snapshot reply to `get_alarm_state`.
    AlarmState {
        active: bool,
        remaining: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        triggered_by: Option<PlayerId>,
    },
    /// Broadcast: hazard started.
    GlobalAlarm {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        triggered_by: Option<PlayerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alarm_type: Option<String>,
    },
    /// Broadcast: hazard stopped.
    GlobalAlarmStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stopped_by: Option<PlayerId>,
    },
    /// Broadcast: the active turn moved to `current_player`.
    PlayerSwitched { current_player: PlayerId },
    /// Any `type` outside this union.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// The wire `type` of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GameState { .. } => "game_state",
            Self::Frame { .. } => "frame",
            Self::ModeChange { .. } => "mode_change",
            Self::DroneDetected { .. } => "drone_detected",
            Self::NameStatus { .. } => "name_status",
            Self::AlarmState { .. } => "alarm_state",
            Self::GlobalAlarm { .. } => "global_alarm",
            Self::GlobalAlarmStop { .. } => "global_alarm_stop",
            Self::PlayerSwitched { .. } => "player_switched",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn camera_mode_parses_wire_and_long_names() {
        assert_eq!("NVG".parse::<CameraMode>().unwrap(), CameraMode::NightVision);
        assert_eq!(
            "NIGHT_VISION".parse::<CameraMode>().unwrap(),
            CameraMode::NightVision
        );
        assert!(matches!(
            "ULTRAVIOLET".parse::<CameraMode>(),
            Err(SyncError::InvalidMode(m)) if m == "ULTRAVIOLET"
        ));
    }

    #[test]
    fn snapshot_players_skips_missing_slots() {
        let snap = RoomSnapshot {
            player2: Some(PlayerSnapshot::default()),
            ..Default::default()
        };
        let ids: Vec<_> = snap.players().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn unknown_server_type_is_captured() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"weather_report","rain":true}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
        assert_eq!(msg.kind(), "unknown");
    }
}
