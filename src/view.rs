//! Reactive view state derived from game messages.
//!
//! [`GameView::apply`] is a reducer: it takes the current view and one
//! message and returns the next view. It never touches the network. Image
//! payloads are shared (`Arc<str>`) so that cloning a view stays cheap.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{CameraMode, PlayerId, Position, RoomSnapshot, ServerMessage};
use crate::scope;

/// What the client knows about one player.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerView {
    pub position: Option<Position>,
    /// Last rendered image (`data:` URL) received for this player.
    pub image: Option<Arc<str>>,
    pub mode: CameraMode,
    pub score: u32,
}

/// The local discovery that resolved the minigame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discovery {
    pub position: Option<Position>,
    pub score: Option<u32>,
}

/// Everything the UI renders for the game socket.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameView {
    local_player: Option<PlayerId>,
    players: BTreeMap<PlayerId, PlayerView>,
    current_player: Option<PlayerId>,
    game_started: bool,
    discovery: Option<Discovery>,
}

impl GameView {
    /// An empty view. `local_player` may be unknown until `game_state`.
    pub fn new(local_player: Option<PlayerId>) -> Self {
        Self {
            local_player,
            ..Self::default()
        }
    }

    pub fn local_player(&self) -> Option<PlayerId> {
        self.local_player
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = (PlayerId, &PlayerView)> {
        self.players.iter().map(|(id, p)| (*id, p))
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        self.current_player
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    /// `true` once the local player found the target. Terminal.
    pub fn is_resolved(&self) -> bool {
        self.discovery.is_some()
    }

    pub fn discovery(&self) -> Option<Discovery> {
        self.discovery
    }

    /// Apply one message and return the next view.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidMode`](crate::SyncError::InvalidMode) for a
    /// `mode_change` with an unknown mode; the caller keeps the current view.
    pub fn apply(&self, message: &ServerMessage) -> Result<GameView> {
        let mut next = self.clone();

        if self.is_resolved()
            && matches!(
                message,
                ServerMessage::Frame { .. }
                    | ServerMessage::ModeChange { .. }
                    | ServerMessage::GameState { .. }
            )
        {
            debug!(kind = message.kind(), "view resolved, ignoring update");
            return Ok(next);
        }

        match message {
            ServerMessage::GameState {
                player_id,
                image_data,
                game_state,
                game_started,
            } => {
                next.local_player = Some(*player_id);
                next.game_started = *game_started;
                if let Some(snapshot) = game_state {
                    next.merge_snapshot(snapshot);
                }
                next.players.entry(*player_id).or_default().image =
                    Some(Arc::from(image_data.as_str()));
            }
            ServerMessage::Frame {
                player_id,
                image_data,
                position,
            } => {
                let player = next.players.entry(*player_id).or_default();
                player.position = Some(*position);
                player.image = Some(Arc::from(image_data.as_str()));
            }
            ServerMessage::ModeChange { player_id, mode } => {
                let mode: CameraMode = mode.parse()?;
                next.players.entry(*player_id).or_default().mode = mode;
            }
            ServerMessage::DroneDetected {
                position,
                new_score,
                player_id,
            } => {
                if !scope::filter(message, self.local_player).visible {
                    return Ok(next);
                }
                if let Some(score) = new_score {
                    next.players.entry(*player_id).or_default().score = *score;
                }
                next.discovery = Some(Discovery {
                    position: *position,
                    score: *new_score,
                });
                debug!(player_id, "target found locally, view resolved");
            }
            ServerMessage::PlayerSwitched { current_player } => {
                next.current_player = Some(*current_player);
            }
            ServerMessage::NameStatus { .. }
            | ServerMessage::AlarmState { .. }
            | ServerMessage::GlobalAlarm { .. }
            | ServerMessage::GlobalAlarmStop { .. }
            | ServerMessage::Unknown => {}
        }

        Ok(next)
    }

    fn merge_snapshot(&mut self, snapshot: &RoomSnapshot) {
        if snapshot.game_started {
            self.game_started = true;
        }
        if let Some(current) = snapshot.current_player {
            self.current_player = Some(current);
        }
        for (id, entry) in snapshot.players() {
            let player = self.players.entry(id).or_default();
            player.position = Some(entry.position);
            player.score = entry.score;
            match entry.mode.parse::<CameraMode>() {
                Ok(mode) => player.mode = mode,
                Err(e) => warn!(player_id = id, "keeping previous mode: {e}"),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::protocol::PlayerSnapshot;

    fn frame(player_id: PlayerId, x: f64) -> ServerMessage {
        ServerMessage::Frame {
            player_id,
            image_data: format!("img-{player_id}-{x}"),
            position: Position::new(x, 10.0),
        }
    }

    fn mode(player_id: PlayerId, mode: &str) -> ServerMessage {
        ServerMessage::ModeChange {
            player_id,
            mode: mode.into(),
        }
    }

    fn found(player_id: PlayerId) -> ServerMessage {
        ServerMessage::DroneDetected {
            player_id,
            position: None,
            new_score: Some(1),
        }
    }

    #[test]
    fn frame_only_touches_its_player() {
        let view = GameView::new(Some(1))
            .apply(&frame(2, 50.0))
            .unwrap()
            .apply(&frame(1, 20.0))
            .unwrap();
        let after = view.apply(&frame(1, 30.0)).unwrap();

        assert_eq!(after.player(1).unwrap().position, Some(Position::new(30.0, 10.0)));
        assert_eq!(after.player(2), view.player(2));
    }

    #[test]
    fn invalid_mode_is_rejected_and_view_kept() {
        let view = GameView::new(Some(1)).apply(&mode(1, "THERMAL")).unwrap();
        let err = view.apply(&mode(1, "X_RAY")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidMode(m) if m == "X_RAY"));
        assert_eq!(view.player(1).unwrap().mode, CameraMode::Thermal);
    }

    #[test]
    fn game_state_sets_local_player_and_merges_snapshot() {
        let snapshot = RoomSnapshot {
            player1: Some(PlayerSnapshot {
                mode: "THERMAL".into(),
                position: Position::new(1.0, 2.0),
                score: 3,
                active: true,
            }),
            player2: Some(PlayerSnapshot {
                mode: "SONAR".into(),
                ..PlayerSnapshot::default()
            }),
            current_player: Some(2),
            game_started: true,
        };
        let view = GameView::new(None)
            .apply(&ServerMessage::GameState {
                player_id: 2,
                image_data: "img".into(),
                game_state: Some(snapshot),
                game_started: true,
            })
            .unwrap();

        assert_eq!(view.local_player(), Some(2));
        assert_eq!(view.current_player(), Some(2));
        assert!(view.game_started());
        assert_eq!(view.player(1).unwrap().mode, CameraMode::Thermal);
        assert_eq!(view.player(1).unwrap().score, 3);
        // unknown mode keeps the default while the rest applies
        assert_eq!(view.player(2).unwrap().mode, CameraMode::Base);
        assert_eq!(view.player(2).unwrap().image.as_deref(), Some("img"));
    }

    #[test]
    fn foreign_discovery_changes_nothing() {
        let view = GameView::new(Some(2)).apply(&frame(2, 5.0)).unwrap();
        let after = view.apply(&found(1)).unwrap();
        assert_eq!(after, view);
        assert_eq!(after.apply(&found(1)).unwrap(), view);
    }

    #[test]
    fn own_discovery_freezes_the_view() {
        let view = GameView::new(Some(1)).apply(&found(1)).unwrap();
        assert!(view.is_resolved());

        let after = view
            .apply(&frame(1, 99.0))
            .unwrap()
            .apply(&mode(1, "NVG"))
            .unwrap()
            .apply(&found(1))
            .unwrap();
        assert_eq!(after, view);
    }
}
