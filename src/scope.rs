//! Visibility rules for inbound game messages.
//!
//! Every client in a room receives every broadcast. Most of them are global,
//! but a discovery (`drone_detected`) belongs to the player who made it: the
//! other client receives the same frame and must not show anything. This
//! keeps a shared secret private per player without a private channel.

use crate::protocol::{PlayerId, ServerMessage};

/// Who a message is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Everyone in the room reacts.
    Global,
    /// Only the client whose identity equals `owner` reacts.
    Owner(PlayerId),
}

/// The outcome of [`filter`] for one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filtered<'a> {
    /// Whether the local client should show any effect.
    pub visible: bool,
    /// The scope the decision was based on.
    pub scope: Scope,
    /// The message itself, untouched.
    pub payload: &'a ServerMessage,
}

/// The scope carried by a message.
pub fn scope_of(message: &ServerMessage) -> Scope {
    match message {
        ServerMessage::DroneDetected { player_id, .. } => Scope::Owner(*player_id),
        _ => Scope::Global,
    }
}

/// Decide whether `message` is visible to `local`.
///
/// Pure: the same inputs always give the same answer. A client that does not
/// know its own slot yet (`local == None`) sees no scoped events.
pub fn filter(message: &ServerMessage, local: Option<PlayerId>) -> Filtered<'_> {
    let scope = scope_of(message);
    let visible = match scope {
        Scope::Global => true,
        Scope::Owner(owner) => local == Some(owner),
    };
    Filtered {
        visible,
        scope,
        payload: message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::Position;

    fn detected(player_id: PlayerId) -> ServerMessage {
        ServerMessage::DroneDetected {
            player_id,
            position: Some(Position::new(120.0, 80.0)),
            new_score: Some(1),
        }
    }

    #[test]
    fn discovery_is_visible_only_to_its_owner() {
        let msg = detected(1);
        assert!(filter(&msg, Some(1)).visible);
        assert!(!filter(&msg, Some(2)).visible);
        assert_eq!(filter(&msg, Some(2)).scope, Scope::Owner(1));
    }

    #[test]
    fn unknown_local_identity_sees_no_scoped_event() {
        assert!(!filter(&detected(1), None).visible);
    }

    #[test]
    fn broadcasts_are_global() {
        let msgs = [
            ServerMessage::GlobalAlarm {
                triggered_by: Some(1),
                alarm_type: None,
            },
            ServerMessage::GlobalAlarmStop { stopped_by: None },
            ServerMessage::Frame {
                player_id: 2,
                image_data: String::new(),
                position: Position::default(),
            },
            ServerMessage::PlayerSwitched { current_player: 2 },
        ];
        for msg in &msgs {
            let out = filter(msg, Some(1));
            assert!(out.visible, "{} should be global", msg.kind());
            assert_eq!(out.scope, Scope::Global);
        }
    }

    #[test]
    fn decision_does_not_depend_on_call_history() {
        let msg = detected(2);
        let first = filter(&msg, Some(2));
        let _ = filter(&detected(1), Some(2));
        let again = filter(&msg, Some(2));
        assert_eq!(first, again);
        assert!(std::ptr::eq(again.payload, &msg));
    }
}
