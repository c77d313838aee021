#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests for the game socket protocol.
//!
//! Each test pins the exact JSON shape the backend sends or expects, so a
//! serde attribute change that would break compatibility fails here first.

use escape_sync_client::protocol::{
    CameraMode, ClientMessage, PlayerSnapshot, Position, RoomSnapshot, ServerMessage,
};
use escape_sync_client::{GameEvent, NameRejectReason};
use serde_json::{json, Value};

fn to_value<T: serde::Serialize>(msg: &T) -> Value {
    serde_json::to_value(msg).unwrap()
}

fn parse(json: &str) -> ServerMessage {
    serde_json::from_str(json).unwrap()
}

// ── Outgoing ────────────────────────────────────────────────────────

#[test]
fn set_name_shape() {
    assert_eq!(
        to_value(&ClientMessage::SetName {
            name: "Alice".into()
        }),
        json!({"type": "set_name", "name": "Alice"})
    );
}

#[test]
fn mode_change_uses_upper_case_modes() {
    for (mode, wire) in [
        (CameraMode::Base, "BASE"),
        (CameraMode::NightVision, "NVG"),
        (CameraMode::Thermal, "THERMAL"),
    ] {
        assert_eq!(
            to_value(&ClientMessage::ModeChange { mode }),
            json!({"type": "mode_change", "mode": wire})
        );
    }
}

#[test]
fn move_and_click_shapes() {
    assert_eq!(
        to_value(&ClientMessage::Move {
            position: Position::new(12.5, 40.0)
        }),
        json!({"type": "move", "position": {"x": 12.5, "y": 40.0}})
    );
    assert_eq!(
        to_value(&ClientMessage::Click { x: 1.0, y: 2.0 }),
        json!({"type": "click", "x": 1.0, "y": 2.0})
    );
}

#[test]
fn alarm_commands_shapes() {
    assert_eq!(
        to_value(&ClientMessage::TriggerAlarm {
            alarm_type: "intrusion".into(),
            triggered_by: Some(1)
        }),
        json!({"type": "trigger_alarm", "alarm_type": "intrusion", "triggered_by": 1})
    );
    assert_eq!(
        to_value(&ClientMessage::StopAlarm { stopped_by: None }),
        json!({"type": "stop_alarm"})
    );
    assert_eq!(
        to_value(&ClientMessage::GetAlarmState),
        json!({"type": "get_alarm_state"})
    );
    assert_eq!(
        to_value(&ClientMessage::SwitchPlayer),
        json!({"type": "switch_player"})
    );
}

// ── Incoming ────────────────────────────────────────────────────────

#[test]
fn game_state_with_embedded_snapshot() {
    let msg = parse(
        r#"{
            "type": "game_state",
            "player_id": 2,
            "image_data": "data:image/jpeg;base64,AAAA",
            "game_state": {
                "player1": {"mode": "THERMAL", "position": {"x": 1, "y": 2}, "score": 3, "active": true},
                "player2": {"position": {"x": 400, "y": 300}},
                "current_player": 1,
                "game_started": true
            },
            "game_started": true
        }"#,
    );
    let ServerMessage::GameState {
        player_id,
        game_state: Some(snapshot),
        game_started,
        ..
    } = msg
    else {
        panic!("expected game_state with snapshot, got {msg:?}");
    };
    assert_eq!(player_id, 2);
    assert!(game_started);
    assert_eq!(snapshot.current_player, Some(1));
    assert_eq!(snapshot.player1.as_ref().unwrap().score, 3);
    // missing fields take the server defaults
    let p2 = snapshot.player2.unwrap();
    assert_eq!(p2.mode, "NVG");
    assert!(p2.active);
}

#[test]
fn game_state_without_snapshot() {
    let msg = parse(r#"{"type":"game_state","player_id":1,"image_data":"x"}"#);
    assert_eq!(
        msg,
        ServerMessage::GameState {
            player_id: 1,
            image_data: "x".into(),
            game_state: None,
            game_started: false,
        }
    );
}

#[test]
fn mode_change_keeps_raw_mode() {
    let msg = parse(r#"{"type":"mode_change","player_id":1,"mode":"ULTRAVIOLET"}"#);
    assert_eq!(
        msg,
        ServerMessage::ModeChange {
            player_id: 1,
            mode: "ULTRAVIOLET".into()
        }
    );
}

#[test]
fn drone_detected_optional_fields() {
    assert_eq!(
        parse(r#"{"type":"drone_detected","player_id":1}"#),
        ServerMessage::DroneDetected {
            player_id: 1,
            position: None,
            new_score: None
        }
    );
    assert_eq!(
        parse(r#"{"type":"drone_detected","player_id":2,"position":{"x":5,"y":6},"new_score":4}"#),
        ServerMessage::DroneDetected {
            player_id: 2,
            position: Some(Position::new(5.0, 6.0)),
            new_score: Some(4)
        }
    );
}

#[test]
fn name_status_variants() {
    assert_eq!(
        parse(r#"{"type":"name_status","ok":true,"name":"Alice"}"#),
        ServerMessage::NameStatus {
            ok: true,
            reason: None,
            name: Some("Alice".into())
        }
    );
    assert_eq!(
        parse(r#"{"type":"name_status","ok":false,"reason":"duplicate"}"#),
        ServerMessage::NameStatus {
            ok: false,
            reason: Some(NameRejectReason::Duplicate),
            name: None
        }
    );
}

#[test]
fn alarm_broadcasts() {
    assert_eq!(
        parse(r#"{"type":"alarm_state","active":true,"remaining":42,"triggered_by":1}"#),
        ServerMessage::AlarmState {
            active: true,
            remaining: 42,
            triggered_by: Some(1)
        }
    );
    assert_eq!(
        parse(r#"{"type":"global_alarm","triggered_by":2,"alarm_type":"intrusion"}"#),
        ServerMessage::GlobalAlarm {
            triggered_by: Some(2),
            alarm_type: Some("intrusion".into())
        }
    );
    assert_eq!(
        parse(r#"{"type":"global_alarm_stop"}"#),
        ServerMessage::GlobalAlarmStop { stopped_by: None }
    );
}

#[test]
fn unknown_fields_are_ignored() {
    assert_eq!(
        parse(r#"{"type":"player_switched","current_player":2,"turn":7}"#),
        ServerMessage::PlayerSwitched { current_player: 2 }
    );
}

#[test]
fn unknown_types_do_not_fail() {
    assert_eq!(parse(r#"{"type":"chat","text":"hi"}"#), ServerMessage::Unknown);
}

#[test]
fn missing_required_field_is_an_error() {
    assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"frame","player_id":1}"#).is_err());
    assert!(serde_json::from_str::<ServerMessage>(r#"{"player_id":1}"#).is_err());
}

// ── Events ──────────────────────────────────────────────────────────

#[test]
fn name_status_splits_into_two_events() {
    let accepted = GameEvent::try_from(parse(r#"{"type":"name_status","ok":true,"name":"A"}"#));
    assert_eq!(accepted.unwrap(), GameEvent::NameAccepted { name: "A".into() });

    let rejected = GameEvent::try_from(parse(r#"{"type":"name_status","ok":false}"#));
    assert_eq!(
        rejected.unwrap(),
        GameEvent::NameRejected {
            reason: NameRejectReason::Other
        }
    );
}

#[test]
fn events_map_back_to_their_message() {
    let msg = ServerMessage::GameState {
        player_id: 1,
        image_data: "img".into(),
        game_state: Some(RoomSnapshot {
            player1: Some(PlayerSnapshot::default()),
            ..RoomSnapshot::default()
        }),
        game_started: true,
    };
    let event = GameEvent::try_from(msg.clone()).unwrap();
    assert_eq!(event.to_server_message(), Some(msg));
    assert_eq!(GameEvent::Connected.to_server_message(), None);
}

#[test]
fn unknown_message_has_no_event() {
    assert_eq!(
        GameEvent::try_from(ServerMessage::Unknown),
        Err(ServerMessage::Unknown)
    );
}
