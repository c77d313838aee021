#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Voice negotiator tests against a scripted signaling peer and microphone.

mod common;

use std::time::Duration;

use escape_sync_client::error_codes::SignalingErrorKind;
use escape_sync_client::voice::{
    CallState, RemoteStream, SignalingEvent, VoiceConfig, VoiceNegotiator, VoiceStatus,
    VoiceUpdate,
};
use escape_sync_client::SyncError;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use common::{live_tracks, MockMedia, MockSignaling, SignalingCall};

type Voice = VoiceNegotiator<MockSignaling, MockMedia>;
type Calls = std::sync::Arc<std::sync::Mutex<Vec<(Instant, SignalingCall)>>>;
type Tracks = std::sync::Arc<std::sync::Mutex<Vec<escape_sync_client::voice::MediaTrack>>>;

async fn open(granted: bool) -> (Voice, UnboundedSender<SignalingEvent>, Calls, Tracks) {
    let (signaling, events, calls) = MockSignaling::new();
    let (media, tracks) = MockMedia::new(granted);
    let voice = VoiceNegotiator::open("R1", "Alice", signaling, media, VoiceConfig::new())
        .await
        .unwrap();
    (voice, events, calls, tracks)
}

async fn next(voice: &mut Voice) -> VoiceUpdate {
    tokio::time::timeout(Duration::from_secs(30), voice.next())
        .await
        .expect("no voice update")
        .expect("voice ended")
}

async fn quiet(voice: &mut Voice) -> bool {
    tokio::time::timeout(Duration::from_secs(30), voice.next())
        .await
        .is_err()
}

fn calls_of(calls: &Calls, want: &SignalingCall) -> Vec<Instant> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, c)| c == want)
        .map(|(at, _)| *at)
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Registration and reconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn peer_id_is_derived_from_room_and_name() {
    let (mut voice, events, calls, _) = open(true).await;
    assert!(voice.peer_id().starts_with("r1alice"));
    assert_eq!(
        calls.lock().unwrap()[0].1,
        SignalingCall::Open(voice.peer_id().to_string())
    );
    assert_eq!(voice.status(), VoiceStatus::Connecting);

    events
        .send(SignalingEvent::Open {
            peer_id: voice.peer_id().to_string(),
        })
        .unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::Status(VoiceStatus::Connected)
    );
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_backs_off_then_gives_up() {
    let (mut voice, events, calls, _) = open(true).await;
    let lost_at = Instant::now();

    for attempt in 1..=3 {
        events.send(SignalingEvent::Disconnected).unwrap();
        assert_eq!(
            next(&mut voice).await,
            VoiceUpdate::Status(VoiceStatus::Reconnecting { attempt })
        );
        assert_eq!(next(&mut voice).await, VoiceUpdate::Retrying { attempt });
    }

    let offsets: Vec<_> = calls_of(&calls, &SignalingCall::Reconnect)
        .into_iter()
        .map(|at| at - lost_at)
        .collect();
    assert_eq!(
        offsets,
        [
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(7)
        ]
    );

    events.send(SignalingEvent::Disconnected).unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::ConnectionImpossible { attempts: 3 }
    );
    assert_eq!(voice.status(), VoiceStatus::Failed);
    assert!(matches!(
        voice.last_error(),
        Some(SyncError::ConnectionImpossible { attempts: 3 })
    ));

    // No fourth automatic attempt.
    events.send(SignalingEvent::Disconnected).unwrap();
    assert!(quiet(&mut voice).await);
    assert_eq!(calls_of(&calls, &SignalingCall::Reconnect).len(), 3);
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_retry_budget() {
    let (mut voice, events, _calls, _) = open(true).await;

    events.send(SignalingEvent::Disconnected).unwrap();
    next(&mut voice).await;
    next(&mut voice).await;
    events.send(SignalingEvent::Disconnected).unwrap();
    next(&mut voice).await;
    next(&mut voice).await;
    assert_eq!(voice.reconnect_attempts(), 2);

    events
        .send(SignalingEvent::Open {
            peer_id: "r1alice1".into(),
        })
        .unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::Status(VoiceStatus::Connected)
    );
    assert_eq!(voice.reconnect_attempts(), 0);
    assert_eq!(voice.peer_id(), "r1alice1");

    // The next loss starts again at one second.
    let lost_at = Instant::now();
    events.send(SignalingEvent::Disconnected).unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::Status(VoiceStatus::Reconnecting { attempt: 1 })
    );
    next(&mut voice).await;
    assert_eq!(lost_at.elapsed(), Duration::from_secs(1));
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_after_giving_up() {
    let (mut voice, events, calls, _) = open(true).await;
    for _ in 0..3 {
        events.send(SignalingEvent::Disconnected).unwrap();
        next(&mut voice).await;
        next(&mut voice).await;
    }
    events.send(SignalingEvent::Disconnected).unwrap();
    next(&mut voice).await;
    assert_eq!(voice.status(), VoiceStatus::Failed);

    voice.reconnect().await.unwrap();
    assert_eq!(voice.status(), VoiceStatus::Connecting);
    assert_eq!(voice.reconnect_attempts(), 0);
    assert_eq!(calls_of(&calls, &SignalingCall::Reconnect).len(), 4);

    // Automatic retries are available again.
    events.send(SignalingEvent::Disconnected).unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::Status(VoiceStatus::Reconnecting { attempt: 1 })
    );
    voice.close().await;
}

// ════════════════════════════════════════════════════════════════════
// Calls
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn outgoing_call_goes_live_then_ends_remotely() {
    let (mut voice, events, calls, tracks) = open(true).await;

    voice.call("r1bob").await.unwrap();
    assert_eq!(
        voice.call_state(),
        &CallState::Connecting {
            remote: "r1bob".into()
        }
    );
    assert_eq!(live_tracks(&tracks), 1);
    assert!(calls
        .lock()
        .unwrap()
        .iter()
        .any(|(_, c)| *c == SignalingCall::Call("r1bob".into())));

    events
        .send(SignalingEvent::RemoteStream {
            from: "r1bob".into(),
            stream: RemoteStream::new("bob-audio"),
        })
        .unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::CallStarted {
            remote: "r1bob".into()
        }
    );
    assert!(voice.remote_stream().is_some());

    events.send(SignalingEvent::CallClosed).unwrap();
    assert_eq!(next(&mut voice).await, VoiceUpdate::CallEnded);
    assert_eq!(voice.call_state(), &CallState::Idle);
    assert_eq!(live_tracks(&tracks), 0);
    assert!(voice.remote_stream().is_none());
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn receiving_audio_indicator_follows_remote_level() {
    let (mut voice, events, _calls, _tracks) = open(true).await;

    voice.call("r1bob").await.unwrap();
    // no live call yet
    assert_eq!(voice.observe_remote_audio(&[200; 128]), None);

    events
        .send(SignalingEvent::RemoteStream {
            from: "r1bob".into(),
            stream: RemoteStream::new("bob-audio"),
        })
        .unwrap();
    next(&mut voice).await;

    assert_eq!(voice.observe_remote_audio(&[0; 128]), None);
    assert_eq!(
        voice.observe_remote_audio(&[30; 128]),
        Some(VoiceUpdate::ReceivingAudio(true))
    );
    assert_eq!(voice.observe_remote_audio(&[60; 128]), None);
    assert!(voice.is_receiving_audio());
    assert_eq!(
        voice.observe_remote_audio(&[2; 128]),
        Some(VoiceUpdate::ReceivingAudio(false))
    );
    voice.observe_remote_audio(&[30; 128]);

    events.send(SignalingEvent::CallClosed).unwrap();
    assert_eq!(next(&mut voice).await, VoiceUpdate::CallEnded);
    assert!(!voice.is_receiving_audio());
    assert_eq!(voice.observe_remote_audio(&[30; 128]), None);
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn custom_audio_threshold() {
    let (signaling, events, _calls) = MockSignaling::new();
    let (media, _tracks) = MockMedia::new(true);
    let config = VoiceConfig::new().with_audio_threshold(50.0);
    let mut voice = VoiceNegotiator::open("R1", "Alice", signaling, media, config)
        .await
        .unwrap();
    voice.call("r1bob").await.unwrap();
    events
        .send(SignalingEvent::RemoteStream {
            from: "r1bob".into(),
            stream: RemoteStream::new("bob-audio"),
        })
        .unwrap();
    next(&mut voice).await;

    assert_eq!(voice.observe_remote_audio(&[30; 128]), None);
    assert_eq!(
        voice.observe_remote_audio(&[51; 128]),
        Some(VoiceUpdate::ReceivingAudio(true))
    );
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn only_one_call_at_a_time() {
    let (mut voice, events, calls, tracks) = open(true).await;
    voice.call("r1bob").await.unwrap();

    assert!(matches!(
        voice.call("r1carol").await,
        Err(SyncError::CallInProgress)
    ));
    assert_eq!(tracks.lock().unwrap().len(), 1);

    // A third party calling in is turned away without surfacing.
    events
        .send(SignalingEvent::IncomingCall {
            from: "r1carol".into(),
        })
        .unwrap();
    assert!(quiet(&mut voice).await);
    assert_eq!(calls_of(&calls, &SignalingCall::Reject).len(), 1);
    assert_eq!(
        voice.call_state(),
        &CallState::Connecting {
            remote: "r1bob".into()
        }
    );
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn incoming_call_accept_and_hang_up() {
    let (mut voice, events, calls, tracks) = open(true).await;
    assert!(matches!(voice.accept().await, Err(SyncError::NoIncomingCall)));
    assert!(matches!(voice.hang_up().await, Err(SyncError::NoActiveCall)));

    events
        .send(SignalingEvent::IncomingCall {
            from: "r1bob".into(),
        })
        .unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::IncomingCall {
            from: "r1bob".into()
        }
    );
    // Pending incoming call blocks placing another.
    assert!(matches!(
        voice.call("r1carol").await,
        Err(SyncError::CallInProgress)
    ));

    voice.accept().await.unwrap();
    assert_eq!(calls_of(&calls, &SignalingCall::Answer).len(), 1);
    assert!(matches!(voice.accept().await, Err(SyncError::CallInProgress)));
    assert!(matches!(voice.reject().await, Err(SyncError::NoIncomingCall)));

    voice.hang_up().await.unwrap();
    assert_eq!(voice.call_state(), &CallState::Idle);
    assert_eq!(live_tracks(&tracks), 0);
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn incoming_call_can_be_rejected() {
    let (mut voice, events, calls, tracks) = open(true).await;
    events
        .send(SignalingEvent::IncomingCall {
            from: "r1bob".into(),
        })
        .unwrap();
    next(&mut voice).await;

    voice.reject().await.unwrap();
    assert_eq!(voice.call_state(), &CallState::Idle);
    assert_eq!(calls_of(&calls, &SignalingCall::Reject).len(), 1);
    assert!(tracks.lock().unwrap().is_empty());
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn denied_microphone_changes_nothing() {
    let (mut voice, events, calls, _) = open(false).await;
    events
        .send(SignalingEvent::Open {
            peer_id: voice.peer_id().to_string(),
        })
        .unwrap();
    next(&mut voice).await;

    assert!(matches!(
        voice.call("r1bob").await,
        Err(SyncError::MediaPermissionDenied)
    ));
    assert_eq!(voice.call_state(), &CallState::Idle);
    assert_eq!(voice.status(), VoiceStatus::Connected);
    assert!(calls_of(&calls, &SignalingCall::Call("r1bob".into())).is_empty());

    // An incoming call stays pending when answering fails.
    events
        .send(SignalingEvent::IncomingCall {
            from: "r1bob".into(),
        })
        .unwrap();
    next(&mut voice).await;
    assert!(matches!(
        voice.accept().await,
        Err(SyncError::MediaPermissionDenied)
    ));
    assert_eq!(
        voice.call_state(),
        &CallState::Incoming {
            from: "r1bob".into()
        }
    );
    voice.close().await;
}

#[tokio::test(start_paused = true)]
async fn unavailable_peer_ends_the_attempt() {
    let (mut voice, events, _calls, tracks) = open(true).await;
    voice.call("r1ghost").await.unwrap();

    events
        .send(SignalingEvent::error("peer-unavailable", "Could not connect to peer r1ghost"))
        .unwrap();
    assert_eq!(
        next(&mut voice).await,
        VoiceUpdate::SignalingError {
            kind: SignalingErrorKind::PeerUnavailable,
            message: "Could not connect to peer r1ghost".into()
        }
    );
    assert_eq!(voice.call_state(), &CallState::Idle);
    assert_eq!(live_tracks(&tracks), 0);
    assert!(matches!(
        voice.last_error(),
        Some(SyncError::Signaling {
            kind: SignalingErrorKind::PeerUnavailable,
            ..
        })
    ));
    voice.close().await;
}

// ════════════════════════════════════════════════════════════════════
// Teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_releases_everything() {
    let (mut voice, events, calls, tracks) = open(true).await;
    voice.call("r1bob").await.unwrap();
    events.send(SignalingEvent::Disconnected).unwrap();
    next(&mut voice).await;

    voice.close().await;
    voice.close().await;

    assert_eq!(voice.status(), VoiceStatus::Closed);
    assert_eq!(live_tracks(&tracks), 0);
    assert_eq!(calls_of(&calls, &SignalingCall::HangUp).len(), 1);
    assert_eq!(calls_of(&calls, &SignalingCall::Destroy).len(), 1);
    assert!(voice.next().await.is_none());
    assert!(matches!(voice.call("r1bob").await, Err(SyncError::VoiceClosed)));

    // The pending retry was cancelled with the timers.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(calls_of(&calls, &SignalingCall::Reconnect).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_negotiator_stops_the_microphone() {
    let (mut voice, _events, _calls, tracks) = open(true).await;
    voice.call("r1bob").await.unwrap();
    assert_eq!(live_tracks(&tracks), 1);
    drop(voice);
    assert_eq!(live_tracks(&tracks), 0);
}
