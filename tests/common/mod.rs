#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Escape Sync Client integration tests.
//!
//! Provides a scripted [`MockTransport`], helper functions for server JSON,
//! an in-memory [`RoomHub`] that plays the game server for two clients, and
//! scripted voice peers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use escape_sync_client::error_codes::NameRejectReason;
use escape_sync_client::protocol::{ClientMessage, PlayerId, Position, ServerMessage};
use escape_sync_client::voice::{
    LocalStream, MediaDevices, MediaTrack, SignalingEvent, SignalingPeer,
};
use escape_sync_client::{SyncError, Transport};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, SyncError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, SyncError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted: stay open until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Decode everything a mock transport recorded.
pub fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|s| serde_json::from_str(s).expect("client sent invalid JSON"))
        .collect()
}

// ── JSON helper functions ───────────────────────────────────────────

pub fn to_json(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).expect("server message serialization")
}

pub fn game_state_json(player_id: PlayerId) -> String {
    to_json(&ServerMessage::GameState {
        player_id,
        image_data: format!("data:image/jpeg;base64,P{player_id}"),
        game_state: None,
        game_started: true,
    })
}

pub fn name_accepted_json(name: &str) -> String {
    to_json(&ServerMessage::NameStatus {
        ok: true,
        reason: None,
        name: Some(name.into()),
    })
}

pub fn name_rejected_json(reason: NameRejectReason) -> String {
    to_json(&ServerMessage::NameStatus {
        ok: false,
        reason: Some(reason),
        name: None,
    })
}

pub fn global_alarm_json(triggered_by: PlayerId) -> String {
    to_json(&ServerMessage::GlobalAlarm {
        triggered_by: Some(triggered_by),
        alarm_type: Some("intrusion".into()),
    })
}

pub fn alarm_state_json(active: bool, remaining: u32) -> String {
    to_json(&ServerMessage::AlarmState {
        active,
        remaining,
        triggered_by: active.then_some(1),
    })
}

pub fn drone_detected_json(player_id: PlayerId) -> String {
    to_json(&ServerMessage::DroneDetected {
        player_id,
        position: Some(Position::new(256.0, 128.0)),
        new_score: Some(1),
    })
}

// ── RoomHub ─────────────────────────────────────────────────────────

const HUB_ALARM_SECONDS: u64 = 60;

#[derive(Default)]
struct HubState {
    peers: HashMap<PlayerId, mpsc::UnboundedSender<String>>,
    names: HashMap<PlayerId, String>,
    next_id: PlayerId,
    alarm_started: Option<(Instant, Option<PlayerId>)>,
    received: Vec<(PlayerId, ClientMessage)>,
}

impl HubState {
    fn broadcast(&self, msg: &ServerMessage) {
        let json = to_json(msg);
        for tx in self.peers.values() {
            let _ = tx.send(json.clone());
        }
    }

    fn reply(&self, to: PlayerId, msg: &ServerMessage) {
        if let Some(tx) = self.peers.get(&to) {
            let _ = tx.send(to_json(msg));
        }
    }

    fn handle(&mut self, from: PlayerId, msg: ClientMessage) {
        self.received.push((from, msg.clone()));
        match msg {
            ClientMessage::SetName { name } => {
                let name = name.trim().to_string();
                let taken = self
                    .names
                    .iter()
                    .any(|(id, n)| *id != from && n.eq_ignore_ascii_case(&name));
                let status = if name.is_empty() {
                    ServerMessage::NameStatus {
                        ok: false,
                        reason: Some(NameRejectReason::Empty),
                        name: None,
                    }
                } else if taken {
                    ServerMessage::NameStatus {
                        ok: false,
                        reason: Some(NameRejectReason::Duplicate),
                        name: None,
                    }
                } else {
                    self.names.insert(from, name.clone());
                    ServerMessage::NameStatus {
                        ok: true,
                        reason: None,
                        name: Some(name),
                    }
                };
                self.reply(from, &status);
            }
            ClientMessage::ModeChange { mode } => self.broadcast(&ServerMessage::ModeChange {
                player_id: from,
                mode: mode.as_str().into(),
            }),
            ClientMessage::Move { position } => self.broadcast(&ServerMessage::Frame {
                player_id: from,
                image_data: format!("data:image/jpeg;base64,F{from}"),
                position,
            }),
            ClientMessage::Click { x, y } => self.broadcast(&ServerMessage::DroneDetected {
                player_id: from,
                position: Some(Position::new(x, y)),
                new_score: Some(1),
            }),
            ClientMessage::TriggerAlarm {
                alarm_type,
                triggered_by,
            } => {
                if self.alarm_started.is_none() {
                    self.alarm_started = Some((Instant::now(), triggered_by));
                }
                self.broadcast(&ServerMessage::GlobalAlarm {
                    triggered_by,
                    alarm_type: Some(alarm_type),
                });
            }
            ClientMessage::StopAlarm { stopped_by } => {
                self.alarm_started = None;
                self.broadcast(&ServerMessage::GlobalAlarmStop { stopped_by });
            }
            ClientMessage::GetAlarmState => {
                let msg = match self.alarm_started {
                    Some((at, triggered_by)) => ServerMessage::AlarmState {
                        active: true,
                        remaining: u32::try_from(
                            HUB_ALARM_SECONDS.saturating_sub(at.elapsed().as_secs()),
                        )
                        .unwrap(),
                        triggered_by,
                    },
                    None => ServerMessage::AlarmState {
                        active: false,
                        remaining: 60,
                        triggered_by: None,
                    },
                };
                self.reply(from, &msg);
            }
            ClientMessage::SwitchPlayer => {
                let next = if from == 1 { 2 } else { 1 };
                self.broadcast(&ServerMessage::PlayerSwitched {
                    current_player: next,
                });
            }
        }
    }
}

/// In-memory stand-in for the game server of one room.
///
/// Slots are handed out 1, 2, ... in join order. Every joiner receives a
/// `game_state` with its slot first. Broadcasts reach every joined client,
/// the sender included.
#[derive(Clone, Default)]
pub struct RoomHub {
    state: Arc<StdMutex<HubState>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new client and return its transport.
    pub fn join(&self) -> HubTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let player_id = state.next_id;
        let _ = tx.send(game_state_json(player_id));
        state.peers.insert(player_id, tx);
        HubTransport {
            player_id,
            inbound: rx,
            hub: Arc::clone(&self.state),
        }
    }

    /// Push a frame to every connected client.
    pub fn broadcast(&self, msg: &ServerMessage) {
        self.state.lock().unwrap().broadcast(msg);
    }

    /// Drop the server side of one client's socket.
    pub fn disconnect(&self, player_id: PlayerId) {
        self.state.lock().unwrap().peers.remove(&player_id);
    }

    /// Every client message the hub has seen, in arrival order.
    pub fn received(&self) -> Vec<(PlayerId, ClientMessage)> {
        self.state.lock().unwrap().received.clone()
    }
}

/// One client's socket into a [`RoomHub`].
pub struct HubTransport {
    pub player_id: PlayerId,
    inbound: mpsc::UnboundedReceiver<String>,
    hub: Arc<StdMutex<HubState>>,
}

#[async_trait]
impl Transport for HubTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        let msg: ClientMessage = serde_json::from_str(&message)?;
        self.hub.lock().unwrap().handle(self.player_id, msg);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.hub.lock().unwrap().peers.remove(&self.player_id);
        Ok(())
    }
}

// ── Voice mocks ─────────────────────────────────────────────────────

/// Every call a [`MockSignaling`] received, with the (paused) clock time.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingCall {
    Open(String),
    Reconnect,
    Call(String),
    Answer,
    Reject,
    HangUp,
    Destroy,
}

/// Signaling peer fed from a channel.
pub struct MockSignaling {
    events: mpsc::UnboundedReceiver<SignalingEvent>,
    pub calls: Arc<StdMutex<Vec<(Instant, SignalingCall)>>>,
}

impl MockSignaling {
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<SignalingEvent>,
        Arc<StdMutex<Vec<(Instant, SignalingCall)>>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let peer = Self {
            events: rx,
            calls: Arc::clone(&calls),
        };
        (peer, tx, calls)
    }

    fn record(&self, call: SignalingCall) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

#[async_trait]
impl SignalingPeer for MockSignaling {
    async fn open(&mut self, peer_id: &str) -> Result<(), SyncError> {
        self.record(SignalingCall::Open(peer_id.into()));
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), SyncError> {
        self.record(SignalingCall::Reconnect);
        Ok(())
    }

    async fn call(&mut self, remote_peer_id: &str, _stream: &LocalStream) -> Result<(), SyncError> {
        self.record(SignalingCall::Call(remote_peer_id.into()));
        Ok(())
    }

    async fn answer(&mut self, _stream: &LocalStream) -> Result<(), SyncError> {
        self.record(SignalingCall::Answer);
        Ok(())
    }

    async fn reject(&mut self) -> Result<(), SyncError> {
        self.record(SignalingCall::Reject);
        Ok(())
    }

    async fn hang_up(&mut self) -> Result<(), SyncError> {
        self.record(SignalingCall::HangUp);
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), SyncError> {
        self.record(SignalingCall::Destroy);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SignalingEvent> {
        self.events.recv().await
    }
}

/// Microphone that is granted or denied, and remembers every track it
/// handed out.
pub struct MockMedia {
    pub granted: bool,
    pub tracks: Arc<StdMutex<Vec<MediaTrack>>>,
}

impl MockMedia {
    pub fn new(granted: bool) -> (Self, Arc<StdMutex<Vec<MediaTrack>>>) {
        let tracks = Arc::new(StdMutex::new(Vec::new()));
        (
            Self {
                granted,
                tracks: Arc::clone(&tracks),
            },
            tracks,
        )
    }
}

#[async_trait]
impl MediaDevices for MockMedia {
    async fn request_microphone(&mut self) -> Result<LocalStream, SyncError> {
        if !self.granted {
            return Err(SyncError::MediaPermissionDenied);
        }
        let mut tracks = self.tracks.lock().unwrap();
        let track = MediaTrack::new(format!("mic-{}", tracks.len()));
        tracks.push(track.clone());
        Ok(LocalStream::new(vec![track]))
    }
}

/// Tracks handed out by a [`MockMedia`] that are still live.
pub fn live_tracks(tracks: &Arc<StdMutex<Vec<MediaTrack>>>) -> usize {
    tracks.lock().unwrap().iter().filter(|t| t.is_live()).count()
}
