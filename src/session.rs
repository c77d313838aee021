//! One player's view of a room: game socket, view state, hazard and
//! minigame, driven from a single task.
//!
//! [`RoomSession::next`] multiplexes the client's event channel with the
//! hazard and minigame timers and returns one [`SessionUpdate`] at a time.
//! When the hazard enters `Resolving` the minigame opens; solving it sends
//! `stop_alarm`, and the hazard goes back to `Idle` once the server's
//! `global_alarm_stop` broadcast comes back.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::alarm::{AlarmConfig, AlarmCoordinator, AlarmPhase, AlarmState};
use crate::client::{GameClient, GameClientConfig, DEFAULT_ALARM_TYPE};
use crate::error::{Result, SyncError};
use crate::error_codes::NameRejectReason;
use crate::event::GameEvent;
use crate::protocol::{CameraMode, Position};
use crate::slot::{SlotChange, SlotConfig, SlotMinigame, SlotOutcome, TargetWord};
use crate::transport::Transport;
use crate::view::{Discovery, GameView};

#[cfg(feature = "transport-websocket")]
use crate::endpoint::BackendEndpoint;

/// Everything a [`RoomSession`] needs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client: GameClientConfig,
    pub alarm: AlarmConfig,
    pub slot: SlotConfig,
    /// `alarm_type` sent with `trigger_alarm`.
    pub alarm_type: String,
}

impl SessionConfig {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            client: GameClientConfig::new(player_name),
            alarm: AlarmConfig::default(),
            slot: SlotConfig::default(),
            alarm_type: DEFAULT_ALARM_TYPE.to_string(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: GameClientConfig) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_alarm(mut self, alarm: AlarmConfig) -> Self {
        self.alarm = alarm;
        self
    }

    #[must_use]
    pub fn with_slot(mut self, slot: SlotConfig) -> Self {
        self.slot = slot;
        self
    }

    #[must_use]
    pub fn with_alarm_type(mut self, alarm_type: impl Into<String>) -> Self {
        self.alarm_type = alarm_type.into();
        self
    }
}

/// Something the UI should re-render.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connected,
    /// [`RoomSession::view`] changed.
    ViewChanged,
    NameAccepted { name: String },
    NameRejected { reason: NameRejectReason },
    /// The local player found the target; the view is now frozen.
    TargetFound(Discovery),
    /// The hazard moved to a new phase or remaining time.
    Alarm { phase: AlarmPhase, state: AlarmState },
    MinigameOpened,
    /// Letters moved or restarted.
    MinigameChanged(SlotChange),
    /// Wrong word; the columns restart shortly.
    MinigameFailed,
    /// Right word; `stop_alarm` was sent.
    MinigameSolved,
    /// The game socket closed. No retry happens.
    Disconnected { reason: Option<String> },
}

enum Woken {
    Event(Option<GameEvent>),
    Alarm(AlarmPhase),
    Slot(SlotChange),
}

/// A player's live session in one room.
pub struct RoomSession {
    client: GameClient,
    events: tokio::sync::mpsc::Receiver<GameEvent>,
    events_closed: bool,
    view: GameView,
    alarm: AlarmCoordinator,
    slot_config: SlotConfig,
    minigame: Option<SlotMinigame>,
    alarm_type: String,
    identity: Option<std::result::Result<String, NameRejectReason>>,
    pending: VecDeque<SessionUpdate>,
}

impl RoomSession {
    /// Start a session over an already-open transport.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidTarget`] if the minigame target is not a
    /// four-letter word. Nothing is sent in that case.
    pub fn start(transport: impl Transport, config: SessionConfig) -> Result<Self> {
        TargetWord::parse(&config.slot.target)?;
        let (client, events) = GameClient::start(transport, config.client);
        Ok(Self {
            client,
            events,
            events_closed: false,
            view: GameView::new(None),
            alarm: AlarmCoordinator::new(config.alarm),
            slot_config: config.slot,
            minigame: None,
            alarm_type: config.alarm_type,
            identity: None,
            pending: VecDeque::new(),
        })
    }

    /// Open the room socket on `endpoint` and start a session.
    ///
    /// # Errors
    ///
    /// Transport errors from the WebSocket handshake, or
    /// [`SyncError::InvalidTarget`].
    #[cfg(feature = "transport-websocket")]
    pub async fn connect(
        endpoint: &BackendEndpoint,
        room_id: &str,
        config: SessionConfig,
    ) -> Result<Self> {
        TargetWord::parse(&config.slot.target)?;
        let transport =
            crate::transports::WebSocketTransport::connect_room(endpoint, room_id).await?;
        info!(room_id, "joined room");
        Self::start(transport, config)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn client(&self) -> &GameClient {
        &self.client
    }

    pub fn view(&self) -> &GameView {
        &self.view
    }

    pub fn alarm(&self) -> AlarmState {
        self.alarm.state()
    }

    pub fn alarm_phase(&self) -> AlarmPhase {
        self.alarm.phase()
    }

    pub fn minigame(&self) -> Option<&SlotMinigame> {
        self.minigame.as_ref()
    }

    /// Answer to the last name claimed: `Ok(None)` until the server replies.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidIdentity`] when the server refused it. Claim
    /// another one with [`GameClient::set_name`].
    pub fn confirmed_name(&self) -> Result<Option<&str>> {
        match &self.identity {
            None => Ok(None),
            Some(Ok(name)) => Ok(Some(name.as_str())),
            Some(Err(reason)) => Err(SyncError::from(*reason)),
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Ask the server to start the hazard. The local countdown starts when
    /// the broadcast comes back.
    ///
    /// # Errors
    ///
    /// [`SyncError::HazardExpired`] once the hazard was lost,
    /// [`SyncError::NotConnected`] after disconnect.
    pub fn trigger_alarm(&self) -> Result<()> {
        if self.alarm.phase().is_lost() {
            return Err(SyncError::HazardExpired);
        }
        self.client.trigger_alarm(self.alarm_type.clone())
    }

    /// Freeze a minigame column. A solved word sends `stop_alarm`.
    ///
    /// Returns `Ok(None)` when no minigame is open.
    ///
    /// # Errors
    ///
    /// [`SyncError::HazardExpired`] once the hazard was lost,
    /// [`SyncError::ColumnOutOfRange`], or [`SyncError::NotConnected`] when
    /// the stop could not be sent.
    pub fn click_slot(&mut self, index: usize) -> Result<Option<SlotOutcome>> {
        if self.alarm.phase().is_lost() {
            return Err(SyncError::HazardExpired);
        }
        let Some(minigame) = self.minigame.as_mut() else {
            return Ok(None);
        };
        let outcome = minigame.click(index)?;
        match outcome {
            Some(SlotOutcome::Solved) => {
                info!("minigame solved, requesting hazard stop");
                self.pending.push_back(SessionUpdate::MinigameSolved);
                self.client.stop_alarm()?;
            }
            Some(SlotOutcome::Failed) => self.pending.push_back(SessionUpdate::MinigameFailed),
            None => {}
        }
        Ok(outcome)
    }

    /// Reload a frozen minigame column. Returns `false` when nothing
    /// changed or no minigame is open.
    ///
    /// # Errors
    ///
    /// [`SyncError::ColumnOutOfRange`].
    pub fn reload_slot(&mut self, index: usize) -> Result<bool> {
        match self.minigame.as_mut() {
            Some(minigame) => minigame.reload(index),
            None => Ok(false),
        }
    }

    /// # Errors
    ///
    /// [`SyncError::NotConnected`] after disconnect.
    pub fn change_mode(&self, mode: CameraMode) -> Result<()> {
        self.client.change_mode(mode)
    }

    /// # Errors
    ///
    /// [`SyncError::NotConnected`] after disconnect.
    pub fn move_to(&self, position: Position) -> Result<()> {
        self.client.move_to(position)
    }

    /// # Errors
    ///
    /// [`SyncError::NotConnected`] after disconnect.
    pub fn click(&self, x: f64, y: f64) -> Result<()> {
        self.client.click(x, y)
    }

    /// # Errors
    ///
    /// [`SyncError::NotConnected`] after disconnect.
    pub fn switch_player(&self) -> Result<()> {
        self.client.switch_player()
    }

    /// Leave the room: reset the hazard, close the minigame and the socket.
    pub async fn leave(&mut self) {
        self.alarm.reset();
        self.minigame = None;
        self.pending.clear();
        self.client.shutdown().await;
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Wait for the next update.
    ///
    /// Returns `None` once the socket is gone and no timer can produce
    /// anything else. Cancel-safe.
    pub async fn next(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }
            if self.events_closed
                && !self.alarm.phase().is_counting()
                && self.alarm.phase() != AlarmPhase::Expired
            {
                return None;
            }

            let woken = {
                let events = &mut self.events;
                let events_closed = self.events_closed;
                let alarm = &mut self.alarm;
                let minigame = &mut self.minigame;
                tokio::select! {
                    event = events.recv(), if !events_closed => Woken::Event(event),
                    phase = alarm.next() => Woken::Alarm(phase),
                    change = next_slot_change(minigame) => Woken::Slot(change),
                }
            };

            match woken {
                Woken::Event(Some(event)) => self.on_event(event),
                Woken::Event(None) => {
                    debug!("event channel closed");
                    self.events_closed = true;
                }
                Woken::Alarm(phase) => self.on_alarm_phase(phase),
                Woken::Slot(change) => {
                    self.pending.push_back(SessionUpdate::MinigameChanged(change));
                }
            }
        }
    }

    fn on_event(&mut self, event: GameEvent) {
        match &event {
            GameEvent::Connected => self.pending.push_back(SessionUpdate::Connected),
            GameEvent::NameAccepted { name } => {
                self.identity = Some(Ok(name.clone()));
                self.pending
                    .push_back(SessionUpdate::NameAccepted { name: name.clone() });
            }
            GameEvent::NameRejected { reason } => {
                self.identity = Some(Err(*reason));
                self.pending
                    .push_back(SessionUpdate::NameRejected { reason: *reason });
            }
            GameEvent::Disconnected { reason } => {
                warn!(?reason, "game socket lost");
                self.pending.push_back(SessionUpdate::Disconnected {
                    reason: reason.clone(),
                });
            }
            GameEvent::AlarmStarted { .. }
            | GameEvent::AlarmStopped { .. }
            | GameEvent::AlarmSnapshot { .. } => {
                if let Some(phase) = self.alarm.handle_event(&event) {
                    self.on_alarm_phase(phase);
                }
            }
            GameEvent::GameState { .. }
            | GameEvent::Frame { .. }
            | GameEvent::ModeChange { .. }
            | GameEvent::DroneDetected { .. }
            | GameEvent::PlayerSwitched { .. } => self.apply_to_view(&event),
        }
    }

    fn apply_to_view(&mut self, event: &GameEvent) {
        let Some(message) = event.to_server_message() else {
            return;
        };
        let was_resolved = self.view.is_resolved();
        match self.view.apply(&message) {
            Ok(next) if next == self.view => {}
            Ok(next) => {
                self.view = next;
                match self.view.discovery() {
                    Some(found) if !was_resolved => {
                        self.pending.push_back(SessionUpdate::TargetFound(found));
                    }
                    _ => self.pending.push_back(SessionUpdate::ViewChanged),
                }
            }
            Err(e) => warn!(kind = message.kind(), "ignoring message: {e}"),
        }
    }

    fn on_alarm_phase(&mut self, phase: AlarmPhase) {
        self.pending.push_back(SessionUpdate::Alarm {
            phase,
            state: self.alarm.state(),
        });
        match phase {
            AlarmPhase::Resolving { .. } if self.minigame.is_none() => {
                match SlotMinigame::open(&self.slot_config) {
                    Ok(minigame) => {
                        self.minigame = Some(minigame);
                        self.pending.push_back(SessionUpdate::MinigameOpened);
                    }
                    Err(e) => warn!("minigame not opened: {e}"),
                }
            }
            AlarmPhase::Active { .. } | AlarmPhase::Resolving { .. } => {}
            AlarmPhase::Idle | AlarmPhase::Expired | AlarmPhase::Terminal => {
                if self.minigame.take().is_some() {
                    debug!(?phase, "minigame closed");
                }
            }
        }
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("client", &self.client)
            .field("alarm", &self.alarm.phase())
            .field("minigame_open", &self.minigame.is_some())
            .finish()
    }
}

async fn next_slot_change(minigame: &mut Option<SlotMinigame>) -> SlotChange {
    match minigame {
        Some(minigame) => minigame.next().await,
        None => std::future::pending().await,
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
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Transport fed from a channel so tests can push frames at any time.
    struct ChannelTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.outbound
                .send(message)
                .map_err(|e| SyncError::TransportSend(e.to_string()))
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn session(
        config: SessionConfig,
    ) -> (
        RoomSession,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            inbound: in_rx,
            outbound: out_tx,
        };
        (RoomSession::start(transport, config).unwrap(), in_tx, out_rx)
    }

    async fn until(s: &mut RoomSession, want: impl Fn(&SessionUpdate) -> bool) -> SessionUpdate {
        loop {
            let update = s.next().await.expect("session ended");
            if want(&update) {
                return update;
            }
        }
    }

    #[test]
    fn bad_target_is_rejected_up_front() {
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        drop(in_tx);
        let transport = ChannelTransport {
            inbound: in_rx,
            outbound: out_tx,
        };
        let config = SessionConfig::new("A").with_slot(SlotConfig::new().with_target("XYZ"));
        assert!(matches!(
            RoomSession::start(transport, config),
            Err(SyncError::InvalidTarget(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_opens_minigame_after_delay() {
        let (mut s, tx, _out) = session(SessionConfig::new("A"));
        tx.send(r#"{"type":"global_alarm","triggered_by":2}"#.into())
            .unwrap();

        let update = until(&mut s, |u| matches!(u, SessionUpdate::Alarm { .. })).await;
        assert!(matches!(
            update,
            SessionUpdate::Alarm {
                phase: AlarmPhase::Active { remaining: 60 },
                ..
            }
        ));
        until(&mut s, |u| *u == SessionUpdate::MinigameOpened).await;
        assert!(s.minigame().is_some());
        assert!(matches!(s.alarm_phase(), AlarmPhase::Resolving { .. }));

        tx.send(r#"{"type":"global_alarm_stop","stopped_by":2}"#.into())
            .unwrap();
        until(&mut s, |u| {
            matches!(
                u,
                SessionUpdate::Alarm {
                    phase: AlarmPhase::Idle,
                    ..
                }
            )
        })
        .await;
        assert!(s.minigame().is_none());
        assert_eq!(s.alarm().remaining_seconds, 60);
        s.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refused_name_surfaces_as_invalid_identity() {
        let (mut s, tx, _out) = session(SessionConfig::new("Alice"));
        assert!(matches!(s.confirmed_name(), Ok(None)));

        tx.send(r#"{"type":"name_status","ok":false,"reason":"duplicate"}"#.into())
            .unwrap();
        until(&mut s, |u| matches!(u, SessionUpdate::NameRejected { .. })).await;
        let err = s.confirmed_name().unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidIdentity {
                reason: NameRejectReason::Duplicate
            }
        ));
        assert!(err.is_recoverable());

        tx.send(r#"{"type":"name_status","ok":true,"name":"Alice2"}"#.into())
            .unwrap();
        until(&mut s, |u| matches!(u, SessionUpdate::NameAccepted { .. })).await;
        assert_eq!(s.confirmed_name().unwrap(), Some("Alice2"));
        s.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_mode_keeps_view() {
        let (mut s, tx, _out) = session(SessionConfig::new("A"));
        tx.send(r#"{"type":"mode_change","player_id":1,"mode":"THERMAL"}"#.into())
            .unwrap();
        tx.send(r#"{"type":"mode_change","player_id":1,"mode":"SONAR"}"#.into())
            .unwrap();
        tx.send(r#"{"type":"player_switched","current_player":2}"#.into())
            .unwrap();

        until(&mut s, |u| *u == SessionUpdate::ViewChanged).await;
        until(&mut s, |u| *u == SessionUpdate::ViewChanged).await;
        assert_eq!(s.view().player(1).unwrap().mode, CameraMode::Thermal);
        assert_eq!(s.view().current_player(), Some(2));
        s.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn expired_hazard_blocks_commands() {
        let config = SessionConfig::new("A").with_alarm(
            AlarmConfig::new().with_max_duration(std::time::Duration::from_secs(1)),
        );
        let (mut s, tx, _out) = session(config);
        tx.send(r#"{"type":"global_alarm"}"#.into()).unwrap();
        until(&mut s, |u| {
            matches!(
                u,
                SessionUpdate::Alarm {
                    phase: AlarmPhase::Expired,
                    ..
                }
            )
        })
        .await;

        assert!(matches!(s.trigger_alarm(), Err(SyncError::HazardExpired)));
        assert!(matches!(s.click_slot(0), Err(SyncError::HazardExpired)));
        s.leave().await;
        assert_eq!(s.alarm_phase(), AlarmPhase::Idle);
    }
}
