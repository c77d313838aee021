//! Async client for the game-state socket of one room.
//!
//! [`GameClient`] is a thin handle that talks to a background transport loop
//! over an unbounded MPSC channel. Inbound frames come back, in arrival
//! order, as [`GameEvent`]s on the bounded channel returned from
//! [`GameClient::start`].
//!
//! The client never reconnects on its own. A lost socket shows up as
//! [`GameEvent::Disconnected`] and `is_connected() == false`; whoever owns
//! the client decides whether to start a new one.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect_room(&endpoint, "R1").await?;
//! let config = GameClientConfig::new("Alice");
//! let (client, mut events) = GameClient::start(transport, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::NameRejected { reason } => { /* ask for another name */ }
//!         GameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::event::GameEvent;
use crate::protocol::{CameraMode, ClientMessage, Identity, PlayerId, Position, ServerMessage};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Alarm type sent with `trigger_alarm` when the caller has no preference.
pub const DEFAULT_ALARM_TYPE: &str = "intrusion";

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GameClient`] connection.
///
/// # Example
///
/// ```
/// use escape_sync_client::client::GameClientConfig;
/// use escape_sync_client::protocol::CameraMode;
///
/// let config = GameClientConfig::new("Alice")
///     .with_initial_mode(Some(CameraMode::Thermal))
///     .with_alarm_sync_on_connect(false);
/// assert_eq!(config.player_name, "Alice");
/// assert_eq!(config.initial_mode, Some(CameraMode::Thermal));
/// ```
#[derive(Debug, Clone)]
pub struct GameClientConfig {
    /// Display name sent with `set_name` as the very first message.
    pub player_name: String,
    /// Camera mode declared right after `set_name`. `None` sends nothing.
    ///
    /// Defaults to [`CameraMode::Base`].
    pub initial_mode: Option<CameraMode>,
    /// Ask for `get_alarm_state` on connect so a late joiner picks up a
    /// running hazard. Defaults to `true`.
    pub alarm_sync_on_connect: bool,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, the transport loop waits for room
    /// instead of dropping events. Defaults to **256**; values below 1 are
    /// clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the transport loop gets to close the socket on
    /// [`GameClient::shutdown`] before it is aborted. Defaults to **1 s**.
    pub shutdown_timeout: Duration,
}

impl GameClientConfig {
    /// Create a configuration for the given display name with defaults.
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            initial_mode: Some(CameraMode::Base),
            alarm_sync_on_connect: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the camera mode declared on connect.
    #[must_use]
    pub fn with_initial_mode(mut self, mode: Option<CameraMode>) -> Self {
        self.initial_mode = mode;
        self
    }

    /// Enable or disable the hazard snapshot request on connect.
    #[must_use]
    pub fn with_alarm_sync_on_connect(mut self, enabled: bool) -> Self {
        self.alarm_sync_on_connect = enabled;
        self
    }

    /// Set the capacity of the event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Sentinel for "no slot assigned yet"; real slots are 1 and 2.
const NO_PLAYER: u8 = 0;

/// State shared between the client handle and the transport loop.
struct ClientState {
    connected: AtomicBool,
    player_id: AtomicU8,
    confirmed_name: Mutex<Option<String>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            player_id: AtomicU8::new(NO_PLAYER),
            confirmed_name: Mutex::new(None),
        }
    }

    fn player_id(&self) -> Option<PlayerId> {
        match self.player_id.load(Ordering::Acquire) {
            NO_PLAYER => None,
            id => Some(id),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to the game socket of one room.
///
/// Every command method serializes a [`ClientMessage`] onto the command
/// channel and returns as soon as it is queued.
pub struct GameClient {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl GameClient {
    /// Start the transport loop and return the handle plus event receiver.
    ///
    /// The first outgoing message is always `set_name`, followed by the
    /// optional initial `mode_change` and `get_alarm_state`.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: GameClientConfig,
    ) -> (Self, mpsc::Receiver<GameEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<GameEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let loop_state = Arc::clone(&state);

        // The receiver is alive until the task below is spawned, so these
        // sends cannot fail.
        let _ = cmd_tx.send(ClientMessage::SetName {
            name: config.player_name,
        });
        if let Some(mode) = config.initial_mode {
            let _ = cmd_tx.send(ClientMessage::ModeChange { mode });
        }
        if config.alarm_sync_on_connect {
            let _ = cmd_tx.send(ClientMessage::GetAlarmState);
        }

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Claim another display name, typically after
    /// [`GameEvent::NameRejected`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::SetName { name: name.into() })
    }

    /// Declare the active camera mode.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn change_mode(&self, mode: CameraMode) -> Result<()> {
        self.send(ClientMessage::ModeChange { mode })
    }

    /// Report the local viewport position.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn move_to(&self, position: Position) -> Result<()> {
        self.send(ClientMessage::Move { position })
    }

    /// Report an interaction point.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn click(&self, x: f64, y: f64) -> Result<()> {
        self.send(ClientMessage::Click { x, y })
    }

    /// Ask the server to start the room-wide hazard.
    ///
    /// Nothing changes locally until the `global_alarm` broadcast comes back.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn trigger_alarm(&self, alarm_type: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::TriggerAlarm {
            alarm_type: alarm_type.into(),
            triggered_by: self.state.player_id(),
        })
    }

    /// Ask the server to stop the room-wide hazard.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn stop_alarm(&self) -> Result<()> {
        self.send(ClientMessage::StopAlarm {
            stopped_by: self.state.player_id(),
        })
    }

    /// Request the current hazard snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn request_alarm_state(&self) -> Result<()> {
        self.send(ClientMessage::GetAlarmState)
    }

    /// Hand the active turn to the other player.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the transport has closed.
    pub fn switch_player(&self) -> Result<()> {
        self.send(ClientMessage::SwitchPlayer)
    }

    /// Close the socket and stop the transport loop.
    ///
    /// Queued commands that have not reached the socket yet are dropped.
    /// The event receiver yields `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("GameClient: shutdown requested");
        self.state.connected.store(false, Ordering::Release);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the socket is believed to be open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The slot the server assigned to this connection, once known.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.state.player_id()
    }

    /// The display name the server confirmed, if any.
    pub async fn confirmed_name(&self) -> Option<String> {
        self.state.confirmed_name.lock().await.clone()
    }

    /// Slot plus confirmed name, once the slot is known.
    pub async fn identity(&self) -> Option<Identity> {
        let player_id = self.player_id()?;
        Some(Identity {
            player_id,
            name: self.confirmed_name().await,
        })
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(SyncError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| SyncError::NotConnected)
    }
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("connected", &self.is_connected())
            .field("player_id", &self.player_id())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; abort the loop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Multiplexes outgoing commands and incoming frames with `tokio::select!`.
///
/// Exits when the command channel closes, the shutdown signal fires, the
/// server closes the socket, or the transport fails.
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<GameEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("transport loop started");
    emit_event(&event_tx, GameEvent::Connected).await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                debug!(message = %json, "sending client message");
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &state,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientMessage: {e}");
                            }
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                // Pending commands are dropped with the receiver.
                cmd_rx.close();
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => handle_incoming(&text, &event_tx, &state).await,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        info!("game socket closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

async fn handle_incoming(text: &str, event_tx: &mpsc::Sender<GameEvent>, state: &ClientState) {
    let server_msg = match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            let err = SyncError::ProtocolViolation(e.to_string());
            warn!(raw = %text, "dropping frame: {err}");
            return;
        }
    };

    update_state(state, &server_msg).await;

    match GameEvent::try_from(server_msg) {
        Ok(event) => emit_event(event_tx, event).await,
        Err(_) => debug!(raw = %text, "ignoring server message of unknown type"),
    }
}

/// Update shared [`ClientState`] from a received [`ServerMessage`].
async fn update_state(state: &ClientState, msg: &ServerMessage) {
    match msg {
        ServerMessage::GameState { player_id, .. } => {
            let previous = state.player_id.swap(*player_id, Ordering::AcqRel);
            if previous != *player_id {
                debug!(player_id, "state: slot assigned");
            }
        }
        ServerMessage::NameStatus {
            ok: true,
            name: Some(name),
            ..
        } => {
            *state.confirmed_name.lock().await = Some(name.clone());
            debug!(name = %name, "state: name confirmed");
        }
        ServerMessage::NameStatus {
            ok: false, reason, ..
        } => {
            warn!(?reason, "display name rejected");
        }
        _ => {}
    }
}

/// Deliver an event. Waits for capacity: state-changing frames are never
/// dropped.
async fn emit_event(event_tx: &mpsc::Sender<GameEvent>, event: GameEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

async fn emit_disconnected(
    event_tx: &mpsc::Sender<GameEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    emit_event(event_tx, GameEvent::Disconnected { reason }).await;
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Records sent frames and replays scripted ones.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, SyncError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, SyncError>>>,
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
        async fn send(&mut self, message: String) -> std::result::Result<(), SyncError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SyncError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), SyncError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn game_state_json(player_id: PlayerId) -> String {
        serde_json::to_string(&ServerMessage::GameState {
            player_id,
            image_data: "data:image/jpeg;base64,AAAA".into(),
            game_state: None,
            game_started: false,
        })
        .unwrap()
    }

    fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn start_sends_set_name_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(game_state_json(1)))]);
        let (mut client, mut events) = GameClient::start(transport, GameClientConfig::new("Alice"));

        assert_eq!(events.recv().await.unwrap(), GameEvent::Connected);
        assert!(matches!(
            events.recv().await.unwrap(),
            GameEvent::GameState { player_id: 1, .. }
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let messages = sent_messages(&sent);
        assert_eq!(
            messages,
            vec![
                ClientMessage::SetName {
                    name: "Alice".into()
                },
                ClientMessage::ModeChange {
                    mode: CameraMode::Base
                },
                ClientMessage::GetAlarmState,
            ]
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn optional_handshake_messages_can_be_disabled() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(game_state_json(2)))]);
        let config = GameClientConfig::new("Bob")
            .with_initial_mode(None)
            .with_alarm_sync_on_connect(false);
        let (mut client, mut events) = GameClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameState
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            sent_messages(&sent),
            vec![ClientMessage::SetName { name: "Bob".into() }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn game_state_assigns_player_id_used_by_trigger() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(game_state_json(2)))]);
        let config = GameClientConfig::new("Bob").with_alarm_sync_on_connect(false);
        let (mut client, mut events) = GameClient::start(transport, config);

        let _ = events.recv().await;
        let _ = events.recv().await;
        assert_eq!(client.player_id(), Some(2));

        client.trigger_alarm(DEFAULT_ALARM_TYPE).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let last = sent_messages(&sent).pop().unwrap();
        assert_eq!(
            last,
            ClientMessage::TriggerAlarm {
                alarm_type: DEFAULT_ALARM_TYPE.into(),
                triggered_by: Some(2),
            }
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn name_status_updates_identity() {
        let accepted = r#"{"type":"name_status","ok":true,"name":"Alice"}"#.to_string();
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(game_state_json(1))), Some(Ok(accepted))]);
        let (mut client, mut events) = GameClient::start(transport, GameClientConfig::new("Alice"));

        let _ = events.recv().await;
        let _ = events.recv().await;
        assert_eq!(
            events.recv().await.unwrap(),
            GameEvent::NameAccepted {
                name: "Alice".into()
            }
        );
        assert_eq!(
            client.identity().await,
            Some(Identity {
                player_id: 1,
                name: Some("Alice".into())
            })
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_are_skipped() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(r#"{"type":"weather","sun":true}"#.into())),
            Some(Ok("{not json".into())),
            Some(Ok(r#"{"type":"global_alarm"}"#.into())),
        ]);
        let (mut client, mut events) = GameClient::start(transport, GameClientConfig::new("A"));

        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            GameEvent::AlarmStarted {
                triggered_by: None,
                alarm_type: None
            }
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_close_reports_disconnected_without_retry() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut client, mut events) = GameClient::start(transport, GameClientConfig::new("A"));

        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            GameEvent::Disconnected { reason: None }
        );
        assert!(events.recv().await.is_none());
        assert!(!client.is_connected());
        assert!(matches!(client.stop_alarm(), Err(SyncError::NotConnected)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = GameClient::start(transport, GameClientConfig::new("A"));

        let _ = events.recv().await;
        client.shutdown().await;

        assert!(closed.load(Ordering::Relaxed));
        assert!(matches!(
            events.recv().await.unwrap(),
            GameEvent::Disconnected { .. }
        ));
        assert!(matches!(
            client.request_alarm_state(),
            Err(SyncError::NotConnected)
        ));
    }

    #[test]
    fn config_defaults() {
        let config = GameClientConfig::new("Alice");
        assert_eq!(config.initial_mode, Some(CameraMode::Base));
        assert!(config.alarm_sync_on_connect);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.with_event_channel_capacity(0).event_channel_capacity, 1);
    }
}
