//! One-to-one voice call state machine on top of a [`SignalingPeer`].
//!
//! The negotiator owns the signaling peer, the microphone stream and the
//! reconnect timer. At most one call exists at a time. Incoming calls are
//! held until the user accepts or rejects them, and one that arrives while
//! busy is rejected on the spot.

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::error_codes::SignalingErrorKind;
use crate::scheduler::Scheduler;
use crate::voice::backoff::{Backoff, BackoffDecision, ReconnectPolicy};
use crate::voice::identity::generate_peer_id;
use crate::voice::media::{
    AudioLevelMeter, LocalStream, MediaDevices, RemoteStream, DEFAULT_AUDIO_THRESHOLD,
};
use crate::voice::signaling::{SignalingEvent, SignalingPeer};

/// Voice settings.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub reconnect: ReconnectPolicy,
    /// Average remote level above which the call counts as audible.
    /// Defaults to **5** on the 0..=255 analyser scale.
    pub audio_threshold: f32,
}

impl VoiceConfig {
    pub fn new() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            audio_threshold: DEFAULT_AUDIO_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_audio_threshold(mut self, threshold: f32) -> Self {
        self.audio_threshold = threshold;
        self
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection to the signaling broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    Connecting,
    Connected,
    /// Retry number `attempt` (1-based) is scheduled or running.
    Reconnecting { attempt: u32 },
    /// Automatic retries are used up; only [`VoiceNegotiator::reconnect`]
    /// helps.
    Failed,
    Closed,
}

/// The single call slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// A remote peer is calling and waits for accept or reject.
    Incoming { from: String },
    /// Call placed or accepted, remote audio not there yet.
    Connecting { remote: String },
    Active { remote: String },
}

impl CallState {
    fn is_busy(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Active { .. })
    }
}

/// What [`VoiceNegotiator::next`] reports.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceUpdate {
    Status(VoiceStatus),
    /// An automatic reconnect was just attempted.
    Retrying { attempt: u32 },
    /// Automatic reconnection gave up.
    ConnectionImpossible { attempts: u32 },
    IncomingCall { from: String },
    /// Remote audio arrived; the call is live.
    CallStarted { remote: String },
    CallEnded,
    /// The remote audio became audible or went quiet.
    ReceivingAudio(bool),
    SignalingError {
        kind: SignalingErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceInput {
    Retry,
}

/// Voice channel for one player.
pub struct VoiceNegotiator<S, M> {
    peer_id: String,
    signaling: S,
    media: M,
    backoff: Backoff,
    timers: Scheduler<VoiceInput>,
    status: VoiceStatus,
    call: CallState,
    local_stream: Option<LocalStream>,
    remote_stream: Option<RemoteStream>,
    audio: AudioLevelMeter,
    last_error: Option<SyncError>,
    closed: bool,
}

impl<S: SignalingPeer, M: MediaDevices> VoiceNegotiator<S, M> {
    /// Derive a peer id from `room_id` and `local_name` and register it.
    ///
    /// # Errors
    ///
    /// Whatever [`SignalingPeer::open`] returns.
    pub async fn open(
        room_id: &str,
        local_name: &str,
        mut signaling: S,
        media: M,
        config: VoiceConfig,
    ) -> Result<Self> {
        let peer_id = generate_peer_id(room_id, local_name);
        info!(peer_id = %peer_id, room_id, "opening voice peer");
        signaling.open(&peer_id).await?;

        Ok(Self {
            peer_id,
            signaling,
            media,
            backoff: Backoff::new(config.reconnect),
            timers: Scheduler::new(),
            status: VoiceStatus::Connecting,
            call: CallState::Idle,
            local_stream: None,
            remote_stream: None,
            audio: AudioLevelMeter::new(config.audio_threshold),
            last_error: None,
            closed: false,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn status(&self) -> VoiceStatus {
        self.status
    }

    pub fn call_state(&self) -> &CallState {
        &self.call
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local_stream.as_ref()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    /// `true` while the live call's remote audio is above the threshold.
    pub fn is_receiving_audio(&self) -> bool {
        self.audio.is_receiving()
    }

    /// The most recent error, for display.
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// Feed one level snapshot of the remote audio, as byte frequency bins
    /// from the platform's analyser. Returns [`VoiceUpdate::ReceivingAudio`]
    /// when the indicator flips. Ignored unless a call is active.
    pub fn observe_remote_audio(&mut self, bins: &[u8]) -> Option<VoiceUpdate> {
        if !matches!(self.call, CallState::Active { .. }) {
            return None;
        }
        self.audio.sample(bins).map(VoiceUpdate::ReceivingAudio)
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Call `remote_peer_id`.
    ///
    /// # Errors
    ///
    /// [`SyncError::CallInProgress`] while another call exists,
    /// [`SyncError::MediaPermissionDenied`] when the microphone is refused
    /// (nothing else changes), [`SyncError::VoiceClosed`] after `close`, or
    /// the signaling peer's error.
    pub async fn call(&mut self, remote_peer_id: &str) -> Result<()> {
        self.ensure_open()?;
        if self.call != CallState::Idle {
            return Err(SyncError::CallInProgress);
        }
        let stream = self.request_microphone().await?;
        if let Err(e) = self.signaling.call(remote_peer_id, &stream).await {
            stream.stop_all();
            return Err(e);
        }
        info!(remote = %remote_peer_id, "calling");
        self.local_stream = Some(stream);
        self.call = CallState::Connecting {
            remote: remote_peer_id.to_string(),
        };
        Ok(())
    }

    /// Answer the pending incoming call.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoIncomingCall`], [`SyncError::CallInProgress`],
    /// [`SyncError::MediaPermissionDenied`] (the call stays pending),
    /// [`SyncError::VoiceClosed`], or the signaling peer's error.
    pub async fn accept(&mut self) -> Result<()> {
        self.ensure_open()?;
        let from = match &self.call {
            CallState::Incoming { from } => from.clone(),
            CallState::Idle => return Err(SyncError::NoIncomingCall),
            _ => return Err(SyncError::CallInProgress),
        };
        let stream = self.request_microphone().await?;
        if let Err(e) = self.signaling.answer(&stream).await {
            stream.stop_all();
            return Err(e);
        }
        info!(remote = %from, "call accepted");
        self.local_stream = Some(stream);
        self.call = CallState::Connecting { remote: from };
        Ok(())
    }

    /// Refuse the pending incoming call.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoIncomingCall`], [`SyncError::VoiceClosed`], or the
    /// signaling peer's error.
    pub async fn reject(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !matches!(self.call, CallState::Incoming { .. }) {
            return Err(SyncError::NoIncomingCall);
        }
        self.call = CallState::Idle;
        self.signaling.reject().await
    }

    /// End the current call.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoActiveCall`] when no call is placed or live.
    pub async fn hang_up(&mut self) -> Result<()> {
        if !self.call.is_busy() {
            return Err(SyncError::NoActiveCall);
        }
        if let Err(e) = self.signaling.hang_up().await {
            warn!("hang up failed: {e}");
        }
        self.end_call();
        Ok(())
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Re-register by hand, typically after automatic retries gave up.
    /// Starts a fresh retry budget.
    ///
    /// # Errors
    ///
    /// [`SyncError::VoiceClosed`] or the signaling peer's error.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.timers.cancel_all();
        self.backoff.reset();
        self.status = VoiceStatus::Connecting;
        self.signaling.reconnect().await
    }

    /// End any call, cancel timers and leave the broker. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.call.is_busy() {
            if let Err(e) = self.signaling.hang_up().await {
                debug!("hang up on close failed: {e}");
            }
        }
        self.end_call();
        self.timers.cancel_all();
        if let Err(e) = self.signaling.destroy().await {
            warn!("destroying signaling peer failed: {e}");
        }
        self.status = VoiceStatus::Closed;
        info!(peer_id = %self.peer_id, "voice closed");
    }

    /// Wait for the next update. `None` after `close` or once the
    /// signaling peer is gone. Cancel-safe while waiting.
    pub async fn next(&mut self) -> Option<VoiceUpdate> {
        loop {
            if self.closed {
                return None;
            }
            let woken = {
                let signaling = &mut self.signaling;
                let timers = &mut self.timers;
                tokio::select! {
                    event = signaling.next_event() => Err(event),
                    input = timers.next() => Ok(input),
                }
            };
            let update = match woken {
                Ok(VoiceInput::Retry) => self.on_retry().await,
                Err(Some(event)) => self.on_signaling(event).await,
                Err(None) => {
                    debug!("signaling peer ended");
                    self.end_call();
                    self.timers.cancel_all();
                    return None;
                }
            };
            if update.is_some() {
                return update;
            }
        }
    }

    async fn on_signaling(&mut self, event: SignalingEvent) -> Option<VoiceUpdate> {
        match event {
            SignalingEvent::Open { peer_id } => {
                info!(peer_id = %peer_id, "voice peer open");
                self.timers.cancel_all();
                self.backoff.reset();
                self.peer_id = peer_id;
                self.last_error = None;
                self.set_status(VoiceStatus::Connected)
            }
            SignalingEvent::Disconnected => self.on_disconnected(),
            SignalingEvent::Closed => {
                self.end_call();
                self.timers.cancel_all();
                self.set_status(VoiceStatus::Closed)
            }
            SignalingEvent::IncomingCall { from } => {
                if self.call != CallState::Idle {
                    info!(from = %from, "busy, rejecting incoming call");
                    if let Err(e) = self.signaling.reject().await {
                        warn!("rejecting busy call failed: {e}");
                    }
                    return None;
                }
                self.call = CallState::Incoming { from: from.clone() };
                Some(VoiceUpdate::IncomingCall { from })
            }
            SignalingEvent::RemoteStream { from, stream } => match &self.call {
                CallState::Connecting { remote } if *remote == from => {
                    self.remote_stream = Some(stream);
                    self.call = CallState::Active {
                        remote: from.clone(),
                    };
                    Some(VoiceUpdate::CallStarted { remote: from })
                }
                _ => {
                    debug!(from = %from, "remote stream outside a call, ignoring");
                    None
                }
            },
            SignalingEvent::CallClosed => {
                if self.call == CallState::Idle {
                    return None;
                }
                self.end_call();
                Some(VoiceUpdate::CallEnded)
            }
            SignalingEvent::Error { kind, message } => {
                warn!(%kind, message = %message, "signaling error");
                if kind == SignalingErrorKind::PeerUnavailable
                    && matches!(self.call, CallState::Connecting { .. })
                {
                    self.end_call();
                }
                self.last_error = Some(SyncError::Signaling {
                    kind,
                    message: message.clone(),
                });
                Some(VoiceUpdate::SignalingError { kind, message })
            }
        }
    }

    fn on_disconnected(&mut self) -> Option<VoiceUpdate> {
        match self.backoff.on_disconnected() {
            BackoffDecision::Retry { attempt, delay } => {
                info!(attempt = attempt + 1, ?delay, "signaling lost, retry scheduled");
                self.timers.after(delay, VoiceInput::Retry);
                self.set_status(VoiceStatus::Reconnecting {
                    attempt: attempt + 1,
                })
            }
            BackoffDecision::Exhausted { attempts } => {
                warn!(attempts, "signaling connection impossible");
                self.status = VoiceStatus::Failed;
                self.last_error = Some(SyncError::ConnectionImpossible { attempts });
                Some(VoiceUpdate::ConnectionImpossible { attempts })
            }
            BackoffDecision::Idle => {
                debug!("disconnect ignored");
                None
            }
        }
    }

    async fn on_retry(&mut self) -> Option<VoiceUpdate> {
        let attempt = self.backoff.on_retry();
        debug!(attempt, "reconnecting signaling peer");
        if let Err(e) = self.signaling.reconnect().await {
            warn!(attempt, "reconnect failed: {e}");
            self.last_error = Some(e);
        }
        Some(VoiceUpdate::Retrying { attempt })
    }

    async fn request_microphone(&mut self) -> Result<LocalStream> {
        match self.media.request_microphone().await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                warn!("microphone unavailable: {e}");
                Err(e)
            }
        }
    }

    fn end_call(&mut self) {
        if let Some(stream) = self.local_stream.take() {
            stream.stop_all();
        }
        self.remote_stream = None;
        self.audio.clear();
        self.call = CallState::Idle;
    }

    fn set_status(&mut self, status: VoiceStatus) -> Option<VoiceUpdate> {
        if self.status == status {
            return None;
        }
        self.status = status;
        Some(VoiceUpdate::Status(status))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SyncError::VoiceClosed)
        } else {
            Ok(())
        }
    }
}

impl<S, M> Drop for VoiceNegotiator<S, M> {
    fn drop(&mut self) {
        if let Some(stream) = self.local_stream.take() {
            stream.stop_all();
        }
    }
}

impl<S, M> std::fmt::Debug for VoiceNegotiator<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceNegotiator")
            .field("peer_id", &self.peer_id)
            .field("status", &self.status)
            .field("call", &self.call)
            .field("closed", &self.closed)
            .finish()
    }
}
