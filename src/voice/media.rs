//! Local microphone capture, remote audio handles and the "receiving
//! audio" indicator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SyncError;

/// One captured track. Clones share the live flag, so a clone kept by the
/// capture backend sees when the negotiator stops the track.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Release the device. Idempotent.
    pub fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }
}

/// The local microphone stream.
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    tracks: Vec<MediaTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Tracks not stopped yet.
    pub fn active_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// The remote side's audio, as handed over by the signaling peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
}

impl RemoteStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Average level above which remote audio counts as present.
pub const DEFAULT_AUDIO_THRESHOLD: f32 = 5.0;

/// Average of one analyser snapshot (byte frequency bins, 0..=255).
/// An empty snapshot is silence.
pub fn average_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    sum as f32 / bins.len() as f32
}

/// Turns remote level snapshots into an on/off "receiving audio" flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioLevelMeter {
    threshold: f32,
    receiving: bool,
}

impl AudioLevelMeter {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            receiving: false,
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    /// Feed one snapshot. Returns the new flag when it flipped.
    pub fn sample(&mut self, bins: &[u8]) -> Option<bool> {
        self.set(average_level(bins) > self.threshold)
    }

    /// Force the flag off, e.g. when the call ends.
    pub fn clear(&mut self) -> Option<bool> {
        self.set(false)
    }

    fn set(&mut self, receiving: bool) -> Option<bool> {
        if self.receiving == receiving {
            return None;
        }
        self.receiving = receiving;
        Some(receiving)
    }
}

impl Default for AudioLevelMeter {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_THRESHOLD)
    }
}

/// Access to capture devices.
#[async_trait]
pub trait MediaDevices: Send {
    /// Ask for the microphone.
    ///
    /// Fails with [`SyncError::MediaPermissionDenied`] when the user or the
    /// platform refuses.
    async fn request_microphone(&mut self) -> Result<LocalStream, SyncError>;
}
