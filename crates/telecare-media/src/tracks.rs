//! Media track and capture handle lifecycle.
//!
//! A handle's only destruction path is `release()`, which stops and
//! disables every track so a lingering reference cannot resume capture.
//! `Drop` calls it too, so an early-return path cannot leak hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use telecare_shared::MediaKind;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("no capture device available")]
    NoDevice,

    #[error("media device error: {0}")]
    Device(String),
}

/// One capture or playback track. `enabled` is the mute switch; `stop`
/// is terminal.
#[derive(Debug)]
pub struct MediaTrack {
    kind: MediaKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaTrack {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flip the mute switch. A stopped track stays disabled.
    pub fn set_enabled(&self, enabled: bool) {
        if self.is_stopped() {
            return;
        }
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Terminal: the track never produces media again.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
    }
}

/// Exclusively-owned local capture, one handle per call session.
#[derive(Debug)]
pub struct LocalMediaHandle {
    tracks: Vec<Arc<MediaTrack>>,
}

impl LocalMediaHandle {
    pub fn new(tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self { tracks }
    }

    /// Standard audio + video capture pair.
    pub fn audio_video() -> Self {
        Self::new(vec![
            MediaTrack::new(MediaKind::Audio),
            MediaTrack::new(MediaKind::Video),
        ])
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn track(&self, kind: MediaKind) -> Option<&Arc<MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Stop and disable every track. Idempotent.
    pub fn release(&mut self) {
        for track in &self.tracks {
            track.stop();
        }
        debug!(tracks = self.tracks.len(), "Local media released");
    }
}

impl Drop for LocalMediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Remote media received through the peer connection.
#[derive(Debug)]
pub struct RemoteMediaHandle {
    tracks: Vec<Arc<MediaTrack>>,
}

impl RemoteMediaHandle {
    pub fn new(tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn audio_video() -> Self {
        Self::new(vec![
            MediaTrack::new(MediaKind::Audio),
            MediaTrack::new(MediaKind::Video),
        ])
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn release(&mut self) {
        for track in &self.tracks {
            track.stop();
        }
        debug!(tracks = self.tracks.len(), "Remote media released");
    }
}

impl Drop for RemoteMediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Device acquisition seam. The state machine acquires lazily at call
/// start or accept, never earlier.
pub trait MediaDevices: Send + Sync {
    fn acquire(&self) -> Result<LocalMediaHandle, MediaError>;
}

/// Hands out a fresh audio + video handle per acquisition.
#[derive(Debug, Default)]
pub struct DefaultDevices;

impl MediaDevices for DefaultDevices {
    fn acquire(&self) -> Result<LocalMediaHandle, MediaError> {
        Ok(LocalMediaHandle::audio_video())
    }
}

/// A host with no capture hardware; every acquisition fails.
#[derive(Debug, Default)]
pub struct NullDevices;

impl MediaDevices for NullDevices {
    fn acquire(&self) -> Result<LocalMediaHandle, MediaError> {
        Err(MediaError::NoDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_stops_and_disables() {
        let mut handle = LocalMediaHandle::audio_video();
        let tracks: Vec<_> = handle.tracks().to_vec();
        assert!(tracks.iter().all(|t| t.is_enabled()));

        handle.release();
        assert!(tracks.iter().all(|t| t.is_stopped() && !t.is_enabled()));

        // Idempotent.
        handle.release();
        assert!(tracks.iter().all(|t| !t.is_enabled()));
    }

    #[test]
    fn test_drop_releases() {
        let handle = LocalMediaHandle::audio_video();
        let tracks: Vec<_> = handle.tracks().to_vec();
        drop(handle);
        assert!(tracks.iter().all(|t| t.is_stopped()));
    }

    #[test]
    fn test_stopped_track_cannot_be_re_enabled() {
        let track = MediaTrack::new(MediaKind::Audio);
        track.stop();
        track.set_enabled(true);
        assert!(!track.is_enabled());
    }

    #[test]
    fn test_mute_flip_does_not_stop() {
        let handle = LocalMediaHandle::audio_video();
        let audio = handle.track(MediaKind::Audio).unwrap();
        audio.set_enabled(false);
        assert!(!audio.is_enabled());
        assert!(!audio.is_stopped());
        audio.set_enabled(true);
        assert!(audio.is_enabled());
    }

    #[test]
    fn test_null_devices() {
        assert!(matches!(
            NullDevices.acquire(),
            Err(MediaError::NoDevice)
        ));
    }
}
