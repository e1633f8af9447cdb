//! Local track wrapper with a renegotiation-free enabled bit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Kind of a local media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone or synthetic silence
    Audio,
    /// Camera or synthetic blank frames
    Video,
}

impl TrackKind {
    /// Codec capability used when building tracks of this kind
    pub fn codec(&self) -> RTCRtpCodecCapability {
        match self {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        }
    }
}

/// A local outgoing track
///
/// The enabled bit is the single source of truth for whether media flows;
/// the underlying sender stays attached either way. Clones share the same
/// track and flags.
#[derive(Clone)]
pub struct LocalTrack {
    kind: TrackKind,
    inner: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    synthetic: bool,
}

impl LocalTrack {
    /// Build an audio track
    pub fn audio(id: &str, stream_id: &str, synthetic: bool) -> Self {
        Self::new(TrackKind::Audio, id, stream_id, synthetic)
    }

    /// Build a video track
    pub fn video(id: &str, stream_id: &str, synthetic: bool) -> Self {
        Self::new(TrackKind::Video, id, stream_id, synthetic)
    }

    fn new(kind: TrackKind, id: &str, stream_id: &str, synthetic: bool) -> Self {
        let inner = Arc::new(TrackLocalStaticSample::new(
            kind.codec(),
            id.to_string(),
            stream_id.to_string(),
        ));
        Self {
            kind,
            inner,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
            synthetic,
        }
    }

    /// Kind of this track
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Track ID
    pub fn id(&self) -> String {
        self.inner.id().to_string()
    }

    /// Whether this track carries synthetic media instead of a real capture
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Whether media is currently flowing
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the enabled bit, returning the previous value
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }

    /// Whether the track has been stopped for good
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the track; sample feeders observe this and exit
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// The sample sink feeders write into
    pub fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.clone()
    }

    /// The track in the form peer connections accept
    pub fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.inner.clone()
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("id", &self.inner.id())
            .field("enabled", &self.is_enabled())
            .field("synthetic", &self.synthetic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_bit_is_shared_across_clones() {
        let track = LocalTrack::audio("a1", "s1", false);
        let clone = track.clone();
        assert!(track.is_enabled());
        track.set_enabled(false);
        assert!(!clone.is_enabled());
    }

    #[test]
    fn test_set_enabled_returns_previous_value() {
        let track = LocalTrack::video("v1", "s1", true);
        assert!(track.set_enabled(false));
        assert!(!track.set_enabled(true));
    }

    #[test]
    fn test_stop_is_sticky() {
        let track = LocalTrack::audio("a1", "s1", true);
        assert!(!track.is_stopped());
        track.stop();
        assert!(track.is_stopped());
        // toggling after stop does not revive the track
        track.set_enabled(true);
        assert!(track.is_stopped());
    }
}
