//! Synthetic capture: silent audio and blank video
//!
//! Stands in for real devices when capture fails or none are present, so a
//! participant can still join and every connection keeps its one-audio
//! one-video sender shape.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;
use webrtc::media::Sample;

use super::capture::CaptureSource;
use super::track::{LocalTrack, TrackKind};
use crate::Result;

const AUDIO_FRAME: Duration = Duration::from_millis(20);
const VIDEO_FRAME: Duration = Duration::from_millis(33);

/// Capture source that fabricates silent/blank tracks
#[derive(Debug, Clone, Default)]
pub struct SyntheticCapture;

impl SyntheticCapture {
    /// Create a synthetic capture source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureSource for SyntheticCapture {
    async fn acquire_audio(&self) -> Result<LocalTrack> {
        let id = format!("synthetic-audio-{}", Uuid::new_v4());
        let track = LocalTrack::audio(&id, "local-media", true);
        debug!(track_id = %id, "synthetic audio track created");
        spawn_feeder(track.clone());
        Ok(track)
    }

    async fn acquire_video(&self) -> Result<LocalTrack> {
        let id = format!("synthetic-video-{}", Uuid::new_v4());
        let track = LocalTrack::video(&id, "local-media", true);
        debug!(track_id = %id, "synthetic video track created");
        spawn_feeder(track.clone());
        Ok(track)
    }
}

/// Feed zeroed samples while the track is enabled; exits once stopped
fn spawn_feeder(track: LocalTrack) {
    let (interval, payload_len) = match track.kind() {
        TrackKind::Audio => (AUDIO_FRAME, 160),
        TrackKind::Video => (VIDEO_FRAME, 1024),
    };
    let sink = track.sample_track();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if track.is_stopped() {
                break;
            }
            if !track.is_enabled() {
                continue;
            }
            let sample = Sample {
                data: Bytes::from(vec![0u8; payload_len]),
                duration: interval,
                ..Default::default()
            };
            // Unbound tracks accept and discard samples.
            if sink.write_sample(&sample).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_yields_synthetic_enabled_tracks() {
        let capture = SyntheticCapture::new();
        let audio = capture.acquire_audio().await.unwrap();
        let video = capture.acquire_video().await.unwrap();

        assert!(audio.is_synthetic());
        assert!(video.is_synthetic());
        assert!(audio.is_enabled());
        assert_eq!(audio.kind(), TrackKind::Audio);
        assert_eq!(video.kind(), TrackKind::Video);
    }

    #[tokio::test]
    async fn test_acquired_tracks_have_distinct_ids() {
        let capture = SyntheticCapture::new();
        let a = capture.acquire_audio().await.unwrap();
        let b = capture.acquire_audio().await.unwrap();
        assert_ne!(a.id(), b.id());
    }
}
