//! Track synchronizer
//!
//! Owns the local audio/video pair and keeps every peer connection's sender
//! set in the canonical shape: exactly one audio sender and one video sender.
//! Attaching to a connection that already has a sender of a kind replaces the
//! sender's track instead of adding a second one.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::track::{LocalTrack, TrackKind};
use crate::{Error, Result};

/// Holder of the local track pair, shared across all peer links
#[derive(Default)]
pub struct TrackSynchronizer {
    audio: RwLock<Option<LocalTrack>>,
    video: RwLock<Option<LocalTrack>>,
}

impl TrackSynchronizer {
    /// Create an empty synchronizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the local audio track
    pub async fn set_audio(&self, track: LocalTrack) {
        *self.audio.write().await = Some(track);
    }

    /// Install the local video track
    pub async fn set_video(&self, track: LocalTrack) {
        *self.video.write().await = Some(track);
    }

    /// Current audio track, if installed
    pub async fn audio(&self) -> Option<LocalTrack> {
        self.audio.read().await.clone()
    }

    /// Current video track, if installed
    pub async fn video(&self) -> Option<LocalTrack> {
        self.video.read().await.clone()
    }

    /// Get the track of a kind
    pub async fn track(&self, kind: TrackKind) -> Option<LocalTrack> {
        match kind {
            TrackKind::Audio => self.audio().await,
            TrackKind::Video => self.video().await,
        }
    }

    /// Stop both local tracks
    pub async fn stop_all(&self) {
        if let Some(track) = self.audio.write().await.take() {
            track.stop();
        }
        if let Some(track) = self.video.write().await.take() {
            track.stop();
        }
    }

    /// Bring one connection's senders into the canonical shape
    ///
    /// Idempotent: attaching twice never grows the sender set.
    pub async fn attach(&self, pc: &Arc<RTCPeerConnection>) -> Result<()> {
        self.attach_kind(pc, TrackKind::Audio, RTPCodecType::Audio)
            .await?;
        self.attach_kind(pc, TrackKind::Video, RTPCodecType::Video)
            .await?;
        Ok(())
    }

    async fn attach_kind(
        &self,
        pc: &Arc<RTCPeerConnection>,
        kind: TrackKind,
        codec_type: RTPCodecType,
    ) -> Result<()> {
        let Some(local) = self.track(kind).await else {
            return Ok(());
        };

        for sender in pc.get_senders().await {
            let Some(existing) = sender.track().await else {
                continue;
            };
            if existing.kind() != codec_type {
                continue;
            }
            if existing.id() == local.id() {
                return Ok(());
            }
            debug!(kind = ?kind, "replacing sender track");
            sender
                .replace_track(Some(local.rtp_track()))
                .await
                .map_err(|e| Error::WebRtc(format!("replace_track failed: {e}")))?;
            return Ok(());
        }

        debug!(kind = ?kind, track_id = %local.id(), "adding sender track");
        pc.add_track(local.rtp_track())
            .await
            .map_err(|e| Error::WebRtc(format!("add_track failed: {e}")))?;
        Ok(())
    }
}
