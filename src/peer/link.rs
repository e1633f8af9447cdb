//! One pairwise connection to a remote participant
//!
//! `PeerLink` wraps a single `RTCPeerConnection` plus the logical negotiation
//! state. Remote ICE candidates arriving before the remote description are
//! buffered and flushed in arrival order once the description lands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::config::CallConfig;
use crate::{Error, Result};

/// Which side of the pair this link is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// The earlier joiner; writes the offer
    Initiator,
    /// The later joiner; answers the offer
    Responder,
}

/// Logical negotiation state of a link
///
/// `Connected` means the remote description has been applied; transport-level
/// ICE progress is reported separately and does not gate this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, no negotiation started
    Idle,
    /// Local description set, waiting for the counterpart
    Negotiating,
    /// Offer/answer exchange complete
    Connected,
    /// Torn down
    Closed,
}

/// A single peer-to-peer connection
pub struct PeerLink {
    peer_id: String,
    role: LinkRole,
    pc: Arc<RTCPeerConnection>,
    state: Mutex<LinkState>,
    remote_description_set: AtomicBool,
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
}

impl PeerLink {
    /// Build a link toward `peer_id` with ICE servers from the config
    #[instrument(skip(config))]
    pub async fn new(peer_id: &str, role: LinkRole, config: &CallConfig) -> Result<Self> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|e| Error::WebRtc(format!("codec registration failed: {e}")))?;
        let registry = register_default_interceptors(Registry::new(), &mut media)
            .map_err(|e| Error::WebRtc(format!("interceptor registration failed: {e}")))?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = vec![RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        }];
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let pc = api
            .new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::WebRtc(format!("peer connection setup failed: {e}")))?;

        debug!(peer = peer_id, ?role, "peer link created");
        Ok(Self {
            peer_id: peer_id.to_string(),
            role,
            pc: Arc::new(pc),
            state: Mutex::new(LinkState::Idle),
            remote_description_set: AtomicBool::new(false),
            pending_candidates: Mutex::new(Vec::new()),
        })
    }

    /// The remote participant's ID
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Which side of the pair this link is
    pub fn role(&self) -> LinkRole {
        self.role
    }

    /// Current logical state
    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == LinkState::Closed {
            return Err(Error::Negotiation(format!(
                "link to {} is closed",
                self.peer_id
            )));
        }
        Ok(())
    }

    /// The underlying peer connection
    pub fn pc(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    /// Number of buffered remote candidates (not yet applied)
    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Register a callback for locally gathered ICE candidates
    pub fn on_local_candidate<F>(&self, f: F)
    where
        F: Fn(RTCIceCandidate) + Send + Sync + 'static,
    {
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            if let Some(candidate) = candidate {
                f(candidate);
            }
            Box::pin(async {})
        }));
    }

    /// Register a callback for incoming remote tracks
    pub fn on_remote_track<F>(&self, f: F)
    where
        F: Fn(Arc<TrackRemote>) + Send + Sync + 'static,
    {
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                f(track);
                Box::pin(async {})
            },
        ));
    }

    /// Register a callback for transport state transitions
    pub fn on_transport_state<F>(&self, f: F)
    where
        F: Fn(RTCPeerConnectionState) + Send + Sync + 'static,
    {
        self.pc
            .on_peer_connection_state_change(Box::new(move |state| {
                f(state);
                Box::pin(async {})
            }));
    }

    /// Initiator side: produce and install the local offer
    #[instrument(skip(self), fields(peer = %self.peer_id))]
    pub async fn create_offer(&self) -> Result<RTCSessionDescription> {
        self.ensure_open()?;
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("create_offer failed: {e}")))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| Error::Negotiation(format!("set_local_description failed: {e}")))?;
        self.set_state(LinkState::Negotiating);
        Ok(offer)
    }

    /// Responder side: apply the remote offer and produce the local answer
    #[instrument(skip(self, offer), fields(peer = %self.peer_id))]
    pub async fn accept_offer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription> {
        self.ensure_open()?;
        self.set_state(LinkState::Negotiating);
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("set_remote_description failed: {e}")))?;
        self.remote_description_set.store(true, Ordering::SeqCst);
        self.flush_pending_candidates().await;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("create_answer failed: {e}")))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| Error::Negotiation(format!("set_local_description failed: {e}")))?;
        self.set_state(LinkState::Connected);
        Ok(answer)
    }

    /// Initiator side: apply the remote answer
    #[instrument(skip(self, answer), fields(peer = %self.peer_id))]
    pub async fn accept_answer(&self, answer: RTCSessionDescription) -> Result<()> {
        self.ensure_open()?;
        if self.remote_description_set.load(Ordering::SeqCst) {
            debug!("answer already applied, ignoring duplicate");
            return Ok(());
        }
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("set_remote_description failed: {e}")))?;
        self.remote_description_set.store(true, Ordering::SeqCst);
        self.flush_pending_candidates().await;
        self.set_state(LinkState::Connected);
        Ok(())
    }

    /// Apply a remote ICE candidate, buffering it if the remote description
    /// has not landed yet
    pub async fn add_remote_candidate(&self, init: RTCIceCandidateInit) -> Result<()> {
        self.ensure_open()?;
        if !self.remote_description_set.load(Ordering::SeqCst) {
            self.pending_candidates
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(init);
            return Ok(());
        }
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::Negotiation(format!("add_ice_candidate failed: {e}")))
    }

    async fn flush_pending_candidates(&self) {
        let pending: Vec<RTCIceCandidateInit> = {
            let mut guard = self
                .pending_candidates
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        if pending.is_empty() {
            return;
        }
        debug!(peer = %self.peer_id, count = pending.len(), "flushing buffered candidates");
        for init in pending {
            if let Err(e) = self.pc.add_ice_candidate(init).await {
                warn!(peer = %self.peer_id, error = %e, "buffered candidate rejected");
            }
        }
    }

    /// Tear the link down
    pub async fn close(&self) -> Result<()> {
        self.set_state(LinkState::Closed);
        self.pc
            .close()
            .await
            .map_err(|e| Error::WebRtc(format!("close failed: {e}")))
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("peer_id", &self.peer_id)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish()
    }
}
