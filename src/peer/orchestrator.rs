//! Engine loop driving all pairwise negotiation
//!
//! One task per session consumes three channels: roster changes, incoming
//! offers, and internal engine events forwarded by pair-scoped subscriptions
//! and connection callbacks. All session mutation happens on this task, so
//! membership decisions and negotiation steps never race each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use super::link::{LinkRole, LinkState, PeerLink};
use crate::config::CallConfig;
use crate::events::CallEvent;
use crate::media::{TrackKind, TrackSynchronizer};
use crate::membership::{classify_offer, classify_roster, RosterAction};
use crate::session::{ParticipantInfo, SessionState};
use crate::signaling::store::CollectionRx;
use crate::signaling::{paths, CandidateDoc, DocChange, NegotiationDoc, ParticipantDoc};
use crate::signaling::{ChangeKind, SignalingStore, Unsubscribe};
use crate::{Error, Result};

/// Internal events funneled into the engine loop
pub(crate) enum EngineEvent {
    /// The answer document for an initiated pair gained a value
    AnswerReceived { peer_id: String, value: Value },
    /// A remote candidate appeared in a pair's candidate log
    CandidateReceived { peer_id: String, doc: CandidateDoc },
    /// A local candidate was gathered and must be published
    LocalCandidate {
        peer_id: String,
        role: LinkRole,
        doc: CandidateDoc,
    },
    /// A remote track started arriving
    RemoteTrack {
        peer_id: String,
        track: Arc<TrackRemote>,
    },
    /// The underlying transport changed state
    TransportState {
        peer_id: String,
        state: RTCPeerConnectionState,
    },
}

pub(crate) struct Engine {
    config: CallConfig,
    store: Arc<dyn SignalingStore>,
    sync: Arc<TrackSynchronizer>,
    state: Arc<SessionState>,
    links: RwLock<HashMap<String, Arc<PeerLink>>>,
    pair_watchers: StdMutex<HashMap<String, Vec<Unsubscribe>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<CallEvent>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl Engine {
    pub(crate) fn new(
        config: CallConfig,
        store: Arc<dyn SignalingStore>,
        sync: Arc<TrackSynchronizer>,
        state: Arc<SessionState>,
        events_tx: mpsc::UnboundedSender<CallEvent>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            config,
            store,
            sync,
            state,
            links: RwLock::new(HashMap::new()),
            pair_watchers: StdMutex::new(HashMap::new()),
            tasks: StdMutex::new(Vec::new()),
            events_tx,
            engine_tx,
        });
        (engine, engine_rx)
    }

    /// Consume session channels until shutdown or all senders close
    pub(crate) async fn run(
        self: Arc<Self>,
        mut roster_rx: CollectionRx,
        mut offers_rx: CollectionRx,
        mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(call = %self.state.call_id(), "engine loop started");
        loop {
            tokio::select! {
                Some(batch) = roster_rx.recv() => {
                    for change in batch {
                        self.handle_roster_change(change).await;
                    }
                }
                Some(batch) = offers_rx.recv() => {
                    for change in batch {
                        self.handle_offer_change(change).await;
                    }
                }
                Some(event) = engine_rx.recv() => {
                    self.handle_engine_event(event).await;
                }
                _ = shutdown_rx.recv() => break,
                else => break,
            }
        }
        info!(call = %self.state.call_id(), "engine loop stopped");
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn handle_roster_change(&self, change: DocChange) {
        let known = self.state.contains(&change.doc_id);
        let action = match classify_roster(
            &change,
            self.state.local_id(),
            self.state.joined_at(),
            known,
        ) {
            Ok(Some(action)) => action,
            Ok(None) => return,
            Err(e) => {
                warn!(doc = %change.doc_id, error = %e, "unusable roster document");
                return;
            }
        };

        match action {
            RosterAction::Observe {
                peer_id,
                doc,
                initiate,
            } => {
                let info = ParticipantInfo::from_doc(&peer_id, &doc);
                self.emit(CallEvent::ParticipantJoined {
                    participant_id: peer_id.clone(),
                    name: info.name.clone(),
                    mic_enabled: info.mic_enabled,
                    cam_enabled: info.cam_enabled,
                });
                self.state.upsert(info);
                if initiate {
                    if let Err(e) = self.initiate_link(&peer_id).await {
                        warn!(peer = %peer_id, error = %e, "initiation toward peer failed");
                        self.fail_pair(&peer_id, &e).await;
                    }
                }
            }
            RosterAction::UpdateMedia { peer_id, doc } => {
                let prev = self.state.get(&peer_id);
                self.state
                    .update_media(&peer_id, doc.is_mic_enabled, doc.is_cam_enabled);
                let changed = prev.is_none_or(|p| {
                    p.mic_enabled != doc.is_mic_enabled || p.cam_enabled != doc.is_cam_enabled
                });
                if changed {
                    self.emit(CallEvent::ParticipantMediaChanged {
                        participant_id: peer_id,
                        mic_enabled: doc.is_mic_enabled,
                        cam_enabled: doc.is_cam_enabled,
                    });
                }
            }
            RosterAction::Remove { peer_id } => self.remove_peer(&peer_id).await,
        }
    }

    async fn handle_offer_change(&self, change: DocChange) {
        let linked = self.links.read().await.contains_key(&change.doc_id);
        match classify_offer(&change, self.state.local_id(), linked) {
            Ok(Some(action)) => {
                if let Err(e) = self
                    .respond_to_offer(&action.initiator_id, action.doc)
                    .await
                {
                    warn!(peer = %action.initiator_id, error = %e, "answering offer failed");
                    self.fail_pair(&action.initiator_id, &e).await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(doc = %change.doc_id, error = %e, "unusable offer document");
                self.fail_pair(&change.doc_id, &e).await;
            }
        }
    }

    async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::AnswerReceived { peer_id, value } => {
                if let Err(e) = self.apply_answer(&peer_id, &value).await {
                    warn!(peer = %peer_id, error = %e, "applying answer failed");
                    self.fail_pair(&peer_id, &e).await;
                }
            }
            EngineEvent::CandidateReceived { peer_id, doc } => {
                let link = self.links.read().await.get(&peer_id).cloned();
                let Some(link) = link else {
                    debug!(peer = %peer_id, "candidate for unknown link dropped");
                    return;
                };
                if let Err(e) = link.add_remote_candidate(doc.to_init()).await {
                    warn!(peer = %peer_id, error = %e, "remote candidate rejected");
                }
            }
            EngineEvent::LocalCandidate { peer_id, role, doc } => {
                if let Err(e) = self.publish_candidate(&peer_id, role, doc).await {
                    warn!(peer = %peer_id, error = %e, "publishing candidate failed");
                }
            }
            EngineEvent::RemoteTrack { peer_id, track } => {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    _ => TrackKind::Video,
                };
                debug!(peer = %peer_id, ?kind, "remote track arrived");
                self.state.set_remote_track(&peer_id, kind, track.clone());
                self.emit(CallEvent::TrackReceived {
                    participant_id: peer_id,
                    kind,
                    track,
                });
            }
            EngineEvent::TransportState { peer_id, state } => {
                debug!(peer = %peer_id, ?state, "transport state changed");
                if state == RTCPeerConnectionState::Failed {
                    warn!(peer = %peer_id, "transport failed");
                }
            }
        }
    }

    async fn apply_answer(&self, peer_id: &str, value: &Value) -> Result<()> {
        let link = self
            .links
            .read()
            .await
            .get(peer_id)
            .cloned()
            .ok_or_else(|| Error::ParticipantNotFound(peer_id.to_string()))?;
        let was_connected = link.state() == LinkState::Connected;
        let doc = NegotiationDoc::from_value(value)?;
        link.accept_answer(doc.description.to_description()?).await?;
        if !was_connected {
            self.emit(CallEvent::ConnectionStateChanged {
                participant_id: peer_id.to_string(),
                state: LinkState::Connected,
            });
        }
        Ok(())
    }

    async fn publish_candidate(
        &self,
        peer_id: &str,
        role: LinkRole,
        doc: CandidateDoc,
    ) -> Result<()> {
        let call = self.state.call_id();
        let local = self.state.local_id();
        // Initiator candidates go in the offer log under the responder's
        // doc; responder candidates in the answer log under its own doc.
        let collection = match role {
            LinkRole::Initiator => paths::offer_candidates(call, peer_id, local),
            LinkRole::Responder => paths::answer_candidates(call, local, peer_id),
        };
        self.store
            .create_doc(&collection, serde_json::to_value(&doc)?)
            .await
            .map_err(|e| Error::TransportWrite(e.to_string()))?;
        Ok(())
    }

    /// Start a connection toward a later joiner: publish an offer under
    /// their participant doc and watch for the answer and their candidates
    async fn initiate_link(&self, peer_id: &str) -> Result<()> {
        if self.links.read().await.contains_key(peer_id) {
            return Ok(());
        }
        let link = Arc::new(PeerLink::new(peer_id, LinkRole::Initiator, &self.config).await?);
        if let Err(e) = self.negotiate_as_initiator(peer_id, &link).await {
            if let Err(close_err) = link.close().await {
                warn!(peer = %peer_id, error = %close_err, "closing link failed");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn negotiate_as_initiator(&self, peer_id: &str, link: &Arc<PeerLink>) -> Result<()> {
        let call = self.state.call_id().to_string();
        let local = self.state.local_id().to_string();

        self.install_callbacks(link);
        self.sync.attach(link.pc()).await?;

        let offer = link.create_offer().await?;
        let offer_path = paths::offer_doc(&call, peer_id, &local);
        self.store
            .set_doc(
                &offer_path,
                serde_json::to_value(NegotiationDoc::new(&offer))?,
                true,
            )
            .await
            .map_err(|e| Error::TransportWrite(e.to_string()))?;
        info!(peer = %peer_id, "offer published");

        let mut unsubs = Vec::new();
        let mut tasks = Vec::new();

        let answer_path = paths::answer_doc(&call, peer_id, &local);
        let (unsub, mut rx) = self.store.subscribe_doc(&answer_path).await?;
        let tx = self.engine_tx.clone();
        let pid = peer_id.to_string();
        tasks.push(tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                let Some(value) = value else { continue };
                if tx
                    .send(EngineEvent::AnswerReceived {
                        peer_id: pid.clone(),
                        value,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }));
        unsubs.push(unsub);

        let cand_path = paths::answer_candidates(&call, peer_id, &local);
        let (unsub, rx) = self.store.subscribe_collection(&cand_path).await?;
        tasks.push(self.spawn_candidate_forwarder(peer_id, rx));
        unsubs.push(unsub);

        self.links
            .write()
            .await
            .insert(peer_id.to_string(), link.clone());
        self.register_pair(peer_id, unsubs, tasks);
        Ok(())
    }

    /// Answer an offer from an earlier joiner
    async fn respond_to_offer(&self, initiator_id: &str, doc: NegotiationDoc) -> Result<()> {
        if self.links.read().await.contains_key(initiator_id) {
            return Ok(());
        }
        let call = self.state.call_id().to_string();
        let local = self.state.local_id().to_string();

        // Read the initiator's roster doc before negotiating so their name
        // and media flags are known when the connection surfaces.
        if !self.state.contains(initiator_id) {
            let roster_path = paths::participant_doc(&call, initiator_id);
            if let Some(value) = self.store.get_doc(&roster_path).await? {
                let pdoc = ParticipantDoc::from_value(&value)?;
                let info = ParticipantInfo::from_doc(initiator_id, &pdoc);
                self.emit(CallEvent::ParticipantJoined {
                    participant_id: initiator_id.to_string(),
                    name: info.name.clone(),
                    mic_enabled: info.mic_enabled,
                    cam_enabled: info.cam_enabled,
                });
                self.state.upsert(info);
            }
        }

        let link = Arc::new(PeerLink::new(initiator_id, LinkRole::Responder, &self.config).await?);
        if let Err(e) = self.negotiate_as_responder(initiator_id, &link, doc).await {
            if let Err(close_err) = link.close().await {
                warn!(peer = %initiator_id, error = %close_err, "closing link failed");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn negotiate_as_responder(
        &self,
        initiator_id: &str,
        link: &Arc<PeerLink>,
        doc: NegotiationDoc,
    ) -> Result<()> {
        let call = self.state.call_id().to_string();
        let local = self.state.local_id().to_string();

        self.install_callbacks(link);
        self.sync.attach(link.pc()).await?;

        let answer = link.accept_offer(doc.description.to_description()?).await?;
        let answer_path = paths::answer_doc(&call, &local, initiator_id);
        self.store
            .set_doc(
                &answer_path,
                serde_json::to_value(NegotiationDoc::new(&answer))?,
                true,
            )
            .await
            .map_err(|e| Error::TransportWrite(e.to_string()))?;
        info!(peer = %initiator_id, "answer published");

        let cand_path = paths::offer_candidates(&call, &local, initiator_id);
        let (unsub, rx) = self.store.subscribe_collection(&cand_path).await?;
        let task = self.spawn_candidate_forwarder(initiator_id, rx);

        self.links
            .write()
            .await
            .insert(initiator_id.to_string(), link.clone());
        self.register_pair(initiator_id, vec![unsub], vec![task]);

        self.emit(CallEvent::ConnectionStateChanged {
            participant_id: initiator_id.to_string(),
            state: LinkState::Connected,
        });
        Ok(())
    }

    fn spawn_candidate_forwarder(&self, peer_id: &str, mut rx: CollectionRx) -> JoinHandle<()> {
        let tx = self.engine_tx.clone();
        let pid = peer_id.to_string();
        tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                for change in batch {
                    // Candidate docs are append-only; anything but an
                    // addition is replay noise.
                    if change.kind != ChangeKind::Added {
                        continue;
                    }
                    match CandidateDoc::from_value(&change.data) {
                        Ok(doc) => {
                            if tx
                                .send(EngineEvent::CandidateReceived {
                                    peer_id: pid.clone(),
                                    doc,
                                })
                                .is_err()
                            {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(peer = %pid, error = %e, "unusable candidate document");
                        }
                    }
                }
            }
        })
    }

    fn install_callbacks(&self, link: &Arc<PeerLink>) {
        let peer_id = link.peer_id().to_string();
        let role = link.role();

        let tx = self.engine_tx.clone();
        let pid = peer_id.clone();
        link.on_local_candidate(move |candidate| match CandidateDoc::from_candidate(&candidate) {
            Ok(doc) => {
                let _ = tx.send(EngineEvent::LocalCandidate {
                    peer_id: pid.clone(),
                    role,
                    doc,
                });
            }
            Err(e) => warn!(peer = %pid, error = %e, "local candidate dropped"),
        });

        let tx = self.engine_tx.clone();
        let pid = peer_id.clone();
        link.on_remote_track(move |track| {
            let _ = tx.send(EngineEvent::RemoteTrack {
                peer_id: pid.clone(),
                track,
            });
        });

        let tx = self.engine_tx.clone();
        link.on_transport_state(move |state| {
            let _ = tx.send(EngineEvent::TransportState {
                peer_id: peer_id.clone(),
                state,
            });
        });
    }

    fn register_pair(&self, peer_id: &str, unsubs: Vec<Unsubscribe>, tasks: Vec<JoinHandle<()>>) {
        self.pair_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(peer_id.to_string())
            .or_default()
            .extend(unsubs);
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(tasks);
    }

    /// Tear down a pair after a negotiation error and surface the failure
    ///
    /// Other pairs are unaffected. A later roster or offer change for the
    /// same peer starts a fresh attempt.
    async fn fail_pair(&self, peer_id: &str, error: &Error) {
        if let Some(unsubs) = self
            .pair_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(peer_id)
        {
            for unsub in &unsubs {
                unsub.cancel();
            }
        }
        if let Some(link) = self.links.write().await.remove(peer_id) {
            if let Err(e) = link.close().await {
                warn!(peer = %peer_id, error = %e, "closing link failed");
            }
        }
        self.emit(CallEvent::NegotiationFailed {
            participant_id: peer_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Delete the pair's offer/answer docs and candidate logs, both
    /// directions, so a rejoin under the same ID starts from a blank slate
    async fn purge_pair_docs(&self, peer_id: &str) {
        let call = self.state.call_id().to_string();
        let local = self.state.local_id().to_string();
        for log in [
            paths::offer_candidates(&call, peer_id, &local),
            paths::offer_candidates(&call, &local, peer_id),
            paths::answer_candidates(&call, peer_id, &local),
            paths::answer_candidates(&call, &local, peer_id),
        ] {
            self.purge_collection(&log).await;
        }
        for doc in [
            paths::offer_doc(&call, peer_id, &local),
            paths::offer_doc(&call, &local, peer_id),
            paths::answer_doc(&call, peer_id, &local),
            paths::answer_doc(&call, &local, peer_id),
        ] {
            if let Err(e) = self.store.delete_doc(&doc).await {
                warn!(path = %doc, error = %e, "deleting pair document failed");
            }
        }
    }

    async fn purge_collection(&self, collection: &str) {
        match self.store.list_docs(collection).await {
            Ok(docs) => {
                for (doc_id, _) in docs {
                    let path = format!("{collection}/{doc_id}");
                    if let Err(e) = self.store.delete_doc(&path).await {
                        warn!(path = %path, error = %e, "deleting candidate document failed");
                    }
                }
            }
            Err(e) => warn!(path = %collection, error = %e, "listing candidate log failed"),
        }
    }

    async fn remove_peer(&self, peer_id: &str) {
        // Cancel the pair's subscriptions before touching the link so no
        // further events target it.
        if let Some(unsubs) = self
            .pair_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(peer_id)
        {
            for unsub in &unsubs {
                unsub.cancel();
            }
        }
        if let Some(link) = self.links.write().await.remove(peer_id) {
            if let Err(e) = link.close().await {
                warn!(peer = %peer_id, error = %e, "closing link failed");
            }
        }
        self.purge_pair_docs(peer_id).await;
        let name = self.state.remove(peer_id).map(|p| p.name);
        info!(peer = %peer_id, "participant left");
        self.emit(CallEvent::ParticipantLeft {
            participant_id: peer_id.to_string(),
            name,
        });
    }

    /// Logical state of the link toward a peer, if one exists
    pub(crate) async fn link_state(&self, peer_id: &str) -> Option<LinkState> {
        self.links.read().await.get(peer_id).map(|l| l.state())
    }

    /// Re-attach the current local tracks to every live link
    pub(crate) async fn attach_all(&self) -> Result<()> {
        let links: Vec<Arc<PeerLink>> = self.links.read().await.values().cloned().collect();
        for link in links {
            self.sync.attach(link.pc()).await?;
        }
        Ok(())
    }

    /// Cancel every subscription, stop forwarders, and close all links
    pub(crate) async fn teardown(&self) {
        let watchers: Vec<Unsubscribe> = self
            .pair_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .flat_map(|(_, v)| v)
            .collect();
        for unsub in &watchers {
            unsub.cancel();
        }
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        let links: Vec<(String, Arc<PeerLink>)> =
            self.links.write().await.drain().collect();
        for (peer_id, link) in links {
            if let Err(e) = link.close().await {
                warn!(peer = %peer_id, error = %e, "closing link failed");
            }
            self.purge_pair_docs(&peer_id).await;
        }
        self.state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::MemoryStore;

    fn engine_fixture(
        store: &MemoryStore,
        local_id: &str,
        joined_at: i64,
    ) -> (Arc<Engine>, mpsc::UnboundedReceiver<CallEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SessionState::new("c1", local_id, joined_at));
        let (engine, _engine_rx) = Engine::new(
            CallConfig::new("tester"),
            Arc::new(store.clone()),
            Arc::new(TrackSynchronizer::new()),
            state,
            events_tx,
        );
        (engine, events_rx)
    }

    #[tokio::test]
    async fn test_initiate_link_publishes_offer_under_peer_doc() {
        let store = MemoryStore::new();
        let (engine, _events) = engine_fixture(&store, "me", 100);

        engine.initiate_link("peer").await.unwrap();

        let offer = store
            .get_doc("calls/c1/participants/peer/offers/me")
            .await
            .unwrap()
            .expect("offer doc written");
        assert_eq!(offer["description"]["type"], "offer");
        assert_eq!(
            engine.link_state("peer").await,
            Some(LinkState::Negotiating)
        );
    }

    #[tokio::test]
    async fn test_initiate_link_is_idempotent() {
        let store = MemoryStore::new();
        let (engine, _events) = engine_fixture(&store, "me", 100);
        engine.initiate_link("peer").await.unwrap();
        engine.initiate_link("peer").await.unwrap();
        assert_eq!(engine.links.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_respond_to_offer_publishes_answer_and_connects() {
        let store = MemoryStore::new();

        // a real initiator produces the offer we answer
        let cfg = CallConfig::new("other");
        let remote = PeerLink::new("me", LinkRole::Initiator, &cfg).await.unwrap();
        remote
            .pc()
            .add_transceiver_from_kind(
                webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Audio,
                None,
            )
            .await
            .unwrap();
        let offer = remote.create_offer().await.unwrap();

        store
            .set_doc(
                "calls/c1/participants/peer",
                serde_json::json!({
                    "name": "Peer",
                    "joinedAt": 50,
                    "isMicEnabled": true,
                    "isCamEnabled": false,
                }),
                false,
            )
            .await
            .unwrap();

        let (engine, mut events) = engine_fixture(&store, "me", 100);
        engine
            .respond_to_offer("peer", NegotiationDoc::new(&offer))
            .await
            .unwrap();

        let answer = store
            .get_doc("calls/c1/participants/me/answers/peer")
            .await
            .unwrap()
            .expect("answer doc written");
        assert_eq!(answer["description"]["type"], "answer");
        assert_eq!(engine.link_state("peer").await, Some(LinkState::Connected));

        // roster point-read surfaced the initiator before the connection
        match events.try_recv().unwrap() {
            CallEvent::ParticipantJoined {
                participant_id,
                name,
                cam_enabled,
                ..
            } => {
                assert_eq!(participant_id, "peer");
                assert_eq!(name, "Peer");
                assert!(!cam_enabled);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_offer_surfaces_negotiation_failure() {
        let store = MemoryStore::new();
        let (engine, mut events) = engine_fixture(&store, "bob", 100);

        engine
            .handle_offer_change(DocChange {
                kind: ChangeKind::Added,
                doc_id: "mallory".to_string(),
                data: serde_json::json!({
                    "description": { "sdp": "not an sdp", "type": "offer" },
                }),
            })
            .await;

        match events.try_recv().unwrap() {
            CallEvent::NegotiationFailed { participant_id, .. } => {
                assert_eq!(participant_id, "mallory");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(engine.link_state("mallory").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_peer_purges_pair_docs() {
        let store = MemoryStore::new();
        let (engine, _events) = engine_fixture(&store, "me", 100);
        engine.initiate_link("peer").await.unwrap();

        let cand_log = paths::answer_candidates("c1", "peer", "me");
        store
            .create_doc(
                &cand_log,
                serde_json::json!({ "candidate": "candidate:1 1 udp 1 10.0.0.1 1 typ host" }),
            )
            .await
            .unwrap();

        engine.remove_peer("peer").await;

        let offer = store
            .get_doc("calls/c1/participants/peer/offers/me")
            .await
            .unwrap();
        assert!(offer.is_none());
        assert!(store.list_docs(&cand_log).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_candidate_forwarder_ignores_modified_docs() {
        let store = MemoryStore::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SessionState::new("c1", "me", 100));
        let (engine, mut engine_rx) = Engine::new(
            CallConfig::new("tester"),
            Arc::new(store.clone()),
            Arc::new(TrackSynchronizer::new()),
            state,
            events_tx,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let _task = engine.spawn_candidate_forwarder("peer", rx);

        let cand = serde_json::json!({
            "candidate": "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
        });
        tx.send(vec![
            DocChange {
                kind: ChangeKind::Modified,
                doc_id: "00000001".to_string(),
                data: cand.clone(),
            },
            DocChange {
                kind: ChangeKind::Added,
                doc_id: "00000002".to_string(),
                data: cand,
            },
        ])
        .unwrap();
        drop(tx);
        // The engine holds the event sender; release it so the channel
        // closes once the forwarder exits.
        drop(engine);

        let mut received = 0;
        while let Some(event) = engine_rx.recv().await {
            match event {
                EngineEvent::CandidateReceived { peer_id, .. } => {
                    assert_eq!(peer_id, "peer");
                    received += 1;
                }
                _ => panic!("unexpected engine event"),
            }
        }
        assert_eq!(received, 1);
    }

    #[tokio::test]
    async fn test_teardown_closes_links_and_clears_state() {
        let store = MemoryStore::new();
        let (engine, _events) = engine_fixture(&store, "me", 100);
        engine.initiate_link("peer").await.unwrap();
        engine.state.upsert(ParticipantInfo {
            id: "peer".to_string(),
            name: "Peer".to_string(),
            joined_at: 200,
            mic_enabled: true,
            cam_enabled: true,
            remote: crate::session::RemoteTracks::default(),
        });

        engine.teardown().await;
        assert!(engine.links.read().await.is_empty());
        assert!(engine.state.is_empty());
    }
}
