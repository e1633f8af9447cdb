//! Call lifecycle facade
//!
//! `CallManager` is the application-facing handle: create/join/end calls,
//! toggle local media, and observe events. Each handle hosts at most one live
//! session; joining while a session is active fails with
//! [`Error::SessionActive`]. Handles are plain values, so embedders inject
//! them wherever needed instead of sharing a global.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::CallConfig;
use crate::events::CallEvent;
use crate::media::{CaptureSource, LocalTrack, SyntheticCapture, TrackKind, TrackSynchronizer};
use crate::peer::orchestrator::Engine;
use crate::peer::LinkState;
use crate::session::{ParticipantInfo, RemoteTracks, SessionState};
use crate::signaling::{paths, CallDoc, ParticipantDoc, SignalingStore, Unsubscribe};
use crate::{Error, Result};

struct ActiveSession {
    state: Arc<SessionState>,
    engine: Arc<Engine>,
    engine_task: JoinHandle<()>,
    roster_unsub: Unsubscribe,
    offers_unsub: Unsubscribe,
    shutdown_tx: mpsc::Sender<()>,
}

/// Handle for creating, joining, and running calls
pub struct CallManager {
    config: CallConfig,
    store: Arc<dyn SignalingStore>,
    capture: Arc<dyn CaptureSource>,
    sync: Arc<TrackSynchronizer>,
    events_tx: mpsc::UnboundedSender<CallEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<CallEvent>>>,
    active: Mutex<Option<ActiveSession>>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl CallManager {
    /// Create a manager with synthetic capture
    pub fn new(config: CallConfig, store: Arc<dyn SignalingStore>) -> Result<Self> {
        Self::with_capture(config, store, Arc::new(SyntheticCapture::new()))
    }

    /// Create a manager with an explicit capture source
    pub fn with_capture(
        config: CallConfig,
        store: Arc<dyn SignalingStore>,
        capture: Arc<dyn CaptureSource>,
    ) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            store,
            capture,
            sync: Arc::new(TrackSynchronizer::new()),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            active: Mutex::new(None),
        })
    }

    /// Take the event stream; yields `None` after the first call
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<CallEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Create a new call document, returning its ID
    #[instrument(skip(self))]
    pub async fn create_call(&self, name: &str) -> Result<String> {
        let doc = CallDoc {
            name: name.to_string(),
            created_at: now_millis(),
        };
        let id = self
            .store
            .create_doc(paths::CALLS, serde_json::to_value(&doc)?)
            .await?;
        info!(call = %id, "call created");
        Ok(id)
    }

    /// Whether a call document exists
    pub async fn call_exists(&self, call_id: &str) -> Result<bool> {
        Ok(self.store.get_doc(&paths::call_doc(call_id)).await?.is_some())
    }

    /// List a call's current roster without joining
    pub async fn call_participants(
        &self,
        call_id: &str,
    ) -> Result<Vec<(String, ParticipantDoc)>> {
        let docs = self.store.list_docs(&paths::participants(call_id)).await?;
        let mut out = Vec::with_capacity(docs.len());
        for (id, value) in docs {
            match ParticipantDoc::from_value(&value) {
                Ok(doc) => out.push((id, doc)),
                Err(e) => warn!(doc = %id, error = %e, "skipping unusable roster document"),
            }
        }
        Ok(out)
    }

    /// Join a call: acquire media, publish the roster doc, and start the
    /// engine
    ///
    /// Fails with [`Error::SessionActive`] if this handle already has a live
    /// session, [`Error::CallNotFound`] if the call doesn't exist, and
    /// [`Error::CallFull`] if the roster already holds `max_participants`
    /// entries. On any failure no partial session state is left behind.
    #[instrument(skip(self))]
    pub async fn join_call(&self, call_id: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(Error::SessionActive);
        }
        if !self.call_exists(call_id).await? {
            return Err(Error::CallNotFound(call_id.to_string()));
        }
        let seats = self
            .store
            .list_docs(&paths::participants(call_id))
            .await?
            .len() as u32;
        if seats >= self.config.max_participants {
            return Err(Error::CallFull(format!(
                "{seats} of {} seats taken",
                self.config.max_participants
            )));
        }

        let audio = self.acquire_with_fallback(TrackKind::Audio).await?;
        let video = match self.acquire_with_fallback(TrackKind::Video).await {
            Ok(video) => video,
            Err(e) => {
                audio.stop();
                return Err(e);
            }
        };
        audio.set_enabled(self.config.mic_enabled);
        video.set_enabled(self.config.cam_enabled);
        self.sync.set_audio(audio).await;
        self.sync.set_video(video).await;

        let local_id = self
            .config
            .participant_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let joined_at = now_millis();

        match self.start_session(call_id, &local_id, joined_at).await {
            Ok(session) => {
                info!(call = %call_id, participant = %local_id, "joined call");
                *active = Some(session);
                Ok(())
            }
            Err(e) => {
                // roll back so the handle stays joinable
                self.sync.stop_all().await;
                let _ = self
                    .store
                    .delete_doc(&paths::participant_doc(call_id, &local_id))
                    .await;
                Err(Error::Join(e.to_string()))
            }
        }
    }

    async fn start_session(
        &self,
        call_id: &str,
        local_id: &str,
        joined_at: i64,
    ) -> Result<ActiveSession> {
        let doc = ParticipantDoc {
            name: self.config.display_name.clone(),
            joined_at,
            is_mic_enabled: self.config.mic_enabled,
            is_cam_enabled: self.config.cam_enabled,
        };
        self.store
            .set_doc(
                &paths::participant_doc(call_id, local_id),
                serde_json::to_value(&doc)?,
                false,
            )
            .await?;

        let (roster_unsub, roster_rx) = self
            .store
            .subscribe_collection(&paths::participants(call_id))
            .await?;
        let (offers_unsub, offers_rx) = self
            .store
            .subscribe_collection(&paths::offers(call_id, local_id))
            .await?;

        let state = Arc::new(SessionState::new(call_id, local_id, joined_at));
        let (engine, engine_rx) = Engine::new(
            self.config.clone(),
            self.store.clone(),
            self.sync.clone(),
            state.clone(),
            self.events_tx.clone(),
        );
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let engine_task = tokio::spawn(engine.clone().run(
            roster_rx,
            offers_rx,
            engine_rx,
            shutdown_rx,
        ));

        Ok(ActiveSession {
            state,
            engine,
            engine_task,
            roster_unsub,
            offers_unsub,
            shutdown_tx,
        })
    }

    async fn acquire_with_fallback(&self, kind: TrackKind) -> Result<LocalTrack> {
        let result = match kind {
            TrackKind::Audio => self.capture.acquire_audio().await,
            TrackKind::Video => self.capture.acquire_video().await,
        };
        match result {
            Ok(track) => Ok(track),
            Err(e) if e.is_capture_error() && self.config.synthetic_fallback => {
                warn!(?kind, error = %e, "capture failed, using synthetic track");
                let synthetic = SyntheticCapture::new();
                match kind {
                    TrackKind::Audio => synthetic.acquire_audio().await,
                    TrackKind::Video => synthetic.acquire_video().await,
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Leave the current call; a no-op when no session is live
    #[instrument(skip(self))]
    pub async fn end_call(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        let Some(session) = active.take() else {
            debug!("end_call with no active session");
            return Ok(());
        };

        // Stop media first so no track outlives the session.
        self.sync.stop_all().await;

        // Cancel subscriptions synchronously, then stop the loop they fed.
        session.roster_unsub.cancel();
        session.offers_unsub.cancel();
        let _ = session.shutdown_tx.send(()).await;
        session.engine_task.abort();

        // Close every pair best-effort and clear the participant map.
        session.engine.teardown().await;

        let call_id = session.state.call_id().to_string();
        let local_id = session.state.local_id().to_string();
        if let Err(e) = self
            .store
            .delete_doc(&paths::participant_doc(&call_id, &local_id))
            .await
        {
            warn!(error = %e, "deleting own roster document failed");
        }

        info!(call = %call_id, "call ended");
        let _ = self.events_tx.send(CallEvent::CallEnded);
        Ok(())
    }

    async fn toggle_track(&self, kind: TrackKind) -> Result<bool> {
        let active = self.active.lock().await;
        let session = active.as_ref().ok_or(Error::NotInCall)?;
        let track = self.sync.track(kind).await.ok_or(Error::NotInCall)?;

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);

        let field = match kind {
            TrackKind::Audio => "isMicEnabled",
            TrackKind::Video => "isCamEnabled",
        };
        let path =
            paths::participant_doc(session.state.call_id(), session.state.local_id());
        let mut fields = serde_json::Map::new();
        fields.insert(field.to_string(), serde_json::Value::Bool(enabled));
        // The local flip stands even if the advertisement fails; the caller
        // sees the error and can retry the write.
        self.store
            .update_doc(&path, serde_json::Value::Object(fields))
            .await
            .map_err(|e| Error::TransportWrite(e.to_string()))?;
        debug!(?kind, enabled, "local media toggled");
        Ok(enabled)
    }

    /// Flip the microphone; returns the new state
    pub async fn toggle_mic(&self) -> Result<bool> {
        self.toggle_track(TrackKind::Audio).await
    }

    /// Flip the camera; returns the new state
    pub async fn toggle_cam(&self) -> Result<bool> {
        self.toggle_track(TrackKind::Video).await
    }

    /// Whether the local microphone is live
    pub async fn is_mic_enabled(&self) -> bool {
        self.sync
            .audio()
            .await
            .map(|t| t.is_enabled())
            .unwrap_or(false)
    }

    /// Whether the local camera is live
    pub async fn is_cam_enabled(&self) -> bool {
        self.sync
            .video()
            .await
            .map(|t| t.is_enabled())
            .unwrap_or(false)
    }

    /// Swap in a fresh audio capture, keeping the current enabled state
    pub async fn acquire_audio(&self) -> Result<()> {
        self.reacquire(TrackKind::Audio).await
    }

    /// Swap in a fresh video capture, keeping the current enabled state
    pub async fn acquire_video(&self) -> Result<()> {
        self.reacquire(TrackKind::Video).await
    }

    async fn reacquire(&self, kind: TrackKind) -> Result<()> {
        let active = self.active.lock().await;
        let session = active.as_ref().ok_or(Error::NotInCall)?;

        let fresh = match kind {
            TrackKind::Audio => self.capture.acquire_audio().await?,
            TrackKind::Video => self.capture.acquire_video().await?,
        };
        if let Some(old) = self.sync.track(kind).await {
            fresh.set_enabled(old.is_enabled());
            old.stop();
        }
        match kind {
            TrackKind::Audio => self.sync.set_audio(fresh).await,
            TrackKind::Video => self.sync.set_video(fresh).await,
        }
        // existing senders pick up the new track without renegotiation
        session.engine.attach_all().await
    }

    /// ID of the joined call, if any
    pub async fn current_call_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| s.state.call_id().to_string())
    }

    /// Local participant ID of the live session, if any
    pub async fn local_participant_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| s.state.local_id().to_string())
    }

    /// Known remote participants of the live session
    pub async fn participants_snapshot(&self) -> Vec<ParticipantInfo> {
        match self.active.lock().await.as_ref() {
            Some(s) => s.state.snapshot(),
            None => Vec::new(),
        }
    }

    /// Media handles received from a peer, if the participant is known
    pub async fn remote_tracks(&self, peer_id: &str) -> Option<RemoteTracks> {
        match self.active.lock().await.as_ref() {
            Some(s) => s.state.get(peer_id).map(|p| p.remote),
            None => None,
        }
    }

    /// Logical connection state toward a peer, if a link exists
    pub async fn connection_state(&self, peer_id: &str) -> Option<LinkState> {
        match self.active.lock().await.as_ref() {
            Some(s) => s.engine.link_state(peer_id).await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::MemoryStore;

    fn manager(name: &str, store: &MemoryStore) -> CallManager {
        CallManager::new(CallConfig::new(name), Arc::new(store.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_create_call_then_exists() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        assert!(mgr.call_exists(&id).await.unwrap());
        assert!(!mgr.call_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_join_missing_call_fails() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let err = mgr.join_call("missing").await.unwrap_err();
        assert!(matches!(err, Error::CallNotFound(_)));
        assert!(mgr.current_call_id().await.is_none());
    }

    #[tokio::test]
    async fn test_double_join_is_rejected() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();
        let err = mgr.join_call(&id).await.unwrap_err();
        assert!(matches!(err, Error::SessionActive));
    }

    #[tokio::test]
    async fn test_join_publishes_roster_doc() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();

        let local_id = mgr.local_participant_id().await.unwrap();
        let doc = store
            .get_doc(&paths::participant_doc(&id, &local_id))
            .await
            .unwrap()
            .expect("roster doc written");
        assert_eq!(doc["name"], "Alice");
        assert_eq!(doc["isMicEnabled"], true);
    }

    #[tokio::test]
    async fn test_end_call_is_idempotent_and_deletes_roster_doc() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();
        let local_id = mgr.local_participant_id().await.unwrap();

        mgr.end_call().await.unwrap();
        assert!(store
            .get_doc(&paths::participant_doc(&id, &local_id))
            .await
            .unwrap()
            .is_none());
        assert!(mgr.current_call_id().await.is_none());

        mgr.end_call().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejoin_after_end_call() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();
        mgr.end_call().await.unwrap();
        mgr.join_call(&id).await.unwrap();
        assert_eq!(mgr.current_call_id().await.as_deref(), Some(&id[..]));
    }

    #[tokio::test]
    async fn test_toggle_outside_call_fails() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        assert!(matches!(
            mgr.toggle_mic().await.unwrap_err(),
            Error::NotInCall
        ));
    }

    #[tokio::test]
    async fn test_toggle_flips_flag_and_advertises() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();
        let local_id = mgr.local_participant_id().await.unwrap();

        assert!(mgr.is_mic_enabled().await);
        assert!(!mgr.toggle_mic().await.unwrap());
        assert!(!mgr.is_mic_enabled().await);

        let doc = store
            .get_doc(&paths::participant_doc(&id, &local_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["isMicEnabled"], false);
        // the untouched flag survives the partial update
        assert_eq!(doc["isCamEnabled"], true);
    }

    struct DeniedCapture;

    #[async_trait::async_trait]
    impl CaptureSource for DeniedCapture {
        async fn acquire_audio(&self) -> Result<LocalTrack> {
            Err(Error::AccessDenied("microphone blocked".to_string()))
        }

        async fn acquire_video(&self) -> Result<LocalTrack> {
            Err(Error::AccessDenied("camera blocked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_join_full_call_is_rejected() {
        let store = MemoryStore::new();
        let alice = CallManager::new(
            CallConfig::new("Alice")
                .with_participant_id("alice")
                .with_max_participants(2),
            Arc::new(store.clone()),
        )
        .unwrap();
        let bob = CallManager::new(
            CallConfig::new("Bob")
                .with_participant_id("bob")
                .with_max_participants(2),
            Arc::new(store.clone()),
        )
        .unwrap();
        let carol = CallManager::new(
            CallConfig::new("Carol")
                .with_participant_id("carol")
                .with_max_participants(2),
            Arc::new(store.clone()),
        )
        .unwrap();

        let id = alice.create_call("standup").await.unwrap();
        alice.join_call(&id).await.unwrap();
        bob.join_call(&id).await.unwrap();

        let err = carol.join_call(&id).await.unwrap_err();
        assert!(matches!(err, Error::CallFull(_)));
        assert!(carol.current_call_id().await.is_none());
        // no roster doc was left behind by the rejected join
        assert_eq!(store.list_docs(&paths::participants(&id)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_toggle_write_failure_keeps_local_flip() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();
        let local_id = mgr.local_participant_id().await.unwrap();

        // pull the roster doc out from under the session so the
        // advertisement write has nothing to update
        store
            .delete_doc(&paths::participant_doc(&id, &local_id))
            .await
            .unwrap();

        assert!(mgr.is_mic_enabled().await);
        let err = mgr.toggle_mic().await.unwrap_err();
        assert!(matches!(err, Error::TransportWrite(_)));
        assert!(!mgr.is_mic_enabled().await);
    }

    #[tokio::test]
    async fn test_denied_capture_without_fallback_fails_join() {
        let store = MemoryStore::new();
        let mut config = CallConfig::new("Alice");
        config.synthetic_fallback = false;
        let mgr = CallManager::with_capture(
            config,
            Arc::new(store.clone()),
            Arc::new(DeniedCapture),
        )
        .unwrap();

        let id = mgr.create_call("standup").await.unwrap();
        let err = mgr.join_call(&id).await.unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
        assert!(mgr.current_call_id().await.is_none());
    }

    #[tokio::test]
    async fn test_denied_capture_with_fallback_joins_synthetic() {
        let store = MemoryStore::new();
        let mgr = CallManager::with_capture(
            CallConfig::new("Alice"),
            Arc::new(store.clone()),
            Arc::new(DeniedCapture),
        )
        .unwrap();

        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();
        assert!(mgr.is_mic_enabled().await);
        assert!(mgr.is_cam_enabled().await);
    }

    #[tokio::test]
    async fn test_events_receiver_is_taken_once() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        assert!(mgr.events().is_some());
        assert!(mgr.events().is_none());
    }

    #[tokio::test]
    async fn test_call_participants_lists_roster() {
        let store = MemoryStore::new();
        let mgr = manager("Alice", &store);
        let id = mgr.create_call("standup").await.unwrap();
        mgr.join_call(&id).await.unwrap();

        let roster = mgr.call_participants(&id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].1.name, "Alice");
    }
}
