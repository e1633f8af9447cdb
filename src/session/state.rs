//! Local mirror of the call roster
//!
//! Holds what this participant currently believes about the call. It is a
//! cache of roster documents already observed; the store remains the source
//! of truth and later snapshots overwrite earlier beliefs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use webrtc::track::track_remote::TrackRemote;

use crate::media::TrackKind;
use crate::signaling::ParticipantDoc;

/// Media handles received from a remote participant
///
/// Each slot fills when the corresponding track starts arriving and keeps
/// the latest handle thereafter.
#[derive(Clone, Default)]
pub struct RemoteTracks {
    /// Incoming audio track, if one has arrived
    pub audio: Option<Arc<TrackRemote>>,

    /// Incoming video track, if one has arrived
    pub video: Option<Arc<TrackRemote>>,
}

impl RemoteTracks {
    fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

impl fmt::Debug for RemoteTracks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTracks")
            .field("audio", &self.audio.is_some())
            .field("video", &self.video.is_some())
            .finish()
    }
}

/// Snapshot of one remote participant
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantInfo {
    /// Participant ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Join time, milliseconds since the Unix epoch
    pub joined_at: i64,

    /// Advertised microphone state
    pub mic_enabled: bool,

    /// Advertised camera state
    pub cam_enabled: bool,

    /// Received media handles; not part of the roster document
    #[serde(skip)]
    pub remote: RemoteTracks,
}

impl ParticipantInfo {
    /// Build from a roster document
    pub fn from_doc(id: &str, doc: &ParticipantDoc) -> Self {
        Self {
            id: id.to_string(),
            name: doc.name.clone(),
            joined_at: doc.joined_at,
            mic_enabled: doc.is_mic_enabled,
            cam_enabled: doc.is_cam_enabled,
            remote: RemoteTracks::default(),
        }
    }
}

/// Mutable state of the local participant's session
pub struct SessionState {
    call_id: String,
    local_id: String,
    joined_at: i64,
    participants: RwLock<HashMap<String, ParticipantInfo>>,
}

impl SessionState {
    /// Create state for a freshly joined session
    pub fn new(call_id: &str, local_id: &str, joined_at: i64) -> Self {
        Self {
            call_id: call_id.to_string(),
            local_id: local_id.to_string(),
            joined_at,
            participants: RwLock::new(HashMap::new()),
        }
    }

    /// ID of the joined call
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Local participant ID
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Local join timestamp
    pub fn joined_at(&self) -> i64 {
        self.joined_at
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ParticipantInfo>> {
        self.participants.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ParticipantInfo>> {
        self.participants.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or refresh a participant; returns true if newly seen
    ///
    /// A refresh from a roster document carries no media handles, so
    /// handles already recorded for the participant are kept.
    pub fn upsert(&self, mut info: ParticipantInfo) -> bool {
        let mut map = self.lock_write();
        if info.remote.is_empty() {
            if let Some(prev) = map.get(&info.id) {
                info.remote = prev.remote.clone();
            }
        }
        map.insert(info.id.clone(), info).is_none()
    }

    /// Update a known participant's media flags; returns false if unknown
    pub fn update_media(&self, id: &str, mic_enabled: bool, cam_enabled: bool) -> bool {
        match self.lock_write().get_mut(id) {
            Some(p) => {
                p.mic_enabled = mic_enabled;
                p.cam_enabled = cam_enabled;
                true
            }
            None => false,
        }
    }

    /// Record a received media handle; returns false if the participant is
    /// unknown
    pub fn set_remote_track(&self, id: &str, kind: TrackKind, track: Arc<TrackRemote>) -> bool {
        match self.lock_write().get_mut(id) {
            Some(p) => {
                match kind {
                    TrackKind::Audio => p.remote.audio = Some(track),
                    TrackKind::Video => p.remote.video = Some(track),
                }
                true
            }
            None => false,
        }
    }

    /// Remove a participant, returning the last known snapshot
    pub fn remove(&self, id: &str) -> Option<ParticipantInfo> {
        self.lock_write().remove(id)
    }

    /// Whether a participant is known
    pub fn contains(&self, id: &str) -> bool {
        self.lock_read().contains_key(id)
    }

    /// Look up one participant
    pub fn get(&self, id: &str) -> Option<ParticipantInfo> {
        self.lock_read().get(id).cloned()
    }

    /// Number of known remote participants
    pub fn len(&self) -> usize {
        self.lock_read().len()
    }

    /// Whether no remote participants are known
    pub fn is_empty(&self) -> bool {
        self.lock_read().is_empty()
    }

    /// All known participants, ordered by join time then ID
    pub fn snapshot(&self) -> Vec<ParticipantInfo> {
        let mut out: Vec<ParticipantInfo> = self.lock_read().values().cloned().collect();
        out.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Drop all participant records
    pub fn clear(&self) {
        self.lock_write().clear();
    }
}
