//! Events delivered to the embedding application

use std::sync::Arc;

use webrtc::track::track_remote::TrackRemote;

use crate::media::TrackKind;
use crate::peer::LinkState;

/// Something observable happened in the active call
#[derive(Clone)]
pub enum CallEvent {
    /// A participant's roster document appeared
    ParticipantJoined {
        /// Participant ID
        participant_id: String,
        /// Display name
        name: String,
        /// Advertised microphone state
        mic_enabled: bool,
        /// Advertised camera state
        cam_enabled: bool,
    },

    /// A participant's roster document was deleted
    ///
    /// The name is captured before removal; `None` if the participant was
    /// never fully observed.
    ParticipantLeft {
        /// Participant ID
        participant_id: String,
        /// Last known display name
        name: Option<String>,
    },

    /// A participant's advertised mic/cam flags changed
    ParticipantMediaChanged {
        /// Participant ID
        participant_id: String,
        /// New microphone state
        mic_enabled: bool,
        /// New camera state
        cam_enabled: bool,
    },

    /// A remote media track started arriving from a participant
    TrackReceived {
        /// Participant the track belongs to
        participant_id: String,
        /// Audio or video
        kind: TrackKind,
        /// The incoming track
        track: Arc<TrackRemote>,
    },

    /// Negotiating with a participant failed; the pair has been torn down
    ///
    /// Other pairs are unaffected. A later roster or offer change for the
    /// same participant starts a fresh attempt.
    NegotiationFailed {
        /// The remote participant
        participant_id: String,
        /// What went wrong
        error: String,
    },

    /// A pairwise connection changed state
    ConnectionStateChanged {
        /// The remote participant
        participant_id: String,
        /// New logical state
        state: LinkState,
    },

    /// The local session ended
    CallEnded,
}

impl std::fmt::Debug for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallEvent::ParticipantJoined {
                participant_id,
                name,
                mic_enabled,
                cam_enabled,
            } => f
                .debug_struct("ParticipantJoined")
                .field("participant_id", participant_id)
                .field("name", name)
                .field("mic_enabled", mic_enabled)
                .field("cam_enabled", cam_enabled)
                .finish(),
            CallEvent::ParticipantLeft {
                participant_id,
                name,
            } => f
                .debug_struct("ParticipantLeft")
                .field("participant_id", participant_id)
                .field("name", name)
                .finish(),
            CallEvent::ParticipantMediaChanged {
                participant_id,
                mic_enabled,
                cam_enabled,
            } => f
                .debug_struct("ParticipantMediaChanged")
                .field("participant_id", participant_id)
                .field("mic_enabled", mic_enabled)
                .field("cam_enabled", cam_enabled)
                .finish(),
            CallEvent::TrackReceived {
                participant_id,
                kind,
                ..
            } => f
                .debug_struct("TrackReceived")
                .field("participant_id", participant_id)
                .field("kind", kind)
                .finish(),
            CallEvent::NegotiationFailed {
                participant_id,
                error,
            } => f
                .debug_struct("NegotiationFailed")
                .field("participant_id", participant_id)
                .field("error", error)
                .finish(),
            CallEvent::ConnectionStateChanged {
                participant_id,
                state,
            } => f
                .debug_struct("ConnectionStateChanged")
                .field("participant_id", participant_id)
                .field("state", state)
                .finish(),
            CallEvent::CallEnded => write!(f, "CallEnded"),
        }
    }
}
