//! Session-local view of the call

pub mod state;

pub use state::{ParticipantInfo, RemoteTracks, SessionState};
