//! Mesh call orchestration over a replicated document store
//!
//! This crate negotiates multi-party WebRTC calls without a dedicated
//! signaling server: participants exchange offers, answers, and ICE
//! candidates through documents in a shared hierarchical store.
//!
//! # Features
//!
//! - **Mesh topology**: one direct connection per participant pair
//! - **Deterministic initiator rule**: for any pair, the earlier joiner
//!   offers and the later joiner answers, so glare cannot occur
//! - **Renegotiation-free toggles**: every connection always carries one
//!   audio and one video sender; mic/cam toggles flip an enabled bit
//! - **Synthetic media fallback**: silent/blank tracks stand in when
//!   capture fails, keeping the sender shape intact
//! - **Pluggable store**: any [`SignalingStore`] backend; an in-memory
//!   implementation ships for local sessions and tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  CallManager (create/join/end, toggles, events)          │
//! │  ├─ TrackSynchronizer (local tracks, sender shape)       │
//! │  ├─ SessionState (roster mirror)                         │
//! │  └─ Engine (single loop per session)                     │
//! │      ├─ membership (initiate / respond / remove)         │
//! │      └─ PeerLink per remote participant                  │
//! │          ↕ offers, answers, candidates                   │
//! │  SignalingStore (calls/{c}/participants/{p}/...)         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use meshcall::{CallConfig, CallManager, MemoryStore};
//!
//! # async fn example() -> meshcall::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let manager = CallManager::new(CallConfig::new("Alice"), store)?;
//!
//! let call_id = manager.create_call("standup").await?;
//! manager.join_call(&call_id).await?;
//!
//! manager.toggle_mic().await?;
//! manager.end_call().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod membership;
pub mod peer;
pub mod session;
pub mod signaling;

pub use call::CallManager;
pub use config::{CallConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use events::CallEvent;
pub use media::{CaptureSource, LocalTrack, SyntheticCapture, TrackKind, TrackSynchronizer};
pub use peer::{LinkRole, LinkState, PeerLink};
pub use session::{ParticipantInfo, RemoteTracks, SessionState};
pub use signaling::{
    CallDoc, CandidateDoc, ChangeKind, DocChange, MemoryStore, NegotiationDoc, ParticipantDoc,
    SignalingStore, Unsubscribe,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
