//! Signaling over a replicated document store
//!
//! All negotiation state (rosters, offers, answers, ICE candidates) lives in
//! a hierarchical document store. The [`SignalingStore`] trait abstracts the
//! backend; [`MemoryStore`] is an in-process implementation used for local
//! sessions and tests.

pub mod docs;
pub mod memory;
pub mod paths;
pub mod store;

pub use docs::{CallDoc, CandidateDoc, NegotiationDoc, ParticipantDoc, SessionDescriptionDoc};
pub use memory::MemoryStore;
pub use store::{ChangeKind, DocChange, SignalingStore, Unsubscribe};
