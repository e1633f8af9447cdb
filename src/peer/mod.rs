//! Pairwise peer connections and the engine that drives them

pub mod link;
pub(crate) mod orchestrator;

pub use link::{LinkRole, LinkState, PeerLink};
