//! Roster and offer change classification
//!
//! Pure decision logic for the engine loop. Given a document change and what
//! the session already knows, these functions decide whether to initiate
//! toward a peer, respond to an offer, update media flags, or tear down.
//!
//! The initiator rule: for any pair, the EARLIER joiner initiates toward the
//! later joiner. Both sides evaluate the same predicate against replicated
//! timestamps, so exactly one side offers and glare cannot occur. Equal
//! timestamps fall back to ID order, lower ID initiating.

use tracing::debug;

use crate::signaling::{ChangeKind, DocChange, NegotiationDoc, ParticipantDoc};
use crate::Result;

/// What a roster change asks the engine to do
#[derive(Debug)]
pub enum RosterAction {
    /// A participant is new to this session
    Observe {
        /// The peer's ID
        peer_id: String,
        /// Their roster document
        doc: ParticipantDoc,
        /// Whether this side must initiate the pair connection
        initiate: bool,
    },

    /// A known participant's roster document changed
    UpdateMedia {
        /// The peer's ID
        peer_id: String,
        /// Their updated roster document
        doc: ParticipantDoc,
    },

    /// A participant's roster document was deleted
    Remove {
        /// The peer's ID
        peer_id: String,
    },
}

/// Whether the local participant initiates toward a peer
pub fn local_initiates(
    local_id: &str,
    local_joined_at: i64,
    peer_id: &str,
    peer_joined_at: i64,
) -> bool {
    match local_joined_at.cmp(&peer_joined_at) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => local_id < peer_id,
    }
}

/// Classify one change to the participants collection
///
/// Self-changes and malformed documents yield `None`; `known` is whether the
/// session already tracks this peer.
pub fn classify_roster(
    change: &DocChange,
    local_id: &str,
    local_joined_at: i64,
    known: bool,
) -> Result<Option<RosterAction>> {
    if change.doc_id == local_id {
        return Ok(None);
    }

    match change.kind {
        ChangeKind::Removed => Ok(Some(RosterAction::Remove {
            peer_id: change.doc_id.clone(),
        })),
        ChangeKind::Added | ChangeKind::Modified => {
            let doc = ParticipantDoc::from_value(&change.data)?;
            if known {
                return Ok(Some(RosterAction::UpdateMedia {
                    peer_id: change.doc_id.clone(),
                    doc,
                }));
            }
            let initiate =
                local_initiates(local_id, local_joined_at, &change.doc_id, doc.joined_at);
            debug!(peer = %change.doc_id, initiate, "new participant observed");
            Ok(Some(RosterAction::Observe {
                peer_id: change.doc_id.clone(),
                doc,
                initiate,
            }))
        }
    }
}

/// What an offers-collection change asks the engine to do
#[derive(Debug)]
pub struct OfferAction {
    /// The initiating peer's ID (the offer doc's ID)
    pub initiator_id: String,

    /// The offer itself
    pub doc: NegotiationDoc,
}

/// Classify one change to the local participant's offers collection
///
/// Removals and offers for already-linked peers yield `None`.
pub fn classify_offer(
    change: &DocChange,
    local_id: &str,
    already_linked: bool,
) -> Result<Option<OfferAction>> {
    if change.doc_id == local_id || already_linked {
        return Ok(None);
    }
    match change.kind {
        ChangeKind::Removed => Ok(None),
        ChangeKind::Added | ChangeKind::Modified => {
            let doc = NegotiationDoc::from_value(&change.data)?;
            Ok(Some(OfferAction {
                initiator_id: change.doc_id.clone(),
                doc,
            }))
        }
    }
}
