//! Path builders for the call document layout
//!
//! Layout:
//!
//! ```text
//! calls/{call}
//!   participants/{participant}
//!     offers/{initiator}
//!       candidates/{auto}
//!     answers/{initiator}
//!       candidates/{auto}
//! ```
//!
//! Pair documents are anchored under the participant doc of the LATER joiner
//! (the responder) and keyed by the initiator's participant ID, so each
//! (initiator, responder) pair has exactly one home.

/// Top-level collection of calls
pub const CALLS: &str = "calls";

/// Path of a call document
pub fn call_doc(call_id: &str) -> String {
    format!("{CALLS}/{call_id}")
}

/// Path of a call's participants collection
pub fn participants(call_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants")
}

/// Path of one participant's roster document
pub fn participant_doc(call_id: &str, participant_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants/{participant_id}")
}

/// Path of the offers collection under the responder's participant doc
pub fn offers(call_id: &str, responder_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants/{responder_id}/offers")
}

/// Path of the offer document the initiator writes toward the responder
pub fn offer_doc(call_id: &str, responder_id: &str, initiator_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants/{responder_id}/offers/{initiator_id}")
}

/// Path of the initiator's ICE candidate log for a pair
pub fn offer_candidates(call_id: &str, responder_id: &str, initiator_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants/{responder_id}/offers/{initiator_id}/candidates")
}

/// Path of the answer document the responder writes back to the initiator
pub fn answer_doc(call_id: &str, responder_id: &str, initiator_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants/{responder_id}/answers/{initiator_id}")
}

/// Path of the responder's ICE candidate log for a pair
pub fn answer_candidates(call_id: &str, responder_id: &str, initiator_id: &str) -> String {
    format!("{CALLS}/{call_id}/participants/{responder_id}/answers/{initiator_id}/candidates")
}
