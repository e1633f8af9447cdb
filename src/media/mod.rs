//! Local media tracks and the sender-shape invariant
//!
//! Every live connection carries exactly one audio sender and one video
//! sender. Mic/cam toggles flip an enabled bit on the local track; they never
//! add or remove senders, so no toggle ever triggers renegotiation.

pub mod capture;
pub mod sync;
pub mod synthetic;
pub mod track;

pub use capture::CaptureSource;
pub use sync::TrackSynchronizer;
pub use synthetic::SyntheticCapture;
pub use track::{LocalTrack, TrackKind};
