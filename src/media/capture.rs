//! Capture source abstraction

use async_trait::async_trait;

use super::track::LocalTrack;
use crate::Result;

/// Source of local audio and video tracks
///
/// Implementations wrap platform capture (or synthetic generation). Failures
/// surface as [`Error::AccessDenied`](crate::Error::AccessDenied) when the
/// platform refuses access and
/// [`Error::DeviceNotFound`](crate::Error::DeviceNotFound) when no device of
/// the requested kind exists.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire the local audio track
    async fn acquire_audio(&self) -> Result<LocalTrack>;

    /// Acquire the local video track
    async fn acquire_video(&self) -> Result<LocalTrack>;
}
