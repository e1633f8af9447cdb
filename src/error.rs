//! Error types for call orchestration

/// Result type alias using the meshcall Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Capture device access was denied by the user/platform
    #[error("Capture access denied: {0}")]
    AccessDenied(String),

    /// No capture device of the requested kind is available
    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    /// Offer/answer/description failure for a single pair
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// A signaling-store write failed (toggle or offer/answer publish)
    #[error("Transport write error: {0}")]
    TransportWrite(String),

    /// The requested call document does not exist
    #[error("Call not found: {0}")]
    CallNotFound(String),

    /// Joining the call failed, leaving no partial session state
    #[error("Join error: {0}")]
    Join(String),

    /// The call is at its participant capacity
    #[error("Call is full: {0}")]
    CallFull(String),

    /// A session is already live on this handle
    #[error("A call session is already active")]
    SessionActive,

    /// The operation needs a live session and none exists
    #[error("No active call session")]
    NotInCall,

    /// Participant not found in the session
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Signaling store error (path, subscription, or document shape)
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// A document could not be decoded into its wire type
    #[error("Invalid document: {0}")]
    InvalidDoc(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error came from capture acquisition
    pub fn is_capture_error(&self) -> bool {
        matches!(self, Error::AccessDenied(_) | Error::DeviceNotFound(_))
    }

    /// Check if this error is scoped to one pairwise connection
    pub fn is_pair_error(&self) -> bool {
        matches!(
            self,
            Error::Negotiation(_) | Error::ParticipantNotFound(_) | Error::TransportWrite(_)
        )
    }

    /// Check if this error aborts a join attempt
    pub fn is_join_error(&self) -> bool {
        matches!(
            self,
            Error::CallNotFound(_) | Error::Join(_) | Error::CallFull(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidDoc(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");

        let err = Error::SessionActive;
        assert_eq!(err.to_string(), "A call session is already active");
    }

    #[test]
    fn test_error_is_capture_error() {
        assert!(Error::AccessDenied("mic".to_string()).is_capture_error());
        assert!(Error::DeviceNotFound("cam".to_string()).is_capture_error());
        assert!(!Error::Negotiation("sdp".to_string()).is_capture_error());
    }

    #[test]
    fn test_error_is_pair_error() {
        assert!(Error::Negotiation("offer".to_string()).is_pair_error());
        assert!(Error::TransportWrite("answer".to_string()).is_pair_error());
        assert!(!Error::SessionActive.is_pair_error());
    }

    #[test]
    fn test_error_is_join_error() {
        assert!(Error::CallNotFound("c1".to_string()).is_join_error());
        assert!(Error::Join("write failed".to_string()).is_join_error());
        assert!(Error::CallFull("8 of 8 seats taken".to_string()).is_join_error());
        assert!(!Error::InvalidConfig("x".to_string()).is_join_error());
    }

    #[test]
    fn test_serde_error_conversion() {
        let bad = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = Error::from(bad);
        assert!(matches!(err, Error::InvalidDoc(_)));
    }
}
