//! Configuration types for the call manager

use serde::{Deserialize, Serialize};

/// Main configuration for CallManager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Display name announced to other participants
    pub display_name: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Local participant ID (auto-generated if None)
    pub participant_id: Option<String>,

    /// Maximum participants in a mesh call (default: 8, max: 16)
    pub max_participants: u32,

    /// Fall back to synthetic tracks when capture fails (default: true)
    pub synthetic_fallback: bool,

    /// Start with the microphone enabled (default: true)
    pub mic_enabled: bool,

    /// Start with the camera enabled (default: true)
    pub cam_enabled: bool,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            display_name: "Guest".to_string(),
            stun_servers: vec![
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
            participant_id: None,
            max_participants: 8,
            synthetic_fallback: true,
            mic_enabled: true,
            cam_enabled: true,
        }
    }
}

impl CallConfig {
    /// Create a configuration with the given display name
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            ..Self::default()
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `display_name` is empty
    /// - `stun_servers` is empty
    /// - `max_participants` is not in range 2-16
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.display_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "display_name must not be empty".to_string(),
            ));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.max_participants < 2 || self.max_participants > 16 {
            return Err(Error::InvalidConfig(format!(
                "max_participants must be in range 2-16, got {}",
                self.max_participants
            )));
        }

        Ok(())
    }

    /// Add TURN servers to this configuration
    ///
    /// Useful for chaining with `new()`.
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the local participant ID for this configuration
    ///
    /// Useful for chaining with `new()`.
    pub fn with_participant_id(mut self, participant_id: &str) -> Self {
        self.participant_id = Some(participant_id.to_string());
        self
    }

    /// Set the maximum number of participants
    ///
    /// Useful for chaining with `new()`.
    pub fn with_max_participants(mut self, max_participants: u32) -> Self {
        self.max_participants = max_participants;
        self
    }

    /// Set the initial microphone and camera states
    pub fn with_media_enabled(mut self, mic: bool, cam: bool) -> Self {
        self.mic_enabled = mic;
        self.cam_enabled = cam;
        self
    }
}
