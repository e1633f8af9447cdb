//! Wire formats for documents in the signaling store
//!
//! Field names are camelCase on the wire so stores shared with other clients
//! interoperate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::{Error, Result};

/// `calls/{call}` document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDoc {
    /// Human-readable call name
    pub name: String,

    /// Creation time, milliseconds since the Unix epoch
    pub created_at: i64,
}

/// `participants/{participant}` roster document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDoc {
    /// Display name
    pub name: String,

    /// Join time, milliseconds since the Unix epoch; breaks initiator ties
    pub joined_at: i64,

    /// Advertised microphone state
    pub is_mic_enabled: bool,

    /// Advertised camera state
    pub is_cam_enabled: bool,
}

/// SDP payload inside an offer or answer document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptionDoc {
    /// Raw SDP text
    pub sdp: String,

    /// "offer" or "answer"
    #[serde(rename = "type")]
    pub kind: String,
}

/// `offers/{initiator}` and `answers/{initiator}` documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationDoc {
    /// The session description being exchanged
    pub description: SessionDescriptionDoc,
}

/// One entry in a pair's ICE candidate log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDoc {
    /// Candidate string in candidate-attribute form
    pub candidate: String,

    /// Media stream identification tag
    #[serde(default)]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,

    /// ICE username fragment
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl SessionDescriptionDoc {
    /// Capture a local description for publication
    pub fn from_description(desc: &RTCSessionDescription) -> Self {
        Self {
            sdp: desc.sdp.clone(),
            kind: desc.sdp_type.to_string(),
        }
    }

    /// Rebuild the webrtc description from the stored fields
    pub fn to_description(&self) -> Result<RTCSessionDescription> {
        let desc = match RTCSdpType::from(self.kind.as_str()) {
            RTCSdpType::Offer => RTCSessionDescription::offer(self.sdp.clone()),
            RTCSdpType::Answer => RTCSessionDescription::answer(self.sdp.clone()),
            _ => {
                return Err(Error::InvalidDoc(format!(
                    "unsupported description type: {}",
                    self.kind
                )))
            }
        };
        desc.map_err(|e| Error::InvalidDoc(format!("bad session description: {e}")))
    }
}

impl NegotiationDoc {
    /// Wrap a local description in the wire envelope
    pub fn new(desc: &RTCSessionDescription) -> Self {
        Self {
            description: SessionDescriptionDoc::from_description(desc),
        }
    }

    /// Decode a negotiation document from raw store data
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl CandidateDoc {
    /// Capture a locally gathered candidate for publication
    pub fn from_candidate(candidate: &RTCIceCandidate) -> Result<Self> {
        let init = candidate
            .to_json()
            .map_err(|e| Error::WebRtc(format!("candidate serialization failed: {e}")))?;
        Ok(Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_m_line_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        })
    }

    /// Convert to the form `add_ice_candidate` accepts
    pub fn to_init(&self) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: self.candidate.clone(),
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_m_line_index,
            username_fragment: self.username_fragment.clone(),
        }
    }

    /// Decode a candidate document from raw store data
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl ParticipantDoc {
    /// Decode a roster document from raw store data
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl CallDoc {
    /// Decode a call document from raw store data
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_participant_doc_uses_camel_case() {
        let doc = ParticipantDoc {
            name: "Alice".to_string(),
            joined_at: 1700000000000,
            is_mic_enabled: true,
            is_cam_enabled: false,
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Alice",
                "joinedAt": 1700000000000i64,
                "isMicEnabled": true,
                "isCamEnabled": false,
            })
        );
    }

    #[test]
    fn test_candidate_doc_round_trip() {
        let value = json!({
            "candidate": "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
            "usernameFragment": "abcd",
        });
        let doc = CandidateDoc::from_value(&value).unwrap();
        assert_eq!(doc.sdp_mid.as_deref(), Some("0"));
        assert_eq!(doc.sdp_m_line_index, Some(0));

        let init = doc.to_init();
        assert_eq!(init.sdp_mline_index, Some(0));
        assert!(init.candidate.starts_with("candidate:1"));
    }

    #[test]
    fn test_candidate_doc_tolerates_missing_optionals() {
        let value = json!({
            "candidate": "candidate:2 1 udp 1694498815 198.51.100.1 3478 typ srflx",
        });
        let doc = CandidateDoc::from_value(&value).unwrap();
        assert!(doc.sdp_mid.is_none());
        assert!(doc.username_fragment.is_none());
    }

    #[test]
    fn test_negotiation_doc_rejects_unknown_type() {
        let doc = SessionDescriptionDoc {
            sdp: "v=0\r\n".to_string(),
            kind: "rollback".to_string(),
        };
        assert!(doc.to_description().is_err());
    }

    #[test]
    fn test_negotiation_doc_decode_rejects_missing_description() {
        let err = NegotiationDoc::from_value(&json!({"foo": 1})).unwrap_err();
        assert!(matches!(err, Error::InvalidDoc(_)));
    }
}
