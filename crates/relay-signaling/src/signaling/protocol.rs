//! Negotiation messages carried inside reliable signaling messages
//!
//! Clients exchange three JSON shapes with a relay leg:
//!
//! - a bare number, the probe the client library uses to pick offer/answer roles
//! - `{"type":"offer"|"answer","sdp":"..."}`
//! - `{"candidate":...,"sdpMLineIndex":...,"sdpMid":...}`
//!
//! Anything else parses as [`NegotiationMessage::Unknown`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
}

/// Session description as sent by WebRTC clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,

    /// SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize session description: {}", e))
        })
    }
}

/// ICE candidate sent by a client
///
/// Only recognised so it can be discarded quietly: the SDP produced by the
/// media engine carries the only valid candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: Value,

    /// SDP media line index
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Value,

    /// SDP media id
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Value,
}

/// A parsed negotiation message
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationMessage {
    /// Role negotiation probe (a bare number)
    Handshake(serde_json::Number),
    /// SDP offer or answer
    Description(SessionDescription),
    /// ICE candidate
    Candidate(IceCandidate),
    /// Valid JSON of an unrecognised shape
    Unknown(Value),
}

impl NegotiationMessage {
    /// Parse a message from its JSON text
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if `text` is not valid JSON. Valid
    /// JSON of any other shape is returned as `Unknown`.
    pub fn parse(text: &str) -> Result<Self> {
        let json: Value = serde_json::from_str(text).map_err(|e| {
            Error::SerializationError(format!("Failed to parse negotiation message: {}", e))
        })?;

        Ok(Self::from_value(json))
    }

    /// Classify an already parsed JSON value
    pub fn from_value(json: Value) -> Self {
        let (is_description, is_candidate) = match &json {
            Value::Number(n) => return NegotiationMessage::Handshake(n.clone()),
            Value::Object(map) => (
                map.contains_key("type") && map.contains_key("sdp"),
                map.contains_key("candidate")
                    && map.contains_key("sdpMLineIndex")
                    && map.contains_key("sdpMid"),
            ),
            _ => (false, false),
        };

        if is_description {
            return match serde_json::from_value::<SessionDescription>(json.clone()) {
                Ok(desc) => NegotiationMessage::Description(desc),
                Err(_) => NegotiationMessage::Unknown(json),
            };
        }

        if is_candidate {
            return match serde_json::from_value::<IceCandidate>(json.clone()) {
                Ok(candidate) => NegotiationMessage::Candidate(candidate),
                Err(_) => NegotiationMessage::Unknown(json),
            };
        }

        NegotiationMessage::Unknown(json)
    }

    /// Short name for log output
    pub fn kind(&self) -> &'static str {
        match self {
            NegotiationMessage::Handshake(_) => "handshake",
            NegotiationMessage::Description(d) => match d.sdp_type {
                SdpType::Offer => "offer",
                SdpType::Answer => "answer",
            },
            NegotiationMessage::Candidate(_) => "candidate",
            NegotiationMessage::Unknown(_) => "unknown",
        }
    }
}
