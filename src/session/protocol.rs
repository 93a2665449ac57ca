//! # Session Control Protocol
//!
//! JSON control envelopes and legacy bare-string messages shared by the
//! relay server and the client transport.
//!
//! ## Message Format:
//! - **Binary frames**: raw little-endian PCM16 mono audio, always
//! - **Text frames**: JSON envelopes tagged by `type` (USER_JOIN, PLAY,
//!   PAUSE, PARTICIPANT_UPDATE)
//! - **Legacy text**: bare strings (`session-full`, `connected:<n>`,
//!   `peer-connected`, `peer-disconnected`) accepted inbound for
//!   backward compatibility and mapped to equivalent control effects

use serde::{Deserialize, Serialize};

/// JSON control messages exchanged over the session channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Sent by a client immediately after the channel opens
    #[serde(rename = "USER_JOIN")]
    UserJoin {
        user_id: String,
        display_name: String,
    },

    /// The local player started playing at the given time
    #[serde(rename = "PLAY")]
    Play { time: f64 },

    /// The local player paused at the given time
    #[serde(rename = "PAUSE")]
    Pause { time: f64 },

    /// Server-driven participant count update
    #[serde(rename = "PARTICIPANT_UPDATE")]
    ParticipantUpdate { count: u32 },
}

impl ControlMessage {
    pub fn to_json(&self) -> String {
        // Serialization of these variants cannot fail
        serde_json::to_string(self).expect("control message serializes")
    }
}

/// Classification of one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundText {
    /// A parsed JSON control envelope
    Control(ControlMessage),
    /// Legacy capacity signal; the channel must be closed
    SessionFull,
    /// Legacy connection ack carrying the client index
    ConnectedAck(u32),
    /// Legacy peer-connected signal (equivalent to count = 2)
    PeerConnected,
    /// Legacy peer-disconnected signal (equivalent to count = 1)
    PeerDisconnected,
    /// Text starting with `{` that failed to parse as a control message
    Malformed(String),
    /// Any other bare string; logged and ignored
    Unknown(String),
}

impl InboundText {
    /// Classify a text frame from the channel.
    ///
    /// Text beginning with a JSON object marker is parsed as a control
    /// envelope; everything else goes through the legacy string table.
    /// Classification never fails — unparseable input is surfaced as
    /// [`InboundText::Malformed`] for the caller to log and drop.
    pub fn classify(text: &str) -> Self {
        let trimmed = text.trim();

        if trimmed.starts_with('{') {
            return match serde_json::from_str::<ControlMessage>(trimmed) {
                Ok(message) => InboundText::Control(message),
                Err(err) => InboundText::Malformed(err.to_string()),
            };
        }

        match trimmed {
            "session-full" => InboundText::SessionFull,
            "peer-connected" => InboundText::PeerConnected,
            "peer-disconnected" => InboundText::PeerDisconnected,
            other => {
                if let Some(index) = other.strip_prefix("connected:") {
                    if let Ok(index) = index.parse::<u32>() {
                        return InboundText::ConnectedAck(index);
                    }
                }
                InboundText::Unknown(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_format() {
        let join = ControlMessage::UserJoin {
            user_id: "guest_ab12cd34".to_string(),
            display_name: "Guest 1f2e".to_string(),
        };
        let json = join.to_json();
        assert!(json.contains(r#""type":"USER_JOIN""#));
        assert!(json.contains(r#""user_id":"guest_ab12cd34""#));

        let play = ControlMessage::Play { time: 12.5 };
        assert_eq!(play.to_json(), r#"{"type":"PLAY","time":12.5}"#);
    }

    #[test]
    fn test_classify_json_envelopes() {
        assert_eq!(
            InboundText::classify(r#"{"type":"PARTICIPANT_UPDATE","count":2}"#),
            InboundText::Control(ControlMessage::ParticipantUpdate { count: 2 })
        );
        assert_eq!(
            InboundText::classify(r#"{"type":"PAUSE","time":3.25}"#),
            InboundText::Control(ControlMessage::Pause { time: 3.25 })
        );
    }

    #[test]
    fn test_classify_extra_fields_tolerated() {
        // The relay may append routing fields; they are ignored
        let classified =
            InboundText::classify(r#"{"type":"PARTICIPANT_UPDATE","count":1,"client_index":0}"#);
        assert_eq!(
            classified,
            InboundText::Control(ControlMessage::ParticipantUpdate { count: 1 })
        );
    }

    #[test]
    fn test_classify_legacy_strings() {
        assert_eq!(InboundText::classify("session-full"), InboundText::SessionFull);
        assert_eq!(InboundText::classify("peer-connected"), InboundText::PeerConnected);
        assert_eq!(InboundText::classify("peer-disconnected"), InboundText::PeerDisconnected);
        assert_eq!(InboundText::classify("connected:1"), InboundText::ConnectedAck(1));
    }

    #[test]
    fn test_classify_malformed_and_unknown() {
        assert!(matches!(
            InboundText::classify(r#"{"type":"NOT_A_THING"}"#),
            InboundText::Malformed(_)
        ));
        assert!(matches!(
            InboundText::classify("hello there"),
            InboundText::Unknown(_)
        ));
        assert!(matches!(
            InboundText::classify("connected:abc"),
            InboundText::Unknown(_)
        ));
    }
}
