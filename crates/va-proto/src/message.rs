//! The OOB envelope — `ProtocolMessage{type, senderId, topic, payload}`,
//! per spec.md §4.5/§6. `payload` is type-specific and, depending on phase,
//! may itself be PKE- or ratchet-encrypted (opaque bytes at this layer).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    AkeRequest,
    AkeResponse,
    AkeComplete,
    RuaRequest,
    RuaResponse,
    Heartbeat,
    Bye,
}

/// Versioned tagged message carried over the OOB relay channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub version: u8,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub sender_id: String,
    pub topic: String,
    /// Opaque, type-specific payload bytes, base64-encoded on the wire.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

pub const PROTOCOL_VERSION: u8 = 1;

impl ProtocolMessage {
    pub fn new(msg_type: MessageType, sender_id: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type,
            sender_id: sender_id.into(),
            topic: topic.into(),
            payload,
        }
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let msg = ProtocolMessage::new(MessageType::AkeRequest, "sender-1", "topic-hex", vec![1, 2, 3, 4]);
        let json = serde_json::to_vec(&msg).unwrap();
        let parsed: ProtocolMessage = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed.sender_id, msg.sender_id);
        assert_eq!(parsed.payload, msg.payload);
        assert_eq!(parsed.msg_type, MessageType::AkeRequest);
    }

    #[test]
    fn message_type_uses_screaming_snake_case_on_wire() {
        let json = serde_json::to_string(&MessageType::RuaRequest).unwrap();
        assert_eq!(json, "\"RUA_REQUEST\"");
    }
}
