//! Length-framed wire codec for `ProtocolMessage` — a protobuf-compatible
//! wire layout per spec.md §4.5 ("serialized with a length-framed binary
//! format"), realised here as `[len: u32 LE][JSON bytes]` canonical framing.

use crate::error::ProtoError;
use crate::message::ProtocolMessage;

/// Encode a message for the wire: JSON-serialize, then length-prefix.
pub fn encode(msg: &ProtocolMessage) -> Result<Vec<u8>, ProtoError> {
    let body = serde_json::to_vec(msg)?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode one length-framed message. Returns the message and the number of
/// bytes consumed, so callers can decode multiple frames from one buffer.
pub fn decode(framed: &[u8]) -> Result<(ProtocolMessage, usize), ProtoError> {
    if framed.len() < 4 {
        return Err(ProtoError::Truncated(4, framed.len()));
    }
    let len = u32::from_le_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
    if framed.len() < 4 + len {
        return Err(ProtoError::Truncated(4 + len, framed.len()));
    }
    let msg: ProtocolMessage = serde_json::from_slice(&framed[4..4 + len])?;
    Ok((msg, 4 + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    #[test]
    fn encode_decode_roundtrip() {
        let msg = ProtocolMessage::new(MessageType::Heartbeat, "s1", "topic", vec![9, 9, 9]);
        let framed = encode(&msg).unwrap();
        let (decoded, consumed) = decode(&framed).unwrap();
        assert_eq!(consumed, framed.len());
        assert_eq!(decoded.sender_id, "s1");
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let msg = ProtocolMessage::new(MessageType::Bye, "s1", "topic", vec![]);
        let framed = encode(&msg).unwrap();
        assert!(decode(&framed[..framed.len() - 1]).is_err());
        assert!(decode(&framed[..2]).is_err());
    }
}
