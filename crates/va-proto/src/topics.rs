//! Topic and identifier derivation, per spec.md §4.4. All derivations use
//! SHA-256 over raw UTF-8 bytes, rendered as lowercase hex for transport.

use va_crypto::dh::sha256;

/// `akeTopic = H(src ‖ ts)`. Returns the raw 32-byte hash; render with
/// [`topic_hex`] before putting it on the wire.
pub fn ake_topic(src: &str, ts: &str) -> [u8; 32] {
    sha256(&[src.as_bytes(), ts.as_bytes()])
}

/// `ruaTopic = H(sharedKey ‖ src ‖ dst ‖ ts)`.
pub fn rua_topic(shared_key: &[u8; 32], src: &str, dst: &str, ts: &str) -> [u8; 32] {
    sha256(&[shared_key, src.as_bytes(), dst.as_bytes(), ts.as_bytes()])
}

/// Lowercase-hex rendering of a topic for transport (spec.md §4.4).
pub fn topic_hex(topic: &[u8; 32]) -> String {
    hex::encode(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ake_topic_is_deterministic_and_symmetric_for_both_parties() {
        let from_caller = ake_topic("+15551234567", "2026-07-31T14");
        let from_recipient = ake_topic("+15551234567", "2026-07-31T14");
        assert_eq!(from_caller, from_recipient);
    }

    #[test]
    fn ake_topic_changes_with_timestamp() {
        let a = ake_topic("+15551234567", "2026-07-31T14");
        let b = ake_topic("+15551234567", "2026-07-31T15");
        assert_ne!(a, b);
    }

    #[test]
    fn rua_topic_requires_matching_shared_key() {
        let key = [1u8; 32];
        let a = rua_topic(&key, "+1555", "+1666", "2026-07-31T14");
        let other_key = [2u8; 32];
        let b = rua_topic(&other_key, "+1555", "+1666", "2026-07-31T14");
        assert_ne!(a, b);
    }
}
