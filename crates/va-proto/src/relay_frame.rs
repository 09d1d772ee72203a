//! The relay wire frame, per spec.md §6: `RelayMessage{topic, payload}`
//! carried inside `Subscribe`'s stream and `Publish`'s request.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub topic: String,
    pub ticket: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessage {
    pub topic: String,
    #[serde(with = "crate::message::base64_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublishResponse {
    pub status: String,
}

impl PublishResponse {
    /// success iff `status` is empty or equals `"OK"` (case-insensitive).
    pub fn is_success(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_response_treats_empty_and_ok_as_success() {
        assert!(PublishResponse { status: String::new() }.is_success());
        assert!(PublishResponse { status: "OK".into() }.is_success());
        assert!(PublishResponse { status: "ok".into() }.is_success());
        assert!(!PublishResponse { status: "ERROR".into() }.is_success());
    }
}
