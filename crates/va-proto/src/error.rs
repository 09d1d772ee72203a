use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("frame truncated: expected at least {0} bytes, got {1}")]
    Truncated(usize, usize),

    #[error("unspecified message type")]
    UnspecifiedType,

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
