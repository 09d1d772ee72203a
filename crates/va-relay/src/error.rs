use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay connect failed: {0}")]
    Connect(String),

    #[error("relay protocol error: {0}")]
    Protocol(String),

    #[error("publish rejected by relay: {0}")]
    PublishRejected(String),
}
