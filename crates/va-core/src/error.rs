use thiserror::Error;

/// Error kinds per spec.md §7. `onProtocolComplete` only ever reports a
/// binary success/failure outcome; this enum exists for logging and for
/// `endCallCleanup`'s decision of whether a failure already occurred.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("cryptographic failure: {0}")]
    CryptoFailure(#[from] va_crypto::CryptoError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("protocol timed out before reaching Verified")]
    Timeout,

    #[error("relay transient error: {0}")]
    RelayTransient(#[from] va_relay::RelayError),

    #[error("double ratchet skip cap exceeded")]
    SkippedKeysOverflow,

    #[error("shutdown")]
    Shutdown,

    #[error("protocol encoding error: {0}")]
    Proto(#[from] va_proto::ProtoError),
}
