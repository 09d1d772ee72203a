//! `RelayTransport` — the pluggable backend behind `RelayClient`. Two
//! implementations ship here: `WebSocketTransport` (real network, spec.md
//! §4.2's "binary RPC framework" realised over `tokio-tungstenite`,
//! grounded on `clawde-io-apps/daemon/src/relay/mod.rs`'s connect/backoff
//! shape) and `LoopbackTransport` (in-process, for tests and the CLI
//! demo).

use async_trait::async_trait;

use crate::error::RelayError;
use va_proto::relay_frame::{PublishResponse, RelayMessage};

#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, ticket: Option<Vec<u8>>) -> Result<PublishResponse, RelayError>;

    async fn subscribe(&self, topic: &str, ticket: Vec<u8>) -> Result<Box<dyn RelayInboundStream>, RelayError>;
}

/// The receiving half of an open subscribe stream. `recv` returns `None`
/// once the stream has ended (the caller should reconnect with backoff).
#[async_trait]
pub trait RelayInboundStream: Send {
    async fn recv(&mut self) -> Option<RelayMessage>;
}
