//! va-relay — the OOB relay transport (`RelayClient`/`RelaySession`) for
//! the per-call voice authentication protocol core, per spec.md §4.2.
//!
//! # Module layout
//! - `transport` — `RelayTransport`/`RelayInboundStream`, the pluggable backend seam
//! - `websocket` — real-network transport over `tokio-tungstenite`
//! - `loopback` — in-process transport for tests and the CLI demo
//! - `client` — `RelayClient`, the pooled handle over a transport
//! - `session` — `RelaySession`, per-topic subscribe/publish/swap lifecycle
//! - `error` — `RelayError`

pub mod client;
pub mod error;
pub mod loopback;
pub mod session;
pub mod transport;
pub mod websocket;

pub use client::RelayClient;
pub use error::RelayError;
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use session::{FrameHandler, RelaySession, TicketSupplier};
pub use transport::{RelayInboundStream, RelayTransport};
pub use websocket::WebSocketTransport;
