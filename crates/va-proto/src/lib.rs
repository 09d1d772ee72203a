//! va-proto — wire types, envelopes, topic derivation, and framing for the
//! per-call voice authentication protocol core.
//!
//! # Module layout
//! - `message` — the OOB envelope (`ProtocolMessage`, `MessageType`)
//! - `payloads` — AKE and RUA payload types, canonical signed subsets
//! - `ratchet_message` — `DrMessage`, the ratchet-encrypted wire format
//! - `relay_frame` — relay transport types (`RelayMessage`, tickets, publish status)
//! - `codec` — length-framed binary encoding for `ProtocolMessage`
//! - `topics` — `akeTopic`/`ruaTopic` derivation
//! - `error` — `ProtoError`

pub mod codec;
pub mod error;
pub mod message;
pub mod payloads;
pub mod ratchet_message;
pub mod relay_frame;
pub mod topics;

pub use error::ProtoError;
pub use message::{MessageType, ProtocolMessage};
pub use ratchet_message::DrMessage;
pub use relay_frame::{PublishResponse, RelayMessage, SubscribeRequest};
