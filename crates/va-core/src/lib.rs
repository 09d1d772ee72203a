//! va-core — the per-call voice authentication protocol core: AKE, RUA,
//! and the `AuthService` orchestrator that drives a call from dial-out or
//! inbound notification to a verified counterpart, per spec.md §4–§7.
//!
//! # Module layout
//! - `config` — `SubscriberConfig`, loaded once per subscriber from its
//!   RA-issued credential blob
//! - `state` — `CallState`/`Phase`, the per-call state machine
//! - `ake` — the authenticated key exchange phase
//! - `rua` — the right-to-use authentication phase, run over the Double
//!   Ratchet session the AKE phase established
//! - `oob` — `OobController`, the per-call topic subscription and heartbeat
//! - `service` — `AuthService`, the single-writer call orchestrator
//! - `error` — `AuthError`

pub mod ake;
pub mod config;
pub mod error;
pub mod oob;
pub mod rua;
pub mod service;
pub mod state;

pub use config::SubscriberConfig;
pub use error::AuthError;
pub use service::AuthService;
pub use state::{CallState, Phase, RemoteParty};
