//! va-crypto — cryptographic primitives for the per-call voice
//! authentication protocol core.
//!
//! This crate is the CryptoFacade: a thin, stateless, typed wrapper over
//! the external cryptographic primitives the AKE and RUA protocols are
//! built from. No session or protocol state lives here — that belongs to
//! `va-core`.
//!
//! # Module layout
//! - `dh` — X25519 key agreement and SHA-256 hashing
//! - `kdf` — HKDF-SHA256 and Double Ratchet key-schedule steps
//! - `aead` — AES-256-GCM and AES-256-CTR+HMAC-SHA256 authenticated encryption
//! - `pke` — ECIES-style public-key encryption over X25519 + AES-GCM
//! - `amf` — authenticated message franking (documented placeholder backend)
//! - `bbs` — anonymous-credential selective disclosure (documented placeholder backend)
//! - `ratchet` — Double Ratchet session state
//! - `error` — `CryptoError`

pub mod aead;
pub mod amf;
pub mod bbs;
pub mod dh;
pub mod error;
pub mod kdf;
pub mod pke;
pub mod ratchet;

pub use error::CryptoError;
