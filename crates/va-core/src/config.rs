//! `SubscriberConfig` — durable, loaded once at startup, immutable per call
//! (spec.md §3). Read from the enrollment-produced credential blob and the
//! stored primary phone number, both supplied as environment strings
//! (spec.md §6's "Persisted state" collaborator). Never panics on missing
//! or malformed input — mirrors `guard_core::vault`'s fallible loading.

use std::collections::VecDeque;

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::AuthError;

pub const CREDENTIAL_ENV_VAR: &str = "DARKLOCK_VA_CREDENTIAL";
pub const PHONE_ENV_VAR: &str = "DARKLOCK_VA_PHONE";

#[derive(Debug, Serialize, Deserialize)]
struct CredentialBlob {
    amf_sk: [u8; 32],
    pke_sk: [u8; 32],
    dr_sk: [u8; 32],
    en_expiration: Vec<u8>,
    ra_public_key: [u8; 32],
    ra_signature: Vec<u8>,
    moderator_public_key: [u8; 32],
    my_name: String,
    tickets: Vec<Vec<u8>>,
}

/// The enrolled subscriber's identity and credential material. Loaded once
/// at startup and treated as immutable for the lifetime of a call.
pub struct SubscriberConfig {
    pub my_phone: String,
    pub my_name: String,

    pub amf_sk: SigningKey,
    pub amf_pk: VerifyingKey,
    pub pke_sk: StaticSecret,
    pub pke_pk: PublicKey,
    pub dr_sk: StaticSecret,
    pub dr_pk: PublicKey,

    pub en_expiration: Vec<u8>,
    pub ra_public_key: VerifyingKey,
    pub ra_signature: Vec<u8>,
    pub moderator_public_key: VerifyingKey,

    tickets: Mutex<VecDeque<Vec<u8>>>,
}

impl std::fmt::Debug for SubscriberConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberConfig")
            .field("my_phone", &self.my_phone)
            .field("my_name", &self.my_name)
            .finish_non_exhaustive()
    }
}

impl SubscriberConfig {
    /// Load from `DARKLOCK_VA_CREDENTIAL` (base64 JSON blob) and
    /// `DARKLOCK_VA_PHONE`.
    pub fn from_env() -> Result<Self, AuthError> {
        let encoded = std::env::var(CREDENTIAL_ENV_VAR)
            .map_err(|_| AuthError::ConfigurationMissing(CREDENTIAL_ENV_VAR.into()))?;
        let my_phone = std::env::var(PHONE_ENV_VAR)
            .map_err(|_| AuthError::ConfigurationMissing(PHONE_ENV_VAR.into()))?;
        Self::from_credential_blob(&encoded, my_phone)
    }

    pub fn from_credential_blob(encoded: &str, my_phone: String) -> Result<Self, AuthError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| AuthError::ConfigurationInvalid(format!("credential is not valid base64: {e}")))?;
        let blob: CredentialBlob = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::ConfigurationInvalid(format!("credential JSON malformed: {e}")))?;

        let amf_sk = SigningKey::from_bytes(&blob.amf_sk);
        let amf_pk = amf_sk.verifying_key();
        let pke_sk = StaticSecret::from(blob.pke_sk);
        let pke_pk = PublicKey::from(&pke_sk);
        let dr_sk = StaticSecret::from(blob.dr_sk);
        let dr_pk = PublicKey::from(&dr_sk);
        let ra_public_key = VerifyingKey::from_bytes(&blob.ra_public_key)
            .map_err(|e| AuthError::ConfigurationInvalid(format!("bad RA public key: {e}")))?;
        let moderator_public_key = VerifyingKey::from_bytes(&blob.moderator_public_key)
            .map_err(|e| AuthError::ConfigurationInvalid(format!("bad moderator public key: {e}")))?;

        Ok(Self {
            my_phone,
            my_name: blob.my_name,
            amf_sk,
            amf_pk,
            pke_sk,
            pke_pk,
            dr_sk,
            dr_pk,
            en_expiration: blob.en_expiration,
            ra_public_key,
            ra_signature: blob.ra_signature,
            moderator_public_key,
            tickets: Mutex::new(blob.tickets.into()),
        })
    }

    /// Pop one single-use relay authorization token. Invariant: a ticket is
    /// consumed on each new relay subscription (spec.md §3).
    pub fn next_ticket(&self) -> Vec<u8> {
        self.tickets.lock().pop_front().unwrap_or_default()
    }
}
