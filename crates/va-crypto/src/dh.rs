//! X25519 key agreement and SHA-256 utilities.
//!
//! Thin wrapper per the CryptoFacade contract: `dhKeygen`, `dhAgree`,
//! `sha256`. Pure and stateless — no session state lives here.

use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;

/// Generate a fresh X25519 keypair: (secret, public), both 32 bytes.
pub fn dh_keygen() -> (StaticSecret, PublicKey) {
    let sk = StaticSecret::random_from_rng(OsRng);
    let pk = PublicKey::from(&sk);
    (sk, pk)
}

/// X25519 Diffie-Hellman agreement. Returns 32 raw shared-secret bytes.
pub fn dh_agree(sk: &StaticSecret, pk: &PublicKey) -> [u8; 32] {
    *sk.diffie_hellman(pk).as_bytes()
}

pub fn public_from_bytes(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte X25519 public key".into()))?;
    Ok(PublicKey::from(arr))
}

pub fn secret_from_bytes(bytes: &[u8]) -> Result<StaticSecret, CryptoError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte X25519 secret key".into()))?;
    Ok(StaticSecret::from(arr))
}

/// `H(a, b, …) = sha256(a ‖ b ‖ …)` — concatenated-update SHA-256 over any
/// number of byte slices. Used throughout for topic/session-id derivation.
pub fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agreement_is_symmetric() {
        let (sk_a, pk_a) = dh_keygen();
        let (sk_b, pk_b) = dh_keygen();
        assert_eq!(dh_agree(&sk_a, &pk_b), dh_agree(&sk_b, &pk_a));
    }

    #[test]
    fn sha256_matches_single_shot() {
        let a = sha256(&[b"hello", b" ", b"world"]);
        let b = sha256(&[b"hello world"]);
        assert_eq!(a, b);
    }
}
