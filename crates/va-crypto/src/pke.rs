//! ECIES-style public-key encryption over X25519 + AES-256-GCM.
//!
//! Wire format: `ephemeralPk(32) ‖ nonce(12) ‖ ct+tag`, per spec.md §4.1.
//! AAD = ephemeralPk. HKDF info = `ephemeralPk ‖ recipientPk`.

use x25519_dalek::{PublicKey, StaticSecret};

use crate::dh;
use crate::error::CryptoError;
use crate::kdf;

const NONCE_LEN: usize = 12;

/// `pkeEncrypt(recipientPk, pt)`.
pub fn pke_encrypt(recipient_pk: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (eph_sk, eph_pk) = dh::dh_keygen();
    let shared = dh::dh_agree(&eph_sk, recipient_pk);

    let mut info = Vec::with_capacity(64);
    info.extend_from_slice(eph_pk.as_bytes());
    info.extend_from_slice(recipient_pk.as_bytes());
    let key = kdf::hkdf32(&shared, &[], &info)?;

    let ct = crate::aead::aes_gcm_encrypt(&key, eph_pk.as_bytes(), plaintext)?;
    // aes_gcm_encrypt's own wire format is nonce(12) || ct+tag; prepend the
    // ephemeral public key so the recipient can recompute the shared key.
    let mut out = Vec::with_capacity(32 + ct.len());
    out.extend_from_slice(eph_pk.as_bytes());
    out.extend_from_slice(&ct);
    Ok(out)
}

/// `pkeDecrypt(sk, ct)`.
pub fn pke_decrypt(sk: &StaticSecret, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < 32 + NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (eph_pk_bytes, rest) = data.split_at(32);
    let eph_pk = dh::public_from_bytes(eph_pk_bytes)?;
    let recipient_pk = PublicKey::from(sk);

    let shared = dh::dh_agree(sk, &eph_pk);
    let mut info = Vec::with_capacity(64);
    info.extend_from_slice(eph_pk_bytes);
    info.extend_from_slice(recipient_pk.as_bytes());
    let key = kdf::hkdf32(&shared, &[], &info)?;

    let pt = crate::aead::aes_gcm_decrypt(&key, eph_pk_bytes, rest)?;
    Ok(pt.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh::dh_keygen;

    #[test]
    fn pke_roundtrip() {
        let (sk, pk) = dh_keygen();
        let msg = b"right-to-use credential payload";
        let ct = pke_encrypt(&pk, msg).unwrap();
        let pt = pke_decrypt(&sk, &ct).unwrap();
        assert_eq!(&pt[..], msg);
    }

    #[test]
    fn pke_tamper_detected() {
        let (sk, pk) = dh_keygen();
        let mut ct = pke_encrypt(&pk, b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(pke_decrypt(&sk, &ct).is_err());
    }

    #[test]
    fn pke_rejects_truncated_ciphertext() {
        let (sk, _pk) = dh_keygen();
        assert!(pke_decrypt(&sk, &[0u8; 10]).is_err());
    }
}
