//! AEAD primitives named by the CryptoFacade contract (spec.md §4.1):
//! `aesGcmEnc`/`aesGcmDec` and `aesCtrHmacEnc`/`aesCtrHmacDec`.
//!
//! Grounded on `dl_crypto::aead`'s nonce-prepend wire format, generalized
//! from XChaCha20-Poly1305 to the two cipher suites this spec names.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

// ── AES-256-GCM: 12-byte nonce, 16-byte tag ─────────────────────────────────

/// Encrypt with AES-256-GCM. Wire format: `nonce(12) ‖ ct ‖ tag(16)`.
pub fn aes_gcm_encrypt(key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = Aes256Gcm::generate_nonce(&mut aes_gcm::aead::OsRng);
    let ct = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;
    let mut out = Vec::with_capacity(12 + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypt AES-256-GCM wire-format bytes.
pub fn aes_gcm_decrypt(key: &[u8; 32], aad: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < 12 {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let pt = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(pt))
}

// ── AES-256-CTR + HMAC-SHA256 (encrypt-then-MAC): 16-byte IV ────────────────

/// Encrypt-then-MAC. Wire format: `iv(16) ‖ ct ‖ HMAC-SHA256(32)`.
/// The MAC covers `aad ‖ iv ‖ ct`.
pub fn aes_ctr_hmac_encrypt(key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    use rand::RngCore;
    let (enc_key, mac_key) = split_ctr_hmac_keys(key);

    let mut iv = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut ct = plaintext.to_vec();
    let mut cipher = Aes256Ctr::new(&enc_key.into(), &iv.into());
    cipher.apply_keystream(&mut ct);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&mac_key).map_err(|_| CryptoError::AeadEncrypt)?;
    mac.update(aad);
    mac.update(&iv);
    mac.update(&ct);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(16 + ct.len() + 32);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ct);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Verify-then-decrypt the `aesCtrHmacEnc` wire format.
pub fn aes_ctr_hmac_decrypt(key: &[u8; 32], aad: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < 16 + 32 {
        return Err(CryptoError::AeadDecrypt);
    }
    let (enc_key, mac_key) = split_ctr_hmac_keys(key);

    let (iv, rest) = data.split_at(16);
    let (ct, tag) = rest.split_at(rest.len() - 32);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&mac_key).map_err(|_| CryptoError::AeadDecrypt)?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ct);
    mac.verify_slice(tag).map_err(|_| CryptoError::AeadDecrypt)?;

    let mut pt = ct.to_vec();
    let mut cipher = Aes256Ctr::new(&enc_key.into(), <&[u8; 16]>::try_from(iv).unwrap().into());
    cipher.apply_keystream(&mut pt);
    Ok(Zeroizing::new(pt))
}

/// Derive independent encryption/MAC subkeys from a single 32-byte key via
/// HKDF, so one caller-supplied key never directly drives two primitives.
fn split_ctr_hmac_keys(key: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let enc_key = crate::kdf::hkdf32(key, b"va-aes-ctr-hmac", b"enc").expect("static HKDF params");
    let mac_key = crate::kdf::hkdf32(key, b"va-aes-ctr-hmac", b"mac").expect("static HKDF params");
    (enc_key, mac_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_roundtrip() {
        let key = [1u8; 32];
        let ct = aes_gcm_encrypt(&key, b"aad", b"hello").unwrap();
        let pt = aes_gcm_decrypt(&key, b"aad", &ct).unwrap();
        assert_eq!(&pt[..], b"hello");
    }

    #[test]
    fn gcm_tamper_detected() {
        let key = [1u8; 32];
        let mut ct = aes_gcm_encrypt(&key, b"aad", b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(aes_gcm_decrypt(&key, b"aad", &ct).is_err());
    }

    #[test]
    fn ctr_hmac_roundtrip() {
        let key = [2u8; 32];
        let ct = aes_ctr_hmac_encrypt(&key, b"aad", b"secret message").unwrap();
        let pt = aes_ctr_hmac_decrypt(&key, b"aad", &ct).unwrap();
        assert_eq!(&pt[..], b"secret message");
    }

    #[test]
    fn ctr_hmac_tamper_detected() {
        let key = [2u8; 32];
        let mut ct = aes_ctr_hmac_encrypt(&key, b"aad", b"secret message").unwrap();
        let mid = ct.len() / 2;
        ct[mid] ^= 0x01;
        assert!(aes_ctr_hmac_decrypt(&key, b"aad", &ct).is_err());
    }
}
