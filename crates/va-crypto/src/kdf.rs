//! HKDF-SHA256 key derivation.
//!
//! Grounded on `dl_crypto::kdf`'s `hkdf_expand`/`ratchet_keys`/`chain_step`,
//! generalized to the exact domain-separation strings and output lengths
//! this protocol's AKE, RUA, and ratchet steps require.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;

/// `hkdf(ikm, salt, info, len)` — the CryptoFacade primitive, verbatim.
pub fn hkdf(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = vec![0u8; len];
    hk.expand(info, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(out)
}

/// `hkdf` specialised to a fixed 32-byte output, the common case for
/// shared keys, root keys, and chain keys.
pub fn hkdf32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let v = hkdf(ikm, salt, info, 32)?;
    Ok(v.try_into().expect("hkdf32 requested exactly 32 bytes"))
}

/// KDF_RK (Double Ratchet root-key step): `HKDF(ikm=dhOut, salt=rk,
/// info=sessionId, len=64) → (newRk, chainKey)`, per spec.md §4.8.
pub fn kdf_root(root_key: &[u8; 32], dh_out: &[u8], session_id: &[u8]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let out = hkdf(dh_out, root_key, session_id, 64)?;
    let mut new_rk = [0u8; 32];
    let mut chain_key = [0u8; 32];
    new_rk.copy_from_slice(&out[..32]);
    chain_key.copy_from_slice(&out[32..]);
    Ok((new_rk, chain_key))
}

/// KDF_CK (Double Ratchet chain step): HMAC-based `(newCk, mk) = (HMAC(ck,
/// 0x01), HMAC(ck, 0x02))`, per spec.md §4.8.
pub fn kdf_chain(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;

    let mut mac_ck = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac_ck.update(&[0x01]);
    let new_ck: [u8; 32] = mac_ck.finalize().into_bytes().into();

    let mut mac_mk = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac_mk.update(&[0x02]);
    let mk: [u8; 32] = mac_mk.finalize().into_bytes().into();

    Ok((new_ck, mk))
}

/// `deriveMessageKeys(mk) = HKDF(ikm=mk, salt=none, info="MessageKeys",
/// len=64) → (encKey, macKey)`, per spec.md §4.8.
pub fn derive_message_keys(mk: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let out = hkdf(mk, &[], b"MessageKeys", 64)?;
    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    enc_key.copy_from_slice(&out[..32]);
    mac_key.copy_from_slice(&out[32..]);
    Ok((enc_key, mac_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf32_is_deterministic() {
        let a = hkdf32(b"ikm", b"salt", b"info").unwrap();
        let b = hkdf32(b"ikm", b"salt", b"info").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kdf_chain_ck_and_mk_differ() {
        let ck = [7u8; 32];
        let (new_ck, mk) = kdf_chain(&ck).unwrap();
        assert_ne!(new_ck, mk);
        assert_ne!(new_ck, ck);
    }
}
