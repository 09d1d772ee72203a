//! Anonymous-credential / selective-disclosure primitives named by the
//! CryptoFacade contract as `bbsVerify`, `bbsCreateProof`, `bbsVerifyProof`
//! (spec.md §4.1).
//!
//! A genuine BBS+ implementation needs pairing-friendly curve arithmetic
//! that isn't part of this crate's dependency stack (the corpus has no
//! audited BBS+ crate — see DESIGN.md). This module instead implements a
//! **commit-then-sign redactable signature**: the registration authority
//! signs a Merkle-style root of per-message commitments rather than the
//! messages directly, so selective disclosure is real (hidden messages are
//! provably bound to the signature without being revealed) even though the
//! unlinkability/zero-knowledge properties of true BBS+ are not provided.
//! The external call contract (inputs/outputs named in spec.md §4.1) is
//! matched exactly so `va-core` can be swapped to a real BBS+ backend
//! later without touching callers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

fn message_commitment(index: usize, msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"va-bbs-commit-v1\x00");
    hasher.update((index as u32).to_le_bytes());
    hasher.update(msg);
    hasher.finalize().into()
}

fn root_from_commitments(commits: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"va-bbs-root-v1\x00");
    for c in commits {
        hasher.update(c);
    }
    hasher.finalize().into()
}

/// `bbsVerify(raPk, sig, messages)` — full-disclosure verification: every
/// message is known to the verifier (used for the RUA-phase RTU check,
/// spec.md §4.7 step 1, where the full credential is exchanged).
pub fn bbs_verify(ra_pk: &VerifyingKey, sig: &[u8], messages: &[&[u8]]) -> Result<(), CryptoError> {
    let commits: Vec<[u8; 32]> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| message_commitment(i, m))
        .collect();
    let root = root_from_commitments(&commits);
    let signature = Signature::from_slice(sig).map_err(|_| CryptoError::InvalidKey("bad BBS+ signature length".into()))?;
    ra_pk
        .verify(&root, &signature)
        .map_err(|_| CryptoError::ProofVerification)
}

/// Sign a message vector for RTU issuance. This is the credential-issuance
/// step (ordinarily performed by the external registration authority); it
/// is exposed here only so tests can construct valid fixtures end-to-end.
pub fn bbs_sign(ra_sk: &SigningKey, messages: &[&[u8]]) -> Vec<u8> {
    let commits: Vec<[u8; 32]> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| message_commitment(i, m))
        .collect();
    let root = root_from_commitments(&commits);
    ra_sk.sign(&root).to_bytes().to_vec()
}

/// A selective-disclosure presentation: discloses the messages at
/// `disclosed_indices` in the clear, and carries only one-way commitments
/// for every other index, bound to a presentation `nonce`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectiveDisclosureProof {
    pub disclosed_indices: Vec<usize>,
    pub disclosed_messages: Vec<String>,
    /// `(index, commitment)` for every index NOT in `disclosed_indices`.
    pub hidden_commitments: Vec<(usize, String)>,
    /// The RA's Ed25519 signature over the full commitment root (base64).
    pub root_signature: String,
    /// Presentation nonce — the caller MUST check this matches the expected
    /// topic/context before trusting the proof (anti-replay binding).
    pub nonce: String,
}

/// `bbsCreateProof(messages, disclosedIdx, raPk, sig, nonce)`.
///
/// `sig` must already satisfy `bbs_verify(raPk, sig, messages)`; this
/// function does not re-verify it (the holder is assumed to already possess
/// a valid credential — mirroring how a real BBS+ holder never re-verifies
/// their own signature at presentation time).
pub fn bbs_create_proof(
    messages: &[&[u8]],
    disclosed_indices: &[usize],
    sig: &[u8],
    nonce: &[u8],
) -> SelectiveDisclosureProof {
    let disclosed_messages = disclosed_indices
        .iter()
        .map(|&i| URL_SAFE_NO_PAD.encode(messages[i]))
        .collect();
    let hidden_commitments = (0..messages.len())
        .filter(|i| !disclosed_indices.contains(i))
        .map(|i| (i, URL_SAFE_NO_PAD.encode(message_commitment(i, messages[i]))))
        .collect();

    SelectiveDisclosureProof {
        disclosed_indices: disclosed_indices.to_vec(),
        disclosed_messages,
        hidden_commitments,
        root_signature: URL_SAFE_NO_PAD.encode(sig),
        nonce: URL_SAFE_NO_PAD.encode(nonce),
    }
}

/// `bbsVerifyProof(disclosedIdx, disclosedMsgs, raPk, nonce, proof)`.
pub fn bbs_verify_proof(
    disclosed_indices: &[usize],
    disclosed_messages: &[&[u8]],
    ra_pk: &VerifyingKey,
    nonce: &[u8],
    proof: &SelectiveDisclosureProof,
) -> Result<(), CryptoError> {
    if proof.disclosed_indices != disclosed_indices {
        return Err(CryptoError::ProofVerification);
    }
    if URL_SAFE_NO_PAD.encode(nonce) != proof.nonce {
        return Err(CryptoError::ProofVerification);
    }
    if proof.disclosed_messages.len() != disclosed_messages.len() {
        return Err(CryptoError::ProofVerification);
    }

    let total = disclosed_indices.len() + proof.hidden_commitments.len();
    let mut commits: Vec<Option<[u8; 32]>> = vec![None; total];

    for (slot, (&idx, &msg)) in disclosed_indices.iter().zip(disclosed_messages.iter()).enumerate() {
        let claimed = URL_SAFE_NO_PAD
            .decode(&proof.disclosed_messages[slot])
            .map_err(|_| CryptoError::ProofVerification)?;
        if claimed != msg {
            return Err(CryptoError::ProofVerification);
        }
        if idx >= total {
            return Err(CryptoError::ProofVerification);
        }
        commits[idx] = Some(message_commitment(idx, msg));
    }

    for (idx, commit_b64) in &proof.hidden_commitments {
        if *idx >= total || commits[*idx].is_some() {
            return Err(CryptoError::ProofVerification);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(commit_b64)
            .map_err(|_| CryptoError::ProofVerification)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::ProofVerification)?;
        commits[*idx] = Some(arr);
    }

    let commits: Vec<[u8; 32]> = commits
        .into_iter()
        .map(|c| c.ok_or(CryptoError::ProofVerification))
        .collect::<Result<_, _>>()?;

    let root = root_from_commitments(&commits);
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(&proof.root_signature)
        .map_err(|_| CryptoError::ProofVerification)?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| CryptoError::ProofVerification)?;
    ra_pk
        .verify(&root, &signature)
        .map_err(|_| CryptoError::ProofVerification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn credential() -> (SigningKey, VerifyingKey, Vec<u8>, Vec<u8>, Vec<u8>) {
        let ra_sk = SigningKey::generate(&mut OsRng);
        let ra_pk = ra_sk.verifying_key();
        let hash_attr = b"hash-of-attributes".to_vec();
        let name = b"Bob".to_vec();
        let sig = bbs_sign(&ra_sk, &[&hash_attr, &name]);
        (ra_sk, ra_pk, hash_attr, name, sig)
    }

    #[test]
    fn full_verify_roundtrip() {
        let (_sk, pk, hash_attr, name, sig) = credential();
        assert!(bbs_verify(&pk, &sig, &[&hash_attr, &name]).is_ok());
    }

    #[test]
    fn full_verify_rejects_tampered_message() {
        let (_sk, pk, hash_attr, _name, sig) = credential();
        assert!(bbs_verify(&pk, &sig, &[&hash_attr, b"Mallory"]).is_err());
    }

    #[test]
    fn selective_disclosure_hides_name_but_verifies() {
        let (_sk, pk, hash_attr, name, sig) = credential();
        let nonce = b"topic-nonce";
        let proof = bbs_create_proof(&[&hash_attr, &name], &[0], &sig, nonce);
        assert!(proof
            .disclosed_messages
            .iter()
            .all(|m| URL_SAFE_NO_PAD.decode(m).unwrap() != name));
        assert!(bbs_verify_proof(&[0], &[&hash_attr], &pk, nonce, &proof).is_ok());
    }

    #[test]
    fn selective_disclosure_rejects_wrong_nonce() {
        let (_sk, pk, hash_attr, name, sig) = credential();
        let proof = bbs_create_proof(&[&hash_attr, &name], &[0], &sig, b"topic-a");
        assert!(bbs_verify_proof(&[0], &[&hash_attr], &pk, b"topic-b", &proof).is_err());
    }

    #[test]
    fn selective_disclosure_rejects_tampered_proof_byte() {
        let (_sk, pk, hash_attr, name, sig) = credential();
        let nonce = b"topic-nonce";
        let mut proof = bbs_create_proof(&[&hash_attr, &name], &[0], &sig, nonce);
        let mut decoded = URL_SAFE_NO_PAD.decode(&proof.root_signature).unwrap();
        decoded[0] ^= 0x01;
        proof.root_signature = URL_SAFE_NO_PAD.encode(&decoded);
        assert!(bbs_verify_proof(&[0], &[&hash_attr], &pk, nonce, &proof).is_err());
    }
}
