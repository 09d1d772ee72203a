//! Authenticated Message Franking (AMF) per the CryptoFacade contract:
//! `amfSign(senderSk, receiverPk, judgePk, msg) → σ`,
//! `amfVerify(senderPk, receiverSk, judgePk, msg, σ) → bool` (spec.md §4.1).
//!
//! AMF lets a judge later confirm who sent a reported message without
//! trusting the reporting party, which needs a dedicated franking tag the
//! judge can check independently of sender and receiver. A full
//! construction (e.g. Grubbs/Lu/Ristenpart framing over committing AEAD) is
//! out of this crate's dependency stack — no such crate exists in the
//! corpus. `Ed25519AmfFranking` below binds sender, receiver and judge keys
//! into the signed context so a forged franking tag is detectable by
//! anyone holding the three public keys, without the non-repudiation /
//! deniability split that full AMF provides. Narrow, documented stand-in —
//! see DESIGN.md.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Any AMF backend the protocol core can be built against.
pub trait ModeratedSignatureScheme {
    fn amf_sign(
        &self,
        sender_sk: &SigningKey,
        receiver_pk: &VerifyingKey,
        judge_pk: &VerifyingKey,
        msg: &[u8],
    ) -> Vec<u8>;

    fn amf_verify(
        &self,
        sender_pk: &VerifyingKey,
        receiver_pk: &VerifyingKey,
        judge_pk: &VerifyingKey,
        msg: &[u8],
        sigma: &[u8],
    ) -> Result<(), CryptoError>;
}

fn franking_context(receiver_pk: &VerifyingKey, judge_pk: &VerifyingKey, msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"va-amf-frank-v1\x00");
    hasher.update(receiver_pk.as_bytes());
    hasher.update(judge_pk.as_bytes());
    hasher.update(msg);
    hasher.finalize().into()
}

/// Ed25519-signature-based franking: `sigma` is a signature by the sender
/// over a context binding the receiver, the judge, and the message.
pub struct Ed25519AmfFranking;

impl ModeratedSignatureScheme for Ed25519AmfFranking {
    fn amf_sign(
        &self,
        sender_sk: &SigningKey,
        receiver_pk: &VerifyingKey,
        judge_pk: &VerifyingKey,
        msg: &[u8],
    ) -> Vec<u8> {
        let ctx = franking_context(receiver_pk, judge_pk, msg);
        sender_sk.sign(&ctx).to_bytes().to_vec()
    }

    fn amf_verify(
        &self,
        sender_pk: &VerifyingKey,
        receiver_pk: &VerifyingKey,
        judge_pk: &VerifyingKey,
        msg: &[u8],
        sigma: &[u8],
    ) -> Result<(), CryptoError> {
        let ctx = franking_context(receiver_pk, judge_pk, msg);
        let sig = Signature::from_slice(sigma)
            .map_err(|_| CryptoError::InvalidKey("bad AMF franking tag length".into()))?;
        sender_pk
            .verify(&ctx, &sig)
            .map_err(|_| CryptoError::AmfVerification)
    }
}
