//! Authenticated Key Exchange, per spec.md §4.6.
//!
//! Both parties present a BBS+ selective-disclosure proof binding an
//! ephemeral DH key to the attributes their registration authority vouched
//! for, disclosing only the attribute hash (never the subscriber's name —
//! that waits for RUA). `AKE_COMPLETE` is a PKE-encrypted marker that tells
//! the recipient the caller reached `AkeEstablished` and it is safe to
//! initialise the Double Ratchet.

use ed25519_dalek::VerifyingKey;
use x25519_dalek::PublicKey;

use va_crypto::{bbs, dh, kdf, pke, ratchet::RatchetSession};
use va_proto::payloads::{AkeCompletePayload, AkeRequestPayload, AkeResponsePayload};
use va_proto::topics;
use va_proto::{MessageType, ProtocolMessage};

use crate::config::SubscriberConfig;
use crate::error::AuthError;
use crate::state::{AkeState, CallState, CounterpartKeys, Phase};

fn vk_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, AuthError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::ProtocolViolation("Ed25519 key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&arr).map_err(|_| AuthError::ProtocolViolation("malformed Ed25519 key".into()))
}

fn x_pk_from_bytes(bytes: &[u8]) -> Result<PublicKey, AuthError> {
    dh::public_from_bytes(bytes).map_err(|_| AuthError::ProtocolViolation("malformed X25519 key".into()))
}

/// `H(amfPk ‖ pkePk ‖ drPk ‖ expiration ‖ phone)` — the attribute hash a
/// subscriber's registration authority actually signed over.
fn attribute_hash(amf_pk: &[u8], pke_pk: &[u8], dr_pk: &[u8], expiration: &[u8], phone: &str) -> [u8; 32] {
    dh::sha256(&[amf_pk, pke_pk, dr_pk, expiration, phone.as_bytes()])
}

/// The caller's entry point: build an `AKE_REQUEST` and move the call into
/// `AkeOutstanding`.
pub fn build_ake_request(my: &SubscriberConfig, call: &mut CallState) -> Result<ProtocolMessage, AuthError> {
    let (dh_sk, dh_pk) = dh::dh_keygen();
    let ake_topic = topics::ake_topic(&call.src, &call.ts);

    let name_bytes = my.my_name.as_bytes().to_vec();
    let hash_attr = attribute_hash(
        my.amf_pk.as_bytes(),
        my.pke_pk.as_bytes(),
        my.dr_pk.as_bytes(),
        &my.en_expiration,
        &my.my_phone,
    );
    let proof = bbs::bbs_create_proof(&[&hash_attr, &name_bytes], &[0], &my.ra_signature, &ake_topic);

    let payload = AkeRequestPayload {
        dh_pk: dh_pk.as_bytes().to_vec(),
        amf_pk: my.amf_pk.as_bytes().to_vec(),
        expiration: my.en_expiration.clone(),
        proof,
        pke_pk: my.pke_pk.as_bytes().to_vec(),
        dr_pk: my.dr_pk.as_bytes().to_vec(),
    };

    call.ake = Some(AkeState { dh_sk, dh_pk, remote_dh_pk: None, topic: ake_topic });
    call.set_phase(Phase::AkeOutstanding);

    let payload_bytes = serde_json::to_vec(&payload).map_err(va_proto::ProtoError::from)?;
    Ok(ProtocolMessage::new(
        MessageType::AkeRequest,
        call.sender_id.clone(),
        topics::topic_hex(&ake_topic),
        payload_bytes,
    ))
}

/// The recipient's entry point: verify an inbound `AKE_REQUEST` and reply
/// with `AKE_RESPONSE`.
pub fn handle_ake_request(my: &SubscriberConfig, call: &mut CallState, msg: &ProtocolMessage) -> Result<ProtocolMessage, AuthError> {
    let payload: AkeRequestPayload = serde_json::from_slice(&msg.payload).map_err(va_proto::ProtoError::from)?;
    let ake_topic = topics::ake_topic(&call.src, &call.ts);

    let expected_hash = attribute_hash(&payload.amf_pk, &payload.pke_pk, &payload.dr_pk, &payload.expiration, &call.src);
    bbs::bbs_verify_proof(&[0], &[&expected_hash], &my.ra_public_key, &ake_topic, &payload.proof)
        .map_err(AuthError::from)?;

    let remote_dh_pk = x_pk_from_bytes(&payload.dh_pk)?;
    let counterpart = CounterpartKeys {
        amf_pk: vk_from_bytes(&payload.amf_pk)?,
        pke_pk: x_pk_from_bytes(&payload.pke_pk)?,
        dr_pk: x_pk_from_bytes(&payload.dr_pk)?,
    };
    call.counterpart = Some(counterpart);

    let (dh_sk, dh_pk) = dh::dh_keygen();

    let name_bytes = my.my_name.as_bytes().to_vec();
    let hash_attr = attribute_hash(
        my.amf_pk.as_bytes(),
        my.pke_pk.as_bytes(),
        my.dr_pk.as_bytes(),
        &my.en_expiration,
        &my.my_phone,
    );
    let proof = bbs::bbs_create_proof(&[&hash_attr, &name_bytes], &[0], &my.ra_signature, &ake_topic);

    let payload_out = AkeResponsePayload {
        dh_pk: dh_pk.as_bytes().to_vec(),
        amf_pk: my.amf_pk.as_bytes().to_vec(),
        expiration: my.en_expiration.clone(),
        proof,
        pke_pk: my.pke_pk.as_bytes().to_vec(),
        dr_pk: my.dr_pk.as_bytes().to_vec(),
    };

    call.ake = Some(AkeState { dh_sk, dh_pk, remote_dh_pk: Some(remote_dh_pk), topic: ake_topic });
    call.set_phase(Phase::AkeOutstanding);

    let payload_bytes = serde_json::to_vec(&payload_out).map_err(va_proto::ProtoError::from)?;
    Ok(ProtocolMessage::new(
        MessageType::AkeResponse,
        call.sender_id.clone(),
        topics::topic_hex(&ake_topic),
        payload_bytes,
    ))
}

/// Session role order used for deterministic key derivation: the caller is
/// always "A", the recipient always "B", regardless of which side is
/// running this code.
fn ordered_dh_pks(call: &CallState, own_pk: PublicKey, remote_pk: PublicKey) -> ([u8; 32], [u8; 32]) {
    if call.is_caller {
        (*own_pk.as_bytes(), *remote_pk.as_bytes())
    } else {
        (*remote_pk.as_bytes(), *own_pk.as_bytes())
    }
}

fn derive_ake_secrets(dh_shared: &[u8; 32], dh_pk_a: &[u8; 32], dh_pk_b: &[u8; 32]) -> Result<([u8; 32], [u8; 32], [u8; 32]), AuthError> {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(dh_pk_a);
    salt.extend_from_slice(dh_pk_b);
    let shared_key = kdf::hkdf32(dh_shared, &salt, b"ake-shared-key")?;
    let dr_seed = kdf::hkdf32(&shared_key, &[0u8; 32], b"ake-dr-key")?;
    let session_id = dh::sha256(&[dh_pk_a, dh_pk_b]);
    Ok((shared_key, dr_seed, session_id))
}

/// The caller's step upon receiving `AKE_RESPONSE`: verify, derive the
/// shared key and Double Ratchet, and build `AKE_COMPLETE`.
pub fn handle_ake_response(my: &SubscriberConfig, call: &mut CallState, msg: &ProtocolMessage) -> Result<ProtocolMessage, AuthError> {
    let payload: AkeResponsePayload = serde_json::from_slice(&msg.payload).map_err(va_proto::ProtoError::from)?;

    let ake = call
        .ake
        .as_ref()
        .ok_or_else(|| AuthError::ProtocolViolation("AKE_RESPONSE with no outstanding AKE_REQUEST".into()))?;
    let ake_topic = ake.topic;

    let expected_hash = attribute_hash(&payload.amf_pk, &payload.pke_pk, &payload.dr_pk, &payload.expiration, &call.dst);
    bbs::bbs_verify_proof(&[0], &[&expected_hash], &my.ra_public_key, &ake_topic, &payload.proof)
        .map_err(AuthError::from)?;

    let remote_dh_pk = x_pk_from_bytes(&payload.dh_pk)?;
    let remote_dr_pk = x_pk_from_bytes(&payload.dr_pk)?;
    let counterpart = CounterpartKeys {
        amf_pk: vk_from_bytes(&payload.amf_pk)?,
        pke_pk: x_pk_from_bytes(&payload.pke_pk)?,
        dr_pk: remote_dr_pk,
    };
    call.counterpart = Some(counterpart);

    let ake = call.ake.as_mut().expect("checked above");
    ake.remote_dh_pk = Some(remote_dh_pk);
    let own_dh_pk = ake.dh_pk;
    let dh_shared = dh::dh_agree(&ake.dh_sk, &remote_dh_pk);

    let (dh_pk_a, dh_pk_b) = ordered_dh_pks(call, own_dh_pk, remote_dh_pk);
    let (shared_key, dr_seed, session_id) = derive_ake_secrets(&dh_shared, &dh_pk_a, &dh_pk_b)?;

    let dr_session = RatchetSession::init_alice(&session_id, &dr_seed, remote_dr_pk)?;

    call.shared_key = Some(shared_key);
    call.dr_session = Some(dr_session);
    call.set_phase(Phase::AkeEstablished);

    let complete = AkeCompletePayload { session_id: hex::encode(session_id) };
    let complete_bytes = serde_json::to_vec(&complete).map_err(va_proto::ProtoError::from)?;
    let counterpart_pke_pk = call.counterpart.as_ref().expect("just set").pke_pk;
    let ciphertext = pke::pke_encrypt(&counterpart_pke_pk, &complete_bytes)?;

    Ok(ProtocolMessage::new(
        MessageType::AkeComplete,
        call.sender_id.clone(),
        topics::topic_hex(&ake_topic),
        ciphertext,
    ))
}

/// The recipient's step upon receiving `AKE_COMPLETE`: derive the same
/// shared key and Double Ratchet as the caller, using our persistent DR
/// keypair as the ratchet's starting point (the caller ratchets forward on
/// first send).
pub fn handle_ake_complete(my: &SubscriberConfig, call: &mut CallState, msg: &ProtocolMessage) -> Result<(), AuthError> {
    let plaintext = pke::pke_decrypt(&my.pke_sk, &msg.payload)?;
    let complete: AkeCompletePayload = serde_json::from_slice(&plaintext).map_err(va_proto::ProtoError::from)?;

    let ake = call
        .ake
        .as_ref()
        .ok_or_else(|| AuthError::ProtocolViolation("AKE_COMPLETE with no outstanding AKE_RESPONSE".into()))?;
    let remote_dh_pk = ake
        .remote_dh_pk
        .ok_or_else(|| AuthError::ProtocolViolation("AKE_COMPLETE before peer DH key was learned".into()))?;
    let own_dh_pk = ake.dh_pk;
    let dh_shared = dh::dh_agree(&ake.dh_sk, &remote_dh_pk);

    let (dh_pk_a, dh_pk_b) = ordered_dh_pks(call, own_dh_pk, remote_dh_pk);
    let (shared_key, dr_seed, session_id) = derive_ake_secrets(&dh_shared, &dh_pk_a, &dh_pk_b)?;

    if hex::encode(session_id) != complete.session_id {
        return Err(AuthError::ProtocolViolation("AKE_COMPLETE session id mismatch".into()));
    }

    let dr_session = RatchetSession::init_bob(&session_id, &dr_seed, my.dr_sk.clone());

    call.shared_key = Some(shared_key);
    call.dr_session = Some(dr_session);
    call.set_phase(Phase::AkeEstablished);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriberConfig;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn credentialed_subscriber(ra_sk: &SigningKey, phone: &str, name: &str) -> SubscriberConfig {
        let amf_sk = SigningKey::generate(&mut OsRng);
        let pke_sk_bytes = rand_bytes32();
        let dr_sk_bytes = rand_bytes32();
        let pke_pk = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(pke_sk_bytes));
        let dr_pk = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(dr_sk_bytes));
        let expiration = b"2099-01-01".to_vec();
        let hash_attr = attribute_hash(amf_sk.verifying_key().as_bytes(), pke_pk.as_bytes(), dr_pk.as_bytes(), &expiration, phone);
        let ra_signature = bbs::bbs_sign(ra_sk, &[&hash_attr, name.as_bytes()]);

        #[derive(serde::Serialize)]
        struct Blob {
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
        let moderator_sk = SigningKey::generate(&mut OsRng);
        let blob = Blob {
            amf_sk: amf_sk.to_bytes(),
            pke_sk: pke_sk_bytes,
            dr_sk: dr_sk_bytes,
            en_expiration: expiration,
            ra_public_key: ra_sk.verifying_key().to_bytes(),
            ra_signature,
            moderator_public_key: moderator_sk.verifying_key().to_bytes(),
            my_name: name.into(),
            tickets: vec![vec![1]],
        };
        let encoded = STANDARD.encode(serde_json::to_vec(&blob).unwrap());
        SubscriberConfig::from_credential_blob(&encoded, phone.into()).unwrap()
    }

    fn rand_bytes32() -> [u8; 32] {
        use rand::RngCore;
        let mut b = [0u8; 32];
        OsRng.fill_bytes(&mut b);
        b
    }

    #[test]
    fn full_ake_handshake_establishes_matching_shared_keys() {
        let ra_sk = SigningKey::generate(&mut OsRng);
        let alice = credentialed_subscriber(&ra_sk, "+15550001", "Alice");
        let bob = credentialed_subscriber(&ra_sk, "+15550002", "Bob");

        let mut caller = CallState::new_outgoing("+15550001".into(), "+15550002".into(), "2026-07-31T14".into(), "s1".into(), vec![]);
        let req = build_ake_request(&alice, &mut caller).unwrap();

        let mut recipient = CallState::new_incoming("+15550001".into(), "+15550002".into(), "2026-07-31T14".into(), "s2".into(), vec![]);
        let resp = handle_ake_request(&bob, &mut recipient, &req).unwrap();

        let complete = handle_ake_response(&alice, &mut caller, &resp).unwrap();
        handle_ake_complete(&bob, &mut recipient, &complete).unwrap();

        assert_eq!(caller.phase, Phase::AkeEstablished);
        assert_eq!(recipient.phase, Phase::AkeEstablished);
        assert_eq!(caller.shared_key, recipient.shared_key);
        assert!(caller.dr_session.is_some());
        assert!(recipient.dr_session.is_some());
    }

    #[test]
    fn ake_request_with_bad_proof_is_rejected() {
        let ra_sk = SigningKey::generate(&mut OsRng);
        let other_ra_sk = SigningKey::generate(&mut OsRng);
        let alice = credentialed_subscriber(&other_ra_sk, "+15550001", "Alice");
        let bob = credentialed_subscriber(&ra_sk, "+15550002", "Bob");

        let mut caller = CallState::new_outgoing("+15550001".into(), "+15550002".into(), "2026-07-31T14".into(), "s1".into(), vec![]);
        let req = build_ake_request(&alice, &mut caller).unwrap();

        let mut recipient = CallState::new_incoming("+15550001".into(), "+15550002".into(), "2026-07-31T14".into(), "s2".into(), vec![]);
        assert!(handle_ake_request(&bob, &mut recipient, &req).is_err());
    }
}
