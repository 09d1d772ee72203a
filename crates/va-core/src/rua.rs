//! Right-To-Use Authentication, per spec.md §4.7.
//!
//! Runs entirely inside the Double Ratchet established during AKE. Each
//! side discloses its full RTU credential (no selective disclosure here —
//! the counterpart's identity is the point), signs its request/response
//! body with AMF so a judge can later adjudicate a disputed call, and both
//! sides fold the exchange into a fresh `sharedKey` so a replayed RUA from
//! an earlier call can never validate against the current one.

use ed25519_dalek::{Signer, VerifyingKey};

use va_crypto::{amf::Ed25519AmfFranking, amf::ModeratedSignatureScheme, bbs, dh};
use va_proto::payloads::{canonical_rtu, canonical_rua_request, canonical_rua_response, Rtu, RuaRequestPayload, RuaResponsePayload};
use va_proto::ratchet_message::DrMessage;
use va_proto::topics;
use va_proto::{MessageType, ProtocolMessage};

use crate::config::SubscriberConfig;
use crate::error::AuthError;
use crate::state::{CallState, Phase, RemoteParty, RuaState};

fn rtu_for(my: &SubscriberConfig) -> Rtu {
    Rtu {
        amf_pk: my.amf_pk.as_bytes().to_vec(),
        pke_pk: my.pke_pk.as_bytes().to_vec(),
        dr_pk: my.dr_pk.as_bytes().to_vec(),
        expiration: my.en_expiration.clone(),
        ra_signature: my.ra_signature.clone(),
        name: my.my_name.clone(),
    }
}

fn verify_rtu(ra_pk: &VerifyingKey, rtu: &Rtu, phone: &str) -> Result<(), AuthError> {
    let hash_attr = dh::sha256(&[&rtu.amf_pk, &rtu.pke_pk, &rtu.dr_pk, &rtu.expiration, phone.as_bytes()]);
    bbs::bbs_verify(ra_pk, &rtu.ra_signature, &[&hash_attr, rtu.name.as_bytes()]).map_err(AuthError::from)
}

fn ratchet_encrypt(call: &mut CallState, aad: &[u8], plaintext: &[u8]) -> Result<DrMessage, AuthError> {
    let dr = call
        .dr_session
        .as_mut()
        .ok_or_else(|| AuthError::ProtocolViolation("RUA step before Double Ratchet is established".into()))?;
    let (header, ciphertext) = dr.encrypt_step(aad, plaintext)?;
    Ok(DrMessage { header, ciphertext })
}

fn ratchet_decrypt(call: &mut CallState, msg: &DrMessage, aad: &[u8]) -> Result<Vec<u8>, AuthError> {
    let dr = call
        .dr_session
        .as_mut()
        .ok_or_else(|| AuthError::ProtocolViolation("RUA step before Double Ratchet is established".into()))?;
    Ok(dr.decrypt_step(&msg.header, aad, &msg.ciphertext)?)
}

/// Update `sharedKey` to `H(ddA ‖ dhPkB' ‖ rtuB ‖ sigmaA ‖ sigmaB ‖ secret)`
/// after the RUA exchange, per spec.md §4.7. Both sides build this byte
/// string in the same argument order, so caller and responder land on the
/// same `sharedKey` without ever exchanging it directly — a stale RUA
/// exchange from a prior session can never be replayed against the call
/// currently in progress.
fn ratchet_shared_key(
    call: &mut CallState,
    dd_a: &[u8],
    dh_pk_b: &[u8],
    rtu_b: &Rtu,
    sigma_a: &[u8],
    sigma_b: &[u8],
    secret: &[u8; 32],
) -> Result<(), AuthError> {
    let rtu_b_bytes = canonical_rtu(rtu_b)?;
    call.shared_key = Some(dh::sha256(&[dd_a, dh_pk_b, &rtu_b_bytes, sigma_a, sigma_b, secret]));
    Ok(())
}

/// The caller's entry point: build `RUA_REQUEST` and move into
/// `RuaOutstanding`.
pub fn build_rua_request(my: &SubscriberConfig, call: &mut CallState, reason: &str) -> Result<ProtocolMessage, AuthError> {
    let shared_key = call
        .shared_key
        .ok_or_else(|| AuthError::ProtocolViolation("RUA_REQUEST before AKE established a sharedKey".into()))?;
    let rua_topic = topics::rua_topic(&shared_key, &call.src, &call.dst, &call.ts);

    let (dh_sk, dh_pk) = dh::dh_keygen();
    let rtu = rtu_for(my);
    let topic_hex_str = topics::topic_hex(&rua_topic);

    let dd_a = canonical_rua_request(dh_pk.as_bytes(), &topic_hex_str, reason, &rtu)?;
    let sigma = my.amf_sk.sign(&dd_a).to_bytes().to_vec();

    let payload = RuaRequestPayload {
        dh_pk: dh_pk.as_bytes().to_vec(),
        topic: topic_hex_str.clone(),
        reason: reason.to_string(),
        rtu,
        sigma: sigma.clone(),
    };
    let payload_bytes = serde_json::to_vec(&payload).map_err(va_proto::ProtoError::from)?;
    let dr_msg = ratchet_encrypt(call, payload_bytes_aad(&rua_topic).as_slice(), &payload_bytes)?;
    let wire = serde_json::to_vec(&dr_msg).map_err(va_proto::ProtoError::from)?;

    call.rua = Some(RuaState {
        dh_sk,
        dh_pk,
        topic: rua_topic,
        rtu: payload.rtu.clone(),
        last_outbound_request: Some(dd_a),
        sigma,
    });
    call.current_topic = rua_topic;
    call.call_reason = reason.to_string();
    call.set_phase(Phase::RuaOutstanding);

    Ok(ProtocolMessage::new(MessageType::RuaRequest, call.sender_id.clone(), topic_hex_str, wire))
}

fn payload_bytes_aad(rua_topic: &[u8; 32]) -> [u8; 32] {
    *rua_topic
}

/// The recipient's entry point: decrypt and verify `RUA_REQUEST`, then
/// build `RUA_RESPONSE`. Produces a `RemoteParty` once the exchange
/// completes.
pub fn handle_rua_request(my: &SubscriberConfig, call: &mut CallState, msg: &ProtocolMessage) -> Result<ProtocolMessage, AuthError> {
    let shared_key = call
        .shared_key
        .ok_or_else(|| AuthError::ProtocolViolation("RUA_REQUEST before AKE established a sharedKey".into()))?;
    let rua_topic = topics::rua_topic(&shared_key, &call.src, &call.dst, &call.ts);

    let dr_msg: DrMessage = serde_json::from_slice(&msg.payload).map_err(va_proto::ProtoError::from)?;
    let plaintext = ratchet_decrypt(call, &dr_msg, payload_bytes_aad(&rua_topic).as_slice())?;
    let payload: RuaRequestPayload = serde_json::from_slice(&plaintext).map_err(va_proto::ProtoError::from)?;

    verify_rtu(&my.ra_public_key, &payload.rtu, &call.src)?;

    let counterpart_amf_pk = VerifyingKey::from_bytes(&payload.rtu.amf_pk.clone().try_into().map_err(|_| {
        AuthError::ProtocolViolation("RTU amfPk must be 32 bytes".into())
    })?)
    .map_err(|_| AuthError::ProtocolViolation("malformed RTU amfPk".into()))?;

    let dd_a = canonical_rua_request(&payload.dh_pk, &payload.topic, &payload.reason, &payload.rtu)?;
    let scheme = Ed25519AmfFranking;
    scheme
        .amf_verify(&counterpart_amf_pk, &my.amf_pk, &my.moderator_public_key, &dd_a, &payload.sigma)
        .map_err(AuthError::from)?;

    let remote_dh_pk = dh::public_from_bytes(&payload.dh_pk).map_err(|_| AuthError::ProtocolViolation("malformed dhPk in RUA_REQUEST".into()))?;
    let (dh_sk, dh_pk) = dh::dh_keygen();
    let dh_shared = dh::dh_agree(&dh_sk, &remote_dh_pk);

    let rtu = rtu_for(my);
    let misc = dd_a.clone();
    let dd_b = canonical_rua_response(dh_pk.as_bytes(), &rtu, &misc)?;
    let sigma_b = my.amf_sk.sign(&dd_b).to_bytes().to_vec();

    ratchet_shared_key(call, &dd_a, dh_pk.as_bytes(), &rtu, &payload.sigma, &sigma_b, &dh_shared)?;

    let response = RuaResponsePayload { dh_pk: dh_pk.as_bytes().to_vec(), rtu, misc, sigma: sigma_b };
    let response_bytes = serde_json::to_vec(&response).map_err(va_proto::ProtoError::from)?;
    let dr_msg_out = ratchet_encrypt(call, payload_bytes_aad(&rua_topic).as_slice(), &response_bytes)?;
    let wire = serde_json::to_vec(&dr_msg_out).map_err(va_proto::ProtoError::from)?;

    call.current_topic = rua_topic;
    call.remote_party = Some(RemoteParty { phone: call.src.clone(), name: payload.rtu.name.clone(), verified: true });
    call.set_phase(Phase::Verified);

    Ok(ProtocolMessage::new(MessageType::RuaResponse, call.sender_id.clone(), topics::topic_hex(&rua_topic), wire))
}

/// The caller's step upon receiving `RUA_RESPONSE`: verify `misc` echoes
/// `ddA` byte-for-byte, verify the counterpart's AMF tag, and finish.
pub fn handle_rua_response(my: &SubscriberConfig, call: &mut CallState, msg: &ProtocolMessage) -> Result<(), AuthError> {
    let rua = call
        .rua
        .as_ref()
        .ok_or_else(|| AuthError::ProtocolViolation("RUA_RESPONSE with no outstanding RUA_REQUEST".into()))?;
    let rua_topic = rua.topic;
    let dd_a = rua
        .last_outbound_request
        .clone()
        .ok_or_else(|| AuthError::ProtocolViolation("missing outbound ddA for RUA_RESPONSE check".into()))?;
    let sigma_a = rua.sigma.clone();

    let dr_msg: DrMessage = serde_json::from_slice(&msg.payload).map_err(va_proto::ProtoError::from)?;
    let plaintext = ratchet_decrypt(call, &dr_msg, payload_bytes_aad(&rua_topic).as_slice())?;
    let payload: RuaResponsePayload = serde_json::from_slice(&plaintext).map_err(va_proto::ProtoError::from)?;

    if payload.misc != dd_a {
        return Err(AuthError::ProtocolViolation("RUA_RESPONSE misc did not echo our ddA".into()));
    }

    verify_rtu(&my.ra_public_key, &payload.rtu, &call.dst)?;

    let counterpart_amf_pk = VerifyingKey::from_bytes(&payload.rtu.amf_pk.clone().try_into().map_err(|_| {
        AuthError::ProtocolViolation("RTU amfPk must be 32 bytes".into())
    })?)
    .map_err(|_| AuthError::ProtocolViolation("malformed RTU amfPk".into()))?;

    let dd_b = canonical_rua_response(&payload.dh_pk, &payload.rtu, &payload.misc)?;
    let scheme = Ed25519AmfFranking;
    scheme
        .amf_verify(&counterpart_amf_pk, &my.amf_pk, &my.moderator_public_key, &dd_b, &payload.sigma)
        .map_err(AuthError::from)?;

    let remote_dh_pk = dh::public_from_bytes(&payload.dh_pk).map_err(|_| AuthError::ProtocolViolation("malformed dhPk in RUA_RESPONSE".into()))?;
    let own_dh_sk_bytes = {
        let rua = call.rua.as_ref().expect("checked above");
        dh::dh_agree(&rua.dh_sk, &remote_dh_pk)
    };

    ratchet_shared_key(call, &dd_a, &payload.dh_pk, &payload.rtu, &sigma_a, &payload.sigma, &own_dh_sk_bytes)?;
    call.remote_party = Some(RemoteParty { phone: call.dst.clone(), name: payload.rtu.name.clone(), verified: true });
    call.set_phase(Phase::Verified);
    Ok(())
}
