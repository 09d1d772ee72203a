//! Type-specific payloads carried inside a `ProtocolMessage`, per spec.md
//! §4.6 (AKE) and §4.7 (RUA).
//!
//! Canonical serialisation for the signed/proved subsets (`ddA`, `ddB`, the
//! BBS+ message hash) uses `serde_json::json!` maps rather than struct
//! derives, mirroring `dl_crypto::identity::DeviceCert::issue` — `Value`
//! maps serialise with alphabetically sorted keys, so both sides reproduce
//! byte-identical bytes without hand-rolled canonicalisation.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AkeRequestPayload {
    pub dh_pk: Vec<u8>,
    pub amf_pk: Vec<u8>,
    pub expiration: Vec<u8>,
    pub proof: va_crypto::bbs::SelectiveDisclosureProof,
    pub pke_pk: Vec<u8>,
    pub dr_pk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AkeResponsePayload {
    pub dh_pk: Vec<u8>,
    pub amf_pk: Vec<u8>,
    pub expiration: Vec<u8>,
    pub proof: va_crypto::bbs::SelectiveDisclosureProof,
    pub pke_pk: Vec<u8>,
    pub dr_pk: Vec<u8>,
}

/// AKE_COMPLETE carries no protocol state of its own — it is a PKE-encrypted
/// marker that lets the recipient know the caller reached AkeEstablished.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AkeCompletePayload {
    pub session_id: String,
}

/// The full Right-To-Use credential, exchanged during RUA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rtu {
    pub amf_pk: Vec<u8>,
    pub pke_pk: Vec<u8>,
    pub dr_pk: Vec<u8>,
    pub expiration: Vec<u8>,
    pub ra_signature: Vec<u8>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuaRequestPayload {
    pub dh_pk: Vec<u8>,
    pub topic: String,
    pub reason: String,
    pub rtu: Rtu,
    pub sigma: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuaResponsePayload {
    pub dh_pk: Vec<u8>,
    pub rtu: Rtu,
    pub misc: Vec<u8>,
    pub sigma: Vec<u8>,
}

/// `ddA = serialize(RuaMessage_without_sigma)` for the RUA_REQUEST — the
/// byte string the caller's `sigma` signs over and the one piece of state
/// the response must echo back verbatim.
pub fn canonical_rua_request(dh_pk: &[u8], topic: &str, reason: &str, rtu: &Rtu) -> Result<Vec<u8>, ProtoError> {
    let value = serde_json::json!({
        "dhPk": dh_pk,
        "reason": reason,
        "rtu": rtu,
        "topic": topic,
    });
    Ok(serde_json::to_vec(&value)?)
}

/// `ddB = serialize(reply_without_sigma)` for the RUA_RESPONSE.
pub fn canonical_rua_response(dh_pk: &[u8], rtu: &Rtu, misc: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let value = serde_json::json!({
        "dhPk": dh_pk,
        "misc": misc,
        "rtu": rtu,
    });
    Ok(serde_json::to_vec(&value)?)
}

/// Canonical byte serialization of an `Rtu`, used as the `rtuB` term folded
/// into the post-RUA `sharedKey` update.
pub fn canonical_rtu(rtu: &Rtu) -> Result<Vec<u8>, ProtoError> {
    let value = serde_json::json!({
        "amfPk": rtu.amf_pk,
        "drPk": rtu.dr_pk,
        "expiration": rtu.expiration,
        "name": rtu.name,
        "pkePk": rtu.pke_pk,
        "raSignature": rtu.ra_signature,
    });
    Ok(serde_json::to_vec(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rtu() -> Rtu {
        Rtu {
            amf_pk: vec![1; 32],
            pke_pk: vec![2; 32],
            dr_pk: vec![3; 32],
            expiration: vec![4; 8],
            ra_signature: vec![5; 64],
            name: "Alice".into(),
        }
    }

    #[test]
    fn canonical_rua_request_is_deterministic() {
        let rtu = sample_rtu();
        let a = canonical_rua_request(&[9; 32], "topic-hex", "callback", &rtu).unwrap();
        let b = canonical_rua_request(&[9; 32], "topic-hex", "callback", &rtu).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_rua_request_changes_with_reason() {
        let rtu = sample_rtu();
        let a = canonical_rua_request(&[9; 32], "topic-hex", "callback", &rtu).unwrap();
        let b = canonical_rua_request(&[9; 32], "topic-hex", "verification", &rtu).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_rtu_is_deterministic_and_sensitive_to_name() {
        let rtu = sample_rtu();
        let a = canonical_rtu(&rtu).unwrap();
        let b = canonical_rtu(&rtu).unwrap();
        assert_eq!(a, b);

        let mut renamed = rtu;
        renamed.name = "Mallory".into();
        assert_ne!(a, canonical_rtu(&renamed).unwrap());
    }
}
