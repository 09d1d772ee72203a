//! Per-call protocol state machine, per spec.md §4.3 and §5.
//!
//! `CallState` owns everything that is scoped to a single call attempt:
//! the current phase, the AKE/RUA working material, and the negotiated
//! shared key and Double Ratchet session once established. `AuthService`
//! holds at most one `CallState` at a time (single-writer invariant).

use ed25519_dalek::VerifyingKey;
use x25519_dalek::{PublicKey, StaticSecret};

use va_crypto::ratchet::RatchetSession;
use va_proto::payloads::Rtu;

/// Protocol phases per spec.md §5. Transitions only move forward, except
/// into `Failed`/`Closed` which are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    AkeOutstanding,
    AkeEstablished,
    RuaOutstanding,
    Verified,
    Failed,
    Closed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Failed | Phase::Closed)
    }
}

/// Working material for an in-flight AKE exchange.
pub struct AkeState {
    pub dh_sk: StaticSecret,
    pub dh_pk: PublicKey,
    /// The counterpart's ephemeral AKE DH public key, learned from whichever
    /// of AKE_REQUEST/AKE_RESPONSE we received.
    pub remote_dh_pk: Option<PublicKey>,
    pub topic: [u8; 32],
}

/// Working material for an in-flight RUA exchange.
pub struct RuaState {
    pub dh_sk: StaticSecret,
    pub dh_pk: PublicKey,
    pub topic: [u8; 32],
    pub rtu: Rtu,
    /// `ddA` from our own request, retained so `rua_finalize` can byte-compare
    /// it against the responder's echoed `misc` field.
    pub last_outbound_request: Option<Vec<u8>>,
    /// `sigmaA`, our own signature over `ddA`, retained for the post-RUA
    /// `sharedKey` update.
    pub sigma: Vec<u8>,
}

/// The counterpart's long-lived public keys, learned during AKE and reused
/// for RUA-phase signature verification.
#[derive(Clone)]
pub struct CounterpartKeys {
    pub amf_pk: VerifyingKey,
    pub pke_pk: PublicKey,
    pub dr_pk: PublicKey,
}

/// Result of a successful RUA exchange: the verified identity of the other
/// party, surfaced to `onProtocolComplete`.
#[derive(Debug, Clone)]
pub struct RemoteParty {
    pub phone: String,
    pub name: String,
    pub verified: bool,
}

/// All state scoped to one call attempt.
pub struct CallState {
    pub is_caller: bool,
    pub src: String,
    pub dst: String,
    pub ts: String,
    pub sender_id: String,
    pub call_reason: String,
    pub ticket: Vec<u8>,

    pub phase: Phase,
    pub current_topic: [u8; 32],

    pub ake: Option<AkeState>,
    pub rua: Option<RuaState>,

    pub shared_key: Option<[u8; 32]>,
    pub counterpart: Option<CounterpartKeys>,
    pub dr_session: Option<RatchetSession>,
    pub remote_party: Option<RemoteParty>,
}

impl CallState {
    pub fn new_outgoing(src: String, dst: String, ts: String, sender_id: String, ticket: Vec<u8>) -> Self {
        let ake_topic = va_proto::topics::ake_topic(&src, &ts);
        Self {
            is_caller: true,
            src,
            dst,
            ts,
            sender_id,
            call_reason: String::new(),
            ticket,
            phase: Phase::Init,
            current_topic: ake_topic,
            ake: None,
            rua: None,
            shared_key: None,
            counterpart: None,
            dr_session: None,
            remote_party: None,
        }
    }

    pub fn new_incoming(src: String, dst: String, ts: String, sender_id: String, ticket: Vec<u8>) -> Self {
        let ake_topic = va_proto::topics::ake_topic(&src, &ts);
        Self {
            is_caller: false,
            src,
            dst,
            ts,
            sender_id,
            call_reason: String::new(),
            ticket,
            phase: Phase::Init,
            current_topic: ake_topic,
            ake: None,
            rua: None,
            shared_key: None,
            counterpart: None,
            dr_session: None,
            remote_party: None,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "call phase transition");
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_outgoing_starts_in_init_with_ake_topic() {
        let cs = CallState::new_outgoing("+1555".into(), "+1666".into(), "2026-07-31T14".into(), "s1".into(), vec![]);
        assert_eq!(cs.phase, Phase::Init);
        assert_eq!(cs.current_topic, va_proto::topics::ake_topic("+1555", "2026-07-31T14"));
        assert!(cs.is_caller);
    }

    #[test]
    fn terminal_phases_are_recognised() {
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Closed.is_terminal());
        assert!(!Phase::Verified.is_terminal());
    }
}
