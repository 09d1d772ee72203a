//! End-to-end scenarios driving two `AuthService`s over a shared
//! `LoopbackHub`, exercising the whole AKE → RUA flow through the public
//! API rather than the individual module functions (those are covered by
//! the per-module unit tests in `ake.rs`/`rua.rs`).

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use va_core::{AuthService, SubscriberConfig};
use va_relay::{LoopbackHub, LoopbackTransport, RelayClient};

#[derive(Serialize)]
struct CredentialBlob {
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

fn rand_bytes32() -> [u8; 32] {
    let mut b = [0u8; 32];
    OsRng.fill_bytes(&mut b);
    b
}

/// Builds a subscriber whose RTU credential is signed by `ra_sk`, mirroring
/// what the enrollment flow would have produced.
fn credentialed_subscriber(ra_sk: &SigningKey, moderator_pk: [u8; 32], phone: &str, name: &str) -> SubscriberConfig {
    let amf_sk = SigningKey::generate(&mut OsRng);
    let pke_sk_bytes = rand_bytes32();
    let dr_sk_bytes = rand_bytes32();
    let pke_pk = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(pke_sk_bytes));
    let dr_pk = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(dr_sk_bytes));
    let expiration = b"2099-01-01".to_vec();
    let hash_attr = va_crypto::dh::sha256(&[amf_sk.verifying_key().as_bytes(), pke_pk.as_bytes(), dr_pk.as_bytes(), &expiration, phone.as_bytes()]);
    let ra_signature = va_crypto::bbs::bbs_sign(ra_sk, &[&hash_attr, name.as_bytes()]);

    let blob = CredentialBlob {
        amf_sk: amf_sk.to_bytes(),
        pke_sk: pke_sk_bytes,
        dr_sk: dr_sk_bytes,
        en_expiration: expiration,
        ra_public_key: ra_sk.verifying_key().to_bytes(),
        ra_signature,
        moderator_public_key: moderator_pk,
        my_name: name.into(),
        tickets: vec![vec![1], vec![2], vec![3]],
    };
    let encoded = STANDARD.encode(serde_json::to_vec(&blob).unwrap());
    SubscriberConfig::from_credential_blob(&encoded, phone.into()).unwrap()
}

fn service_for(hub: &Arc<LoopbackHub>, config: SubscriberConfig) -> Arc<AuthService> {
    let client = RelayClient::new(Arc::new(LoopbackTransport::new(hub.clone())));
    AuthService::new(Arc::new(config), client)
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_outgoing_call_reaches_verified_on_both_sides() {
    let ra_sk = SigningKey::generate(&mut OsRng);
    let moderator_sk = SigningKey::generate(&mut OsRng);
    let moderator_pk = moderator_sk.verifying_key().to_bytes();

    let alice_phone = "+15550001";
    let bob_phone = "+15550002";
    let alice = credentialed_subscriber(&ra_sk, moderator_pk, alice_phone, "Alice");
    let bob = credentialed_subscriber(&ra_sk, moderator_pk, bob_phone, "Bob");

    let hub = LoopbackHub::new();
    let alice_service = service_for(&hub, alice);
    let bob_service = service_for(&hub, bob);

    let bob_task = tokio::spawn(async move { bob_service.handle_incoming(alice_phone).await });

    // Give the recipient a moment to subscribe before the caller publishes
    // AKE_REQUEST, matching how the real relay's replay buffer smooths over
    // this race (spec.md §4.2); not load-bearing for correctness since the
    // loopback hub replays recent publishes to late subscribers too.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let ready_clone = ready.clone();
    let alice_result = alice_service
        .start_outgoing(bob_phone, "callback-verification", move || {
            ready_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .await;

    let bob_result = bob_task.await.unwrap();

    let alice_remote = alice_result.expect("alice should verify bob");
    let bob_remote = bob_result.expect("bob should verify alice");

    assert!(ready.load(std::sync::atomic::Ordering::SeqCst), "on_ready_to_call should fire once AKE completes");
    assert_eq!(alice_remote.name, "Bob");
    assert_eq!(alice_remote.phone, bob_phone);
    assert!(alice_remote.verified);
    assert_eq!(bob_remote.name, "Alice");
    assert_eq!(bob_remote.phone, alice_phone);
    assert!(bob_remote.verified);
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatched_registration_authority_fails_the_handshake_on_both_sides() {
    let alice_ra_sk = SigningKey::generate(&mut OsRng);
    let bob_ra_sk = SigningKey::generate(&mut OsRng);
    let moderator_sk = SigningKey::generate(&mut OsRng);
    let moderator_pk = moderator_sk.verifying_key().to_bytes();

    let alice_phone = "+15550003";
    let bob_phone = "+15550004";
    // Alice's credential is signed by a different RA key than the one Bob
    // trusts, so Bob must reject her AKE_REQUEST proof outright.
    let alice = credentialed_subscriber(&alice_ra_sk, moderator_pk, alice_phone, "Alice");
    let bob = credentialed_subscriber(&bob_ra_sk, moderator_pk, bob_phone, "Bob");

    let hub = LoopbackHub::new();
    let alice_service = service_for(&hub, alice);
    let bob_service = service_for(&hub, bob);

    let bob_task = tokio::spawn(async move { bob_service.handle_incoming(alice_phone).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let alice_result = alice_service.start_outgoing(bob_phone, "callback-verification", || {}).await;
    let bob_result = bob_task.await.unwrap();

    assert!(alice_result.is_err());
    assert!(bob_result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_call_attempt_is_rejected_while_busy() {
    let ra_sk = SigningKey::generate(&mut OsRng);
    let moderator_sk = SigningKey::generate(&mut OsRng);
    let moderator_pk = moderator_sk.verifying_key().to_bytes();

    let alice_phone = "+15550005";
    let alice = credentialed_subscriber(&ra_sk, moderator_pk, alice_phone, "Alice");

    let hub = LoopbackHub::new();
    let alice_service = service_for(&hub, alice);

    // Nobody answers this first call; it will eventually time out on its
    // own, but we only care that it has claimed the busy lock.
    let first = {
        let svc = alice_service.clone();
        tokio::spawn(async move { svc.start_outgoing("+15559999", "callback-verification", || {}).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = alice_service.start_outgoing("+15558888", "callback-verification", || {}).await;
    assert!(matches!(second, Err(va_core::AuthError::ProtocolViolation(_))));

    first.abort();
}
