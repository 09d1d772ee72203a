//! CLI harness for the per-call voice authentication core. Not part of the
//! authentication core itself — it exists so the workspace produces a
//! runnable artifact, the way `guard-cli` does for `guard-core`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use va_core::{AuthService, SubscriberConfig};
use va_relay::{LoopbackHub, LoopbackTransport, RelayClient, WebSocketTransport};

#[derive(Parser)]
#[command(name = "va-cli")]
#[command(about = "Per-call voice authentication core CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place an outgoing call's handshake to `dst`, connecting to the
    /// relay named by RELAY_HOST/RELAY_PORT/RELAY_TLS.
    Call {
        dst: String,
        #[arg(long, default_value = "callback-verification")]
        reason: String,
    },
    /// Wait for and answer one incoming call's handshake from `src`.
    Listen { src: String },
    /// Run both sides of a handshake in-process over a loopback relay, for
    /// local smoke testing without a real relay or enrolled credentials.
    Demo {
        #[arg(long, default_value = "+15550001")]
        caller_phone: String,
        #[arg(long, default_value = "+15550002")]
        recipient_phone: String,
    },
}

fn relay_client_from_env() -> RelayClient {
    let host = std::env::var("RELAY_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("RELAY_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(7443);
    let tls = std::env::var("RELAY_TLS").map(|v| v == "true").unwrap_or(false);
    RelayClient::new(Arc::new(WebSocketTransport::new(&host, port, tls)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Call { dst, reason } => {
            let config = Arc::new(SubscriberConfig::from_env().context("loading subscriber configuration")?);
            let service = AuthService::new(config, relay_client_from_env());
            let remote = service
                .start_outgoing(&dst, &reason, || tracing::info!("AKE complete, safe to bridge the telephony leg"))
                .await
                .context("voice authentication handshake failed")?;
            println!("verified counterpart: {} ({})", remote.name, remote.phone);
            Ok(())
        }
        Commands::Listen { src } => {
            let config = Arc::new(SubscriberConfig::from_env().context("loading subscriber configuration")?);
            let service = AuthService::new(config, relay_client_from_env());
            let remote = service.handle_incoming(&src).await.context("voice authentication handshake failed")?;
            println!("verified counterpart: {} ({})", remote.name, remote.phone);
            Ok(())
        }
        Commands::Demo { caller_phone, recipient_phone } => run_demo(caller_phone, recipient_phone).await,
    }
}

/// Builds two enrolled-looking subscribers sharing a trust root, wires them
/// to the same in-process relay, and runs one handshake end to end — a
/// sanity check that doesn't need a real relay deployment or enrollment
/// flow.
async fn run_demo(caller_phone: String, recipient_phone: String) -> Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use rand::RngCore;
    use serde::Serialize;

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

    fn rand32() -> [u8; 32] {
        let mut b = [0u8; 32];
        OsRng.fill_bytes(&mut b);
        b
    }

    fn enrolled(ra_sk: &SigningKey, moderator_pk: [u8; 32], phone: &str, name: &str) -> SubscriberConfig {
        let amf_sk = SigningKey::generate(&mut OsRng);
        let pke_sk = rand32();
        let dr_sk = rand32();
        let pke_pk = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(pke_sk));
        let dr_pk = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(dr_sk));
        let expiration = b"2099-01-01".to_vec();
        let amf_pk = amf_sk.verifying_key();
        let hash_attr = va_crypto::dh::sha256(&[amf_pk.as_bytes(), pke_pk.as_bytes(), dr_pk.as_bytes(), &expiration, phone.as_bytes()]);
        let ra_signature = va_crypto::bbs::bbs_sign(ra_sk, &[&hash_attr, name.as_bytes()]);
        let blob = CredentialBlob {
            amf_sk: amf_sk.to_bytes(),
            pke_sk,
            dr_sk,
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

    let ra_sk = SigningKey::generate(&mut OsRng);
    let moderator_sk = SigningKey::generate(&mut OsRng);
    let moderator_pk = moderator_sk.verifying_key().to_bytes();

    let caller = enrolled(&ra_sk, moderator_pk, &caller_phone, "Alice");
    let recipient = enrolled(&ra_sk, moderator_pk, &recipient_phone, "Bob");

    let hub = LoopbackHub::new();
    let caller_service = AuthService::new(Arc::new(caller), RelayClient::new(Arc::new(LoopbackTransport::new(hub.clone()))));
    let recipient_service = AuthService::new(Arc::new(recipient), RelayClient::new(Arc::new(LoopbackTransport::new(hub))));

    let recipient_src = caller_phone.clone();
    let listener = tokio::spawn(async move { recipient_service.handle_incoming(&recipient_src).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let caller_result = caller_service
        .start_outgoing(&recipient_phone, "callback-verification", || println!("AKE established, bridging telephony leg"))
        .await;
    let recipient_result = listener.await.context("recipient task panicked")?;

    let caller_remote = caller_result.context("caller failed to verify recipient")?;
    let recipient_remote = recipient_result.context("recipient failed to verify caller")?;

    println!("caller verified: {} ({})", caller_remote.name, caller_remote.phone);
    println!("recipient verified: {} ({})", recipient_remote.name, recipient_remote.phone);
    Ok(())
}
