//! `AuthService` — single-call orchestrator, per spec.md §4.5.
//!
//! Grounded on `guard_service::connected::run_connected`'s
//! config/client/state-machine/`tokio::select!` shape, adapted from a
//! long-lived connected-mode loop into a bounded per-call protocol run: one
//! `CallState` drives to `Verified`/`Failed` within the 15-second protocol
//! timeout, then the service is idle again until the next call.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use va_proto::relay_frame::RelayMessage;
use va_proto::{MessageType, ProtocolMessage};
use va_relay::RelayClient;

use crate::ake;
use crate::config::SubscriberConfig;
use crate::error::AuthError;
use crate::oob::OobController;
use crate::rua;
use crate::state::{CallState, Phase, RemoteParty};

const BYE_GRACE: Duration = Duration::from_millis(100);

/// `PROTOCOL_TIMEOUT_MS` overrides the default 15s bound a single call is
/// allowed to spend in AKE/RUA before it's declared failed.
fn protocol_timeout() -> Duration {
    match std::env::var("PROTOCOL_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
        Some(ms) => Duration::from_millis(ms),
        None => Duration::from_secs(15),
    }
}

/// Current UTC-hour bucket, the shared clock both call legs independently
/// derive the AKE topic from without any prior coordination.
fn current_ts_bucket() -> String {
    Utc::now().format("%Y-%m-%dT%H").to_string()
}

/// Owns the subscriber's identity and relay client; enforces that at most
/// one call is in flight at a time.
pub struct AuthService {
    config: Arc<SubscriberConfig>,
    client: RelayClient,
    busy: AsyncMutex<()>,
}

impl AuthService {
    pub fn new(config: Arc<SubscriberConfig>, client: RelayClient) -> Arc<Self> {
        Arc::new(Self { config, client, busy: AsyncMutex::new(()) })
    }

    /// Place an outgoing call's voice-authentication handshake to `dst`.
    /// `on_ready_to_call` fires immediately after `AKE_REQUEST` is
    /// published, typically before any response — it signals only that the
    /// protocol has started, not that the counterpart has been verified;
    /// the function itself resolves with the verified counterpart once RUA
    /// completes, or an error.
    pub async fn start_outgoing(
        self: &Arc<Self>,
        dst: &str,
        reason: &str,
        on_ready_to_call: impl FnOnce() + Send + 'static,
    ) -> Result<RemoteParty, AuthError> {
        let _guard = self
            .busy
            .try_lock()
            .map_err(|_| AuthError::ProtocolViolation("a call is already in progress".into()))?;

        let sender_id = uuid::Uuid::new_v4().to_string();
        let ts = current_ts_bucket();
        let ticket = self.config.next_ticket();
        let mut call = CallState::new_outgoing(self.config.my_phone.clone(), dst.to_string(), ts, sender_id, ticket);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut oob = OobController::new(self.client.clone());
        self.subscribe_for(&mut oob, &call, tx.clone());

        let request = ake::build_ake_request(&self.config, &mut call)?;
        self.publish(&mut oob, &call, &request).await?;
        on_ready_to_call();

        let result = self.drive_caller(&mut call, &mut oob, &mut rx, &tx, reason).await;
        self.cleanup(&mut call, &mut oob).await;
        result
    }

    /// Respond to an incoming call's voice-authentication handshake
    /// initiated by `src`.
    pub async fn handle_incoming(self: &Arc<Self>, src: &str) -> Result<RemoteParty, AuthError> {
        let _guard = self
            .busy
            .try_lock()
            .map_err(|_| AuthError::ProtocolViolation("a call is already in progress".into()))?;

        let sender_id = uuid::Uuid::new_v4().to_string();
        let ts = current_ts_bucket();
        let ticket = self.config.next_ticket();
        let mut call = CallState::new_incoming(src.to_string(), self.config.my_phone.clone(), ts, sender_id, ticket);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut oob = OobController::new(self.client.clone());
        self.subscribe_for(&mut oob, &call, tx.clone());

        let result = self.drive_recipient(&mut call, &mut oob, &mut rx, &tx).await;
        self.cleanup(&mut call, &mut oob).await;
        result
    }

    fn subscribe_for(&self, oob: &mut OobController, call: &CallState, tx: mpsc::UnboundedSender<ProtocolMessage>) {
        let sender_id = call.sender_id.clone();
        let config = self.config.clone();
        let handler_sender_id = sender_id.clone();
        let on_frame = Arc::new(move |frame: RelayMessage| {
            if let Ok(msg) = serde_json::from_slice::<ProtocolMessage>(&frame.payload) {
                if msg.sender_id != handler_sender_id {
                    let _ = tx.send(msg);
                }
            }
        });
        let ticket_supplier = Arc::new(move || config.next_ticket());
        oob.subscribe(&call.current_topic, ticket_supplier, on_frame, sender_id);
    }

    async fn publish(&self, oob: &mut OobController, call: &CallState, msg: &ProtocolMessage) -> Result<(), AuthError> {
        let bytes = serde_json::to_vec(msg).map_err(va_proto::ProtoError::from)?;
        oob.publish_to_topic(&call.current_topic, bytes, None).await
    }

    async fn drive_caller(
        &self,
        call: &mut CallState,
        oob: &mut OobController,
        rx: &mut mpsc::UnboundedReceiver<ProtocolMessage>,
        tx: &mpsc::UnboundedSender<ProtocolMessage>,
        reason: &str,
    ) -> Result<RemoteParty, AuthError> {
        let deadline = Instant::now() + protocol_timeout();

        loop {
            let msg = recv_until(rx, deadline).await?;
            let outcome = dispatch(&self.config, call, msg)?;

            if let Some(reply) = outcome {
                match reply.msg_type {
                    MessageType::AkeComplete => {
                        self.publish(oob, call, &reply).await?;
                        let rua_request = rua::build_rua_request(&self.config, call, reason)?;
                        let rua_topic = call.current_topic;
                        let config = self.config.clone();
                        let sender_id = call.sender_id.clone();
                        let tx_for_swap = tx.clone();
                        let on_frame = Arc::new(move |frame: RelayMessage| {
                            if let Ok(parsed) = serde_json::from_slice::<ProtocolMessage>(&frame.payload) {
                                if parsed.sender_id != sender_id {
                                    let _ = tx_for_swap.send(parsed);
                                }
                            }
                        });
                        let ticket_supplier = Arc::new(move || config.next_ticket());
                        let bytes = serde_json::to_vec(&rua_request).map_err(va_proto::ProtoError::from)?;
                        oob.swap_to_topic(&rua_topic, Some(bytes), ticket_supplier, on_frame).await?;
                    }
                    _ => {
                        self.publish(oob, call, &reply).await?;
                    }
                }
            }

            if call.phase == Phase::Verified {
                return call
                    .remote_party
                    .clone()
                    .ok_or_else(|| AuthError::ProtocolViolation("Verified with no RemoteParty recorded".into()));
            }
            if call.phase == Phase::Failed {
                return Err(AuthError::ProtocolViolation("call failed".into()));
            }
        }
    }

    async fn drive_recipient(
        &self,
        call: &mut CallState,
        oob: &mut OobController,
        rx: &mut mpsc::UnboundedReceiver<ProtocolMessage>,
        tx: &mpsc::UnboundedSender<ProtocolMessage>,
    ) -> Result<RemoteParty, AuthError> {
        let deadline = Instant::now() + protocol_timeout();

        loop {
            let msg = recv_until(rx, deadline).await?;
            let phase_before_dispatch = call.phase;
            let outcome = dispatch(&self.config, call, msg)?;

            if let Some(reply) = outcome {
                self.publish(oob, call, &reply).await?;
            }

            if call.phase == Phase::AkeEstablished && phase_before_dispatch != Phase::AkeEstablished {
                let shared_key = call
                    .shared_key
                    .ok_or_else(|| AuthError::ProtocolViolation("AkeEstablished without sharedKey".into()))?;
                let rua_topic = va_proto::topics::rua_topic(&shared_key, &call.src, &call.dst, &call.ts);
                let config = self.config.clone();
                let sender_id = call.sender_id.clone();
                let tx_for_swap = tx.clone();
                let on_frame = Arc::new(move |frame: RelayMessage| {
                    if let Ok(parsed) = serde_json::from_slice::<ProtocolMessage>(&frame.payload) {
                        if parsed.sender_id != sender_id {
                            let _ = tx_for_swap.send(parsed);
                        }
                    }
                });
                let ticket_supplier = Arc::new(move || config.next_ticket());
                oob.swap_to_topic(&rua_topic, None, ticket_supplier, on_frame).await?;
                call.current_topic = rua_topic;
            }

            if call.phase == Phase::Verified {
                return call
                    .remote_party
                    .clone()
                    .ok_or_else(|| AuthError::ProtocolViolation("Verified with no RemoteParty recorded".into()));
            }
            if call.phase == Phase::Failed {
                return Err(AuthError::ProtocolViolation("call failed".into()));
            }
        }
    }

    /// Best-effort BYE, then tear down the OOB subscription and heartbeat.
    async fn cleanup(&self, call: &mut CallState, oob: &mut OobController) {
        if !call.phase.is_terminal() {
            let bye = ProtocolMessage::new(MessageType::Bye, call.sender_id.clone(), va_proto::topics::topic_hex(&call.current_topic), Vec::new());
            if let Ok(bytes) = serde_json::to_vec(&bye) {
                let _ = tokio::time::timeout(BYE_GRACE, oob.publish_to_topic(&call.current_topic, bytes, None)).await;
            }
        }
        call.set_phase(Phase::Closed);
        oob.close();
        info!(call_id = %call.sender_id, "call cleanup complete");
    }
}

async fn recv_until(rx: &mut mpsc::UnboundedReceiver<ProtocolMessage>, deadline: Instant) -> Result<ProtocolMessage, AuthError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(AuthError::Timeout);
    }
    match tokio::time::timeout(remaining, rx.recv()).await {
        Ok(Some(msg)) => Ok(msg),
        Ok(None) => Err(AuthError::Shutdown),
        Err(_) => Err(AuthError::Timeout),
    }
}

fn topic_matches(call: &CallState, msg: &ProtocolMessage) -> bool {
    let current = va_proto::topics::topic_hex(&call.current_topic);
    if msg.topic == current {
        return true;
    }
    if let Some(ake) = &call.ake {
        if msg.topic == va_proto::topics::topic_hex(&ake.topic) && matches!(msg.msg_type, MessageType::AkeResponse) {
            return true;
        }
    }
    false
}

fn dispatch(my: &SubscriberConfig, call: &mut CallState, msg: ProtocolMessage) -> Result<Option<ProtocolMessage>, AuthError> {
    if msg.sender_id == call.sender_id {
        return Ok(None);
    }
    if matches!(msg.msg_type, MessageType::Heartbeat) {
        return Ok(None);
    }
    if matches!(msg.msg_type, MessageType::Bye) {
        call.set_phase(Phase::Failed);
        return Err(AuthError::ProtocolViolation("peer sent BYE".into()));
    }
    if !topic_matches(call, &msg) {
        warn!(topic = %msg.topic, "dropping OOB frame on mismatched topic");
        return Ok(None);
    }

    match (call.phase, msg.msg_type) {
        (Phase::Init, MessageType::AkeRequest) if !call.is_caller => Ok(Some(ake::handle_ake_request(my, call, &msg)?)),
        (Phase::AkeOutstanding, MessageType::AkeResponse) if call.is_caller => Ok(Some(ake::handle_ake_response(my, call, &msg)?)),
        (Phase::AkeOutstanding, MessageType::AkeComplete) if !call.is_caller => {
            ake::handle_ake_complete(my, call, &msg)?;
            Ok(None)
        }
        (Phase::AkeEstablished, MessageType::AkeResponse) => Ok(None),
        (Phase::AkeEstablished, MessageType::RuaRequest) if !call.is_caller => Ok(Some(rua::handle_rua_request(my, call, &msg)?)),
        (Phase::RuaOutstanding, MessageType::RuaResponse) if call.is_caller => {
            rua::handle_rua_response(my, call, &msg)?;
            Ok(None)
        }
        (phase, msg_type) => Err(AuthError::ProtocolViolation(format!("unexpected {msg_type:?} in phase {phase:?}"))),
    }
}
