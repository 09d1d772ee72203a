//! `OobController` — owns a call's OOB relay subscription and heartbeat,
//! per spec.md §4.2/§4.5. Grounded on
//! `guard_service::connected::heartbeat`'s interval-task shape, adapted to
//! wrap a `va_relay::RelaySession` instead of a REST poll.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use va_proto::topics;
use va_proto::{MessageType, ProtocolMessage};
use va_relay::{FrameHandler, RelayClient, RelaySession, TicketSupplier};

use crate::error::AuthError;

/// `HEARTBEAT_INTERVAL_MS` overrides the default 30s heartbeat cadence, for
/// relay deployments with a tighter idle-subscription timeout.
fn heartbeat_interval() -> Duration {
    match std::env::var("HEARTBEAT_INTERVAL_MS").ok().and_then(|v| v.parse().ok()) {
        Some(ms) => Duration::from_millis(ms),
        None => Duration::from_secs(30),
    }
}

/// Owns the per-call `RelaySession` plus a background heartbeat publisher.
/// Dropping it tears down both.
pub struct OobController {
    client: RelayClient,
    session: RelaySession,
    current_topic: Arc<Mutex<String>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl OobController {
    pub fn new(client: RelayClient) -> Self {
        let session = RelaySession::new(client.clone());
        Self { client, session, current_topic: Arc::new(Mutex::new(String::new())), heartbeat: None }
    }

    /// Subscribe to `topic` (hex-rendered) and (re)start the heartbeat.
    pub fn subscribe(&mut self, topic: &[u8; 32], ticket_supplier: TicketSupplier, on_frame: FrameHandler, sender_id: String) {
        let topic_hex = topics::topic_hex(topic);
        *self.current_topic.lock() = topic_hex.clone();
        self.session.start(topic_hex, ticket_supplier, on_frame);
        self.start_heartbeat(sender_id);
    }

    /// Cancel the current subscription, piggyback-publish `first_msg` on
    /// the new topic, then subscribe the new topic — used when a phase
    /// transition (e.g. AKE → RUA) moves the call to a fresh topic.
    pub async fn swap_to_topic(
        &mut self,
        new_topic: &[u8; 32],
        first_msg: Option<Vec<u8>>,
        ticket_supplier: TicketSupplier,
        on_frame: FrameHandler,
    ) -> Result<(), AuthError> {
        let topic_hex = topics::topic_hex(new_topic);
        *self.current_topic.lock() = topic_hex.clone();
        self.session.swap_to_topic(topic_hex, first_msg, ticket_supplier, on_frame).await?;
        Ok(())
    }

    /// Publish on the session's currently subscribed topic.
    pub async fn publish(&self, bytes: Vec<u8>) -> Result<(), AuthError> {
        self.session.send(bytes).await.map_err(AuthError::from)
    }

    pub async fn publish_to_topic(&self, topic: &[u8; 32], bytes: Vec<u8>, ticket: Option<Vec<u8>>) -> Result<(), AuthError> {
        self.client.publish(&topics::topic_hex(topic), bytes, ticket).await.map_err(AuthError::from)?;
        Ok(())
    }

    fn start_heartbeat(&mut self, sender_id: String) {
        self.stop_heartbeat();
        let client = self.client.clone();
        let current_topic = self.current_topic.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval());
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                let topic = current_topic.lock().clone();
                if topic.is_empty() {
                    continue;
                }
                let msg = ProtocolMessage::new(MessageType::Heartbeat, sender_id.clone(), topic.clone(), Vec::new());
                if let Ok(bytes) = serde_json::to_vec(&msg) {
                    let _ = client.publish(&topic, bytes, None).await;
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }

    pub fn close(&mut self) {
        self.stop_heartbeat();
        self.session.close();
    }
}

impl Drop for OobController {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use va_relay::{LoopbackHub, LoopbackTransport};

    #[tokio::test]
    async fn subscribe_delivers_frames_on_the_given_topic() {
        let hub = LoopbackHub::new();
        let client = RelayClient::new(Arc::new(LoopbackTransport::new(hub)));
        let mut controller = OobController::new(client.clone());

        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        let topic = [7u8; 32];
        controller.subscribe(
            &topic,
            Arc::new(|| vec![]),
            Arc::new(move |_msg| {
                received_clone.fetch_add(1, Ordering::SeqCst);
            }),
            "sender-a".into(),
        );

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        client.publish(&va_proto::topics::topic_hex(&topic), b"hi".to_vec(), None).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
        controller.close();
    }
}
