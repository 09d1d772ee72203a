//! `RelaySession` — per-active-topic subscribe/publish handle, per spec.md
//! §4.2. Reconnects the subscribe stream with a bounded exponential backoff
//! ladder and resumes indefinitely; a fresh ticket is requested from the
//! caller-supplied `ticket_supplier` before every (re)subscribe.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::client::RelayClient;
use crate::error::RelayError;
use va_proto::relay_frame::RelayMessage;

const BACKOFF_LADDER_MS: &[u64] = &[0, 500, 1000, 2000, 5000];

pub type FrameHandler = Arc<dyn Fn(RelayMessage) + Send + Sync>;
pub type TicketSupplier = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

pub struct RelaySession {
    client: RelayClient,
    current_topic: Arc<Mutex<String>>,
    task: Option<JoinHandle<()>>,
}

impl RelaySession {
    pub fn new(client: RelayClient) -> Self {
        Self {
            client,
            current_topic: Arc::new(Mutex::new(String::new())),
            task: None,
        }
    }

    /// Opens a `Subscribe` stream on `topic`, relaying each frame to
    /// `on_frame`. Supersedes any previously running subscribe task.
    pub fn start(&mut self, topic: impl Into<String>, ticket_supplier: TicketSupplier, on_frame: FrameHandler) {
        self.stop_task();
        let topic = topic.into();
        *self.current_topic.lock() = topic.clone();

        let client = self.client.clone();
        self.task = Some(tokio::spawn(run_subscribe_loop(client, topic, ticket_supplier, on_frame)));
    }

    /// Unary publish on the session's current topic.
    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), RelayError> {
        let topic = self.current_topic.lock().clone();
        self.send_to_topic(&topic, bytes, None).await
    }

    pub async fn send_to_topic(&self, topic: &str, bytes: Vec<u8>, ticket: Option<Vec<u8>>) -> Result<(), RelayError> {
        let resp = self.client.publish(topic, bytes, ticket).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(RelayError::PublishRejected(resp.status))
        }
    }

    /// Cancels the current subscribe stream, optionally publishes a
    /// piggyback message on the new topic first so the relay includes it
    /// in the subscribe replay, then subscribes the new topic.
    pub async fn swap_to_topic(
        &mut self,
        new_topic: impl Into<String>,
        optional_first_msg: Option<Vec<u8>>,
        ticket_supplier: TicketSupplier,
        on_frame: FrameHandler,
    ) -> Result<(), RelayError> {
        let new_topic = new_topic.into();
        if let Some(msg) = optional_first_msg {
            self.send_to_topic(&new_topic, msg, None).await?;
        }
        self.start(new_topic, ticket_supplier, on_frame);
        Ok(())
    }

    pub fn close(&mut self) {
        self.stop_task();
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.stop_task();
    }
}

async fn run_subscribe_loop(client: RelayClient, topic: String, ticket_supplier: TicketSupplier, on_frame: FrameHandler) {
    let mut attempt = 0usize;
    loop {
        let ticket = ticket_supplier();
        match client.subscribe(&topic, ticket).await {
            Ok(mut stream) => {
                attempt = 0;
                while let Some(msg) = stream.recv().await {
                    on_frame(msg);
                }
                warn!(topic = %topic, "relay: subscribe stream ended, reconnecting");
            }
            Err(err) => {
                warn!(topic = %topic, error = %err, "relay: subscribe failed, retrying");
            }
        }

        let delay_ms = BACKOFF_LADDER_MS[attempt.min(BACKOFF_LADDER_MS.len() - 1)];
        attempt += 1;
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackHub, LoopbackTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn start_delivers_published_frames() {
        let hub = LoopbackHub::new();
        let client = RelayClient::new(Arc::new(LoopbackTransport::new(hub)));
        let mut session = RelaySession::new(client.clone());

        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        session.start(
            "topic-a",
            Arc::new(|| vec![]),
            Arc::new(move |_msg| {
                received_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        client.publish("topic-a", b"hi".to_vec(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
        session.close();
    }

    #[tokio::test]
    async fn swap_to_topic_piggybacks_first_message() {
        let hub = LoopbackHub::new();
        let client = RelayClient::new(Arc::new(LoopbackTransport::new(hub)));
        let mut session = RelaySession::new(client.clone());

        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        session
            .swap_to_topic(
                "topic-b",
                Some(b"piggyback".to_vec()),
                Arc::new(|| vec![]),
                Arc::new(move |msg| {
                    assert_eq!(msg.payload, b"piggyback");
                    received_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
        session.close();
    }
}
