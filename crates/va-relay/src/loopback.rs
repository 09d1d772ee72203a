//! In-process relay transport for tests and the CLI demo. Two `RelaySession`s
//! sharing a `LoopbackHub` behave like two clients of the same relay:
//! publishes fan out to live subscribers and are retained in a small replay
//! buffer so a subscribe that races a publish (the piggyback pattern in
//! spec.md §4.3) still sees it, mirroring the real relay's "may replay
//! messages published shortly before subscribe" guarantee (spec.md §4.2).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::RelayError;
use crate::transport::{RelayInboundStream, RelayTransport};
use va_proto::relay_frame::{PublishResponse, RelayMessage};

const REPLAY_CAPACITY: usize = 16;
const CHANNEL_CAPACITY: usize = 256;

struct TopicChannel {
    sender: broadcast::Sender<RelayMessage>,
    replay: VecDeque<RelayMessage>,
}

impl Default for TopicChannel {
    fn default() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            replay: VecDeque::new(),
        }
    }
}

#[derive(Default)]
pub struct LoopbackHub {
    topics: Mutex<HashMap<String, TopicChannel>>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn publish(&self, msg: RelayMessage) {
        let mut topics = self.topics.lock();
        let channel = topics.entry(msg.topic.clone()).or_default();
        channel.replay.push_back(msg.clone());
        if channel.replay.len() > REPLAY_CAPACITY {
            channel.replay.pop_front();
        }
        let _ = channel.sender.send(msg);
    }

    fn subscribe(&self, topic: &str) -> (VecDeque<RelayMessage>, broadcast::Receiver<RelayMessage>) {
        let mut topics = self.topics.lock();
        let channel = topics.entry(topic.to_string()).or_default();
        (channel.replay.clone(), channel.sender.subscribe())
    }
}

pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
}

impl LoopbackTransport {
    pub fn new(hub: Arc<LoopbackHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl RelayTransport for LoopbackTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, _ticket: Option<Vec<u8>>) -> Result<PublishResponse, RelayError> {
        self.hub.publish(RelayMessage { topic: topic.to_string(), payload });
        Ok(PublishResponse::default())
    }

    async fn subscribe(&self, topic: &str, _ticket: Vec<u8>) -> Result<Box<dyn RelayInboundStream>, RelayError> {
        let (replay, rx) = self.hub.subscribe(topic);
        Ok(Box::new(LoopbackInboundStream { replay, rx }))
    }
}

struct LoopbackInboundStream {
    replay: VecDeque<RelayMessage>,
    rx: broadcast::Receiver<RelayMessage>,
}

#[async_trait]
impl RelayInboundStream for LoopbackInboundStream {
    async fn recv(&mut self) -> Option<RelayMessage> {
        if let Some(msg) = self.replay.pop_front() {
            return Some(msg);
        }
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_subscribe_replays_recent_message() {
        let hub = LoopbackHub::new();
        let transport = LoopbackTransport::new(hub);

        transport.publish("topic-a", b"hello".to_vec(), None).await.unwrap();
        let mut stream = transport.subscribe("topic-a", vec![]).await.unwrap();
        let msg = stream.recv().await.unwrap();
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn subscribers_on_different_topics_do_not_cross_talk() {
        let hub = LoopbackHub::new();
        let transport = LoopbackTransport::new(hub);

        transport.publish("topic-a", b"a".to_vec(), None).await.unwrap();
        let mut stream_b = transport.subscribe("topic-b", vec![]).await.unwrap();
        transport.publish("topic-b", b"b".to_vec(), None).await.unwrap();
        let msg = stream_b.recv().await.unwrap();
        assert_eq!(msg.payload, b"b");
    }
}
