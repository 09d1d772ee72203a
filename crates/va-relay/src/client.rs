//! `RelayClient` — a pooled handle over one `RelayTransport` backend,
//! cheaply cloned and shared across `RelaySession`s (spec.md §4.2).

use std::sync::Arc;

use crate::error::RelayError;
use crate::transport::{RelayInboundStream, RelayTransport};
use va_proto::relay_frame::PublishResponse;

#[derive(Clone)]
pub struct RelayClient {
    transport: Arc<dyn RelayTransport>,
}

impl RelayClient {
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        Self { transport }
    }

    pub async fn publish(&self, topic: &str, payload: Vec<u8>, ticket: Option<Vec<u8>>) -> Result<PublishResponse, RelayError> {
        self.transport.publish(topic, payload, ticket).await
    }

    pub(crate) async fn subscribe(&self, topic: &str, ticket: Vec<u8>) -> Result<Box<dyn RelayInboundStream>, RelayError> {
        self.transport.subscribe(topic, ticket).await
    }
}
