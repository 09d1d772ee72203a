//! Real-network relay transport over WebSocket. The "binary RPC framework"
//! named in spec.md §4.2 is realised here as a JSON-over-WebSocket op
//! protocol: `{"op":"publish", message, ticket}` / `{"op":"subscribe",
//! topic, ticket}`, with the server replying with `RelayMessage` frames on
//! a subscribe connection and one `PublishResponse` per publish.
//!
//! Connect/reconnect shape grounded on `clawde-io-apps/daemon/src/relay`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

use crate::error::RelayError;
use crate::transport::{RelayInboundStream, RelayTransport};
use va_proto::relay_frame::{PublishResponse, RelayMessage};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketTransport {
    url: String,
    publish_conn: AsyncMutex<Option<WsStream>>,
}

impl WebSocketTransport {
    pub fn new(host: &str, port: u16, tls: bool) -> Self {
        let scheme = if tls { "wss" } else { "ws" };
        Self {
            url: format!("{scheme}://{host}:{port}/ws"),
            publish_conn: AsyncMutex::new(None),
        }
    }

    async fn connect(&self) -> Result<WsStream, RelayError> {
        let (stream, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        Ok(stream)
    }
}

#[async_trait]
impl RelayTransport for WebSocketTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, ticket: Option<Vec<u8>>) -> Result<PublishResponse, RelayError> {
        let mut guard = self.publish_conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        let op = serde_json::json!({
            "op": "publish",
            "message": RelayMessage { topic: topic.to_string(), payload },
            "ticket": ticket,
        });
        let text = serde_json::to_string(&op).map_err(|e| RelayError::Protocol(e.to_string()))?;

        let conn = guard.as_mut().expect("just populated");
        if conn.send(Message::Text(text)).await.is_err() {
            *guard = None;
            return Err(RelayError::Connect("publish connection lost".into()));
        }

        match conn.next().await {
            Some(Ok(Message::Text(resp_text))) => {
                serde_json::from_str(&resp_text).map_err(|e| RelayError::Protocol(e.to_string()))
            }
            _ => {
                *guard = None;
                Err(RelayError::Connect("no publish acknowledgement received".into()))
            }
        }
    }

    async fn subscribe(&self, topic: &str, ticket: Vec<u8>) -> Result<Box<dyn RelayInboundStream>, RelayError> {
        let mut conn = self.connect().await?;
        let op = serde_json::json!({"op": "subscribe", "topic": topic, "ticket": ticket});
        let text = serde_json::to_string(&op).map_err(|e| RelayError::Protocol(e.to_string()))?;
        conn.send(Message::Text(text))
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        Ok(Box::new(WebSocketInboundStream { conn }))
    }
}

struct WebSocketInboundStream {
    conn: WsStream,
}

#[async_trait]
impl RelayInboundStream for WebSocketInboundStream {
    async fn recv(&mut self) -> Option<RelayMessage> {
        loop {
            match self.conn.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<RelayMessage>(&text) {
                    Ok(msg) => return Some(msg),
                    Err(err) => {
                        warn!(error = %err, "relay: dropping unparseable frame");
                        continue;
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(err)) => {
                    warn!(error = %err, "relay: subscribe stream error");
                    return None;
                }
                _ => continue,
            }
        }
    }
}
