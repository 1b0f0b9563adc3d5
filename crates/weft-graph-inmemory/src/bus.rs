//! Channel-backed implementation of the message bus port

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use weft_core::{CoreError, MessageBus};

/// One published message
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Subject the message was addressed to
    pub subject: String,

    /// JSON payload
    pub payload: Value,
}

/// In-memory message bus backed by an unbounded channel
///
/// Publishes are forwarded to a single consumer (the embedder's loop) and
/// appended to a log for inspection. When the consumer is gone the bus
/// degrades to log-only; in an at-least-once world a dropped receiver is
/// the embedder shutting down, not an error the publisher can act on.
pub struct InMemoryMessageBus {
    tx: mpsc::UnboundedSender<BusMessage>,
    log: Arc<RwLock<Vec<BusMessage>>>,
}

impl InMemoryMessageBus {
    /// Create a bus and its consumer end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                log: Arc::new(RwLock::new(Vec::new())),
            },
            rx,
        )
    }

    /// Every message ever published, in publish order
    pub async fn published(&self) -> Vec<BusMessage> {
        self.log.read().await.clone()
    }

    /// Published payloads for one subject
    pub async fn published_on(&self, subject: &str) -> Vec<Value> {
        self.log
            .read()
            .await
            .iter()
            .filter(|m| m.subject == subject)
            .map(|m| m.payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, subject: &str, payload: Value) -> Result<(), CoreError> {
        let message = BusMessage {
            subject: subject.to_string(),
            payload,
        };

        self.log.write().await.push(message.clone());

        if self.tx.send(message).is_err() {
            warn!(subject = %subject, "Bus consumer gone; message logged only");
        } else {
            debug!(subject = %subject, "Message published");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_consumer_and_log() {
        let (bus, mut rx) = InMemoryMessageBus::new();
        bus.publish("task.start", json!({"stateId": 1})).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.subject, "task.start");
        assert_eq!(received.payload, json!({"stateId": 1}));

        assert_eq!(bus.published().await.len(), 1);
        assert_eq!(bus.published_on("task.start").await, vec![json!({"stateId": 1})]);
    }

    #[tokio::test]
    async fn test_publish_without_consumer_still_logs() {
        let (bus, rx) = InMemoryMessageBus::new();
        drop(rx);

        bus.publish("data.start", json!({})).await.unwrap();
        assert_eq!(bus.published().await.len(), 1);
    }
}
