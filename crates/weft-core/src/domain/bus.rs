//! Message bus port
//!
//! Subject-addressed, at-least-once, explicitly acknowledged delivery.
//! The engine only publishes through this trait; consumer provisioning
//! (subscriptions, ack policy, redelivery) belongs to the embedder.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::CoreError;

/// Publisher side of the message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a subject
    async fn publish(&self, subject: &str, payload: Value) -> Result<(), CoreError>;
}

/// Serialize a typed payload and publish it
pub async fn publish_message<T: Serialize>(
    bus: &Arc<dyn MessageBus>,
    subject: &str,
    payload: &T,
) -> Result<(), CoreError> {
    let value = serde_json::to_value(payload)?;
    tracing::debug!(subject = %subject, "Publishing message");
    bus.publish(subject, value).await
}

/// In-memory message bus for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Records every publish and hands messages back in order
    ///
    /// Tests drive the engine by popping messages and re-dispatching them,
    /// which exercises the same unordered at-least-once paths a real bus
    /// consumer would.
    pub struct MemoryMessageBus {
        queue: Mutex<VecDeque<(String, Value)>>,
        published: Mutex<Vec<(String, Value)>>,
    }

    impl MemoryMessageBus {
        /// Create an empty bus
        pub fn new() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                published: Mutex::new(Vec::new()),
            }
        }

        /// Pop the oldest undelivered message
        pub async fn pop(&self) -> Option<(String, Value)> {
            self.queue.lock().await.pop_front()
        }

        /// Every message ever published, in publish order
        pub async fn published(&self) -> Vec<(String, Value)> {
            self.published.lock().await.clone()
        }

        /// Published messages for one subject
        pub async fn published_on(&self, subject: &str) -> Vec<Value> {
            self.published
                .lock()
                .await
                .iter()
                .filter(|(s, _)| s == subject)
                .map(|(_, payload)| payload.clone())
                .collect()
        }

        /// Number of undelivered messages
        pub async fn pending(&self) -> usize {
            self.queue.lock().await.len()
        }
    }

    impl Default for MemoryMessageBus {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl MessageBus for MemoryMessageBus {
        async fn publish(&self, subject: &str, payload: Value) -> Result<(), CoreError> {
            self.queue
                .lock()
                .await
                .push_back((subject.to_string(), payload.clone()));
            self.published.lock().await.push((subject.to_string(), payload));
            Ok(())
        }
    }
}
