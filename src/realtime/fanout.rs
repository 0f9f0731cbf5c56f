//! Fan-out transports.
//!
//! [`RedisFanout`] replicates change events across sibling processes over a
//! Redis pub/sub channel. [`LocalFanout`] wires broadcasters together inside
//! one process, which is how tests exercise the cross-process delivery
//! property without a Redis instance.

use crate::realtime::{Envelope, FanoutBus, FanoutError};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Fan-out over a shared Redis pub/sub channel.
pub struct RedisFanout {
    client: Client,
    publisher: ConnectionManager,
    channel: String,
}

impl RedisFanout {
    /// Connect to Redis and build the fan-out transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(redis_url: &str, channel: &str) -> Result<Self, FanoutError> {
        let client = Client::open(redis_url)
            .map_err(|e| FanoutError::Connection(format!("failed to create Redis client: {e}")))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| FanoutError::Connection(format!("failed to connect to Redis: {e}")))?;
        Ok(Self {
            client,
            publisher,
            channel: channel.to_string(),
        })
    }

    /// Build from an existing client/manager pair (shared with the cache
    /// tier).
    #[must_use]
    pub fn with_connection(client: Client, publisher: ConnectionManager, channel: &str) -> Self {
        Self {
            client,
            publisher,
            channel: channel.to_string(),
        }
    }
}

#[async_trait]
impl FanoutBus for RedisFanout {
    async fn publish(&self, envelope: &Envelope) -> Result<(), FanoutError> {
        let payload = serde_json::to_string(envelope)
            .map_err(|e| FanoutError::Publish(format!("failed to encode envelope: {e}")))?;
        let mut conn = self.publisher.clone();
        let _: () = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| FanoutError::Publish(format!("PUBLISH failed: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, FanoutError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| FanoutError::Subscribe(format!("failed to open pub/sub: {e}")))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| FanoutError::Subscribe(format!("SUBSCRIBE failed: {e}")))?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|message| async move {
                let payload: String = message.get_payload().ok()?;
                match serde_json::from_str::<Envelope>(&payload) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(error = %e, "dropping malformed fan-out envelope");
                        None
                    }
                }
            })
            .boxed();
        Ok(stream)
    }
}

/// In-process fan-out over a tokio broadcast channel.
pub struct LocalFanout {
    tx: tokio::sync::broadcast::Sender<Envelope>,
}

impl LocalFanout {
    /// Build a local channel with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for LocalFanout {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl FanoutBus for LocalFanout {
    async fn publish(&self, envelope: &Envelope) -> Result<(), FanoutError> {
        // No subscribers is fine; the channel only exists to bridge peers.
        let _ = self.tx.send(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, FanoutError> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx)
            .filter_map(|result| async move { result.ok() })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{ChangeEvent, EventId, UserId};
    use uuid::Uuid;

    // Requires a running Redis instance:
    // docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn envelope_round_trips_over_redis_pubsub() {
        let fanout = RedisFanout::new("redis://127.0.0.1:6379", "fanout-test")
            .await
            .unwrap();

        let mut stream = fanout.subscribe().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let envelope = Envelope {
            origin: Uuid::new_v4(),
            target: Some(UserId::new(3)),
            event: ChangeEvent::SlotUpdate {
                event_id: EventId::new(12),
                available_slots: 2,
            },
        };
        fanout.publish(&envelope).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, envelope);
    }
}
