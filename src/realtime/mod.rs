//! Real-time fan-out of change events.
//!
//! Each process holds its own [`ConnectionRegistry`] of live WebSocket
//! connections. The [`Broadcaster`] delivers a [`ChangeEvent`] to local
//! connections and replicates it to sibling processes through a shared
//! [`FanoutBus`]; each sibling's subscriber task re-delivers to its own local
//! connections only, so nothing ever loops back onto the channel.
//!
//! Delivery guarantee: at most once per connection per event, no ordering
//! across processes, no replay of missed events. Clients treat the channel
//! as a hint and reconcile through reads.

pub mod fanout;
pub mod registry;

pub use fanout::{LocalFanout, RedisFanout};
pub use registry::{ConnectionId, ConnectionRegistry, Outbound};

use crate::types::{ChangeEvent, UserId};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fan-out transport failures. Logged, never surfaced to callers.
#[derive(Debug, Error, Clone)]
pub enum FanoutError {
    /// The channel backend could not be reached.
    #[error("fan-out connection failed: {0}")]
    Connection(String),

    /// Publishing an envelope failed.
    #[error("fan-out publish failed: {0}")]
    Publish(String),

    /// Subscribing to the channel failed.
    #[error("fan-out subscribe failed: {0}")]
    Subscribe(String),
}

/// The message replicated between processes.
///
/// `origin` lets a subscriber drop envelopes it published itself: local
/// delivery already happened at publish time, and a second pass would break
/// the at-most-once guarantee. `target` narrows re-delivery to connections
/// bound to one identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Publishing process instance.
    pub origin: Uuid,
    /// Identity scope, `None` for broadcast-to-all.
    pub target: Option<UserId>,
    /// The change event itself.
    pub event: ChangeEvent,
}

/// Shared publish/subscribe channel between sibling processes.
#[async_trait]
pub trait FanoutBus: Send + Sync {
    /// Publish an envelope to every subscribed process.
    async fn publish(&self, envelope: &Envelope) -> Result<(), FanoutError>;

    /// Open a stream of envelopes published by any process.
    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, FanoutError>;
}

/// Delivers change events to local connections and replicates them across
/// processes.
pub struct Broadcaster {
    instance: Uuid,
    registry: Arc<ConnectionRegistry>,
    bus: Option<Arc<dyn FanoutBus>>,
}

impl Broadcaster {
    /// Build a broadcaster. `bus` is `None` for single-process deployments;
    /// delivery then stays local.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, bus: Option<Arc<dyn FanoutBus>>) -> Arc<Self> {
        Arc::new(Self {
            instance: Uuid::new_v4(),
            registry,
            bus,
        })
    }

    /// The registry this broadcaster delivers to.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver to every live local connection, then replicate to siblings.
    pub async fn broadcast_all(&self, event: ChangeEvent) {
        self.deliver_all(&event);
        self.replicate(None, event).await;
    }

    /// Deliver to local connections bound to `user`, then replicate an
    /// identity-scoped envelope to siblings.
    pub async fn broadcast_to_user(&self, user: UserId, event: ChangeEvent) {
        self.deliver_to_user(user, &event);
        self.replicate(Some(user), event).await;
    }

    fn deliver_all(&self, event: &ChangeEvent) {
        if let Some(frame) = encode(event) {
            let delivered = self.registry.send_all(&frame);
            debug!(delivered, "broadcast delivered locally");
        }
    }

    fn deliver_to_user(&self, user: UserId, event: &ChangeEvent) {
        if let Some(frame) = encode(event) {
            let delivered = self.registry.send_to_user(user, &frame);
            debug!(delivered, user = %user, "targeted broadcast delivered locally");
        }
    }

    async fn replicate(&self, target: Option<UserId>, event: ChangeEvent) {
        let Some(bus) = &self.bus else {
            return;
        };
        let envelope = Envelope {
            origin: self.instance,
            target,
            event,
        };
        if let Err(e) = bus.publish(&envelope).await {
            // Siblings miss this event; their clients reconcile via reads.
            warn!(error = %e, "failed to replicate change event");
        }
    }

    /// Spawn the channel subscriber. Envelopes published by this instance
    /// are skipped; everything else is delivered locally without being
    /// re-published.
    #[must_use]
    pub fn spawn_subscriber(self: &Arc<Self>) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            let Some(bus) = broadcaster.bus.clone() else {
                return;
            };
            let mut stream = match bus.subscribe().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "fan-out subscription failed; cross-process delivery disabled");
                    return;
                }
            };

            while let Some(envelope) = stream.next().await {
                if envelope.origin == broadcaster.instance {
                    continue;
                }
                match envelope.target {
                    Some(user) => broadcaster.deliver_to_user(user, &envelope.event),
                    None => broadcaster.deliver_all(&envelope.event),
                }
            }
            debug!("fan-out subscription stream ended");
        })
    }

    /// Spawn the heartbeat task driving the registry's ping cycle.
    #[must_use]
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = broadcaster.registry.ping_cycle();
                if removed > 0 {
                    debug!(removed, "heartbeat removed unresponsive connections");
                }
            }
        })
    }
}

fn encode(event: &ChangeEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "failed to encode change event");
            None
        }
    }
}
