//! Connection registry.
//!
//! Owns the process-local table of live WebSocket connections. The registry
//! is held by the broadcaster for its lifetime: there is no ambient global
//! connection state. Locks guard only map access and are never held across
//! I/O; frames travel through per-connection unbounded channels so a slow
//! client cannot stall a broadcast.

use crate::types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

/// Frame handed to a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized change event.
    Event(String),
    /// A liveness probe; the writer maps it to a protocol ping.
    Ping,
}

/// Process-local identifier of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Connection {
    tx: UnboundedSender<Outbound>,
    alive: AtomicBool,
    user: RwLock<Option<UserId>>,
}

impl Connection {
    fn user(&self) -> Option<UserId> {
        *read_lock(&self.user)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Table of live connections on this process.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and return its id. The connection starts alive and
    /// unbound; it receives identity-scoped traffic only after
    /// [`bind_user`](Self::bind_user).
    pub fn register(&self, tx: UnboundedSender<Outbound>) -> ConnectionId {
        let id = ConnectionId::new();
        let connection = Arc::new(Connection {
            tx,
            alive: AtomicBool::new(true),
            user: RwLock::new(None),
        });
        write_lock(&self.connections).insert(id, connection);
        id
    }

    /// Remove a connection.
    pub fn deregister(&self, id: ConnectionId) {
        write_lock(&self.connections).remove(&id);
    }

    /// Bind an authenticated identity to a connection.
    pub fn bind_user(&self, id: ConnectionId, user: UserId) {
        if let Some(connection) = read_lock(&self.connections).get(&id) {
            *write_lock(&connection.user) = Some(user);
        }
    }

    /// Record a liveness acknowledgement (pong) from a connection.
    pub fn mark_alive(&self, id: ConnectionId) {
        if let Some(connection) = read_lock(&self.connections).get(&id) {
            connection.alive.store(true, Ordering::Relaxed);
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock(&self.connections).len()
    }

    /// `true` when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a frame to every live connection. Returns the delivery count.
    pub fn send_all(&self, frame: &str) -> usize {
        self.send_where(frame, |_| true)
    }

    /// Deliver a frame to every live connection bound to `user`. Returns the
    /// delivery count.
    pub fn send_to_user(&self, user: UserId, frame: &str) -> usize {
        self.send_where(frame, |connection| connection.user() == Some(user))
    }

    fn send_where(&self, frame: &str, select: impl Fn(&Connection) -> bool) -> usize {
        let targets: Vec<(ConnectionId, Arc<Connection>)> = read_lock(&self.connections)
            .iter()
            .filter(|(_, connection)| {
                connection.alive.load(Ordering::Relaxed) && select(connection.as_ref())
            })
            .map(|(id, connection)| (*id, Arc::clone(connection)))
            .collect();

        let mut delivered = 0;
        let mut stale = Vec::new();
        for (id, connection) in targets {
            if connection
                .tx
                .send(Outbound::Event(frame.to_string()))
                .is_ok()
            {
                delivered += 1;
            } else {
                stale.push(id);
            }
        }

        if !stale.is_empty() {
            let mut connections = write_lock(&self.connections);
            for id in stale {
                connections.remove(&id);
            }
        }

        delivered
    }

    /// Run one heartbeat cycle: terminate connections that never acknowledged
    /// the previous ping, then mark the rest unconfirmed and ping them.
    /// Returns the number of connections removed.
    pub fn ping_cycle(&self) -> usize {
        let mut dead = Vec::new();
        let survivors: Vec<Arc<Connection>> = {
            let connections = read_lock(&self.connections);
            connections
                .iter()
                .filter_map(|(id, connection)| {
                    if connection.alive.load(Ordering::Relaxed) {
                        Some(Arc::clone(connection))
                    } else {
                        dead.push(*id);
                        None
                    }
                })
                .collect()
        };

        if !dead.is_empty() {
            let mut connections = write_lock(&self.connections);
            for id in &dead {
                connections.remove(id);
            }
            debug!(removed = dead.len(), "pruned unresponsive connections");
        }

        for connection in survivors {
            connection.alive.store(false, Ordering::Relaxed);
            // A failed send means the writer task is gone; the next cycle
            // removes the entry via the alive flag.
            let _ = connection.tx.send(Outbound::Ping);
        }

        dead.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn identity_scoped_delivery_skips_unbound_connections() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let a = registry.register(tx_a);
        let _b = registry.register(tx_b);
        registry.bind_user(a, UserId::new(1));

        assert_eq!(registry.send_to_user(UserId::new(1), "hello"), 1);
        assert_eq!(rx_a.recv().await.unwrap(), Outbound::Event("hello".into()));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unresponsive_connections_are_pruned_on_second_cycle() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(tx);

        assert_eq!(registry.ping_cycle(), 0);
        assert_eq!(rx.recv().await.unwrap(), Outbound::Ping);

        // No pong: the next cycle terminates the connection.
        assert_eq!(registry.ping_cycle(), 1);
        assert!(registry.is_empty());

        // A pong between cycles keeps it alive.
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let id2 = registry.register(tx2);
        assert_eq!(registry.ping_cycle(), 0);
        assert_eq!(rx2.recv().await.unwrap(), Outbound::Ping);
        registry.mark_alive(id2);
        assert_eq!(registry.ping_cycle(), 0);
        assert_eq!(registry.len(), 1);

        let _ = id;
    }

    #[tokio::test]
    async fn closed_receivers_are_removed_during_send() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(tx);
        drop(rx);

        assert_eq!(registry.send_all("x"), 0);
        assert!(registry.is_empty());
    }
}
