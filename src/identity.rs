//! Identity verification seam.
//!
//! Token issuance belongs to the auth service; this crate only resolves a
//! presented token to a user id. The production verifier reads the session
//! keys the auth service maintains in Redis; the static verifier backs tests
//! and degraded single-process runs (its empty default rejects everything).

use crate::types::UserId;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

/// Resolves a bearer/handshake token to the user that owns it.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `Some(user)` for a valid token, `None` otherwise.
    async fn verify(&self, token: &str) -> Option<UserId>;
}

/// Verifier backed by the auth service's Redis session keys
/// (`session:{token}` → user id).
pub struct SessionTokenVerifier {
    conn_manager: ConnectionManager,
}

impl SessionTokenVerifier {
    /// Build from an existing connection manager.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl TokenVerifier for SessionTokenVerifier {
    async fn verify(&self, token: &str) -> Option<UserId> {
        if token.is_empty() {
            return None;
        }
        let mut conn = self.conn_manager.clone();
        let user_id: Option<i64> = match conn.get(format!("session:{token}")).await {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "session lookup failed");
                None
            }
        };
        user_id.map(UserId::new)
    }
}

/// Fixed token → user table for tests and local development.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenVerifier {
    /// Empty table; rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a valid token.
    #[must_use]
    pub fn with_token(mut self, token: &str, user: UserId) -> Self {
        self.tokens.insert(token.to_string(), user);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_verifier_checks_the_table() {
        let verifier = StaticTokenVerifier::new().with_token("tok-1", UserId::new(4));
        assert_eq!(verifier.verify("tok-1").await, Some(UserId::new(4)));
        assert_eq!(verifier.verify("tok-2").await, None);
    }
}
