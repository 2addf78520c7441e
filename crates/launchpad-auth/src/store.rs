//! Deployment session storage
//!
//! Sessions live only as long as the store keeps them; there is no
//! persistence. Writes replace the whole session (last writer wins).

use dashmap::DashMap;
use launchpad_core::{DeploymentSession, SessionConfig, SessionId};
use moka::future::Cache;
use std::time::Duration;

/// Session store port
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Snapshot of a session
    async fn get(&self, id: &SessionId) -> Option<DeploymentSession>;

    /// Insert or replace
    async fn put(&self, session: DeploymentSession);

    /// Drop a session, returning it if present
    async fn remove(&self, id: &SessionId) -> Option<DeploymentSession>;
}

/// Sharded in-memory store without expiry
#[derive(Debug, Default)]
pub struct DashMapSessionStore {
    sessions: DashMap<SessionId, DeploymentSession>,
}

impl DashMapSessionStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for DashMapSessionStore {
    async fn get(&self, id: &SessionId) -> Option<DeploymentSession> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    async fn put(&self, session: DeploymentSession) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    async fn remove(&self, id: &SessionId) -> Option<DeploymentSession> {
        self.sessions.remove(id).map(|(_, session)| session)
    }
}

/// Bounded store; sessions idle longer than the TTL are evicted
#[derive(Debug, Clone)]
pub struct ExpiringSessionStore {
    inner: Cache<SessionId, DeploymentSession>,
}

impl ExpiringSessionStore {
    /// Create store with capacity and idle TTL
    #[inline]
    #[must_use]
    pub fn new(max_sessions: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_sessions)
                .time_to_idle(ttl)
                .build(),
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_sessions, config.ttl())
    }

    /// Approximate number of live sessions
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[async_trait::async_trait]
impl SessionStore for ExpiringSessionStore {
    async fn get(&self, id: &SessionId) -> Option<DeploymentSession> {
        self.inner.get(id).await
    }

    async fn put(&self, session: DeploymentSession) {
        self.inner.insert(session.session_id.clone(), session).await;
    }

    async fn remove(&self, id: &SessionId) -> Option<DeploymentSession> {
        self.inner.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::AuthState;

    async fn exercise(store: &dyn SessionStore) {
        let id = SessionId::from("s-1");
        assert!(store.get(&id).await.is_none());

        store.put(DeploymentSession::new(id.clone())).await;
        let mut session = store.get(&id).await.unwrap();
        session.mark_failed("denied");
        store.put(session).await;
        assert_eq!(store.get(&id).await.unwrap().auth_state, AuthState::Failed);

        assert!(store.remove(&id).await.is_some());
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn dashmap_store_round_trip() {
        let store = DashMapSessionStore::new();
        exercise(&store).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expiring_store_round_trip() {
        exercise(&ExpiringSessionStore::new(16, Duration::from_secs(60))).await;
    }

    #[tokio::test]
    async fn expiring_store_drops_idle_sessions() {
        let store = ExpiringSessionStore::new(16, Duration::from_millis(50));
        let id = SessionId::from("s-ttl");
        store.put(DeploymentSession::new(id.clone())).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_sessions_are_independent() {
        let store = std::sync::Arc::new(DashMapSessionStore::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .put(DeploymentSession::new(SessionId::from(format!("s-{i}"))))
                        .await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 32);
    }
}
