//! Session manager with a bounded store and idle expiry.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use larkdocs_mcp::ClientInfo;
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::{Session, SessionId, SessionState};
use crate::ttl::TtlTracker;

/// Inner state protected by RwLock.
struct StoreInner {
    /// Live sessions in recency order. Never evicts on insert: the
    /// manager refuses new sessions once it is full.
    lru: LruCache<SessionId, Session>,

    /// Idle tracker.
    ttl: TtlTracker,
}

impl StoreInner {
    /// Remove a session and return it in the `Closed` state.
    fn evict(&mut self, id: &SessionId) -> Option<Session> {
        self.ttl.remove(id);
        self.lru.pop(id).map(|mut session| {
            session.mark_closed();
            session
        })
    }

    /// Drop every idle-expired session. Returns how many were dropped.
    fn sweep_expired(&mut self) -> usize {
        let mut count = 0;
        for id in self.ttl.drain_expired() {
            if self.lru.pop(&id).is_some() {
                debug!(session_id = %id, "Cleaning up idle session");
                count += 1;
            }
        }
        count
    }

    fn is_full(&self) -> bool {
        self.lru.len() >= self.lru.cap().get()
    }
}

/// Owns every protocol session.
///
/// All operations are atomic with respect to each other: a session
/// closed by one caller is never observed as `Ready` by another.
/// Lookups fail closed, so anything that is not a known, live, `Ready`
/// session is reported as [`SessionError::UnknownSession`].
pub struct SessionManager {
    inner: Arc<RwLock<StoreInner>>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(config: SessionConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);

        let inner = StoreInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.idle_timeout),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    /// Whether there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Create a session for a client that completed `initialize`.
    ///
    /// The protocol version is checked before anything is stored, so a
    /// rejected handshake leaves no trace. On success the session is
    /// already `Ready`.
    ///
    /// A full store is swept for idle-expired sessions first; if every
    /// slot is still live the request fails with
    /// [`SessionError::LimitReached`] and no existing session is touched.
    pub async fn create_session(
        &self,
        client_info: ClientInfo,
        protocol_version: &str,
    ) -> Result<SessionId> {
        if !self.config.supports(protocol_version) {
            return Err(SessionError::UnsupportedProtocolVersion {
                requested: protocol_version.to_string(),
                supported: self.config.supported_versions.clone(),
            });
        }

        let mut session = Session::new(client_info, protocol_version);
        let id = session.id;
        session.mark_ready();

        let mut inner = self.inner.write().await;
        if inner.is_full() {
            inner.sweep_expired();
            if inner.is_full() {
                let max = inner.lru.cap().get();
                warn!(max_sessions = max, "Session limit reached, rejecting initialize");
                return Err(SessionError::LimitReached { max });
            }
        }
        inner.lru.put(id, session);
        inner.ttl.touch(&id);

        info!(
            session_id = %id,
            protocol_version = %protocol_version,
            live_sessions = inner.lru.len(),
            "Session created"
        );

        Ok(id)
    }

    /// Look up a session by its wire id.
    ///
    /// Missing, malformed, unknown, idle-expired and closed ids all fail
    /// with [`SessionError::UnknownSession`]. An idle-expired session is
    /// closed and removed as a side effect.
    pub async fn validate(&self, raw_id: &str) -> Result<Session> {
        let unknown = || SessionError::UnknownSession(raw_id.to_string());

        let id: SessionId = raw_id.parse().map_err(|_| unknown())?;

        let mut inner = self.inner.write().await;

        if inner.ttl.is_expired(&id) {
            if inner.evict(&id).is_some() {
                debug!(session_id = %id, "Session idle-expired, closing");
            }
            return Err(unknown());
        }

        match inner.lru.get(&id) {
            Some(session) if session.is_ready() => Ok(session.clone()),
            _ => Err(unknown()),
        }
    }

    /// Record activity on a session, resetting its idle timer.
    ///
    /// Returns false if the session is not live.
    pub async fn touch(&self, id: &SessionId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.lru.get_mut(id) else {
            return false;
        };
        if session.state == SessionState::Closed {
            return false;
        }
        session.touch();
        inner.ttl.touch(id);
        trace!(session_id = %id, "Session touched");
        true
    }

    /// Close a session. Returns whether a live session was closed.
    pub async fn close(&self, id: &SessionId) -> bool {
        let mut inner = self.inner.write().await;
        match inner.evict(id) {
            Some(session) => {
                info!(
                    session_id = %id,
                    client = %session.client_info.name,
                    "Session closed"
                );
                true
            }
            None => false,
        }
    }

    /// Close every idle-expired session. Returns how many were closed.
    pub async fn cleanup_expired(&self) -> usize {
        let count = self.inner.write().await.sweep_expired();

        if count > 0 {
            debug!(count = count, "Cleaned up idle sessions");
        }

        count
    }

    /// Spawn the periodic idle sweep.
    ///
    /// Returns `None` when the cleanup task is disabled or there is no
    /// idle timeout. The task stops once the manager is dropped.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enable_cleanup_task || self.config.idle_timeout.is_none() {
            return None;
        }

        let interval = self.config.cleanup_interval;
        let weak: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.cleanup_expired().await;
            }
        }))
    }

    /// Get store statistics.
    pub async fn stats(&self) -> SessionStats {
        let inner = self.inner.read().await;
        SessionStats {
            active: inner.lru.len(),
            capacity: self.config.max_sessions,
        }
    }
}

/// Session store statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Current number of live sessions.
    pub active: usize,

    /// Maximum capacity.
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> ClientInfo {
        ClientInfo {
            name: "test-client".to_string(),
            version: "1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let manager = SessionManager::new(SessionConfig::new());

        let id = manager.create_session(client(), "2024-11-05").await.unwrap();
        let session = manager.validate(&id.to_string()).await.unwrap();

        assert_eq!(session.id, id);
        assert_eq!(session.state, SessionState::Ready);
        assert_eq!(session.protocol_version, "2024-11-05");
        assert_eq!(session.client_info.name, "test-client");
    }

    #[tokio::test]
    async fn test_unsupported_version_creates_nothing() {
        let manager = SessionManager::new(SessionConfig::new());

        let err = manager.create_session(client(), "1999-01-01").await.unwrap_err();
        match err {
            SessionError::UnsupportedProtocolVersion {
                requested,
                supported,
            } => {
                assert_eq!(requested, "1999-01-01");
                assert!(supported.contains(&"2024-11-05".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_validate_fails_closed() {
        let manager = SessionManager::new(SessionConfig::new());

        assert!(matches!(
            manager.validate("").await,
            Err(SessionError::UnknownSession(_))
        ));
        assert!(matches!(
            manager.validate("garbage").await,
            Err(SessionError::UnknownSession(_))
        ));
        let never_issued = SessionId::generate().to_string();
        assert!(matches!(
            manager.validate(&never_issued).await,
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let manager = SessionManager::new(SessionConfig::new());
        let id = manager.create_session(client(), "2024-11-05").await.unwrap();

        assert!(manager.close(&id).await);
        assert!(!manager.close(&id).await);
        assert!(!manager.touch(&id).await);
        assert!(matches!(
            manager.validate(&id.to_string()).await,
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_expiry_on_lookup() {
        let config = SessionConfig::new()
            .with_idle_timeout(Duration::from_millis(30))
            .with_cleanup_task(false);
        let manager = SessionManager::new(config);
        let id = manager.create_session(client(), "2024-11-05").await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(manager.validate(&id.to_string()).await.is_err());
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_touch_keeps_session_alive() {
        let config = SessionConfig::new()
            .with_idle_timeout(Duration::from_millis(80))
            .with_cleanup_task(false);
        let manager = SessionManager::new(config);
        let id = manager.create_session(client(), "2024-11-05").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.touch(&id).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(manager.validate(&id.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_store_rejects_without_evicting_live_sessions() {
        let config = SessionConfig::new().with_max_sessions(3);
        let manager = SessionManager::new(config);

        let oldest = manager.create_session(client(), "2024-11-05").await.unwrap();
        manager.create_session(client(), "2024-11-05").await.unwrap();
        manager.create_session(client(), "2024-11-05").await.unwrap();

        for _ in 0..3 {
            let err = manager.create_session(client(), "2024-11-05").await.unwrap_err();
            assert!(matches!(err, SessionError::LimitReached { max: 3 }));
        }

        assert_eq!(manager.len().await, 3);
        assert!(manager.validate(&oldest.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_store_reuses_idle_slots() {
        let config = SessionConfig::new()
            .with_max_sessions(2)
            .with_idle_timeout(Duration::from_millis(40))
            .with_cleanup_task(false);
        let manager = SessionManager::new(config);

        let idle = manager.create_session(client(), "2024-11-05").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let live = manager.create_session(client(), "2024-11-05").await.unwrap();

        let fresh = manager.create_session(client(), "2024-11-05").await.unwrap();

        assert_eq!(manager.len().await, 2);
        assert!(manager.validate(&idle.to_string()).await.is_err());
        assert!(manager.validate(&live.to_string()).await.is_ok());
        assert!(manager.validate(&fresh.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_closing_frees_a_slot() {
        let manager = SessionManager::new(SessionConfig::new().with_max_sessions(1));

        let first = manager.create_session(client(), "2024-11-05").await.unwrap();
        assert!(manager.create_session(client(), "2024-11-05").await.is_err());

        assert!(manager.close(&first).await);
        assert!(manager.create_session(client(), "2024-11-05").await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let config = SessionConfig::new()
            .with_idle_timeout(Duration::from_millis(20))
            .with_cleanup_task(false);
        let manager = SessionManager::new(config);

        manager.create_session(client(), "2024-11-05").await.unwrap();
        manager.create_session(client(), "2025-03-26").await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(manager.cleanup_expired().await, 2);
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps() {
        let config = SessionConfig::new()
            .with_idle_timeout(Duration::from_millis(20))
            .with_cleanup_interval(Duration::from_millis(20));
        let manager = Arc::new(SessionManager::new(config));
        let handle = manager.spawn_cleanup_task().unwrap();

        manager.create_session(client(), "2024-11-05").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(manager.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_no_cleanup_task_without_timeout() {
        let config = SessionConfig::new().without_idle_timeout();
        let manager = Arc::new(SessionManager::new(config));
        assert!(manager.spawn_cleanup_task().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let manager = Arc::new(SessionManager::new(SessionConfig::new()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.create_session(client(), "2024-11-05").await.unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 32);
        assert_eq!(manager.stats().await.active, 32);
    }

    #[tokio::test]
    async fn test_stats() {
        let config = SessionConfig::new().with_max_sessions(100);
        let manager = SessionManager::new(config);
        manager.create_session(client(), "2024-11-05").await.unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.active, 1);
        assert_eq!(stats.capacity, 100);
    }
}
