//! Session Store Module
//!
//! Session lifecycle on top of the strategy engine. Every successful `load`
//! or `touch` pushes the expiry out by the full session TTL.
//!
//! `load` and `destroy` of one session are serialised, so a destroyed
//! session is never written back by a load that was already in flight.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::codec::CacheKey;
use crate::error::Result;
use crate::models::Session;
use crate::strategy::{CacheEngine, KeyLocks};

/// Namespace holding session entries.
pub const SESSION_NAMESPACE: &str = "session";

/// Random bytes per session id (256 bits).
const SESSION_ID_BYTES: usize = 32;

// == Session Store ==
/// Creates, loads and destroys sessions with a sliding TTL.
#[derive(Clone)]
pub struct SessionStore {
    engine: Arc<CacheEngine>,
    ttl: u64,
    locks: Arc<KeyLocks>,
}

impl SessionStore {
    /// # Arguments
    /// * `engine` - Engine the sessions are cached through
    /// * `ttl` - Idle timeout in seconds
    pub fn new(engine: Arc<CacheEngine>, ttl: u64) -> Self {
        Self {
            engine,
            ttl,
            locks: Arc::new(KeyLocks::new()),
        }
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    // == Create ==
    /// Starts a session for `user_id` and returns its id.
    pub async fn create(
        &self,
        user_id: &str,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        let session_id = generate_session_id();
        let now = self.engine.clock().now();
        let session = Session {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            created_at: now,
            last_accessed_at: now,
            attributes,
        };

        self.engine
            .set(&session_key(&session_id)?, &session, Some(self.ttl))
            .await?;
        debug!("Session created for user '{}'", user_id);
        Ok(session_id)
    }

    // == Load ==
    /// Returns the session and refreshes its expiry, or `None` once it has
    /// expired or been destroyed.
    pub async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let key = session_key(session_id)?;
        let _guard = self.locks.lock(session_id).await;
        let Some(mut session) = self.engine.peek::<Session>(&key).await? else {
            return Ok(None);
        };
        // Expired since the read: do not bring it back
        if !self.engine.refresh(&key, Some(self.ttl)).await? {
            return Ok(None);
        }

        session.last_accessed_at = self.engine.clock().now();
        self.engine.set(&key, &session, Some(self.ttl)).await?;
        Ok(Some(session))
    }

    // == Touch ==
    /// Refreshes a session's expiry. Returns false if it no longer exists.
    pub async fn touch(&self, session_id: &str) -> Result<bool> {
        Ok(self.load(session_id).await?.is_some())
    }

    // == Destroy ==
    /// Ends a session. Returns false if it did not exist.
    pub async fn destroy(&self, session_id: &str) -> Result<bool> {
        let key = session_key(session_id)?;
        let _guard = self.locks.lock(session_id).await;
        let removed = self.engine.delete(&key).await?;
        if removed {
            debug!("Session destroyed");
        }
        Ok(removed)
    }
}

fn session_key(session_id: &str) -> Result<CacheKey> {
    CacheKey::single(SESSION_NAMESPACE, session_id)
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::codec::KeyCodec;
    use crate::metrics::MetricsCollector;
    use crate::store::InMemoryStore;
    use crate::strategy::EngineOptions;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    fn setup(ttl: u64) -> (Arc<ManualClock>, SessionStore) {
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let engine = CacheEngine::new(
            store,
            KeyCodec::new("t").unwrap(),
            clock.clone(),
            Arc::new(MetricsCollector::new()),
            EngineOptions::default(),
        );
        (clock, SessionStore::new(Arc::new(engine), ttl))
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let (_, sessions) = setup(60);
        let attributes = HashMap::from([("theme".to_string(), json!("dark"))]);

        let id = sessions.create("user-1", attributes).await.unwrap();
        let session = sessions.load(&id).await.unwrap().unwrap();

        assert_eq!(session.session_id, id);
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.attribute("theme"), Some(&json!("dark")));
    }

    #[tokio::test]
    async fn test_session_ids_are_random_and_long() {
        let (_, sessions) = setup(60);
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let id = sessions.create("u", HashMap::new()).await.unwrap();
            assert_eq!(id.len(), SESSION_ID_BYTES * 2);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
            ids.insert(id);
        }
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn test_load_extends_expiry() {
        let (clock, sessions) = setup(10);
        let id = sessions.create("user-1", HashMap::new()).await.unwrap();

        clock.advance(Duration::from_secs(8));
        assert!(sessions.load(&id).await.unwrap().is_some());

        clock.advance(Duration::from_secs(8));
        let session = sessions.load(&id).await.unwrap().unwrap();
        assert_eq!(session.last_accessed_at, clock.now());
        assert_eq!(session.created_at.timestamp(), 1_000);
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let (clock, sessions) = setup(10);
        let id = sessions.create("user-1", HashMap::new()).await.unwrap();

        clock.advance(Duration::from_secs(11));
        assert_eq!(sessions.load(&id).await.unwrap(), None);
        assert!(!sessions.touch(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_touch_and_destroy() {
        let (clock, sessions) = setup(10);
        let id = sessions.create("user-1", HashMap::new()).await.unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(sessions.touch(&id).await.unwrap());
        clock.advance(Duration::from_secs(9));

        assert!(sessions.destroy(&id).await.unwrap());
        assert!(!sessions.destroy(&id).await.unwrap());
        assert_eq!(sessions.load(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_session_is_absent() {
        let (_, sessions) = setup(10);
        assert_eq!(sessions.load("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroy_during_load_wins() {
        use crate::clock::SystemClock;
        use crate::store::testing::{FlakyStore, StoreOp};

        let store = Arc::new(FlakyStore::new(Arc::new(SystemClock)));
        let engine = CacheEngine::new(
            store.clone(),
            KeyCodec::new("t").unwrap(),
            Arc::new(SystemClock),
            Arc::new(MetricsCollector::new()),
            EngineOptions::default(),
        );
        let sessions = SessionStore::new(Arc::new(engine), 60);
        let id = sessions.create("user-1", HashMap::new()).await.unwrap();
        // Stall reads of the session entry itself, not its version counter
        store.delay_after(StoreOp::Get, ":v1", Duration::from_millis(100));

        let loading = {
            let sessions = sessions.clone();
            let id = id.clone();
            tokio::spawn(async move { sessions.load(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(sessions.destroy(&id).await.unwrap());
        assert!(loading.await.unwrap().unwrap().is_some());
        assert_eq!(sessions.load(&id).await.unwrap(), None);
    }
}

