use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{cart::Cart, error::Result, session::SessionState};

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: SessionState) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<SessionState>>;
    async fn delete(&self, id: &str) -> Result<()>;

    /// Loads the session, creating a fresh one on first contact.
    async fn get_or_create(&self, id: &str) -> Result<SessionState> {
        Ok(self
            .get(id)
            .await?
            .unwrap_or_else(|| SessionState::new(id)))
    }
}

/// Trait for storing carts, keyed by session id
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Missing carts load as empty.
    async fn load(&self, session_id: &str) -> Result<Cart>;
    async fn store(&self, session_id: &str, cart: Cart) -> Result<()>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, SessionState>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: SessionState) -> Result<()> {
        self.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// In-memory implementation of CartStorage
pub struct InMemoryCartStorage {
    carts: Arc<DashMap<String, Cart>>,
}

impl InMemoryCartStorage {
    pub fn new() -> Self {
        Self {
            carts: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryCartStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CartStorage for InMemoryCartStorage {
    async fn load(&self, session_id: &str) -> Result<Cart> {
        Ok(self
            .carts
            .get(session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn store(&self, session_id: &str, cart: Cart) -> Result<()> {
        self.carts.insert(session_id.to_string(), cart);
        Ok(())
    }
}

/// One async mutex per session id, so turns of the same session run one at a
/// time while different sessions proceed in parallel.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;

    #[tokio::test]
    async fn test_session_get_or_create() {
        let storage = InMemorySessionStorage::new();
        let mut session = storage.get_or_create("s1").await.unwrap();
        assert!(storage.get("s1").await.unwrap().is_none());

        session.awaiting_customer_details = true;
        storage.save(session).await.unwrap();
        assert!(storage.get_or_create("s1").await.unwrap().awaiting_customer_details);

        storage.delete("s1").await.unwrap();
        assert!(storage.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cart_storage_defaults_to_empty() {
        let storage = InMemoryCartStorage::new();
        assert!(storage.load("s1").await.unwrap().is_empty());

        let mut cart = Cart::default();
        cart.add("Yerba Playadito 1kg", 1, Decimal::new(2500, 0));
        storage.store("s1", cart).await.unwrap();
        assert_eq!(storage.load("s1").await.unwrap().items.len(), 1);
        assert!(storage.load("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_locks_serialize_same_session() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;

        let other_session = tokio::time::timeout(Duration::from_millis(50), locks.acquire("s2")).await;
        assert!(other_session.is_ok());

        let same_session = tokio::time::timeout(Duration::from_millis(50), locks.acquire("s1")).await;
        assert!(same_session.is_err());

        drop(guard);
        let same_session = tokio::time::timeout(Duration::from_millis(50), locks.acquire("s1")).await;
        assert!(same_session.is_ok());
    }
}
