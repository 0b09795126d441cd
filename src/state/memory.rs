//! In-memory state storage.
//!
//! Used by tests and by embedders that persist state themselves.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::lock::LockInfo;
use super::store::StateStore;
use super::types::State;
use crate::error::Result;

/// State store that keeps the snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<State>>,
    lock: Mutex<Option<LockInfo>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `state`.
    #[must_use]
    pub fn with_state(state: State) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<State> {
        self.state.lock().clone()
    }

    /// Number of times [`StateStore::save`] was called.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<State>> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &State) -> Result<()> {
        *self.state.lock() = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.state.lock() = None;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state.lock().is_some())
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        let mut lock = self.lock.lock();
        if let Some(existing) = lock.as_ref().filter(|l| !l.is_expired()) {
            return Err(existing.conflict().into());
        }
        let info = LockInfo::new(holder, operation);
        *lock = Some(info.clone());
        Ok(info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        let mut lock = self.lock.lock();
        if lock.as_ref().is_some_and(|l| l.lock_id == lock_id) {
            *lock = None;
        }
        Ok(())
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        Ok(self.lock.lock().take())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        Ok(self.lock.lock().clone())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }

    fn location(&self) -> String {
        "(in memory)".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.load().await.unwrap().is_none());

        let state = State::new();
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));
        assert_eq!(store.save_count(), 1);

        store.delete().await.unwrap();
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_lock() {
        let store = MemoryStateStore::new();
        let lock = store.acquire_lock("a", "apply").await.unwrap();
        assert!(store.acquire_lock("b", "apply").await.is_err());
        store.release_lock("other").await.unwrap();
        assert!(store.is_locked().await.unwrap());
        store.release_lock(&lock.lock_id).await.unwrap();
        assert!(!store.is_locked().await.unwrap());
    }
}
