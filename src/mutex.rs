//! Named Mutex Registry
//!
//! Serializes mutating calls that share a parent resource, e.g. two databases
//! created on the same Cloud SQL instance. Locks are created lazily per key
//! and live as long as the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of named locks
#[derive(Debug, Default, Clone)]
pub struct MutexKv {
    store: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive possession of a named lock; released on drop
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        tracing::debug!("Unlocked {:?}", self.key);
    }
}

impl MutexKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        // The map only ever gains entries, so a poisoned map is still consistent
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait until the named lock is free and take it
    pub async fn lock(&self, key: &str) -> KeyGuard {
        tracing::debug!("Locking {:?}", key);
        let guard = self.entry(key).lock_owned().await;
        tracing::debug!("Locked {:?}", key);
        KeyGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Take the named lock only if nobody holds it
    pub fn try_lock(&self, key: &str) -> Option<KeyGuard> {
        let guard = self.entry(key).try_lock_owned().ok()?;
        Some(KeyGuard {
            key: key.to_string(),
            _guard: guard,
        })
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
