//! Process-wide persisted key-value state.
//!
//! The engine keeps its small durable records (guest cart blob, pending
//! snapshot, dedupe markers, last-confirmed-order cache, identity reference)
//! in a key-value store behind the [`KvStore`] trait. The store is injected
//! into components rather than accessed ambiently, so tests can substitute
//! their own.
//!
//! Lifecycle contract: absent keys read as defaults, nothing is torn down,
//! values persist across restarts of the embedding process for as long as
//! the backing store does. There is no locking; safety against concurrent
//! writers comes from the idempotency design, not mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::session::SessionKind;

/// Errors that can occur when writing to a [`KvStore`].
#[derive(Debug, Error)]
pub enum KvError {
    /// The backing store rejected the write (e.g., quota exhausted).
    #[error("storage write failed: {0}")]
    WriteFailed(String),

    /// The value could not be serialized.
    #[error("serialize failed: {0}")]
    Serialize(String),
}

/// Raw string-to-string persisted storage.
///
/// Implementations must tolerate concurrent readers; writes are last-wins.
pub trait KvStore: Send + Sync {
    /// Read the raw value under `key`, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::WriteFailed`] if the backing store rejects the
    /// write.
    fn put(&self, key: &str, value: String) -> Result<(), KvError>;

    /// Remove the value under `key`, if present.
    fn remove(&self, key: &str);
}

/// In-memory [`KvStore`] for embedders without durable storage and for tests.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), KvError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KvError::WriteFailed("store lock poisoned".to_string()))?;
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

/// JSON-typed facade over a [`KvStore`].
///
/// Reads swallow corruption: a value that fails to deserialize is logged and
/// treated as absent, because corrupt client state is unrecoverable and a
/// broken read must never take the caller down with it.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<dyn KvStore>,
}

impl StateStore {
    /// Wrap an injected store.
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self { inner }
    }

    /// Convenience constructor over a fresh [`MemoryKvStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Read and deserialize the value under `key`.
    ///
    /// Absent and corrupt values both read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.inner.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding corrupt persisted value");
                None
            }
        }
    }

    /// Serialize and write `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if serialization or the backing write fails.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), KvError> {
        let raw = serde_json::to_string(value).map_err(|e| KvError::Serialize(e.to_string()))?;
        self.inner.put(key, raw)
    }

    /// Remove the value under `key`.
    pub fn remove(&self, key: &str) {
        self.inner.remove(key);
    }

    /// Whether a boolean marker is set under `key`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.get::<bool>(key).unwrap_or(false)
    }

    /// Set a boolean marker under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the backing write fails.
    pub fn set_flag(&self, key: &str) -> Result<(), KvError> {
        self.put(key, &true)
    }
}

/// Well-known persisted state keys.
///
/// These names are part of the storage contract: they must remain stable
/// across restarts so state written before a reload is found after it.
pub mod keys {
    use super::SessionKind;
    use seagrape_core::PaymentSessionId;

    /// Guest cart blob.
    pub const GUEST_CART: &str = "seagrape.cart.guest";

    /// Persisted identity reference for the authenticated session.
    pub const IDENTITY: &str = "seagrape.identity";

    /// Cache of the most recently confirmed order, for re-rendering the
    /// confirmation view without a second create.
    pub const LAST_CONFIRMED_ORDER: &str = "seagrape.order.last-confirmed";

    /// Pending-order snapshot slot for the given session kind.
    #[must_use]
    pub const fn pending_snapshot(kind: SessionKind) -> &'static str {
        match kind {
            SessionKind::Guest => "seagrape.checkout.pending.guest",
            SessionKind::Account => "seagrape.checkout.pending.account",
        }
    }

    /// Dedupe marker for one payment session, scoped by session kind.
    #[must_use]
    pub fn dedupe_marker(kind: SessionKind, session_id: &PaymentSessionId) -> String {
        format!("seagrape.order.confirmed.{kind}.{session_id}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seagrape_core::PaymentSessionId;

    #[test]
    fn test_absent_key_reads_none() {
        let store = StateStore::in_memory();
        assert!(store.get::<String>("missing").is_none());
        assert!(!store.flag("missing"));
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = StateStore::in_memory();
        store.put("count", &7u32).unwrap();
        assert_eq!(store.get::<u32>("count"), Some(7));

        store.remove("count");
        assert!(store.get::<u32>("count").is_none());
    }

    #[test]
    fn test_corrupt_value_reads_none() {
        let raw = Arc::new(MemoryKvStore::new());
        raw.put("broken", "{not json".to_string()).unwrap();

        let store = StateStore::new(raw);
        assert!(store.get::<u32>("broken").is_none());
    }

    #[test]
    fn test_flags() {
        let store = StateStore::in_memory();
        assert!(!store.flag("marker"));
        store.set_flag("marker").unwrap();
        assert!(store.flag("marker"));
    }

    #[test]
    fn test_key_scoping_by_session_kind() {
        assert_ne!(
            keys::pending_snapshot(SessionKind::Guest),
            keys::pending_snapshot(SessionKind::Account)
        );

        let sess = PaymentSessionId::new("sess_1");
        assert_ne!(
            keys::dedupe_marker(SessionKind::Guest, &sess),
            keys::dedupe_marker(SessionKind::Account, &sess)
        );
    }
}
