use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::Session;

/// Storage backend failure.
#[derive(Debug, thiserror::Error)]
#[error("storage backend error: {0}")]
pub struct StorageError(pub String);

/// Session store errors.
///
/// A corrupt record is not an error: [`SessionStore::load`] deletes it and
/// reports the session as absent.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Origin-scoped key/value storage (the browser's per-origin local storage,
/// or anything that behaves like it).
///
/// Each operation must be atomic on its own; no cross-call locking is
/// expected. Concurrent writers resolve last-write-wins.
///
/// # Example
///
/// ```rust,ignore
/// impl Storage for MyKv {
///     async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
///         self.db.get(key).await.map_err(|e| StorageError(e.to_string()))
///     }
///     // set, remove ...
/// }
/// ```
pub trait Storage: Send + Sync + 'static {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Write `value` under `key`, replacing any prior value.
    fn set(&self, key: &str, value: String)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// In-process storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, for inspection outside async code.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Persists the last accepted [`Session`] under a single fixed key.
#[derive(Debug, Clone)]
pub struct SessionStore<S> {
    storage: S,
    key: String,
}

impl<S: Storage> SessionStore<S> {
    #[must_use]
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Underlying storage backend.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Storage key of the session record.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize and write `session`, overwriting any prior record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the backend write fails.
    pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let payload = serde_json::to_string(session)?;
        self.storage.set(&self.key, payload).await?;
        Ok(())
    }

    /// Read the stored session.
    ///
    /// Expiry is not re-checked here. A record that fails to deserialize is
    /// deleted and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] only if the backend read fails.
    pub async fn load(&self) -> Result<Option<Session>, StoreError> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                tracing::warn!(key = %self.key, error = %error, "Stored session is corrupt; removing it");
                if let Err(e) = self.storage.remove(&self.key).await {
                    tracing::warn!(key = %self.key, error = %e, "Failed to remove corrupt session record");
                }
                Ok(None)
            }
        }
    }

    /// Remove the stored session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend removal fails.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.storage.remove(&self.key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STORAGE_KEY;

    fn session(id: &str) -> Session {
        Session {
            subject_id: id.into(),
            email: format!("{id}@example.com"),
            display_name: "User".into(),
            year_of_study: "Unknown".into(),
            role: "student".into(),
            is_admin: false,
            shell_origin: "https://shell.example.com".into(),
            micro_app_origin: "https://app.example.com".into(),
        }
    }

    fn store() -> SessionStore<MemoryStorage> {
        SessionStore::new(MemoryStorage::new(), DEFAULT_STORAGE_KEY)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = store();
        store.save(&session("u1")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session("u1")));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = store();
        store.save(&session("u1")).await.unwrap();
        store.save(&session("u2")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session("u2")));
    }

    #[tokio::test]
    async fn test_load_empty() {
        assert_eq!(store().load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = store();
        store.save(&session("u1")).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_is_removed() {
        let store = store();
        store
            .storage()
            .set(DEFAULT_STORAGE_KEY, "{not json".into())
            .await
            .unwrap();

        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.storage().peek(DEFAULT_STORAGE_KEY), None);
    }

    #[tokio::test]
    async fn test_wrong_shape_record_is_removed() {
        let store = store();
        store
            .storage()
            .set(DEFAULT_STORAGE_KEY, r#"{"uid":"u1"}"#.into())
            .await
            .unwrap();

        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.storage().peek(DEFAULT_STORAGE_KEY), None);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let storage = MemoryStorage::new();
        let a = SessionStore::new(storage.clone(), "a");
        let b = SessionStore::new(storage, "b");
        a.save(&session("u1")).await.unwrap();
        assert_eq!(b.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_same_tick_save_and_clear_is_last_write_wins() {
        let store = store();
        let first = session("u1");
        let (saved, cleared) = tokio::join!(store.save(&first), store.clear());
        saved.unwrap();
        cleared.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        let second = session("u2");
        let (cleared, saved) = tokio::join!(store.clear(), store.save(&second));
        cleared.unwrap();
        saved.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_a_whole_record() {
        let storage = MemoryStorage::new();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = SessionStore::new(storage.clone(), DEFAULT_STORAGE_KEY);
            tasks.push(tokio::spawn(async move {
                if i % 4 == 3 {
                    store.clear().await
                } else {
                    store.save(&session(&format!("u{i}"))).await
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let raw = storage.peek(DEFAULT_STORAGE_KEY);
        let store = SessionStore::new(storage.clone(), DEFAULT_STORAGE_KEY);
        let loaded = store.load().await.unwrap();
        // Whatever won, it is either absent or a well-formed record.
        assert_eq!(raw.is_some(), loaded.is_some());
    }
}
