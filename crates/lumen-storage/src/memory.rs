//! In-memory storage backend.
//!
//! Used by tests across the workspace and for dry runs. Supports failure injection for
//! puts and deletes, and lets tests backdate objects to exercise age-based cleanup.

use crate::keys::validate_key;
use crate::traits::{ObjectSummary, Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const BASE_URL: &str = "memory://lumen";

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<String, MemoryObject>,
    put_calls: usize,
    /// Fail the put whose 1-based call number equals this value, and every later one
    fail_puts_from: Option<usize>,
    /// Fail puts whose key contains this substring
    fail_put_matching: Option<String>,
    fail_deletes: bool,
}

/// Storage backend that keeps objects in a shared map
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object directly, bypassing failure injection
    pub fn insert(&self, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.lock().objects.insert(
            key.to_string(),
            MemoryObject {
                data: data.into(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn data(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().objects.get(key).map(|o| o.content_type.clone())
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put_calls(&self) -> usize {
        self.lock().put_calls
    }

    pub fn set_last_modified(&self, key: &str, at: DateTime<Utc>) {
        if let Some(object) = self.lock().objects.get_mut(key) {
            object.last_modified = at;
        }
    }

    /// Let the next `n` puts succeed, then fail every later one
    pub fn fail_puts_after(&self, n: usize) {
        let mut state = self.lock();
        state.fail_puts_from = Some(state.put_calls + n + 1);
    }

    pub fn fail_puts_matching(&self, pattern: &str) {
        self.lock().fail_put_matching = Some(pattern.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_puts_from = None;
        state.fail_put_matching = None;
        state.fail_deletes = false;
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        {
            let mut state = self.lock();
            state.put_calls += 1;
            let call = state.put_calls;
            let injected = state.fail_puts_from.is_some_and(|from| call >= from)
                || state
                    .fail_put_matching
                    .as_deref()
                    .is_some_and(|pattern| key.contains(pattern));
            if injected {
                return Err(StorageError::UploadFailed(format!(
                    "injected failure for {}",
                    key
                )));
            }
            state.objects.insert(
                key.to_string(),
                MemoryObject {
                    data,
                    content_type: content_type.to_string(),
                    last_modified: Utc::now(),
                },
            );
        }
        Ok(self.public_url(key))
    }

    async fn get(&self, key_or_url: &str) -> StorageResult<StoredObject> {
        let key = self.key_from_url(key_or_url);
        let state = self.lock();
        let object = state
            .objects
            .get(&key)
            .ok_or_else(|| StorageError::NotFound(key.clone()))?;
        Ok(StoredObject {
            data: object.data.clone(),
            content_type: Some(object.content_type.clone()),
            content_length: object.data.len() as u64,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let mut state = self.lock();
        if state.fail_deletes {
            return Err(StorageError::DeleteFailed(format!(
                "injected failure for {}",
                key
            )));
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!(
            "{}/{}?content-type={}&expires-in={}",
            BASE_URL,
            key,
            content_type,
            expires_in.as_secs()
        ))
    }

    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let state = self.lock();
        let mut found: Vec<ObjectSummary> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                last_modified: object.last_modified,
                size: object.data.len() as u64,
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectSummary> {
        let state = self.lock();
        state
            .objects
            .get(key)
            .map(|object| ObjectSummary {
                key: key.to_string(),
                last_modified: object.last_modified,
                size: object.data.len() as u64,
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", BASE_URL, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_by_url() {
        let storage = InMemoryStorage::new();
        let url = storage
            .put("media/a_thumb.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await
            .unwrap();
        let object = storage.get(&url).await.unwrap();
        assert_eq!(object.data, Bytes::from_static(b"abc"));
        assert_eq!(object.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn injected_put_failure_after_n_calls() {
        let storage = InMemoryStorage::new();
        storage.fail_puts_after(1);
        assert!(storage.put("a", Bytes::new(), "x/y").await.is_ok());
        assert!(storage.put("b", Bytes::new(), "x/y").await.is_err());
        assert!(storage.put("c", Bytes::new(), "x/y").await.is_err());
        assert_eq!(storage.keys(), vec!["a"]);
        assert_eq!(storage.put_calls(), 3);
    }

    #[tokio::test]
    async fn backdated_objects_keep_their_timestamp() {
        let storage = InMemoryStorage::new();
        storage.insert("uploads/x.jpg", Bytes::from_static(b"x"), "image/jpeg");
        let old = Utc::now() - chrono::Duration::hours(30);
        storage.set_last_modified("uploads/x.jpg", old);
        let listed = storage.list_by_prefix("uploads/").await.unwrap();
        assert_eq!(listed[0].last_modified, old);
    }
}
