use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;

use super::{DocumentSink, DocumentSource, DurabilityLevel, StoreError};

/// In-process store, ordered by raw id bytes. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<BTreeMap<Vec<u8>, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, document: impl Into<Bytes>) {
        let id: String = id.into();
        self.lock().insert(id.into_bytes(), document.into());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn document(&self, id: &str) -> Option<Bytes> {
        self.lock().get(id.as_bytes()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Bytes>> {
        // a panic while holding the lock cannot leave the map half-updated
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentSource for MemoryStore {
    fn scan_ids(&self, after: Option<String>) -> BoxStream<'_, Result<String, StoreError>> {
        let lower = match after {
            Some(a) => Bound::Excluded(a.into_bytes()),
            None => Bound::Unbounded,
        };
        let ids: Vec<Result<String, StoreError>> = self
            .lock()
            .range((lower, Bound::Unbounded))
            .map(|(k, _)| String::from_utf8(k.clone()).map_err(|e| StoreError::InvalidId(e.to_string())))
            .collect();
        stream::iter(ids).boxed()
    }

    async fn get(&self, id: &str) -> Result<Bytes, StoreError> {
        self.document(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl DocumentSink for MemoryStore {
    async fn upsert(&self, id: &str, document: Bytes, _durability: DurabilityLevel) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        self.lock().insert(id.as_bytes().to_vec(), document);
        Ok(())
    }
}
