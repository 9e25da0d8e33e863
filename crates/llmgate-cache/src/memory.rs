use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{CacheError, CacheFingerprint, CacheStore, CompletionResult};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    inner: Arc<RwLock<HashMap<CacheFingerprint, CompletionResult>>>,
}

impl InMemoryCacheStore {
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(
        &self,
        fingerprint: &CacheFingerprint,
        _trace_id: &str,
    ) -> Result<Option<CompletionResult>, CacheError> {
        let guard = self.inner.read().await;
        Ok(guard.get(fingerprint).cloned())
    }

    async fn set(
        &self,
        fingerprint: &CacheFingerprint,
        entry: &CompletionResult,
        _trace_id: &str,
    ) -> Result<(), CacheError> {
        let mut guard = self.inner.write().await;
        guard.insert(fingerprint.clone(), entry.clone());
        Ok(())
    }
}
