use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{CacheError, CacheFingerprint, CacheStore, CompletionResult};
use tokio::sync::Mutex;
use tracing::debug;

type Entries = BTreeMap<CacheFingerprint, CompletionResult>;

#[derive(Clone)]
pub struct JsonFileCacheStore {
    path: PathBuf,
    entries: Arc<Mutex<Option<Entries>>>,
}

impl JsonFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), entries: Arc::new(Mutex::new(None)) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries, CacheError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(err) => {
                return Err(CacheError::Read(format!("{}: {err}", self.path.display())));
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Entries::new());
        }
        serde_json::from_slice(&raw)
            .map_err(|err| CacheError::Corrupt(format!("{}: {err}", self.path.display())))
    }

    async fn persist(&self, entries: &Entries) -> Result<(), CacheError> {
        let encoded = serde_json::to_vec_pretty(entries)
            .map_err(|err| CacheError::Write(err.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| CacheError::Write(format!("{}: {err}", parent.display())))?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, encoded)
            .await
            .map_err(|err| CacheError::Write(format!("{}: {err}", staging.display())))?;
        if let Err(err) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(CacheError::Write(format!("{}: {err}", self.path.display())));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn get(
        &self,
        fingerprint: &CacheFingerprint,
        trace_id: &str,
    ) -> Result<Option<CompletionResult>, CacheError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            let loaded = self.load().await?;
            debug!(
                event = "cache.file.loaded",
                category = "llm",
                trace_id,
                path = %self.path.display(),
                entries = loaded.len()
            );
            *guard = Some(loaded);
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(fingerprint)).cloned())
    }

    async fn set(
        &self,
        fingerprint: &CacheFingerprint,
        entry: &CompletionResult,
        _trace_id: &str,
    ) -> Result<(), CacheError> {
        let mut guard = self.entries.lock().await;
        let mut entries = match guard.take() {
            Some(entries) => entries,
            None => self.load().await.map_err(|err| CacheError::Write(err.to_string()))?,
        };
        let previous = entries.insert(fingerprint.clone(), entry.clone());
        let outcome = self.persist(&entries).await;
        if outcome.is_err() {
            // Memory must keep mirroring the file.
            match previous {
                Some(previous) => entries.insert(fingerprint.clone(), previous),
                None => entries.remove(fingerprint),
            };
        }
        *guard = Some(entries);
        outcome
    }
}
