//! Mock definition storage.
//!
//! [`DefinitionStore`] is the single interface the rest of the engine talks
//! to. Two implementations back it:
//!
//! - [`MemoryStore`]: an in-process map, lost on restart.
//! - [`DurableStore`]: definitions serialized into a keyed [`KvBackend`]
//!   (the bundled one is [`FileBackend`]).
//!
//! [`FallbackStore`] layers the two: writes go to the durable store first and
//! fall back to memory when it fails. [`build_store`] picks the active
//! implementation once, at startup.
//!
//! `put` never moves `requestCount` or `lastUsedAt` backwards: it keeps the
//! larger of the stored and incoming values, so an invocation recorded between
//! a caller's read and its write is not lost.

use crate::config::StorageConfig;
use crate::definition::MockDefinition;
use crate::error::StoreError;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Storage for mock definitions, addressable by id.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Insert or replace a definition, keeping the stored invocation counters
    /// when they are ahead of the incoming ones.
    async fn put(&self, definition: MockDefinition) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<MockDefinition>, StoreError>;

    /// Remove a definition. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn list_all(&self) -> Result<Vec<MockDefinition>, StoreError>;

    /// Atomically bump `requestCount` and set `lastUsedAt`.
    ///
    /// Returns the updated definition, or `None` if it no longer exists.
    async fn record_invocation(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MockDefinition>, StoreError>;

    /// Short name for logs.
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// In-process store
// ============================================================================

/// In-process definition map.
#[derive(Default)]
pub struct MemoryStore {
    definitions: RwLock<HashMap<String, MockDefinition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `definitions`.
    pub fn from_definitions(definitions: impl IntoIterator<Item = MockDefinition>) -> Self {
        let map = definitions
            .into_iter()
            .map(|def| (def.id.clone(), def))
            .collect();
        Self {
            definitions: RwLock::new(map),
        }
    }

    pub async fn len(&self) -> usize {
        self.definitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.definitions.read().await.is_empty()
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn put(&self, mut definition: MockDefinition) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write().await;
        if let Some(stored) = definitions.get(&definition.id) {
            definition.absorb_counters(stored);
        }
        definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MockDefinition>, StoreError> {
        Ok(self.definitions.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.definitions.write().await.remove(id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<MockDefinition>, StoreError> {
        Ok(self.definitions.read().await.values().cloned().collect())
    }

    async fn record_invocation(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MockDefinition>, StoreError> {
        let mut definitions = self.definitions.write().await;
        Ok(definitions.get_mut(id).map(|def| {
            def.touch(now);
            def.clone()
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Durable keyed store
// ============================================================================

/// A keyed string store reachable via get/set/delete.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Key-value backend storing one file per key under a directory.
pub struct FileBackend {
    directory: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a backend rooted at `directory`.
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(key)))
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

const INDEX_KEY: &str = "mocks:index";

fn definition_key(id: &str) -> String {
    format!("mock:{}", id)
}

/// Definitions stored as JSON documents in a [`KvBackend`].
///
/// Keys are `mock:<id>` plus a `mocks:index` array of ids used for listing.
/// Read-modify-write sequences (index maintenance, invocation counting) are
/// serialized through one in-process mutex.
pub struct DurableStore {
    backend: Arc<dyn KvBackend>,
    write_lock: Mutex<()>,
}

impl DurableStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_index(&self) -> Result<Vec<String>, StoreError> {
        match self.backend.get(INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, ids: &[String]) -> Result<(), StoreError> {
        self.backend
            .set(INDEX_KEY, &serde_json::to_string(ids)?)
            .await
    }

    async fn read_definition(&self, id: &str) -> Result<Option<MockDefinition>, StoreError> {
        match self.backend.get(&definition_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_definition(&self, definition: &MockDefinition) -> Result<(), StoreError> {
        let raw = serde_json::to_string(definition)?;
        self.backend.set(&definition_key(&definition.id), &raw).await
    }
}

#[async_trait]
impl DefinitionStore for DurableStore {
    async fn put(&self, mut definition: MockDefinition) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if let Some(stored) = self.read_definition(&definition.id).await? {
            definition.absorb_counters(&stored);
        }
        self.write_definition(&definition).await?;

        let mut ids = self.read_index().await?;
        if !ids.iter().any(|id| id == &definition.id) {
            ids.push(definition.id.clone());
            self.write_index(&ids).await?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MockDefinition>, StoreError> {
        self.read_definition(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let existed = self.read_definition(id).await?.is_some();
        self.backend.delete(&definition_key(id)).await?;

        let mut ids = self.read_index().await?;
        let before = ids.len();
        ids.retain(|known| known != id);
        if ids.len() != before {
            self.write_index(&ids).await?;
        }
        Ok(existed)
    }

    async fn list_all(&self) -> Result<Vec<MockDefinition>, StoreError> {
        let ids = self.read_index().await?;
        let mut definitions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(def) = self.read_definition(&id).await? {
                definitions.push(def);
            }
        }
        Ok(definitions)
    }

    async fn record_invocation(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MockDefinition>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut definition) = self.read_definition(id).await? else {
            return Ok(None);
        };
        definition.touch(now);
        self.write_definition(&definition).await?;
        Ok(Some(definition))
    }

    fn backend_name(&self) -> &'static str {
        "durable"
    }
}

// ============================================================================
// Durable-first store with in-process fallback
// ============================================================================

/// Durable store backed by an in-process map when the durable side fails.
///
/// The memory side only ever holds writes the durable side refused, so a
/// record found in memory is newer than any durable copy and wins on reads.
/// Mutations are serialized so a parked record cannot be dropped while an
/// invocation is being counted against it.
pub struct FallbackStore {
    durable: DurableStore,
    memory: MemoryStore,
    write_lock: Mutex<()>,
}

impl FallbackStore {
    pub fn new(durable: DurableStore) -> Self {
        Self {
            durable,
            memory: MemoryStore::new(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl DefinitionStore for FallbackStore {
    async fn put(&self, mut definition: MockDefinition) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let id = definition.id.clone();
        if let Some(parked) = self.memory.get(&id).await? {
            definition.absorb_counters(&parked);
        }

        match self.durable.put(definition.clone()).await {
            Ok(()) => {
                // The durable copy is now the newest one.
                self.memory.delete(&id).await?;
                Ok(())
            }
            Err(e) => {
                warn!(mock_id = %id, error = %e, "Durable write failed, storing in memory");
                self.memory.put(definition).await
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<MockDefinition>, StoreError> {
        if let Some(parked) = self.memory.get(id).await? {
            return Ok(Some(parked));
        }
        self.durable.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        // Durable first; a failure leaves both copies in place.
        let in_durable = self.durable.delete(id).await?;
        let in_memory = self.memory.delete(id).await?;
        Ok(in_durable || in_memory)
    }

    async fn list_all(&self) -> Result<Vec<MockDefinition>, StoreError> {
        let mut definitions = self.memory.list_all().await?;
        let parked: HashSet<String> = definitions.iter().map(|d| d.id.clone()).collect();
        definitions.extend(
            self.durable
                .list_all()
                .await?
                .into_iter()
                .filter(|d| !parked.contains(&d.id)),
        );
        Ok(definitions)
    }

    async fn record_invocation(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MockDefinition>, StoreError> {
        let _guard = self.write_lock.lock().await;
        if let Some(def) = self.memory.record_invocation(id, now).await? {
            return Ok(Some(def));
        }
        self.durable.record_invocation(id, now).await
    }

    fn backend_name(&self) -> &'static str {
        "durable+memory"
    }
}

/// Select the store implementation for the configured storage.
///
/// A durable backend that cannot be opened degrades to the in-process store.
pub async fn build_store(config: &StorageConfig) -> Arc<dyn DefinitionStore> {
    match config {
        StorageConfig::Memory => {
            info!("Using in-memory definition store");
            Arc::new(MemoryStore::new())
        }
        StorageConfig::File { directory } => match FileBackend::open(directory).await {
            Ok(backend) => {
                info!(directory = %directory.display(), "Using file-backed definition store");
                Arc::new(FallbackStore::new(DurableStore::new(Arc::new(backend))))
            }
            Err(e) => {
                warn!(
                    directory = %directory.display(),
                    error = %e,
                    "Durable store unavailable, using in-memory definition store"
                );
                Arc::new(MemoryStore::new())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionInput;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn definition(id: &str) -> MockDefinition {
        DefinitionInput {
            id: Some(id.to_string()),
            name: Some(format!("mock {}", id)),
            endpoint: Some("/things".into()),
            ..Default::default()
        }
        .into_definition(Utc::now(), Duration::days(30))
        .unwrap()
    }

    /// Backend whose writes can be switched off.
    #[derive(Default)]
    struct FlakyBackend {
        inner: RwLock<HashMap<String, String>>,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
    }

    #[async_trait]
    impl KvBackend for FlakyBackend {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("read refused".into()));
            }
            Ok(self.inner.read().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("write refused".into()));
            }
            self.inner
                .write()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("write refused".into()));
            }
            self.inner.write().await.remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_memory_crud() {
        let store = MemoryStore::new();
        store.put(definition("a")).await.unwrap();
        store.put(definition("b")).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("a").await.unwrap().unwrap().id, "a");
        assert!(store.get("zzz").await.unwrap().is_none());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        assert!(backend.get("mock:x/y").await.unwrap().is_none());
        backend.set("mock:x/y", "hello").await.unwrap();
        assert_eq!(backend.get("mock:x/y").await.unwrap().as_deref(), Some("hello"));
        backend.delete("mock:x/y").await.unwrap();
        backend.delete("mock:x/y").await.unwrap();
        assert!(backend.get("mock:x/y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_durable_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).await.unwrap();
            let store = DurableStore::new(Arc::new(backend));
            store.put(definition("persisted")).await.unwrap();
            store.put(definition("gone")).await.unwrap();
            assert!(store.delete("gone").await.unwrap());
        }

        let backend = FileBackend::open(dir.path()).await.unwrap();
        let store = DurableStore::new(Arc::new(backend));
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "persisted");
    }

    #[tokio::test]
    async fn test_concurrent_invocations_memory() {
        let store = Arc::new(MemoryStore::new());
        store.put(definition("hot")).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.record_invocation("hot", Utc::now()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let def = store.get("hot").await.unwrap().unwrap();
        assert_eq!(def.request_count, 50);
        assert!(def.last_used_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_invocations_durable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        let store = Arc::new(DurableStore::new(Arc::new(backend)));
        store.put(definition("hot")).await.unwrap();

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.record_invocation("hot", Utc::now()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get("hot").await.unwrap().unwrap().request_count, 25);
    }

    #[tokio::test]
    async fn test_record_invocation_missing() {
        let store = MemoryStore::new();
        assert!(store
            .record_invocation("nope", Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fallback_on_write_failure() {
        let backend = Arc::new(FlakyBackend::default());
        let store = FallbackStore::new(DurableStore::new(backend.clone()));

        store.put(definition("durable")).await.unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        store.put(definition("parked")).await.unwrap();

        // Parked definition lives in memory only
        assert!(backend.inner.read().await.get("mock:parked").is_none());
        assert_eq!(store.get("parked").await.unwrap().unwrap().id, "parked");

        let mut ids: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["durable".to_string(), "parked".to_string()]);

        // Counting still works for the parked definition
        let def = store
            .record_invocation("parked", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(def.request_count, 1);

        // Once the backend recovers, the next write moves it to durable storage
        backend.fail_writes.store(false, Ordering::SeqCst);
        store.put(definition("parked")).await.unwrap();
        assert_eq!(store.memory.len().await, 0);
        assert_eq!(store.get("parked").await.unwrap().unwrap().request_count, 1);

        assert!(store.delete("parked").await.unwrap());
        assert!(store.get("parked").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parked_update_shadows_durable_copy() {
        let backend = Arc::new(FlakyBackend::default());
        let store = FallbackStore::new(DurableStore::new(backend.clone()));
        store.put(definition("a")).await.unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        let mut updated = definition("a");
        updated.status_code = 418;
        store.put(updated).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().unwrap().status_code, 418);

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status_code, 418);

        let counted = store
            .record_invocation("a", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counted.status_code, 418);
        assert_eq!(counted.request_count, 1);
    }

    #[tokio::test]
    async fn test_delete_fails_whole_when_durable_fails() {
        let backend = Arc::new(FlakyBackend::default());
        let store = FallbackStore::new(DurableStore::new(backend.clone()));
        store.put(definition("a")).await.unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        let mut updated = definition("a");
        updated.status_code = 418;
        store.put(updated).await.unwrap();

        assert!(store.delete("a").await.is_err());
        assert_eq!(store.get("a").await.unwrap().unwrap().status_code, 418);

        backend.fail_writes.store(false, Ordering::SeqCst);
        assert!(store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fallback_read_failure_surfaces_error() {
        let backend = Arc::new(FlakyBackend::default());
        let store = FallbackStore::new(DurableStore::new(backend.clone()));
        store.put(definition("a")).await.unwrap();

        backend.fail_reads.store(true, Ordering::SeqCst);
        assert!(store.get("a").await.is_err());
        assert!(store.list_all().await.is_err());
        assert!(store.record_invocation("a", Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_put_keeps_counters_ahead() {
        let memory = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let durable = DurableStore::new(Arc::new(FileBackend::open(dir.path()).await.unwrap()));

        for store in [&memory as &dyn DefinitionStore, &durable as &dyn DefinitionStore] {
            let stale = definition("a");
            store.put(stale.clone()).await.unwrap();
            store.record_invocation("a", Utc::now()).await.unwrap();

            let mut rewrite = stale;
            rewrite.status_code = 201;
            store.put(rewrite).await.unwrap();

            let def = store.get("a").await.unwrap().unwrap();
            assert_eq!(def.status_code, 201, "{}", store.backend_name());
            assert_eq!(def.request_count, 1, "{}", store.backend_name());
            assert!(def.last_used_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_build_store_selects_backend() {
        let store = build_store(&StorageConfig::Memory).await;
        assert_eq!(store.backend_name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let store = build_store(&StorageConfig::File {
            directory: dir.path().to_path_buf(),
        })
        .await;
        assert_eq!(store.backend_name(), "durable+memory");
    }
}
