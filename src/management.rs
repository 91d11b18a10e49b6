//! Create, read, update and delete for mock definitions.
//!
//! Ownership is an equality check on the opaque `ownerId` supplied at
//! creation. It is not an authenticated identity.

use crate::definition::{DefinitionInput, MockDefinition};
use crate::error::MockError;
use crate::store::DefinitionStore;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Filters for listing definitions. Unset filters match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub shared: Option<bool>,
}

impl ListFilter {
    fn matches(&self, definition: &MockDefinition) -> bool {
        let owner_ok = self
            .owner_id
            .as_deref()
            .map_or(true, |owner| owner == definition.owner_id);
        let shared_ok = self.shared.map_or(true, |shared| shared == definition.is_shared);
        owner_ok && shared_ok
    }
}

/// Management operations over a [`DefinitionStore`].
pub struct DefinitionService {
    store: Arc<dyn DefinitionStore>,
    default_ttl: Duration,
}

impl DefinitionService {
    /// `default_ttl` is added to `createdAt` when no expiry is supplied.
    pub fn new(store: Arc<dyn DefinitionStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Validate and persist a new definition.
    ///
    /// A caller-supplied id that already exists is replaced when the owner
    /// matches; the invocation counter carries over.
    pub async fn create(&self, input: DefinitionInput) -> Result<MockDefinition, MockError> {
        let mut definition = input.into_definition(Utc::now(), self.default_ttl)?;

        if let Some(existing) = self.load(&definition.id).await? {
            if existing.owner_id != definition.owner_id {
                return Err(MockError::Forbidden);
            }
            definition.request_count = existing.request_count;
            definition.last_used_at = existing.last_used_at;
        }

        self.persist(definition.clone()).await?;
        info!(
            mock_id = %definition.id,
            method = %definition.method,
            endpoint = %definition.endpoint,
            "Mock definition created"
        );
        Ok(definition)
    }

    /// Fetch one definition by id.
    pub async fn get(&self, id: &str) -> Result<MockDefinition, MockError> {
        self.load(id)
            .await?
            .ok_or_else(|| MockError::NotFound(id.to_string()))
    }

    /// List definitions, newest first.
    ///
    /// Auth secrets are removed from records not owned by the filter's owner.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<MockDefinition>, MockError> {
        let all = self.store.list_all().await.map_err(|e| {
            error!(error = %e, "Failed to list mock definitions");
            MockError::Storage
        })?;

        let mut definitions: Vec<MockDefinition> = all
            .into_iter()
            .filter(|def| filter.matches(def))
            .map(|def| {
                if filter.owner_id.as_deref() == Some(def.owner_id.as_str()) {
                    def
                } else {
                    def.redacted()
                }
            })
            .collect();
        definitions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(definitions)
    }

    /// Apply a partial update.
    pub async fn update(
        &self,
        id: &str,
        owner_id: Option<&str>,
        patch: DefinitionInput,
    ) -> Result<MockDefinition, MockError> {
        let existing = self.get(id).await?;
        if !existing.owner_matches(owner_id) {
            return Err(MockError::Forbidden);
        }

        let updated = existing.apply_update(patch)?;
        self.persist(updated.clone()).await?;
        info!(mock_id = %id, "Mock definition updated");
        Ok(updated)
    }

    /// Delete a definition.
    pub async fn delete(&self, id: &str, owner_id: Option<&str>) -> Result<(), MockError> {
        let existing = self.get(id).await?;
        if !existing.owner_matches(owner_id) {
            return Err(MockError::Forbidden);
        }

        let removed = self.store.delete(id).await.map_err(|e| {
            error!(mock_id = %id, error = %e, "Failed to delete mock definition");
            MockError::Storage
        })?;
        if !removed {
            return Err(MockError::NotFound(id.to_string()));
        }
        info!(mock_id = %id, "Mock definition deleted");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<MockDefinition>, MockError> {
        self.store.get(id).await.map_err(|e| {
            error!(mock_id = %id, error = %e, "Failed to read mock definition");
            MockError::Storage
        })
    }

    async fn persist(&self, definition: MockDefinition) -> Result<(), MockError> {
        let id = definition.id.clone();
        self.store.put(definition).await.map_err(|e| {
            error!(mock_id = %id, error = %e, "Failed to store mock definition");
            MockError::Storage
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    fn service() -> (DefinitionService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            DefinitionService::new(store.clone(), Duration::days(30)),
            store,
        )
    }

    fn input(owner: &str) -> DefinitionInput {
        DefinitionInput {
            name: Some("Users".into()),
            endpoint: Some("/users".into()),
            method: Some("GET".into()),
            response_template: Some(r#"{"id":"{{uuid}}"}"#.into()),
            owner_id: Some(owner.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (service, _) = service();
        let created = service.create(input("alice")).await.unwrap();
        let fetched = service.get(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.expires_at - fetched.created_at, Duration::days(30));
    }

    #[tokio::test]
    async fn test_create_rejects_without_persisting() {
        let (service, store) = service();
        let mut bad = input("alice");
        bad.endpoint = Some("users".into());

        let err = service.create(bad).await.unwrap_err();
        assert_eq!(err.field(), Some("endpoint"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_recreate_with_same_id() {
        let (service, store) = service();
        let mut first = input("alice");
        first.id = Some("fixed".into());
        service.create(first.clone()).await.unwrap();
        store.record_invocation("fixed", Utc::now()).await.unwrap();

        first.status_code = Some(204);
        let again = service.create(first).await.unwrap();
        assert_eq!(again.status_code, 204);
        assert_eq!(again.request_count, 1);

        let mut stolen = input("mallory");
        stolen.id = Some("fixed".into());
        assert_eq!(service.create(stolen).await.unwrap_err(), MockError::Forbidden);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let (service, store) = service();

        let mut older = input("alice")
            .into_definition(Utc::now() - Duration::hours(1), Duration::days(1))
            .unwrap();
        older.id = "older".into();
        store.put(older).await.unwrap();

        let mut shared = input("bob");
        shared.is_shared = Some(true);
        shared.auth_mode = Some("apiKey".into());
        shared.auth_secret = Some("bob-secret".into());
        let shared = service.create(shared).await.unwrap();
        let newer = service.create(input("alice")).await.unwrap();

        let alice = service
            .list(&ListFilter {
                owner_id: Some("alice".into()),
                shared: None,
            })
            .await
            .unwrap();
        let ids: Vec<&str> = alice.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), "older"]);

        let shared_list = service
            .list(&ListFilter {
                owner_id: None,
                shared: Some(true),
            })
            .await
            .unwrap();
        assert_eq!(shared_list.len(), 1);
        assert_eq!(shared_list[0].id, shared.id);
        assert!(shared_list[0].auth_secret.is_none());

        let bob = service
            .list(&ListFilter {
                owner_id: Some("bob".into()),
                shared: Some(true),
            })
            .await
            .unwrap();
        assert_eq!(bob[0].auth_secret.as_deref(), Some("bob-secret"));

        assert_eq!(service.list(&ListFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_owner_check() {
        let (service, _) = service();
        let created = service.create(input("alice")).await.unwrap();

        let patch = DefinitionInput {
            status_code: Some(500),
            ..Default::default()
        };
        let err = service
            .update(&created.id, Some("mallory"), patch.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);

        let updated = service
            .update(&created.id, Some("alice"), patch)
            .await
            .unwrap();
        assert_eq!(updated.status_code, 500);
        assert_eq!(updated.name, "Users");
    }

    /// Store that counts one invocation just before each write lands.
    struct InvokedBeforeWrite {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl DefinitionStore for InvokedBeforeWrite {
        async fn put(&self, definition: MockDefinition) -> Result<(), StoreError> {
            self.inner
                .record_invocation(&definition.id, Utc::now())
                .await?;
            self.inner.put(definition).await
        }

        async fn get(&self, id: &str) -> Result<Option<MockDefinition>, StoreError> {
            self.inner.get(id).await
        }

        async fn delete(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }

        async fn list_all(&self) -> Result<Vec<MockDefinition>, StoreError> {
            self.inner.list_all().await
        }

        async fn record_invocation(
            &self,
            id: &str,
            now: chrono::DateTime<Utc>,
        ) -> Result<Option<MockDefinition>, StoreError> {
            self.inner.record_invocation(id, now).await
        }

        fn backend_name(&self) -> &'static str {
            "invoked-before-write"
        }
    }

    #[tokio::test]
    async fn test_update_keeps_concurrent_invocation() {
        let store = Arc::new(InvokedBeforeWrite {
            inner: MemoryStore::new(),
        });
        let created = input("alice")
            .into_definition(Utc::now(), Duration::days(1))
            .unwrap();
        store.inner.put(created.clone()).await.unwrap();
        let service = DefinitionService::new(store.clone(), Duration::days(30));

        let updated = service
            .update(
                &created.id,
                Some("alice"),
                DefinitionInput {
                    status_code: Some(201),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status_code, 201);

        let stored = store.inner.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.status_code, 201);
        assert_eq!(stored.request_count, 1);
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_storage_outage_is_not_404() {
        use crate::store::{DurableStore, FallbackStore, KvBackend};

        struct Unreachable;

        #[async_trait::async_trait]
        impl KvBackend for Unreachable {
            async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
                Err(StoreError::Backend("unreachable".into()))
            }
            async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
                Err(StoreError::Backend("unreachable".into()))
            }
            async fn delete(&self, _key: &str) -> Result<(), StoreError> {
                Err(StoreError::Backend("unreachable".into()))
            }
        }

        let store = Arc::new(FallbackStore::new(DurableStore::new(Arc::new(Unreachable))));
        let service = DefinitionService::new(store, Duration::days(30));

        assert_eq!(service.get("anything").await.unwrap_err(), MockError::Storage);

        let mut claimed = input("mallory");
        claimed.id = Some("someone-elses".into());
        assert_eq!(service.create(claimed).await.unwrap_err(), MockError::Storage);
    }

    #[tokio::test]
    async fn test_update_validation_leaves_record() {
        let (service, _) = service();
        let created = service.create(input("alice")).await.unwrap();

        let err = service
            .update(
                &created.id,
                Some("alice"),
                DefinitionInput {
                    delay_ms: Some(40_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("delayMs"));
        assert_eq!(service.get(&created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_update_missing_is_404() {
        let (service, _) = service();
        let err = service
            .update("nope", None, DefinitionInput::default())
            .await
            .unwrap_err();
        assert_eq!(err, MockError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, _) = service();
        let created = service.create(input("alice")).await.unwrap();

        assert_eq!(
            service.delete(&created.id, Some("bob")).await.unwrap_err(),
            MockError::Forbidden
        );
        service.delete(&created.id, Some("alice")).await.unwrap();
        assert!(matches!(
            service.get(&created.id).await,
            Err(MockError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(&created.id, None).await,
            Err(MockError::NotFound(_))
        ));
    }
}
