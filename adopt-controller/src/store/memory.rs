//! In-memory resource store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{apply_deletion, apply_patch, validate_name, ResourceStore, Result, StoreError};
use crate::resource::AdoptedResource;

/// Store backed by a map; used for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: RwLock<BTreeMap<String, AdoptedResource>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<AdoptedResource>> {
        Ok(self.resources.read().await.get(name).cloned())
    }

    async fn patch(&self, resource: &AdoptedResource) -> Result<AdoptedResource> {
        let mut resources = self.resources.write().await;
        let stored = resources
            .get(&resource.name)
            .ok_or_else(|| StoreError::NotFound(resource.name.clone()))?;

        match apply_patch(stored, resource)? {
            Some(next) => {
                resources.insert(next.name.clone(), next.clone());
                Ok(next)
            }
            None => {
                resources.remove(&resource.name);
                Ok(resource.clone())
            }
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.resources.read().await.keys().cloned().collect())
    }

    async fn create(&self, mut resource: AdoptedResource) -> Result<AdoptedResource> {
        validate_name(&resource.name)?;
        let mut resources = self.resources.write().await;
        if resources.contains_key(&resource.name) {
            return Err(StoreError::AlreadyExists(resource.name));
        }
        resource.resource_version = 1;
        resources.insert(resource.name.clone(), resource.clone());
        Ok(resource)
    }

    async fn request_deletion(&self, name: &str) -> Result<()> {
        let mut resources = self.resources.write().await;
        let stored = resources
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        match apply_deletion(stored) {
            Some(next) => {
                resources.insert(name.to_string(), next);
            }
            None => {
                resources.remove(name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::AdoptedSpec;

    #[tokio::test]
    async fn test_create_get_patch() {
        let store = MemoryStore::new();
        let created = store
            .create(AdoptedResource::new("a", AdoptedSpec::default()))
            .await
            .unwrap();
        assert_eq!(created.resource_version, 1);

        let mut current = store.get("a").await.unwrap().unwrap();
        current.spec.accepted = true;
        let patched = store.patch(&current).await.unwrap();
        assert_eq!(patched.resource_version, 2);
        assert!(store.get("a").await.unwrap().unwrap().spec.accepted);

        // Stale copy is rejected.
        let err = store.patch(&current).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let store = MemoryStore::new();
        store
            .create(AdoptedResource::new("a", AdoptedSpec::default()))
            .await
            .unwrap();
        let err = store
            .create(AdoptedResource::new("a", AdoptedSpec::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_deletion_waits_for_finalizer() {
        let store = MemoryStore::new();
        let mut r = AdoptedResource::new("a", AdoptedSpec::default());
        r.finalizers.push("f".to_string());
        store.create(r).await.unwrap();

        store.request_deletion("a").await.unwrap();
        let mut current = store.get("a").await.unwrap().unwrap();
        assert!(current.is_being_deleted());

        current.finalizers.clear();
        store.patch(&current).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deletion_without_finalizer_is_immediate() {
        let store = MemoryStore::new();
        store
            .create(AdoptedResource::new("a", AdoptedSpec::default()))
            .await
            .unwrap();
        store.request_deletion("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patch_missing() {
        let store = MemoryStore::new();
        let err = store
            .patch(&AdoptedResource::new("ghost", AdoptedSpec::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
