//! Resource store abstraction.
//!
//! The reconciler only ever reads a fresh copy and writes it back; the store
//! enforces optimistic concurrency through `resource_version`.

mod error;
mod file;
mod memory;

use async_trait::async_trait;
use chrono::Utc;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::resource::AdoptedResource;

/// Persistence for adopted resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch the current copy, `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<AdoptedResource>>;

    /// Write a resource back.
    ///
    /// Fails with [`StoreError::Conflict`] if the stored version moved since
    /// `resource` was read. Returns the stored copy with its new version. A
    /// resource marked for deletion with no finalizers left is removed.
    async fn patch(&self, resource: &AdoptedResource) -> Result<AdoptedResource>;

    /// Names of all stored resources.
    async fn list(&self) -> Result<Vec<String>>;

    /// Insert a new resource.
    async fn create(&self, resource: AdoptedResource) -> Result<AdoptedResource>;

    /// Request deletion. Removes immediately when no finalizer is present,
    /// otherwise stamps a deletion timestamp and leaves removal to whoever
    /// clears the last finalizer.
    async fn request_deletion(&self, name: &str) -> Result<()>;
}

/// Shared write rule: version check, then either drop or bump.
///
/// Returns `None` when the resource should be physically removed.
pub(crate) fn apply_patch(
    stored: &AdoptedResource,
    incoming: &AdoptedResource,
) -> Result<Option<AdoptedResource>> {
    if stored.resource_version != incoming.resource_version {
        return Err(StoreError::Conflict {
            name: incoming.name.clone(),
            expected: incoming.resource_version,
            actual: stored.resource_version,
        });
    }

    let mut next = incoming.clone();
    // Deletion is only ever requested through the store.
    next.deletion_timestamp = stored.deletion_timestamp.or(incoming.deletion_timestamp);
    if next.is_being_deleted() && next.finalizers.is_empty() {
        return Ok(None);
    }
    next.resource_version += 1;
    Ok(Some(next))
}

/// Shared deletion rule. `None` means remove now.
pub(crate) fn apply_deletion(stored: &AdoptedResource) -> Option<AdoptedResource> {
    if stored.finalizers.is_empty() {
        return None;
    }
    let mut next = stored.clone();
    if next.deletion_timestamp.is_none() {
        next.deletion_timestamp = Some(Utc::now());
        next.resource_version += 1;
    }
    Some(next)
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 253
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
