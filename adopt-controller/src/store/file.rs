//! File-backed resource store: one JSON document per resource.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{apply_deletion, apply_patch, validate_name, ResourceStore, Result, StoreError};
use crate::resource::AdoptedResource;

const EXTENSION: &str = "json";

/// Store keeping `<dir>/<name>.json` per resource.
///
/// Writes go through a temp file and a rename. A single lock serializes
/// read-modify-write cycles within this process.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }

    async fn read(&self, name: &str) -> Result<Option<AdoptedResource>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, resource: &AdoptedResource) -> Result<()> {
        let path = self.path_for(&resource.name)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(resource)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), version = resource.resource_version, "Wrote resource");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ResourceStore for FileStore {
    async fn get(&self, name: &str) -> Result<Option<AdoptedResource>> {
        self.read(name).await
    }

    async fn patch(&self, resource: &AdoptedResource) -> Result<AdoptedResource> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read(&resource.name)
            .await?
            .ok_or_else(|| StoreError::NotFound(resource.name.clone()))?;

        match apply_patch(&stored, resource)? {
            Some(next) => {
                self.write(&next).await?;
                Ok(next)
            }
            None => {
                self.remove(&resource.name).await?;
                Ok(resource.clone())
            }
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create(&self, mut resource: AdoptedResource) -> Result<AdoptedResource> {
        let _guard = self.write_lock.lock().await;
        if self.read(&resource.name).await?.is_some() {
            return Err(StoreError::AlreadyExists(resource.name));
        }
        resource.resource_version = 1;
        self.write(&resource).await?;
        Ok(resource)
    }

    async fn request_deletion(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        match apply_deletion(&stored) {
            Some(next) => self.write(&next).await,
            None => self.remove(name).await,
        }
    }
}
