// Copyright 2018-2026 the esm.sh authors. MIT license.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::ArtifactStore;
use crate::EsmMetadata;
use crate::MetadataStore;
use crate::StoreError;

/// In-memory [`ArtifactStore`], used by tests and single-process demos.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
  blobs: DashMap<String, Vec<u8>>,
}

impl MemoryArtifactStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
  async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
    self.blobs.insert(key.to_string(), bytes.to_vec());
    Ok(())
  }

  async fn exists(&self, key: &str) -> Result<bool, StoreError> {
    Ok(self.blobs.contains_key(key))
  }

  async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(self.blobs.get(key).map(|v| v.clone()))
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.blobs.remove(key);
    Ok(())
  }
}

/// In-memory [`MetadataStore`].
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
  records: DashMap<String, EsmMetadata>,
}

impl MemoryMetadataStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
  async fn put(&self, key: &str, _namespace: &str, record: &EsmMetadata) -> Result<(), StoreError> {
    self.records.insert(key.to_string(), record.clone());
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<EsmMetadata>, StoreError> {
    Ok(self.records.get(key).map(|v| v.clone()))
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.records.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn round_trips_a_blob() {
    let store = MemoryArtifactStore::new();
    assert!(!store.exists("builds/foo").await.unwrap());
    store.write("builds/foo", b"hello").await.unwrap();
    assert!(store.exists("builds/foo").await.unwrap());
    assert_eq!(store.read("builds/foo").await.unwrap().unwrap(), b"hello");
    store.delete("builds/foo").await.unwrap();
    assert!(!store.exists("builds/foo").await.unwrap());
  }

  #[tokio::test]
  async fn get_on_missing_key_is_not_found_sentinel() {
    let store = MemoryMetadataStore::new();
    assert!(store.get("builds/missing").await.unwrap().is_none());
  }
}
