// Copyright 2018-2026 the esm.sh authors. MIT license.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use rand::Rng;

use crate::ArtifactStore;
use crate::EsmMetadata;
use crate::MetadataStore;
use crate::StoreError;
use crate::STORE_PERM;

/// Writes `data` to `path` via a randomly-suffixed temp file in the same
/// directory, then renames it into place, so concurrent readers never see
/// a partial write.
fn atomic_write_file(path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let suffix: String = {
    let mut rng = rand::thread_rng();
    (0..4).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
  };
  let tmp_path = path.with_extension(format!("{suffix}.tmp"));
  std::fs::write(&tmp_path, data)?;
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode))?;
  }
  std::fs::rename(&tmp_path, path)?;
  Ok(())
}

fn key_to_path(root: &Path, key: &str) -> PathBuf {
  // Keys are fingerprint-shaped ("builds/pkg@ver/target/leaf.js"); every
  // component maps onto a directory except the last.
  root.join(key)
}

/// Filesystem-backed [`ArtifactStore`], one file per key under a root
/// directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
  root: PathBuf,
}

impl FsArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
  async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let path = key_to_path(&self.root, key);
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || atomic_write_file(&path, &bytes, STORE_PERM))
      .await
      .expect("blocking write task panicked")?;
    Ok(())
  }

  async fn exists(&self, key: &str) -> Result<bool, StoreError> {
    let path = key_to_path(&self.root, key);
    Ok(tokio::fs::metadata(path).await.is_ok())
  }

  async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let path = key_to_path(&self.root, key);
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(err) => Err(err.into()),
    }
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let path = key_to_path(&self.root, key);
    match tokio::fs::remove_file(path).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}

/// Filesystem-backed [`MetadataStore`]: one JSON file per key under a
/// single fixed namespace subdirectory.
///
/// Spec "Metadata Store contract" declares `Get(key)` with no namespace
/// argument, so a store backend must settle on one namespace of its own
/// rather than trust `put`'s caller-supplied value to match whatever a
/// later `get` assumes — this mirrors [`super::MemoryMetadataStore`]'s
/// choice to ignore `put`'s `namespace` argument entirely.
#[derive(Debug, Clone)]
pub struct FsMetadataStore {
  root: PathBuf,
}

const METADATA_NAMESPACE: &str = "builds";

impl FsMetadataStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn path_for(&self, key: &str) -> PathBuf {
    self.root.join(METADATA_NAMESPACE).join(format!("{key}.json"))
  }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
  async fn put(&self, key: &str, _namespace: &str, record: &EsmMetadata) -> Result<(), StoreError> {
    let path = self.path_for(key);
    let bytes = serde_json::to_vec(record)?;
    tokio::task::spawn_blocking(move || atomic_write_file(&path, &bytes, STORE_PERM))
      .await
      .expect("blocking write task panicked")?;
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<EsmMetadata>, StoreError> {
    let path = self.path_for(key);
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(err) => Err(err.into()),
    }
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let path = self.path_for(key);
    match tokio::fs::remove_file(path).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn writes_and_reads_back() {
    let dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(dir.path());
    let key = "builds/v1/react@17.0.2/es2020/react.js";
    assert!(!store.exists(key).await.unwrap());
    store.write(key, b"export default {}").await.unwrap();
    assert!(store.exists(key).await.unwrap());
    assert_eq!(
      store.read(key).await.unwrap().unwrap(),
      b"export default {}"
    );
    store.delete(key).await.unwrap();
    assert!(!store.exists(key).await.unwrap());
  }

  #[tokio::test]
  async fn metadata_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = FsMetadataStore::new(dir.path());
    let key = "v1/react@17.0.2/es2020/react.js";
    let record = EsmMetadata {
      name: "react".into(),
      version: "17.0.2".into(),
      module: "index.js".into(),
      export_default: true,
      ..Default::default()
    };
    store.put(key, "builds", &record).await.unwrap();
    let fetched = store.get(key).await.unwrap().unwrap();
    assert_eq!(fetched, record);
  }
}
