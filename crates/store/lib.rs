// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The Artifact Store (content-addressed blobs) and Metadata Store
//! (fingerprint -> [`EsmMetadata`]) contracts the Build Orchestrator
//! persists through, plus an in-memory backend for tests and a
//! filesystem-backed backend for local/single-node deployments.

mod fs_store;
mod memory;

pub use fs_store::FsArtifactStore;
pub use fs_store::FsMetadataStore;
pub use memory::MemoryArtifactStore;
pub use memory::MemoryMetadataStore;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

/// Permission bits used when persisting artifacts and metadata to disk.
pub const STORE_PERM: u32 = 0o644;

/// Key prefix applied to every artifact fingerprint before it is used as
/// an Artifact Store key (see spec "External Interfaces": Artifact Store
/// contract).
pub const BUILDS_PREFIX: &str = "builds/";

pub fn artifact_key(fingerprint: &str) -> String {
  format!("{BUILDS_PREFIX}{fingerprint}")
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("store I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("metadata record corrupt: {0}")]
  Corrupt(#[from] serde_json::Error),
}

/// Content-addressed blob storage. Keys are artifact fingerprints
/// (prefixed with [`BUILDS_PREFIX`] by callers, see [`artifact_key`]).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
  async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
  async fn exists(&self, key: &str) -> Result<bool, StoreError>;
  async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
  async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// The ESM metadata record stored alongside every produced artifact
/// (data model §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EsmMetadata {
  pub name: String,
  pub version: String,
  /// Resolved ES entry, empty if the package is CJS-only.
  pub module: String,
  pub main: String,
  pub types: String,
  pub typings: String,
  /// Discovered named exports of a CJS entry.
  pub exports: Vec<String>,
  pub export_default: bool,
  /// Fingerprint-style URL path of the type-declaration bundle, if any.
  pub dts: String,
  pub package_css: bool,
}

/// Metadata Store contract: `Put`, `Get` (returning a not-found sentinel
/// as `Ok(None)`), `Delete`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
  async fn put(
    &self,
    key: &str,
    namespace: &str,
    record: &EsmMetadata,
  ) -> Result<(), StoreError>;
  async fn get(&self, key: &str) -> Result<Option<EsmMetadata>, StoreError>;
  async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
