// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The type-declaration copier: an out-of-scope collaborator (spec §1)
//! "called as a side effect" once the Entry Resolver locates a `.d.ts`
//! file. This trait is the seam; [`FsDtsCopier`] reads the file
//! straight off the materialised package tree, which is sufficient for
//! the single-file case this engine handles (a full implementation
//! would also rewrite `.d.ts`-internal relative imports, which is out
//! of this core's scope — see spec §1 Non-goals "source-map fidelity"
//! sibling concerns).

use std::path::Path;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum DtsCopyError {
  #[error("failed to read declaration file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

#[async_trait]
pub trait DtsCopier: Send + Sync {
  /// Reads the declaration file at `source_path` (relative to the
  /// materialised package root) and returns its bytes for the caller to
  /// write into the Artifact Store under the `types`-target fingerprint.
  async fn read(&self, package_root: &Path, source_path: &str) -> Result<Vec<u8>, DtsCopyError>;
}

pub struct FsDtsCopier;

#[async_trait]
impl DtsCopier for FsDtsCopier {
  async fn read(&self, package_root: &Path, source_path: &str) -> Result<Vec<u8>, DtsCopyError> {
    let path = package_root.join(source_path);
    tokio::fs::read(&path).await.map_err(|source| DtsCopyError::Io {
      path: path.display().to_string(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn reads_declaration_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.d.ts"), b"export {};").unwrap();
    let bytes = FsDtsCopier.read(dir.path(), "index.d.ts").await.unwrap();
    assert_eq!(bytes, b"export {};");
  }
}
