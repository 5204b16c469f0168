// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Per-request scratch working directory (spec §3 Lifecycle, §4.1 step
//! 2): named from a SHA-1 of the fingerprint plus a random suffix so
//! concurrent builds of the same key never collide on disk, owned
//! exclusively by one task, removed unconditionally on drop.

use std::path::Path;
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Digest;
use sha1::Sha1;

pub struct ScratchDir {
  path: PathBuf,
}

impl ScratchDir {
  /// Creates `<root>/<sha1(fingerprint)[:12]>-<6 random chars>` and
  /// returns a handle that removes it on drop.
  pub fn create(root: &Path, fingerprint: &str) -> std::io::Result<Self> {
    let mut hasher = Sha1::new();
    hasher.update(fingerprint.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    let suffix: String = rand::thread_rng()
      .sample_iter(&Alphanumeric)
      .take(6)
      .map(char::from)
      .collect();

    let dir_name = format!("{}-{}", &hex[..12], suffix);
    let path = root.join(dir_name);
    std::fs::create_dir_all(&path)?;
    std::fs::create_dir_all(path.join("node_modules"))?;
    Ok(Self { path })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn node_modules(&self) -> PathBuf {
    self.path.join("node_modules")
  }
}

impl Drop for ScratchDir {
  fn drop(&mut self) {
    if let Err(err) = std::fs::remove_dir_all(&self.path) {
      if err.kind() != std::io::ErrorKind::NotFound {
        log::warn!("failed to remove scratch dir {}: {err}", self.path.display());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn distinct_fingerprints_do_not_collide() {
    let root = TempDir::new().unwrap();
    let a = ScratchDir::create(root.path(), "v1/react@17.0.2/es2020/react.js").unwrap();
    let b = ScratchDir::create(root.path(), "v1/preact@10.5.14/es2020/preact.js").unwrap();
    assert_ne!(a.path(), b.path());
  }

  #[test]
  fn same_fingerprint_gets_distinct_dirs_via_random_suffix() {
    let root = TempDir::new().unwrap();
    let a = ScratchDir::create(root.path(), "v1/react@17.0.2/es2020/react.js").unwrap();
    let b = ScratchDir::create(root.path(), "v1/react@17.0.2/es2020/react.js").unwrap();
    assert_ne!(a.path(), b.path());
  }

  #[test]
  fn removed_on_drop() {
    let root = TempDir::new().unwrap();
    let path = {
      let dir = ScratchDir::create(root.path(), "v1/react@17.0.2/es2020/react.js").unwrap();
      dir.path().to_path_buf()
    };
    assert!(!path.exists());
  }
}
