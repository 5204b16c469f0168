// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The upstream registry metadata lookup the Output Rewriter's sentinel
//! resolution falls back to (spec §4.5a step 7) when a name is neither a
//! sibling submodule, a recognised built-in, a pinned dep, nor present
//! in the already-materialised `node_modules`. Out of scope per spec
//! §1 ("specified only by the contract the core consumes"): this trait
//! is that contract.

use async_trait::async_trait;
use esm_package_json::PackageJson;
use indexmap::IndexMap;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
  #[error("no versions found for {0}")]
  NotFound(String),
  #[error("registry request for {name} failed: {message}")]
  Request { name: String, message: String },
}

/// Resolves a package name plus a version hint (a concrete version, a
/// range, or `"latest"`) to a concrete version and its manifest.
#[async_trait]
pub trait RegistryClient: Send + Sync {
  async fn resolve(
    &self,
    name: &str,
    version_hint: &str,
  ) -> Result<(String, PackageJson), RegistryError>;
}

/// An in-memory registry double, keyed by exact `name@version_hint`,
/// used by tests and by any deployment that pre-seeds a fixed catalog
/// (e.g. a vendored polyfill set) instead of calling out to a live
/// registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistryClient {
  entries: IndexMap<(String, String), (String, PackageJson)>,
}

impl StaticRegistryClient {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(
    &mut self,
    name: impl Into<String>,
    version_hint: impl Into<String>,
    resolved_version: impl Into<String>,
    manifest: PackageJson,
  ) -> &mut Self {
    self
      .entries
      .insert((name.into(), version_hint.into()), (resolved_version.into(), manifest));
    self
  }
}

#[async_trait]
impl RegistryClient for StaticRegistryClient {
  async fn resolve(
    &self,
    name: &str,
    version_hint: &str,
  ) -> Result<(String, PackageJson), RegistryError> {
    self
      .entries
      .get(&(name.to_string(), version_hint.to_string()))
      .cloned()
      .ok_or_else(|| RegistryError::NotFound(name.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn static_client_resolves_seeded_entry() {
    let mut client = StaticRegistryClient::new();
    client.insert("lodash", "latest", "4.17.21", PackageJson::default());
    let (version, _manifest) = client.resolve("lodash", "latest").await.unwrap();
    assert_eq!(version, "4.17.21");
  }

  #[tokio::test]
  async fn unseeded_entry_is_not_found() {
    let client = StaticRegistryClient::new();
    assert!(matches!(
      client.resolve("lodash", "latest").await,
      Err(RegistryError::NotFound(_))
    ));
  }
}
