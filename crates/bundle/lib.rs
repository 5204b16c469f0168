// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The Externalising Resolver Plug-in (consulted by the bundler for
//! every import in the entry's dependency closure) and the contract the
//! Build Orchestrator uses to invoke the bundler library itself.

mod options;
mod resolve;
mod retry;

pub use options::BundleOptions;
pub use options::Platform;
pub use resolve::ExternalizingResolver;
pub use resolve::ResolveDecision;
pub use resolve::EXTERNAL_SENTINEL_PREFIX;
pub use retry::classify_bundle_error;
pub use retry::RetryDecision;

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct BundleResult {
  /// One entry per emitted output file; bundling an entry plus any
  /// non-inlined CSS can yield more than one.
  pub files: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BundleError {
  #[error("Could not resolve \"{0}\" … mark it as external")]
  CouldNotResolve(String),
  #[error("No matching export in \"{0}\" for import \"default\"")]
  NoMatchingDefaultExport(String),
  #[error("bundler diagnostic: {0}")]
  Diagnostic(String),
}

/// The bundler library is an out-of-scope collaborator, invoked with a
/// plug-in hook; this trait is the seam the Build Engine owns. A real
/// implementation adapts an embedded JS bundler (e.g. via an FFI/WASM
/// boundary); it is not provided here.
pub trait JsBundler: Send + Sync {
  fn bundle(
    &self,
    options: &BundleOptions,
    resolver: &mut ExternalizingResolver,
  ) -> Result<BundleResult, BundleError>;
}
