// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The error kinds `Build` surfaces (spec §7). `Parse` never appears
//! here: the Entry Resolver's ESM-verification failure is recovered
//! internally by falling back to the CJS path, never propagated.

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
  /// A specifier required by the output could not be resolved to any
  /// artifact after all fallbacks in the Output Rewriter (spec §4.5a
  /// step 8).
  #[error("Could not resolve \"{specifier}\" (Imported by \"{importer}\")")]
  NotFound { specifier: String, importer: String },

  /// The Package Materialiser exited non-zero.
  #[error("install failed: {0}")]
  Install(#[from] esm_materializer::MaterializeError),

  /// The CJS Export Oracle returned `error`, or the call itself failed.
  #[error("oracle failed for {module}: {source}")]
  Oracle {
    module: String,
    #[source]
    source: esm_oracle::OracleError,
  },

  /// An unrecoverable bundler diagnostic survived the retry policy.
  #[error("bundle failed: {0}")]
  Bundle(#[from] esm_bundle::BundleError),

  /// Artifact or metadata write failure.
  #[error("store failed: {0}")]
  Store(#[from] esm_store::StoreError),

  /// The Entry Resolver could not even read the materialised manifest.
  #[error("entry resolution failed: {0}")]
  Resolve(#[from] esm_resolver::ResolveError),

  /// The Output Rewriter hit an internal invariant violation (e.g. a
  /// sentinel with no entry in the collected external map — this should
  /// never happen if the Orchestrator built every external before
  /// rewriting).
  #[error("rewrite failed: {0}")]
  Rewrite(#[from] esm_rewriter::RewriteError),

  #[error("scratch directory setup failed: {0}")]
  Scratch(#[from] std::io::Error),
}
