// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The Output Rewriter: post-processes one emitted bundler JS file —
//! sentinel replacement, CJS call-site reconciliation, runtime shims,
//! and the header comment.

mod sentinel;
mod shims;

pub use sentinel::collect_sentinel_names;
pub use sentinel::rewrite_sentinels;
pub use sentinel::BindingKind;
pub use sentinel::ImportBinding;
pub use shims::shim_source;
pub use shims::RuntimeBuiltin;

use esm_bundle::EXTERNAL_SENTINEL_PREFIX;
use indexmap::IndexMap;

/// What the Rewriter knows about one external specifier by the time it
/// runs: its final URL and enough export-shape information to reconcile
/// CJS call sites (spec §4.5b). Ordering of subtask completion does not
/// matter here — only the fingerprint, which is deterministic.
#[derive(Debug, Clone)]
pub struct ExternalInfo {
  pub url: String,
  pub is_esm: bool,
  pub has_default: bool,
  pub named_exports: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RewriteContext<'a> {
  pub build_version: u32,
  pub target: &'a str,
  pub node_env: &'a str,
  pub pkg_name: &'a str,
  /// keyed by the sentinel's external name.
  pub externals: &'a IndexMap<String, ExternalInfo>,
}

#[derive(Debug, Clone)]
pub struct RewriteResult {
  pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
  #[error("external {0:?} has no resolved URL in this build")]
  UnresolvedExternal(String),
}

/// Runs the full rewrite pipeline over one bundler-emitted JS file.
pub fn rewrite_output(source: &str, ctx: &RewriteContext) -> Result<RewriteResult, RewriteError> {
  let (body, bindings) = rewrite_sentinels(source, ctx.externals)?;

  let mut prelude = String::new();
  for binding in &bindings {
    prelude.push_str(&binding.import_statement());
    prelude.push('\n');
  }

  let mut shims = String::new();
  if ctx.target != "node" {
    for builtin in RuntimeBuiltin::ALL {
      if body.contains(builtin.global_name()) {
        shims.push_str(&shim_source(*builtin, ctx.node_env, ctx.build_version));
        shims.push('\n');
      }
    }
  }

  let header = format!(
    "/* esm.sh - esbuild bundle({}) {} {} */\n",
    ctx.pkg_name, ctx.target, ctx.node_env
  );

  debug_assert!(
    !body.contains(EXTERNAL_SENTINEL_PREFIX),
    "sentinel survived rewriting"
  );

  Ok(RewriteResult {
    code: format!("{header}{shims}{prelude}{body}"),
  })
}
