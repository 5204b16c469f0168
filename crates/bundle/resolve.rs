// Copyright 2018-2026 the esm.sh authors. MIT license.

use std::collections::HashSet;
use std::path::Path;

use esm_package_json::PackageJson;
use indexmap::IndexMap;

pub const EXTERNAL_SENTINEL_PREFIX: &str = "__ESM_SH_EXTERNAL:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveDecision {
  BundleInline,
  /// Passed through verbatim (e.g. `data:` URLs); never sentinel-wrapped.
  ExternalPassthrough(String),
  /// Wrapped as `__ESM_SH_EXTERNAL:<name>`; the Output Rewriter resolves
  /// it to a final URL.
  ExternalSentinel(String),
}

/// The bundler plug-in hook: consulted for every import specifier in the
/// entry's dependency closure. Holds the per-build mutable state the
/// decision table needs (the "extra external" set grown by the retry
/// loop, see spec §4.1).
pub struct ExternalizingResolver<'a> {
  pkg_name: &'a str,
  /// The specifier that resolves to the artifact's own entry; importing
  /// it recursively must bundle inline rather than round-trip through a
  /// same-package external.
  entry_specifier: &'a str,
  manifest: &'a PackageJson,
  alias: &'a IndexMap<String, String>,
  package_root: &'a Path,
  bundle_mode: bool,
  peer_deps: &'a HashSet<String>,
  extra_external: &'a mut HashSet<String>,
}

impl<'a> ExternalizingResolver<'a> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    pkg_name: &'a str,
    entry_specifier: &'a str,
    manifest: &'a PackageJson,
    alias: &'a IndexMap<String, String>,
    package_root: &'a Path,
    bundle_mode: bool,
    peer_deps: &'a HashSet<String>,
    extra_external: &'a mut HashSet<String>,
  ) -> Self {
    Self {
      pkg_name,
      entry_specifier,
      manifest,
      alias,
      package_root,
      bundle_mode,
      peer_deps,
      extra_external,
    }
  }

  /// Records a specifier that the bundler reported it could not resolve,
  /// so a subsequent retry of the same build treats it as external.
  pub fn mark_extra_external(&mut self, specifier: &str) {
    self.extra_external.insert(specifier.to_string());
  }

  pub fn resolve(&mut self, specifier: &str) -> ResolveDecision {
    if specifier.starts_with("data:") {
      return ResolveDecision::ExternalPassthrough(specifier.to_string());
    }

    if let Some(target) = self.alias.get(specifier) {
      let target = target.clone();
      return self.resolve(&target);
    }

    if let Some(stripped) = specifier.strip_prefix("node:") {
      let stripped = stripped.to_string();
      return self.resolve(&stripped);
    }

    let is_relative = specifier.starts_with("./") || specifier.starts_with("../");
    if is_relative {
      if self.is_inside_package_root(specifier) {
        if let Some(export_match) = self.manifest.resolve_export(specifier.trim_start_matches("./")) {
          if let Some(export_path) = export_match.pick(&["import", "default"]) {
            if export_path == self.entry_specifier {
              return ResolveDecision::BundleInline;
            }
            return ResolveDecision::ExternalSentinel(format!("{}/{export_path}", self.pkg_name));
          }
        }
      }
      return ResolveDecision::BundleInline;
    }

    if specifier == self.entry_specifier {
      return ResolveDecision::BundleInline;
    }

    if self.bundle_mode && !self.peer_deps.contains(specifier) && !self.extra_external.contains(specifier) {
      return ResolveDecision::BundleInline;
    }

    ResolveDecision::ExternalSentinel(specifier.to_string())
  }

  fn is_inside_package_root(&self, specifier: &str) -> bool {
    let joined = self.package_root.join(specifier);
    let cleaned = path_clean::clean(&joined);
    cleaned.starts_with(self.package_root)
  }
}
