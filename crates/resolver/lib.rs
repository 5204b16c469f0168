// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The Entry Resolver: given a materialised package root and an optional
//! submodule, decides whether the package ships an ESM entry, a CJS
//! entry, or both, and locates its type declarations.

mod module_kind;

pub use module_kind::sniff_module_kind;
pub use module_kind::ModuleKind;

use std::path::Path;
use std::time::Duration;

use esm_oracle::CjsExportOracle;
use esm_package_json::PackageJson;
use esm_package_json::PackageJsonError;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  #[error(transparent)]
  PackageJson(#[from] PackageJsonError),
  #[error("the oracle could not enumerate exports of {0}: {1}")]
  Oracle(String, #[source] esm_oracle::OracleError),
}

/// The seed of an [`esm_store::EsmMetadata`] record, produced by entry
/// resolution. `module`/`main`/`types`/`typings` are paths relative to
/// the outer package root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedEntry {
  pub module: Option<String>,
  pub main: Option<String>,
  pub types: Option<String>,
  pub typings: Option<String>,
  pub exports: Vec<String>,
  pub export_default: bool,
}

/// A request for a declaration-only artifact (submodule ends in `.d.ts`).
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationResolution {
  Found(String),
  /// The package declares no `.d.ts` of its own and isn't itself a
  /// `@types/*` distribution: the caller should materialise and consult
  /// `@types/<name>` instead.
  NeedsTypesPackage(String),
  NotFound,
}

pub struct EntryResolver;

impl EntryResolver {
  pub fn new() -> Self {
    Self
  }

  /// Resolves a `.d.ts`-suffixed submodule request (spec rule 1),
  /// including the `~.d.ts` redirect convention: `foo~.d.ts` resolves to
  /// `foo/index.d.ts` or, failing that, `foo.d.ts`.
  pub fn resolve_declaration(
    &self,
    package_root: &Path,
    submodule: &str,
    pkg_name: &str,
  ) -> DeclarationResolution {
    let candidates: Vec<String> = if let Some(base) = submodule.strip_suffix("~.d.ts") {
      vec![format!("{base}/index.d.ts"), format!("{base}.d.ts")]
    } else {
      vec![submodule.to_string()]
    };

    for candidate in &candidates {
      if package_root.join(candidate).is_file() {
        return DeclarationResolution::Found(candidate.clone());
      }
    }

    match types_package_name(pkg_name) {
      Some(types_pkg) => DeclarationResolution::NeedsTypesPackage(types_pkg),
      None => DeclarationResolution::NotFound,
    }
  }

  /// Resolves a non-`.d.ts` submodule (or the package root when
  /// `submodule` is `None`) per spec rules 2-4.
  pub fn resolve_entry(
    &self,
    package_root: &Path,
    manifest: &PackageJson,
    submodule: Option<&str>,
  ) -> Result<ResolvedEntry, ResolveError> {
    let Some(submodule) = submodule else {
      return Ok(ResolvedEntry {
        module: manifest.module.clone(),
        main: manifest.main.clone(),
        types: manifest.types.clone(),
        typings: manifest.typings.clone(),
        exports: Vec::new(),
        export_default: false,
      });
    };

    // Rule 2: the submodule directory carries its own manifest.
    let inner_manifest_path = package_root.join(submodule).join("package.json");
    if inner_manifest_path.is_file() {
      let inner = PackageJson::from_path(&inner_manifest_path)?;
      let rebase = |p: &str| format!("{submodule}/{p}");
      return Ok(ResolvedEntry {
        module: inner.module.as_deref().map(rebase),
        main: inner.main.as_deref().map(rebase),
        types: inner.types.as_deref().map(rebase),
        typings: inner.typings.as_deref().map(rebase),
        exports: Vec::new(),
        export_default: false,
      });
    }

    // Rule 3: the outer manifest's conditional-exports map.
    if let Some(export_match) = manifest.resolve_export(submodule) {
      let module = export_match.pick(&["import", "module", "default"]);
      let types = export_match.pick(&["types"]);
      let main = export_match.pick(&["require", "node", "default"]);
      return Ok(ResolvedEntry {
        module,
        main,
        types,
        typings: None,
        exports: Vec::new(),
        export_default: false,
      });
    }

    // Rule 4: default to the submodule path itself.
    if manifest.module.is_some() {
      Ok(ResolvedEntry {
        module: Some(submodule.to_string()),
        main: None,
        types: None,
        typings: None,
        exports: Vec::new(),
        export_default: false,
      })
    } else {
      Ok(ResolvedEntry {
        module: None,
        main: Some(submodule.to_string()),
        types: None,
        typings: None,
        exports: Vec::new(),
        export_default: false,
      })
    }
  }

  /// Verifies a resolved ESM `module` entry by sniffing its source for
  /// ESM-vs-CJS idioms. If the file looks like CJS, `module` is cleared
  /// so the caller falls through to the CJS path (oracle consultation).
  /// A parse failure (file missing/unreadable) is never surfaced — it is
  /// treated the same as "not a module" (spec §7, Parse is recoverable).
  pub fn verify_esm_entry(&self, package_root: &Path, entry: &mut ResolvedEntry) {
    let Some(module) = entry.module.clone() else {
      return;
    };
    let path = package_root.join(&module);
    let Ok(source) = std::fs::read_to_string(&path) else {
      entry.module = None;
      return;
    };
    if sniff_module_kind(&source) != ModuleKind::Esm {
      entry.module = None;
    }
  }

  /// When `module` is empty, consults the CJS Export Oracle to populate
  /// `exports`/`export_default`.
  pub async fn resolve_cjs_exports(
    &self,
    oracle: &dyn CjsExportOracle,
    wd: &Path,
    entry: &mut ResolvedEntry,
    node_env: &str,
    timeout: Duration,
  ) -> Result<(), ResolveError> {
    if entry.module.is_some() {
      return Ok(());
    }
    let Some(import_path) = entry.main.clone() else {
      return Ok(());
    };
    let output = oracle
      .parse_cjs_module_exports(&wd.display().to_string(), &import_path, node_env, timeout)
      .await
      .map_err(|e| ResolveError::Oracle(import_path.clone(), e))?;
    entry.exports = output.exports;
    entry.export_default = true;
    Ok(())
  }
}

impl Default for EntryResolver {
  fn default() -> Self {
    Self::new()
  }
}

/// Derives the `@types/<name>` coordinate `resolve_declaration`'s final
/// fallback needs; `None` if `pkg_name` is itself a `@types/*`
/// distribution (spec §4.2 rule 1's `@types/<name>` fallback).
fn types_package_name(pkg_name: &str) -> Option<String> {
  if pkg_name.starts_with("@types/") {
    return None;
  }
  Some(match pkg_name.strip_prefix('@') {
    Some(scoped) => format!("@types/{}", scoped.replace('/', "__")),
    None => format!("@types/{pkg_name}"),
  })
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use esm_oracle::OracleError;
  use esm_oracle::ParseCjsModuleExportsOutput;
  use pretty_assertions::assert_eq;
  use serde_json::json;
  use tempfile::TempDir;

  use super::*;

  struct FakeOracle {
    exports: Vec<String>,
  }

  #[async_trait]
  impl CjsExportOracle for FakeOracle {
    async fn parse_cjs_module_exports(
      &self,
      _wd: &str,
      _import_path: &str,
      _node_env: &str,
      _timeout: Duration,
    ) -> Result<ParseCjsModuleExportsOutput, OracleError> {
      Ok(ParseCjsModuleExportsOutput {
        exports: self.exports.clone(),
        error: None,
      })
    }
  }

  #[test]
  fn default_entry_prefers_manifest_fields() {
    let manifest = PackageJson {
      main: Some("index.cjs.js".into()),
      module: Some("index.esm.js".into()),
      ..Default::default()
    };
    let resolved = EntryResolver::new()
      .resolve_entry(Path::new("/pkg"), &manifest, None)
      .unwrap();
    assert_eq!(resolved.module.as_deref(), Some("index.esm.js"));
    assert_eq!(resolved.main.as_deref(), Some("index.cjs.js"));
  }

  #[test]
  fn submodule_with_own_manifest_is_rebased() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("button")).unwrap();
    std::fs::write(
      dir.path().join("button/package.json"),
      r#"{"main": "index.js", "module": "esm/index.js"}"#,
    )
    .unwrap();
    let manifest = PackageJson::default();
    let resolved = EntryResolver::new()
      .resolve_entry(dir.path(), &manifest, Some("button"))
      .unwrap();
    assert_eq!(resolved.main.as_deref(), Some("button/index.js"));
    assert_eq!(resolved.module.as_deref(), Some("button/esm/index.js"));
  }

  #[test]
  fn submodule_via_conditional_exports() {
    let manifest = PackageJson {
      exports: Some(json!({
        "./button": { "import": "./esm/button.js", "require": "./cjs/button.js" },
      })),
      ..Default::default()
    };
    let resolved = EntryResolver::new()
      .resolve_entry(Path::new("/pkg"), &manifest, Some("button"))
      .unwrap();
    assert_eq!(resolved.module.as_deref(), Some("./esm/button.js"));
    assert_eq!(resolved.main.as_deref(), Some("./cjs/button.js"));
  }

  #[test]
  fn default_rule_uses_submodule_path() {
    let manifest = PackageJson::default();
    let resolved = EntryResolver::new()
      .resolve_entry(Path::new("/pkg"), &manifest, Some("unescape.js"))
      .unwrap();
    assert_eq!(resolved.main.as_deref(), Some("unescape.js"));
    assert_eq!(resolved.module, None);
  }

  #[test]
  fn declaration_redirect_convention() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("button")).unwrap();
    std::fs::write(dir.path().join("button/index.d.ts"), "export {};").unwrap();
    let resolution =
      EntryResolver::new().resolve_declaration(dir.path(), "button~.d.ts", "antd");
    assert_eq!(
      resolution,
      DeclarationResolution::Found("button/index.d.ts".to_string())
    );
  }

  #[test]
  fn declaration_falls_back_to_types_package() {
    let dir = TempDir::new().unwrap();
    let resolution =
      EntryResolver::new().resolve_declaration(dir.path(), "index.d.ts", "lodash");
    assert_eq!(
      resolution,
      DeclarationResolution::NeedsTypesPackage("@types/lodash".to_string())
    );
  }

  #[test]
  fn types_distribution_has_no_further_fallback() {
    let dir = TempDir::new().unwrap();
    let resolution =
      EntryResolver::new().resolve_declaration(dir.path(), "index.d.ts", "@types/lodash");
    assert_eq!(resolution, DeclarationResolution::NotFound);
  }

  #[test]
  fn verify_esm_entry_clears_module_for_cjs_source() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.js"), "module.exports = require('x');").unwrap();
    let mut entry = ResolvedEntry {
      module: Some("index.js".to_string()),
      ..Default::default()
    };
    EntryResolver::new().verify_esm_entry(dir.path(), &mut entry);
    assert_eq!(entry.module, None);
  }

  #[tokio::test]
  async fn resolves_cjs_exports_via_oracle() {
    let oracle = FakeOracle {
      exports: vec!["foo".to_string(), "bar".to_string()],
    };
    let mut entry = ResolvedEntry {
      module: None,
      main: Some("index.js".to_string()),
      ..Default::default()
    };
    EntryResolver::new()
      .resolve_cjs_exports(&oracle, Path::new("/pkg"), &mut entry, "production", Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(entry.exports, vec!["foo", "bar"]);
    assert!(entry.export_default);
  }
}
