// Copyright 2018-2026 the esm.sh authors. MIT license.

//! A minimal `package.json` model plus the conditional-exports matching
//! rules the Entry Resolver needs: exact subpath keys, `/*` wildcard
//! keys with suffix substitution, and nested condition objects
//! (`import`/`require`/`types`/...).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// The fields of a `package.json` the build engine actually reads.
/// Everything else in the manifest is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub version: String,
  pub main: Option<String>,
  pub module: Option<String>,
  pub types: Option<String>,
  pub typings: Option<String>,
  pub exports: Option<Value>,
  #[serde(default)]
  pub dependencies: IndexMap<String, String>,
  #[serde(default, rename = "peerDependencies")]
  pub peer_dependencies: IndexMap<String, String>,
  #[serde(default, rename = "optionalDependencies")]
  pub optional_dependencies: IndexMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PackageJsonError {
  #[error("failed reading {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed parsing package.json at {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

impl PackageJson {
  pub fn from_str(raw: &str, path: impl Into<String>) -> Result<Self, PackageJsonError> {
    serde_json::from_str(raw).map_err(|source| PackageJsonError::Parse {
      path: path.into(),
      source,
    })
  }

  pub fn from_path(path: &std::path::Path) -> Result<Self, PackageJsonError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PackageJsonError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_str(&raw, path.display().to_string())
  }

  /// Prefers `module` over `main`, as ESM consumers must.
  pub fn esm_entry(&self) -> Option<&str> {
    self.module.as_deref().or(self.main.as_deref())
  }

  /// Resolves `./<subpath>` against this manifest's `exports` map per the
  /// rules in the Entry Resolver spec: an exact key match wins, otherwise
  /// a `/*`-suffixed key matches by prefix and substitutes the captured
  /// suffix into every string leaf of that key's value.
  pub fn resolve_export(&self, subpath: &str) -> Option<ExportMatch> {
    let exports = self.exports.as_ref()?;
    let target_key = format!("./{subpath}");

    // A package can declare `exports` as a single condition object (no
    // subpath keys) meaning it only exports its root; or as a map of
    // subpaths to condition objects/strings.
    let map = exports.as_object()?;

    if let Some(value) = map.get(&target_key) {
      return Some(ExportMatch {
        value: value.clone(),
        wildcard_suffix: None,
      });
    }

    let mut best: Option<(&str, &Value)> = None;
    for (key, value) in map.iter() {
      let Some(prefix) = key.strip_suffix('*') else {
        continue;
      };
      if let Some(suffix) = target_key.strip_prefix(prefix) {
        // Prefer the longest matching prefix, mirroring Node's
        // most-specific-wildcard-wins semantics.
        if best.map(|(p, _)| prefix.len() > p.len()).unwrap_or(true) {
          best = Some((prefix, value));
          let _ = suffix;
        }
      }
    }

    let (prefix, value) = best?;
    let suffix = target_key.strip_prefix(prefix)?.to_string();
    Some(ExportMatch {
      value: substitute_wildcard(value, &suffix),
      wildcard_suffix: Some(suffix),
    })
  }
}

/// The outcome of a successful `exports` map lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMatch {
  /// The matched value, with any `*` placeholders already substituted.
  pub value: Value,
  pub wildcard_suffix: Option<String>,
}

impl ExportMatch {
  /// Picks a single path out of a matched value, preferring `import`-ish
  /// conditions for ESM consumption, falling back to `default`, then to a
  /// bare string value.
  pub fn pick(&self, conditions: &[&str]) -> Option<String> {
    pick_condition(&self.value, conditions)
  }
}

fn pick_condition(value: &Value, conditions: &[&str]) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Object(map) => {
      for cond in conditions {
        if let Some(v) = map.get(*cond) {
          if let Some(found) = pick_condition(v, conditions) {
            return Some(found);
          }
        }
      }
      map.get("default").and_then(|v| pick_condition(v, conditions))
    }
    _ => None,
  }
}

fn substitute_wildcard(value: &Value, suffix: &str) -> Value {
  match value {
    Value::String(s) => Value::String(s.replacen('*', suffix, 1)),
    Value::Object(map) => Value::Object(
      map
        .iter()
        .map(|(k, v)| (k.clone(), substitute_wildcard(v, suffix)))
        .collect(),
    ),
    Value::Array(items) => {
      Value::Array(items.iter().map(|v| substitute_wildcard(v, suffix)).collect())
    }
    other => other.clone(),
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;

  #[test]
  fn esm_entry_prefers_module_over_main() {
    let pkg = PackageJson {
      main: Some("index.cjs.js".into()),
      module: Some("index.esm.js".into()),
      ..Default::default()
    };
    assert_eq!(pkg.esm_entry(), Some("index.esm.js"));
  }

  #[test]
  fn exact_export_key_matches() {
    let pkg = PackageJson {
      exports: Some(json!({
        "./": "./index.js",
        "./foo": "./foo.js",
      })),
      ..Default::default()
    };
    let m = pkg.resolve_export("foo").unwrap();
    assert_eq!(m.pick(&["import"]), Some("./foo.js".to_string()));
  }

  #[test]
  fn wildcard_export_substitutes_suffix() {
    let pkg = PackageJson {
      exports: Some(json!({
        "./lib/*": {
          "import": "./esm/*.mjs",
          "require": "./cjs/*.js",
        },
      })),
      ..Default::default()
    };
    let m = pkg.resolve_export("lib/button").unwrap();
    assert_eq!(m.wildcard_suffix.as_deref(), Some("button"));
    assert_eq!(m.pick(&["import"]), Some("./esm/button.mjs".to_string()));
    assert_eq!(m.pick(&["require"]), Some("./cjs/button.js".to_string()));
  }

  #[test]
  fn no_matching_export_returns_none() {
    let pkg = PackageJson {
      exports: Some(json!({ "./foo": "./foo.js" })),
      ..Default::default()
    };
    assert!(pkg.resolve_export("bar").is_none());
  }

  #[test]
  fn most_specific_wildcard_wins() {
    let pkg = PackageJson {
      exports: Some(json!({
        "./*": "./generic/*.js",
        "./icons/*": "./icons/*.js",
      })),
      ..Default::default()
    };
    let m = pkg.resolve_export("icons/star").unwrap();
    assert_eq!(m.pick(&["import"]), Some("./icons/star.js".to_string()));
  }
}
