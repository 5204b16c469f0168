// Copyright 2018-2026 the esm.sh authors. MIT license.

//! A minimal concrete [`JsBundler`]. The real bundler library the
//! Build Engine plugs into is a full dependency-graph bundler;
//! reimplementing one is out of scope here. This adapter instead
//! handles the common case the CLI needs to actually run something
//! end to end: a package whose
//! resolved entry is *already* a single flat ES module (as most
//! registry packages ship their `module` build), whose only remaining
//! imports point outside the file being bundled. Those get routed
//! through [`ExternalizingResolver`] exactly as a real bundler's plugin
//! hook would; anything that would require inlining another file on
//! disk is reported as a diagnostic rather than silently mishandled.

use std::collections::HashSet;
use std::path::Path;

use esm_bundle::BundleError;
use esm_bundle::BundleOptions;
use esm_bundle::BundleResult;
use esm_bundle::ExternalizingResolver;
use esm_bundle::JsBundler;
use esm_bundle::ResolveDecision;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `import ... from "X"`, `export ... from "X"`, and bare
/// `import "X"`/`import("X")` specifier positions. Deliberately loose:
/// it only needs to find the specifier literal, not parse the surrounding
/// binding form, since that's left untouched in the output.
static IMPORT_SPECIFIER: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?:from|import)\s*\(?\s*["']([^"']+)["']"#).unwrap()
});

pub struct FlatFileBundler;

impl JsBundler for FlatFileBundler {
  fn bundle(
    &self,
    options: &BundleOptions,
    resolver: &mut ExternalizingResolver,
  ) -> Result<BundleResult, BundleError> {
    let source = read_entry(&options.entry_point)?;

    let mut rewritten = String::with_capacity(source.len());
    let mut cursor = 0usize;
    let mut seen_unsupported: HashSet<String> = HashSet::new();

    for cap in IMPORT_SPECIFIER.captures_iter(&source) {
      let whole = cap.get(0).unwrap();
      let specifier = cap.get(1).unwrap().as_str();

      rewritten.push_str(&source[cursor..whole.start()]);
      cursor = whole.end();

      match resolver.resolve(specifier) {
        ResolveDecision::ExternalPassthrough(target) => {
          rewritten.push_str(&whole.as_str().replace(specifier, &target));
        }
        ResolveDecision::ExternalSentinel(name) => {
          rewritten.push_str(&whole.as_str().replace(
            specifier,
            &format!("{}{name}", esm_bundle::EXTERNAL_SENTINEL_PREFIX),
          ));
        }
        ResolveDecision::BundleInline => {
          if specifier.starts_with('.') && seen_unsupported.insert(specifier.to_string()) {
            return Err(BundleError::Diagnostic(format!(
              "FlatFileBundler cannot inline local module \"{specifier}\" — the entry point \
               is not a single flat file. A real dependency-graph bundler is required for \
               this package."
            )));
          }
          rewritten.push_str(whole.as_str());
        }
      }
    }
    rewritten.push_str(&source[cursor..]);

    let mut files = std::collections::HashMap::new();
    files.insert("entry.js".to_string(), rewritten.into_bytes());
    Ok(BundleResult { files })
  }
}

fn read_entry(entry_point: &str) -> Result<String, BundleError> {
  if let Some(src) = entry_point.strip_prefix("data:text/javascript,") {
    return Ok(src.to_string());
  }
  std::fs::read_to_string(Path::new(entry_point))
    .map_err(|e| BundleError::Diagnostic(format!("failed to read entry {entry_point:?}: {e}")))
}
