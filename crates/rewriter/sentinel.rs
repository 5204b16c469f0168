// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Streaming rewrite of one bundler output file around every
//! `__ESM_SH_EXTERNAL:<name>` sentinel occurrence (spec §4.5a/b, §9).
//!
//! Regex-based scanning is deliberately avoided; the sentinel is a
//! unique literal, so a single left-to-right scan for its quoted form is
//! enough. The only state carried across a split is "are we inside a
//! synthetic `require(...)` call" — tracked per-occurrence here rather
//! than as a parser-wide flag, since each sentinel is self-contained
//! (bundlers never nest one externalised import inside another).

use indexmap::IndexMap;

use crate::ExternalInfo;
use crate::RewriteError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
  Default(String),
  Namespace(String),
  Named(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
  pub url: String,
  pub kind: BindingKind,
}

impl ImportBinding {
  pub fn local_ident(&self) -> &str {
    match &self.kind {
      BindingKind::Default(ident) => ident,
      BindingKind::Namespace(ident) => ident,
      BindingKind::Named(_, ident) => ident,
    }
  }

  pub fn import_statement(&self) -> String {
    match &self.kind {
      BindingKind::Default(ident) => format!("import {ident} from \"{}\";", self.url),
      BindingKind::Namespace(ident) => format!("import * as {ident} from \"{}\";", self.url),
      BindingKind::Named(export, ident) => {
        format!("import {{ {export} as {ident} }} from \"{}\";", self.url)
      }
    }
  }
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// `__<name>$` with every non-identifier byte of `name` folded to `_`,
/// used as the default/namespace import alias for an external. The
/// spec pins the *named*-export alias exactly (`__<id>$`); it leaves the
/// default/namespace alias unspecified beyond "import the default" /
/// "import the namespace", so this is this engine's chosen scheme.
fn sanitize_ident(name: &str) -> String {
  name
    .chars()
    .map(|c| if is_ident_char(c) { c } else { '_' })
    .collect()
}

struct CallSite {
  /// Byte offset where the stripped span begins (the synthetic
  /// identifier preceding the opening paren).
  span_start: usize,
  /// Byte offset one past the closing paren, or one past a `.IDENT`
  /// suffix when that suffix was consumed as a named-export match.
  span_end: usize,
  dot_ident: Option<String>,
}

/// Looks for `<ident>(` immediately preceding byte offset `quote_start`
/// (the opening quote of the sentinel literal) and a matching `)`
/// immediately following `quote_end`. Returns `None` if the sentinel
/// isn't wrapped in a synthetic require call (e.g. it already sits in a
/// plain `import ... from "..."` specifier position).
fn find_call_site(source: &str, quote_start: usize, quote_end: usize) -> Option<CallSite> {
  let before = &source[..quote_start];
  let trimmed_before = before.trim_end();
  if !trimmed_before.ends_with('(') {
    return None;
  }
  let paren_idx = trimmed_before.len() - 1;
  let ident_end = paren_idx;
  let ident_start = trimmed_before[..ident_end]
    .rfind(|c: char| !is_ident_char(c))
    .map(|i| i + 1)
    .unwrap_or(0);
  if ident_start == ident_end {
    // A bare `(` with no preceding identifier isn't a synthetic require.
    return None;
  }

  let after = &source[quote_end..];
  let after_trimmed = after.trim_start();
  let leading_ws = after.len() - after_trimmed.len();
  if !after_trimmed.starts_with(')') {
    return None;
  }
  let close_paren_end = quote_end + leading_ws + 1;

  let tail = &source[close_paren_end..];
  let (dot_ident, dot_len) = if let Some(rest) = tail.strip_prefix('.') {
    let ident_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    if ident_len > 0 {
      (Some(rest[..ident_len].to_string()), 1 + ident_len)
    } else {
      (None, 0)
    }
  } else {
    (None, 0)
  };

  Some(CallSite {
    span_start: ident_start,
    span_end: close_paren_end + dot_len,
    dot_ident,
  })
}

/// Scans `source` for every distinct `__ESM_SH_EXTERNAL:<name>` literal,
/// in first-occurrence order. Used by the Build Orchestrator to learn
/// which externals a bundler output actually references before it has
/// built the [`ExternalInfo`] map `rewrite_sentinels` needs.
pub fn collect_sentinel_names(source: &str) -> Vec<String> {
  const PREFIX: &str = "__ESM_SH_EXTERNAL:";
  let mut names = Vec::new();
  let mut cursor = 0usize;
  while let Some(rel) = source[cursor..].find(PREFIX) {
    let name_start = cursor + rel + PREFIX.len();
    let quote_char = source[..cursor + rel].chars().next_back();
    let Some(end) = source[name_start..].find(|c: char| Some(c) == quote_char || c == '"' || c == '\'') else {
      break;
    };
    let name = source[name_start..name_start + end].to_string();
    if !names.contains(&name) {
      names.push(name);
    }
    cursor = name_start + end;
  }
  names
}

/// Rewrites every `"__ESM_SH_EXTERNAL:<name>"` occurrence in `source`,
/// returning the rewritten body and the deduplicated set of import
/// bindings its prelude must declare.
pub fn rewrite_sentinels(
  source: &str,
  externals: &IndexMap<String, ExternalInfo>,
) -> Result<(String, Vec<ImportBinding>), RewriteError> {
  const PREFIX: &str = "__ESM_SH_EXTERNAL:";
  let mut out = String::with_capacity(source.len());
  let mut bindings: Vec<ImportBinding> = Vec::new();
  let mut cursor = 0usize;

  while let Some(rel) = source[cursor..].find(PREFIX) {
    let prefix_start = cursor + rel;
    let quote_char = source[..prefix_start].chars().next_back();
    let Some(quote_char) = quote_char.filter(|c| *c == '"' || *c == '\'') else {
      // Malformed/unquoted sentinel text; copy through verbatim and move on.
      out.push_str(&source[cursor..prefix_start + PREFIX.len()]);
      cursor = prefix_start + PREFIX.len();
      continue;
    };
    let quote_start = prefix_start - 1;
    let name_start = prefix_start + PREFIX.len();
    let Some(name_len) = source[name_start..].find(quote_char) else {
      out.push_str(&source[cursor..]);
      cursor = source.len();
      break;
    };
    let name = &source[name_start..name_start + name_len];
    let quote_end = name_start + name_len + 1;

    let info = externals
      .get(name)
      .ok_or_else(|| RewriteError::UnresolvedExternal(name.to_string()))?;

    if let Some(call) = find_call_site(source, quote_start, quote_end) {
      out.push_str(&source[cursor..call.span_start]);

      let binding = choose_binding(info, call.dot_ident.as_deref());
      let local = binding.local_ident().to_string();
      let consumed_dot = matches!(
        &binding.kind,
        BindingKind::Named(export, _) if Some(export.as_str()) == call.dot_ident.as_deref()
      );
      push_unique(&mut bindings, binding);
      out.push_str(&local);

      if consumed_dot {
        cursor = call.span_end;
      } else {
        // `.IDENT` wasn't consumed as a named export: drop it back in
        // verbatim after the identifier we just emitted.
        let unconsumed_len = call.dot_ident.as_ref().map(|d| 1 + d.len()).unwrap_or(0);
        cursor = call.span_end - unconsumed_len;
      }
    } else {
      // Plain specifier position (e.g. a native ESM `import` statement):
      // only the quoted literal's contents are replaced.
      out.push_str(&source[cursor..name_start]);
      out.push_str(&info.url);
      cursor = name_start + name_len;
    }
  }
  out.push_str(&source[cursor..]);

  Ok((out, bindings))
}

fn choose_binding(info: &ExternalInfo, dot_ident: Option<&str>) -> ImportBinding {
  if let Some(ident) = dot_ident {
    if info.named_exports.iter().any(|e| e == ident) {
      return ImportBinding {
        url: info.url.clone(),
        kind: BindingKind::Named(ident.to_string(), format!("__{ident}$")),
      };
    }
  }
  if info.is_esm && !info.has_default {
    ImportBinding {
      url: info.url.clone(),
      kind: BindingKind::Namespace(format!("__{}_ns$", sanitize_ident(&info.url))),
    }
  } else {
    ImportBinding {
      url: info.url.clone(),
      kind: BindingKind::Default(format!("__{}$", sanitize_ident(&info.url))),
    }
  }
}

fn push_unique(bindings: &mut Vec<ImportBinding>, binding: ImportBinding) {
  if !bindings.contains(&binding) {
    bindings.push(binding);
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn externals_with(name: &str, info: ExternalInfo) -> IndexMap<String, ExternalInfo> {
    let mut map = IndexMap::new();
    map.insert(name.to_string(), info);
    map
  }

  #[test]
  fn plain_import_specifier_is_replaced() {
    let source = r#"import x from "__ESM_SH_EXTERNAL:react";"#;
    let externals = externals_with(
      "react",
      ExternalInfo {
        url: "/react@17.0.2/es2020/react.js".to_string(),
        is_esm: true,
        has_default: true,
        named_exports: vec![],
      },
    );
    let (out, bindings) = rewrite_sentinels(source, &externals).unwrap();
    assert_eq!(out, r#"import x from "/react@17.0.2/es2020/react.js";"#);
    assert!(bindings.is_empty());
  }

  #[test]
  fn call_site_with_known_named_export_is_rewritten() {
    let source = r#"const y = require$$("__ESM_SH_EXTERNAL:cjs-pkg").foo;"#;
    let externals = externals_with(
      "cjs-pkg",
      ExternalInfo {
        url: "/cjs-pkg@1.0.0/es2020/cjs-pkg.js".to_string(),
        is_esm: false,
        has_default: true,
        named_exports: vec!["foo".to_string()],
      },
    );
    let (out, bindings) = rewrite_sentinels(source, &externals).unwrap();
    assert_eq!(out, "const y = __foo$;");
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].kind, BindingKind::Named("foo".to_string(), "__foo$".to_string()));
  }

  #[test]
  fn call_site_with_unknown_dotted_property_falls_back_to_default() {
    let source = r#"const y = require$$("__ESM_SH_EXTERNAL:cjs-pkg").bar;"#;
    let externals = externals_with(
      "cjs-pkg",
      ExternalInfo {
        url: "/cjs-pkg@1.0.0/es2020/cjs-pkg.js".to_string(),
        is_esm: false,
        has_default: true,
        named_exports: vec!["foo".to_string()],
      },
    );
    let (out, bindings) = rewrite_sentinels(source, &externals).unwrap();
    assert!(out.contains("$.bar;"));
    assert!(matches!(bindings[0].kind, BindingKind::Default(_)));
  }

  #[test]
  fn esm_without_default_uses_namespace_import() {
    let source = r#"const y = require$$("__ESM_SH_EXTERNAL:esm-pkg");"#;
    let externals = externals_with(
      "esm-pkg",
      ExternalInfo {
        url: "/esm-pkg@1.0.0/es2020/esm-pkg.js".to_string(),
        is_esm: true,
        has_default: false,
        named_exports: vec![],
      },
    );
    let (out, bindings) = rewrite_sentinels(source, &externals).unwrap();
    assert_eq!(out, "const y = __esm_pkg_1_0_0_es2020_esm_pkg_js_ns$;");
    assert!(matches!(bindings[0].kind, BindingKind::Namespace(_)));
  }

  #[test]
  fn repeated_usages_dedupe_to_one_binding() {
    let source = r#"require$$("__ESM_SH_EXTERNAL:react").foo; require$$("__ESM_SH_EXTERNAL:react").foo;"#;
    let externals = externals_with(
      "react",
      ExternalInfo {
        url: "/react@17.0.2/es2020/react.js".to_string(),
        is_esm: false,
        has_default: true,
        named_exports: vec!["foo".to_string()],
      },
    );
    let (_out, bindings) = rewrite_sentinels(source, &externals).unwrap();
    assert_eq!(bindings.len(), 1);
  }

  #[test]
  fn collects_distinct_sentinel_names_in_order() {
    let source = r#"require$$("__ESM_SH_EXTERNAL:react"); import x from "__ESM_SH_EXTERNAL:react-dom"; require$$("__ESM_SH_EXTERNAL:react").foo;"#;
    assert_eq!(
      collect_sentinel_names(source),
      vec!["react".to_string(), "react-dom".to_string()]
    );
  }

  #[test]
  fn import_statement_rendering() {
    let binding = ImportBinding {
      url: "/react@17.0.2/es2020/react.js".to_string(),
      kind: BindingKind::Named("useState".to_string(), "__useState$".to_string()),
    };
    assert_eq!(
      binding.import_statement(),
      "import { useState as __useState$ } from \"/react@17.0.2/es2020/react.js\";"
    );
  }
}
