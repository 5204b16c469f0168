// Copyright 2018-2026 the esm.sh authors. MIT license.

//! A cheap source-level sniff of whether a file reads as an ES module or
//! CommonJS, used only to verify a manifest's declared `module` entry
//! before trusting it (spec §4.2's `checkExports` step). This is not a
//! parser: the bundler performs the real parse. A file that looks like
//! neither is treated as CJS, matching the spec's "if parsing declares
//! it non-module, clear `module`" recovery path.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
  Esm,
  Cjs,
}

/// Strips line and block comments so keyword scanning doesn't trip on
/// `// import foo` or `/* module.exports */`.
fn strip_comments(source: &str) -> String {
  let mut out = String::with_capacity(source.len());
  let mut chars = source.chars().peekable();
  while let Some(c) = chars.next() {
    match c {
      '/' if chars.peek() == Some(&'/') => {
        for c in chars.by_ref() {
          if c == '\n' {
            out.push('\n');
            break;
          }
        }
      }
      '/' if chars.peek() == Some(&'*') => {
        chars.next();
        let mut prev = ' ';
        for c in chars.by_ref() {
          if prev == '*' && c == '/' {
            break;
          }
          prev = c;
        }
      }
      _ => out.push(c),
    }
  }
  out
}

pub fn sniff_module_kind(source: &str) -> ModuleKind {
  let cleaned = strip_comments(source);
  let has_esm_syntax = cleaned.lines().any(|line| {
    let t = line.trim_start();
    t.starts_with("import ")
      || t.starts_with("import{")
      || t.starts_with("export ")
      || t.starts_with("export{")
      || t.starts_with("export default")
  });
  if has_esm_syntax {
    return ModuleKind::Esm;
  }

  let has_cjs_syntax = cleaned.contains("module.exports")
    || cleaned.contains("exports.")
    || cleaned.contains("require(");
  if has_cjs_syntax {
    return ModuleKind::Cjs;
  }

  // Neither idiom observed (e.g. a side-effect-only file): treated as
  // not-a-module, which the caller folds into the CJS recovery path.
  ModuleKind::Cjs
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_esm_import() {
    assert_eq!(sniff_module_kind("import React from 'react';"), ModuleKind::Esm);
  }

  #[test]
  fn detects_esm_export() {
    assert_eq!(sniff_module_kind("export const x = 1;"), ModuleKind::Esm);
  }

  #[test]
  fn detects_cjs() {
    assert_eq!(
      sniff_module_kind("module.exports = require('./foo');"),
      ModuleKind::Cjs
    );
  }

  #[test]
  fn ignores_commented_out_import() {
    assert_eq!(
      sniff_module_kind("// import foo from 'bar'\nmodule.exports = {};"),
      ModuleKind::Cjs
    );
  }
}
