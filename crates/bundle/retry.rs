// Copyright 2018-2026 the esm.sh authors. MIT license.

use crate::BundleError;

/// The "go to label" retry loop in the bundler wrapper (spec §9), made
/// explicit as a classifier over one bundler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
  /// The error is fatal (or the build otherwise succeeded); stop.
  Done,
  /// `Could not resolve "X"`: retry with `X` added to the extra-external
  /// set, unless `X` is the package currently being built (fatal).
  RetryWithExtraExternal(String),
  /// `No matching export ... for import "default"`: retry with a
  /// synthetic stdin entry re-exporting a null default.
  RetryWithStdinEntry(String),
}

/// Classifies a bundler diagnostic into a retry decision. `building_pkg`
/// is the name of the package currently being built: a `Could not
/// resolve` error naming it is fatal, not recoverable, because it would
/// otherwise retry forever.
pub fn classify_bundle_error(err: &BundleError, building_pkg: &str) -> RetryDecision {
  match err {
    BundleError::CouldNotResolve(specifier) if specifier != building_pkg => {
      RetryDecision::RetryWithExtraExternal(specifier.clone())
    }
    BundleError::NoMatchingDefaultExport(pkg) => RetryDecision::RetryWithStdinEntry(pkg.clone()),
    _ => RetryDecision::Done,
  }
}

/// Builds the synthetic stdin entry source used for the
/// [`RetryDecision::RetryWithStdinEntry`] recovery: `import "<pkg>";
/// export default null;`.
pub fn synthetic_default_entry(pkg: &str) -> String {
  format!("import \"{pkg}\";\nexport default null;\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unresolvable_dependency_retries_with_extra_external() {
    let err = BundleError::CouldNotResolve("lodash".to_string());
    assert_eq!(
      classify_bundle_error(&err, "my-pkg"),
      RetryDecision::RetryWithExtraExternal("lodash".to_string())
    );
  }

  #[test]
  fn unresolvable_self_is_fatal() {
    let err = BundleError::CouldNotResolve("my-pkg".to_string());
    assert_eq!(classify_bundle_error(&err, "my-pkg"), RetryDecision::Done);
  }

  #[test]
  fn missing_default_export_retries_with_stdin_entry() {
    let err = BundleError::NoMatchingDefaultExport("cjs-pkg".to_string());
    assert_eq!(
      classify_bundle_error(&err, "my-pkg"),
      RetryDecision::RetryWithStdinEntry("cjs-pkg".to_string())
    );
  }

  #[test]
  fn synthetic_entry_shape() {
    assert_eq!(
      synthetic_default_entry("cjs-pkg"),
      "import \"cjs-pkg\";\nexport default null;\n"
    );
  }
}
