// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Build request identity: the [`PackageCoordinate`], the [`BuildRequest`]
//! it is embedded in, and the canonical [`Fingerprint`] URL path derived
//! from it.
//!
//! The fingerprint doubles as the artifact store key and the public URL
//! path, so every byte of it must be reproducible from the request alone.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

/// A `{name, version, submodule?}` triple identifying a single module
/// inside a registry package. `version` is always a concrete version,
/// never a range — range resolution happens upstream of the build engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageCoordinate {
  pub name: String,
  pub version: String,
  /// POSIX-style relative path, no leading `./`.
  pub submodule: Option<String>,
}

impl PackageCoordinate {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
      submodule: None,
    }
  }

  pub fn with_submodule(mut self, submodule: impl Into<String>) -> Self {
    let s = submodule.into();
    self.submodule = if s.is_empty() { None } else { Some(s) };
    self
  }

  /// `true` if the name begins with a `@scope/` segment.
  pub fn is_scoped(&self) -> bool {
    self.name.starts_with('@')
  }

  /// The trailing path segment used as the fingerprint's `<leaf>`: the
  /// submodule's base name if present, otherwise the package's own base
  /// name (the part after the scope, for scoped packages).
  pub fn leaf(&self) -> &str {
    match &self.submodule {
      Some(sub) => sub.rsplit('/').next().unwrap_or(sub.as_str()),
      None => self.name.rsplit('/').next().unwrap_or(self.name.as_str()),
    }
  }
}

/// A pinned transitive-dependency version override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedDependency {
  pub name: String,
  pub version: String,
}

/// Bundler output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildTarget {
  Es2015,
  Es2016,
  Es2017,
  Es2018,
  Es2019,
  Es2020,
  Es2021,
  Esnext,
  Node,
  Deno,
  Types,
}

impl BuildTarget {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Es2015 => "es2015",
      Self::Es2016 => "es2016",
      Self::Es2017 => "es2017",
      Self::Es2018 => "es2018",
      Self::Es2019 => "es2019",
      Self::Es2020 => "es2020",
      Self::Es2021 => "es2021",
      Self::Esnext => "esnext",
      Self::Node => "node",
      Self::Deno => "deno",
      Self::Types => "types",
    }
  }

  pub fn is_types(&self) -> bool {
    matches!(self, Self::Types)
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised build target {0:?}")]
pub struct UnknownTargetError(pub String);

impl std::str::FromStr for BuildTarget {
  type Err = UnknownTargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "es2015" => Self::Es2015,
      "es2016" => Self::Es2016,
      "es2017" => Self::Es2017,
      "es2018" => Self::Es2018,
      "es2019" => Self::Es2019,
      "es2020" => Self::Es2020,
      "es2021" => Self::Es2021,
      "esnext" => Self::Esnext,
      "node" => Self::Node,
      "deno" => Self::Deno,
      "types" => Self::Types,
      other => return Err(UnknownTargetError(other.to_string())),
    })
  }
}

/// A fully-resolved build request: the input tuple that uniquely
/// determines an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
  /// Monotonic integer advanced whenever the engine's output shape changes.
  pub build_version: u32,
  pub pkg: PackageCoordinate,
  /// specifier -> replacement specifier.
  pub alias: IndexMap<String, String>,
  /// Ordered pinned transitive-dependency overrides.
  pub deps: Vec<PinnedDependency>,
  pub target: BuildTarget,
  /// Inline non-peer dependencies instead of externalising them.
  pub bundle_mode: bool,
  /// Selects the "development" `NODE_ENV` value and disables minification.
  pub dev_mode: bool,
}

impl BuildRequest {
  pub fn new(pkg: PackageCoordinate, build_version: u32, target: BuildTarget) -> Self {
    Self {
      build_version,
      pkg,
      alias: IndexMap::new(),
      deps: Vec::new(),
      target,
      bundle_mode: false,
      dev_mode: false,
    }
  }

  /// The `NODE_ENV` value this request's artifact is built with.
  pub fn node_env(&self) -> &'static str {
    if self.dev_mode {
      "development"
    } else {
      "production"
    }
  }

  /// Canonical, order-independent encoding of `alias` and `deps`, used as
  /// the payload of the `X-<b64url>` resolve-prefix segment. Returns `None`
  /// when neither is present, in which case no prefix segment is emitted.
  fn canon(&self) -> Option<String> {
    if self.alias.is_empty() && self.deps.is_empty() {
      return None;
    }
    let mut parts = Vec::new();
    if !self.alias.is_empty() {
      let mut pairs: Vec<(&str, &str)> = self
        .alias
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
      pairs.sort_by(|a, b| a.0.cmp(b.0));
      let joined = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(",");
      parts.push(format!("alias:{joined}"));
    }
    if !self.deps.is_empty() {
      let mut deps: Vec<&PinnedDependency> = self.deps.iter().collect();
      deps.sort_by(|a, b| a.name.cmp(&b.name));
      let joined = deps
        .into_iter()
        .map(|d| format!("{}@{}", d.name, d.version))
        .collect::<Vec<_>>()
        .join(",");
      parts.push(format!("deps:{joined}"));
    }
    Some(parts.join(","))
  }

  fn resolve_prefix(&self) -> String {
    match self.canon() {
      None => String::new(),
      Some(canon) => format!("X-{}/", URL_SAFE_NO_PAD.encode(canon.as_bytes())),
    }
  }

  /// The fingerprint string for this request: both the artifact store key
  /// and the public URL path.
  pub fn fingerprint(&self) -> String {
    let mut leaf = self.pkg.leaf().to_string();
    if self.dev_mode {
      leaf.push_str(".development");
    }
    if self.bundle_mode {
      leaf.push_str(".bundle");
    }
    let mut out = format!(
      "v{}/{}@{}/{}{}/{}",
      self.build_version,
      self.pkg.name,
      self.pkg.version,
      self.resolve_prefix(),
      self.target,
      leaf,
    );
    if !self.target.is_types() {
      out.push_str(".js");
    }
    out
  }

  /// The path of the CSS sidecar artifact, had one been produced.
  pub fn css_fingerprint(&self) -> String {
    let js = self.fingerprint();
    match js.strip_suffix(".js") {
      Some(stem) => format!("{stem}.css"),
      None => format!("{js}.css"),
    }
  }
}

/// A structurally parsed fingerprint, as produced by [`parse_fingerprint`].
/// Carries enough information to be testable for round-trip equality; it
/// does not recover `alias`/`deps` (only their opaque encoded form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFingerprint {
  pub build_version: u32,
  pub pkg_name: String,
  pub pkg_version: String,
  pub resolve_payload: Option<String>,
  pub target: BuildTarget,
  pub leaf: String,
  pub dev_mode: bool,
  pub bundle_mode: bool,
  pub is_types: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintParseError {
  #[error("fingerprint {0:?} is missing the leading build-version segment")]
  MissingVersionSegment(String),
  #[error("fingerprint {0:?} has a malformed build-version segment")]
  BadVersionSegment(String),
  #[error("fingerprint {0:?} is missing a '@version' package segment")]
  MissingPackageSegment(String),
  #[error("fingerprint {0:?} is missing a target segment")]
  MissingTargetSegment(String),
  #[error("fingerprint {0:?} is missing a leaf segment")]
  MissingLeafSegment(String),
  #[error("fingerprint {0:?} has an invalid base64url resolve-prefix payload")]
  BadResolvePrefix(String),
  #[error(transparent)]
  UnknownTarget(#[from] UnknownTargetError),
}

/// Parses a fingerprint string back into its structural components.
///
/// This is the inverse of [`BuildRequest::fingerprint`] up to the opaque
/// `alias`/`deps` payload, which round-trips as an undecoded string.
pub fn parse_fingerprint(s: &str) -> Result<ParsedFingerprint, FingerprintParseError> {
  let rest = s
    .strip_prefix('v')
    .ok_or_else(|| FingerprintParseError::MissingVersionSegment(s.to_string()))?;
  let (version_str, rest) = rest
    .split_once('/')
    .ok_or_else(|| FingerprintParseError::MissingVersionSegment(s.to_string()))?;
  let build_version: u32 = version_str
    .parse()
    .map_err(|_| FingerprintParseError::BadVersionSegment(s.to_string()))?;

  // pkg segment: "<name>@<version>", where a scoped name folds in an extra
  // '/' before the '@version' marker, e.g. "@scope/pkg@1.0.0".
  let (pkg_segment, rest) = if let Some(scope_rest) = rest.strip_prefix('@') {
    let (scope, after_scope) = scope_rest
      .split_once('/')
      .ok_or_else(|| FingerprintParseError::MissingPackageSegment(s.to_string()))?;
    let (name_and_version, after_pkg) = after_scope
      .split_once('/')
      .ok_or_else(|| FingerprintParseError::MissingPackageSegment(s.to_string()))?;
    (format!("@{scope}/{name_and_version}"), after_pkg)
  } else {
    rest
      .split_once('/')
      .ok_or_else(|| FingerprintParseError::MissingPackageSegment(s.to_string()))?
  };
  let at_idx = pkg_segment
    .rfind('@')
    .ok_or_else(|| FingerprintParseError::MissingPackageSegment(s.to_string()))?;
  let pkg_name = pkg_segment[..at_idx].to_string();
  let pkg_version = pkg_segment[at_idx + 1..].to_string();

  let mut segments = rest.splitn(3, '/');
  let first = segments
    .next()
    .ok_or_else(|| FingerprintParseError::MissingTargetSegment(s.to_string()))?;
  let (resolve_payload, target_str, leaf_str) = if let Some(b64) = first.strip_prefix("X-") {
    let b64 = b64.strip_suffix('/').unwrap_or(b64);
    URL_SAFE_NO_PAD
      .decode(b64)
      .map_err(|_| FingerprintParseError::BadResolvePrefix(s.to_string()))?;
    let target_str = segments
      .next()
      .ok_or_else(|| FingerprintParseError::MissingTargetSegment(s.to_string()))?;
    let leaf_str = segments
      .next()
      .ok_or_else(|| FingerprintParseError::MissingLeafSegment(s.to_string()))?;
    (Some(b64.to_string()), target_str, leaf_str)
  } else {
    let leaf_str = segments
      .next()
      .ok_or_else(|| FingerprintParseError::MissingLeafSegment(s.to_string()))?;
    (None, first, leaf_str)
  };

  let target: BuildTarget = target_str.parse()?;
  let (leaf_str, is_types) = match leaf_str.strip_suffix(".js") {
    Some(stripped) => (stripped, false),
    None => (leaf_str, true),
  };
  let (leaf_str, bundle_mode) = match leaf_str.strip_suffix(".bundle") {
    Some(stripped) => (stripped, true),
    None => (leaf_str, false),
  };
  let (leaf_str, dev_mode) = match leaf_str.strip_suffix(".development") {
    Some(stripped) => (stripped, true),
    None => (leaf_str, false),
  };

  Ok(ParsedFingerprint {
    build_version,
    pkg_name,
    pkg_version,
    resolve_payload,
    target,
    leaf: leaf_str.to_string(),
    dev_mode,
    bundle_mode,
    is_types,
  })
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn req(pkg: PackageCoordinate) -> BuildRequest {
    BuildRequest::new(pkg, 57, BuildTarget::Es2020)
  }

  #[test]
  fn simple_fingerprint() {
    let r = req(PackageCoordinate::new("react", "17.0.2"));
    assert_eq!(r.fingerprint(), "v57/react@17.0.2/es2020/react.js");
  }

  #[test]
  fn dev_mode_suffix() {
    let mut r = req(PackageCoordinate::new("react", "17.0.2"));
    r.dev_mode = true;
    assert_eq!(
      r.fingerprint(),
      "v57/react@17.0.2/es2020/react.development.js"
    );
  }

  #[test]
  fn bundle_mode_suffix() {
    let mut r = req(PackageCoordinate::new("react", "17.0.2"));
    r.bundle_mode = true;
    assert_eq!(r.fingerprint(), "v57/react@17.0.2/es2020/react.bundle.js");
  }

  #[test]
  fn types_target_drops_js_extension() {
    let mut r = req(PackageCoordinate::new("lodash", "4.17.21").with_submodule("unescape"));
    r.target = BuildTarget::Types;
    assert_eq!(r.fingerprint(), "v57/lodash@4.17.21/types/unescape");
  }

  #[test]
  fn scoped_package_leaf() {
    let r = req(PackageCoordinate::new("@babel/core", "7.18.0"));
    assert_eq!(r.fingerprint(), "v57/@babel/core@7.18.0/es2020/core.js");
  }

  #[test]
  fn resolve_prefix_is_order_independent() {
    let mut a = req(PackageCoordinate::new("swr", "1.0.0"));
    a.alias.insert("react".into(), "preact/compat".into());
    a.alias.insert("react-dom".into(), "preact/compat".into());
    a.deps.push(PinnedDependency {
      name: "preact".into(),
      version: "10.5.14".into(),
    });

    let mut b = req(PackageCoordinate::new("swr", "1.0.0"));
    b.alias.insert("react-dom".into(), "preact/compat".into());
    b.alias.insert("react".into(), "preact/compat".into());
    b.deps.push(PinnedDependency {
      name: "preact".into(),
      version: "10.5.14".into(),
    });

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert!(a.fingerprint().contains("/X-"));
  }

  #[test]
  fn resolve_prefix_decodes_to_expected_canon() {
    let mut r = req(PackageCoordinate::new("swr", "1.0.0"));
    r.alias.insert("react".into(), "preact/compat".into());
    r.deps.push(PinnedDependency {
      name: "preact".into(),
      version: "10.5.14".into(),
    });
    let fp = r.fingerprint();
    let parsed = parse_fingerprint(&fp).unwrap();
    let payload = parsed.resolve_payload.unwrap();
    let decoded = URL_SAFE_NO_PAD.decode(payload).unwrap();
    assert_eq!(
      String::from_utf8(decoded).unwrap(),
      "alias:react:preact/compat,deps:preact@10.5.14"
    );
  }

  #[test]
  fn css_sidecar_path() {
    let r = req(PackageCoordinate::new("antd", "4.20.0"));
    assert_eq!(r.css_fingerprint(), "v57/antd@4.20.0/es2020/antd.css");
  }

  #[test]
  fn round_trip_through_parse() {
    for r in [
      req(PackageCoordinate::new("react", "17.0.2")),
      req(PackageCoordinate::new("@babel/core", "7.18.0")),
      {
        let mut r = req(PackageCoordinate::new("lodash", "4.17.21").with_submodule("unescape"));
        r.target = BuildTarget::Types;
        r
      },
    ] {
      let fp = r.fingerprint();
      let parsed = parse_fingerprint(&fp).expect("parses");
      assert_eq!(parsed.pkg_name, r.pkg.name);
      assert_eq!(parsed.pkg_version, r.pkg.version);
      assert_eq!(parsed.target, r.target);
      assert_eq!(parsed.is_types, r.target.is_types());
    }
  }
}
