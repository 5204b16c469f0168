// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The Node built-in module table consulted by the Output Rewriter's
//! sentinel-resolution precedence (spec §4.5a, steps 3-4): which
//! specifiers are recognised runtime built-ins, how they map onto a
//! `deno` target's `std` shims, and which ones fall back to a bundled
//! polyfill package versus the synthetic "unsupported" error URL.

/// Node built-in module names the engine recognises (unprefixed; the
/// `node:` prefix is stripped by the Externalising Resolver before this
/// table is ever consulted).
pub const NODE_BUILTINS: &[&str] = &[
  "assert",
  "buffer",
  "child_process",
  "cluster",
  "console",
  "constants",
  "crypto",
  "dgram",
  "dns",
  "domain",
  "events",
  "fs",
  "http",
  "https",
  "net",
  "os",
  "path",
  "perf_hooks",
  "process",
  "punycode",
  "querystring",
  "readline",
  "repl",
  "stream",
  "string_decoder",
  "timers",
  "tls",
  "tty",
  "url",
  "util",
  "v8",
  "vm",
  "worker_threads",
  "zlib",
];

pub fn is_node_builtin(name: &str) -> bool {
  NODE_BUILTINS.contains(&name)
}

/// The `deno.land/std` version the Rewriter targets for `target=deno`
/// built-in rewrites (spec §4.5a step 4).
pub const DENO_STD_VERSION: &str = "0.177.0";

/// Built-ins with a `https://deno.land/std@<v>/node/<name>.ts` shim.
/// Not every Node built-in has one; the ones Deno's `std/node` compat
/// layer ships are listed here.
const DENO_STD_SHIMMED: &[&str] = &[
  "assert", "buffer", "child_process", "constants", "crypto", "dgram", "dns", "events", "fs",
  "http", "https", "net", "os", "path", "perf_hooks", "process", "punycode", "querystring",
  "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "zlib",
];

pub fn deno_std_url(name: &str) -> Option<String> {
  if DENO_STD_SHIMMED.contains(&name) {
    Some(format!(
      "https://deno.land/std@{DENO_STD_VERSION}/node/{name}.ts"
    ))
  } else {
    None
  }
}

/// Browser-polyfill npm packages for built-ins Deno's `std/node` doesn't
/// cover (or for non-`deno` non-`node` targets, which never consult
/// `deno_std_url` at all): rebuilt as a bundled sub-artifact through the
/// ordinary recursive build path, per spec §4.5a step 4's "polyfill
/// package (rebuilt as a bundled sub-artifact)" fallback.
pub fn polyfill_package(name: &str) -> Option<(&'static str, &'static str)> {
  match name {
    "path" => Some(("path-browserify", "1.0.1")),
    "util" => Some(("util", "0.12.5")),
    "events" => Some(("events", "3.3.0")),
    "stream" => Some(("stream-browserify", "3.0.0")),
    "crypto" => Some(("crypto-browserify", "3.12.0")),
    "os" => Some(("os-browserify", "0.3.0")),
    "assert" => Some(("assert", "2.0.0")),
    "querystring" => Some(("querystring-es3", "0.2.1")),
    "url" => Some(("url", "0.11.0")),
    "string_decoder" => Some(("string_decoder", "1.3.0")),
    "punycode" => Some(("punycode", "2.1.1")),
    "zlib" => Some(("browserify-zlib", "0.2.0")),
    "tty" => Some(("tty-browserify", "0.0.1")),
    "constants" => Some(("constants-browserify", "1.0.0")),
    "timers" => Some(("timers-browserify", "2.0.12")),
    "domain" => Some(("domain-browser", "4.22.0")),
    _ => None,
  }
}

/// Built-ins served directly from an embedded
/// `server/embed/polyfills/node_<name>.js` asset rather than rebuilt
/// from a registry package (spec §6 Polyfill assets) — for built-ins
/// with no `deno_std_url` shim and no `polyfill_package` npm
/// equivalent. `buffer` is excluded: the core's control flow
/// special-cases it by name before this table is ever consulted (spec
/// §4.5a step 3).
const EMBEDDED_POLYFILLS: &[&str] = &["console", "process"];

/// The embedded-polyfill-asset path for built-ins served directly from
/// `server/embed/polyfills/node_<name>.js` (spec §4.5a step 4's
/// "embedded polyfill asset" tier, consulted after [`polyfill_package`]
/// misses and before [`unsupported_builtin_error_url`]).
pub fn embedded_polyfill_asset(name: &str) -> Option<String> {
  if EMBEDDED_POLYFILLS.contains(&name) {
    Some(format!("server/embed/polyfills/node_{name}.js"))
  } else {
    None
  }
}

/// The synthetic error URL embedded for a built-in the engine cannot
/// resolve by any other means (spec §4.5a step 8 analogue for built-ins,
/// §7 "synthetic error URLs used for unresolvable runtime built-ins").
pub fn unsupported_builtin_error_url(name: &str, importer: &str) -> String {
  format!("/error.js?type=unsupported-nodejs-builtin-module&name={name}&importer={importer}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognises_known_builtins() {
    assert!(is_node_builtin("fs"));
    assert!(is_node_builtin("buffer"));
    assert!(!is_node_builtin("react"));
  }

  #[test]
  fn deno_std_url_shape() {
    assert_eq!(
      deno_std_url("fs").unwrap(),
      "https://deno.land/std@0.177.0/node/fs.ts"
    );
  }

  #[test]
  fn unshimmed_builtin_has_no_deno_url() {
    assert_eq!(deno_std_url("worker_threads"), None);
  }

  #[test]
  fn polyfill_package_lookup() {
    assert_eq!(polyfill_package("path"), Some(("path-browserify", "1.0.1")));
    assert_eq!(polyfill_package("worker_threads"), None);
  }

  #[test]
  fn embedded_polyfill_asset_lookup() {
    assert_eq!(
      embedded_polyfill_asset("process"),
      Some("server/embed/polyfills/node_process.js".to_string())
    );
    assert_eq!(embedded_polyfill_asset("worker_threads"), None);
  }

  #[test]
  fn error_url_shape() {
    assert_eq!(
      unsupported_builtin_error_url("worker_threads", "some-pkg"),
      "/error.js?type=unsupported-nodejs-builtin-module&name=worker_threads&importer=some-pkg"
    );
  }
}
