// Copyright 2018-2026 the esm.sh authors. MIT license.

use indexmap::IndexMap;

/// The non-default bundler options the engine relies on (spec §4.6). A
/// real bundler invocation carries many more defaults unchanged; this
/// struct only models the ones the engine's correctness depends on.
#[derive(Debug, Clone)]
pub struct BundleOptions {
  pub entry_point: String,
  pub platform: Platform,
  pub minify: bool,
  pub write: bool,
  /// `.wasm` -> binary loader, font/image/svg extensions -> data-url
  /// loader. Keyed by file extension without the leading dot.
  pub loaders: IndexMap<String, Loader>,
  /// `process`, `Buffer`, `global`, `setImmediate`, `clearImmediate`,
  /// `require.resolve`, `process.env.NODE_ENV`, `__filename`,
  /// `__dirname` and their `global.*` counterparts, so the output never
  /// contains a bare reference to any runtime built-in.
  pub define: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
  Browser,
  Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
  Binary,
  DataUrl,
}

const FONT_IMAGE_SVG_EXTENSIONS: &[&str] = &[
  "woff", "woff2", "ttf", "eot", "otf", "png", "jpg", "jpeg", "gif", "webp", "svg",
];

impl BundleOptions {
  /// Builds the engine's standard define table and loader map for a
  /// given entry point, target platform, `NODE_ENV` value, and dev/minify
  /// mode.
  pub fn new(entry_point: impl Into<String>, platform: Platform, node_env: &str, dev_mode: bool) -> Self {
    let mut define = IndexMap::new();
    for (key, value) in [
      ("process", "__Process$"),
      ("global.process", "__Process$"),
      ("Buffer", "__Buffer$"),
      ("global.Buffer", "__Buffer$"),
      ("global", "__global$"),
      ("setImmediate", "__setImmediate$"),
      ("global.setImmediate", "__setImmediate$"),
      ("clearImmediate", "clearTimeout"),
      ("global.clearImmediate", "clearTimeout"),
      ("require.resolve", "__rResolve$"),
      ("__filename", "\"/esm.sh/build\""),
      ("__dirname", "\"/esm.sh\""),
    ] {
      define.insert(key.to_string(), value.to_string());
    }
    define.insert(
      "process.env.NODE_ENV".to_string(),
      format!("\"{node_env}\""),
    );

    let mut loaders = IndexMap::new();
    loaders.insert("wasm".to_string(), Loader::Binary);
    for ext in FONT_IMAGE_SVG_EXTENSIONS {
      loaders.insert(ext.to_string(), Loader::DataUrl);
    }

    Self {
      entry_point: entry_point.into(),
      platform,
      minify: !dev_mode,
      write: false,
      loaders,
      define,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn define_table_covers_runtime_builtins() {
    let opts = BundleOptions::new("index.js", Platform::Browser, "production", false);
    assert_eq!(opts.define.get("process").unwrap(), "__Process$");
    assert_eq!(
      opts.define.get("process.env.NODE_ENV").unwrap(),
      "\"production\""
    );
    assert!(opts.minify);
  }

  #[test]
  fn dev_mode_disables_minification() {
    let opts = BundleOptions::new("index.js", Platform::Browser, "development", true);
    assert!(!opts.minify);
  }

  #[test]
  fn wasm_uses_binary_loader_and_svg_uses_data_url() {
    let opts = BundleOptions::new("index.js", Platform::Browser, "production", false);
    assert_eq!(opts.loaders.get("wasm"), Some(&Loader::Binary));
    assert_eq!(opts.loaders.get("svg"), Some(&Loader::DataUrl));
  }
}
