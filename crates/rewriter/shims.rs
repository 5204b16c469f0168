// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Runtime shims prepended to non-`node`-target artifacts for whichever
//! of the `define`d runtime-builtin aliases actually appear in the
//! bundler's output (spec §4.5c).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeBuiltin {
  Process,
  Buffer,
  Global,
  SetImmediate,
  RequireResolve,
}

impl RuntimeBuiltin {
  pub const ALL: &'static [RuntimeBuiltin] = &[
    RuntimeBuiltin::Process,
    RuntimeBuiltin::Buffer,
    RuntimeBuiltin::Global,
    RuntimeBuiltin::SetImmediate,
    RuntimeBuiltin::RequireResolve,
  ];

  pub fn global_name(&self) -> &'static str {
    match self {
      Self::Process => "__Process$",
      Self::Buffer => "__Buffer$",
      Self::Global => "__global$",
      Self::SetImmediate => "__setImmediate$",
      Self::RequireResolve => "__rResolve$",
    }
  }
}

/// The shim source for one builtin. `__Process$.env.NODE_ENV` is pinned
/// to the build's `node_env`; `__Buffer$`'s import points at the
/// polyfill URL for this build's own `build_version`, matching the
/// fingerprint the sentinel-resolution path (spec §4.5a step 3) derives
/// for an explicit `import "buffer"`.
pub fn shim_source(builtin: RuntimeBuiltin, node_env: &str, build_version: u32) -> String {
  match builtin {
    RuntimeBuiltin::Process => format!(
      "const __Process$ = {{ env: {{ NODE_ENV: \"{node_env}\" }}, argv: [], nextTick: (fn, ...a) => setTimeout(() => fn(...a), 0), browser: true, version: \"\", versions: {{}}, platform: \"browser\" }};\n"
    ),
    RuntimeBuiltin::Buffer => format!(
      "import {{ Buffer as __Buffer$ }} from \"/v{build_version}/node_buffer.js\";\n"
    ),
    RuntimeBuiltin::Global => "const __global$ = globalThis;\n".to_string(),
    RuntimeBuiltin::SetImmediate => {
      "const __setImmediate$ = (fn, ...a) => setTimeout(() => fn(...a), 0);\n".to_string()
    }
    RuntimeBuiltin::RequireResolve => {
      "const __rResolve$ = (id) => id;\n".to_string()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn process_shim_pins_node_env() {
    let shim = shim_source(RuntimeBuiltin::Process, "development", 1);
    assert!(shim.contains("NODE_ENV: \"development\""));
  }

  #[test]
  fn buffer_shim_pins_build_version() {
    let shim = shim_source(RuntimeBuiltin::Buffer, "production", 57);
    assert!(shim.contains("/v57/node_buffer.js"));
  }
}
