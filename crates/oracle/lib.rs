// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Client for the CJS Export Oracle: a single long-lived child process
//! hosting a registry of named "services" over a line-framed JSON RPC.
//! The only service the Build Engine needs is `parseCJSModuleExports`,
//! which enumerates the named exports of a CommonJS entry.

mod process;

pub use process::OracleProcess;
pub use process::SpawnError;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub const PARSE_CJS_MODULE_EXPORTS: &str = "parseCJSModuleExports";

#[derive(Debug, Clone, Serialize)]
pub struct ParseCjsModuleExportsInput {
  pub wd: String,
  #[serde(rename = "importPath")]
  pub import_path: String,
  #[serde(rename = "nodeEnv")]
  pub node_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParseCjsModuleExportsOutput {
  #[serde(default)]
  pub exports: Vec<String>,
  #[serde(default)]
  pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
  #[error("oracle call timed out")]
  Timeout,
  #[error("oracle child process exited: {stderr}")]
  ChildExited { stderr: String },
  #[error("oracle returned malformed response: {0}")]
  MalformedResponse(#[from] serde_json::Error),
  #[error("oracle reported an error: {0}")]
  Reported(String),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// The interface the Entry Resolver consults; kept as a trait so tests
/// can substitute a fake oracle without spawning a child process.
#[async_trait]
pub trait CjsExportOracle: Send + Sync {
  async fn parse_cjs_module_exports(
    &self,
    wd: &str,
    import_path: &str,
    node_env: &str,
    timeout: Duration,
  ) -> Result<ParseCjsModuleExportsOutput, OracleError>;
}

#[async_trait]
impl CjsExportOracle for OracleProcess {
  async fn parse_cjs_module_exports(
    &self,
    wd: &str,
    import_path: &str,
    node_env: &str,
    timeout: Duration,
  ) -> Result<ParseCjsModuleExportsOutput, OracleError> {
    let input = ParseCjsModuleExportsInput {
      wd: wd.to_string(),
      import_path: import_path.to_string(),
      node_env: node_env.to_string(),
    };
    let value = self
      .invoke(PARSE_CJS_MODULE_EXPORTS, serde_json::to_value(input)?, timeout)
      .await?;
    let output: ParseCjsModuleExportsOutput = serde_json::from_value(value)?;
    if let Some(err) = &output.error {
      return Err(OracleError::Reported(err.clone()));
    }
    Ok(output)
  }
}
