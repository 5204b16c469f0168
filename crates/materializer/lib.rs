// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The Package Materialiser: a thin wrapper around an external
//! registry-client command that, given a working directory and one or
//! more `name@version` specs, populates `./node_modules/<name>/...`.
//!
//! The materialiser treats the command as a black box — it never parses
//! the registry's own output, only the process exit status.

use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
  #[error("failed to spawn materialiser command {command:?}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },
  #[error("materialiser command {command:?} exited with {status}: {stderr}")]
  NonZeroExit {
    command: String,
    status: std::process::ExitStatus,
    stderr: String,
  },
}

/// Wraps an external package-fetch command (e.g. a vendored `npm`-alike)
/// that supports `add <spec>...` in a given working directory.
#[derive(Debug, Clone)]
pub struct PackageMaterializer {
  command: PathBuf,
}

impl PackageMaterializer {
  pub fn new(command: impl Into<PathBuf>) -> Self {
    Self {
      command: command.into(),
    }
  }

  /// Populates `<wd>/node_modules/<name>/...` for every `name@version` in
  /// `specs`. Failure (non-zero exit) is fatal for the caller's request;
  /// stdout/stderr are captured only to surface in the error.
  pub async fn materialize(
    &self,
    wd: &Path,
    specs: &[String],
  ) -> Result<(), MaterializeError> {
    log::debug!("materializing {:?} in {}", specs, wd.display());
    let output = Command::new(&self.command)
      .arg("add")
      .args(specs)
      .current_dir(wd)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .output()
      .await
      .map_err(|source| MaterializeError::Spawn {
        command: self.command.display().to_string(),
        source,
      })?;

    if !output.status.success() {
      return Err(MaterializeError::NonZeroExit {
        command: self.command.display().to_string(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      });
    }
    Ok(())
  }

  /// Convenience for the common single-package case.
  pub async fn materialize_one(
    &self,
    wd: &Path,
    name_at_version: impl Into<String>,
  ) -> Result<(), MaterializeError> {
    self.materialize(wd, &[name_at_version.into()]).await
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  /// A stand-in "materialiser" used only to exercise the success path: a
  /// shell one-liner that creates the expected node_modules layout.
  fn fake_materializer_script(dir: &Path) -> PathBuf {
    let script = dir.join("fake-add.sh");
    std::fs::write(
      &script,
      "#!/bin/sh\nshift\nfor spec in \"$@\"; do\n  name=$(echo \"$spec\" | cut -d@ -f1)\n  mkdir -p node_modules/\"$name\"\n  echo '{}' > node_modules/\"$name\"/package.json\ndone\n",
    )
    .unwrap();
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    script
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn materialize_populates_node_modules() {
    let dir = TempDir::new().unwrap();
    let script = fake_materializer_script(dir.path());
    let materializer = PackageMaterializer::new(script);
    materializer
      .materialize_one(dir.path(), "react@17.0.2")
      .await
      .unwrap();
    assert!(dir.path().join("node_modules/react/package.json").exists());
  }

  #[tokio::test]
  async fn nonzero_exit_is_fatal() {
    let dir = TempDir::new().unwrap();
    let materializer = PackageMaterializer::new("false");
    let err = materializer
      .materialize_one(dir.path(), "react@17.0.2")
      .await
      .unwrap_err();
    assert!(matches!(err, MaterializeError::NonZeroExit { .. }));
  }
}
