// Copyright 2018-2026 the esm.sh authors. MIT license.

use std::process::Stdio;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Notify;

use crate::OracleError;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
  #[error("failed to spawn oracle child process: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("oracle child process did not expose a stdin/stdout pipe")]
  MissingPipe,
}

#[derive(Serialize)]
struct InvokeRecord {
  #[serde(rename = "invokeId")]
  invoke_id: String,
  service: String,
  input: Value,
}

/// 8-hex-char little-endian encoding of a 32-bit invoke-id counter.
fn encode_invoke_id(counter: u32) -> String {
  let bytes = counter.to_le_bytes();
  format!("{:02x}{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2], bytes[3])
}

struct Shared {
  counter: AtomicU32,
  pending: DashMap<String, oneshot::Sender<Value>>,
  ready: Notify,
  is_ready: AtomicBool,
  stdin: AsyncMutex<ChildStdin>,
  stderr_tail: AsyncMutex<String>,
}

/// A handle to the spawned CJS Export Oracle child process.
///
/// `invoke` is safe to call before the child has emitted `READY`: the
/// call blocks until readiness is observed, per the spec's dispatcher
/// queueing behaviour.
pub struct OracleProcess {
  shared: Arc<Shared>,
  // Keeps the child (and its reader/stderr tasks) alive for as long as
  // this handle lives.
  _child: Child,
}

impl OracleProcess {
  /// Spawns `command` and begins reading its stdout for the `READY`
  /// sentinel and framed replies. `services` are the service names the
  /// caller intends to use; per the oracle contract these must already
  /// be materialised in the child's own working directory before this
  /// call (the spec's "Injected service names are materialised ahead of
  /// time" — the caller's responsibility, not this function's).
  pub async fn spawn(command: &str, args: &[String], wd: &std::path::Path) -> Result<Self, SpawnError> {
    let mut child = Command::new(command)
      .args(args)
      .current_dir(wd)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(SpawnError::Spawn)?;

    let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe)?;
    let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe)?;
    let stderr = child.stderr.take().ok_or(SpawnError::MissingPipe)?;

    let shared = Arc::new(Shared {
      counter: AtomicU32::new(0),
      pending: DashMap::new(),
      ready: Notify::new(),
      is_ready: AtomicBool::new(false),
      stdin: AsyncMutex::new(stdin),
      stderr_tail: AsyncMutex::new(String::new()),
    });

    tokio::spawn(read_stdout_loop(shared.clone(), stdout));
    tokio::spawn(read_stderr_loop(shared.clone(), stderr));

    Ok(Self {
      shared,
      _child: child,
    })
  }

  pub async fn invoke(
    &self,
    service: &str,
    input: Value,
    timeout: Duration,
  ) -> Result<Value, OracleError> {
    // Register interest before re-checking the flag, so a `READY` line
    // that arrives between the initial check and the `.await` below
    // can't be missed (`Notify::notify_waiters` only wakes tasks already
    // parked on a `notified()` future, it stores no permit for one
    // created afterwards).
    if !self.shared.is_ready.load(Ordering::Acquire) {
      let notified = self.shared.ready.notified();
      if !self.shared.is_ready.load(Ordering::Acquire) {
        notified.await;
      }
    }

    let invoke_id = encode_invoke_id(self.shared.counter.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = oneshot::channel();
    self.shared.pending.insert(invoke_id.clone(), tx);

    let record = InvokeRecord {
      invoke_id: invoke_id.clone(),
      service: service.to_string(),
      input,
    };
    let mut line = serde_json::to_string(&record)?;
    line.push('\n');

    {
      let mut stdin = self.shared.stdin.lock().await;
      if let Err(err) = stdin.write_all(line.as_bytes()).await {
        self.shared.pending.remove(&invoke_id);
        return Err(err.into());
      }
    }

    match tokio::time::timeout(timeout, rx).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(_)) => {
        // Sender dropped without a reply: child exited mid-flight.
        let stderr = self.shared.stderr_tail.lock().await.clone();
        Err(OracleError::ChildExited { stderr })
      }
      Err(_) => {
        // Timeout: abandon the invoke-id; a late reply is discarded by
        // read_stdout_loop finding no pending entry.
        self.shared.pending.remove(&invoke_id);
        Err(OracleError::Timeout)
      }
    }
  }
}

async fn read_stdout_loop(shared: Arc<Shared>, stdout: tokio::process::ChildStdout) {
  let mut lines = BufReader::new(stdout).lines();
  loop {
    match lines.next_line().await {
      Ok(Some(line)) => {
        if line == "READY" {
          shared.is_ready.store(true, Ordering::Release);
          shared.ready.notify_waiters();
          continue;
        }
        if line.len() < 8 {
          log::warn!("oracle emitted an unframed line: {line:?}");
          continue;
        }
        let (invoke_id, body) = line.split_at(8);
        match serde_json::from_str::<Value>(body) {
          Ok(value) => {
            if let Some((_, sender)) = shared.pending.remove(invoke_id) {
              let _ = sender.send(value);
            }
            // else: orphaned reply after a caller timeout. Dropped.
          }
          Err(err) => log::warn!("oracle emitted malformed JSON for {invoke_id}: {err}"),
        }
      }
      Ok(None) => break,
      Err(err) => {
        log::warn!("oracle stdout read error: {err}");
        break;
      }
    }
  }
}

async fn read_stderr_loop(shared: Arc<Shared>, stderr: tokio::process::ChildStderr) {
  let mut lines = BufReader::new(stderr).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    let mut tail = shared.stderr_tail.lock().await;
    tail.push_str(&line);
    tail.push('\n');
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn invoke_id_is_little_endian_hex() {
    assert_eq!(encode_invoke_id(0), "00000000");
    assert_eq!(encode_invoke_id(1), "01000000");
    assert_eq!(encode_invoke_id(0x0102_0304), "04030201");
  }
}
