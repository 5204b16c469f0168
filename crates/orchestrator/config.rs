// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Engine-wide tunables: the scratch filesystem root, the CJS Export
//! Oracle's per-call timeout, and the subtask queue's capacity/worker
//! count (spec §5's "bounded" queue and single-dispatcher oracle
//! channel, lifted here into an explicitly-owned handle rather than
//! implicit globals — see spec §9 "Global mutable state").

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Parent directory under which per-request [`crate::ScratchDir`]s are
  /// created.
  pub scratch_root: PathBuf,
  /// Timeout applied to every CJS Export Oracle call.
  pub oracle_timeout: Duration,
  /// Bounded capacity of the cross-package subtask queue.
  pub subtask_queue_capacity: usize,
  /// Number of builder workers draining the subtask queue.
  pub subtask_workers: usize,
  /// Hard cap on bundler retry-loop iterations (spec §9 "hard iteration
  /// cap"), guarding against a pathological error-classifier cycle.
  pub max_bundle_retries: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      scratch_root: std::env::temp_dir().join("esm-build"),
      oracle_timeout: Duration::from_secs(10),
      subtask_queue_capacity: 1024,
      subtask_workers: 8,
      max_bundle_retries: 8,
    }
  }
}
