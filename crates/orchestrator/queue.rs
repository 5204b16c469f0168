// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The process-wide subtask queue (spec §5 "Subtask queue"): cross-
//! package externals are enqueued here rather than awaited, and a fixed
//! pool of builder workers drains it. Submission is non-blocking and
//! unordered; the emitted URL is valid as soon as the queued task
//! completes, with no synchronous wait point from the enqueuing side.

use std::sync::Arc;
use std::sync::Weak;

use esm_fingerprint::BuildRequest;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::Engine;

pub struct SubtaskQueue {
  tx: mpsc::Sender<BuildRequest>,
}

impl SubtaskQueue {
  /// Spawns `workers` builder tasks draining a channel of bounded
  /// `capacity`. `engine` is a [`Weak`] reference so the queue's own
  /// worker tasks don't keep the engine alive past its last strong
  /// handle (and so construction doesn't need the engine to exist yet —
  /// see [`Engine::new`]'s `Arc::new_cyclic`).
  pub fn spawn(engine: Weak<Engine>, capacity: usize, workers: usize) -> Self {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let rx = Arc::new(AsyncMutex::new(rx));
    for worker_id in 0..workers.max(1) {
      let engine = engine.clone();
      let rx = rx.clone();
      tokio::spawn(async move {
        loop {
          let next = { rx.lock().await.recv().await };
          let Some(req) = next else { break };
          let Some(engine) = engine.upgrade() else { break };
          let fingerprint = req.fingerprint();
          if let Err(err) = engine.build(req).await {
            log::warn!("background worker {worker_id} failed building {fingerprint}: {err}");
          }
        }
      });
    }
    Self { tx }
  }

  /// Enqueues a top-level build for a different package. Per spec §5,
  /// this never blocks and never applies backpressure beyond the
  /// queue's bounded capacity: a full queue drops the submission (and
  /// logs it) rather than stalling the caller.
  pub fn enqueue(&self, req: BuildRequest) {
    let fingerprint = req.fingerprint();
    if self.tx.try_send(req).is_err() {
      log::warn!("subtask queue full or closed, dropping background build of {fingerprint}");
    }
  }
}
