//! LoaderPool - fixed-size worker pool for chunk materialization.
//!
//! Materialization is the only blocking step in the crate, so it runs on
//! a dedicated rayon thread pool sized at construction. Completions come
//! back over a crossbeam channel and are drained by the orchestration
//! thread; their order is unspecified.
//!
//! # Cancellation
//!
//! Cancellation is "don't start" granularity only. Each task carries an
//! atomic lifecycle word; `LoadHandle::cancel` succeeds exactly when it
//! wins the `Queued -> Cancelled` transition before a worker has claimed
//! the task. Once a worker is running, cancel returns `false` and the
//! eventual result is discarded by whoever no longer wants it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::LoadError;

use super::request::{ChunkKey, ChunkRequest};

// Task lifecycle states.
const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;
const DONE: u8 = 3;

/// Handle to one submitted task.
pub struct LoadHandle {
  key: ChunkKey,
  state: Arc<AtomicU8>,
}

impl LoadHandle {
  pub fn key(&self) -> &ChunkKey {
    &self.key
  }

  /// Best-effort cancel. Returns `true` only if the task had not started
  /// executing; a `Cancelled` completion is still delivered for it.
  pub fn cancel(&self) -> bool {
    self
      .state
      .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// True once the task finished, failed or was cancelled.
  pub fn is_settled(&self) -> bool {
    matches!(self.state.load(Ordering::Acquire), CANCELLED | DONE)
  }
}

/// Exactly one completion is delivered per submitted task.
pub enum Completion {
  /// The request loaded; its payload and timing fields are filled in.
  Loaded(ChunkRequest),
  /// Materialization failed.
  Failed { key: ChunkKey, error: LoadError },
  /// The task was cancelled before a worker picked it up.
  Cancelled { key: ChunkKey },
}

impl Completion {
  pub fn key(&self) -> &ChunkKey {
    match self {
      Completion::Loaded(request) => &request.key,
      Completion::Failed { key, .. } => key,
      Completion::Cancelled { key } => key,
    }
  }
}

/// Fixed-size worker pool executing chunk materialization off the
/// orchestration thread.
pub struct LoaderPool {
  pool: rayon::ThreadPool,
  tx: Sender<Completion>,
  rx: Receiver<Completion>,
  num_workers: usize,
}

impl LoaderPool {
  pub fn new(num_workers: usize) -> Result<Self, LoadError> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(num_workers)
      .thread_name(|index| format!("chunk-loader-{index}"))
      .build()
      .map_err(|e| LoadError::Pool(e.to_string()))?;
    let (tx, rx) = unbounded();
    debug!(num_workers, "loader pool started");
    Ok(Self {
      pool,
      tx,
      rx,
      num_workers,
    })
  }

  /// Queue a request. With all workers busy the task waits; at most
  /// `num_workers` materializations run concurrently.
  pub fn submit(&self, mut request: ChunkRequest) -> LoadHandle {
    let state = Arc::new(AtomicU8::new(QUEUED));
    let handle = LoadHandle {
      key: request.key.clone(),
      state: Arc::clone(&state),
    };
    let tx = self.tx.clone();

    self.pool.spawn(move || {
      if state
        .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
      {
        // Lost the race to cancel(); never started.
        let _ = tx.send(Completion::Cancelled {
          key: request.key.clone(),
        });
        return;
      }

      let completion = match request.load() {
        Ok(_) => Completion::Loaded(request),
        Err(error) => Completion::Failed {
          key: request.key.clone(),
          error,
        },
      };
      state.store(DONE, Ordering::Release);
      // A send error means the pool is shutting down and nobody is
      // listening; the result is simply dropped.
      let _ = tx.send(completion);
    });

    handle
  }

  /// Non-blocking poll for one completion.
  pub fn try_recv(&self) -> Option<Completion> {
    self.rx.try_recv().ok()
  }

  /// Cloneable receiver end of the completion channel, for callers that
  /// want to block with a timeout.
  pub fn completions(&self) -> Receiver<Completion> {
    self.rx.clone()
  }

  pub fn num_workers(&self) -> usize {
    self.num_workers
  }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
