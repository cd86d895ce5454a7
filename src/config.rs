//! Loader configuration.
//!
//! Plain struct with defaults, plus environment-variable overrides so an
//! interactive session can flip the loader into synchronous mode or
//! resize the worker pool without a code change:
//!
//! - `CHUNK_LOADER_SYNC=1` forces synchronous loads.
//! - `CHUNK_LOADER_WORKERS=n` sets the worker thread count.
//! - `CHUNK_LOADER_DELAY_MS=n` holds requests in the delay queue for
//!   `n` milliseconds before submission.

use std::env;

/// Cache capacity as a fraction of total system memory.
pub const DEFAULT_CACHE_MEM_FRACTION: f64 = 0.1;

/// Worker threads when no override is given and parallelism cannot be
/// detected.
pub const DEFAULT_NUM_WORKERS: usize = 6;

/// Configuration for [`ChunkLoader`](crate::chunk::loader::ChunkLoader).
#[derive(Clone, Debug)]
pub struct LoaderConfig {
  /// Worker thread count. 0 means derive from available parallelism.
  pub num_workers: usize,

  /// Force every load to run inline on the calling thread. With this
  /// set, `load` never returns `Pending` - useful for debugging and
  /// deterministic tests.
  pub synchronous: bool,

  /// Hold requests in the delay queue this long before submitting to
  /// the pool. Requests still delayed are trivially cancellable; 0
  /// submits straight through.
  pub delay_ms: u64,

  /// Auto-policy layers whose rolling average load time is at or below
  /// this many milliseconds are loaded synchronously.
  pub auto_sync_ms: f64,

  /// Cache capacity as a fraction of total system memory.
  pub cache_mem_fraction: f64,

  /// Explicit cache capacity in bytes; overrides the memory fraction.
  pub cache_capacity_bytes: Option<usize>,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    Self {
      num_workers: DEFAULT_NUM_WORKERS,
      synchronous: false,
      delay_ms: 0,
      auto_sync_ms: 30.0,
      cache_mem_fraction: DEFAULT_CACHE_MEM_FRACTION,
      cache_capacity_bytes: None,
    }
  }
}

impl LoaderConfig {
  /// Defaults with environment overrides applied.
  pub fn from_env() -> Self {
    Self::default().with_overrides(|name| env::var(name).ok())
  }

  /// Worker count to actually build the pool with.
  pub fn effective_workers(&self) -> usize {
    if self.num_workers > 0 {
      return self.num_workers;
    }
    std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(DEFAULT_NUM_WORKERS)
  }

  fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(value) = var("CHUNK_LOADER_SYNC") {
      self.synchronous = value != "0";
    }
    if let Some(workers) = var("CHUNK_LOADER_WORKERS").and_then(|v| v.parse().ok()) {
      self.num_workers = workers;
    }
    if let Some(delay) = var("CHUNK_LOADER_DELAY_MS").and_then(|v| v.parse().ok()) {
      self.delay_ms = delay;
    }
    self
  }
}
