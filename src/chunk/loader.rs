//! ChunkLoader - the coordination point between "I need chunk X" and
//! "chunk X is in memory".
//!
//! A load is satisfied synchronously when the data is already resident,
//! already cached, or the effective policy is synchronous; everything
//! else goes to the worker pool and resolves later through
//! [`ChunkLoader::drain_outcomes`], which the orchestration thread calls
//! once per tick. The loader owns the cache, the per-layer registration
//! table and the in-flight map, and nothing else ever touches them, so
//! no locks are needed outside the pool's completion channel.
//!
//! De-duplication is per key: a second miss for a key already in flight
//! joins the existing task. Single-scale slice loads additionally
//! supersede other pending loads for their layer, since slices the view
//! has moved past are pure waste.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use web_time::Instant;

use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::tile::TilePayload;

use super::cache::ChunkCache;
use super::delay_queue::DelayQueue;
use super::pool::{Completion, LoadHandle, LoaderPool};
use super::request::{ChunkKey, ChunkRequest, LayerId};
use super::stats::LoadStats;

/// Per-layer load policy.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoadType {
  /// Synchronous when the data is resident or recent loads were fast,
  /// asynchronous otherwise.
  Auto,
  /// Always load synchronously.
  Sync,
  /// Always load asynchronously (unless the data is resident or the
  /// global synchronous flag is set).
  Async,
}

/// Registration entry for one layer.
struct LayerInfo {
  load_type: LoadType,
  stats: LoadStats,
}

impl LayerInfo {
  fn new() -> Self {
    Self {
      load_type: LoadType::Auto,
      stats: LoadStats::new(),
    }
  }
}

/// Result of a `load` call.
pub enum LoadResult {
  /// The payload is in memory now; no notification will follow.
  Satisfied(Arc<TilePayload>),
  /// A load is in flight; an outcome will surface from
  /// `drain_outcomes` later.
  Pending,
  /// A synchronous load failed. The chunk stays loadable; retrying is
  /// up to the caller's next tick.
  Failed(LoadError),
}

/// Notification that an async load completed and was cached.
pub struct ChunkLoadedEvent {
  pub layer_id: LayerId,
  pub request: ChunkRequest,
}

/// Everything `drain_outcomes` can surface for one finished task.
pub enum LoadOutcome {
  Loaded(ChunkLoadedEvent),
  Failed { key: ChunkKey, error: LoadError },
  Cancelled { key: ChunkKey },
}

impl LoadOutcome {
  pub fn key(&self) -> &ChunkKey {
    match self {
      LoadOutcome::Loaded(event) => &event.request.key,
      LoadOutcome::Failed { key, .. } => key,
      LoadOutcome::Cancelled { key } => key,
    }
  }
}

enum PendingLoad {
  /// Still sitting in the delay queue.
  Delayed,
  /// Submitted to the worker pool.
  Submitted(LoadHandle),
}

/// Loads chunks synchronously or through the worker pool.
///
/// One instance is expected per process so the cache budget is bounded
/// globally, but nothing prevents independent instances in tests. Shut
/// down by dropping; the pool joins its workers once running tasks
/// finish.
pub struct ChunkLoader {
  config: LoaderConfig,
  cache: ChunkCache,
  layers: HashMap<LayerId, LayerInfo>,
  pool: LoaderPool,
  delay_queue: DelayQueue,
  pending: HashMap<ChunkKey, PendingLoad>,
}

impl ChunkLoader {
  pub fn new(config: LoaderConfig) -> Result<Self, LoadError> {
    let pool = LoaderPool::new(config.effective_workers())?;
    let cache = match config.cache_capacity_bytes {
      Some(bytes) => ChunkCache::new(bytes),
      None => ChunkCache::with_mem_fraction(config.cache_mem_fraction),
    };
    let delay_queue = DelayQueue::new(Duration::from_millis(config.delay_ms));
    Ok(Self {
      config,
      cache,
      layers: HashMap::new(),
      pool,
      delay_queue,
      pending: HashMap::new(),
    })
  }

  pub fn with_defaults() -> Result<Self, LoadError> {
    Self::new(LoaderConfig::default())
  }

  pub fn config(&self) -> &LoaderConfig {
    &self.config
  }

  pub fn cache(&self) -> &ChunkCache {
    &self.cache
  }

  pub fn cache_mut(&mut self) -> &mut ChunkCache {
    &mut self.cache
  }

  /// Number of loads currently delayed or in flight.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  pub fn is_idle(&self) -> bool {
    self.pending.is_empty()
  }

  // ===========================================================================
  // Layer registry
  // ===========================================================================

  /// Start tracking a layer. Idempotent; existing stats are kept.
  pub fn register_layer(&mut self, layer_id: LayerId) {
    self.layers.entry(layer_id).or_insert_with(LayerInfo::new);
  }

  pub fn is_registered(&self, layer_id: LayerId) -> bool {
    self.layers.contains_key(&layer_id)
  }

  pub fn set_load_type(&mut self, layer_id: LayerId, load_type: LoadType) {
    if let Some(info) = self.layers.get_mut(&layer_id) {
      info.load_type = load_type;
    }
  }

  pub fn layer_stats(&self, layer_id: LayerId) -> Option<&LoadStats> {
    self.layers.get(&layer_id).map(|info| &info.stats)
  }

  /// Stop tracking a layer. In-flight work for it is cancelled where
  /// possible; results that still arrive are dropped by the liveness
  /// check in `drain_outcomes`.
  pub fn unregister_layer(&mut self, layer_id: LayerId) {
    self.cancel_layer(layer_id);
    if self.layers.remove(&layer_id).is_some() {
      debug!(?layer_id, "layer unregistered");
    }
  }

  // ===========================================================================
  // Loading
  // ===========================================================================

  /// Load the given request, synchronously if possible.
  pub fn load(&mut self, request: ChunkRequest) -> LoadResult {
    let key = request.key.clone();

    let Some(info) = self.layers.get(&key.layer_id) else {
      warn!(?key, "load for unregistered layer");
      return LoadResult::Failed(LoadError::LayerGone(key.layer_id));
    };
    let load_type = info.load_type;
    let loads_fast = info.stats.loads_fast(self.config.auto_sync_ms);

    // Resident data never takes the worker-pool detour.
    if request.in_memory() {
      return self.load_sync(request, true);
    }

    if let Some(payload) = self.cache.get(&key) {
      debug!(?key, "cache hit");
      return LoadResult::Satisfied(payload);
    }

    let sync = self.config.synchronous
      || match load_type {
        LoadType::Sync => true,
        LoadType::Async => false,
        LoadType::Auto => loads_fast,
      };
    if sync {
      return self.load_sync(request, false);
    }

    // Per-key single flight: a second miss for the same key joins the
    // task already in flight.
    if self.pending.contains_key(&key) {
      debug!(?key, "joining in-flight load");
      return LoadResult::Pending;
    }

    // Slice loads (no octree location) supersede other pending loads
    // for the same layer, generally slices the view has moved past.
    if key.location.is_none() {
      let cleared = self.cancel_layer_except(key.layer_id, &key);
      if cleared > 0 {
        debug!(?key, cleared, "superseded pending loads for layer");
      }
    }

    if self.delay_queue.delay() > Duration::ZERO {
      self.delay_queue.add(request, Instant::now());
      self.pending.insert(key, PendingLoad::Delayed);
    } else {
      let handle = self.pool.submit(request);
      self.pending.insert(key, PendingLoad::Submitted(handle));
    }
    LoadResult::Pending
  }

  /// Best-effort cancel of a pending load. Returns `true` if the task
  /// will never run; `false` if it already started (or was unknown), in
  /// which case its result shows up in `drain_outcomes` as usual.
  pub fn cancel(&mut self, key: &ChunkKey) -> bool {
    match self.pending.remove(key) {
      Some(PendingLoad::Delayed) => {
        self.delay_queue.cancel_key(key);
        debug!(?key, "cancelled delayed load");
        true
      }
      Some(PendingLoad::Submitted(handle)) => {
        if handle.cancel() {
          debug!(?key, "cancelled queued load");
          true
        } else {
          // Worker already started; keep tracking the task so its
          // completion is processed normally.
          self.pending.insert(key.clone(), PendingLoad::Submitted(handle));
          false
        }
      }
      None => false,
    }
  }

  /// Cancel every pending load for a layer. Returns how many were
  /// stopped before starting.
  pub fn cancel_layer(&mut self, layer_id: LayerId) -> usize {
    let keys: Vec<ChunkKey> = self
      .pending
      .keys()
      .filter(|key| key.layer_id == layer_id)
      .cloned()
      .collect();
    keys.iter().filter(|key| self.cancel(key)).count()
  }

  fn cancel_layer_except(&mut self, layer_id: LayerId, keep: &ChunkKey) -> usize {
    let keys: Vec<ChunkKey> = self
      .pending
      .keys()
      .filter(|key| key.layer_id == layer_id && *key != keep)
      .cloned()
      .collect();
    keys.iter().filter(|key| self.cancel(key)).count()
  }

  // ===========================================================================
  // Completion draining
  // ===========================================================================

  /// Drain due delayed submissions and finished completions.
  ///
  /// Call once per tick from the orchestration thread. This is the only
  /// place async results mutate the cache, which keeps the shared state
  /// single-writer.
  pub fn drain_outcomes(&mut self) -> Vec<LoadOutcome> {
    let mut outcomes = Vec::new();
    self.pump_delay_queue(Instant::now());
    while let Some(completion) = self.pool.try_recv() {
      self.process_completion(completion, &mut outcomes);
    }
    outcomes
  }

  /// Block until no loads are pending or the timeout elapses, returning
  /// every outcome produced along the way. Intended for tests and
  /// shutdown draining.
  pub fn wait_until_idle(&mut self, timeout: Duration) -> Vec<LoadOutcome> {
    let deadline = Instant::now() + timeout;
    let mut outcomes = self.drain_outcomes();
    let completions = self.pool.completions();

    while !self.pending.is_empty() {
      let now = Instant::now();
      if now >= deadline {
        warn!(pending = self.pending.len(), "wait_until_idle timed out");
        break;
      }
      // Delayed entries only become due with time, so cap the block.
      let wait = (deadline - now).min(Duration::from_millis(10));
      if let Ok(completion) = completions.recv_timeout(wait) {
        self.process_completion(completion, &mut outcomes);
      }
      self.pump_delay_queue(Instant::now());
    }
    outcomes
  }

  fn pump_delay_queue(&mut self, now: Instant) {
    for request in self.delay_queue.drain_due(now) {
      let key = request.key.clone();
      // Entries cancelled while delayed were already dropped from both
      // structures; only still-wanted ones reach the pool.
      if matches!(self.pending.get(&key), Some(PendingLoad::Delayed)) {
        let handle = self.pool.submit(request);
        self.pending.insert(key, PendingLoad::Submitted(handle));
      }
    }
  }

  fn process_completion(&mut self, completion: Completion, outcomes: &mut Vec<LoadOutcome>) {
    match completion {
      Completion::Loaded(request) => {
        let key = request.key.clone();
        self.pending.remove(&key);
        if let Some(payload) = request.payload() {
          self.cache.put(key.clone(), Arc::clone(payload));
        }
        let Some(info) = self.layers.get_mut(&key.layer_id) else {
          debug!(?key, "dropping result for dead layer");
          return;
        };
        info
          .stats
          .on_load_finished(request.load_ms().unwrap_or(0.0), false);
        debug!(?key, "chunk loaded");
        outcomes.push(LoadOutcome::Loaded(ChunkLoadedEvent {
          layer_id: key.layer_id,
          request,
        }));
      }
      Completion::Failed { key, error } => {
        self.pending.remove(&key);
        warn!(?key, %error, "async load failed");
        outcomes.push(LoadOutcome::Failed { key, error });
      }
      Completion::Cancelled { key } => {
        self.pending.remove(&key);
        debug!(?key, "load cancelled before start");
        outcomes.push(LoadOutcome::Cancelled { key });
      }
    }
  }

  fn load_sync(&mut self, mut request: ChunkRequest, resident: bool) -> LoadResult {
    let key = request.key.clone();
    match request.load() {
      Ok(payload) => {
        if !resident {
          // Materialized lazy data is worth caching; already-resident
          // data is not, it would only duplicate memory.
          self.cache.put(key.clone(), Arc::clone(&payload));
        }
        let load_ms = request.load_ms().unwrap_or(0.0);
        if let Some(info) = self.layers.get_mut(&key.layer_id) {
          info.stats.on_load_finished(load_ms, true);
        }
        debug!(?key, load_ms, "loaded synchronously");
        LoadResult::Satisfied(payload)
      }
      Err(error) => {
        warn!(?key, %error, "synchronous load failed");
        LoadResult::Failed(error)
      }
    }
  }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod loader_test;
