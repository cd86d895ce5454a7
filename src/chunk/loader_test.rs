use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::chunk::request::SliceIndices;
use crate::octree::location::OctreeLocation;
use crate::tile::{TileFetch, TileRef, TileShape};

struct CountingFetch {
  calls: AtomicUsize,
  sleep: Duration,
  fail: bool,
}

impl CountingFetch {
  fn fast() -> Self {
    Self {
      calls: AtomicUsize::new(0),
      sleep: Duration::ZERO,
      fail: false,
    }
  }

  fn slow(sleep: Duration) -> Self {
    Self {
      calls: AtomicUsize::new(0),
      sleep,
      fail: false,
    }
  }

  fn failing() -> Self {
    Self {
      calls: AtomicUsize::new(0),
      sleep: Duration::ZERO,
      fail: true,
    }
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl TileFetch for CountingFetch {
  fn fetch(&self, location: OctreeLocation) -> Result<TilePayload, LoadError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if !self.sleep.is_zero() {
      std::thread::sleep(self.sleep);
    }
    if self.fail {
      return Err(LoadError::Fetch("simulated".into()));
    }
    Ok(TilePayload::filled(
      TileShape::new(4, 4, 1),
      location.row as f32,
    ))
  }
}

fn test_loader(config: LoaderConfig) -> (ChunkLoader, LayerId) {
  let config = LoaderConfig {
    cache_capacity_bytes: Some(1 << 20),
    ..config
  };
  let mut loader = ChunkLoader::new(config).unwrap();
  let layer = LayerId::new();
  loader.register_layer(layer);
  (loader, layer)
}

fn lazy_request(layer: LayerId, fetch: &Arc<CountingFetch>, row: u32) -> ChunkRequest {
  let location = OctreeLocation::new(0, row, 0);
  ChunkRequest::new(
    ChunkKey::octree(layer, location),
    TileRef::Lazy(Arc::clone(fetch) as Arc<dyn TileFetch>, location),
  )
}

fn slice_request(layer: LayerId, fetch: &Arc<CountingFetch>, index: i64) -> ChunkRequest {
  ChunkRequest::new(
    ChunkKey::slice(layer, 0, SliceIndices::from_points(&[index])),
    TileRef::Lazy(
      Arc::clone(fetch) as Arc<dyn TileFetch>,
      OctreeLocation::new(0, index as u32, 0),
    ),
  )
}

fn loaded_keys(outcomes: &[LoadOutcome]) -> Vec<ChunkKey> {
  outcomes
    .iter()
    .filter_map(|outcome| match outcome {
      LoadOutcome::Loaded(event) => Some(event.request.key.clone()),
      _ => None,
    })
    .collect()
}

#[test]
fn test_unregistered_layer_fails() {
  let (mut loader, _layer) = test_loader(LoaderConfig::default());
  let stranger = LayerId::new();
  let fetch = Arc::new(CountingFetch::fast());

  match loader.load(lazy_request(stranger, &fetch, 0)) {
    LoadResult::Failed(LoadError::LayerGone(id)) => assert_eq!(id, stranger),
    _ => panic!("expected LayerGone"),
  }
  assert_eq!(fetch.calls(), 0);
}

#[test]
fn test_in_memory_request_is_satisfied_inline() {
  let (mut loader, layer) = test_loader(LoaderConfig::default());
  let payload = Arc::new(TilePayload::filled(TileShape::new(4, 4, 1), 2.0));
  let key = ChunkKey::octree(layer, OctreeLocation::new(0, 0, 0));
  let request = ChunkRequest::new(key, TileRef::InMemory(Arc::clone(&payload)));

  match loader.load(request) {
    LoadResult::Satisfied(out) => assert!(Arc::ptr_eq(&out, &payload)),
    _ => panic!("expected Satisfied"),
  }

  // Resident data is not duplicated into the cache.
  assert!(loader.cache().is_empty());
  assert_eq!(loader.layer_stats(layer).unwrap().sync_loads(), 1);
}

/// Loading the same key twice where the first load cached the payload
/// returns the identical Arc both times, synchronously.
#[test]
fn test_cache_hit_is_idempotent() {
  let (mut loader, layer) = test_loader(LoaderConfig::default());
  loader.set_load_type(layer, LoadType::Sync);
  let fetch = Arc::new(CountingFetch::fast());

  let first = match loader.load(lazy_request(layer, &fetch, 0)) {
    LoadResult::Satisfied(payload) => payload,
    _ => panic!("expected Satisfied"),
  };
  let second = match loader.load(lazy_request(layer, &fetch, 0)) {
    LoadResult::Satisfied(payload) => payload,
    _ => panic!("expected Satisfied"),
  };

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(fetch.calls(), 1, "second load must come from the cache");
}

#[test]
fn test_global_synchronous_mode_never_pends() {
  let (mut loader, layer) = test_loader(LoaderConfig {
    synchronous: true,
    ..Default::default()
  });
  let fetch = Arc::new(CountingFetch::fast());

  for row in 0..4 {
    match loader.load(lazy_request(layer, &fetch, row)) {
      LoadResult::Satisfied(_) => {}
      _ => panic!("synchronous mode must satisfy inline"),
    }
  }
  assert!(loader.is_idle());
}

#[test]
fn test_async_load_completes_through_drain() {
  let (mut loader, layer) = test_loader(LoaderConfig::default());
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::fast());

  match loader.load(lazy_request(layer, &fetch, 3)) {
    LoadResult::Pending => {}
    _ => panic!("expected Pending"),
  }

  let outcomes = loader.wait_until_idle(Duration::from_secs(5));
  let keys = loaded_keys(&outcomes);
  assert_eq!(keys.len(), 1);
  assert_eq!(keys[0].location, Some(OctreeLocation::new(0, 3, 0)));

  // The payload landed in the cache, so the next load is synchronous.
  match loader.load(lazy_request(layer, &fetch, 3)) {
    LoadResult::Satisfied(payload) => assert_eq!(payload.sample(0, 0, 0), 3.0),
    _ => panic!("expected cached Satisfied"),
  }
  assert_eq!(fetch.calls(), 1);
}

/// A second miss for a key already in flight joins the task instead of
/// duplicating work.
#[test]
fn test_per_key_single_flight() {
  let (mut loader, layer) = test_loader(LoaderConfig::default());
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::slow(Duration::from_millis(50)));

  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  assert_eq!(loader.pending_count(), 1);

  let outcomes = loader.wait_until_idle(Duration::from_secs(5));
  assert_eq!(loaded_keys(&outcomes).len(), 1);
  assert_eq!(fetch.calls(), 1);
}

/// A new slice miss for a layer supersedes that layer's other pending
/// slice loads.
#[test]
fn test_slice_loads_supersede_per_layer() {
  let (mut loader, layer) = test_loader(LoaderConfig {
    delay_ms: 100,
    ..Default::default()
  });
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::fast());

  assert!(matches!(
    loader.load(slice_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  assert!(matches!(
    loader.load(slice_request(layer, &fetch, 1)),
    LoadResult::Pending
  ));

  // The first slice died in the delay queue.
  assert_eq!(loader.pending_count(), 1);

  let outcomes = loader.wait_until_idle(Duration::from_secs(5));
  let keys = loaded_keys(&outcomes);
  assert_eq!(keys.len(), 1);
  assert_eq!(keys[0].indices, SliceIndices::from_points(&[1]));
  assert_eq!(fetch.calls(), 1, "superseded slice must never hit the source");
}

/// Fast layers flip to synchronous loading under the Auto policy.
#[test]
fn test_auto_policy_goes_sync_when_fast() {
  let (mut loader, layer) = test_loader(LoaderConfig {
    auto_sync_ms: 1000.0,
    ..Default::default()
  });
  let fetch = Arc::new(CountingFetch::fast());

  // First load: no stats yet, Auto goes async.
  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  loader.wait_until_idle(Duration::from_secs(5));

  // The rolling average is now far below the threshold.
  match loader.load(lazy_request(layer, &fetch, 1)) {
    LoadResult::Satisfied(_) => {}
    _ => panic!("fast layer should load synchronously"),
  }
}

/// Failures surface as outcomes, are not cached, and the next load
/// retries materialization from scratch.
#[test]
fn test_failure_is_not_cached() {
  let (mut loader, layer) = test_loader(LoaderConfig::default());
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::failing());

  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  let outcomes = loader.wait_until_idle(Duration::from_secs(5));

  assert!(loaded_keys(&outcomes).is_empty());
  assert!(outcomes
    .iter()
    .any(|outcome| matches!(outcome, LoadOutcome::Failed { .. })));
  assert!(loader.cache().is_empty());

  // Retrying hits the source again rather than a cached failure.
  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  loader.wait_until_idle(Duration::from_secs(5));
  assert_eq!(fetch.calls(), 2);
}

/// Results for a layer unregistered mid-flight are dropped silently.
#[test]
fn test_dead_layer_result_dropped() {
  let (mut loader, layer) = test_loader(LoaderConfig::default());
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::slow(Duration::from_millis(50)));

  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));
  // Give the worker a chance to claim the task so the cancel inside
  // unregister_layer cannot stop it.
  std::thread::sleep(Duration::from_millis(10));
  loader.unregister_layer(layer);

  let outcomes = loader.wait_until_idle(Duration::from_secs(5));
  assert!(
    loaded_keys(&outcomes).is_empty(),
    "no notification may fire for a dead layer"
  );
}

#[test]
fn test_delay_queue_defers_submission() {
  let (mut loader, layer) = test_loader(LoaderConfig {
    delay_ms: 80,
    ..Default::default()
  });
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::fast());

  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));

  // Still delayed: nothing has reached a worker.
  assert!(loader.drain_outcomes().is_empty());
  assert_eq!(fetch.calls(), 0);

  let outcomes = loader.wait_until_idle(Duration::from_secs(5));
  assert_eq!(loaded_keys(&outcomes).len(), 1);
  assert_eq!(fetch.calls(), 1);
}

#[test]
fn test_cancel_delayed_load() {
  let (mut loader, layer) = test_loader(LoaderConfig {
    delay_ms: 200,
    ..Default::default()
  });
  loader.set_load_type(layer, LoadType::Async);
  let fetch = Arc::new(CountingFetch::fast());

  let key = ChunkKey::octree(layer, OctreeLocation::new(0, 0, 0));
  assert!(matches!(
    loader.load(lazy_request(layer, &fetch, 0)),
    LoadResult::Pending
  ));

  assert!(loader.cancel(&key));
  assert!(loader.is_idle());
  assert!(!loader.cancel(&key), "double cancel is a no-op");

  let outcomes = loader.wait_until_idle(Duration::from_millis(300));
  assert!(outcomes.is_empty());
  assert_eq!(fetch.calls(), 0);
}
