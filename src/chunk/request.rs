//! ChunkKey and ChunkRequest - the identity and the unit of work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;
use web_time::Instant;

use crate::error::LoadError;
use crate::octree::location::OctreeLocation;
use crate::tile::{TilePayload, TileRef};

/// Atomic counter for generating unique LayerIds.
static LAYER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque, non-owning identity of a data source (a "layer").
///
/// The loader never holds a reference to the layer itself, only this id.
/// Liveness is checked against the loader's registration table when a
/// completion arrives; a dead layer just causes the result to be dropped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LayerId(u64);

impl LayerId {
  /// Generate a new unique LayerId.
  pub fn new() -> Self {
    Self(LAYER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

impl Default for LayerId {
  fn default() -> Self {
    Self::new()
  }
}

/// One dimension of a slice index, made hashable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IndexBound {
  /// A point index into the dimension.
  Point(i64),
  /// A `(start, stop, step)` range; `None` means unbounded.
  Slice {
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
  },
}

/// Hashable index tuple identifying the slice a chunk came from.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct SliceIndices(pub SmallVec<[IndexBound; 4]>);

impl SliceIndices {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn from_points(points: &[i64]) -> Self {
    Self(points.iter().copied().map(IndexBound::Point).collect())
  }
}

/// Identity of a unit of load work: which layer, which slice, and
/// optionally which octree node.
///
/// Used as the cache key and the de-duplication key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ChunkKey {
  pub layer_id: LayerId,
  pub data_level: usize,
  pub indices: SliceIndices,
  pub location: Option<OctreeLocation>,
}

impl ChunkKey {
  /// Key for a single-scale slice load (no octree node).
  pub fn slice(layer_id: LayerId, data_level: usize, indices: SliceIndices) -> Self {
    Self {
      layer_id,
      data_level,
      indices,
      location: None,
    }
  }

  /// Key for one octree node.
  pub fn octree(layer_id: LayerId, location: OctreeLocation) -> Self {
    Self {
      layer_id,
      data_level: location.level_index,
      indices: SliceIndices::empty(),
      location: Some(location),
    }
  }
}

/// A submitted unit of work: key, source reference, timing, and - once
/// loaded - the payload.
///
/// After submission only the executing worker touches the request until
/// its completion message comes back.
pub struct ChunkRequest {
  pub key: ChunkKey,
  source: TileRef,
  delay: Option<Duration>,
  pub started_at: Option<Instant>,
  pub finished_at: Option<Instant>,
  payload: Option<Arc<TilePayload>>,
}

impl ChunkRequest {
  pub fn new(key: ChunkKey, source: TileRef) -> Self {
    Self {
      key,
      source,
      delay: None,
      started_at: None,
      finished_at: None,
      payload: None,
    }
  }

  /// Sleep this long inside `load`, to simulate slow sources in tests.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// True if the source is already resident, meaning `load` will not
  /// block on IO.
  #[inline]
  pub fn in_memory(&self) -> bool {
    self.source.is_in_memory()
  }

  #[inline]
  pub fn source(&self) -> &TileRef {
    &self.source
  }

  /// The loaded payload, once `load` has succeeded.
  #[inline]
  pub fn payload(&self) -> Option<&Arc<TilePayload>> {
    self.payload.as_ref()
  }

  /// Materialize the source into the payload slot, recording timing.
  ///
  /// Runs on a worker thread for async loads, inline for synchronous
  /// ones. On error the payload stays empty and `finished_at` unset.
  pub fn load(&mut self) -> Result<Arc<TilePayload>, LoadError> {
    self.started_at = Some(Instant::now());
    if let Some(delay) = self.delay {
      std::thread::sleep(delay);
    }
    let payload = self.source.materialize()?;
    self.payload = Some(Arc::clone(&payload));
    self.finished_at = Some(Instant::now());
    Ok(payload)
  }

  /// Wall-clock load duration in milliseconds, if the load finished.
  pub fn load_ms(&self) -> Option<f64> {
    let (started, finished) = (self.started_at?, self.finished_at?);
    Some(finished.duration_since(started).as_secs_f64() * 1000.0)
  }
}

#[cfg(test)]
#[path = "request_test.rs"]
mod request_test;
