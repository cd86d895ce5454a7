//! Tile payloads and the data-source boundary.
//!
//! A [`TilePayload`] is the materialized unit of image data: a small dense
//! 2D sample buffer. The loader is format-agnostic beyond that; where the
//! samples come from is hidden behind the [`TileFetch`] trait, which the
//! data-source layer implements. Fetching may block on disk or network
//! IO, which is why it only ever runs on worker threads (or inline in
//! synchronous mode).

use std::fmt;
use std::sync::Arc;

use crate::error::LoadError;
use crate::octree::location::OctreeLocation;

/// Dense shape of one tile: rows x cols x channels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TileShape {
  pub rows: usize,
  pub cols: usize,
  pub channels: usize,
}

impl TileShape {
  pub fn new(rows: usize, cols: usize, channels: usize) -> Self {
    Self {
      rows,
      cols,
      channels,
    }
  }

  /// Total number of samples in a tile of this shape.
  #[inline]
  pub fn len(&self) -> usize {
    self.rows * self.cols * self.channels
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// One materialized tile: a dense sample buffer plus its shape.
///
/// Payloads are immutable once created and shared behind `Arc`, so a
/// cache entry and a drawable chunk can hold the same buffer without
/// copying.
#[derive(Clone, PartialEq, Debug)]
pub struct TilePayload {
  shape: TileShape,
  samples: Arc<[f32]>,
}

impl TilePayload {
  /// Create a payload, validating that the buffer matches the shape.
  pub fn new(shape: TileShape, samples: Vec<f32>) -> Result<Self, LoadError> {
    if samples.len() != shape.len() {
      return Err(LoadError::Geometry(format!(
        "expected {} samples for {:?}, got {}",
        shape.len(),
        shape,
        samples.len()
      )));
    }
    Ok(Self {
      shape,
      samples: samples.into(),
    })
  }

  /// Uniform payload, mostly for tests and placeholder tiles.
  pub fn filled(shape: TileShape, value: f32) -> Self {
    Self {
      shape,
      samples: vec![value; shape.len()].into(),
    }
  }

  #[inline]
  pub fn shape(&self) -> TileShape {
    self.shape
  }

  #[inline]
  pub fn samples(&self) -> &[f32] {
    &self.samples
  }

  /// Resident byte size, computed from the live buffer.
  ///
  /// Cache accounting calls this on the stored payload rather than
  /// trusting size metadata captured at insert time.
  #[inline]
  pub fn nbytes(&self) -> usize {
    self.samples.len() * std::mem::size_of::<f32>()
  }

  /// Sample at (row, col, channel). Panics on out-of-bounds in the same
  /// way slice indexing does; callers index within `shape()`.
  #[inline]
  pub fn sample(&self, row: usize, col: usize, channel: usize) -> f32 {
    let s = self.shape;
    self.samples[(row * s.cols + col) * s.channels + channel]
  }

  /// Copy out the rectangle `[row0..row1) x [col0..col1)`, all channels.
  ///
  /// Used to cut tiles out of a full level image. Ranges are clamped to
  /// the payload shape, so edge tiles come out smaller than requested.
  pub fn slice(&self, row0: usize, row1: usize, col0: usize, col1: usize) -> TilePayload {
    let s = self.shape;
    let row1 = row1.min(s.rows);
    let col1 = col1.min(s.cols);
    let row0 = row0.min(row1);
    let col0 = col0.min(col1);

    let shape = TileShape::new(row1 - row0, col1 - col0, s.channels);
    let mut samples = Vec::with_capacity(shape.len());
    for row in row0..row1 {
      let start = (row * s.cols + col0) * s.channels;
      let end = (row * s.cols + col1) * s.channels;
      samples.extend_from_slice(&self.samples[start..end]);
    }

    TilePayload {
      shape,
      samples: samples.into(),
    }
  }
}

/// Materialization boundary supplied by the data-source layer.
///
/// `fetch` may be slow and may fail; failures are caught by the loader
/// and logged, never propagated as panics. Sources that hand out
/// multiple concurrent tiles must be internally synchronized, hence the
/// `Send + Sync` bound.
pub trait TileFetch: Send + Sync {
  /// Produce the tile at `location`. For single-scale sources the level
  /// index is 0 and (row, col) address the slice grid.
  fn fetch(&self, location: OctreeLocation) -> Result<TilePayload, LoadError>;
}

/// What a request loads from: either an already-resident payload or a
/// deferred fetch.
#[derive(Clone)]
pub enum TileRef {
  /// Plain in-memory samples. Loading is a no-op and never touches the
  /// worker pool.
  InMemory(Arc<TilePayload>),
  /// Deferred samples produced by the source's fetch callback.
  Lazy(Arc<dyn TileFetch>, OctreeLocation),
}

impl TileRef {
  #[inline]
  pub fn is_in_memory(&self) -> bool {
    matches!(self, TileRef::InMemory(_))
  }

  /// Turn the reference into concrete samples.
  ///
  /// This is the only potentially blocking operation in the crate.
  pub fn materialize(&self) -> Result<Arc<TilePayload>, LoadError> {
    match self {
      TileRef::InMemory(payload) => Ok(Arc::clone(payload)),
      TileRef::Lazy(source, location) => source.fetch(*location).map(Arc::new),
    }
  }
}

impl fmt::Debug for TileRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TileRef::InMemory(payload) => f
        .debug_tuple("InMemory")
        .field(&payload.shape())
        .finish(),
      TileRef::Lazy(_, location) => f.debug_tuple("Lazy").field(location).finish(),
    }
  }
}

#[cfg(test)]
#[path = "tile_test.rs"]
mod tile_test;
