//! OctreeChunk - one node of the pyramid with its load lifecycle.
//!
//! The lifecycle is a single tagged state, not independent booleans, so
//! "in memory while loading" and "has data while not loaded" cannot be
//! represented at all. Failure has no terminal state: a failed or
//! cancelled load reverts to `NotLoaded` and the node is eligible for
//! re-selection on the next tick.

use std::sync::Arc;

use crate::tile::{TilePayload, TileRef};

use super::location::OctreeLocation;

/// Load lifecycle of a node.
///
/// `NotLoaded -> Loading -> InMemory`, with `Loading -> NotLoaded` when
/// a load is cancelled or fails.
#[derive(Clone, Debug, Default)]
pub enum ChunkState {
  #[default]
  NotLoaded,
  Loading,
  InMemory(Arc<TilePayload>),
}

/// One node in the octree: an address, the source reference used to
/// materialize it, and its lifecycle state.
///
/// Nodes are created lazily by their owning level and live until the
/// whole tree is dropped.
#[derive(Debug)]
pub struct OctreeChunk {
  location: OctreeLocation,
  source: TileRef,
  state: ChunkState,
}

impl OctreeChunk {
  pub fn new(location: OctreeLocation, source: TileRef) -> Self {
    Self {
      location,
      source,
      state: ChunkState::NotLoaded,
    }
  }

  #[inline]
  pub fn location(&self) -> OctreeLocation {
    self.location
  }

  #[inline]
  pub fn source(&self) -> &TileRef {
    &self.source
  }

  #[inline]
  pub fn state(&self) -> &ChunkState {
    &self.state
  }

  #[inline]
  pub fn in_memory(&self) -> bool {
    matches!(self.state, ChunkState::InMemory(_))
  }

  #[inline]
  pub fn loading(&self) -> bool {
    matches!(self.state, ChunkState::Loading)
  }

  /// True when a load should be initiated: no data and none in flight.
  #[inline]
  pub fn needs_load(&self) -> bool {
    matches!(self.state, ChunkState::NotLoaded)
  }

  /// The resident payload, if any.
  pub fn payload(&self) -> Option<&Arc<TilePayload>> {
    match &self.state {
      ChunkState::InMemory(payload) => Some(payload),
      _ => None,
    }
  }

  /// `NotLoaded -> Loading`. Guards against double submission: marking
  /// an already loading or loaded node is a no-op.
  pub fn mark_loading(&mut self) {
    if matches!(self.state, ChunkState::NotLoaded) {
      self.state = ChunkState::Loading;
    }
  }

  /// Store loaded data: `-> InMemory`. Valid from `Loading` (the async
  /// completion) and from `NotLoaded` (a synchronous load).
  pub fn set_payload(&mut self, payload: Arc<TilePayload>) {
    self.state = ChunkState::InMemory(payload);
  }

  /// `Loading -> NotLoaded`, for cancelled or failed loads. A no-op in
  /// any other state, so data never gets thrown away by a late cancel.
  pub fn clear_loading(&mut self) {
    if matches!(self.state, ChunkState::Loading) {
      self.state = ChunkState::NotLoaded;
    }
  }
}

#[cfg(test)]
#[path = "chunk_test.rs"]
mod chunk_test;
