//! Error taxonomy for the loader subsystem.
//!
//! Transient conditions (cache miss, chunk not loaded yet) are modeled as
//! `Option`/state outcomes, not errors. Everything here is a real fault,
//! and every fault degrades to "this chunk is not available yet" at the
//! public API boundary rather than propagating as a panic.

use thiserror::Error;

use crate::chunk::request::LayerId;

/// Faults produced while materializing, submitting or validating chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
  /// The data source failed to produce a tile.
  #[error("tile fetch failed: {0}")]
  Fetch(String),

  /// The owning layer is no longer registered with the loader.
  #[error("layer {0:?} is not registered")]
  LayerGone(LayerId),

  /// Tile or pyramid geometry is inconsistent.
  #[error("bad tile geometry: {0}")]
  Geometry(String),

  /// The worker pool could not be constructed.
  #[error("worker pool unavailable: {0}")]
  Pool(String),
}
