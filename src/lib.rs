//! chunk_loader - GUI/engine independent async chunk loading with
//! octree level-of-detail selection for multiscale images.
//!
//! The crate covers the path from "the camera moved" to "these tiles
//! are in memory, draw them":
//!
//! - **Chunk core**: hashable [`ChunkKey`]s, a byte-bounded LRU
//!   [`ChunkCache`], a fixed-size worker pool with don't-start
//!   cancellation, and the orchestrating [`ChunkLoader`].
//! - **Octree**: a lazy sparse tile pyramid ([`Octree`]) and the
//!   [`OctreeChunkLoader`] selection pass that trades instantaneous
//!   sharpness for responsiveness under camera movement.
//!
//! # Threading
//!
//! One orchestration thread drives everything; workers only materialize
//! tile data and report completions over a channel. Nothing in the
//! public API blocks except [`TileFetch`] implementations themselves
//! (and `ChunkLoader::wait_until_idle`, which exists for tests and
//! shutdown).
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! use chunk_loader::{
//!   glam::DVec2, ChunkLoader, LayerId, LoaderConfig, Octree, OctreeChunkLoader, OctreeConfig,
//!   OctreeView, PyramidSource, TilePayload, TileShape,
//! };
//!
//! let mut loader = ChunkLoader::new(LoaderConfig::from_env()).unwrap();
//! let layer = LayerId::new();
//! loader.register_layer(layer);
//!
//! let base = TilePayload::filled(TileShape::new(4096, 4096, 1), 0.0);
//! let source = Arc::new(PyramidSource::from_base(base, 64));
//! let config = OctreeConfig::default();
//! let mut octree = Octree::new(source.level_shapes(), config, source).unwrap();
//! let mut selector = OctreeChunkLoader::new(layer, config);
//!
//! // Once per interaction tick:
//! let view = OctreeView::auto(DVec2::new(0.0, 0.0), DVec2::new(800.0, 600.0));
//! let drawn = HashSet::new(); // what the renderer has on screen
//! let outcomes = loader.drain_outcomes();
//! selector.apply_outcomes(&mut octree, &outcomes);
//! let drawable = selector.drawable_for_view(&mut loader, &mut octree, &view, &drawn);
//! # let _ = drawable;
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod octree;
pub mod tile;

// Re-export commonly used items
pub use chunk::cache::ChunkCache;
pub use chunk::loader::{ChunkLoadedEvent, ChunkLoader, LoadOutcome, LoadResult, LoadType};
pub use chunk::pool::{LoadHandle, LoaderPool};
pub use chunk::request::{ChunkKey, ChunkRequest, IndexBound, LayerId, SliceIndices};
pub use config::LoaderConfig;
pub use error::LoadError;
pub use octree::{
  ChunkState, Octree, OctreeChunk, OctreeChunkLoader, OctreeConfig, OctreeIntersection,
  OctreeLocation, OctreeView, PyramidSource,
};
pub use tile::{TileFetch, TilePayload, TileRef, TileShape};

// Re-export glam so downstream code can name view coordinates without
// adding its own dependency.
pub use glam;
