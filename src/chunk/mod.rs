//! Chunk loading core: keys, requests, the byte-bounded cache, the
//! worker pool and the orchestrating [`loader::ChunkLoader`].
//!
//! One orchestration thread owns everything here; workers only
//! materialize payloads and report back over a channel.

pub mod cache;
pub mod delay_queue;
pub mod loader;
pub mod pool;
pub mod request;
pub mod stats;

pub use cache::ChunkCache;
pub use loader::{ChunkLoadedEvent, ChunkLoader, LoadOutcome, LoadResult, LoadType};
pub use pool::{Completion, LoadHandle, LoaderPool};
pub use request::{ChunkKey, ChunkRequest, IndexBound, LayerId, SliceIndices};
