//! Octree - the ordered pyramid of levels plus tree navigation.
//!
//! The tree is "complete" in shape (every level tiles the whole image)
//! but nodes are materialized lazily, so navigation works on addresses
//! and node lookups are separate. That also keeps borrows simple: the
//! navigation methods hand back [`OctreeLocation`]s, and callers fetch
//! the node they want to inspect or mutate.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::LoadError;
use crate::tile::TileFetch;

use super::chunk::OctreeChunk;
use super::config::OctreeConfig;
use super::level::OctreeLevel;
use super::location::OctreeLocation;

/// Multiscale tile pyramid over one image.
///
/// Levels are ordered finest (index 0) to coarsest; the coarsest level
/// is validated to be a single root tile at construction.
pub struct Octree {
  config: OctreeConfig,
  levels: Vec<OctreeLevel>,
  fetch: Arc<dyn TileFetch>,
}

impl Octree {
  /// Build a tree from per-level image shapes, finest first.
  ///
  /// Shapes must strictly decrease level to level and the last shape
  /// must fit inside a single tile.
  pub fn new(
    level_shapes: Vec<(u32, u32)>,
    config: OctreeConfig,
    fetch: Arc<dyn TileFetch>,
  ) -> Result<Self, LoadError> {
    if level_shapes.is_empty() {
      return Err(LoadError::Geometry("octree needs at least one level".into()));
    }
    for pair in level_shapes.windows(2) {
      let (finer, coarser) = (pair[0], pair[1]);
      if coarser.0 >= finer.0 || coarser.1 >= finer.1 {
        return Err(LoadError::Geometry(format!(
          "level shapes must decrease: {:?} then {:?}",
          finer, coarser
        )));
      }
    }
    let last = level_shapes[level_shapes.len() - 1];
    if last.0 > config.tile_size || last.1 > config.tile_size {
      return Err(LoadError::Geometry(format!(
        "coarsest level {:?} does not fit one {}px root tile",
        last, config.tile_size
      )));
    }

    let base_shape = level_shapes[0];
    let levels = level_shapes
      .into_iter()
      .enumerate()
      .map(|(index, shape)| OctreeLevel::new(index, shape, base_shape, config.tile_size))
      .collect();

    Ok(Self {
      config,
      levels,
      fetch,
    })
  }

  #[inline]
  pub fn config(&self) -> &OctreeConfig {
    &self.config
  }

  #[inline]
  pub fn num_levels(&self) -> usize {
    self.levels.len()
  }

  #[inline]
  pub fn levels(&self) -> &[OctreeLevel] {
    &self.levels
  }

  /// The permanent root tile's address, at the coarsest level.
  #[inline]
  pub fn root_location(&self) -> OctreeLocation {
    OctreeLocation::new(self.levels.len() - 1, 0, 0)
  }

  /// Existing node at `location`, if it was ever created.
  pub fn chunk(&self, location: OctreeLocation) -> Option<&OctreeChunk> {
    self
      .levels
      .get(location.level_index)?
      .get(location.row, location.col)
  }

  pub fn chunk_mut(&mut self, location: OctreeLocation) -> Option<&mut OctreeChunk> {
    self
      .levels
      .get_mut(location.level_index)?
      .get_mut(location.row, location.col)
  }

  /// Node at `location`, lazily created when `create` is set. None when
  /// the address is outside the pyramid or absent with `create` unset.
  pub fn get_chunk(&mut self, location: OctreeLocation, create: bool) -> Option<&mut OctreeChunk> {
    let fetch = Arc::clone(&self.fetch);
    let level = self.levels.get_mut(location.level_index)?;
    if create {
      level.get_or_create(location.row, location.col, &fetch)
    } else {
      level.get_mut(location.row, location.col)
    }
  }

  /// The up-to-4 nodes one level finer that tile `location`.
  ///
  /// With `in_memory_only` set, only children whose data is already
  /// resident are returned; the lookup never initiates a load either
  /// way, loads are the caller's call.
  pub fn get_children(
    &mut self,
    location: OctreeLocation,
    create: bool,
    in_memory_only: bool,
  ) -> SmallVec<[OctreeLocation; 4]> {
    let mut children = SmallVec::new();
    for quadrant in 0u8..4 {
      let Some(child) = location.child(quadrant) else {
        continue;
      };
      let Some(chunk) = self.get_chunk(child, create) else {
        continue;
      };
      if in_memory_only && !chunk.in_memory() {
        continue;
      }
      children.push(child);
    }
    children
  }

  /// Up to `max_levels` coarser nodes covering `location`, coarsest
  /// first, created as needed.
  ///
  /// Ancestors are cheap to materialize eagerly: one ancestor covers
  /// 4^n descendants, so the same few nodes are shared by every ideal
  /// chunk in view. Coarsest-first order puts the widest coverage at
  /// the front of the draw/load queue.
  pub fn get_ancestors(
    &mut self,
    location: OctreeLocation,
    max_levels: usize,
  ) -> SmallVec<[OctreeLocation; 4]> {
    let mut ancestors: SmallVec<[OctreeLocation; 4]> = SmallVec::new();
    let mut current = location;
    for _ in 0..max_levels {
      let Some(parent) = current.parent(self.levels.len()) else {
        break;
      };
      if self.get_chunk(parent, true).is_none() {
        break;
      }
      ancestors.push(parent);
      current = parent;
    }
    ancestors.reverse();
    ancestors
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
