//! OctreeLevel - one sparse grid of nodes at a single resolution.
//!
//! Grid dimensions are `ceil(image_shape / tile_size)`; edge tiles are
//! smaller than `tile_size`. Nodes are created lazily on first access
//! and stored in a hash map, so an enormous level costs nothing until
//! the view actually touches it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tile::{TileFetch, TileRef, TileShape};

use super::chunk::OctreeChunk;
use super::location::OctreeLocation;

/// One level of the pyramid.
pub struct OctreeLevel {
  level_index: usize,
  /// Image shape (rows, cols) in pixels at this level's resolution.
  image_shape: (u32, u32),
  tile_size: u32,
  /// Downsampling factor relative to the base image (1.0 at level 0).
  scale: f64,
  tiles: HashMap<(u32, u32), OctreeChunk>,
}

impl OctreeLevel {
  pub fn new(level_index: usize, image_shape: (u32, u32), base_shape: (u32, u32), tile_size: u32) -> Self {
    let scale = if image_shape.0 > 0 {
      base_shape.0 as f64 / image_shape.0 as f64
    } else {
      1.0
    };
    Self {
      level_index,
      image_shape,
      tile_size,
      scale,
      tiles: HashMap::new(),
    }
  }

  #[inline]
  pub fn level_index(&self) -> usize {
    self.level_index
  }

  #[inline]
  pub fn image_shape(&self) -> (u32, u32) {
    self.image_shape
  }

  #[inline]
  pub fn scale(&self) -> f64 {
    self.scale
  }

  /// Number of tile rows: ceil(image rows / tile size).
  #[inline]
  pub fn tile_rows(&self) -> u32 {
    self.image_shape.0.div_ceil(self.tile_size)
  }

  /// Number of tile columns: ceil(image cols / tile size).
  #[inline]
  pub fn tile_cols(&self) -> u32 {
    self.image_shape.1.div_ceil(self.tile_size)
  }

  #[inline]
  pub fn in_bounds(&self, row: u32, col: u32) -> bool {
    row < self.tile_rows() && col < self.tile_cols()
  }

  /// Pixel shape of the tile at (row, col); edge tiles come out smaller.
  /// Channels are unknown at this layer and reported as 1.
  pub fn tile_shape(&self, row: u32, col: u32) -> TileShape {
    let rows = self
      .image_shape
      .0
      .saturating_sub(row * self.tile_size)
      .min(self.tile_size);
    let cols = self
      .image_shape
      .1
      .saturating_sub(col * self.tile_size)
      .min(self.tile_size);
    TileShape::new(rows as usize, cols as usize, 1)
  }

  /// Number of nodes materialized so far.
  pub fn chunk_count(&self) -> usize {
    self.tiles.len()
  }

  pub fn get(&self, row: u32, col: u32) -> Option<&OctreeChunk> {
    self.tiles.get(&(row, col))
  }

  pub fn get_mut(&mut self, row: u32, col: u32) -> Option<&mut OctreeChunk> {
    self.tiles.get_mut(&(row, col))
  }

  /// Existing node, or a freshly created `NotLoaded` one. None if the
  /// address is outside this level's grid.
  pub fn get_or_create(
    &mut self,
    row: u32,
    col: u32,
    fetch: &Arc<dyn TileFetch>,
  ) -> Option<&mut OctreeChunk> {
    if !self.in_bounds(row, col) {
      return None;
    }
    let location = OctreeLocation::new(self.level_index, row, col);
    Some(
      self
        .tiles
        .entry((row, col))
        .or_insert_with(|| OctreeChunk::new(location, TileRef::Lazy(Arc::clone(fetch), location))),
    )
  }
}

#[cfg(test)]
#[path = "level_test.rs"]
mod level_test;
