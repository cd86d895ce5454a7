//! OctreeView and OctreeIntersection - per-tick viewport queries.
//!
//! The external render layer supplies a view once per interaction tick;
//! intersecting it with the pyramid yields the "ideal" chunk set: the
//! nodes at the level whose pixels best match the screen, clipped to the
//! visible region, in deterministic row-major order.

use std::ops::Range;

use glam::DVec2;

use super::location::OctreeLocation;
use super::tree::Octree;

/// Camera state for one tick.
///
/// Corners are in base-image pixel coordinates with `x` the column and
/// `y` the row; `corners[0]` is the min corner, `corners[1]` the max.
#[derive(Clone, Copy, Debug)]
pub struct OctreeView {
  pub corners: [DVec2; 2],
  /// Pinned level index, or None to choose automatically from zoom.
  pub level: Option<usize>,
}

impl OctreeView {
  /// View choosing its level automatically ("auto resolution" on).
  pub fn auto(min_corner: DVec2, max_corner: DVec2) -> Self {
    Self {
      corners: [min_corner, max_corner],
      level: None,
    }
  }

  /// View pinned to an explicit level.
  pub fn pinned(min_corner: DVec2, max_corner: DVec2, level: usize) -> Self {
    Self {
      corners: [min_corner, max_corner],
      level: Some(level),
    }
  }

  /// View width in base-image pixels.
  #[inline]
  pub fn width(&self) -> f64 {
    (self.corners[1].x - self.corners[0].x).max(0.0)
  }

  /// Level whose resolution best matches the current zoom.
  ///
  /// Walks the levels finest to coarsest and picks the first whose
  /// visible tile count across the view width fits the on-screen tile
  /// budget; falls back to the coarsest. A pinned level is clamped and
  /// returned as-is.
  pub fn ideal_level(&self, octree: &Octree) -> usize {
    let num_levels = octree.num_levels();
    if let Some(level) = self.level {
      return level.min(num_levels - 1);
    }

    let config = octree.config();
    let num_tiles = self.width() / config.tile_size as f64;
    for (index, level) in octree.levels().iter().enumerate() {
      if num_tiles / level.scale() < config.max_onscreen_tiles {
        return index;
      }
    }
    num_levels - 1
  }
}

/// The visible tile ranges at one level.
#[derive(Clone, Debug)]
pub struct OctreeIntersection {
  level_index: usize,
  row_range: Range<u32>,
  col_range: Range<u32>,
}

impl OctreeIntersection {
  /// Intersect a view with the pyramid at the view's ideal level.
  pub fn compute(octree: &Octree, view: &OctreeView) -> Self {
    let level_index = view.ideal_level(octree);
    let level = &octree.levels()[level_index];
    let scale = level.scale();
    let tile_size = octree.config().tile_size as f64;

    let to_tiles = |v: f64| v / scale / tile_size;
    let row_range = clamped_range(
      to_tiles(view.corners[0].y),
      to_tiles(view.corners[1].y),
      level.tile_rows(),
    );
    let col_range = clamped_range(
      to_tiles(view.corners[0].x),
      to_tiles(view.corners[1].x),
      level.tile_cols(),
    );

    Self {
      level_index,
      row_range,
      col_range,
    }
  }

  #[inline]
  pub fn level_index(&self) -> usize {
    self.level_index
  }

  #[inline]
  pub fn row_range(&self) -> Range<u32> {
    self.row_range.clone()
  }

  #[inline]
  pub fn col_range(&self) -> Range<u32> {
    self.col_range.clone()
  }

  /// True if the tile at (row, col) falls inside the intersection.
  pub fn is_visible(&self, row: u32, col: u32) -> bool {
    self.row_range.contains(&row) && self.col_range.contains(&col)
  }

  /// The ideal chunk addresses, row-major.
  ///
  /// Row-major order keeps coverage decisions reproducible from tick to
  /// tick for the same view.
  pub fn locations(&self) -> Vec<OctreeLocation> {
    let mut locations = Vec::with_capacity(self.row_range.len() * self.col_range.len());
    for row in self.row_range.clone() {
      for col in self.col_range.clone() {
        locations.push(OctreeLocation::new(self.level_index, row, col));
      }
    }
    locations
  }
}

/// Clamp a fractional tile span to `[0, num_tiles)`, widening the upper
/// bound so partially visible tiles are included.
fn clamped_range(from: f64, to: f64, num_tiles: u32) -> Range<u32> {
  let last = num_tiles.saturating_sub(1) as f64;
  let start = from.clamp(0.0, last) as u32;
  let stop = to.clamp(0.0, last) as u32 + 1;
  start..stop
}

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;
