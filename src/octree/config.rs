//! OctreeConfig - geometry and selection-policy knobs for one pyramid.

/// Default edge length of a square tile, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Default number of coarser levels searched for coverage chunks.
pub const DEFAULT_ANCESTOR_LEVELS: usize = 3;

/// Default cap on how many tiles should span the view before switching
/// to a coarser level.
pub const DEFAULT_MAX_ONSCREEN_TILES: f64 = 5.0;

/// Configuration for an [`Octree`](super::Octree) and its chunk loader.
#[derive(Clone, Copy, Debug)]
pub struct OctreeConfig {
  /// Edge length of a square tile in pixels. Edge tiles may be smaller.
  pub tile_size: u32,

  /// How many levels above the ideal level to search for coverage.
  /// Coarser tiles cover many ideal tiles each, so a few levels go a
  /// long way.
  pub ancestor_levels: usize,

  /// Auto level selection picks the finest level whose visible tile
  /// count across the view stays under this.
  pub max_onscreen_tiles: f64,
}

impl Default for OctreeConfig {
  fn default() -> Self {
    Self {
      tile_size: DEFAULT_TILE_SIZE,
      ancestor_levels: DEFAULT_ANCESTOR_LEVELS,
      max_onscreen_tiles: DEFAULT_MAX_ONSCREEN_TILES,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = OctreeConfig::default();
    assert_eq!(config.tile_size, 64);
    assert_eq!(config.ancestor_levels, 3);
    assert_eq!(config.max_onscreen_tiles, 5.0);
  }
}
