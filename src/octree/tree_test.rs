use std::sync::Arc;

use super::*;
use crate::tile::{TilePayload, TileShape};

struct NullFetch;

impl TileFetch for NullFetch {
  fn fetch(&self, _location: OctreeLocation) -> Result<TilePayload, LoadError> {
    Ok(TilePayload::filled(TileShape::new(1, 1, 1), 0.0))
  }
}

fn tree(shapes: Vec<(u32, u32)>) -> Octree {
  Octree::new(shapes, OctreeConfig::default(), Arc::new(NullFetch)).unwrap()
}

/// Four power-of-two levels, 64px tiles: 8x8, 4x4, 2x2, 1x1 grids.
fn four_level_tree() -> Octree {
  tree(vec![(512, 512), (256, 256), (128, 128), (64, 64)])
}

#[test]
fn test_construction_validates_shapes() {
  let config = OctreeConfig::default();

  assert!(Octree::new(vec![], config, Arc::new(NullFetch)).is_err());

  // Levels must strictly decrease.
  assert!(Octree::new(
    vec![(256, 256), (256, 256)],
    config,
    Arc::new(NullFetch)
  )
  .is_err());

  // Coarsest level must fit a single root tile.
  assert!(Octree::new(
    vec![(512, 512), (128, 128)],
    config,
    Arc::new(NullFetch)
  )
  .is_err());

  assert!(Octree::new(vec![(64, 64)], config, Arc::new(NullFetch)).is_ok());
}

#[test]
fn test_root_is_single_tile_at_coarsest_level() {
  let tree = four_level_tree();
  assert_eq!(tree.num_levels(), 4);
  assert_eq!(tree.root_location(), OctreeLocation::new(3, 0, 0));
  assert_eq!(tree.levels()[3].tile_rows(), 1);
  assert_eq!(tree.levels()[3].tile_cols(), 1);
  assert_eq!(tree.levels()[0].tile_rows(), 8);
}

#[test]
fn test_get_chunk_create_semantics() {
  let mut tree = four_level_tree();
  let loc = OctreeLocation::new(1, 2, 3);

  assert!(tree.get_chunk(loc, false).is_none());
  assert!(tree.chunk(loc).is_none());

  let chunk = tree.get_chunk(loc, true).unwrap();
  assert_eq!(chunk.location(), loc);
  assert!(chunk.needs_load());

  assert!(tree.get_chunk(loc, false).is_some());
  assert!(tree.chunk(loc).is_some());

  // Outside the pyramid entirely.
  assert!(tree.get_chunk(OctreeLocation::new(9, 0, 0), true).is_none());
  assert!(tree.get_chunk(OctreeLocation::new(1, 4, 0), true).is_none());
}

#[test]
fn test_children_cover_parent() {
  let mut tree = four_level_tree();
  let parent = OctreeLocation::new(2, 1, 0);

  let children = tree.get_children(parent, true, false);
  assert_eq!(children.len(), 4);
  for child in &children {
    assert_eq!(child.level_index, 1);
    assert_eq!(child.parent(4).unwrap(), parent);
  }
}

/// Children falling off the edge of a non-power-of-two grid are skipped.
#[test]
fn test_children_filtered_by_grid_bounds() {
  // Level 0: 3x3 tiles, level 1: 2x2, level 2: 1x1 root.
  let mut tree = tree(vec![(130, 130), (65, 65), (33, 33)]);
  let corner = OctreeLocation::new(1, 1, 1);

  let children = tree.get_children(corner, true, false);
  assert_eq!(children.len(), 1, "only (2,2) is inside the 3x3 grid");
  assert_eq!(children[0], OctreeLocation::new(0, 2, 2));
}

#[test]
fn test_children_in_memory_filter_never_creates() {
  let mut tree = four_level_tree();
  let parent = OctreeLocation::new(1, 0, 0);

  // Nothing exists yet: the in-memory filter finds nothing and, with
  // create unset, materializes nothing either.
  assert!(tree.get_children(parent, false, true).is_empty());
  assert_eq!(tree.levels()[0].chunk_count(), 0);

  // Load one child; only it is returned.
  let child = OctreeLocation::new(0, 0, 1);
  let payload = Arc::new(TilePayload::filled(TileShape::new(1, 1, 1), 1.0));
  tree.get_chunk(child, true).unwrap().set_payload(payload);

  let in_memory = tree.get_children(parent, false, true);
  assert_eq!(in_memory.len(), 1);
  assert_eq!(in_memory[0], child);
}

#[test]
fn test_ancestors_walk_coarser_coarsest_first() {
  let mut tree = four_level_tree();
  let leaf = OctreeLocation::new(0, 5, 5);

  let ancestors = tree.get_ancestors(leaf, 3);
  assert_eq!(
    ancestors.as_slice(),
    &[
      OctreeLocation::new(3, 0, 0),
      OctreeLocation::new(2, 1, 1),
      OctreeLocation::new(1, 2, 2),
    ]
  );

  // Walking created the nodes eagerly.
  for ancestor in &ancestors {
    assert!(tree.chunk(*ancestor).is_some());
  }
}

#[test]
fn test_ancestors_stop_at_root() {
  let mut tree = four_level_tree();
  let near_root = OctreeLocation::new(2, 0, 1);

  let ancestors = tree.get_ancestors(near_root, 3);
  assert_eq!(ancestors.as_slice(), &[OctreeLocation::new(3, 0, 0)]);

  assert!(tree.get_ancestors(tree.root_location(), 3).is_empty());
}
