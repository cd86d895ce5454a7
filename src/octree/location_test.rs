use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::*;

/// Equal locations must produce equal hashes (HashMap invariant).
#[test]
fn test_hash_consistency() {
  let a = OctreeLocation::new(2, 10, 20);
  let b = OctreeLocation::new(2, 10, 20);

  let hash = |loc: &OctreeLocation| {
    let mut hasher = DefaultHasher::new();
    loc.hash(&mut hasher);
    hasher.finish()
  };

  assert_eq!(a, b);
  assert_eq!(hash(&a), hash(&b));
  assert_ne!(a, OctreeLocation::new(3, 10, 20));
}

#[test]
fn test_parent_halves_coordinates() {
  let loc = OctreeLocation::new(1, 5, 7);
  let parent = loc.parent(4).expect("parent exists below coarsest level");

  assert_eq!(parent, OctreeLocation::new(2, 2, 3));
}

#[test]
fn test_parent_at_coarsest_level_is_none() {
  let root = OctreeLocation::new(3, 0, 0);
  assert!(root.parent(4).is_none());
}

/// All 4 quadrants produce children at the right offsets.
#[test]
fn test_child_all_quadrants() {
  let parent = OctreeLocation::new(2, 3, 4);

  for quadrant in 0u8..4 {
    let child = parent.child(quadrant).expect("children exist above level 0");
    let expected_row = parent.row * 2 + ((quadrant >> 1) & 1) as u32;
    let expected_col = parent.col * 2 + (quadrant & 1) as u32;

    assert_eq!(child.level_index, 1);
    assert_eq!(child.row, expected_row, "quadrant {} row", quadrant);
    assert_eq!(child.col, expected_col, "quadrant {} col", quadrant);
  }
}

#[test]
fn test_child_at_level_0_is_none() {
  let finest = OctreeLocation::new(0, 8, 8);
  for quadrant in 0u8..4 {
    assert!(finest.child(quadrant).is_none());
  }
}

/// parent(child(loc)) round-trips for every quadrant.
#[test]
fn test_child_parent_roundtrip() {
  let original = OctreeLocation::new(2, 6, 9);

  for quadrant in 0u8..4 {
    let child = original.child(quadrant).unwrap();
    let back = child.parent(4).unwrap();
    assert_eq!(back, original, "roundtrip failed for quadrant {}", quadrant);
  }
}
