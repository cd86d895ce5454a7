use super::*;

#[test]
fn test_pyramid_shapes_halve_to_one_tile() {
  let shapes = pyramid_shapes((512, 512), 64);
  assert_eq!(
    shapes,
    vec![(512, 512), (256, 256), (128, 128), (64, 64)]
  );
}

#[test]
fn test_pyramid_shapes_round_up_odd_sizes() {
  let shapes = pyramid_shapes((130, 100), 64);
  assert_eq!(shapes, vec![(130, 100), (65, 50), (33, 25)]);
}

#[test]
fn test_small_base_is_a_single_level() {
  assert_eq!(pyramid_shapes((40, 40), 64), vec![(40, 40)]);
}

#[test]
fn test_downsample_averages_2x2_blocks() {
  let image = TilePayload::new(
    TileShape::new(2, 4, 1),
    vec![
      0.0, 2.0, 4.0, 6.0, //
      8.0, 10.0, 12.0, 14.0,
    ],
  )
  .unwrap();

  let smaller = downsample_by_two(&image);
  assert_eq!(smaller.shape(), TileShape::new(1, 2, 1));
  assert_eq!(smaller.samples(), &[5.0, 9.0]);
}

#[test]
fn test_downsample_odd_edge_averages_what_exists() {
  let image = TilePayload::new(TileShape::new(3, 3, 1), (0..9).map(|v| v as f32).collect()).unwrap();

  let smaller = downsample_by_two(&image);
  assert_eq!(smaller.shape(), TileShape::new(2, 2, 1));
  // Bottom-right output cell only has the single corner sample.
  assert_eq!(smaller.sample(1, 1, 0), 8.0);
}

#[test]
fn test_downsample_levels_matches_shape_math() {
  let base = TilePayload::filled(TileShape::new(130, 100, 1), 1.0);
  let levels = downsample_levels(base, 64);

  let shapes: Vec<(u32, u32)> = levels
    .iter()
    .map(|level| (level.shape().rows as u32, level.shape().cols as u32))
    .collect();
  assert_eq!(shapes, pyramid_shapes((130, 100), 64));

  // Averaging a constant image stays constant all the way up.
  let root = &levels[levels.len() - 1];
  assert!(root.samples().iter().all(|&v| (v - 1.0).abs() < 1e-6));
}

#[test]
fn test_pyramid_source_cuts_tiles() {
  let base = TilePayload::new(
    TileShape::new(130, 130, 1),
    (0..130 * 130).map(|v| v as f32).collect(),
  )
  .unwrap();
  let source = PyramidSource::from_base(base, 64);

  assert_eq!(source.num_levels(), 3);
  assert_eq!(source.level_shapes(), vec![(130, 130), (65, 65), (33, 33)]);

  // A full interior tile.
  let tile = source.fetch(OctreeLocation::new(0, 0, 0)).unwrap();
  assert_eq!(tile.shape(), TileShape::new(64, 64, 1));
  assert_eq!(tile.sample(0, 0, 0), 0.0);
  assert_eq!(tile.sample(1, 0, 0), 130.0);

  // The bottom-right edge tile is clipped.
  let edge = source.fetch(OctreeLocation::new(0, 2, 2)).unwrap();
  assert_eq!(edge.shape(), TileShape::new(2, 2, 1));

  // The root covers the whole coarsest level.
  let root = source.fetch(OctreeLocation::new(2, 0, 0)).unwrap();
  assert_eq!(root.shape(), TileShape::new(33, 33, 1));
}

#[test]
fn test_pyramid_source_rejects_bad_addresses() {
  let source = PyramidSource::from_base(TilePayload::filled(TileShape::new(130, 130, 1), 0.0), 64);

  assert!(source.fetch(OctreeLocation::new(9, 0, 0)).is_err());
  assert!(source.fetch(OctreeLocation::new(0, 3, 0)).is_err());
}
