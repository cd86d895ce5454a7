//! Pyramid geometry and downsampling.
//!
//! Most production sources hand the loader a ready-made multiscale
//! pyramid. For single-scale images (and for tests) these helpers build
//! one: level shapes halve (rounding up) until the image fits in a
//! single root tile, and sample data is reduced by 2x2 box averaging.
//!
//! [`PyramidSource`] wraps a fully in-memory pyramid behind the
//! [`TileFetch`] boundary, cutting tiles out of the level images on
//! demand - with an optional artificial delay to stand in for slow IO.

use std::time::Duration;

use crate::error::LoadError;
use crate::tile::{TileFetch, TilePayload, TileShape};

use super::location::OctreeLocation;

/// Level shapes, finest first, halving until one tile holds the image.
///
/// Always returns at least one level; a base that already fits the tile
/// yields just that level.
pub fn pyramid_shapes(base: (u32, u32), tile_size: u32) -> Vec<(u32, u32)> {
  let mut shapes = vec![base];
  let (mut rows, mut cols) = base;
  while rows > tile_size || cols > tile_size {
    rows = rows.div_ceil(2).max(1);
    cols = cols.div_ceil(2).max(1);
    shapes.push((rows, cols));
  }
  shapes
}

/// Downsample one image by 2, averaging each 2x2 block per channel.
///
/// Odd edges average the samples that exist, so the output shape is
/// `ceil(input / 2)`.
pub fn downsample_by_two(image: &TilePayload) -> TilePayload {
  let shape = image.shape();
  let out_shape = TileShape::new(
    shape.rows.div_ceil(2).max(1),
    shape.cols.div_ceil(2).max(1),
    shape.channels,
  );

  let mut samples = Vec::with_capacity(out_shape.len());
  for row in 0..out_shape.rows {
    for col in 0..out_shape.cols {
      for channel in 0..out_shape.channels {
        let mut sum = 0.0;
        let mut count = 0u32;
        for dr in 0..2 {
          for dc in 0..2 {
            let (r, c) = (row * 2 + dr, col * 2 + dc);
            if r < shape.rows && c < shape.cols {
              sum += image.sample(r, c, channel);
              count += 1;
            }
          }
        }
        samples.push(sum / count as f32);
      }
    }
  }

  TilePayload::new(out_shape, samples).expect("sample count matches shape")
}

/// Build the full level stack from a base image, finest first.
pub fn downsample_levels(base: TilePayload, tile_size: u32) -> Vec<TilePayload> {
  let mut levels = vec![base];
  loop {
    let shape = levels[levels.len() - 1].shape();
    if shape.rows as u32 <= tile_size && shape.cols as u32 <= tile_size {
      break;
    }
    let next = downsample_by_two(&levels[levels.len() - 1]);
    levels.push(next);
  }
  levels
}

/// An in-memory pyramid exposed through the fetch boundary.
///
/// Tiles are cut from the level images on demand. The optional delay is
/// applied on every fetch, simulating a slow disk- or network-backed
/// source.
pub struct PyramidSource {
  levels: Vec<TilePayload>,
  tile_size: u32,
  delay: Option<Duration>,
}

impl PyramidSource {
  pub fn new(levels: Vec<TilePayload>, tile_size: u32) -> Self {
    Self {
      levels,
      tile_size,
      delay: None,
    }
  }

  /// Build the source from a single base image.
  pub fn from_base(base: TilePayload, tile_size: u32) -> Self {
    Self::new(downsample_levels(base, tile_size), tile_size)
  }

  /// Sleep this long on every fetch.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// The per-level image shapes, for constructing the matching octree.
  pub fn level_shapes(&self) -> Vec<(u32, u32)> {
    self
      .levels
      .iter()
      .map(|level| {
        let shape = level.shape();
        (shape.rows as u32, shape.cols as u32)
      })
      .collect()
  }

  pub fn num_levels(&self) -> usize {
    self.levels.len()
  }
}

impl TileFetch for PyramidSource {
  fn fetch(&self, location: OctreeLocation) -> Result<TilePayload, LoadError> {
    if let Some(delay) = self.delay {
      std::thread::sleep(delay);
    }

    let image = self.levels.get(location.level_index).ok_or_else(|| {
      LoadError::Fetch(format!("no level {} in pyramid", location.level_index))
    })?;

    let shape = image.shape();
    let tile = self.tile_size as usize;
    let row0 = location.row as usize * tile;
    let col0 = location.col as usize * tile;
    if row0 >= shape.rows || col0 >= shape.cols {
      return Err(LoadError::Fetch(format!(
        "tile ({}, {}) outside level {} grid",
        location.row, location.col, location.level_index
      )));
    }

    Ok(image.slice(row0, row0 + tile, col0, col0 + tile))
  }
}

#[cfg(test)]
#[path = "pyramid_test.rs"]
mod pyramid_test;
