//! OctreeChunkLoader - decides what to load, cancel and draw each tick.
//!
//! The ideal chunks are the ones we actually want on screen, but during
//! navigation most of them are not in memory yet. Waiting for them means
//! blank screen; so every tick assembles the best available stand-ins:
//!
//! - coarser ancestors load and draw *before* the ideal chunk - one
//!   ancestor covers 4^n ideal tiles, is frequently shared between them
//!   and is often resident already, so it buys whole-view coverage for
//!   almost nothing;
//! - finer children are drawn only if the renderer already has them on
//!   screen - a finer load is strictly more expensive than the ideal
//!   one and is never started speculatively;
//! - the root tile is permanent coverage and is loaded first, once,
//!   guaranteeing the view is never empty after it arrives.
//!
//! Blurry-but-present beats sharp-but-later while the camera moves; the
//! ideal chunks still load, just last.
//!
//! Loads whose target dropped out of the wanted set are cancelled on the
//! spot. Under a fast pan or zoom most submissions die this way, which
//! is exactly the point - a worker never wastes time on a tile the view
//! has already left behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::chunk::loader::{ChunkLoader, LoadOutcome, LoadResult};
use crate::chunk::request::{ChunkKey, ChunkRequest, LayerId};

use super::config::OctreeConfig;
use super::location::OctreeLocation;
use super::tree::Octree;
use super::view::{OctreeIntersection, OctreeView};

/// Per-layer LOD selection state.
///
/// Owns the location -> key map for loads it has in flight; the octree
/// and the [`ChunkLoader`] are passed in per call so one loader instance
/// can serve many layers.
pub struct OctreeChunkLoader {
  layer_id: LayerId,
  config: OctreeConfig,
  pending: HashMap<OctreeLocation, ChunkKey>,
  last_drawable: HashSet<OctreeLocation>,
}

impl OctreeChunkLoader {
  pub fn new(layer_id: LayerId, config: OctreeConfig) -> Self {
    Self {
      layer_id,
      config,
      pending: HashMap::new(),
      last_drawable: HashSet::new(),
    }
  }

  #[inline]
  pub fn layer_id(&self) -> LayerId {
    self.layer_id
  }

  /// Loads currently tracked as in flight.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// One full tick: intersect the view, select, cancel stale loads and
  /// kick new ones. Returns the chunks the renderer should draw now.
  pub fn drawable_for_view(
    &mut self,
    loader: &mut ChunkLoader,
    octree: &mut Octree,
    view: &OctreeView,
    drawn_set: &HashSet<OctreeLocation>,
  ) -> Vec<OctreeLocation> {
    let intersection = OctreeIntersection::compute(octree, view);
    let ideal = intersection.locations();
    self.get_drawable_chunks(loader, octree, drawn_set, &ideal)
  }

  /// The selection pass over an explicit ideal set.
  ///
  /// `drawn_set` is what the renderer actually has on screen, which can
  /// lag what we returned on previous ticks. Evaluation follows the
  /// ideal slice order, so results are reproducible for a given view.
  pub fn get_drawable_chunks(
    &mut self,
    loader: &mut ChunkLoader,
    octree: &mut Octree,
    drawn_set: &HashSet<OctreeLocation>,
    ideal: &[OctreeLocation],
  ) -> Vec<OctreeLocation> {
    let mut drawable: Vec<OctreeLocation> = Vec::new();
    let mut seen: HashSet<OctreeLocation> = HashSet::new();
    // Everything still wanted this tick, resident or not. Pending loads
    // outside this set are stale.
    let mut wanted: HashSet<OctreeLocation> = HashSet::new();

    // Permanent coverage first: the root draws under everything and
    // only ever loads once.
    let root = octree.root_location();
    wanted.insert(root);
    self.load_and_add(loader, octree, &mut drawable, &mut seen, &[root]);

    for &ideal_loc in ideal {
      let coverage = self.get_coverage(octree, ideal_loc, drawn_set);
      wanted.extend(coverage.iter().copied());
      wanted.insert(ideal_loc);
      self.load_and_add(loader, octree, &mut drawable, &mut seen, &coverage);
    }

    self.cancel_stale(loader, octree, &wanted);

    // Ideal chunks last: their coverage is already queued, so the
    // expensive loads line up behind the cheap ones.
    for &ideal_loc in ideal {
      let needs_load = octree
        .chunk(ideal_loc)
        .map(|chunk| chunk.needs_load())
        .unwrap_or(false);
      if needs_load && self.load_chunk(loader, octree, ideal_loc) && seen.insert(ideal_loc) {
        drawable.push(ideal_loc);
      }
    }

    if seen != self.last_drawable {
      debug!(
        drawable = drawable.len(),
        pending = self.pending.len(),
        "drawable set changed"
      );
      self.last_drawable = seen;
    }

    drawable
  }

  /// Fold one drained loader outcome back into the tree.
  pub fn apply_outcome(&mut self, octree: &mut Octree, outcome: &LoadOutcome) {
    let key = outcome.key();
    if key.layer_id != self.layer_id {
      return;
    }
    let Some(location) = key.location else {
      return;
    };
    let tracked = self.pending.remove(&location).is_some();

    match outcome {
      LoadOutcome::Loaded(event) => {
        let Some(chunk) = octree.chunk_mut(location) else {
          debug!(?location, "loaded chunk no longer in tree");
          return;
        };
        if let Some(payload) = event.request.payload() {
          if !tracked {
            // A load that outlived its cancellation still produced
            // data; it is cached anyway, so store it and let the next
            // pass decide whether it draws.
            debug!(?location, "adopting result of untracked load");
          }
          chunk.set_payload(Arc::clone(payload));
        }
      }
      LoadOutcome::Failed { .. } | LoadOutcome::Cancelled { .. } => {
        // Back to not-loaded; the chunk stays eligible for
        // re-selection on a later tick.
        if let Some(chunk) = octree.chunk_mut(location) {
          chunk.clear_loading();
        }
      }
    }
  }

  pub fn apply_outcomes(&mut self, octree: &mut Octree, outcomes: &[LoadOutcome]) {
    for outcome in outcomes {
      self.apply_outcome(octree, outcome);
    }
  }

  /// Chunks to draw in place of (and alongside) one ideal chunk.
  fn get_coverage(
    &self,
    octree: &mut Octree,
    ideal: OctreeLocation,
    drawn_set: &HashSet<OctreeLocation>,
  ) -> SmallVec<[OctreeLocation; 8]> {
    let Some(chunk) = octree.get_chunk(ideal, true) else {
      return SmallVec::new();
    };
    let in_memory = chunk.in_memory();

    // Resident and on screen: it alone covers itself.
    if in_memory && drawn_set.contains(&ideal) {
      let mut only: SmallVec<[OctreeLocation; 8]> = SmallVec::new();
      only.push(ideal);
      return only;
    }

    let children = octree.get_children(ideal, false, true);
    let ancestors = octree.get_ancestors(ideal, self.config.ancestor_levels);

    let mut keep: SmallVec<[OctreeLocation; 8]> = SmallVec::new();
    for &loc in children.iter().chain(ancestors.iter()) {
      // Finer chunks only earn a slot if already on screen; coarser
      // ones always do.
      let finer = loc.level_index < ideal.level_index;
      if !finer || drawn_set.contains(&loc) {
        keep.push(loc);
      }
    }

    // The ideal chunk itself draws after its coverage.
    if in_memory {
      keep.push(ideal);
    }
    keep
  }

  /// Add resident chunks to the drawable list, starting loads for the
  /// ones that need it (sync loads land immediately).
  fn load_and_add(
    &mut self,
    loader: &mut ChunkLoader,
    octree: &mut Octree,
    drawable: &mut Vec<OctreeLocation>,
    seen: &mut HashSet<OctreeLocation>,
    locations: &[OctreeLocation],
  ) {
    for &loc in locations {
      let (in_memory, needs_load) = match octree.get_chunk(loc, true) {
        Some(chunk) => (chunk.in_memory(), chunk.needs_load()),
        None => continue,
      };
      if in_memory {
        if seen.insert(loc) {
          drawable.push(loc);
        }
      } else if needs_load && self.load_chunk(loader, octree, loc) && seen.insert(loc) {
        drawable.push(loc);
      }
    }
  }

  /// Start one load. Returns true if the chunk is resident now (the
  /// synchronous path), false when pending or failed.
  fn load_chunk(
    &mut self,
    loader: &mut ChunkLoader,
    octree: &mut Octree,
    location: OctreeLocation,
  ) -> bool {
    let Some(chunk) = octree.chunk_mut(location) else {
      return false;
    };
    debug_assert!(chunk.needs_load());
    let source = chunk.source().clone();
    chunk.mark_loading();

    let key = ChunkKey::octree(self.layer_id, location);
    match loader.load(ChunkRequest::new(key.clone(), source)) {
      LoadResult::Satisfied(payload) => {
        if let Some(chunk) = octree.chunk_mut(location) {
          chunk.set_payload(payload);
        }
        true
      }
      LoadResult::Pending => {
        self.pending.insert(location, key);
        false
      }
      LoadResult::Failed(_) => {
        // Already logged by the loader; the node reverts and may retry
        // next tick.
        if let Some(chunk) = octree.chunk_mut(location) {
          chunk.clear_loading();
        }
        false
      }
    }
  }

  /// Cancel pending loads whose target is no longer wanted.
  fn cancel_stale(
    &mut self,
    loader: &mut ChunkLoader,
    octree: &mut Octree,
    wanted: &HashSet<OctreeLocation>,
  ) {
    let stale: Vec<(OctreeLocation, ChunkKey)> = self
      .pending
      .iter()
      .filter(|(location, _)| !wanted.contains(location))
      .map(|(location, key)| (*location, key.clone()))
      .collect();

    for (location, key) in stale {
      if loader.cancel(&key) {
        self.pending.remove(&location);
        if let Some(chunk) = octree.chunk_mut(location) {
          chunk.clear_loading();
        }
        debug!(?location, "cancelled stale load");
      } else {
        // Already running; stay subscribed so the arriving payload is
        // still stored.
        debug!(?location, "stale load already running");
      }
    }
  }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod loader_test;
