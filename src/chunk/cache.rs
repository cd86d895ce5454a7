//! ChunkCache - byte-bounded LRU storage for materialized payloads.
//!
//! Recency is tracked with a stamp queue: every get/put pushes a fresh
//! `(key, stamp)` pair, and eviction pops from the front, skipping pairs
//! whose stamp no longer matches the live entry. The queue is compacted
//! when it grows far past the entry count, so repeated touches of a hot
//! key stay O(1).
//!
//! Entry sizes are always computed from the live payload, never from
//! size metadata captured at insert time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::DEFAULT_CACHE_MEM_FRACTION;
use crate::tile::TilePayload;

use super::request::ChunkKey;

struct CacheEntry {
  payload: Arc<TilePayload>,
  stamp: u64,
}

/// Cache of previously loaded chunks, bounded by total payload bytes.
///
/// A payload strictly larger than the whole capacity is rejected (and
/// logged) rather than admitted, so the resident-bytes bound holds after
/// every `put` unconditionally. Zero-size payloads are admitted.
pub struct ChunkCache {
  entries: HashMap<ChunkKey, CacheEntry>,
  lru: VecDeque<(ChunkKey, u64)>,
  stamp: u64,
  resident_bytes: usize,
  capacity_bytes: usize,
  enabled: bool,
}

impl ChunkCache {
  /// Cache with an explicit byte capacity.
  pub fn new(capacity_bytes: usize) -> Self {
    Self {
      entries: HashMap::new(),
      lru: VecDeque::new(),
      stamp: 0,
      resident_bytes: 0,
      capacity_bytes,
      enabled: true,
    }
  }

  /// Cache sized as a fraction of total system memory.
  pub fn with_mem_fraction(fraction: f64) -> Self {
    let total = system_memory_bytes();
    Self::new((total as f64 * fraction) as usize)
  }

  /// Cache sized with the default memory fraction.
  pub fn with_default_capacity() -> Self {
    Self::with_mem_fraction(DEFAULT_CACHE_MEM_FRACTION)
  }

  /// Look up a payload, marking the entry as recently used.
  pub fn get(&mut self, key: &ChunkKey) -> Option<Arc<TilePayload>> {
    if !self.enabled {
      return None;
    }
    let next_stamp = self.stamp.wrapping_add(1);
    let entry = self.entries.get_mut(key)?;
    self.stamp = next_stamp;
    entry.stamp = next_stamp;
    let payload = Arc::clone(&entry.payload);
    self.lru.push_back((key.clone(), next_stamp));
    self.compact_lru();
    Some(payload)
  }

  /// Insert or overwrite, evicting least-recently-used entries until the
  /// total is back under capacity.
  pub fn put(&mut self, key: ChunkKey, payload: Arc<TilePayload>) {
    if !self.enabled {
      debug!(?key, "cache disabled, dropping put");
      return;
    }

    let nbytes = payload.nbytes();
    if nbytes > self.capacity_bytes {
      warn!(
        ?key,
        nbytes,
        capacity = self.capacity_bytes,
        "payload larger than cache capacity, rejecting"
      );
      return;
    }

    if let Some(old) = self.entries.remove(&key) {
      self.resident_bytes = self.resident_bytes.saturating_sub(old.payload.nbytes());
    }

    self.stamp = self.stamp.wrapping_add(1);
    let stamp = self.stamp;
    self.entries.insert(key.clone(), CacheEntry { payload, stamp });
    self.resident_bytes = self.resident_bytes.saturating_add(nbytes);
    self.lru.push_back((key, stamp));

    self.evict_to_fit();
    self.compact_lru();
  }

  /// True if the key is resident. Does not touch recency.
  pub fn contains(&self, key: &ChunkKey) -> bool {
    self.enabled && self.entries.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn resident_bytes(&self) -> usize {
    self.resident_bytes
  }

  pub fn capacity_bytes(&self) -> usize {
    self.capacity_bytes
  }

  /// Disable or re-enable the cache. While disabled, gets miss and puts
  /// are dropped; resident entries are kept.
  pub fn set_enabled(&mut self, enabled: bool) {
    self.enabled = enabled;
  }

  fn evict_to_fit(&mut self) {
    while self.resident_bytes > self.capacity_bytes {
      let Some((key, stamp)) = self.lru.pop_front() else {
        break;
      };

      // Stale queue pairs (entry re-touched or replaced since) are
      // skipped; only the pair matching the live stamp evicts.
      let live = self
        .entries
        .get(&key)
        .map(|e| e.stamp == stamp)
        .unwrap_or(false);
      if !live {
        continue;
      }

      if let Some(evicted) = self.entries.remove(&key) {
        self.resident_bytes = self
          .resident_bytes
          .saturating_sub(evicted.payload.nbytes());
        debug!(?key, "evicted");
      }
    }
  }

  fn compact_lru(&mut self) {
    let max = self.entries.len().saturating_mul(8).max(1024);
    if self.lru.len() <= max {
      return;
    }

    let mut compacted = VecDeque::with_capacity(self.entries.len());
    let mut pairs: Vec<_> = self
      .entries
      .iter()
      .map(|(key, entry)| (key.clone(), entry.stamp))
      .collect();
    pairs.sort_by_key(|(_, stamp)| *stamp);
    compacted.extend(pairs);
    self.lru = compacted;
  }
}

fn system_memory_bytes() -> u64 {
  let mut system = sysinfo::System::new();
  system.refresh_memory();
  system.total_memory()
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
