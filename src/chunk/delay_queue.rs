//! DelayQueue - holds requests briefly before pool submission.
//!
//! During a fast slider drag or pan, most requests become stale within
//! tens of milliseconds. A worker that has started cannot be stopped, but
//! a request still sitting here is trivially cancellable. With a small
//! delay, churned requests die in the queue and only the ones the user
//! actually paused on reach a worker.
//!
//! Unlike a timer-thread design, due entries are drained by the
//! orchestration thread during its per-tick outcome drain, so the queue
//! needs no locking at all.

use std::time::Duration;

use web_time::Instant;

use super::request::{ChunkKey, ChunkRequest, LayerId};

struct QueueEntry {
  request: ChunkRequest,
  due_at: Instant,
}

/// FIFO of not-yet-submitted requests, each with a due time.
pub struct DelayQueue {
  delay: Duration,
  entries: Vec<QueueEntry>,
}

impl DelayQueue {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      entries: Vec::new(),
    }
  }

  #[inline]
  pub fn delay(&self) -> Duration {
    self.delay
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Queue a request; it becomes due `delay` from now.
  pub fn add(&mut self, request: ChunkRequest, now: Instant) {
    self.entries.push(QueueEntry {
      request,
      due_at: now + self.delay,
    });
  }

  /// Remove and return every request whose delay has elapsed.
  pub fn drain_due(&mut self, now: Instant) -> Vec<ChunkRequest> {
    let entries = std::mem::take(&mut self.entries);
    let mut due = Vec::new();
    for entry in entries {
      if entry.due_at <= now {
        due.push(entry.request);
      } else {
        self.entries.push(entry);
      }
    }
    due
  }

  /// Drop the entry for this key. Returns true if one was queued.
  pub fn cancel_key(&mut self, key: &ChunkKey) -> bool {
    let before = self.entries.len();
    self.entries.retain(|entry| &entry.request.key != key);
    self.entries.len() != before
  }

  /// Drop every entry belonging to this layer. Returns how many died.
  pub fn cancel_layer(&mut self, layer_id: LayerId) -> usize {
    let before = self.entries.len();
    self.entries.retain(|entry| entry.request.key.layer_id != layer_id);
    before - self.entries.len()
  }
}

#[cfg(test)]
#[path = "delay_queue_test.rs"]
mod delay_queue_test;
