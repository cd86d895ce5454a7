//! Per-layer load statistics.
//!
//! A rolling window of recent load times drives the auto load policy:
//! layers that have been loading fast get loaded synchronously, since a
//! thread hop costs more than the load itself.

/// Average over a fixed-size rolling window.
///
/// Values are overwritten circularly once the window fills, so inserts
/// stay O(1) forever.
#[derive(Clone, Debug)]
pub struct StatWindow {
  size: usize,
  values: Vec<f64>,
  index: usize,
}

impl StatWindow {
  pub fn new(size: usize) -> Self {
    Self {
      size,
      values: Vec::with_capacity(size),
      index: 0,
    }
  }

  pub fn add(&mut self, value: f64) {
    if self.values.len() < self.size {
      self.values.push(value);
    } else {
      self.values[self.index] = value;
      self.index = (self.index + 1) % self.size;
    }
  }

  pub fn average(&self) -> Option<f64> {
    if self.values.is_empty() {
      return None;
    }
    Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
  }
}

/// Statistics about loads for one layer.
#[derive(Clone, Debug)]
pub struct LoadStats {
  window_ms: StatWindow,
  loads: usize,
  sync_loads: usize,
}

/// Window size for the rolling load-time average.
const WINDOW_SIZE: usize = 10;

impl LoadStats {
  pub fn new() -> Self {
    Self {
      window_ms: StatWindow::new(WINDOW_SIZE),
      loads: 0,
      sync_loads: 0,
    }
  }

  /// Record one finished load.
  pub fn on_load_finished(&mut self, load_ms: f64, sync: bool) {
    self.window_ms.add(load_ms);
    self.loads += 1;
    if sync {
      self.sync_loads += 1;
    }
  }

  /// Rolling average load time, if any loads finished yet.
  pub fn average_ms(&self) -> Option<f64> {
    self.window_ms.average()
  }

  /// True if recent loads have been at or under the threshold.
  pub fn loads_fast(&self, threshold_ms: f64) -> bool {
    self
      .average_ms()
      .map(|avg| avg <= threshold_ms)
      .unwrap_or(false)
  }

  pub fn loads(&self) -> usize {
    self.loads
  }

  pub fn sync_loads(&self) -> usize {
    self.sync_loads
  }
}

impl Default for LoadStats {
  fn default() -> Self {
    Self::new()
  }
}
