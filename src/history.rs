//! Bounded, time-ordered history buffers for live charting.
//!
//! Each charted quantity gets one [`HistoryBuffer`]: a fixed-capacity FIFO
//! of `(time, value)` pairs. Capacity is derived from the charting window
//! and the poll interval rather than configured on its own, so the buffer
//! always holds roughly one window's worth of points.
//!
//! Buffers are shared-read/single-writer: the acquisition worker appends,
//! the chart redraw driver takes [`HistoryBuffer::points`] copies on its
//! own (coarser) cadence, and neither blocks the other for more than a
//! short lock hold.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// A fixed-capacity, insertion-ordered sequence of `(time, value)` pairs.
///
/// Oldest entries are evicted first once the buffer is full. Cloning the
/// handle is cheap; clones share the same underlying buffer.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    inner: Arc<RwLock<VecDeque<(f64, f64)>>>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` points (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Create a buffer sized to cover `window` at one point per `interval`.
    ///
    /// Capacity = ceil(window / interval), minimum 1.
    pub fn for_window(window: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let capacity = window.as_millis().div_ceil(interval_ms);
        Self::with_capacity(capacity as usize)
    }

    /// Append one point, evicting the oldest when full.
    pub fn append(&self, time_s: f64, value: f64) {
        let mut buf = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back((time_s, value));
    }

    /// Copy-on-read view of the buffered points, oldest first.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Drop all buffered points. Explicit operator action; appends continue
    /// normally afterwards.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of points currently buffered.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the buffer holds no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of points this buffer will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The set of history buffers fed by the acquisition loop, one per
/// charted quantity.
#[derive(Debug, Clone)]
pub struct ChartHistory {
    /// Probe temperature history.
    pub temp_a: HistoryBuffer,
    /// Ambient-sensor temperature history.
    pub temp_b: HistoryBuffer,
    /// Relative-humidity history.
    pub humidity: HistoryBuffer,
}

impl ChartHistory {
    /// Create all buffers sized for `window` at one point per `interval`.
    pub fn new(window: Duration, interval: Duration) -> Self {
        Self {
            temp_a: HistoryBuffer::for_window(window, interval),
            temp_b: HistoryBuffer::for_window(window, interval),
            humidity: HistoryBuffer::for_window(window, interval),
        }
    }

    /// Append one cycle's readings to every buffer.
    pub fn append(&self, time_s: f64, temp_a: f64, temp_b: f64, humidity: f64) {
        self.temp_a.append(time_s, temp_a);
        self.temp_b.append(time_s, temp_b);
        self.humidity.append(time_s, humidity);
    }

    /// Clear all buffers.
    pub fn clear(&self) {
        self.temp_a.clear();
        self.temp_b.clear();
        self.humidity.clear();
    }
}
