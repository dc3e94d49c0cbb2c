//! Circular window buffer
//!
//! One fixed-capacity ring per stream. Two independent bounds apply:
//! capacity (count) and an optional retention period (age). Aged-out and
//! overwritten points disappear silently.

use super::types::DataPoint;
use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Interface shared by bounded per-stream windows.
pub trait RollingWindow {
    /// Append a point, evicting whatever the bounds require
    fn push(&mut self, point: DataPoint, now_ms: i64);

    /// Remove points older than the cutoff from the head
    fn evict_before(&mut self, cutoff_ms: i64);

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSettings {
    pub capacity: usize,
    /// `None` means no age bound
    pub retention_period_ms: Option<u64>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            retention_period_ms: Some(3_600_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub size: usize,
    pub capacity: usize,
    /// Timestamp of the oldest point by arrival order
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// Fixed-capacity ring of data points in arrival order.
#[derive(Debug, Clone)]
pub struct CircularWindow {
    slots: Vec<Option<DataPoint>>,
    head: usize,
    len: usize,
    retention_period_ms: Option<u64>,
}

impl CircularWindow {
    pub fn new(settings: WindowSettings) -> Self {
        let capacity = settings.capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
            retention_period_ms: settings.retention_period_ms.filter(|ms| *ms > 0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, offset: usize) -> Option<&DataPoint> {
        self.slots[(self.head + offset) % self.capacity()].as_ref()
    }

    fn pop_front(&mut self) {
        self.slots[self.head] = None;
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
    }

    /// Ordered copy of the window, oldest arrival first.
    pub fn snapshot(&self) -> Vec<DataPoint> {
        (0..self.len).filter_map(|i| self.slot(i).cloned()).collect()
    }

    pub fn metrics(&self) -> WindowMetrics {
        WindowMetrics {
            size: self.len,
            capacity: self.capacity(),
            oldest_timestamp: if self.len > 0 {
                self.slot(0).map(|p| p.timestamp)
            } else {
                None
            },
            newest_timestamp: if self.len > 0 {
                self.slot(self.len - 1).map(|p| p.timestamp)
            } else {
                None
            },
        }
    }
}

impl RollingWindow for CircularWindow {
    fn push(&mut self, point: DataPoint, now_ms: i64) {
        if let Some(retention) = self.retention_period_ms {
            self.evict_before(now_ms.saturating_sub(retention as i64));
        }

        if self.len == self.capacity() {
            // Overwrite the oldest slot
            self.pop_front();
        }

        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(point);
        self.len += 1;
    }

    fn evict_before(&mut self, cutoff_ms: i64) {
        while self.len > 0 {
            match self.slot(0) {
                Some(p) if p.timestamp < cutoff_ms => self.pop_front(),
                _ => break,
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Per-stream windows behind one tightly scoped lock.
///
/// Readers take copies via [`WindowBuffer::snapshot`] and analyze them
/// without holding the lock.
pub struct WindowBuffer {
    windows: Mutex<HashMap<String, CircularWindow>>,
    settings: WindowSettings,
    clock: Clock,
}

impl WindowBuffer {
    pub fn new(settings: WindowSettings, clock: Clock) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            settings,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CircularWindow>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn settings(&self) -> WindowSettings {
        self.settings
    }

    pub fn push(&self, stream_id: &str, point: DataPoint) {
        let now = (self.clock)();
        let mut windows = self.lock();
        match windows.get_mut(stream_id) {
            Some(window) => window.push(point, now),
            None => {
                let mut window = CircularWindow::new(self.settings);
                window.push(point, now);
                windows.insert(stream_id.to_string(), window);
            }
        }
    }

    /// Ordered copy of a stream's window. Unknown streams yield an empty vec.
    pub fn snapshot(&self, stream_id: &str) -> Vec<DataPoint> {
        self.lock()
            .get(stream_id)
            .map(CircularWindow::snapshot)
            .unwrap_or_default()
    }

    pub fn metrics(&self, stream_id: &str) -> Option<WindowMetrics> {
        self.lock().get(stream_id).map(CircularWindow::metrics)
    }

    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self, stream_id: &str) -> usize {
        self.lock().get(stream_id).map_or(0, |w| w.len())
    }
}

impl std::fmt::Debug for WindowBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowBuffer")
            .field("settings", &self.settings)
            .field("streams", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pipeline::types::values_of;

    fn make_test_window(capacity: usize, retention_period_ms: Option<u64>) -> CircularWindow {
        CircularWindow::new(WindowSettings {
            capacity,
            retention_period_ms,
        })
    }

    #[test]
    fn test_push_below_capacity_keeps_order() {
        let mut window = make_test_window(4, None);
        for (i, v) in [3.0, 1.0, 2.0].into_iter().enumerate() {
            window.push(DataPoint::new(i as i64 + 1, v), 0);
        }
        assert_eq!(values_of(&window.snapshot()), vec![3.0, 1.0, 2.0]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_full_window_drops_exactly_oldest() {
        let mut window = make_test_window(3, None);
        for i in 1..=10 {
            window.push(DataPoint::new(i, i as f64), 0);
            assert!(window.len() <= 3);
            if i >= 3 {
                assert_eq!(window.len(), 3);
                let expected: Vec<f64> = ((i - 2)..=i).map(|v| v as f64).collect();
                assert_eq!(values_of(&window.snapshot()), expected);
            }
        }
    }

    #[test]
    fn test_arrival_order_not_timestamp_order() {
        let mut window = make_test_window(2, None);
        window.push(DataPoint::new(50, 1.0), 0);
        window.push(DataPoint::new(10, 2.0), 0);
        window.push(DataPoint::new(30, 3.0), 0);

        // Oldest *arrival* (ts 50) went first, even though ts 10 is older
        assert_eq!(values_of(&window.snapshot()), vec![2.0, 3.0]);
        let m = window.metrics();
        assert_eq!(m.oldest_timestamp, Some(10));
        assert_eq!(m.newest_timestamp, Some(30));
    }

    #[test]
    fn test_retention_drops_aged_points_before_capacity() {
        let mut window = make_test_window(100, Some(1_000));
        window.push(DataPoint::new(1_000, 1.0), 1_000);
        window.push(DataPoint::new(1_500, 2.0), 1_500);
        window.push(DataPoint::new(2_600, 3.0), 2_600);

        // cutoff 1_600 evicts both earlier points
        assert_eq!(values_of(&window.snapshot()), vec![3.0]);
    }

    #[test]
    fn test_zero_retention_means_unbounded() {
        let mut window = make_test_window(10, Some(0));
        window.push(DataPoint::new(1, 1.0), 1_000_000);
        window.push(DataPoint::new(2, 2.0), 2_000_000);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_buffer_streams_are_independent() {
        let clock = ManualClock::new(10_000);
        let buffer = WindowBuffer::new(
            WindowSettings {
                capacity: 2,
                retention_period_ms: None,
            },
            clock.as_clock(),
        );

        buffer.push("a", DataPoint::new(1, 1.0));
        buffer.push("a", DataPoint::new(2, 2.0));
        buffer.push("a", DataPoint::new(3, 3.0));
        buffer.push("b", DataPoint::new(1, 9.0));

        assert_eq!(values_of(&buffer.snapshot("a")), vec![2.0, 3.0]);
        assert_eq!(values_of(&buffer.snapshot("b")), vec![9.0]);
        assert!(buffer.snapshot("missing").is_empty());
        assert_eq!(buffer.stream_ids(), vec!["a".to_string(), "b".to_string()]);

        let metrics = buffer.metrics("a").unwrap();
        assert_eq!(metrics.size, 2);
        assert_eq!(metrics.capacity, 2);
        assert!(buffer.metrics("missing").is_none());
    }

    #[test]
    fn test_buffer_uses_injected_clock_for_retention() {
        let clock = ManualClock::new(5_000);
        let buffer = WindowBuffer::new(
            WindowSettings {
                capacity: 10,
                retention_period_ms: Some(1_000),
            },
            clock.as_clock(),
        );

        buffer.push("s", DataPoint::new(4_900, 1.0));
        clock.advance(2_000);
        buffer.push("s", DataPoint::new(6_900, 2.0));

        assert_eq!(values_of(&buffer.snapshot("s")), vec![2.0]);
    }
}
