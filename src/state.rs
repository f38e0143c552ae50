//! The shared device-state snapshot.
//!
//! [`ChamberState`] mirrors the most recently parsed readings of the
//! chamber microcontroller plus the valve-control configuration. There is
//! one logical instance per connection, owned behind a [`StateHandle`].
//!
//! # Consistency
//!
//! The acquisition worker is the only writer of the reading fields, and it
//! replaces them wholesale per accepted poll cycle under a single write-lock
//! acquisition. Readers take [`StateHandle::snapshot`] copies, so they can
//! never observe a mix of two cycles' fields. The two control fields
//! (threshold and valve mode) are written by the operator path under the
//! same lock, which keeps every snapshot internally consistent.

use std::sync::{Arc, PoisonError, RwLock};

/// Default humidity threshold in percent, used until the device reports
/// one and as the fallback for invalid operator input.
pub const DEFAULT_HUMIDITY_THRESHOLD: f64 = 50.0;

/// Last known condition of the chamber device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChamberState {
    /// Local monotonic time of the poll that produced these readings,
    /// in seconds since acquisition start. The device's own clock is
    /// advisory only and never stored here.
    pub time_s: f64,
    /// Probe temperature in degrees Celsius (`NaN` until first reading).
    pub temp_a: f64,
    /// Ambient-sensor temperature in degrees Celsius (`NaN` until first reading).
    pub temp_b: f64,
    /// Relative humidity in percent (`NaN` until first reading).
    pub humidity: f64,
    /// Whether the solenoid valve is currently open.
    pub valve_open: bool,
    /// Humidity threshold for automatic valve control, percent, in [0, 100].
    pub humidity_threshold: f64,
    /// Valve mode: open when humidity is above (`true`) or below (`false`)
    /// the threshold.
    pub open_when_above_threshold: bool,
}

impl Default for ChamberState {
    fn default() -> Self {
        Self {
            time_s: f64::NAN,
            temp_a: f64::NAN,
            temp_b: f64::NAN,
            humidity: f64::NAN,
            valve_open: false,
            humidity_threshold: DEFAULT_HUMIDITY_THRESHOLD,
            open_when_above_threshold: false,
        }
    }
}

/// One fully parsed poll reply, timestamped with the local monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Seconds since acquisition start, local monotonic clock.
    pub time_s: f64,
    /// Probe temperature, degrees Celsius.
    pub temp_a: f64,
    /// Ambient-sensor temperature, degrees Celsius.
    pub temp_b: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Valve flag.
    pub valve_open: bool,
}

/// Clamp an operator- or device-supplied humidity threshold to [0, 100].
///
/// Non-finite input falls back to [`DEFAULT_HUMIDITY_THRESHOLD`] rather
/// than propagating, matching the operator-input recovery policy.
pub fn clamp_threshold(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        DEFAULT_HUMIDITY_THRESHOLD
    }
}

/// Shared-read/single-writer accessor for the state snapshot.
///
/// Cloning the handle is cheap; all clones refer to the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<ChamberState>>,
}

impl StateHandle {
    /// Create a handle holding the startup defaults (`NaN` readings).
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy-on-read snapshot of the current state.
    pub fn snapshot(&self) -> ChamberState {
        *self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace all reading fields from one accepted poll cycle.
    ///
    /// All five fields change under a single lock acquisition; a reader
    /// either sees the previous cycle or this one, never a mix.
    pub fn apply_reading(&self, reading: Reading) {
        let mut state = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        state.time_s = reading.time_s;
        state.temp_a = reading.temp_a;
        state.temp_b = reading.temp_b;
        state.humidity = reading.humidity;
        state.valve_open = reading.valve_open;
    }

    /// Set the humidity threshold, clamped to [0, 100]. Returns the value
    /// actually stored.
    pub fn set_humidity_threshold(&self, value: f64) -> f64 {
        let clamped = clamp_threshold(value);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .humidity_threshold = clamped;
        clamped
    }

    /// Set the valve-control mode flag.
    pub fn set_valve_mode(&self, open_when_above: bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .open_when_above_threshold = open_when_above;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_defaults() {
        let state = StateHandle::new().snapshot();
        assert!(state.time_s.is_nan());
        assert!(state.temp_a.is_nan());
        assert!(state.temp_b.is_nan());
        assert!(state.humidity.is_nan());
        assert!(!state.valve_open);
        assert_eq!(state.humidity_threshold, DEFAULT_HUMIDITY_THRESHOLD);
        assert!(!state.open_when_above_threshold);
    }

    #[test]
    fn threshold_clamp_table() {
        let handle = StateHandle::new();
        let cases = [
            (-10.0, 0.0),
            (0.0, 0.0),
            (50.0, 50.0),
            (100.0, 100.0),
            (150.0, 100.0),
        ];
        for (input, expected) in cases {
            assert_eq!(handle.set_humidity_threshold(input), expected);
            assert_eq!(handle.snapshot().humidity_threshold, expected);
        }
    }

    #[test]
    fn non_finite_threshold_falls_back_to_default() {
        assert_eq!(clamp_threshold(f64::NAN), DEFAULT_HUMIDITY_THRESHOLD);
        assert_eq!(clamp_threshold(f64::INFINITY), DEFAULT_HUMIDITY_THRESHOLD);
    }

    #[test]
    fn apply_reading_replaces_all_reading_fields() {
        let handle = StateHandle::new();
        handle.set_humidity_threshold(60.0);
        handle.set_valve_mode(true);

        handle.apply_reading(Reading {
            time_s: 1.0,
            temp_a: 21.5,
            temp_b: 22.0,
            humidity: 45.3,
            valve_open: true,
        });

        let state = handle.snapshot();
        assert_eq!(state.time_s, 1.0);
        assert_eq!(state.temp_a, 21.5);
        assert_eq!(state.temp_b, 22.0);
        assert_eq!(state.humidity, 45.3);
        assert!(state.valve_open);
        // Control fields survive reading updates untouched.
        assert_eq!(state.humidity_threshold, 60.0);
        assert!(state.open_when_above_threshold);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let handle = StateHandle::new();
        let before = handle.snapshot();
        handle.apply_reading(Reading {
            time_s: 2.0,
            temp_a: 20.0,
            temp_b: 20.0,
            humidity: 50.0,
            valve_open: false,
        });
        // The previously taken copy is unaffected by later writes.
        assert!(before.temp_a.is_nan());
        assert_eq!(handle.snapshot().temp_a, 20.0);
    }

    #[test]
    fn concurrent_readers_never_see_torn_cycles() {
        // Writer alternates between two internally consistent cycles; any
        // snapshot must match one of them exactly on the reading fields.
        let handle = StateHandle::new();
        let writer = handle.clone();
        let t = std::thread::spawn(move || {
            for i in 0..1000u32 {
                let v = f64::from(i % 2);
                writer.apply_reading(Reading {
                    time_s: v,
                    temp_a: v,
                    temp_b: v,
                    humidity: v,
                    valve_open: i % 2 == 1,
                });
            }
        });

        for _ in 0..1000 {
            let s = handle.snapshot();
            if s.time_s.is_nan() {
                continue; // before the first write
            }
            assert_eq!(s.time_s, s.temp_a);
            assert_eq!(s.temp_a, s.temp_b);
            assert_eq!(s.temp_b, s.humidity);
            assert_eq!(s.valve_open, s.time_s == 1.0);
        }
        t.join().unwrap();
    }
}
