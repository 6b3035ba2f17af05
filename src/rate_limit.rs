//! Sliding-window rate and time gates, keyed by device or global.
//!
//! Backed by `DashMap` for concurrent per-key access (no global lock),
//! matching the accumulator pattern used elsewhere in this codebase.
//! Counters are monotonic for a fixed window: entries are only appended and
//! pruned, never rewound, so concurrent readers never observe a regression.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::{CoreError, CoreResult};

/// Per-device sliding-window counter. One instance covers one "gate"
/// (e.g. witness confirmations, or sighting creation).
#[derive(Clone)]
pub struct SlidingWindowGate {
    hits: Arc<DashMap<String, Vec<DateTime<Utc>>>>,
    window: Duration,
}

impl SlidingWindowGate {
    pub fn new(window: Duration) -> Self {
        Self { hits: Arc::new(DashMap::new()), window }
    }

    /// Record a hit for `key` at `now`, pruning entries outside the window,
    /// and return the count within the window *after* recording.
    pub fn record(&self, key: &str, now: DateTime<Utc>) -> u32 {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        entry.retain(|t| now - *t <= self.window);
        entry.push(now);
        entry.len() as u32
    }

    /// Count hits for `key` within the window as of `now`, without recording one.
    pub fn count(&self, key: &str, now: DateTime<Utc>) -> u32 {
        match self.hits.get(key) {
            Some(entry) => entry.iter().filter(|t| now - **t <= self.window).count() as u32,
            None => 0,
        }
    }

    /// Enforce `max` hits per window for `key`; records and rejects atomically
    /// from the caller's point of view (the rejected attempt is not counted).
    pub fn check_and_record(&self, key: &str, max: u32, now: DateTime<Utc>) -> CoreResult<u32> {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        entry.retain(|t| now - *t <= self.window);
        if entry.len() as u32 >= max {
            return Err(CoreError::RateLimited {
                reason: format!("{} of {} allowed in the current window", entry.len(), max),
            });
        }
        entry.push(now);
        Ok(entry.len() as u32)
    }
}

/// Global gate tracking how many sightings were created recently, used by
/// the fan-out engine to decide whether to suppress dispatch.
#[derive(Clone)]
pub struct FanoutRateGate {
    gate: SlidingWindowGate,
}

const GLOBAL_KEY: &str = "__global__";

impl FanoutRateGate {
    pub fn new() -> Self {
        Self { gate: SlidingWindowGate::new(Duration::minutes(15)) }
    }

    pub fn record_sighting(&self, now: DateTime<Utc>) -> u32 {
        self.gate.record(GLOBAL_KEY, now)
    }

    pub fn recent_count(&self, now: DateTime<Utc>) -> u32 {
        self.gate.count(GLOBAL_KEY, now)
    }

    /// True when the cap has been exceeded and fan-out should be suppressed,
    /// unless the emergency override applies.
    pub fn is_suppressed(&self, cap: u32, now: DateTime<Utc>) -> bool {
        self.recent_count(now) > cap
    }
}

impl Default for FanoutRateGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let gate = SlidingWindowGate::new(Duration::hours(1));
        let now = Utc::now();
        for _ in 0..5 {
            assert!(gate.check_and_record("dev1", 5, now).is_ok());
        }
        assert!(matches!(
            gate.check_and_record("dev1", 5, now),
            Err(CoreError::RateLimited { .. })
        ));
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let gate = SlidingWindowGate::new(Duration::minutes(10));
        let t0 = Utc::now();
        for _ in 0..5 {
            gate.check_and_record("dev1", 5, t0).unwrap();
        }
        let later = t0 + Duration::minutes(11);
        assert!(gate.check_and_record("dev1", 5, later).is_ok());
    }

    #[test]
    fn distinct_devices_have_independent_counters() {
        let gate = SlidingWindowGate::new(Duration::hours(1));
        let now = Utc::now();
        for _ in 0..5 {
            gate.check_and_record("dev1", 5, now).unwrap();
        }
        assert!(gate.check_and_record("dev2", 5, now).is_ok());
    }

    #[test]
    fn counters_never_regress_for_fixed_window() {
        let gate = SlidingWindowGate::new(Duration::hours(1));
        let now = Utc::now();
        let mut last = 0;
        for _ in 0..3 {
            let count = gate.record("dev1", now);
            assert!(count >= last);
            last = count;
        }
    }
}
