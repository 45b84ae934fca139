//! Health-check cadence for a live tap.
//!
//! Kept free of OS calls so the counting rules can be tested directly.

use crate::EventKind;

/// Key-downs between checks while the tap is still proving itself.
pub const FAST_INTERVAL: u64 = 25;
/// Key-downs between checks once the tap has been healthy for a while.
pub const SLOW_INTERVAL: u64 = 50;
/// Consecutive healthy checks before switching to [`SLOW_INTERVAL`].
pub const DEFAULT_RAMP_THRESHOLD: u32 = 2000;

/// Running counters for the periodic health check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthCounters {
    /// Key-downs seen since the tap started.
    pub events: u64,
    /// Consecutive checks that found the tap enabled, capped at the ramp threshold.
    pub healthy: u32,
    /// Checks that found the tap disabled.
    pub recoveries: u64,
}

/// What a single event means for the health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStep {
    /// Not a check point.
    Skip,
    /// A check point; the caller must probe the tap.
    Probe,
}

impl HealthCounters {
    /// Current check interval.
    pub fn interval(&self, ramp_threshold: u32) -> u64 {
        if self.healthy >= ramp_threshold {
            SLOW_INTERVAL
        } else {
            FAST_INTERVAL
        }
    }

    /// Count an event and say whether it lands on a check point. Only
    /// key-downs are counted.
    pub fn step(&mut self, kind: EventKind, ramp_threshold: u32) -> HealthStep {
        if kind != EventKind::KeyDown {
            return HealthStep::Skip;
        }
        self.events = self.events.wrapping_add(1);
        if self.events % self.interval(ramp_threshold) != 0 {
            return HealthStep::Skip;
        }
        HealthStep::Probe
    }

    /// Record a probe result. Returns true when a recovery log line is due
    /// (the first failure and then every tenth).
    pub fn record(&mut self, enabled: bool, ramp_threshold: u32) -> bool {
        if enabled {
            self.healthy = self.healthy.saturating_add(1).min(ramp_threshold);
            return false;
        }
        self.healthy = 0;
        self.recoveries += 1;
        self.recoveries % 10 == 1
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn run_checks(c: &mut HealthCounters, n: u32, enabled: bool) {
        for _ in 0..n {
            c.record(enabled, DEFAULT_RAMP_THRESHOLD);
        }
    }

    #[test]
    fn only_key_downs_count() {
        let mut c = HealthCounters::default();
        for _ in 0..100 {
            assert_eq!(
                c.step(EventKind::KeyUp, DEFAULT_RAMP_THRESHOLD),
                HealthStep::Skip
            );
        }
        assert_eq!(c.events, 0);
    }

    #[test]
    fn probes_every_25th_key_down() {
        let mut c = HealthCounters::default();
        let probes = (0..100)
            .filter(|_| c.step(EventKind::KeyDown, DEFAULT_RAMP_THRESHOLD) == HealthStep::Probe)
            .count();
        assert_eq!(probes, 4);
    }

    #[test]
    fn interval_ramps_after_2000_healthy_checks() {
        let mut c = HealthCounters::default();
        run_checks(&mut c, 1999, true);
        assert_eq!(c.interval(DEFAULT_RAMP_THRESHOLD), 25);
        run_checks(&mut c, 1, true);
        assert_eq!(c.interval(DEFAULT_RAMP_THRESHOLD), 50);
        run_checks(&mut c, 500, true);
        assert_eq!(c.healthy, DEFAULT_RAMP_THRESHOLD);
    }

    #[test]
    fn one_failure_resets_healthy_streak() {
        let mut c = HealthCounters::default();
        run_checks(&mut c, 2000, true);
        assert!(c.record(false, DEFAULT_RAMP_THRESHOLD));
        assert_eq!(c.healthy, 0);
        assert_eq!(c.interval(DEFAULT_RAMP_THRESHOLD), 25);
    }

    #[test]
    fn recovery_logging_is_throttled() {
        let mut c = HealthCounters::default();
        let logged: Vec<bool> = (0..21)
            .map(|_| c.record(false, DEFAULT_RAMP_THRESHOLD))
            .collect();
        let idx: Vec<usize> = logged
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.then_some(i))
            .collect();
        assert_eq!(idx, vec![0, 10, 20]);
    }

    proptest! {
        #[test]
        fn healthy_never_exceeds_threshold(results in proptest::collection::vec(any::<bool>(), 0..3000)) {
            let mut c = HealthCounters::default();
            for r in results {
                c.record(r, DEFAULT_RAMP_THRESHOLD);
                prop_assert!(c.healthy <= DEFAULT_RAMP_THRESHOLD);
            }
        }
    }
}
