use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use worldgrid_common::RegionHandle;

/// Consecutive-failure counters per destination region.
///
/// Counters only grow on failure and only return to zero on an explicit
/// liveness signal; a successful call to a region does not reset it.
/// Entries are never removed, so the table is bounded by the number of
/// distinct regions ever contacted.
#[derive(Debug, Default)]
pub struct FailureTracker {
    counts: Mutex<HashMap<RegionHandle, u32>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more failure and return the new count.
    pub fn note_failure(&self, handle: RegionHandle) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(handle).or_insert(0);
        *count = count.saturating_add(1);
        debug!(%handle, failures = *count, "noted failure");
        *count
    }

    pub fn reset(&self, handle: RegionHandle) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(&handle) {
            if *count > 0 {
                debug!(%handle, failures = *count, "failure count reset");
            }
            *count = 0;
        }
    }

    pub fn failures(&self, handle: RegionHandle) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    /// True once the destination has failed more than `threshold` times in a
    /// row. A `None` threshold never suppresses.
    pub fn should_short_circuit(&self, handle: RegionHandle, threshold: Option<u32>) -> bool {
        threshold.is_some_and(|limit| self.failures(handle) > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h() -> RegionHandle {
        RegionHandle::from_location(1000, 1000)
    }

    #[test]
    fn counts_accumulate_per_destination() {
        let t = FailureTracker::new();
        assert_eq!(t.failures(h()), 0);
        assert_eq!(t.note_failure(h()), 1);
        assert_eq!(t.note_failure(h()), 2);
        assert_eq!(t.failures(RegionHandle::from_location(1, 1)), 0);
    }

    #[test]
    fn threshold_is_exceeded_not_reached() {
        let t = FailureTracker::new();
        for _ in 0..3 {
            t.note_failure(h());
        }
        assert!(!t.should_short_circuit(h(), Some(3)));
        t.note_failure(h());
        assert!(t.should_short_circuit(h(), Some(3)));
        assert!(t.should_short_circuit(h(), Some(1)));
        assert!(!t.should_short_circuit(h(), None));
    }

    #[test]
    fn reset_reopens_the_destination() {
        let t = FailureTracker::new();
        t.note_failure(h());
        t.note_failure(h());
        assert!(t.should_short_circuit(h(), Some(1)));
        t.reset(h());
        assert_eq!(t.failures(h()), 0);
        assert!(!t.should_short_circuit(h(), Some(1)));
    }

    #[test]
    fn reset_of_unknown_handle_is_harmless() {
        let t = FailureTracker::new();
        t.reset(h());
        assert_eq!(t.failures(h()), 0);
    }

    #[test]
    fn concurrent_failures_are_all_counted() {
        let t = FailureTracker::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        t.note_failure(h());
                    }
                });
            }
        });
        assert_eq!(t.failures(h()), 800);
    }
}
