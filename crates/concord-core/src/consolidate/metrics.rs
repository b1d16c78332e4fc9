//! Manager counters.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::ResolutionStrategy;

/// Counters kept by the consolidation manager, readable as a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerMetrics {
    /// Calls to `submit`.
    pub submitted: u64,
    /// Submissions rejected as malformed.
    pub rejected_invalid: u64,
    /// Submissions applied without coordination.
    pub applied_directly: u64,
    /// Submissions queued.
    pub queued: u64,
    /// Consolidation passes started.
    pub passes: u64,
    /// Passes that fully succeeded.
    pub consolidated: u64,
    /// Passes that failed or merged only partially.
    pub failed_passes: u64,
    /// Conflicts reported by detection.
    pub conflicts_detected: u64,
    /// Successful resolutions, by strategy.
    pub conflicts_resolved: BTreeMap<ResolutionStrategy, u64>,
    /// Locks taken (including preemptions).
    pub lock_acquisitions: u64,
    /// Locks refreshed by their holder.
    pub lock_refreshes: u64,
    /// Locks taken over from a less urgent holder.
    pub lock_preemptions: u64,
    /// Lock requests refused.
    pub lock_rejections: u64,
    /// Locks dropped because their TTL ran out.
    pub locks_expired: u64,
    /// Operations rescheduled by a deferral.
    pub deferrals: u64,
    /// Deferred operations submitted again.
    pub resubmissions: u64,
    /// Duration of the most recent pass, in microseconds.
    pub last_pass_us: u64,
    /// Total duration of all passes, in microseconds.
    pub total_pass_us: u64,
}

impl ManagerMetrics {
    pub(crate) fn record_resolution(&mut self, strategy: ResolutionStrategy) {
        *self.conflicts_resolved.entry(strategy).or_default() += 1;
    }

    pub(crate) fn record_pass(&mut self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.last_pass_us = us;
        self.total_pass_us = self.total_pass_us.saturating_add(us);
    }

    /// Successful resolutions across all strategies.
    #[must_use]
    pub fn total_resolved(&self) -> u64 {
        self.conflicts_resolved.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolutions_are_counted_per_strategy() {
        let mut m = ManagerMetrics::default();
        m.record_resolution(ResolutionStrategy::PriorityWins);
        m.record_resolution(ResolutionStrategy::PriorityWins);
        m.record_resolution(ResolutionStrategy::DeferOperation);
        assert_eq!(m.conflicts_resolved[&ResolutionStrategy::PriorityWins], 2);
        assert_eq!(m.total_resolved(), 3);
    }

    #[test]
    fn pass_durations_accumulate() {
        let mut m = ManagerMetrics::default();
        m.record_pass(Duration::from_micros(40));
        m.record_pass(Duration::from_micros(60));
        assert_eq!(m.last_pass_us, 60);
        assert_eq!(m.total_pass_us, 100);
    }
}
