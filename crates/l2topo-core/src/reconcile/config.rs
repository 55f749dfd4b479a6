// ── Reconciler configuration ──

use std::time::Duration;

/// Tunables for link confirmation and eviction.
///
/// All thresholds count reconciliation cycles, not wall-clock time. The
/// cycle length only matters when the reconciler drives itself via
/// [`Reconciler::run`](super::Reconciler::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Length of one reconciliation cycle.
    pub cycle: Duration,
    /// Cycles a one-sided claim must survive uncontradicted before it is
    /// confirmed without the other side's report.
    pub grace_cycles: u32,
    /// Consecutive cycles without a supporting report after which a
    /// confirmed link, or a silent node, is evicted.
    pub stale_after_cycles: u32,
    /// Consecutive endpoint errors after which a device's node is evicted
    /// without waiting for staleness.
    pub error_threshold: u32,
    /// Create placeholder nodes for neighbors that are reported but never
    /// polled themselves.
    pub discover_neighbors: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(60),
            grace_cycles: 1,
            stale_after_cycles: 3,
            error_threshold: 3,
            discover_neighbors: false,
        }
    }
}

impl ReconcilerConfig {
    /// Clamp values that would make the state machine degenerate.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.stale_after_cycles = self.stale_after_cycles.max(1);
        self.error_threshold = self.error_threshold.max(1);
        if self.cycle.is_zero() {
            self.cycle = Duration::from_secs(1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.grace_cycles, 1);
        assert_eq!(config.stale_after_cycles, 3);
        assert_eq!(config.cycle, Duration::from_secs(60));
        assert!(!config.discover_neighbors);
    }

    #[test]
    fn normalized_clamps_zeroes() {
        let config = ReconcilerConfig {
            cycle: Duration::ZERO,
            stale_after_cycles: 0,
            error_threshold: 0,
            ..ReconcilerConfig::default()
        }
        .normalized();
        assert_eq!(config.stale_after_cycles, 1);
        assert_eq!(config.error_threshold, 1);
        assert_eq!(config.cycle, Duration::from_secs(1));
    }
}
