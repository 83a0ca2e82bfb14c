//! Coordinator metric helpers and in-memory aggregation.

use metrics::{counter, gauge, histogram};

/// Per-tick figures extracted by the caller when the barrier closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickStats {
    pub tick_id: i32,
    /// `duration_ns` of the reply that closed the barrier.
    pub last_client_duration_ns: i64,
    pub replies: i16,
    pub completions: i16,
}

/// Record a barrier closure.
pub fn record_barrier_closed(stats: &TickStats) {
    counter!("fleet_coord_ticks_completed_total").increment(1);
    gauge!("fleet_coord_last_tick_id").set(stats.tick_id as f64);
    histogram!("fleet_coord_tail_latency_ns").record(stats.last_client_duration_ns as f64);
    gauge!("fleet_coord_completed_vehicles").set(stats.completions as f64);
}

/// Record one registration (phase 1).
pub fn record_registration(index: i16, new_node: bool) {
    counter!("fleet_coord_registrations_total").increment(1);
    gauge!("fleet_coord_registered_vehicles").set((index + 1) as f64);
    if new_node {
        counter!("fleet_coord_client_nodes_total").increment(1);
    }
}

/// Record one drained batch.
pub fn record_drain_batch(len: usize, wrapped: bool) {
    counter!("fleet_coord_updates_drained_total").increment(len as u64);
    if wrapped {
        counter!("fleet_coord_drain_cycles_total").increment(1);
    }
}

/// In-memory aggregation of tick statistics for the end-of-scenario
/// summary.
#[derive(Debug, Clone, Default)]
pub struct ScenarioStatsAggregator {
    /// Ticks completed
    pub total_ticks: u64,

    /// Replies observed across all ticks
    pub total_replies: u64,

    /// Tail-latency samples (ms)
    pub tail_latency_ms: RunningStats,
}

impl ScenarioStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed tick into the aggregate.
    pub fn update(&mut self, stats: &TickStats) {
        self.total_ticks += 1;
        self.total_replies += stats.replies as u64;
        self.tail_latency_ms
            .push(stats.last_client_duration_ns as f64 / 1_000_000.0);
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(&self.tail_latency_ms)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Statistics summary of one series.
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = ScenarioStatsAggregator::new();

        aggregator.update(&TickStats {
            tick_id: 1,
            last_client_duration_ns: 2_000_000,
            replies: 3,
            completions: 0,
        });
        aggregator.update(&TickStats {
            tick_id: 2,
            last_client_duration_ns: 4_000_000,
            replies: 2,
            completions: 1,
        });

        assert_eq!(aggregator.total_ticks, 2);
        assert_eq!(aggregator.total_replies, 5);

        let summary = aggregator.summary();
        assert_eq!(summary.count, 2);
        assert!((summary.mean - 3.0).abs() < 1e-10);
    }
}
