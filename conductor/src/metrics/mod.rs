//! Metrics sink: operation timings, error rates, counters, domain metrics.
//!
//! Aggregates are process-wide and read-mostly; `reset()` is the test
//! lifecycle hook. Breaker states are pulled from the breaker manager at
//! snapshot time rather than duplicated here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::breaker::{circuit_breaker_manager, BreakerSnapshot};

#[derive(Default)]
struct OperationStats {
    count: u64,
    errors: u64,
    durations_ms: Vec<f64>,
}

/// Aggregated view of one operation.
#[derive(Clone, Debug, Serialize)]
pub struct OperationSummary {
    pub count: u64,
    pub error_rate: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Domain-level aggregates.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DomainMetrics {
    pub creator_evaluations: u64,
    pub creator_avg_score: f64,
    pub creator_accept_rate: f64,
    pub mission_requests: u64,
    pub mission_avg_recommendations: f64,
}

/// Full point-in-time snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub operations: HashMap<String, OperationSummary>,
    pub counters: HashMap<String, u64>,
    pub domain: DomainMetrics,
    pub breakers: Vec<BreakerSnapshot>,
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Process-wide metrics collector.
pub struct MetricsCollector {
    operations: Mutex<HashMap<String, OperationStats>>,
    counters: DashMap<String, u64>,
    creator_total: AtomicU64,
    creator_accepted: AtomicU64,
    creator_scores: Mutex<Vec<f64>>,
    mission_requests: AtomicU64,
    mission_recommendations: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            counters: DashMap::new(),
            creator_total: AtomicU64::new(0),
            creator_accepted: AtomicU64::new(0),
            creator_scores: Mutex::new(Vec::new()),
            mission_requests: AtomicU64::new(0),
            mission_recommendations: AtomicU64::new(0),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one operation execution.
    pub fn record_operation(&self, name: &str, duration_ms: f64, ok: bool) {
        if let Ok(mut ops) = self.operations.lock() {
            let stats = ops.entry(name.to_string()).or_default();
            stats.count += 1;
            if !ok {
                stats.errors += 1;
            }
            stats.durations_ms.push(duration_ms);
        }
    }

    pub fn increment(&self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_creator_evaluation(&self, score: f64, accepted: bool) {
        self.creator_total.fetch_add(1, Ordering::Relaxed);
        if accepted {
            self.creator_accepted.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut scores) = self.creator_scores.lock() {
            scores.push(score);
        }
    }

    pub fn record_mission_recommendations(&self, count: usize) {
        self.mission_requests.fetch_add(1, Ordering::Relaxed);
        self.mission_recommendations
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self
            .operations
            .lock()
            .map(|ops| {
                ops.iter()
                    .map(|(name, stats)| {
                        let mut sorted = stats.durations_ms.clone();
                        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                        let sum: f64 = sorted.iter().sum();
                        let summary = OperationSummary {
                            count: stats.count,
                            error_rate: if stats.count == 0 {
                                0.0
                            } else {
                                stats.errors as f64 / stats.count as f64
                            },
                            avg_ms: if sorted.is_empty() {
                                0.0
                            } else {
                                sum / sorted.len() as f64
                            },
                            min_ms: sorted.first().copied().unwrap_or(0.0),
                            max_ms: sorted.last().copied().unwrap_or(0.0),
                            p95_ms: percentile(&sorted, 95.0),
                            p99_ms: percentile(&sorted, 99.0),
                        };
                        (name.clone(), summary)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let counters = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();

        let creator_total = self.creator_total.load(Ordering::Relaxed);
        let creator_accepted = self.creator_accepted.load(Ordering::Relaxed);
        let creator_avg_score = self
            .creator_scores
            .lock()
            .map(|scores| {
                if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                }
            })
            .unwrap_or(0.0);
        let mission_requests = self.mission_requests.load(Ordering::Relaxed);
        let mission_total = self.mission_recommendations.load(Ordering::Relaxed);

        MetricsSnapshot {
            operations,
            counters,
            domain: DomainMetrics {
                creator_evaluations: creator_total,
                creator_avg_score,
                creator_accept_rate: if creator_total == 0 {
                    0.0
                } else {
                    creator_accepted as f64 / creator_total as f64
                },
                mission_requests,
                mission_avg_recommendations: if mission_requests == 0 {
                    0.0
                } else {
                    mission_total as f64 / mission_requests as f64
                },
            },
            breakers: circuit_breaker_manager().status_all(),
        }
    }

    /// Clears every aggregate. Test lifecycle.
    pub fn reset(&self) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.clear();
        }
        self.counters.clear();
        self.creator_total.store(0, Ordering::Relaxed);
        self.creator_accepted.store(0, Ordering::Relaxed);
        if let Ok(mut scores) = self.creator_scores.lock() {
            scores.clear();
        }
        self.mission_requests.store(0, Ordering::Relaxed);
        self.mission_recommendations.store(0, Ordering::Relaxed);
    }
}

static COLLECTOR: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// The process-wide metrics collector.
pub fn metrics_collector() -> &'static MetricsCollector {
    &COLLECTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: operation summaries expose avg/min/max/p95/p99 and the
    /// error rate.
    #[test]
    fn operation_summary_statistics() {
        let m = MetricsCollector::new();
        for i in 1..=100 {
            m.record_operation("rag_query", f64::from(i), i % 10 != 0);
        }
        let snap = m.snapshot();
        let op = snap.operations.get("rag_query").unwrap();
        assert_eq!(op.count, 100);
        assert!((op.error_rate - 0.1).abs() < 1e-9);
        assert!((op.min_ms - 1.0).abs() < 1e-9);
        assert!((op.max_ms - 100.0).abs() < 1e-9);
        assert!((op.p95_ms - 95.0).abs() < 1e-9);
        assert!((op.p99_ms - 99.0).abs() < 1e-9);
        assert!((op.avg_ms - 50.5).abs() < 1e-9);
    }

    /// **Scenario**: domain metrics aggregate creator and mission activity.
    #[test]
    fn domain_metrics_aggregate() {
        let m = MetricsCollector::new();
        m.record_creator_evaluation(80.0, true);
        m.record_creator_evaluation(40.0, false);
        m.record_mission_recommendations(3);
        m.record_mission_recommendations(1);
        let snap = m.snapshot();
        assert_eq!(snap.domain.creator_evaluations, 2);
        assert!((snap.domain.creator_avg_score - 60.0).abs() < 1e-9);
        assert!((snap.domain.creator_accept_rate - 0.5).abs() < 1e-9);
        assert!((snap.domain.mission_avg_recommendations - 2.0).abs() < 1e-9);
    }

    /// **Scenario**: reset clears all aggregates.
    #[test]
    fn reset_clears_everything() {
        let m = MetricsCollector::new();
        m.record_operation("x", 1.0, true);
        m.increment("c");
        m.reset();
        let snap = m.snapshot();
        assert!(snap.operations.is_empty());
        assert!(snap.counters.is_empty());
        assert_eq!(snap.domain.creator_evaluations, 0);
    }
}
