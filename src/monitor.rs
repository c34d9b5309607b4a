//! Performance monitor.
//!
//! Purely observational: records per-primitive latencies into bounded
//! reservoirs (p50/p95/p99), tracks sliding-window throughput and
//! alloc/free memory deltas, and raises threshold alerts. Nothing here
//! may block or fail a primitive — every record path is counters and a
//! short per-primitive lock, and a disabled monitor drops records on
//! the floor.

use crate::config::AlertThresholds;
use crate::primitives::PrimitiveKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

/// Bounded latency reservoir (ring buffer of recent samples).
#[derive(Debug)]
struct LatencyReservoir {
    samples: Vec<f64>,
    next: usize,
    cap: usize,
}

impl LatencyReservoir {
    fn new(cap: usize) -> Self {
        Self {
            samples: Vec::with_capacity(cap),
            next: 0,
            cap,
        }
    }

    fn record(&mut self, ms: f64) {
        if self.samples.len() < self.cap {
            self.samples.push(ms);
        } else {
            self.samples[self.next] = ms;
            self.next = (self.next + 1) % self.cap;
        }
    }

    /// Nearest-rank percentile over the retained samples.
    fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }
}

/// Latency summary for one primitive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencySummary {
    /// Total calls recorded
    pub calls: u64,
    /// Failed calls recorded
    pub failures: u64,
    /// Median latency (ms)
    pub p50: f64,
    /// 95th percentile latency (ms)
    pub p95: f64,
    /// 99th percentile latency (ms)
    pub p99: f64,
}

#[derive(Debug)]
struct PrimitiveStats {
    reservoir: Mutex<LatencyReservoir>,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl PrimitiveStats {
    fn new(reservoir_cap: usize) -> Self {
        Self {
            reservoir: Mutex::new(LatencyReservoir::new(reservoir_cap)),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// Kinds of threshold alerts the monitor raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    /// A primitive's p99 exceeded the threshold
    HighLatency,
    /// Sliding-window throughput dropped below the floor
    LowThroughput,
    /// Tracked memory crossed the ceiling
    MemoryCeiling,
    /// A resource pool reported exhaustion
    ResourceExhausted,
}

/// One raised alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// What tripped
    pub kind: AlertKind,
    /// Human-readable detail
    pub message: String,
    /// When the alert was raised
    pub timestamp: DateTime<Utc>,
}

const MAX_ALERTS: usize = 256;
const QPS_WINDOW_SECS: f64 = 10.0;
const RESERVOIR_CAP: usize = 4096;

/// The performance monitor.
///
/// Disabling the monitor turns every record call into a no-op; primitive
/// return values are identical either way.
#[derive(Debug)]
pub struct PerformanceMonitor {
    enabled: bool,
    stats: [PrimitiveStats; 5],
    /// Timestamps of recent calls for the QPS window
    window: Mutex<VecDeque<Instant>>,
    mem_allocated: AtomicU64,
    mem_freed: AtomicU64,
    mem_peak: AtomicU64,
    thresholds: AlertThresholds,
    alerts: Mutex<Vec<Alert>>,
    dropped_alerts: AtomicUsize,
}

impl PerformanceMonitor {
    /// Create an enabled monitor with the given thresholds.
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            enabled: true,
            stats: std::array::from_fn(|_| PrimitiveStats::new(RESERVOIR_CAP)),
            window: Mutex::new(VecDeque::new()),
            mem_allocated: AtomicU64::new(0),
            mem_freed: AtomicU64::new(0),
            mem_peak: AtomicU64::new(0),
            thresholds,
            alerts: Mutex::new(Vec::new()),
            dropped_alerts: AtomicUsize::new(0),
        }
    }

    /// Create a disabled monitor (all records are no-ops).
    pub fn disabled() -> Self {
        let mut monitor = Self::new(AlertThresholds::default());
        monitor.enabled = false;
        monitor
    }

    /// Whether the monitor is recording.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn index(kind: PrimitiveKind) -> usize {
        match kind {
            PrimitiveKind::Store => 0,
            PrimitiveKind::Retrieve => 1,
            PrimitiveKind::Search => 2,
            PrimitiveKind::Link => 3,
            PrimitiveKind::Transform => 4,
        }
    }

    /// Record one primitive call.
    pub fn record_call(&self, kind: PrimitiveKind, latency_ms: f64, success: bool) {
        if !self.enabled {
            return;
        }
        let stats = &self.stats[Self::index(kind)];
        stats.calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            stats.failures.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut reservoir) = stats.reservoir.lock() {
            reservoir.record(latency_ms);
        }
        if let Ok(mut window) = self.window.lock() {
            let now = Instant::now();
            window.push_back(now);
            while let Some(&front) = window.front() {
                if now.duration_since(front).as_secs_f64() > QPS_WINDOW_SECS {
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Record bytes handed out by an allocator or pool.
    pub fn record_alloc(&self, bytes: u64) {
        if !self.enabled {
            return;
        }
        let allocated = self.mem_allocated.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let freed = self.mem_freed.load(Ordering::Relaxed);
        self.mem_peak
            .fetch_max(allocated.saturating_sub(freed), Ordering::Relaxed);
    }

    /// Record bytes returned.
    pub fn record_free(&self, bytes: u64) {
        if !self.enabled {
            return;
        }
        self.mem_freed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Raise a resource-exhaustion alert (pool cap hit).
    pub fn record_exhaustion(&self, detail: &str) {
        if !self.enabled {
            return;
        }
        self.push_alert(AlertKind::ResourceExhausted, detail.to_string());
    }

    /// Latency summary for one primitive.
    pub fn summary(&self, kind: PrimitiveKind) -> LatencySummary {
        let stats = &self.stats[Self::index(kind)];
        let reservoir = stats.reservoir.lock().expect("reservoir poisoned");
        LatencySummary {
            calls: stats.calls.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            p50: reservoir.percentile(50.0),
            p95: reservoir.percentile(95.0),
            p99: reservoir.percentile(99.0),
        }
    }

    /// Calls per second over the sliding window.
    pub fn qps(&self) -> f64 {
        let window = self.window.lock().expect("window poisoned");
        window.len() as f64 / QPS_WINDOW_SECS
    }

    /// Net tracked memory in bytes.
    pub fn memory_in_use(&self) -> u64 {
        self.mem_allocated
            .load(Ordering::Relaxed)
            .saturating_sub(self.mem_freed.load(Ordering::Relaxed))
    }

    /// Peak tracked memory in bytes.
    pub fn memory_peak(&self) -> u64 {
        self.mem_peak.load(Ordering::Relaxed)
    }

    /// Evaluate thresholds, raising alerts for violations.
    ///
    /// Called from the maintenance tick; safe to call at any frequency.
    pub fn check_thresholds(&self) {
        if !self.enabled {
            return;
        }
        for kind in PrimitiveKind::ALL {
            let summary = self.summary(kind);
            if summary.calls > 0 && summary.p99 > self.thresholds.p99_ms {
                self.push_alert(
                    AlertKind::HighLatency,
                    format!(
                        "{} p99 {:.2}ms exceeds {:.2}ms",
                        kind.name(),
                        summary.p99,
                        self.thresholds.p99_ms
                    ),
                );
            }
        }

        let qps = self.qps();
        if self.thresholds.min_qps > 0.0 && qps < self.thresholds.min_qps {
            self.push_alert(
                AlertKind::LowThroughput,
                format!("throughput {:.2} qps below {:.2}", qps, self.thresholds.min_qps),
            );
        }

        let in_use_mb = self.memory_in_use() / (1024 * 1024);
        if self.thresholds.max_memory_mb > 0 && in_use_mb > self.thresholds.max_memory_mb as u64 {
            self.push_alert(
                AlertKind::MemoryCeiling,
                format!(
                    "memory {}MB exceeds ceiling {}MB",
                    in_use_mb, self.thresholds.max_memory_mb
                ),
            );
        }
    }

    fn push_alert(&self, kind: AlertKind, message: String) {
        warn!(alert = ?kind, "{message}");
        if let Ok(mut alerts) = self.alerts.lock() {
            if alerts.len() >= MAX_ALERTS {
                alerts.remove(0);
                self.dropped_alerts.fetch_add(1, Ordering::Relaxed);
            }
            alerts.push(Alert {
                kind,
                message,
                timestamp: Utc::now(),
            });
        }
    }

    /// Snapshot of raised alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Full report as a JSON value (used by the stats surface).
    pub fn report(&self) -> serde_json::Value {
        let per_primitive: serde_json::Map<String, serde_json::Value> = PrimitiveKind::ALL
            .iter()
            .map(|kind| {
                (
                    kind.name().to_string(),
                    serde_json::to_value(self.summary(*kind)).unwrap_or_default(),
                )
            })
            .collect();

        serde_json::json!({
            "enabled": self.enabled,
            "primitives": per_primitive,
            "qps": self.qps(),
            "memory": {
                "in_use_bytes": self.memory_in_use(),
                "peak_bytes": self.memory_peak(),
            },
            "alerts": self.alerts().len(),
            "alerts_dropped": self.dropped_alerts.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles_over_known_samples() {
        let monitor = PerformanceMonitor::new(AlertThresholds::default());
        for i in 1..=100 {
            monitor.record_call(PrimitiveKind::Store, i as f64, true);
        }

        let summary = monitor.summary(PrimitiveKind::Store);
        assert_eq!(summary.calls, 100);
        assert_eq!(summary.p50, 50.0);
        assert_eq!(summary.p95, 95.0);
        assert_eq!(summary.p99, 99.0);
    }

    #[test]
    fn test_failures_counted() {
        let monitor = PerformanceMonitor::new(AlertThresholds::default());
        monitor.record_call(PrimitiveKind::Search, 1.0, false);
        monitor.record_call(PrimitiveKind::Search, 1.0, true);

        let summary = monitor.summary(PrimitiveKind::Search);
        assert_eq!(summary.calls, 2);
        assert_eq!(summary.failures, 1);
    }

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = PerformanceMonitor::disabled();
        monitor.record_call(PrimitiveKind::Store, 100.0, true);
        monitor.record_alloc(1 << 30);
        monitor.check_thresholds();

        assert_eq!(monitor.summary(PrimitiveKind::Store).calls, 0);
        assert_eq!(monitor.memory_in_use(), 0);
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn test_high_latency_alert() {
        let thresholds = AlertThresholds {
            p99_ms: 5.0,
            ..AlertThresholds::default()
        };
        let monitor = PerformanceMonitor::new(thresholds);
        for _ in 0..10 {
            monitor.record_call(PrimitiveKind::Search, 50.0, true);
        }
        monitor.check_thresholds();

        let alerts = monitor.alerts();
        assert!(alerts.iter().any(|a| a.kind == AlertKind::HighLatency));
    }

    #[test]
    fn test_memory_ceiling_alert() {
        let thresholds = AlertThresholds {
            max_memory_mb: 1,
            ..AlertThresholds::default()
        };
        let monitor = PerformanceMonitor::new(thresholds);
        monitor.record_alloc(8 * 1024 * 1024);
        monitor.check_thresholds();

        assert!(monitor
            .alerts()
            .iter()
            .any(|a| a.kind == AlertKind::MemoryCeiling));
        assert_eq!(monitor.memory_peak(), 8 * 1024 * 1024);
    }

    #[test]
    fn test_memory_deltas() {
        let monitor = PerformanceMonitor::new(AlertThresholds::default());
        monitor.record_alloc(1000);
        monitor.record_free(400);
        assert_eq!(monitor.memory_in_use(), 600);
        assert_eq!(monitor.memory_peak(), 1000);
    }

    #[test]
    fn test_qps_window_counts_recent_calls() {
        let monitor = PerformanceMonitor::new(AlertThresholds::default());
        for _ in 0..50 {
            monitor.record_call(PrimitiveKind::Retrieve, 0.1, true);
        }
        assert!((monitor.qps() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_alert_list_is_bounded() {
        let monitor = PerformanceMonitor::new(AlertThresholds::default());
        for i in 0..(MAX_ALERTS + 10) {
            monitor.record_exhaustion(&format!("pool {i}"));
        }
        assert_eq!(monitor.alerts().len(), MAX_ALERTS);
    }

    #[test]
    fn test_report_shape() {
        let monitor = PerformanceMonitor::new(AlertThresholds::default());
        monitor.record_call(PrimitiveKind::Store, 1.0, true);
        let report = monitor.report();
        assert_eq!(report["enabled"], true);
        assert!(report["primitives"]["store"]["calls"].as_u64().unwrap() == 1);
    }
}
