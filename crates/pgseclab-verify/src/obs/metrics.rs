//! Verification metrics registry.
//!
//! Counter/gauge/histogram types with dynamic labels backed by `DashMap`.
//! Label sets are flattened into sorted key vectors so rendering is
//! deterministic. Histogram buckets are fixed in milliseconds; verification
//! phases run from a few ms (catalog checks) up to seconds (seeding).

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_str(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Sorted snapshot of a DashMap; iteration order of the map itself is not stable.
fn sorted<V, T>(map: &DashMap<LabelKey, V>, f: impl Fn(&V) -> T) -> Vec<(LabelKey, T)> {
    let mut rows: Vec<(LabelKey, T)> = map.iter().map(|r| (r.key().clone(), f(r.value()))).collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for (key, val) in sorted(&self.map, |c| c.load(Ordering::Relaxed)) {
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str(&key), val);
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} gauge", name);
        for (key, val) in sorted(&self.map, |g| g.load(Ordering::Relaxed)) {
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str(&key), val);
        }
    }
}

// 5ms .. 60s
const BUCKETS_MILLIS: [u64; 9] = [5, 25, 100, 250, 1_000, 2_500, 10_000, 30_000, 60_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 9],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration; buckets are cumulative.
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self.map.entry(label_key(labels)).or_default();
        let millis = duration.as_millis() as u64;

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(millis, Ordering::Relaxed);
        for (i, &b) in BUCKETS_MILLIS.iter().enumerate() {
            if millis <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} histogram", name);
        let rows = sorted(&self.map, |h| {
            (
                std::array::from_fn::<u64, 9, _>(|i| h.buckets[i].load(Ordering::Relaxed)),
                h.count.load(Ordering::Relaxed),
                h.sum.load(Ordering::Relaxed),
            )
        });
        for (key, (buckets, count, sum)) in rows {
            let labels = label_str(&key);
            let prefix = if labels.is_empty() {
                String::new()
            } else {
                format!("{labels},")
            };
            for (le, n) in BUCKETS_MILLIS.iter().zip(buckets) {
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, n);
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, count);
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, sum);
            let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, count);
        }
    }
}

/// Shared across concurrent runs of one harness.
#[derive(Default)]
pub struct VerifyMetrics {
    /// `outcome` = ok | error kind.
    pub runs: CounterVec,
    pub runs_active: GaugeVec,
    pub phase_duration: HistogramVec, // milliseconds
    /// Applied statements per `stage`.
    pub statements_applied: CounterVec,
    /// Catalog checks per `invariant` and `result`.
    pub assertions: CounterVec,
    pub teardown_failures: CounterVec,
}

impl VerifyMetrics {
    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.runs.render("pgseclab_verify_runs_total", &mut out);
        self.runs_active.render("pgseclab_verify_runs_active", &mut out);
        self.phase_duration
            .render("pgseclab_verify_phase_duration_millis", &mut out);
        self.statements_applied
            .render("pgseclab_verify_statements_applied_total", &mut out);
        self.assertions
            .render("pgseclab_verify_assertions_total", &mut out);
        self.teardown_failures
            .render("pgseclab_verify_teardown_failures_total", &mut out);
        out
    }
}
