use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
}

/// Monotonically increasing counter, optionally split into labelled series.
pub struct Counter {
    help: String,
    /// Rendered label set (`operation="create"`) → value. The unlabelled
    /// series uses the empty string.
    series: RwLock<BTreeMap<String, AtomicU64>>,
}

/// Value that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    help: String,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn render_labels(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

impl Counter {
    fn add(&self, labels: &str, val: u64) {
        if let Some(v) = read(&self.series).get(labels) {
            v.fetch_add(val, Ordering::Relaxed);
            return;
        }
        write(&self.series)
            .entry(labels.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(val, Ordering::Relaxed);
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        write(&self.counters)
            .entry(name.to_string())
            .or_insert_with(|| Counter {
                help: help.to_string(),
                series: RwLock::new(BTreeMap::new()),
            });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        write(&self.gauges)
            .entry(name.to_string())
            .or_insert_with(|| Gauge {
                value: AtomicI64::new(0),
                help: help.to_string(),
            });
    }

    /// Increment a counter by 1.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Increment a counter by a given amount.
    pub fn counter_add(&self, name: &str, val: u64) {
        if let Some(c) = read(&self.counters).get(name) {
            c.add("", val);
        }
    }

    /// Increment the labelled series of a counter by 1, creating the series on first use.
    pub fn counter_inc_with(&self, name: &str, labels: &[(&str, &str)]) {
        if let Some(c) = read(&self.counters).get(name) {
            c.add(&render_labels(labels), 1);
        }
    }

    /// Current value of a counter series. Unknown counters and series read as 0.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        read(&self.counters)
            .get(name)
            .and_then(|c| {
                read(&c.series)
                    .get(&render_labels(labels))
                    .map(|v| v.load(Ordering::Relaxed))
            })
            .unwrap_or(0)
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        if let Some(g) = read(&self.gauges).get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    /// Current value of a gauge. Unknown gauges read as 0.
    pub fn gauge_value(&self, name: &str) -> i64 {
        read(&self.gauges)
            .get(name)
            .map(|g| g.value.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        // Counters
        for (name, counter) in read(&self.counters).iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            let series = read(&counter.series);
            if series.is_empty() {
                output.push_str(&format!("{} 0\n", name));
            }
            for (labels, value) in series.iter() {
                let value = value.load(Ordering::Relaxed);
                if labels.is_empty() {
                    output.push_str(&format!("{} {}\n", name, value));
                } else {
                    output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
                }
            }
        }

        // Gauges
        for (name, gauge) in read(&self.gauges).iter() {
            output.push_str(&format!("# HELP {} {}\n", name, gauge.help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                gauge.value.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
