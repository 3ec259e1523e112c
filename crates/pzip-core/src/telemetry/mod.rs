//! In-process metrics for the encoding pipeline.
//!
//! Every subsystem reports through the free functions below. With the
//! `telemetry` feature they land in a process-wide registry that can be
//! snapshotted (for reports and tests); without it they compile to nothing.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod memory;
pub mod profile;
pub mod report;
pub mod tags;
pub mod worker;

pub use memory::ProcessMemorySample;
pub use report::{EncodeReport, ReportExport, ReportValue, WorkerReport};

/// Histogram summary captured in telemetry snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    /// Number of samples recorded.
    pub count: u64,
    /// Sum of every sample, saturating at `u64::MAX`.
    pub total: u64,
    /// Smallest sample seen.
    pub min: u64,
    /// Largest sample seen.
    pub max: u64,
    /// Mean sample value, zero when nothing was recorded.
    pub mean: f64,
}

/// Point-in-time copy of every counter, gauge and histogram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Counter values keyed by metric name.
    pub counters: BTreeMap<String, u64>,
    /// Current gauge values keyed by metric name.
    pub gauges: BTreeMap<String, u64>,
    /// Histogram summaries keyed by metric name.
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    /// Value of the counter `name`, if it was ever incremented.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    /// Value of the gauge `name`, if it was ever set.
    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    /// Summary of the histogram `name`, if it has any samples.
    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Increments a named counter by `value`.
///
/// Labels are accepted for call-site documentation; the registry keys on the name only.
#[inline]
pub fn increment_counter(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        let entry = store.counters.entry(name).or_insert(0);
        *entry = entry.saturating_add(value);
    });

    let _ = (name, value);
}

/// Records a histogram sample.
#[inline]
pub fn record_histogram(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| store.histograms.entry(name).or_default().record(value));

    let _ = (name, value);
}

/// Records a duration sample in microseconds.
#[inline]
pub fn record_duration_us(name: &'static str, elapsed: Duration, labels: &[(&str, &str)]) {
    record_histogram(name, crate::types::duration_to_us(elapsed), labels);
}

/// Sets a gauge to an absolute value.
#[inline]
pub fn set_gauge(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        store.gauges.insert(name, value);
    });

    let _ = (name, value);
}

/// Adds `delta` to a gauge.
#[inline]
pub fn add_gauge(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        let entry = store.gauges.entry(name).or_insert(0);
        *entry = entry.saturating_add(delta);
    });

    let _ = (name, delta);
}

/// Subtracts `delta` from a gauge with floor at zero.
#[inline]
pub fn sub_gauge_saturating(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        let entry = store.gauges.entry(name).or_insert(0);
        *entry = entry.saturating_sub(delta);
    });

    let _ = (name, delta);
}

/// Captures current process memory and updates memory gauges.
pub fn sample_process_memory() -> ProcessMemorySample {
    let sample = memory::sample_process_memory();
    let labels = [("subsystem", "memory"), ("op", "sample")];

    if let Some(rss) = sample.rss_bytes {
        set_gauge(tags::METRIC_MEMORY_PROCESS_RSS_BYTES, rss, &labels);
    }
    if let Some(virtual_bytes) = sample.virtual_bytes {
        set_gauge(tags::METRIC_MEMORY_PROCESS_VIRTUAL_BYTES, virtual_bytes, &labels);
    }

    sample
}

/// Returns a point-in-time snapshot of all collected telemetry.
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        registry::snapshot()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

/// Clears in-memory telemetry state.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::update(|store| *store = registry::Store::default());
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, OnceLock};

    use super::{HistogramSnapshot, TelemetrySnapshot};

    #[derive(Debug, Clone, Copy, Default)]
    pub(super) struct Aggregate {
        count: u64,
        total: u64,
        min: u64,
        max: u64,
    }

    impl Aggregate {
        pub(super) fn record(&mut self, value: u64) {
            if self.count == 0 {
                self.min = value;
                self.max = value;
            } else {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }
            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }

        pub(super) fn summary(&self) -> HistogramSnapshot {
            let mean = match self.count {
                0 => 0.0,
                count => self.total as f64 / count as f64,
            };
            HistogramSnapshot {
                count: self.count,
                total: self.total,
                min: self.min,
                max: self.max,
                mean,
            }
        }
    }

    #[derive(Default)]
    pub(super) struct Store {
        pub(super) counters: BTreeMap<&'static str, u64>,
        pub(super) gauges: BTreeMap<&'static str, u64>,
        pub(super) histograms: BTreeMap<&'static str, Aggregate>,
    }

    fn store() -> &'static Mutex<Store> {
        static STORE: OnceLock<Mutex<Store>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(Store::default()))
    }

    pub(super) fn update(apply: impl FnOnce(&mut Store)) {
        let mut guard = match store().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        let guard = match store().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        TelemetrySnapshot {
            counters: guard
                .counters
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            gauges: guard
                .gauges
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            histograms: guard
                .histograms
                .iter()
                .map(|(name, aggregate)| ((*name).to_owned(), aggregate.summary()))
                .collect(),
        }
    }
}
