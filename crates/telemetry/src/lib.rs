// PlainQ Telemetry - Metrics Observer
//
// Implements the observer port with in-process metrics: atomic counters and
// gauges, HDR histograms for durations. Handles are pooled per metric name in
// a concurrent map, so acquisition is a single O(1) lookup and repeated
// acquisitions share the same underlying value.

use dashmap::DashMap;
use hdrhistogram::Histogram as HdrHistogram;
use parking_lot::Mutex;
use plainq_core::domain::{EvictionPolicy, QueueId};
use plainq_core::port::observer::{Counter, Gauge, Histogram, Observer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Significant figures kept by duration histograms.
const HISTOGRAM_SIGFIGS: u8 = 3;

/// Atomic metric backing both counters and gauges.
#[derive(Debug, Default)]
struct Metric {
    value: AtomicU64,
}

impl Counter for Metric {
    fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Gauge for Metric {
    fn dec(&self) {
        self.sub(1);
    }

    fn sub(&self, n: u64) {
        // Saturate at zero rather than wrapping.
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(n))
            });
    }
}

/// Duration histogram recording microseconds.
struct DurationHistogram {
    inner: Mutex<HdrHistogram<u64>>,
}

impl DurationHistogram {
    fn new() -> Self {
        Self {
            inner: Mutex::new(
                HdrHistogram::new(HISTOGRAM_SIGFIGS).expect("histogram construction"),
            ),
        }
    }

    fn count(&self) -> u64 {
        self.inner.lock().len()
    }

    fn value_at_quantile(&self, quantile: f64) -> u64 {
        self.inner.lock().value_at_quantile(quantile)
    }

    fn max(&self) -> u64 {
        self.inner.lock().max()
    }
}

impl Histogram for DurationHistogram {
    fn observe(&self, value: Duration) {
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        self.inner.lock().saturating_record(micros);
    }
}

/// Observer implementation backed by pooled in-process metrics.
#[derive(Default)]
pub struct MetricsObserver {
    counters: DashMap<String, Arc<Metric>>,
    histograms: DashMap<String, Arc<DurationHistogram>>,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, name: String) -> Arc<dyn Counter> {
        self.metric(name)
    }

    fn metric(&self, name: String) -> Arc<Metric> {
        self.counters
            .entry(name)
            .or_insert_with(|| Arc::new(Metric::default()))
            .clone()
    }

    fn histogram(&self, name: String) -> Arc<dyn Histogram> {
        self.histograms
            .entry(name)
            .or_insert_with(|| Arc::new(DurationHistogram::new()))
            .clone()
    }

    /// Renders every known metric as `name value` lines, sorted by name.
    /// Histograms expose count, p50, p99, and max in microseconds.
    pub fn export(&self) -> String {
        let mut lines = Vec::with_capacity(self.counters.len() + self.histograms.len() * 4);

        for entry in self.counters.iter() {
            lines.push(format!("{} {}", entry.key(), entry.value().get()));
        }

        for entry in self.histograms.iter() {
            let name = entry.key();
            let histogram = entry.value();
            lines.push(format!("{name}_count {}", histogram.count()));
            lines.push(format!(
                "{name}_p50_micros {}",
                histogram.value_at_quantile(0.50)
            ));
            lines.push(format!(
                "{name}_p99_micros {}",
                histogram.value_at_quantile(0.99)
            ));
            lines.push(format!("{name}_max_micros {}", histogram.max()));
        }

        lines.sort();
        lines.join("\n")
    }
}

impl Observer for MetricsObserver {
    fn messages_sent(&self, queue_id: &QueueId) -> Arc<dyn Counter> {
        self.counter(format!("messages_sent_total{{queue=\"{queue_id}\"}}"))
    }

    fn messages_sent_bytes(&self, queue_id: &QueueId) -> Arc<dyn Counter> {
        self.counter(format!("messages_sent_bytes_total{{queue=\"{queue_id}\"}}"))
    }

    fn messages_received(&self, queue_id: &QueueId) -> Arc<dyn Counter> {
        self.counter(format!("messages_received_total{{queue=\"{queue_id}\"}}"))
    }

    fn messages_deleted(&self, queue_id: &QueueId) -> Arc<dyn Counter> {
        self.counter(format!("messages_deleted_total{{queue=\"{queue_id}\"}}"))
    }

    fn messages_dropped(&self, queue_id: &QueueId, policy: EvictionPolicy) -> Arc<dyn Counter> {
        self.counter(format!(
            "messages_dropped_total{{queue=\"{queue_id}\", policy=\"{}\"}}",
            policy.as_str()
        ))
    }

    fn empty_receives(&self, queue_id: &QueueId) -> Arc<dyn Counter> {
        self.counter(format!("empty_receives_total{{queue=\"{queue_id}\"}}"))
    }

    fn time_in_queue(&self, queue_id: &QueueId) -> Arc<dyn Histogram> {
        self.histogram(format!("message_in_queue_duration{{queue=\"{queue_id}\"}}"))
    }

    fn gc_schedules(&self) -> Arc<dyn Counter> {
        self.counter("gc_schedules_total".to_string())
    }

    fn gc_duration(&self) -> Arc<dyn Histogram> {
        self.histogram("gc_duration".to_string())
    }

    fn queues_exist(&self) -> Arc<dyn Gauge> {
        self.metric("queues_exist".to_string())
    }
}
