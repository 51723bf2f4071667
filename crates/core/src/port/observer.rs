// Telemetry Observer Port
//
// The engine reports events through this capability set. Handles are pooled
// by the implementation: acquisition is O(1) and every handle is safe for
// concurrent use.

use crate::domain::{EvictionPolicy, QueueId};
use std::sync::Arc;
use std::time::Duration;

/// A monotonically increasing counter.
pub trait Counter: Send + Sync {
    fn inc(&self);
    fn add(&self, n: u64);
    fn get(&self) -> u64;
}

/// A counter that can also go down.
pub trait Gauge: Counter {
    fn dec(&self);
    fn sub(&self, n: u64);
}

/// Collects duration samples.
pub trait Histogram: Send + Sync {
    fn observe(&self, value: Duration);
}

/// Observer abstracts the logic of observing engine events and turning them
/// into metrics.
pub trait Observer: Send + Sync {
    /// Counter for the amount of messages that have been sent.
    fn messages_sent(&self, queue_id: &QueueId) -> Arc<dyn Counter>;

    /// Counter for the total body size of sent messages.
    fn messages_sent_bytes(&self, queue_id: &QueueId) -> Arc<dyn Counter>;

    /// Counter for the amount of messages that have been received.
    fn messages_received(&self, queue_id: &QueueId) -> Arc<dyn Counter>;

    /// Counter for the amount of messages that have been deleted.
    fn messages_deleted(&self, queue_id: &QueueId) -> Arc<dyn Counter>;

    /// Counter for the amount of messages evicted under the given policy.
    fn messages_dropped(&self, queue_id: &QueueId, policy: EvictionPolicy) -> Arc<dyn Counter>;

    /// Counter for receives that returned no messages.
    fn empty_receives(&self, queue_id: &QueueId) -> Arc<dyn Counter>;

    /// Histogram of the time each message spent in the queue before its
    /// deletion.
    fn time_in_queue(&self, queue_id: &QueueId) -> Arc<dyn Histogram>;

    /// Counter for scheduled garbage collection ticks.
    fn gc_schedules(&self) -> Arc<dyn Counter>;

    /// Histogram of full garbage collection tick durations.
    fn gc_duration(&self) -> Arc<dyn Histogram>;

    /// Gauge tracking the amount of queues that exist now. At steady state it
    /// equals the row count of the properties table.
    fn queues_exist(&self) -> Arc<dyn Gauge>;
}

/// Observer that records nothing. Composes wherever telemetry is not wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

struct NoopMetric;

impl Counter for NoopMetric {
    fn inc(&self) {}
    fn add(&self, _n: u64) {}
    fn get(&self) -> u64 {
        0
    }
}

impl Gauge for NoopMetric {
    fn dec(&self) {}
    fn sub(&self, _n: u64) {}
}

impl Histogram for NoopMetric {
    fn observe(&self, _value: Duration) {}
}

impl Observer for NoopObserver {
    fn messages_sent(&self, _queue_id: &QueueId) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn messages_sent_bytes(&self, _queue_id: &QueueId) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn messages_received(&self, _queue_id: &QueueId) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn messages_deleted(&self, _queue_id: &QueueId) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn messages_dropped(&self, _queue_id: &QueueId, _policy: EvictionPolicy) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn empty_receives(&self, _queue_id: &QueueId) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn time_in_queue(&self, _queue_id: &QueueId) -> Arc<dyn Histogram> {
        Arc::new(NoopMetric)
    }

    fn gc_schedules(&self) -> Arc<dyn Counter> {
        Arc::new(NoopMetric)
    }

    fn gc_duration(&self) -> Arc<dyn Histogram> {
        Arc::new(NoopMetric)
    }

    fn queues_exist(&self) -> Arc<dyn Gauge> {
        Arc::new(NoopMetric)
    }
}
