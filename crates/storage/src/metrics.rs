//! Operation counters for the storage service.
//!
//! Lock-free `AtomicU64` counters recorded by the service on every
//! operation, with a point-in-time [`MetricsSnapshot`] view for telemetry
//! exporters.
//!
//! All atomics use `Ordering::Relaxed`: each counter is independent and
//! monotonically increasing, so atomicity of the individual `fetch_add` is
//! all that is required. A snapshot may observe counters that are slightly
//! inconsistent relative to each other, which is acceptable for
//! time-aggregated telemetry.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Cloneable handle to a set of operation counters.
///
/// All clones share the same underlying counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    get_count: AtomicU64,
    put_count: AtomicU64,
    delete_count: AtomicU64,
    batch_get_count: AtomicU64,
    batch_put_count: AtomicU64,
    list_count: AtomicU64,
    error_count: AtomicU64,
}

impl Metrics {
    /// Creates a fresh set of counters, all zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a `get_item` call.
    pub fn record_get(&self) {
        self.inner.get_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a `set_item` call.
    pub fn record_put(&self) {
        self.inner.put_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a `remove_item` call.
    pub fn record_delete(&self) {
        self.inner.delete_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a `batch_get` call.
    pub fn record_batch_get(&self) {
        self.inner.batch_get_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a `batch_put` call.
    pub fn record_batch_put(&self) {
        self.inner.batch_put_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a `list` call.
    pub fn record_list(&self) {
        self.inner.list_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation that returned an error.
    pub fn record_error(&self) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time view of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            get_count: self.inner.get_count.load(Ordering::Relaxed),
            put_count: self.inner.put_count.load(Ordering::Relaxed),
            delete_count: self.inner.delete_count.load(Ordering::Relaxed),
            batch_get_count: self.inner.batch_get_count.load(Ordering::Relaxed),
            batch_put_count: self.inner.batch_put_count.load(Ordering::Relaxed),
            list_count: self.inner.list_count.load(Ordering::Relaxed),
            error_count: self.inner.error_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Number of `get_item` calls.
    pub get_count: u64,
    /// Number of `set_item` calls.
    pub put_count: u64,
    /// Number of `remove_item` calls.
    pub delete_count: u64,
    /// Number of `batch_get` calls.
    pub batch_get_count: u64,
    /// Number of `batch_put` calls.
    pub batch_put_count: u64,
    /// Number of `list` calls.
    pub list_count: u64,
    /// Number of calls that returned an error.
    pub error_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(Metrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn records_accumulate() {
        let metrics = Metrics::new();
        metrics.record_get();
        metrics.record_get();
        metrics.record_put();
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get_count, 2);
        assert_eq!(snapshot.put_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.list_count, 0);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_list();
        assert_eq!(metrics.snapshot().list_count, 1);
    }
}
