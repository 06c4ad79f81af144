//! Advisory counters kept beside a ring mapping.
//!
//! These live in the process that owns the `RingBuf` value, never in the
//! shared region: the producing side counts appends and threshold
//! crossings, the draining side counts drains and overruns.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for one side of a ring.
#[derive(Debug, Default)]
pub struct Metrics {
    records_appended: AtomicU64,
    bytes_appended: AtomicU64,
    threshold_crossings: AtomicU64,
    records_rejected: AtomicU64,
    drains: AtomicU64,
    bytes_drained: AtomicU64,
    overruns: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Records accepted by `append`.
    pub records_appended: u64,
    /// Payload bytes accepted by `append`.
    pub bytes_appended: u64,
    /// Appends that reported a threshold crossing.
    pub threshold_crossings: u64,
    /// Records rejected for exceeding the payload capacity.
    pub records_rejected: u64,
    /// Drains that returned at least one byte.
    pub drains: u64,
    /// Bytes handed to drain destinations.
    pub bytes_drained: u64,
    /// Drains that found producers had lapped the reader.
    pub overruns: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_appended: self.records_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            threshold_crossings: self.threshold_crossings.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            bytes_drained: self.bytes_drained.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_append(&self, bytes: usize) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_threshold_crossing(&self) {
        self.threshold_crossings.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self, bytes: usize) {
        self.drains.fetch_add(1, Ordering::Relaxed);
        self.bytes_drained.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }
}
