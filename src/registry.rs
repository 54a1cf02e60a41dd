//! Metric registry
//!
//! Process-wide collection of exported series, one gauge family per
//! recognized status field, dimensioned by the campaign's `name` label.
//! The registry is an explicitly constructed object owned by the
//! composition root and shared by reference between the watcher (sole
//! writer) and the HTTP serving path (read-only consumer); nothing here
//! touches the prometheus crate's global default registry.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::stats::{StatField, StatusRecord};

/// Label dimension distinguishing campaigns within a series
const NAME_LABEL: &str = "name";

/// Content type of the text exposition format served on `/metrics`
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Registry of all exported series
///
/// Every series in the [`StatField`] vocabulary is created and registered at
/// construction time, so the exported schema does not depend on which
/// targets have been polled. Entries within a series are created lazily the
/// first time a `(field, label)` pair is observed and are updated in place
/// afterwards, never removed. Each gauge is internally atomic, which gives
/// the field-level consistency the serving path needs while the watcher
/// writes concurrently.
pub struct MetricRegistry {
    registry: Registry,
    gauges: HashMap<StatField, GaugeVec>,
    poll_cycles: IntCounter,
    poll_errors: IntCounterVec,
}

impl MetricRegistry {
    /// Create a registry with the full series vocabulary registered
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let mut gauges = HashMap::with_capacity(StatField::ALL.len());
        for field in StatField::ALL {
            let gauge = GaugeVec::new(Opts::new(field.name(), field.help()), &[NAME_LABEL])?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(field, gauge);
        }

        let poll_cycles = IntCounter::new(
            "fuzzmon_poll_cycles_total",
            "Completed poll cycles over all targets",
        )?;
        registry.register(Box::new(poll_cycles.clone()))?;

        let poll_errors = IntCounterVec::new(
            Opts::new(
                "fuzzmon_poll_errors_total",
                "Status-file read failures per target",
            ),
            &[NAME_LABEL],
        )?;
        registry.register(Box::new(poll_errors.clone()))?;

        Ok(Self {
            registry,
            gauges,
            poll_cycles,
            poll_errors,
        })
    }

    /// Create a registry wrapped for sharing between watcher and server
    pub fn shared() -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new()?))
    }

    /// Handle for one series; idempotent, same handle for the same field
    pub fn series(&self, field: StatField) -> &GaugeVec {
        // Every vocabulary field was inserted in new(), so the lookup
        // cannot miss.
        &self.gauges[&field]
    }

    /// Upsert the value for a target's entry within a series
    pub fn set(&self, field: StatField, label: &str, value: f64) {
        self.series(field).with_label_values(&[label]).set(value);
    }

    /// Apply every field of a parsed record, in file order
    ///
    /// Fields absent from the record keep their previously exported value;
    /// omission never rewinds a series.
    pub fn apply(&self, label: &str, record: &StatusRecord) {
        for (field, value) in record.fields() {
            self.set(*field, label, *value);
        }
    }

    /// Count one completed poll cycle
    pub fn record_cycle(&self) {
        self.poll_cycles.inc();
    }

    /// Count one failed status-file read for a target
    pub fn record_error(&self, label: &str) {
        self.poll_errors.with_label_values(&[label]).inc();
    }

    /// Number of poll cycles recorded so far
    pub fn poll_cycles(&self) -> u64 {
        self.poll_cycles.get()
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| Error::Metrics(prometheus::Error::Msg(format!("invalid UTF-8: {e}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;

    #[test]
    fn test_full_vocabulary_registered_at_construction() {
        let registry = MetricRegistry::new().unwrap();
        for field in StatField::ALL {
            // A handle exists for every field before any target is polled.
            let _ = registry.series(field);
        }
    }

    #[test]
    fn test_set_and_encode() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(StatField::ExecsDone, "fuzz1", 1000.0);
        registry.set(StatField::UniqueCrashes, "fuzz1", 2.0);

        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 1000"));
        assert!(output.contains("unique_crashes{name=\"fuzz1\"} 2"));
    }

    #[test]
    fn test_unpolled_target_has_no_entries() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(StatField::ExecsDone, "fuzz1", 1000.0);

        let output = registry.encode().unwrap();
        assert!(!output.contains("fuzz2"));
    }

    #[test]
    fn test_upsert_overwrites() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(StatField::ExecsDone, "fuzz1", 1000.0);
        registry.set(StatField::ExecsDone, "fuzz1", 2000.0);

        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 2000"));
        assert!(!output.contains("execs_done{name=\"fuzz1\"} 1000"));
    }

    #[test]
    fn test_apply_record_in_order() {
        let registry = MetricRegistry::new().unwrap();
        let record = stats::parse(b"execs_done : 1\nexecs_done : 2\npaths_total : 5\n");
        registry.apply("fuzz1", &record);

        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 2"));
        assert!(output.contains("paths_total{name=\"fuzz1\"} 5"));
    }

    #[test]
    fn test_omission_keeps_previous_value() {
        let registry = MetricRegistry::new().unwrap();
        registry.apply("fuzz1", &stats::parse(b"paths_total : 10\nexecs_done : 100\n"));
        // Next cycle's file lacks paths_total entirely.
        registry.apply("fuzz1", &stats::parse(b"execs_done : 200\n"));

        let output = registry.encode().unwrap();
        assert!(output.contains("paths_total{name=\"fuzz1\"} 10"));
        assert!(output.contains("execs_done{name=\"fuzz1\"} 200"));
    }

    #[test]
    fn test_labels_are_independent_within_a_series() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(StatField::ExecsDone, "fuzz1", 1.0);
        registry.set(StatField::ExecsDone, "fuzz2", 2.0);

        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 1"));
        assert!(output.contains("execs_done{name=\"fuzz2\"} 2"));
    }

    #[test]
    fn test_poll_counters() {
        let registry = MetricRegistry::new().unwrap();
        registry.record_cycle();
        registry.record_cycle();
        registry.record_error("fuzz2");

        assert_eq!(registry.poll_cycles(), 2);
        let output = registry.encode().unwrap();
        assert!(output.contains("fuzzmon_poll_cycles_total 2"));
        assert!(output.contains("fuzzmon_poll_errors_total{name=\"fuzz2\"} 1"));
    }
}
