//! Metrics collection and observability types for the API service.

use contentful_bridge_core::monitoring::PipelineMetrics;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::{sync::Arc, time::Duration};

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Service metrics for observability
///
/// Collectors live on a registry owned by this instance, so several
/// instances (one per test router, for example) never collide.
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // Webhook processing metrics
    pub events_received_total: IntCounter,
    pub events_processed_total: IntCounter,
    pub events_rejected_total: IntCounter,
    pub events_failed_total: IntCounterVec,
    pub event_duration_seconds: Histogram,

    // Archival
    pub archive_failures_total: IntCounter,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("contentful_bridge".to_string()), None)?;

        let events_received_total = IntCounter::new(
            "events_received_total",
            "Total webhook requests received",
        )?;
        let events_processed_total = IntCounter::new(
            "events_processed_total",
            "Webhook requests that produced an analytics row",
        )?;
        let events_rejected_total = IntCounter::new(
            "events_rejected_total",
            "Webhook payloads rejected as invalid",
        )?;
        let events_failed_total = IntCounterVec::new(
            Opts::new(
                "events_failed_total",
                "Webhook requests failed by a downstream stage",
            ),
            &["stage"],
        )?;
        let event_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "event_duration_seconds",
                "Webhook processing time distribution",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        let archive_failures_total = IntCounter::new(
            "archive_failures_total",
            "Raw request archive writes that did not succeed",
        )?;

        registry.register(Box::new(events_received_total.clone()))?;
        registry.register(Box::new(events_processed_total.clone()))?;
        registry.register(Box::new(events_rejected_total.clone()))?;
        registry.register(Box::new(events_failed_total.clone()))?;
        registry.register(Box::new(event_duration_seconds.clone()))?;
        registry.register(Box::new(archive_failures_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Arc::new(Self {
            registry,
            events_received_total,
            events_processed_total,
            events_rejected_total,
            events_failed_total,
            event_duration_seconds,
            archive_failures_total,
        }))
    }

    /// Render every collector in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl PipelineMetrics for ServiceMetrics {
    fn record_event_received(&self) {
        self.events_received_total.inc();
    }

    fn record_event_processed(&self, duration: Duration) {
        self.events_processed_total.inc();
        self.event_duration_seconds.observe(duration.as_secs_f64());
    }

    fn record_validation_failure(&self) {
        self.events_rejected_total.inc();
    }

    fn record_stage_failure(&self, stage: &str) {
        self.events_failed_total.with_label_values(&[stage]).inc();
    }

    fn record_archive_failure(&self) {
        self.archive_failures_total.inc();
    }
}
