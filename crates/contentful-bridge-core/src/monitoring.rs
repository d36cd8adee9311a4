//! Metrics collection for the event pipeline.
//!
//! The pipeline reports what happened through [`PipelineMetrics`]; the API
//! crate implements it with Prometheus. Recording is best-effort and never
//! returns errors.
//!
//! ```rust
//! use contentful_bridge_core::monitoring::{NoOpPipelineMetrics, PipelineMetrics};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let metrics: Arc<dyn PipelineMetrics> = Arc::new(NoOpPipelineMetrics);
//! metrics.record_event_received();
//! metrics.record_event_processed(Duration::from_millis(120));
//! ```

use std::time::Duration;

/// Metrics collector for pipeline operations.
///
/// All methods take `&self` so a single collector can be shared as
/// `Arc<dyn PipelineMetrics>` across concurrent requests.
pub trait PipelineMetrics: Send + Sync {
    /// A webhook request entered the pipeline.
    fn record_event_received(&self);

    /// A row was inserted and the request succeeded.
    ///
    /// - `duration`: Time from entry to successful insert
    fn record_event_processed(&self, duration: Duration);

    /// The payload was rejected as invalid (400).
    fn record_validation_failure(&self);

    /// A downstream stage failed (500).
    ///
    /// - `stage`: Stage label, e.g. `fetch_secrets` or `insert`
    fn record_stage_failure(&self, stage: &str);

    /// A best-effort archive write did not succeed.
    fn record_archive_failure(&self);
}

/// Collector that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPipelineMetrics;

impl PipelineMetrics for NoOpPipelineMetrics {
    fn record_event_received(&self) {}

    fn record_event_processed(&self, _duration: Duration) {}

    fn record_validation_failure(&self) {}

    fn record_stage_failure(&self, _stage: &str) {}

    fn record_archive_failure(&self) {}
}
