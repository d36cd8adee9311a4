//! # Contentful Bridge Core
//!
//! Core business logic for forwarding Contentful webhook events into a
//! BigQuery analytics table.
//!
//! This crate contains the event normalizer, the request orchestrator and the
//! abstractions for every external collaborator (secret vault, archive
//! storage, Contentful directory, analytics sink).
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations live in [`adapters`] and are injected at runtime
//! - Every external call is sequenced by [`pipeline::EventPipeline`]
//!
//! ## Usage
//!
//! ```rust
//! use contentful_bridge_core::normalizer::derive_action;
//!
//! assert_eq!(derive_action("ContentManagement.Entry.publish"), "publish");
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod adapters;
pub mod analytics;
pub mod archive;
pub mod directory;
pub mod monitoring;
pub mod normalizer;
pub mod pipeline;
pub mod secrets;

pub use analytics::{AnalyticsError, AnalyticsRow, AnalyticsSink, RowErrorDetail};
pub use archive::{ArchivalSink, ArchiveError, ArchiveOutcome, ArchiveStorage};
pub use directory::{DirectoryError, IdentityResolver, SpaceDirectory};
pub use normalizer::{EventNormalizer, InboundEvent, InboundRequest, TimestampField};
pub use pipeline::{
    CachingClientFactory, ClientBuildError, ClientFactory, EventPipeline, PipelineClients,
    PipelineError, PipelineSettings, PipelineStage, ProcessedEvent,
};
pub use secrets::{
    SecretBundle, SecretError, SecretName, SecretNames, SecretProvider, SecretValue,
    ServiceAccountCredential,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with millisecond precision on output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse timestamp from RFC3339 string, converting to UTC
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Wrap an existing UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// RFC3339 with millisecond precision and a `Z` suffix
    ///
    /// `2024-01-01T00:00:00.000Z`
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// ISO-8601 with millisecond precision and no zone suffix
    ///
    /// This is the format of the analytics table's `date` column:
    /// `2024-01-01T00:00:00.000`.
    pub fn to_naive_iso(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
///
/// Every variant maps to `400 Bad Request` at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },
}

impl ValidationError {
    /// Name of the offending field, if the error is tied to one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Required { field } | Self::InvalidFormat { field, .. } => Some(field),
            Self::MalformedPayload { .. } => None,
        }
    }
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}
