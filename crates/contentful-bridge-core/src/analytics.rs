//! # Analytics Sink Interface
//!
//! Append-only row insertion into the analytics table.
//!
//! One row is written per accepted event. There is no batching, no retry,
//! and no deduplication: duplicate webhook deliveries produce duplicate rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One analytics table row
///
/// Serializes with the column names of the BigQuery table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    /// Display name of the Contentful space
    #[serde(rename = "contentfulSpace")]
    pub contentful_space: String,

    /// Event time, UTC, millisecond precision, no zone suffix
    pub date: String,

    /// Action derived from the webhook topic (e.g. `publish`)
    pub actions: String,

    /// Raw user id or resolved email
    pub user: String,

    /// Contentful environment id
    pub environment: String,
}

/// Normalised per-row error detail reported by the analytics provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowErrorDetail {
    /// Column or location the provider blamed, when it named one
    pub field: Option<String>,

    /// Short machine-readable reason (`invalid`, `notFound`, ...)
    pub reason: String,

    /// Human-readable message
    pub message: String,
}

impl fmt::Display for RowErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{} ({}): {}", field, self.reason, self.message),
            None => write!(f, "{}: {}", self.reason, self.message),
        }
    }
}

/// Interface for appending rows to the analytics table
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Insert a single row
    ///
    /// # Errors
    /// - `AnalyticsError::InsertFailed` - the provider rejected the row
    /// - `AnalyticsError::Authentication` - credentials were refused
    /// - `AnalyticsError::Transport` - the provider could not be reached
    async fn insert_row(
        &self,
        dataset_id: &str,
        table_id: &str,
        row: &AnalyticsRow,
    ) -> Result<(), AnalyticsError>;
}

/// Errors that can occur while inserting analytics rows
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Row insert failed: {}", summarize(.details))]
    InsertFailed { details: Vec<RowErrorDetail> },

    #[error("Analytics authentication failed: {message}")]
    Authentication { message: String },

    #[error("Analytics transport error: {message}")]
    Transport { message: String },

    #[error("Unexpected analytics response: {message}")]
    InvalidResponse { message: String },
}

impl AnalyticsError {
    /// Per-row details, empty for non-insert failures
    pub fn details(&self) -> &[RowErrorDetail] {
        match self {
            Self::InsertFailed { details } => details,
            _ => &[],
        }
    }
}

fn summarize(details: &[RowErrorDetail]) -> String {
    match details.first() {
        Some(first) if details.len() > 1 => {
            format!("{} (and {} more)", first, details.len() - 1)
        }
        Some(first) => first.to_string(),
        None => "no details reported".to_string(),
    }
}
