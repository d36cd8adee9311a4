//! # Request Archive
//!
//! Best-effort persistence of the raw inbound request before it is processed.
//!
//! [`ArchiveStorage`] is the backend contract (Azure Blob, local filesystem).
//! [`ArchivalSink`] wraps a backend and swallows every failure: archival is
//! logged but never fails or blocks the analytics path.

use crate::{normalizer::InboundRequest, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{error, info, instrument};

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;

/// Default blob name prefix for archived requests
pub const DEFAULT_BLOB_PREFIX: &str = "contentful-webhook-";

// ============================================================================
// Snapshot
// ============================================================================

/// The raw inbound request as written to the archive
///
/// Maps are ordered so the serialized text is stable for a given request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedRequestSnapshot {
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: String,
}

impl ArchivedRequestSnapshot {
    /// Capture the headers, query and body of a request
    ///
    /// Non-UTF-8 body bytes are replaced rather than rejected.
    pub fn capture(request: &InboundRequest) -> Self {
        Self {
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            query: request
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body: String::from_utf8_lossy(&request.body).into_owned(),
        }
    }

    /// Serialize as JSON text
    pub fn to_text(&self) -> Result<String, ArchiveError> {
        serde_json::to_string(self).map_err(|e| ArchiveError::Serialization {
            message: e.to_string(),
        })
    }
}

/// Blob name for an archive written at `at`
///
/// Prefix followed by the ISO-8601 archival time (not the event time), so
/// names sort chronologically. Two writes within the same millisecond collide.
pub fn blob_name(prefix: &str, at: Timestamp) -> String {
    format!("{}{}", prefix, at.to_rfc3339())
}

// ============================================================================
// Core Trait
// ============================================================================

/// Interface for archive storage backends
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// Write `payload` as a new blob
    ///
    /// Returns the backend's request identifier for the write, if it
    /// provides one.
    ///
    /// # Errors
    /// Returns error if the backend is unreachable, refuses the credentials,
    /// or rejects the write.
    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
    ) -> Result<Option<String>, ArchiveError>;
}

/// Errors reported by archive backends
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("Archive permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Archive write rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Archive I/O failed: {message}")]
    Io { message: String },

    #[error("Archive serialization failed: {message}")]
    Serialization { message: String },

    #[error("Archive configuration error: {message}")]
    Configuration { message: String },
}

// ============================================================================
// Archival Sink
// ============================================================================

/// Result of a best-effort archive write
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveOutcome {
    /// Whether the blob was written
    pub stored: bool,

    /// Backend request id for the write, when stored and reported
    pub id: Option<String>,
}

impl ArchiveOutcome {
    fn failed() -> Self {
        Self {
            stored: false,
            id: None,
        }
    }
}

/// Best-effort archive writer
#[derive(Clone)]
pub struct ArchivalSink {
    storage: Arc<dyn ArchiveStorage>,
    container: String,
    blob_prefix: String,
}

impl ArchivalSink {
    /// Create a sink writing to `container` with the given name prefix
    pub fn new(
        storage: Arc<dyn ArchiveStorage>,
        container: impl Into<String>,
        blob_prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            container: container.into(),
            blob_prefix: blob_prefix.into(),
        }
    }

    /// Target container
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Write `payload` under `container/name`, never failing
    #[instrument(skip(self, payload), fields(size = payload.len()))]
    pub async fn archive(&self, container: &str, name: &str, payload: &str) -> ArchiveOutcome {
        info!("Archiving raw webhook request");

        match self
            .storage
            .put_blob(container, name, Bytes::copy_from_slice(payload.as_bytes()))
            .await
        {
            Ok(id) => {
                info!(request_id = ?id, "Archived raw webhook request");
                ArchiveOutcome { stored: true, id }
            }
            Err(e) => {
                error!(error = %e, "Failed to archive raw webhook request; continuing");
                ArchiveOutcome::failed()
            }
        }
    }

    /// Snapshot `request` and archive it under a name derived from `at`
    pub async fn archive_request(&self, request: &InboundRequest, at: Timestamp) -> ArchiveOutcome {
        let name = blob_name(&self.blob_prefix, at);

        let text = match ArchivedRequestSnapshot::capture(request).to_text() {
            Ok(text) => text,
            Err(e) => {
                error!(blob = %name, error = %e, "Failed to serialize request snapshot; continuing");
                return ArchiveOutcome::failed();
            }
        };

        self.archive(&self.container, &name, &text).await
    }
}
