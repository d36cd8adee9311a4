//! Error types for the HTTP service

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use contentful_bridge_core::PipelineError;

/// Body returned when the payload lacks a required field
pub const VALIDATION_FAILED_BODY: &str =
    "Missing or undefined properties in the Contentful Webhook payload";

/// Body returned when the BigQuery insert fails
pub const INSERT_FAILED_BODY: &str = "Error inserting data into BigQuery";

/// Body returned for every other failure
pub const PROCESSING_FAILED_BODY: &str = "Error processing Contentful Webhook";

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the payload is missing a required field
/// - `500 Internal Server Error`: any downstream failure
///
/// Bodies are fixed plain-text messages. Details are logged by the pipeline
/// and never returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl EventHandlerError {
    /// Status code and body for this error
    pub fn status_and_body(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Pipeline(e) if e.is_validation_failure() => {
                (StatusCode::BAD_REQUEST, VALIDATION_FAILED_BODY)
            }
            Self::Pipeline(e) if e.is_insert_failure() => {
                (StatusCode::INTERNAL_SERVER_ERROR, INSERT_FAILED_BODY)
            }
            Self::Pipeline(_) => (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED_BODY),
        }
    }
}

impl IntoResponse for EventHandlerError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        text_response(status, body)
    }
}

/// Plain-text response with an explicit content type
pub(crate) fn text_response(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Metrics registration failed: {message}")]
    Metrics { message: String },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}
