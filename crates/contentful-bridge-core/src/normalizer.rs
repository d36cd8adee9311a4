//! # Event Normalizer
//!
//! Validates the Contentful webhook payload and extracts the fields that make
//! up an analytics row.
//!
//! Required inputs:
//! - body `sys.space.sys.id`
//! - body `sys.environment.sys.id`
//! - body `sys.createdAt` or `sys.updatedAt`, per [`TimestampField`]
//! - header `x-contentful-topic`
//! - query parameter `user`
//!
//! Anything missing is a [`ValidationError`], never a panic.

use crate::{analytics::AnalyticsRow, Timestamp, ValidationError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt};

#[cfg(test)]
#[path = "normalizer_tests.rs"]
mod tests;

/// Header carrying the webhook topic
pub const TOPIC_HEADER: &str = "x-contentful-topic";

/// Query parameter carrying the acting user id
pub const USER_QUERY_PARAM: &str = "user";

const SPACE_ID_POINTER: &str = "/sys/space/sys/id";
const ENVIRONMENT_ID_POINTER: &str = "/sys/environment/sys/id";

// ============================================================================
// Core Types
// ============================================================================

/// Raw HTTP request data from a Contentful webhook
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Headers with lower-cased names
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Bytes,
    pub received_at: Timestamp,
}

impl InboundRequest {
    /// Create new inbound request, lower-casing header names
    pub fn new(headers: HashMap<String, String>, query: HashMap<String, String>, body: Bytes) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        Self {
            headers,
            query,
            body,
            received_at: Timestamp::now(),
        }
    }

    /// Get a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Which payload timestamp feeds the analytics `date` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampField {
    /// `sys.createdAt`
    Created,
    /// `sys.updatedAt`
    #[default]
    Updated,
}

impl TimestampField {
    /// Dotted payload path, used in validation messages
    pub fn field_path(&self) -> &'static str {
        match self {
            Self::Created => "sys.createdAt",
            Self::Updated => "sys.updatedAt",
        }
    }

    fn pointer(&self) -> &'static str {
        match self {
            Self::Created => "/sys/createdAt",
            Self::Updated => "/sys/updatedAt",
        }
    }
}

impl fmt::Display for TimestampField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// A validated Contentful change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub space_id: String,
    pub environment_id: String,
    pub occurred_at: Timestamp,
    pub topic: String,
    pub action: String,
    pub user_id: String,
}

impl InboundEvent {
    /// Build the analytics row for this event
    pub fn to_row(&self, space_name: String, user: String) -> AnalyticsRow {
        AnalyticsRow {
            contentful_space: space_name,
            date: self.occurred_at.to_naive_iso(),
            actions: self.action.clone(),
            user,
            environment: self.environment_id.clone(),
        }
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Validates webhook payloads and extracts [`InboundEvent`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer {
    timestamp_field: TimestampField,
}

impl EventNormalizer {
    /// Create normalizer reading the given timestamp field
    pub fn new(timestamp_field: TimestampField) -> Self {
        Self { timestamp_field }
    }

    /// Timestamp field this normalizer reads
    pub fn timestamp_field(&self) -> TimestampField {
        self.timestamp_field
    }

    /// Validate and extract the event from a raw request
    pub fn normalize_request(&self, request: &InboundRequest) -> Result<InboundEvent, ValidationError> {
        self.normalize(&request.body, &request.headers, &request.query)
    }

    /// Validate and extract the event
    ///
    /// `headers` must use lower-cased names.
    pub fn normalize(
        &self,
        raw_payload: &[u8],
        headers: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> Result<InboundEvent, ValidationError> {
        let payload: Value =
            serde_json::from_slice(raw_payload).map_err(|e| ValidationError::MalformedPayload {
                message: format!("body is not valid JSON: {}", e),
            })?;

        let space_id = required_string(&payload, SPACE_ID_POINTER, "sys.space.sys.id")?;
        let raw_timestamp = required_string(
            &payload,
            self.timestamp_field.pointer(),
            self.timestamp_field.field_path(),
        )?;
        let environment_id =
            required_string(&payload, ENVIRONMENT_ID_POINTER, "sys.environment.sys.id")?;

        let occurred_at =
            Timestamp::from_rfc3339(raw_timestamp).map_err(|e| ValidationError::InvalidFormat {
                field: self.timestamp_field.field_path().to_string(),
                message: e.to_string(),
            })?;

        let topic = headers
            .get(TOPIC_HEADER)
            .ok_or_else(|| ValidationError::Required {
                field: TOPIC_HEADER.to_string(),
            })?;

        let user_id = query
            .get(USER_QUERY_PARAM)
            .ok_or_else(|| ValidationError::Required {
                field: USER_QUERY_PARAM.to_string(),
            })?;

        Ok(InboundEvent {
            space_id: space_id.to_string(),
            environment_id: environment_id.to_string(),
            occurred_at,
            topic: topic.clone(),
            action: derive_action(topic).to_string(),
            user_id: user_id.clone(),
        })
    }
}

/// Last dot-delimited segment of a webhook topic
///
/// `ContentManagement.Entry.publish` → `publish`. A topic without dots is
/// returned unchanged.
pub fn derive_action(topic: &str) -> &str {
    topic.rsplit('.').next().unwrap_or(topic)
}

fn required_string<'a>(
    payload: &'a Value,
    pointer: &str,
    field: &str,
) -> Result<&'a str, ValidationError> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ValidationError::Required {
            field: field.to_string(),
        })
}
