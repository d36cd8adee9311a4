//! Common test utilities for contentful-bridge-api integration tests
//!
//! This module provides:
//! - A wiremock server standing in for Contentful, the Google token endpoint
//!   and BigQuery
//! - Builders for the router, webhook requests and payloads
//! - Archive storage test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use bytes::Bytes;
use contentful_bridge_api::{create_router, AppState, SecretsBackend, ServiceConfig, ServiceMetrics};
use contentful_bridge_core::{
    adapters::{HttpClientFactory, InMemorySecretProvider},
    ArchivalSink, ArchiveError, ArchiveStorage, EventPipeline, SecretName, SecretValue,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TEST_KEY_PEM: &str =
    include_str!("../../../contentful-bridge-core/testdata/service_account_key.pem");

pub const PROJECT_ID: &str = "analytics-project";
pub const DATASET_ID: &str = "contentful";
pub const TABLE_ID: &str = "events";
pub const ORGANIZATION_ID: &str = "org-1";
pub const INSERT_PATH: &str =
    "/projects/analytics-project/datasets/contentful/tables/events/insertAll";

// ============================================================================
// Test environment
// ============================================================================

/// Downstream services and secrets for one test
pub struct TestEnvironment {
    pub server: MockServer,
    pub secrets: InMemorySecretProvider,
}

impl TestEnvironment {
    /// Start the mock server, mount the token endpoint and load both secrets
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.integration",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let env = Self {
            server,
            secrets: InMemorySecretProvider::new(),
        };

        let config = env.config();
        env.secrets.add_secret(
            SecretName::new(config.secrets.contentful_token_name.as_str()).unwrap(),
            SecretValue::from("cfpat-integration"),
        );
        env.secrets.add_secret(
            SecretName::new(config.secrets.analytics_credential_name.as_str()).unwrap(),
            SecretValue::from_string(env.credential_json()),
        );

        env
    }

    /// Service-account credential as stored in the vault: one line, `\n` escaped
    pub fn credential_json(&self) -> String {
        json!({
            "type": "service_account",
            "project_id": PROJECT_ID,
            "private_key_id": "integration-key",
            "private_key": TEST_KEY_PEM.replace('\n', "\\n"),
            "client_email": "writer@analytics-project.iam.gserviceaccount.com",
            "token_uri": format!("{}/token", self.server.uri()),
        })
        .to_string()
    }

    /// Configuration pointing every client at the mock server
    pub fn config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.secrets.provider = SecretsBackend::Environment;
        config.analytics.dataset_id = DATASET_ID.to_string();
        config.analytics.table_id = TABLE_ID.to_string();
        config.analytics.api_url = self.server.uri();
        config.contentful.api_url = self.server.uri();
        config
    }

    /// Router over the production client factory
    pub fn router(&self, config: ServiceConfig) -> Router {
        self.router_with_archive(config, None)
    }

    /// Router archiving every raw request into `storage`
    pub fn router_with_archive(
        &self,
        config: ServiceConfig,
        storage: Option<Arc<dyn ArchiveStorage>>,
    ) -> Router {
        let factory = HttpClientFactory::new(config.client_settings()).unwrap();
        let mut pipeline = EventPipeline::new(
            Arc::new(self.secrets.clone()),
            Arc::new(factory),
            config.pipeline_settings().unwrap(),
        );
        if let Some(storage) = storage {
            pipeline = pipeline.with_archival(ArchivalSink::new(
                storage,
                config.archive.container.clone(),
                config.archive.blob_prefix.clone(),
            ));
        }

        let state = AppState::new(config, pipeline, ServiceMetrics::new().unwrap());
        create_router(state)
    }

    // ------------------------------------------------------------------------
    // Downstream expectations
    // ------------------------------------------------------------------------

    pub async fn mount_space(&self, space_id: &str, name: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/spaces/{}", space_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": name,
                "sys": { "type": "Space", "id": space_id }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_user(&self, user_id: &str, email: &str) {
        Mock::given(method("GET"))
            .and(path(format!(
                "/organizations/{}/users/{}",
                ORGANIZATION_ID, user_id
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "email": email,
                "sys": { "type": "User", "id": user_id }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_insert_success(&self) {
        Mock::given(method("POST"))
            .and(path(INSERT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "kind": "bigquery#tableDataInsertAllResponse" })),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mount_insert_failure(&self) {
        Mock::given(method("POST"))
            .and(path(INSERT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "bigquery#tableDataInsertAllResponse",
                "insertErrors": [{
                    "index": 0,
                    "errors": [{ "reason": "invalid", "location": "date", "message": "bad date" }]
                }]
            })))
            .mount(&self.server)
            .await;
    }

    /// Every request the mock server received
    pub async fn received(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received on `request_path`
    pub async fn received_on(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.received()
            .await
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }

    /// Rows posted to BigQuery, as JSON
    pub async fn inserted_rows(&self) -> Vec<Value> {
        self.received_on(INSERT_PATH)
            .await
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                body["rows"][0]["json"].clone()
            })
            .collect()
    }
}

// ============================================================================
// Requests
// ============================================================================

pub fn valid_payload() -> Value {
    json!({
        "sys": {
            "type": "Entry",
            "id": "entry-1",
            "space": { "sys": { "type": "Link", "linkType": "Space", "id": "abc" } },
            "environment": { "sys": { "type": "Link", "linkType": "Environment", "id": "master" } },
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-03-05T10:20:30.400Z",
        },
        "fields": { "title": { "en-US": "Hello" } }
    })
}

pub fn webhook_request(topic: &str, user: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/contentfulEventsHandler?user={}", user))
        .header("content-type", "application/vnd.contentful.management.v1+json")
        .header("X-Contentful-Topic", topic)
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

pub fn publish_request(payload: &Value) -> Request<Body> {
    webhook_request("ContentManagement.Entry.publish", "u123", payload)
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Archive doubles
// ============================================================================

/// Archive storage keeping every write in memory
#[derive(Default)]
pub struct RecordingArchive {
    pub writes: Mutex<Vec<(String, String, Bytes)>>,
}

#[async_trait]
impl ArchiveStorage for RecordingArchive {
    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
    ) -> Result<Option<String>, ArchiveError> {
        self.writes
            .lock()
            .unwrap()
            .push((container.to_string(), name.to_string(), payload));
        Ok(Some(format!("request-{}", name)))
    }
}

/// Archive storage refusing every write
pub struct UnavailableArchive;

#[async_trait]
impl ArchiveStorage for UnavailableArchive {
    async fn put_blob(
        &self,
        _container: &str,
        _name: &str,
        _payload: Bytes,
    ) -> Result<Option<String>, ArchiveError> {
        Err(ArchiveError::Unavailable {
            message: "connection refused".to_string(),
        })
    }
}
