//! Integration tests for webhook ingestion through the HTTP router
//!
//! Each test drives the router with `oneshot` while Contentful, the Google
//! token endpoint and BigQuery are served by wiremock.

mod common;

use axum::http::StatusCode;
use common::*;
use contentful_bridge_api::ArchiveBackend;
use contentful_bridge_core::{adapters::FilesystemArchive, SecretName};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Successful delivery
// ============================================================================

/// Verify the inserted row for a publish event using `createdAt`
#[tokio::test]
async fn test_publish_event_inserts_expected_row() {
    // Arrange
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;

    let mut config = env.config();
    config.analytics.timestamp_field = contentful_bridge_core::TimestampField::Created;
    let app = env.router(config);

    // Act
    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "Webhook received and processed successfully"
    );
    assert_eq!(
        env.inserted_rows().await,
        vec![json!({
            "contentfulSpace": "Marketing Site",
            "date": "2024-01-01T00:00:00.000",
            "actions": "publish",
            "user": "u123",
            "environment": "master"
        })]
    );
}

/// Verify `updatedAt` feeds the date column by default
#[tokio::test]
async fn test_default_timestamp_is_updated_at() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let app = env.router(env.config());

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        env.inserted_rows().await[0]["date"],
        json!("2024-03-05T10:20:30.400")
    );
}

/// Verify the action is the last dot-separated segment of the topic
#[tokio::test]
async fn test_action_is_last_topic_segment() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let app = env.router(env.config());

    let response = app
        .oneshot(webhook_request(
            "ContentManagement.Asset.unpublish",
            "u123",
            &valid_payload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.inserted_rows().await[0]["actions"], json!("unpublish"));
}

/// Verify downstream calls carry the secrets fetched for the request
#[tokio::test]
async fn test_downstream_calls_are_authenticated() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let app = env.router(env.config());

    app.oneshot(publish_request(&valid_payload())).await.unwrap();

    let space_call = &env.received_on("/spaces/abc").await[0];
    assert_eq!(
        space_call.headers.get("authorization").unwrap(),
        "Bearer cfpat-integration"
    );

    let insert_call = &env.received_on(INSERT_PATH).await[0];
    assert_eq!(
        insert_call.headers.get("authorization").unwrap(),
        "Bearer ya29.integration"
    );
}

// ============================================================================
// Identity resolution
// ============================================================================

/// Verify the user column holds the resolved email when enabled
#[tokio::test]
async fn test_identity_resolution_replaces_user_id() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_user("u123", "editor@example.com").await;
    env.mount_insert_success().await;

    let mut config = env.config();
    config.identity.enabled = true;
    config.identity.organization_id = ORGANIZATION_ID.to_string();
    let app = env.router(config);

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        env.inserted_rows().await[0]["user"],
        json!("editor@example.com")
    );
}

/// Verify a failed identity lookup aborts before the insert
#[tokio::test]
async fn test_identity_failure_returns_error_without_insert() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;

    let mut config = env.config();
    config.identity.enabled = true;
    config.identity.organization_id = ORGANIZATION_ID.to_string();
    let app = env.router(config);

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_text(response).await,
        "Error processing Contentful Webhook"
    );
    assert!(env.inserted_rows().await.is_empty());
}

// ============================================================================
// Validation
// ============================================================================

/// Verify each missing required field is rejected without lookups
#[tokio::test]
async fn test_missing_required_fields_are_rejected() {
    let incomplete = [
        json!({ "sys": {
            "environment": { "sys": { "id": "master" } },
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z"
        }}),
        json!({ "sys": {
            "space": { "sys": { "id": "abc" } },
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z"
        }}),
        json!({ "sys": {
            "space": { "sys": { "id": "abc" } },
            "environment": { "sys": { "id": "master" } }
        }}),
        json!({ "sys": {
            "space": { "sys": { "id": "" } },
            "environment": { "sys": { "id": "master" } },
            "updatedAt": "2024-01-01T00:00:00.000Z"
        }}),
    ];

    for payload in incomplete {
        let env = TestEnvironment::start().await;
        env.mount_space("abc", "Marketing Site").await;
        env.mount_user("u123", "editor@example.com").await;
        env.mount_insert_success().await;

        let mut config = env.config();
        config.identity.enabled = true;
        config.identity.organization_id = ORGANIZATION_ID.to_string();
        let app = env.router(config);

        let response = app.oneshot(publish_request(&payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", payload);
        assert_eq!(
            body_text(response).await,
            "Missing or undefined properties in the Contentful Webhook payload"
        );
        assert!(env.inserted_rows().await.is_empty());
        assert!(env
            .received_on(&format!("/organizations/{}/users/u123", ORGANIZATION_ID))
            .await
            .is_empty());
    }
}

/// Verify a body that is not JSON is rejected as invalid
#[tokio::test]
async fn test_non_json_body_is_rejected() {
    let env = TestEnvironment::start().await;
    let app = env.router(env.config());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/contentfulEventsHandler?user=u123")
        .header("X-Contentful-Topic", "ContentManagement.Entry.publish")
        .body(axum::body::Body::from("not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Verify a missing user query parameter is rejected
#[tokio::test]
async fn test_missing_user_is_rejected() {
    let env = TestEnvironment::start().await;
    let app = env.router(env.config());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/contentfulEventsHandler")
        .header("X-Contentful-Topic", "ContentManagement.Entry.publish")
        .body(axum::body::Body::from(
            serde_json::to_vec(&valid_payload()).unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Downstream failures
// ============================================================================

/// Verify a rejected insert maps to the insert-specific error text
#[tokio::test]
async fn test_insert_failure_returns_insert_error() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_failure().await;
    let archive = Arc::new(RecordingArchive::default());

    let mut config = env.config();
    config.archive.enabled = true;
    let app = env.router_with_archive(config, Some(archive.clone()));

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_text(response).await,
        "Error inserting data into BigQuery"
    );
    // The archive write stays in place
    assert_eq!(archive.writes.lock().unwrap().len(), 1);
}

/// Verify an unknown space fails the request without inserting
#[tokio::test]
async fn test_space_lookup_failure_returns_error() {
    let env = TestEnvironment::start().await;
    env.mount_insert_success().await;
    let app = env.router(env.config());

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(env.inserted_rows().await.is_empty());
}

/// Verify a missing secret fails before any downstream call
#[tokio::test]
async fn test_secret_failure_precedes_downstream_calls() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let config = env.config();
    env.secrets.remove_secret(
        &SecretName::new(config.secrets.analytics_credential_name.as_str()).unwrap(),
    );
    let archive = Arc::new(RecordingArchive::default());
    let app = env.router_with_archive(config, Some(archive.clone()));

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_text(response).await,
        "Error processing Contentful Webhook"
    );
    assert!(env.received().await.is_empty());
    assert!(archive.writes.lock().unwrap().is_empty());
}

/// Verify a credential that cannot be parsed fails the request
#[tokio::test]
async fn test_malformed_credential_returns_error() {
    let env = TestEnvironment::start().await;
    let config = env.config();
    env.secrets.add_secret(
        SecretName::new(config.secrets.analytics_credential_name.as_str()).unwrap(),
        "{ not json".into(),
    );
    let app = env.router(config);

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(env.received().await.is_empty());
}

// ============================================================================
// Archival
// ============================================================================

/// Verify the raw request is archived before processing
#[tokio::test]
async fn test_raw_request_is_archived() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let archive = Arc::new(RecordingArchive::default());

    let mut config = env.config();
    config.archive.enabled = true;
    let app = env.router_with_archive(config, Some(archive.clone()));

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let writes = archive.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);

    let (container, name, payload) = &writes[0];
    assert_eq!(container, "contentful-webhooks");
    assert!(name.starts_with("contentful-webhook-"));

    let snapshot: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(
        snapshot["headers"]["x-contentful-topic"],
        json!("ContentManagement.Entry.publish")
    );
    assert_eq!(snapshot["query"]["user"], json!("u123"));
    let body: serde_json::Value =
        serde_json::from_str(snapshot["body"].as_str().unwrap()).unwrap();
    assert_eq!(body, valid_payload());
}

/// Verify invalid payloads are still archived
#[tokio::test]
async fn test_invalid_payload_is_archived() {
    let env = TestEnvironment::start().await;
    let archive = Arc::new(RecordingArchive::default());

    let mut config = env.config();
    config.archive.enabled = true;
    let app = env.router_with_archive(config, Some(archive.clone()));

    let response = app
        .oneshot(publish_request(&json!({ "sys": {} })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(archive.writes.lock().unwrap().len(), 1);
}

/// Verify an archive outage does not affect the response
#[tokio::test]
async fn test_archive_failure_does_not_fail_request() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;

    let mut config = env.config();
    config.archive.enabled = true;
    let app = env.router_with_archive(config, Some(Arc::new(UnavailableArchive)));

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.inserted_rows().await.len(), 1);
}

/// Verify the filesystem backend writes one file per request
#[tokio::test]
async fn test_filesystem_archive_backend() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = env.config();
    config.archive.enabled = true;
    config.archive.backend = ArchiveBackend::Filesystem;
    config.archive.directory = dir.path().to_string_lossy().into_owned();
    let storage = FilesystemArchive::new(dir.path().to_path_buf())
        .await
        .unwrap();
    let app = env.router_with_archive(config, Some(Arc::new(storage)));

    let response = app.oneshot(publish_request(&valid_payload())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let files: Vec<_> = std::fs::read_dir(dir.path().join("contentful-webhooks"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("contentful-webhook-"));
}

// ============================================================================
// Secret rotation
// ============================================================================

/// Verify secrets are read on every request so rotation takes effect
#[tokio::test]
async fn test_rotated_token_is_used_on_next_request() {
    let env = TestEnvironment::start().await;
    env.mount_space("abc", "Marketing Site").await;
    env.mount_insert_success().await;
    let config = env.config();
    let token_name = SecretName::new(config.secrets.contentful_token_name.as_str()).unwrap();

    let mut config = config;
    config.clients.reuse = true;
    let app = env.router(config);

    app.clone()
        .oneshot(publish_request(&valid_payload()))
        .await
        .unwrap();
    env.secrets.add_secret(token_name, "cfpat-rotated".into());
    app.oneshot(publish_request(&valid_payload()))
        .await
        .unwrap();

    let space_calls = env.received_on("/spaces/abc").await;
    assert_eq!(space_calls.len(), 2);
    assert_eq!(
        space_calls[1].headers.get("authorization").unwrap(),
        "Bearer cfpat-rotated"
    );
}
