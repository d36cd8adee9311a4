//! # BigQuery Analytics Sink
//!
//! Streams rows into BigQuery with `tabledata.insertAll`.
//!
//! Access tokens come from the OAuth 2.0 JWT bearer flow: an RS256 assertion
//! signed with the service-account key is exchanged at the credential's
//! `token_uri`.
//!
//! ## References
//!
//! - [tabledata.insertAll](https://cloud.google.com/bigquery/docs/reference/rest/v2/tabledata/insertAll)
//! - [Service account OAuth](https://developers.google.com/identity/protocols/oauth2/service-account#httprest)

use crate::{
    analytics::{AnalyticsError, AnalyticsRow, AnalyticsSink, RowErrorDetail},
    pipeline::ClientBuildError,
    secrets::ServiceAccountCredential,
};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

#[cfg(test)]
#[path = "bigquery_tests.rs"]
mod tests;

/// Public BigQuery REST endpoint
pub const DEFAULT_BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// OAuth scope allowing streaming inserts
pub const BIGQUERY_INSERT_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.insertdata";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// Access Tokens
// ============================================================================

/// Source of OAuth access tokens for BigQuery calls
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// # Errors
    /// - `AnalyticsError::Authentication` - the token endpoint refused the assertion
    /// - `AnalyticsError::Transport` - the token endpoint could not be reached
    async fn access_token(&self) -> Result<String, AnalyticsError>;
}

/// Fixed token, for emulators and tests
#[derive(Clone)]
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, AnalyticsError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Exchanges signed service-account assertions for access tokens
///
/// Tokens are reused until shortly before they expire.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    private_key_id: Option<String>,
    token_uri: String,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// # Errors
    /// Returns error if the credential's private key is not an RSA PEM key
    pub fn new(
        http: reqwest::Client,
        credential: &ServiceAccountCredential,
    ) -> Result<Self, ClientBuildError> {
        let signing_key = EncodingKey::from_rsa_pem(credential.private_key_pem().as_bytes())
            .map_err(|e| {
                ClientBuildError::new(format!("Service account private key is unusable: {}", e))
            })?;

        Ok(Self {
            http,
            client_email: credential.client_email.clone(),
            private_key_id: credential.private_key_id.clone(),
            token_uri: credential.token_uri.clone(),
            signing_key,
            cached: Mutex::new(None),
        })
    }

    /// Signed RS256 assertion for the token exchange
    pub(crate) fn assertion(&self) -> Result<String, AnalyticsError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: BIGQUERY_INSERT_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        encode(&header, &claims, &self.signing_key).map_err(|e| AnalyticsError::Authentication {
            message: format!("Failed to sign assertion: {}", e),
        })
    }

    async fn exchange(&self) -> Result<CachedToken, AnalyticsError> {
        let assertion = self.assertion()?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AnalyticsError::Transport {
                message: format!("Token endpoint unreachable: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyticsError::Authentication {
                message: format!("Token exchange failed with status {}: {}", status.as_u16(), body),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| AnalyticsError::Authentication {
                    message: format!("Unexpected token response: {}", e),
                })?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, AnalyticsError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!(client_email = %self.client_email, "Exchanging service account assertion");
        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct InsertAllRequest<'a> {
    rows: Vec<InsertRow<'a>>,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    json: &'a AnalyticsRow,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowInsertErrors>,
}

#[derive(Debug, Deserialize)]
struct RowInsertErrors {
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

impl From<ErrorProto> for RowErrorDetail {
    fn from(e: ErrorProto) -> Self {
        Self {
            field: e.location.filter(|l| !l.is_empty()),
            reason: e.reason.unwrap_or_else(|| "unknown".to_string()),
            message: e.message.unwrap_or_default(),
        }
    }
}

/// Normalise a non-2xx BigQuery response body into row error details
fn details_from_error_body(status: StatusCode, body: &str) -> Vec<RowErrorDetail> {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.errors.is_empty() => envelope
            .error
            .errors
            .into_iter()
            .map(RowErrorDetail::from)
            .collect(),
        Ok(envelope) => vec![RowErrorDetail {
            field: None,
            reason: envelope
                .error
                .status
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: envelope.error.message.unwrap_or_default(),
        }],
        Err(_) => vec![RowErrorDetail {
            field: None,
            reason: status.as_u16().to_string(),
            message: body.to_string(),
        }],
    }
}

// ============================================================================
// Client
// ============================================================================

/// BigQuery streaming-insert client
#[derive(Clone)]
pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: Url,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl BigQueryClient {
    /// # Errors
    /// Returns error if `base_url` is not a usable base URL or the project is empty
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, ClientBuildError> {
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(ClientBuildError::new("BigQuery project id is required"));
        }

        let base_url = Url::parse(base_url).map_err(|e| {
            ClientBuildError::new(format!("Invalid BigQuery API URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientBuildError::new(format!(
                "BigQuery API URL '{}' cannot be a base URL",
                base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            project_id,
            tokens,
        })
    }

    /// Project rows are written to
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn insert_all_url(&self, dataset_id: &str, table_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend([
                "projects",
                self.project_id.as_str(),
                "datasets",
                dataset_id,
                "tables",
                table_id,
                "insertAll",
            ]);
        }
        url
    }
}

#[async_trait]
impl AnalyticsSink for BigQueryClient {
    #[instrument(skip(self, row), fields(project_id = %self.project_id))]
    async fn insert_row(
        &self,
        dataset_id: &str,
        table_id: &str,
        row: &AnalyticsRow,
    ) -> Result<(), AnalyticsError> {
        let token = self.tokens.access_token().await?;
        let request = InsertAllRequest {
            rows: vec![InsertRow { json: row }],
        };

        let response = self
            .http
            .post(self.insert_all_url(dataset_id, table_id))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalyticsError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AnalyticsError::Transport {
            message: format!("Failed to read response body: {}", e),
        })?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(AnalyticsError::Authentication { message: body });
        }

        if !status.is_success() {
            let details = details_from_error_body(status, &body);
            warn!(status = status.as_u16(), "BigQuery rejected insert request");
            return Err(AnalyticsError::InsertFailed { details });
        }

        let parsed: InsertAllResponse = if body.trim().is_empty() {
            InsertAllResponse::default()
        } else {
            serde_json::from_str(&body).map_err(|e| AnalyticsError::InvalidResponse {
                message: e.to_string(),
            })?
        };

        if parsed.insert_errors.is_empty() {
            debug!("Row inserted");
            return Ok(());
        }

        let details: Vec<RowErrorDetail> = parsed
            .insert_errors
            .into_iter()
            .flat_map(|row| row.errors)
            .map(RowErrorDetail::from)
            .collect();
        warn!(errors = details.len(), "BigQuery reported row insert errors");
        Err(AnalyticsError::InsertFailed { details })
    }
}
