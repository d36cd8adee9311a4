//! # Azure Blob Archive Adapter
//!
//! Writes archive blobs with the Blob service `Put Blob` REST operation,
//! authorized with the storage account's Shared Key.
//!
//! ## References
//!
//! - [Put Blob](https://learn.microsoft.com/rest/api/storageservices/put-blob)
//! - [Authorize with Shared Key](https://learn.microsoft.com/rest/api/storageservices/authorize-with-shared-key)

use crate::{
    archive::{ArchiveError, ArchiveStorage},
    secrets::SecretValue,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{header, StatusCode};
use sha2::Sha256;
use tracing::{debug, instrument, warn};
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "azure_blob_archive_tests.rs"]
mod tests;

/// Blob service REST API version sent with every request
pub const STORAGE_API_VERSION: &str = "2021-08-06";

const BLOB_CONTENT_TYPE: &str = "application/json";

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Shared Key Signing
// ============================================================================

/// Shared Key request signer for one storage account
#[derive(Clone)]
struct SharedKeySigner {
    account: String,
    key: Zeroizing<Vec<u8>>,
}

impl SharedKeySigner {
    fn new(account: &str, account_key: &SecretValue) -> Result<Self, ArchiveError> {
        let key = STANDARD
            .decode(account_key.expose_secret().trim())
            .map_err(|e| ArchiveError::Configuration {
                message: format!("Storage account key is not valid base64: {}", e),
            })?;

        Ok(Self {
            account: account.to_string(),
            key: Zeroizing::new(key),
        })
    }

    /// Build the `Authorization` header value for a Put Blob request
    ///
    /// `ms_headers` must hold every `x-ms-*` header sent with the request.
    fn authorization(
        &self,
        url: &Url,
        content_length: usize,
        ms_headers: &[(&str, &str)],
    ) -> Result<String, ArchiveError> {
        let string_to_sign = put_blob_string_to_sign(
            &self.account,
            url,
            content_length,
            BLOB_CONTENT_TYPE,
            ms_headers,
        );
        let signature = sign(&self.key, &string_to_sign)?;
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

/// Shared Key string-to-sign for a `PUT` with a body
///
/// Content-Length is empty when zero, per the 2015-02-21+ signing rules.
fn put_blob_string_to_sign(
    account: &str,
    url: &Url,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
) -> String {
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut canonical_headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    canonical_headers.sort();
    let canonical_headers: String = canonical_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    format!(
        "PUT\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}/{}{}",
        content_length,
        content_type,
        canonical_headers,
        account,
        url.path()
    )
}

/// Base64 HMAC-SHA256 of `string_to_sign` under the decoded account key
fn sign(key: &[u8], string_to_sign: &str) -> Result<String, ArchiveError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| ArchiveError::Configuration {
        message: format!("Invalid storage account key: {}", e),
    })?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `x-ms-date` value (RFC 1123)
fn ms_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ============================================================================
// Archive Storage
// ============================================================================

/// Azure Blob Storage archive backend
#[derive(Clone)]
pub struct AzureBlobArchive {
    http: reqwest::Client,
    endpoint: Url,
    signer: SharedKeySigner,
}

impl AzureBlobArchive {
    /// Create archive for `account` at its public blob endpoint
    ///
    /// # Errors
    /// Returns error if the account name is empty or the key is not base64
    pub fn new(
        http: reqwest::Client,
        account: &str,
        account_key: &SecretValue,
    ) -> Result<Self, ArchiveError> {
        let endpoint = format!("https://{}.blob.core.windows.net", account);
        Self::with_endpoint(http, account, account_key, &endpoint)
    }

    /// Create archive against an explicit endpoint (sovereign clouds, Azurite)
    pub fn with_endpoint(
        http: reqwest::Client,
        account: &str,
        account_key: &SecretValue,
        endpoint: &str,
    ) -> Result<Self, ArchiveError> {
        if account.is_empty() {
            return Err(ArchiveError::Configuration {
                message: "storage account name is required".to_string(),
            });
        }

        let endpoint = Url::parse(endpoint).map_err(|e| ArchiveError::Configuration {
            message: format!("Invalid blob endpoint '{}': {}", endpoint, e),
        })?;

        Ok(Self {
            http,
            endpoint,
            signer: SharedKeySigner::new(account, account_key)?,
        })
    }

    fn blob_url(&self, container: &str, name: &str) -> Result<Url, ArchiveError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ArchiveError::Configuration {
                message: format!("Blob endpoint '{}' cannot be a base URL", self.endpoint),
            })?
            .pop_if_empty()
            .push(container)
            .push(name);
        Ok(url)
    }
}

#[async_trait]
impl ArchiveStorage for AzureBlobArchive {
    #[instrument(skip(self, payload), fields(size = payload.len()))]
    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
    ) -> Result<Option<String>, ArchiveError> {
        let url = self.blob_url(container, name)?;
        let date = ms_date(Utc::now());
        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", STORAGE_API_VERSION),
        ];
        let authorization = self
            .signer
            .authorization(&url, payload.len(), &ms_headers)?;

        debug!(url = %url, "Uploading archive blob");

        let mut request = self
            .http
            .put(url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::CONTENT_TYPE, BLOB_CONTENT_TYPE);
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| ArchiveError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-ms-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status.is_success() {
            return Ok(request_id);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), request_id = ?request_id, "Blob upload rejected");

        Err(match status {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ArchiveError::PermissionDenied {
                message: body,
            },
            s if s.is_server_error() => ArchiveError::Unavailable {
                message: format!("status {}: {}", s.as_u16(), body),
            },
            s => ArchiveError::Rejected {
                status: s.as_u16(),
                message: body,
            },
        })
    }
}
