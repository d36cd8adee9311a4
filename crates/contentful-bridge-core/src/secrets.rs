//! # Secrets Module
//!
//! Named secret lookup and the credential material derived from it.
//!
//! Two secrets are needed per request: the Contentful management token and
//! the BigQuery service-account credential. Both are fetched fresh from the
//! [`SecretProvider`] on every request and never cached or persisted.

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;

/// Default OAuth token endpoint for Google service accounts
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

// ============================================================================
// Core Types
// ============================================================================

/// Secret identifier with naming convention validation
///
/// Follows Azure Key Vault naming rules so the same names work against the
/// vault and the local providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretName(String);

impl SecretName {
    /// Create new secret name with validation
    ///
    /// # Validation Rules
    /// - Must be 1-127 characters (Azure Key Vault limit)
    /// - Must contain only alphanumeric characters and hyphens
    pub fn new(name: impl Into<String>) -> Result<Self, SecretError> {
        let name = name.into();

        if name.is_empty() {
            return Err(SecretError::InvalidSecretName {
                name: name.clone(),
                reason: "Secret name cannot be empty".to_string(),
            });
        }

        if name.len() > 127 {
            return Err(SecretError::InvalidSecretName {
                name: name.clone(),
                reason: "Secret name exceeds 127 character limit".to_string(),
            });
        }

        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SecretError::InvalidSecretName {
                name: name.clone(),
                reason: "Secret name contains invalid characters".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SecretName {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Secure container for secret values
///
/// The backing buffer is zeroized on drop. Values never appear in `Debug`
/// output or logs.
#[derive(Clone)]
pub struct SecretValue {
    inner: Zeroizing<String>,
}

impl SecretValue {
    /// Create secret value from string
    pub fn from_string(value: String) -> Self {
        Self {
            inner: Zeroizing::new(value),
        }
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Get secret as bytes
    pub fn expose_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get secret length without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::from_string(value.to_string())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Names of the two secrets fetched on every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretNames {
    /// Contentful management API token
    pub contentful_token: SecretName,

    /// BigQuery service-account credential (JSON)
    pub analytics_credential: SecretName,
}

// ============================================================================
// Service Account Credential
// ============================================================================

/// Google service-account credential used by the analytics client
///
/// The vault stores the credential as a single-line JSON document, so the
/// private key arrives with literal `\n` escape sequences. [`Self::from_secret`]
/// restores real newlines before the key is handed to the signer.
#[derive(Clone)]
pub struct ServiceAccountCredential {
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub client_email: String,
    pub token_uri: String,
    private_key: SecretValue,
}

#[derive(Deserialize)]
struct RawServiceAccount {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl ServiceAccountCredential {
    /// Build a credential from explicit parts
    pub fn new(
        client_email: impl Into<String>,
        private_key_pem: impl Into<String>,
        project_id: Option<String>,
    ) -> Self {
        Self {
            project_id,
            private_key_id: None,
            client_email: client_email.into(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            private_key: SecretValue::from_string(unescape_private_key(&private_key_pem.into())),
        }
    }

    /// Parse the credential JSON held in a secret
    pub fn from_secret(secret: &SecretValue) -> Result<Self, CredentialError> {
        let raw: RawServiceAccount = serde_json::from_str(secret.expose_secret())
            .map_err(|e| CredentialError::Malformed {
                message: e.to_string(),
            })?;

        let client_email = raw
            .client_email
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CredentialError::MissingField {
                field: "client_email".to_string(),
            })?;

        let private_key = raw
            .private_key
            .filter(|v| !v.is_empty())
            .map(|key| SecretValue::from_string(unescape_private_key(&key)))
            .ok_or_else(|| CredentialError::MissingField {
                field: "private_key".to_string(),
            })?;

        Ok(Self {
            project_id: raw.project_id.filter(|v| !v.is_empty()),
            private_key_id: raw.private_key_id.filter(|v| !v.is_empty()),
            client_email,
            token_uri: raw
                .token_uri
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            private_key,
        })
    }

    /// PEM-encoded private key with real newlines
    pub fn private_key_pem(&self) -> &str {
        self.private_key.expose_secret()
    }
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Replace literal backslash-n sequences with real newlines
pub fn unescape_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}

/// Errors produced while interpreting credential material
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential is not valid JSON: {message}")]
    Malformed { message: String },

    #[error("Credential is missing field: {field}")]
    MissingField { field: String },
}

// ============================================================================
// Secret Bundle
// ============================================================================

/// The credential material for one request
#[derive(Debug, Clone)]
pub struct SecretBundle {
    pub contentful_token: SecretValue,
    pub analytics_credential: ServiceAccountCredential,
}

impl SecretBundle {
    /// Create new bundle
    pub fn new(contentful_token: SecretValue, analytics_credential: ServiceAccountCredential) -> Self {
        Self {
            contentful_token,
            analytics_credential,
        }
    }

    /// SHA-256 fingerprint of the bundle, hex encoded
    ///
    /// Changes whenever either credential is rotated. Never reveals the
    /// secret material itself.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.contentful_token.expose_bytes());
        hasher.update([0u8]);
        hasher.update(self.analytics_credential.client_email.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.analytics_credential.private_key_pem().as_bytes());
        hasher.update([0u8]);
        hasher.update(
            self.analytics_credential
                .project_id
                .as_deref()
                .unwrap_or_default()
                .as_bytes(),
        );
        hasher.update([0u8]);
        hasher.update(self.analytics_credential.token_uri.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// ============================================================================
// Interface Traits
// ============================================================================

/// Interface for named secret lookup
///
/// Pure lookup: implementations must not cache values between calls.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Get secret by name
    ///
    /// # Errors
    /// - `SecretError::SecretNotFound` - Secret doesn't exist
    /// - `SecretError::AccessDenied` - Insufficient permissions
    /// - `SecretError::ServiceUnavailable` - Vault unreachable
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, SecretError>;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during secret retrieval
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not found: {name}")]
    SecretNotFound { name: SecretName },

    #[error("Access denied to secret: {name} - {reason}")]
    AccessDenied { name: SecretName, reason: String },

    #[error("Secret vault unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Invalid secret name: {name} - {reason}")]
    InvalidSecretName { name: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SecretError {
    /// Check if error indicates permission problems
    pub fn is_permission_error(&self) -> bool {
        matches!(self, SecretError::AccessDenied { .. })
    }
}
