//! Configuration types for the HTTP service
//!
//! Every section carries serde defaults so a partially specified file (or no
//! file at all) deserializes. Values the service cannot run without are
//! checked by [`ServiceConfig::validate`] at startup.

use crate::errors::ConfigError;
use contentful_bridge_core::{
    adapters::{
        bigquery::DEFAULT_BIGQUERY_API_URL, contentful::DEFAULT_CONTENTFUL_API_URL,
        HttpClientSettings,
    },
    archive::DEFAULT_BLOB_PREFIX,
    PipelineSettings, SecretName, SecretNames, TimestampField,
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default path of the webhook endpoint
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/contentfulEventsHandler";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhook: WebhookConfig,

    /// Where the two secrets come from
    pub secrets: SecretsConfig,

    /// BigQuery destination
    pub analytics: AnalyticsConfig,

    /// User id to email resolution
    pub identity: IdentityConfig,

    /// Raw request archival
    pub archive: ArchiveConfig,

    /// Contentful management API
    pub contentful: ContentfulConfig,

    /// Downstream client lifecycle
    pub clients: ClientsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check that every value the service needs is present
    ///
    /// # Errors
    /// Returns the first missing or invalid setting found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.webhook.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "webhook.endpoint_path must start with '/': {}",
                    self.webhook.endpoint_path
                ),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }

        if self.secrets.provider == SecretsBackend::AzureKeyVault
            && self.secrets.vault_name.trim().is_empty()
        {
            return Err(missing("secrets.vault_name"));
        }

        self.secret_names()?;

        if self.analytics.dataset_id.trim().is_empty() {
            return Err(missing("analytics.dataset_id"));
        }
        if self.analytics.table_id.trim().is_empty() {
            return Err(missing("analytics.table_id"));
        }

        if self.identity.enabled && self.identity.organization_id.trim().is_empty() {
            return Err(missing("identity.organization_id"));
        }

        if self.clients.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "clients.timeout_seconds must be greater than zero".to_string(),
            });
        }

        if self.archive.enabled {
            self.archive.validate()?;
        }

        Ok(())
    }

    /// Validated secret names
    ///
    /// # Errors
    /// Returns error if either name breaks the vault naming rules
    pub fn secret_names(&self) -> Result<SecretNames, ConfigError> {
        let parse = |key: &str, value: &str| {
            SecretName::new(value).map_err(|e| ConfigError::Invalid {
                message: format!("{}: {}", key, e),
            })
        };

        Ok(SecretNames {
            contentful_token: parse(
                "secrets.contentful_token_name",
                &self.secrets.contentful_token_name,
            )?,
            analytics_credential: parse(
                "secrets.analytics_credential_name",
                &self.secrets.analytics_credential_name,
            )?,
        })
    }

    /// Settings handed to the event pipeline
    ///
    /// # Errors
    /// Returns error if the secret names are invalid
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        Ok(PipelineSettings {
            secret_names: self.secret_names()?,
            dataset_id: self.analytics.dataset_id.clone(),
            table_id: self.analytics.table_id.clone(),
            timestamp_field: self.analytics.timestamp_field,
            organization_id: self
                .identity
                .enabled
                .then(|| self.identity.organization_id.clone()),
        })
    }

    /// Settings for the downstream HTTP clients
    pub fn client_settings(&self) -> HttpClientSettings {
        HttpClientSettings {
            contentful_api_url: self.contentful.api_url.clone(),
            bigquery_api_url: self.analytics.api_url.clone(),
            project_id: self
                .analytics
                .project_id
                .clone()
                .filter(|p| !p.trim().is_empty()),
            timeout: Duration::from_secs(self.clients.timeout_seconds),
        }
    }
}

fn missing(key: &str) -> ConfigError {
    ConfigError::Missing {
        key: key.to_string(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Path the Contentful webhook posts to
    pub endpoint_path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
        }
    }
}

/// Secret store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretsBackend {
    /// Azure Key Vault via the ambient Azure identity
    #[default]
    AzureKeyVault,

    /// Process environment variables
    Environment,
}

/// Secret store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub provider: SecretsBackend,

    /// Key Vault name, used as `https://{vault_name}.vault.azure.net`
    pub vault_name: String,

    /// Prefix for variables when `provider = environment`
    pub env_prefix: String,

    /// Name of the Contentful management token secret
    pub contentful_token_name: String,

    /// Name of the BigQuery service-account credential secret
    pub analytics_credential_name: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            provider: SecretsBackend::default(),
            vault_name: String::new(),
            env_prefix: "CB_SECRET_".to_string(),
            contentful_token_name: "contentful-access-token".to_string(),
            analytics_credential_name: "bigquery-credential".to_string(),
        }
    }
}

/// BigQuery destination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub dataset_id: String,
    pub table_id: String,

    /// Overrides the project named in the service-account credential
    pub project_id: Option<String>,

    /// Payload timestamp written to the `date` column
    pub timestamp_field: TimestampField,

    /// BigQuery REST base URL
    pub api_url: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            dataset_id: String::new(),
            table_id: String::new(),
            project_id: None,
            timestamp_field: TimestampField::default(),
            api_url: DEFAULT_BIGQUERY_API_URL.to_string(),
        }
    }
}

/// Identity resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Replace user ids with organization member emails
    pub enabled: bool,

    /// Contentful organization the users belong to
    pub organization_id: String,
}

/// Archive storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveBackend {
    #[default]
    AzureBlob,
    Filesystem,
}

/// Raw request archival configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub backend: ArchiveBackend,

    /// Azure storage account name
    pub account_name: String,

    /// Azure storage account key (base64)
    pub account_key: Option<String>,

    /// Container (or directory under `directory`) receiving the archives
    pub container: String,

    /// Prefix of every archived blob name
    pub blob_prefix: String,

    /// Blob endpoint override, e.g. for Azurite
    pub endpoint: Option<String>,

    /// Root directory for the filesystem backend
    pub directory: String,
}

impl ArchiveConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.container.trim().is_empty() {
            return Err(missing("archive.container"));
        }

        match self.backend {
            ArchiveBackend::AzureBlob => {
                if self.account_name.trim().is_empty() {
                    return Err(missing("archive.account_name"));
                }
                if self
                    .account_key
                    .as_deref()
                    .map_or(true, |k| k.trim().is_empty())
                {
                    return Err(missing("archive.account_key"));
                }
            }
            ArchiveBackend::Filesystem => {
                if self.directory.trim().is_empty() {
                    return Err(missing("archive.directory"));
                }
            }
        }

        Ok(())
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: ArchiveBackend::default(),
            account_name: String::new(),
            account_key: None,
            container: "contentful-webhooks".to_string(),
            blob_prefix: DEFAULT_BLOB_PREFIX.to_string(),
            endpoint: None,
            directory: "archive".to_string(),
        }
    }
}

impl fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("enabled", &self.enabled)
            .field("backend", &self.backend)
            .field("account_name", &self.account_name)
            .field(
                "account_key",
                &self.account_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("container", &self.container)
            .field("blob_prefix", &self.blob_prefix)
            .field("endpoint", &self.endpoint)
            .field("directory", &self.directory)
            .finish()
    }
}

/// Contentful management API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentfulConfig {
    pub api_url: String,
}

impl Default for ContentfulConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CONTENTFUL_API_URL.to_string(),
        }
    }
}

/// Downstream client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    /// Keep built clients until the secrets change
    pub reuse: bool,

    /// Per-call HTTP timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            reuse: false,
            timeout_seconds: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable JSON structured logging
    pub json_format: bool,
}
