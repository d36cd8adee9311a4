//! # HTTP Client Factory
//!
//! Builds the Contentful and BigQuery clients for a request from its freshly
//! fetched secrets. The underlying `reqwest::Client` (connection pool and
//! timeout) is shared; everything bound to a credential is built anew.

use super::{
    bigquery::{BigQueryClient, ServiceAccountTokenSource, DEFAULT_BIGQUERY_API_URL},
    contentful::{ContentfulClient, DEFAULT_CONTENTFUL_API_URL},
};
use crate::{
    pipeline::{ClientBuildError, ClientFactory, PipelineClients},
    secrets::SecretBundle,
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[cfg(test)]
#[path = "http_clients_tests.rs"]
mod tests;

/// Endpoint and transport settings for the downstream clients
#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub contentful_api_url: String,
    pub bigquery_api_url: String,

    /// Overrides the project named in the service-account credential
    pub project_id: Option<String>,

    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            contentful_api_url: DEFAULT_CONTENTFUL_API_URL.to_string(),
            bigquery_api_url: DEFAULT_BIGQUERY_API_URL.to_string(),
            project_id: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`ClientFactory`] producing the production HTTP clients
pub struct HttpClientFactory {
    http: reqwest::Client,
    settings: HttpClientSettings,
}

impl HttpClientFactory {
    /// # Errors
    /// Returns error if the HTTP client cannot be initialised
    pub fn new(settings: HttpClientSettings) -> Result<Self, ClientBuildError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("contentful-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientBuildError::new(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, settings })
    }

    /// Settings in use
    pub fn settings(&self) -> &HttpClientSettings {
        &self.settings
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, secrets: &SecretBundle) -> Result<PipelineClients, ClientBuildError> {
        let credential = &secrets.analytics_credential;

        let project_id = self
            .settings
            .project_id
            .clone()
            .or_else(|| credential.project_id.clone())
            .ok_or_else(|| {
                ClientBuildError::new(
                    "No BigQuery project configured and none in the service account credential",
                )
            })?;

        let contentful = Arc::new(ContentfulClient::new(
            self.http.clone(),
            &self.settings.contentful_api_url,
            secrets.contentful_token.clone(),
        )?);

        let tokens = Arc::new(ServiceAccountTokenSource::new(self.http.clone(), credential)?);
        let bigquery = Arc::new(BigQueryClient::new(
            self.http.clone(),
            &self.settings.bigquery_api_url,
            project_id,
            tokens,
        )?);

        debug!(project_id = %bigquery.project_id(), "Constructed downstream clients");

        Ok(PipelineClients {
            spaces: contentful.clone(),
            identities: contentful,
            analytics: bigquery,
        })
    }
}
