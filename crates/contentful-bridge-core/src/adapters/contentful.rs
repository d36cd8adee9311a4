//! # Contentful Management API Client
//!
//! Implements [`SpaceDirectory`] and [`IdentityResolver`] against the
//! Contentful Management API with a bearer management token.

use crate::{
    directory::{DirectoryError, IdentityResolver, SpaceDirectory},
    pipeline::ClientBuildError,
    secrets::SecretValue,
};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

#[cfg(test)]
#[path = "contentful_tests.rs"]
mod tests;

/// Public Contentful Management API endpoint
pub const DEFAULT_CONTENTFUL_API_URL: &str = "https://api.contentful.com";

const MANAGEMENT_MEDIA_TYPE: &str = "application/vnd.contentful.management.v1+json";

#[derive(Debug, Deserialize)]
struct SpaceResource {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserResource {
    email: String,
}

/// A failed call, before it is attributed to a space or user lookup
struct CallFailure {
    status: Option<u16>,
    message: String,
}

/// Contentful Management API client
#[derive(Clone)]
pub struct ContentfulClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretValue,
}

impl ContentfulClient {
    /// Create client for `base_url` authenticating with the management token
    ///
    /// # Errors
    /// Returns error if `base_url` is not a usable base URL
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: SecretValue,
    ) -> Result<Self, ClientBuildError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ClientBuildError::new(format!("Invalid Contentful API URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientBuildError::new(format!(
                "Contentful API URL '{}' cannot be a base URL",
                base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn resource_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, CallFailure> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .header(header::ACCEPT, MANAGEMENT_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| CallFailure {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CallFailure {
                status: Some(status.as_u16()),
                message,
            });
        }

        response.json().await.map_err(|e| CallFailure {
            status: Some(status.as_u16()),
            message: format!("Unexpected response body: {}", e),
        })
    }
}

#[async_trait]
impl SpaceDirectory for ContentfulClient {
    #[instrument(skip(self))]
    async fn space_name(&self, space_id: &str) -> Result<String, DirectoryError> {
        let url = self.resource_url(&["spaces", space_id]);

        let space: SpaceResource =
            self.get_json(url)
                .await
                .map_err(|f| DirectoryError::SpaceLookupFailed {
                    space_id: space_id.to_string(),
                    status: f.status,
                    message: f.message,
                })?;

        debug!(space_name = %space.name, "Resolved space name");
        Ok(space.name)
    }
}

#[async_trait]
impl IdentityResolver for ContentfulClient {
    #[instrument(skip(self))]
    async fn resolve_email(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<String, DirectoryError> {
        let url = self.resource_url(&["organizations", organization_id, "users", user_id]);

        let user: UserResource =
            self.get_json(url)
                .await
                .map_err(|f| DirectoryError::UserLookupFailed {
                    organization_id: organization_id.to_string(),
                    user_id: user_id.to_string(),
                    status: f.status,
                    message: f.message,
                })?;

        debug!("Resolved user email");
        Ok(user.email)
    }
}
