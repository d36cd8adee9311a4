//! # Environment Secret Provider
//!
//! Reads secrets from process environment variables, for local runs without
//! a vault. The variable name is the secret name upper-cased with `-`
//! replaced by `_`, behind an optional prefix:
//! `contentful-token` → `CONTENTFUL_TOKEN`.
//!
//! Variables are read on every lookup, so a changed value is picked up by
//! the next request.

use crate::secrets::{SecretError, SecretName, SecretProvider, SecretValue};
use async_trait::async_trait;
use std::env;
use tracing::debug;

#[cfg(test)]
#[path = "environment_secrets_tests.rs"]
mod tests;

/// Secret provider backed by environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSecretProvider {
    prefix: String,
}

impl EnvironmentSecretProvider {
    /// Provider reading unprefixed variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider reading variables that start with `prefix`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable holding `name`
    pub fn variable_name(&self, name: &SecretName) -> String {
        format!(
            "{}{}",
            self.prefix,
            name.as_str().to_ascii_uppercase().replace('-', "_")
        )
    }
}

#[async_trait]
impl SecretProvider for EnvironmentSecretProvider {
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, SecretError> {
        let variable = self.variable_name(name);
        debug!(secret_name = %name, variable = %variable, "Reading secret from environment");

        match env::var(&variable) {
            Ok(value) if !value.is_empty() => Ok(SecretValue::from_string(value)),
            Ok(_) | Err(env::VarError::NotPresent) => {
                Err(SecretError::SecretNotFound { name: name.clone() })
            }
            Err(env::VarError::NotUnicode(_)) => Err(SecretError::Internal {
                message: format!("Environment variable {} is not valid UTF-8", variable),
            }),
        }
    }
}
