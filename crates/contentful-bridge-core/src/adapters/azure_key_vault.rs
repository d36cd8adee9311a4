//! # Azure Key Vault Implementation
//!
//! Production secret lookup against Azure Key Vault using the Azure SDK and
//! the default Azure credential chain (managed identity in Azure, Azure CLI
//! locally). Values are fetched on every call and never cached.

use crate::secrets::{SecretError, SecretName, SecretProvider, SecretValue};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_security_keyvault::SecretClient;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Vault URL for a vault name
pub fn vault_url(vault_name: &str) -> String {
    format!("https://{}.vault.azure.net", vault_name)
}

/// Azure Key Vault secret provider
pub struct AzureKeyVaultProvider {
    client: SecretClient,
    vault_url: String,
}

impl AzureKeyVaultProvider {
    /// Create provider for `vault_name` with the default credential chain
    ///
    /// # Errors
    /// Returns error if the vault name is empty or no credential is available
    #[instrument]
    pub fn new(vault_name: &str) -> Result<Self, SecretError> {
        let credential =
            azure_identity::create_credential().map_err(|e| SecretError::Configuration {
                message: format!("Failed to create Azure credential: {}", e),
            })?;

        Self::with_credential(vault_name, credential)
    }

    /// Create provider with a custom credential
    #[instrument(skip(credential))]
    pub fn with_credential(
        vault_name: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, SecretError> {
        if vault_name.is_empty() {
            return Err(SecretError::Configuration {
                message: "vault name is required".to_string(),
            });
        }

        let vault_url = vault_url(vault_name);
        info!(vault_url = %vault_url, "Initializing Azure Key Vault provider");

        let client =
            SecretClient::new(&vault_url, credential).map_err(|e| SecretError::Configuration {
                message: format!("Failed to create Key Vault client: {}", e),
            })?;

        Ok(Self { client, vault_url })
    }

    /// URL of the vault this provider reads from
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }
}

#[async_trait]
impl SecretProvider for AzureKeyVaultProvider {
    #[instrument(skip(self))]
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, SecretError> {
        debug!(secret_name = %name, "Fetching secret from Azure Key Vault");

        match self.client.get(name.as_str()).await {
            Ok(secret) => {
                debug!(secret_name = %name, "Retrieved secret from Key Vault");
                Ok(SecretValue::from_string(secret.value))
            }
            Err(e) => {
                error!(secret_name = %name, error = %e, "Failed to retrieve secret from Key Vault");
                Err(map_vault_error(name, &e.to_string()))
            }
        }
    }
}

/// Classify an SDK error message
fn map_vault_error(name: &SecretName, message: &str) -> SecretError {
    if message.contains("404") || message.contains("NotFound") {
        SecretError::SecretNotFound { name: name.clone() }
    } else if message.contains("403")
        || message.contains("401")
        || message.contains("Forbidden")
        || message.contains("Unauthorized")
    {
        SecretError::AccessDenied {
            name: name.clone(),
            reason: message.to_string(),
        }
    } else if message.contains("503")
        || message.contains("ServiceUnavailable")
        || message.contains("timeout")
        || message.contains("Timeout")
    {
        SecretError::ServiceUnavailable {
            message: message.to_string(),
        }
    } else {
        SecretError::Internal {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> SecretName {
        SecretName::new("contentful-token").unwrap()
    }

    #[test]
    fn test_vault_url() {
        assert_eq!(vault_url("my-vault"), "https://my-vault.vault.azure.net");
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            map_vault_error(&name(), "HTTP 404 SecretNotFound"),
            SecretError::SecretNotFound { .. }
        ));
        assert!(map_vault_error(&name(), "HTTP 403 Forbidden").is_permission_error());
        assert!(matches!(
            map_vault_error(&name(), "HTTP 503 ServiceUnavailable"),
            SecretError::ServiceUnavailable { .. }
        ));
        assert!(matches!(
            map_vault_error(&name(), "connection reset"),
            SecretError::Internal { .. }
        ));
    }
}
