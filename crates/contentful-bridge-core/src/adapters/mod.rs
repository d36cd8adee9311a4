//! # Infrastructure Adapters
//!
//! Implementations of the secret, archive, directory and analytics
//! interfaces against real services and local stand-ins.

pub mod azure_blob_archive;
pub mod bigquery;
pub mod contentful;
pub mod environment_secrets;
pub mod filesystem_archive;
pub mod http_clients;
pub mod memory_secrets;

#[cfg(feature = "azure")]
pub mod azure_key_vault;

pub use azure_blob_archive::AzureBlobArchive;
pub use bigquery::{AccessTokenSource, BigQueryClient, ServiceAccountTokenSource, StaticTokenSource};
pub use contentful::ContentfulClient;
pub use environment_secrets::EnvironmentSecretProvider;
pub use filesystem_archive::FilesystemArchive;
pub use http_clients::{HttpClientFactory, HttpClientSettings};
pub use memory_secrets::InMemorySecretProvider;

#[cfg(feature = "azure")]
pub use azure_key_vault::AzureKeyVaultProvider;
