//! # Contentful Bridge Service
//!
//! Binary entry point for the Contentful to BigQuery bridge.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Builds the secret provider, archive backend and client factory
//! - Starts the HTTP server from contentful-bridge-api

mod config_loader;

use anyhow::Context;
use contentful_bridge_api::{
    start_server, AppState, ArchiveBackend, SecretsBackend, SecretsConfig, ServiceConfig,
    ServiceError, ServiceMetrics,
};
use contentful_bridge_core::{
    adapters::{AzureBlobArchive, EnvironmentSecretProvider, FilesystemArchive, HttpClientFactory},
    ArchivalSink, ArchiveStorage, CachingClientFactory, ClientFactory, EventPipeline,
    SecretProvider, SecretValue,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "contentful_bridge_service=info,contentful_bridge_api=info,contentful_bridge_core=info,tower_http=info";

#[tokio::main]
async fn main() {
    let loaded = config_loader::load_config();

    let json_format = loaded
        .as_ref()
        .map(|c| c.logging.json_format)
        .unwrap_or(false);
    init_logging(json_format);

    info!("Starting Contentful Bridge Service");
    if let Some(path) = config_loader::explicit_config_path() {
        info!(path = %path, "Loaded configuration from explicit path");
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(
                error = %e,
                "Could not load service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let state = match build_state(config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize service; aborting");
            std::process::exit(3);
        }
    };

    if let Err(e) = start_server(state).await {
        error!(error = %e, "HTTP server failed");

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
            ServiceError::Metrics { .. } => 4,
        };

        std::process::exit(exit_code);
    }
}

fn init_logging(json_format: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

// ============================================================================
// Dependency wiring
// ============================================================================

async fn build_state(config: ServiceConfig) -> anyhow::Result<AppState> {
    let secrets = build_secret_provider(&config.secrets)?;

    let http_factory = HttpClientFactory::new(config.client_settings())
        .context("Failed to create downstream client factory")?;
    let clients: Arc<dyn ClientFactory> = if config.clients.reuse {
        info!("Reusing downstream clients until the secrets change");
        Arc::new(CachingClientFactory::new(Arc::new(http_factory)))
    } else {
        Arc::new(http_factory)
    };

    let mut pipeline = EventPipeline::new(secrets, clients, config.pipeline_settings()?);
    if let Some(sink) = build_archival(&config).await? {
        pipeline = pipeline.with_archival(sink);
    }

    let metrics = ServiceMetrics::new().context("Failed to register metrics")?;

    info!(
        dataset_id = %config.analytics.dataset_id,
        table_id = %config.analytics.table_id,
        identity_resolution = config.identity.enabled,
        archival = config.archive.enabled,
        "Event pipeline ready"
    );

    Ok(AppState::new(config, pipeline, metrics))
}

fn build_secret_provider(config: &SecretsConfig) -> anyhow::Result<Arc<dyn SecretProvider>> {
    match config.provider {
        SecretsBackend::Environment => {
            info!(prefix = %config.env_prefix, "Reading secrets from environment variables");
            Ok(Arc::new(EnvironmentSecretProvider::with_prefix(
                config.env_prefix.clone(),
            )))
        }
        SecretsBackend::AzureKeyVault => build_key_vault_provider(&config.vault_name),
    }
}

#[cfg(feature = "azure")]
fn build_key_vault_provider(vault_name: &str) -> anyhow::Result<Arc<dyn SecretProvider>> {
    let provider = contentful_bridge_core::adapters::AzureKeyVaultProvider::new(vault_name)
        .context("Failed to create Key Vault secret provider")?;

    info!(vault_url = %provider.vault_url(), "Reading secrets from Azure Key Vault");
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "azure"))]
fn build_key_vault_provider(_vault_name: &str) -> anyhow::Result<Arc<dyn SecretProvider>> {
    anyhow::bail!("secrets.provider = azure_key_vault requires the `azure` feature")
}

async fn build_archival(config: &ServiceConfig) -> anyhow::Result<Option<ArchivalSink>> {
    let archive = &config.archive;
    if !archive.enabled {
        return Ok(None);
    }

    let storage: Arc<dyn ArchiveStorage> = match archive.backend {
        ArchiveBackend::AzureBlob => {
            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.clients.timeout_seconds))
                .build()
                .context("Failed to create archive HTTP client")?;
            let key = SecretValue::from_string(archive.account_key.clone().unwrap_or_default());

            let blob = match &archive.endpoint {
                Some(endpoint) => {
                    AzureBlobArchive::with_endpoint(http, &archive.account_name, &key, endpoint)
                }
                None => AzureBlobArchive::new(http, &archive.account_name, &key),
            }
            .context("Failed to configure Azure Blob archive")?;

            info!(
                account = %archive.account_name,
                container = %archive.container,
                "Archiving raw requests to Azure Blob Storage"
            );
            Arc::new(blob)
        }
        ArchiveBackend::Filesystem => {
            let local = FilesystemArchive::new(PathBuf::from(&archive.directory))
                .await
                .context("Failed to prepare archive directory")?;

            info!(directory = %archive.directory, "Archiving raw requests to the filesystem");
            Arc::new(local)
        }
    };

    Ok(Some(ArchivalSink::new(
        storage,
        archive.container.clone(),
        archive.blob_prefix.clone(),
    )))
}
