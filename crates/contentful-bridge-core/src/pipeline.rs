//! # Event Pipeline
//!
//! Sequences every external call made for one webhook delivery:
//!
//! ```text
//! fetch secrets ─► construct clients ─► (archive) ─► validate
//!   ─► resolve space ─► (resolve identity) ─► insert ─► respond
//! ```
//!
//! The two secrets are fetched concurrently and both must succeed. Archival
//! is best-effort; every other stage aborts the request on failure. Nothing
//! is retried.

use crate::{
    analytics::{AnalyticsError, AnalyticsRow, AnalyticsSink},
    archive::{ArchivalSink, ArchiveOutcome},
    directory::{DirectoryError, IdentityResolver, SpaceDirectory},
    monitoring::{NoOpPipelineMetrics, PipelineMetrics},
    normalizer::{EventNormalizer, InboundRequest, TimestampField},
    secrets::{
        CredentialError, SecretBundle, SecretError, SecretNames, SecretProvider,
        ServiceAccountCredential,
    },
    Timestamp, ValidationError,
};
use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Instant,
};
use tracing::{debug, error, info, instrument, warn, Span};

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

// ============================================================================
// Stages
// ============================================================================

/// The pipeline stage a request reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    FetchSecrets,
    ConstructClients,
    Archive,
    Validate,
    ResolveSpace,
    ResolveIdentity,
    Insert,
    Respond,
}

impl PipelineStage {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchSecrets => "fetch_secrets",
            Self::ConstructClients => "construct_clients",
            Self::Archive => "archive",
            Self::Validate => "validate",
            Self::ResolveSpace => "resolve_space",
            Self::ResolveIdentity => "resolve_identity",
            Self::Insert => "insert",
            Self::Respond => "respond",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure to build the per-request clients from the secret bundle
#[derive(Debug, thiserror::Error)]
#[error("Client construction failed: {message}")]
pub struct ClientBuildError {
    pub message: String,
}

impl ClientBuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that abort a request
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Secret retrieval failed: {0}")]
    Secrets(#[from] SecretError),

    #[error("Analytics credential unusable: {0}")]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    ClientConstruction(#[from] ClientBuildError),

    #[error("Invalid webhook payload: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    SpaceLookup(DirectoryError),

    #[error(transparent)]
    IdentityLookup(DirectoryError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

impl PipelineError {
    /// Stage at which the request failed
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Secrets(_) => PipelineStage::FetchSecrets,
            Self::Credential(_) | Self::ClientConstruction(_) => PipelineStage::ConstructClients,
            Self::Validation(_) => PipelineStage::Validate,
            Self::SpaceLookup(_) => PipelineStage::ResolveSpace,
            Self::IdentityLookup(_) => PipelineStage::ResolveIdentity,
            Self::Analytics(_) => PipelineStage::Insert,
        }
    }

    /// Whether the caller sent a bad payload (400) rather than a downstream failure (500)
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the analytics insert itself failed
    pub fn is_insert_failure(&self) -> bool {
        matches!(self, Self::Analytics(_))
    }
}

// ============================================================================
// Clients
// ============================================================================

/// The downstream clients used by one request
#[derive(Clone)]
pub struct PipelineClients {
    pub spaces: Arc<dyn SpaceDirectory>,
    pub identities: Arc<dyn IdentityResolver>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

/// Builds the downstream clients from freshly fetched secrets
pub trait ClientFactory: Send + Sync {
    /// # Errors
    /// Returns error if the secrets cannot be turned into working clients
    fn build(&self, secrets: &SecretBundle) -> Result<PipelineClients, ClientBuildError>;
}

/// Process-scoped client cache keyed by the secret bundle fingerprint
///
/// Returns the cached clients while the fingerprint is unchanged and rebuilds
/// them as soon as either credential rotates.
pub struct CachingClientFactory {
    inner: Arc<dyn ClientFactory>,
    cached: Mutex<Option<(String, PipelineClients)>>,
}

impl CachingClientFactory {
    pub fn new(inner: Arc<dyn ClientFactory>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

impl ClientFactory for CachingClientFactory {
    fn build(&self, secrets: &SecretBundle) -> Result<PipelineClients, ClientBuildError> {
        let fingerprint = secrets.fingerprint();

        let mut cached = self
            .cached
            .lock()
            .map_err(|_| ClientBuildError::new("client cache lock poisoned"))?;

        if let Some((key, clients)) = cached.as_ref() {
            if *key == fingerprint {
                debug!("Reusing cached clients");
                return Ok(clients.clone());
            }
            info!("Secret fingerprint changed; rebuilding clients");
        }

        let clients = self.inner.build(secrets)?;
        *cached = Some((fingerprint, clients.clone()));
        Ok(clients)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Static settings for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub secret_names: SecretNames,
    pub dataset_id: String,
    pub table_id: String,
    pub timestamp_field: TimestampField,

    /// Identity resolution is enabled when an organization is configured
    pub organization_id: Option<String>,
}

/// What a successful request produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    /// The row that was inserted
    pub row: AnalyticsRow,

    /// Archive outcome, when archival is enabled
    pub archive: Option<ArchiveOutcome>,
}

/// Orchestrates one webhook delivery end to end
#[derive(Clone)]
pub struct EventPipeline {
    secrets: Arc<dyn SecretProvider>,
    clients: Arc<dyn ClientFactory>,
    archival: Option<ArchivalSink>,
    metrics: Arc<dyn PipelineMetrics>,
    normalizer: EventNormalizer,
    settings: PipelineSettings,
}

impl EventPipeline {
    /// Create pipeline without archival and with metrics discarded
    pub fn new(
        secrets: Arc<dyn SecretProvider>,
        clients: Arc<dyn ClientFactory>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            secrets,
            clients,
            archival: None,
            metrics: Arc::new(NoOpPipelineMetrics),
            normalizer: EventNormalizer::new(settings.timestamp_field),
            settings,
        }
    }

    /// Archive every raw request through `sink`
    pub fn with_archival(mut self, sink: ArchivalSink) -> Self {
        self.archival = Some(sink);
        self
    }

    /// Report to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Pipeline settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process one webhook delivery
    #[instrument(skip(self, request), fields(stage = tracing::field::Empty, space_id = tracing::field::Empty))]
    pub async fn handle(&self, request: &InboundRequest) -> Result<ProcessedEvent, PipelineError> {
        let started = Instant::now();
        self.metrics.record_event_received();

        match self.run(request).await {
            Ok(processed) => {
                Span::current().record("stage", PipelineStage::Respond.as_str());
                self.metrics.record_event_processed(started.elapsed());
                info!(
                    actions = %processed.row.actions,
                    environment = %processed.row.environment,
                    "Webhook processed"
                );
                Ok(processed)
            }
            Err(e) => {
                let stage = e.stage();
                Span::current().record("stage", stage.as_str());
                if e.is_validation_failure() {
                    self.metrics.record_validation_failure();
                    warn!(error = %e, "Rejected webhook payload");
                } else {
                    self.metrics.record_stage_failure(stage.as_str());
                    error!(stage = %stage, error = %e, "Webhook processing failed");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, request: &InboundRequest) -> Result<ProcessedEvent, PipelineError> {
        let secrets = self.fetch_secrets().await?;
        let clients = self.clients.build(&secrets)?;

        let archive = match &self.archival {
            Some(sink) => {
                let outcome = sink.archive_request(request, Timestamp::now()).await;
                if !outcome.stored {
                    self.metrics.record_archive_failure();
                }
                Some(outcome)
            }
            None => None,
        };

        let event = self.normalizer.normalize_request(request)?;
        Span::current().record("space_id", event.space_id.as_str());
        debug!(topic = %event.topic, action = %event.action, "Validated webhook payload");

        let space_name = clients
            .spaces
            .space_name(&event.space_id)
            .await
            .map_err(PipelineError::SpaceLookup)?;

        let user = match &self.settings.organization_id {
            Some(organization_id) => clients
                .identities
                .resolve_email(organization_id, &event.user_id)
                .await
                .map_err(PipelineError::IdentityLookup)?,
            None => event.user_id.clone(),
        };

        let row = event.to_row(space_name, user);
        clients
            .analytics
            .insert_row(&self.settings.dataset_id, &self.settings.table_id, &row)
            .await?;

        Ok(ProcessedEvent { row, archive })
    }

    async fn fetch_secrets(&self) -> Result<SecretBundle, PipelineError> {
        let names = &self.settings.secret_names;

        let (contentful_token, analytics_credential) = tokio::try_join!(
            self.secrets.get_secret(&names.contentful_token),
            self.secrets.get_secret(&names.analytics_credential),
        )?;

        let credential = ServiceAccountCredential::from_secret(&analytics_credential)?;
        Ok(SecretBundle::new(contentful_token, credential))
    }
}
