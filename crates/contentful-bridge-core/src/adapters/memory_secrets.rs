//! # In-Memory Secret Provider
//!
//! Map-backed [`SecretProvider`] for tests and local development. Supports
//! rotation, removal and simulated access denial.

use crate::secrets::{SecretError, SecretName, SecretProvider, SecretValue};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

#[cfg(test)]
#[path = "memory_secrets_tests.rs"]
mod tests;

#[derive(Default)]
struct Backend {
    secrets: HashMap<SecretName, SecretValue>,
    denied: HashSet<SecretName>,
}

/// Thread-safe in-memory secret store
///
/// Clones share the same backing map, so a test can keep a handle and rotate
/// secrets while a pipeline is using the provider.
#[derive(Clone, Default)]
pub struct InMemorySecretProvider {
    backend: Arc<RwLock<Backend>>,
    lookups: Arc<AtomicUsize>,
}

impl InMemorySecretProvider {
    /// Create new empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create provider pre-populated with secrets
    pub fn with_secrets(secrets: HashMap<SecretName, SecretValue>) -> Self {
        let provider = Self::new();
        provider.write().secrets = secrets;
        provider
    }

    /// Add or replace a secret (replacing simulates rotation)
    pub fn add_secret(&self, name: SecretName, value: SecretValue) {
        self.write().secrets.insert(name, value);
    }

    /// Remove a secret
    pub fn remove_secret(&self, name: &SecretName) {
        self.write().secrets.remove(name);
    }

    /// Make lookups of `name` fail with `AccessDenied`
    pub fn deny_access(&self, name: SecretName) {
        self.write().denied.insert(name);
    }

    /// Number of `get_secret` calls served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, Backend> {
        self.backend.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Backend> {
        self.backend
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SecretProvider for InMemorySecretProvider {
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, SecretError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let backend = self.read();
        if backend.denied.contains(name) {
            return Err(SecretError::AccessDenied {
                name: name.clone(),
                reason: "access denied by test provider".to_string(),
            });
        }

        backend
            .secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::SecretNotFound { name: name.clone() })
    }
}
