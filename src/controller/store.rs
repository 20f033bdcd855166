//! # Secret Store
//!
//! Create-if-absent persistence for node and CA secrets.
//!
//! Correctness of concurrent reconciles relies entirely on [`SecretStore::create`]
//! being atomic: of several creates for the same name, exactly one returns
//! [`CreateOutcome::Created`]. No lock is held between a read and a create.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::debug;

use crate::error::{NodeCertsError, Result};

/// Result of a conditional create
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The secret did not exist and was stored; the stored object is returned
    Created(Secret),
    /// A secret with the same name already exists; nothing was written
    AlreadyExists,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret; a missing secret is `Ok(None)`
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create the secret unless one with the same name exists
    async fn create(&self, namespace: &str, secret: &Secret) -> Result<CreateOutcome>;
}

/// Kubernetes API backed store
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        get_outcome(self.api(namespace).get(name).await, namespace, name)
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<CreateOutcome> {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        let result = self.api(namespace).create(&PostParams::default(), secret).await;
        create_outcome(result, namespace, name)
    }
}

/// Map an API read: 404 is an absent secret
fn get_outcome(
    result: std::result::Result<Secret, kube::Error>,
    namespace: &str,
    name: &str,
) -> Result<Option<Secret>> {
    match result {
        Ok(secret) => Ok(Some(secret)),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
        Err(e) => Err(NodeCertsError::Store(format!(
            "failed to get secret {namespace}/{name}: {e}"
        ))),
    }
}

/// Map an API create: 409 means another writer created the secret first
fn create_outcome(
    result: std::result::Result<Secret, kube::Error>,
    namespace: &str,
    name: &str,
) -> Result<CreateOutcome> {
    match result {
        Ok(created) => Ok(CreateOutcome::Created(created)),
        Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
            debug!(namespace = %namespace, secret = %name, "Secret already exists");
            Ok(CreateOutcome::AlreadyExists)
        }
        Err(e) => Err(NodeCertsError::Store(format!(
            "failed to create secret {namespace}/{name}: {e}"
        ))),
    }
}

/// Process-local store with the same create-if-absent contract.
///
/// Used by tests and by `node-certs ensure --dry-run`.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<(String, String), Secret>>,
    creates: AtomicUsize,
}

impl InMemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a secret unconditionally, bypassing the create counter
    pub fn insert(&self, namespace: &str, secret: Secret) -> Result<()> {
        let name = secret_name(&secret)?;
        self.lock()?
            .insert((namespace.to_string(), name), with_namespace(secret, namespace));
        Ok(())
    }

    /// Number of successful creates
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), Secret>>> {
        self.secrets
            .lock()
            .map_err(|e| NodeCertsError::Store(format!("in-memory store poisoned: {e}")))
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self
            .lock()?
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<CreateOutcome> {
        let key = (namespace.to_string(), secret_name(secret)?);
        let mut secrets = self.lock()?;
        if secrets.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let stored = with_namespace(secret.clone(), namespace);
        secrets.insert(key, stored.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created(stored))
    }
}

fn secret_name(secret: &Secret) -> Result<String> {
    secret
        .metadata
        .name
        .clone()
        .ok_or_else(|| NodeCertsError::Store("secret has no name".to_string()))
}

fn with_namespace(mut secret: Secret, namespace: &str) -> Secret {
    secret.metadata.namespace = Some(namespace.to_string());
    secret
}
