//! Common test utilities for node certificate integration tests
//!
//! Provides throwaway CAs, owner pods and `SecretStore` wrappers that inject races
//! and failures.

#![allow(dead_code, reason = "each test crate uses a subset of the fixtures")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus, Secret};
use kube::api::ObjectMeta;
use tokio::sync::Barrier;

use node_certs_controller::{
    CertificateAuthority, CreateOutcome, InMemorySecretStore, NodeCertsError, NodeIdentity,
    Result, SecretStore,
};

pub const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const CERT_TYPE: &str = "elasticsearch.all";

pub fn test_ca() -> Arc<CertificateAuthority> {
    Arc::new(CertificateAuthority::new_self_signed("demo-ca", ONE_DAY).unwrap())
}

pub fn identity() -> NodeIdentity {
    NodeIdentity::new("es-node-1", "1.2.3.4", "demo", "default")
}

/// A scheduled pod usable as the controller owner of its secret
pub fn owner_pod(identity: &NodeIdentity) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(identity.pod_name.clone()),
            namespace: Some(identity.namespace.clone()),
            uid: Some(format!("uid-{}", identity.pod_name)),
            ..Default::default()
        },
        status: Some(PodStatus {
            pod_ip: Some(identity.pod_ip.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Holds the first `racers` reads until all of them have observed the store, so every
/// racer goes on to attempt a create.
#[derive(Debug)]
pub struct RacingStore {
    pub inner: InMemorySecretStore,
    gets: AtomicUsize,
    racers: usize,
    barrier: Barrier,
}

impl RacingStore {
    pub fn new(racers: usize) -> Self {
        Self {
            inner: InMemorySecretStore::new(),
            gets: AtomicUsize::new(0),
            racers,
            barrier: Barrier::new(racers),
        }
    }
}

#[async_trait]
impl SecretStore for RacingStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let n = self.gets.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.get(namespace, name).await;
        if n < self.racers {
            self.barrier.wait().await;
        }
        result
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<CreateOutcome> {
        self.inner.create(namespace, secret).await
    }
}

/// Every call fails like an unreachable API server
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl SecretStore for FailingStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Err(NodeCertsError::Store(format!(
            "failed to get secret {namespace}/{name}: connection refused"
        )))
    }

    async fn create(&self, namespace: &str, _secret: &Secret) -> Result<CreateOutcome> {
        Err(NodeCertsError::Store(format!(
            "failed to create secret in {namespace}: connection refused"
        )))
    }
}

/// Fails the first `failures` reads, then behaves like the in-memory store
#[derive(Debug)]
pub struct FlakyStore {
    pub inner: InMemorySecretStore,
    remaining_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemorySecretStore::new(),
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl SecretStore for FlakyStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NodeCertsError::Store("etcd leader changed".to_string()));
        }
        self.inner.get(namespace, name).await
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<CreateOutcome> {
        self.inner.create(namespace, secret).await
    }
}

/// Reports every create as a conflict but never returns the conflicting secret
#[derive(Debug, Default)]
pub struct VanishingStore;

#[async_trait]
impl SecretStore for VanishingStore {
    async fn get(&self, _namespace: &str, _name: &str) -> Result<Option<Secret>> {
        Ok(None)
    }

    async fn create(&self, _namespace: &str, _secret: &Secret) -> Result<CreateOutcome> {
        Ok(CreateOutcome::AlreadyExists)
    }
}
