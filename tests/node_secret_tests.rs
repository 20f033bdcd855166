//! # Node Secret Reconciliation Tests
//!
//! Exercise `ensure_node_certificate_secret_exists` and `ensure_cluster_ca` against
//! in-memory stores with injected races and failures.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;

use common::{
    identity, owner_pod, test_ca, FailingStore, FlakyStore, RacingStore, VanishingStore,
    CERT_TYPE, ONE_DAY,
};
use node_certs_controller::constants::{
    LABEL_ASSOCIATED_POD, LABEL_NODE_CERTIFICATE_TYPE, SECRET_CERTIFICATE_KEY,
    SECRET_PRIVATE_KEY_KEY,
};
use node_certs_controller::controller::nodecerts::ensure_cluster_ca;
use node_certs_controller::{
    ensure_node_certificate_secret_exists, issue_node_certificate, node_certificate_secret_name,
    until_success, CertificateAuthority, InMemorySecretStore, IssuedCertificate, NodeCertsError,
    NodeIdentity, Result, SecretStore,
};

async fn ensure<S: SecretStore + ?Sized>(
    store: &S,
    ca: &CertificateAuthority,
    identity: &NodeIdentity,
) -> Result<Secret> {
    let pod = owner_pod(identity);
    ensure_node_certificate_secret_exists(
        store,
        &pod,
        identity,
        CERT_TYPE,
        &BTreeMap::new(),
        || issue_node_certificate(ca, identity, &[], ONE_DAY),
    )
    .await
}

fn must_not_issue() -> Result<IssuedCertificate> {
    panic!("certificate must not be issued when the secret exists")
}

#[tokio::test]
async fn test_creates_labelled_secret_in_empty_store() {
    let store = InMemorySecretStore::new();
    let ca = test_ca();
    let identity = identity();

    let extra = BTreeMap::from([("team".to_string(), "search".to_string())]);
    let secret = ensure_node_certificate_secret_exists(
        &store,
        &owner_pod(&identity),
        &identity,
        CERT_TYPE,
        &extra,
        || issue_node_certificate(&ca, &identity, &[], ONE_DAY),
    )
    .await
    .unwrap();

    assert_eq!(store.create_count(), 1);
    assert_eq!(
        secret.metadata.name.as_deref(),
        Some("es-node-1-elasticsearch.all-certs")
    );
    assert_eq!(secret.metadata.namespace.as_deref(), Some("default"));

    let labels = secret.metadata.labels.as_ref().unwrap();
    assert_eq!(labels[LABEL_NODE_CERTIFICATE_TYPE], CERT_TYPE);
    assert_eq!(labels[LABEL_ASSOCIATED_POD], "es-node-1");
    assert_eq!(labels["team"], "search");

    let owners = secret.metadata.owner_references.as_ref().unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "Pod");
    assert_eq!(owners[0].name, "es-node-1");
    assert_eq!(owners[0].uid, "uid-es-node-1");
    assert_eq!(owners[0].controller, Some(true));

    let data = secret.data.as_ref().unwrap();
    let key = String::from_utf8(data[SECRET_PRIVATE_KEY_KEY].0.clone()).unwrap();
    let chain = String::from_utf8(data[SECRET_CERTIFICATE_KEY].0.clone()).unwrap();
    assert!(key.contains("PRIVATE KEY"));
    assert_eq!(chain.matches("BEGIN CERTIFICATE").count(), 2);
}

#[tokio::test]
async fn test_existing_secret_is_returned_unmodified() {
    let store = InMemorySecretStore::new();
    let identity = identity();
    let name = node_certificate_secret_name(&identity.pod_name, CERT_TYPE);
    let preexisting = Secret {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some("default".to_string()),
            labels: Some(BTreeMap::from([(
                LABEL_NODE_CERTIFICATE_TYPE.to_string(),
                CERT_TYPE.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (SECRET_PRIVATE_KEY_KEY.to_string(), ByteString(b"old-key".to_vec())),
            (SECRET_CERTIFICATE_KEY.to_string(), ByteString(b"old-cert".to_vec())),
        ])),
        ..Default::default()
    };
    store.insert("default", preexisting.clone()).unwrap();

    let secret = ensure_node_certificate_secret_exists(
        &store,
        &owner_pod(&identity),
        &identity,
        CERT_TYPE,
        &BTreeMap::new(),
        must_not_issue,
    )
    .await
    .unwrap();

    assert_eq!(secret, preexisting);
    assert_eq!(store.create_count(), 0);
}

#[tokio::test]
async fn test_sequential_ensures_are_idempotent() {
    let store = InMemorySecretStore::new();
    let ca = test_ca();
    let identity = identity();

    let first = ensure(&store, &ca, &identity).await.unwrap();
    let second = ensure(&store, &ca, &identity).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.create_count(), 1);
}

#[tokio::test]
async fn test_concurrent_ensures_create_exactly_once() {
    const RACERS: usize = 8;
    let store = Arc::new(RacingStore::new(RACERS));
    let ca = test_ca();

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let ca = Arc::clone(&ca);
            tokio::spawn(async move { ensure(store.as_ref(), &ca, &identity()).await })
        })
        .collect();

    let mut secrets = Vec::with_capacity(RACERS);
    for handle in handles {
        secrets.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(store.inner.create_count(), 1);
    assert!(secrets.windows(2).all(|pair| pair[0].data == pair[1].data));
}

#[tokio::test]
async fn test_certificate_type_collision_is_an_error() {
    let store = InMemorySecretStore::new();
    let identity = identity();
    let name = node_certificate_secret_name(&identity.pod_name, CERT_TYPE);
    store
        .insert(
            "default",
            Secret {
                metadata: ObjectMeta {
                    name: Some(name),
                    labels: Some(BTreeMap::from([(
                        LABEL_NODE_CERTIFICATE_TYPE.to_string(),
                        "elasticsearch.transport".to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();

    let err = ensure_node_certificate_secret_exists(
        &store,
        &owner_pod(&identity),
        &identity,
        CERT_TYPE,
        &BTreeMap::new(),
        must_not_issue,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, NodeCertsError::Store(_)), "got {err:?}");
}

#[tokio::test]
async fn test_owner_without_uid_is_rejected() {
    let store = InMemorySecretStore::new();
    let identity = identity();
    let mut pod = owner_pod(&identity);
    pod.metadata.uid = None;

    let err = ensure_node_certificate_secret_exists(
        &store,
        &pod,
        &identity,
        CERT_TYPE,
        &BTreeMap::new(),
        must_not_issue,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, NodeCertsError::InvalidOwner(_)), "got {err:?}");
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn test_certificate_type_that_is_not_a_label_value_is_rejected() {
    let store = InMemorySecretStore::new();
    let identity = identity();

    let err = ensure_node_certificate_secret_exists(
        &store,
        &owner_pod(&identity),
        &identity,
        "transport/only",
        &BTreeMap::new(),
        must_not_issue,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, NodeCertsError::InvalidIdentity(_)), "got {err:?}");
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let ca = test_ca();

    let err = ensure(&FailingStore, &ca, &identity()).await.unwrap_err();

    assert!(matches!(err, NodeCertsError::Store(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_issuance_failure_creates_nothing() {
    let store = InMemorySecretStore::new();
    let identity = identity();

    let err = ensure_node_certificate_secret_exists(
        &store,
        &owner_pod(&identity),
        &identity,
        CERT_TYPE,
        &BTreeMap::new(),
        || Err(NodeCertsError::Signing("certificate request carries no public key".into())),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, NodeCertsError::Signing(_)), "got {err:?}");
    assert_eq!(store.create_count(), 0);
}

#[tokio::test]
async fn test_conflict_without_readable_winner_is_an_error() {
    let ca = test_ca();

    let err = ensure(&VanishingStore, &ca, &identity()).await.unwrap_err();

    assert!(matches!(err, NodeCertsError::Store(_)), "got {err:?}");
}

#[tokio::test]
async fn test_retry_helper_rides_out_transient_store_errors() {
    let store = FlakyStore::new(2);
    let ca = test_ca();
    let identity = identity();

    let secret = until_success(
        || ensure(&store, &ca, &identity),
        Duration::from_secs(5),
        Duration::from_millis(1),
    )
    .await
    .unwrap();

    assert!(secret.data.is_some());
    assert_eq!(store.inner.create_count(), 1);
}

#[tokio::test]
async fn test_cluster_ca_is_created_once_and_reloaded() {
    let store = InMemorySecretStore::new();

    let created = ensure_cluster_ca(&store, "default", "demo", ONE_DAY).await.unwrap();
    let loaded = ensure_cluster_ca(&store, "default", "demo", ONE_DAY).await.unwrap();

    assert_eq!(created.cert_pem(), loaded.cert_pem());
    assert_eq!(store.create_count(), 1);
    assert!(store.get("default", "demo-ca").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reloaded_ca_issues_verifiable_chain() {
    let store = InMemorySecretStore::new();
    ensure_cluster_ca(&store, "default", "demo", ONE_DAY).await.unwrap();
    let ca = ensure_cluster_ca(&store, "default", "demo", ONE_DAY).await.unwrap();

    let secret = ensure(&store, &ca, &identity()).await.unwrap();
    let chain = secret.data.as_ref().unwrap()[SECRET_CERTIFICATE_KEY].0.clone();
    let chain = String::from_utf8(chain).unwrap();

    assert!(chain.ends_with(ca.cert_pem()));
}
