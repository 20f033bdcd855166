//! # Node Certificate Secrets
//!
//! Ensures each cluster member has exactly one secret holding its private key and
//! certificate chain, and that the cluster has exactly one CA secret.
//!
//! ## Lifecycle
//!
//! ```text
//! Absent --get: none--> Creating --create: Created--------> Present
//!                          |
//!                          +--create: AlreadyExists--re-read--> Present
//! ```
//!
//! `Present` is terminal: an existing secret is authoritative and never rewritten.
//! Existence is never cached; every call starts with a read.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::Resource;
use rcgen::KeyPair;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::certs::{
    build_template, CertificateAuthority, CertificateRequest, NodeIdentity, ServiceEndpoint,
};
use crate::constants::{
    CA_SECRET_SUFFIX, LABEL_ASSOCIATED_POD, LABEL_CLUSTER_NAME, LABEL_NODE_CERTIFICATE_TYPE,
    MAX_LABEL_VALUE_LEN, MAX_SECRET_NAME_LEN, NODE_CERT_SECRET_SUFFIX, SECRET_CA_CERT_KEY,
    SECRET_CA_KEY_KEY, SECRET_CERTIFICATE_KEY, SECRET_PRIVATE_KEY_KEY,
};
use crate::controller::store::{CreateOutcome, SecretStore};
use crate::error::{NodeCertsError, Result};

/// PEM material for one node, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IssuedCertificate {
    /// PKCS#8 PEM private key
    pub private_key_pem: String,
    /// Leaf certificate PEM followed by the CA certificate PEM
    pub certificate_chain_pem: String,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("private_key_pem", &"<redacted>")
            .field("certificate_chain_pem", &self.certificate_chain_pem)
            .finish()
    }
}

/// Deterministic secret name `<pod>-<certificate type>-certs`, as a DNS-1123 subdomain
#[must_use]
pub fn node_certificate_secret_name(pod_name: &str, certificate_type: &str) -> String {
    sanitize_secret_name(&format!(
        "{pod_name}-{certificate_type}{NODE_CERT_SECRET_SUFFIX}"
    ))
}

/// Name of the CA secret of a cluster: `<cluster>-ca`
#[must_use]
pub fn ca_secret_name(cluster_name: &str) -> String {
    sanitize_secret_name(&format!("{cluster_name}{CA_SECRET_SUFFIX}"))
}

/// Lowercase, map anything outside `[a-z0-9.-]` to `-`, collapse dash runs and trim
/// to a valid subdomain of at most 253 characters
fn sanitize_secret_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '.' | '-') => c,
            _ => '-',
        })
        .collect();

    let mut result = String::with_capacity(sanitized.len());
    let mut prev_was_dash = false;
    for c in sanitized.chars() {
        if c == '-' {
            if !prev_was_dash {
                result.push(c);
            }
            prev_was_dash = true;
        } else {
            result.push(c);
            prev_was_dash = false;
        }
    }

    result.truncate(MAX_SECRET_NAME_LEN);
    result.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Check that a certificate type can be stored as a label value: at most 63
/// characters of `[A-Za-z0-9._-]`, starting and ending alphanumeric
pub fn validate_certificate_type(certificate_type: &str) -> Result<()> {
    let valid = certificate_type.len() <= MAX_LABEL_VALUE_LEN
        && certificate_type.starts_with(|c: char| c.is_ascii_alphanumeric())
        && certificate_type.ends_with(|c: char| c.is_ascii_alphanumeric())
        && certificate_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(NodeCertsError::InvalidIdentity(format!(
            "certificate type {certificate_type:?} is not a valid label value"
        )))
    }
}

/// Labels of a node secret; the type and pod labels win over caller labels
#[must_use]
pub fn node_certificate_secret_labels(
    pod_name: &str,
    certificate_type: &str,
    extra_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = extra_labels.clone();
    labels.insert(
        LABEL_NODE_CERTIFICATE_TYPE.to_string(),
        certificate_type.to_string(),
    );
    labels.insert(LABEL_ASSOCIATED_POD.to_string(), pod_name.to_string());
    labels
}

/// Generate a key pair, build the node template and sign it with `ca`
pub fn issue_node_certificate(
    ca: &CertificateAuthority,
    identity: &NodeIdentity,
    services: &[ServiceEndpoint],
    validity: Duration,
) -> Result<IssuedCertificate> {
    let key_pair = KeyPair::generate()?;
    let private_key_pem = key_pair.serialize_pem();

    let template = build_template(identity, services, CertificateRequest::new(key_pair), validity)?;
    let signed = ca.sign(&template)?;

    let mut certificate_chain_pem = signed.pem.clone();
    if !certificate_chain_pem.ends_with('\n') {
        certificate_chain_pem.push('\n');
    }
    certificate_chain_pem.push_str(ca.cert_pem());

    Ok(IssuedCertificate {
        private_key_pem,
        certificate_chain_pem,
    })
}

/// Ensure the node secret for `identity` and `certificate_type` exists exactly once.
///
/// An existing secret is returned unchanged. Otherwise `issue` is called, the secret
/// is created with a controller owner reference to `owner`, and a create that loses a
/// race to another reconciler resolves to the winner's secret. Store failures are
/// returned as-is; retrying is left to the caller.
pub async fn ensure_node_certificate_secret_exists<S, O, F>(
    store: &S,
    owner: &O,
    identity: &NodeIdentity,
    certificate_type: &str,
    extra_labels: &BTreeMap<String, String>,
    issue: F,
) -> Result<Secret>
where
    S: SecretStore + ?Sized,
    O: Resource<DynamicType = ()>,
    F: FnOnce() -> Result<IssuedCertificate>,
{
    validate_certificate_type(certificate_type)?;
    let namespace = identity.namespace.as_str();
    let name = node_certificate_secret_name(&identity.pod_name, certificate_type);

    if let Some(existing) = store.get(namespace, &name).await? {
        debug!(
            pod = %identity.pod_name,
            secret = %name,
            namespace = %namespace,
            "Node certificate secret already exists"
        );
        validate_node_secret(&existing, &name, certificate_type)?;
        return Ok(existing);
    }

    let owner_reference = owner.controller_owner_ref(&()).ok_or_else(|| {
        NodeCertsError::InvalidOwner(format!(
            "owner of secret {name} must have a name and a uid"
        ))
    })?;

    let issued = issue()?;
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(node_certificate_secret_labels(
                &identity.pod_name,
                certificate_type,
                extra_labels,
            )),
            owner_references: Some(vec![owner_reference]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                SECRET_PRIVATE_KEY_KEY.to_string(),
                ByteString(issued.private_key_pem.as_bytes().to_vec()),
            ),
            (
                SECRET_CERTIFICATE_KEY.to_string(),
                ByteString(issued.certificate_chain_pem.as_bytes().to_vec()),
            ),
        ])),
        ..Default::default()
    };
    drop(issued);

    match store.create(namespace, &secret).await? {
        CreateOutcome::Created(created) => {
            info!(
                pod = %identity.pod_name,
                secret = %name,
                namespace = %namespace,
                certificate_type = %certificate_type,
                "Created node certificate secret"
            );
            Ok(created)
        }
        CreateOutcome::AlreadyExists => {
            debug!(
                pod = %identity.pod_name,
                secret = %name,
                namespace = %namespace,
                "Lost node certificate secret create race, reading winner"
            );
            let winner = store.get(namespace, &name).await?.ok_or_else(|| {
                NodeCertsError::Store(format!(
                    "secret {namespace}/{name} reported as existing but could not be read"
                ))
            })?;
            validate_node_secret(&winner, &name, certificate_type)?;
            Ok(winner)
        }
    }
}

fn validate_node_secret(secret: &Secret, name: &str, certificate_type: &str) -> Result<()> {
    if let Some(existing_type) = secret
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_NODE_CERTIFICATE_TYPE))
    {
        if existing_type != certificate_type {
            return Err(NodeCertsError::Store(format!(
                "secret {name} holds certificate type {existing_type:?}, \
                 expected {certificate_type:?}"
            )));
        }
    }

    let has = |key: &str| {
        secret
            .data
            .as_ref()
            .is_some_and(|data| data.contains_key(key))
    };
    if has(SECRET_PRIVATE_KEY_KEY) != has(SECRET_CERTIFICATE_KEY) {
        return Err(NodeCertsError::Store(format!(
            "secret {name} must hold both {SECRET_PRIVATE_KEY_KEY} and {SECRET_CERTIFICATE_KEY}"
        )));
    }

    Ok(())
}

/// Load the cluster CA from its secret, creating a new self-signed CA if absent.
///
/// Follows the same create-if-absent rule as node secrets: concurrent callers all end
/// up with the CA that won the create.
pub async fn ensure_cluster_ca<S>(
    store: &S,
    namespace: &str,
    cluster_name: &str,
    validity: Duration,
) -> Result<CertificateAuthority>
where
    S: SecretStore + ?Sized,
{
    let name = ca_secret_name(cluster_name);

    if let Some(existing) = store.get(namespace, &name).await? {
        debug!(secret = %name, namespace = %namespace, "Loaded cluster CA secret");
        return ca_from_secret(&existing, &name);
    }

    let ca = CertificateAuthority::new_self_signed(&name, validity)?;
    let key_pem = zeroize::Zeroizing::new(ca.key_pem());
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                LABEL_CLUSTER_NAME.to_string(),
                cluster_name.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                SECRET_CA_CERT_KEY.to_string(),
                ByteString(ca.cert_pem().as_bytes().to_vec()),
            ),
            (
                SECRET_CA_KEY_KEY.to_string(),
                ByteString(key_pem.as_bytes().to_vec()),
            ),
        ])),
        ..Default::default()
    };

    match store.create(namespace, &secret).await? {
        CreateOutcome::Created(_) => {
            info!(secret = %name, namespace = %namespace, "Created cluster CA secret");
            Ok(ca)
        }
        CreateOutcome::AlreadyExists => {
            let winner = store.get(namespace, &name).await?.ok_or_else(|| {
                NodeCertsError::Store(format!(
                    "secret {namespace}/{name} reported as existing but could not be read"
                ))
            })?;
            ca_from_secret(&winner, &name)
        }
    }
}

fn ca_from_secret(secret: &Secret, name: &str) -> Result<CertificateAuthority> {
    let cert_pem = secret_string(secret, name, SECRET_CA_CERT_KEY)?;
    let key_pem = zeroize::Zeroizing::new(secret_string(secret, name, SECRET_CA_KEY_KEY)?);
    CertificateAuthority::from_pem(&cert_pem, &key_pem)
}

/// UTF-8 value of one data key of a secret
pub fn secret_string(secret: &Secret, name: &str, key: &str) -> Result<String> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| NodeCertsError::Store(format!("secret {name} has no {key} entry")))?;
    String::from_utf8(bytes.0.clone())
        .map_err(|e| NodeCertsError::Store(format!("secret {name} entry {key} is not UTF-8: {e}")))
}
