//! Node Certificates Controller Library
//!
//! Issues mutual-TLS node certificates for members of a Kubernetes-managed cluster and
//! persists each one exactly once as a secret.
//!
//! - [`certs`]: identity, templates, the SubjectAltName otherName codec and the CA
//! - [`controller`]: create-if-absent secrets, secret stores and bounded retry
//! - [`config`], [`constants`], [`error`], [`observability`]: shared plumbing

pub mod certs;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod observability;

pub use certs::{
    CertificateAuthority, CertificateRequest, NodeIdentity, ServiceEndpoint, SignedCertificate,
    Utf8OtherName, ValidatedCertificateTemplate,
};
pub use config::NodeCertsConfig;
pub use controller::nodecerts::{
    ensure_node_certificate_secret_exists, issue_node_certificate, node_certificate_secret_name,
    IssuedCertificate,
};
pub use controller::retry::until_success;
pub use controller::store::{CreateOutcome, InMemorySecretStore, KubeSecretStore, SecretStore};
pub use error::{NodeCertsError, Result};
