//! # Errors
//!
//! Error taxonomy shared by the certificate and reconciliation modules.
//!
//! There is no `AlreadyExists` variant: a lost create race resolves to the
//! existing secret and never reaches callers as an error.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = NodeCertsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum NodeCertsError {
    /// Malformed node identity input (empty names, unparsable IP, non-ASCII DNS name)
    #[error("invalid node identity: {0}")]
    InvalidIdentity(String),

    /// Malformed ASN.1 or certificate bytes
    #[error("failed to parse certificate data: {0}")]
    Parse(String),

    /// The certificate authority could not sign the template
    #[error("failed to sign certificate: {0}")]
    Signing(String),

    /// Backing store read/create failure other than not-found or already-exists
    #[error("secret store operation failed: {0}")]
    Store(String),

    /// The owner object cannot be turned into an owner reference
    #[error("invalid owner reference: {0}")]
    InvalidOwner(String),
}

impl NodeCertsError {
    /// Whether retrying the same call can succeed without changing its inputs
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeCertsError::Store(_))
    }
}

impl From<kube::Error> for NodeCertsError {
    fn from(e: kube::Error) -> Self {
        NodeCertsError::Store(e.to_string())
    }
}

impl From<rcgen::Error> for NodeCertsError {
    fn from(e: rcgen::Error) -> Self {
        NodeCertsError::Signing(e.to_string())
    }
}

impl From<der::Error> for NodeCertsError {
    fn from(e: der::Error) -> Self {
        NodeCertsError::Parse(e.to_string())
    }
}
