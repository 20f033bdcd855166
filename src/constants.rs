//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Label carrying the node certificate type of a node certificate secret
pub const LABEL_NODE_CERTIFICATE_TYPE: &str = "nodecerts.k8s.node-certs.io/node-certificate-type";

/// Label carrying the name of the pod a node certificate secret belongs to
pub const LABEL_ASSOCIATED_POD: &str = "nodecerts.k8s.node-certs.io/associated-pod";

/// Label selecting the services that belong to a cluster
pub const LABEL_CLUSTER_NAME: &str = "nodecerts.k8s.node-certs.io/cluster-name";

/// Certificate type used for certificates valid for every node role
pub const NODE_CERTIFICATE_TYPE_ELASTICSEARCH_ALL: &str = "elasticsearch.all";

/// Secret data key holding the node private key (PKCS#8 PEM)
pub const SECRET_PRIVATE_KEY_KEY: &str = "node.key";

/// Secret data key holding the node certificate chain (leaf PEM followed by CA PEM)
pub const SECRET_CERTIFICATE_KEY: &str = "cert.pem";

/// Secret data key holding the CA certificate (PEM)
pub const SECRET_CA_CERT_KEY: &str = "ca.crt";

/// Secret data key holding the CA private key (PKCS#8 PEM)
pub const SECRET_CA_KEY_KEY: &str = "ca.key";

/// Suffix of the per-cluster CA secret name
pub const CA_SECRET_SUFFIX: &str = "-ca";

/// Suffix of every node certificate secret name
pub const NODE_CERT_SECRET_SUFFIX: &str = "-certs";

/// Suffix appended to the canonical node identity
pub const CANONICAL_IDENTITY_DOMAIN: &str = "es.cluster.local";

/// Cluster-local DNS domain used for service FQDNs
pub const CLUSTER_DNS_DOMAIN: &str = "svc.cluster.local";

/// Allowed clock skew subtracted from `not_before` (minutes)
pub const CLOCK_SKEW_MINUTES: i64 = 5;

/// Default validity of node certificates (days)
pub const DEFAULT_NODE_CERT_VALIDITY_DAYS: u64 = 365;

/// Default validity of the cluster CA certificate (days)
pub const DEFAULT_CA_CERT_VALIDITY_DAYS: u64 = 3650;

/// Default overall timeout for ensuring a node secret (seconds)
pub const DEFAULT_RETRY_TIMEOUT_SECS: u64 = 180;

/// Default delay between attempts when ensuring a node secret (seconds)
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 3;

/// Maximum length of a Kubernetes object name (DNS-1123 subdomain)
pub const MAX_SECRET_NAME_LEN: usize = 253;

/// Maximum length of a Kubernetes label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;
