//! # Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CA_CERT_VALIDITY_DAYS, DEFAULT_NODE_CERT_VALIDITY_DAYS, DEFAULT_RETRY_INTERVAL_SECS,
    DEFAULT_RETRY_TIMEOUT_SECS, NODE_CERTIFICATE_TYPE_ELASTICSEARCH_ALL,
};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Node certificate configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCertsConfig {
    /// Namespace the controller operates in when none is given on the command line
    pub namespace: String,
    /// Default log directive (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Validity of issued node certificates (days)
    pub node_cert_validity_days: u64,
    /// Validity of a generated cluster CA certificate (days)
    pub ca_cert_validity_days: u64,
    /// Overall time budget for ensuring a node secret (seconds)
    pub retry_timeout_secs: u64,
    /// Delay between attempts (seconds)
    pub retry_interval_secs: u64,
    /// Certificate type used when the caller does not pick one
    pub node_certificate_type: String,
}

impl Default for NodeCertsConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            log_level: "info".to_string(),
            node_cert_validity_days: DEFAULT_NODE_CERT_VALIDITY_DAYS,
            ca_cert_validity_days: DEFAULT_CA_CERT_VALIDITY_DAYS,
            retry_timeout_secs: DEFAULT_RETRY_TIMEOUT_SECS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            node_certificate_type: NODE_CERTIFICATE_TYPE_ELASTICSEARCH_ALL.to_string(),
        }
    }
}

impl NodeCertsConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            namespace: env_var_or_default_str("POD_NAMESPACE", "default"),
            log_level: env_var_or_default_str("LOG_LEVEL", "info"),
            node_cert_validity_days: env_var_or_default(
                "NODE_CERT_VALIDITY_DAYS",
                DEFAULT_NODE_CERT_VALIDITY_DAYS,
            ),
            ca_cert_validity_days: env_var_or_default(
                "CA_CERT_VALIDITY_DAYS",
                DEFAULT_CA_CERT_VALIDITY_DAYS,
            ),
            retry_timeout_secs: env_var_or_default(
                "NODE_CERT_RETRY_TIMEOUT_SECS",
                DEFAULT_RETRY_TIMEOUT_SECS,
            ),
            retry_interval_secs: env_var_or_default(
                "NODE_CERT_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            ),
            node_certificate_type: env_var_or_default_str(
                "NODE_CERTIFICATE_TYPE",
                NODE_CERTIFICATE_TYPE_ELASTICSEARCH_ALL,
            ),
        }
    }

    /// Get node certificate validity duration
    #[must_use]
    pub fn node_cert_validity_duration(&self) -> Duration {
        Duration::from_secs(self.node_cert_validity_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Get CA certificate validity duration
    #[must_use]
    pub fn ca_cert_validity_duration(&self) -> Duration {
        Duration::from_secs(self.ca_cert_validity_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Get retry timeout duration
    #[must_use]
    pub fn retry_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    /// Get retry interval duration
    #[must_use]
    pub fn retry_interval_duration(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let config = NodeCertsConfig::default();
        assert_eq!(
            config.node_cert_validity_duration(),
            Duration::from_secs(365 * SECONDS_PER_DAY)
        );
        assert_eq!(config.retry_timeout_duration(), Duration::from_secs(180));
        assert_eq!(config.retry_interval_duration(), Duration::from_secs(3));
        assert_eq!(config.node_certificate_type, "elasticsearch.all");
    }

    #[test]
    fn test_env_var_or_default_uses_default_when_unset() {
        assert_eq!(
            env_var_or_default("NODE_CERTS_TEST_UNSET_KEY_0d1f", 42u64),
            42
        );
    }
}
