//! # Observability
//!
//! Tracing subscriber setup for the `node-certs` binary.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the library (`node_certs_controller`) and the
/// `node-certs` binary (`node_certs`) both log at `log_level`.
/// Calling this twice is harmless: the second subscriber is rejected and a warning
/// is emitted through the first one.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(log_level).into());

    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        tracing::warn!("Tracing subscriber already initialized: {}", e);
    }
}

fn default_directive(log_level: &str) -> String {
    let level = log_level.to_lowercase();
    format!("node_certs_controller={level},node_certs={level}")
}
