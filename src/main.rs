//! # node-certs
//!
//! Command-line entry point for issuing and inspecting node certificate secrets.
//!
//! ## Usage
//!
//! ```bash
//! # Ensure the node certificate secret of a pod exists
//! node-certs ensure --pod demo-es-0 --cluster demo -n search
//!
//! # Print the identity carried by a stored node certificate
//! node-certs inspect demo-es-0-elasticsearch.all-certs -n search
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::info;

use node_certs_controller::certs::CertificateSummary;
use node_certs_controller::config::NodeCertsConfig;
use node_certs_controller::constants::{LABEL_CLUSTER_NAME, SECRET_CERTIFICATE_KEY};
use node_certs_controller::controller::nodecerts::{
    ensure_cluster_ca, ensure_node_certificate_secret_exists, issue_node_certificate,
    secret_string,
};
use node_certs_controller::controller::retry::until_success;
use node_certs_controller::controller::store::{
    InMemorySecretStore, KubeSecretStore, SecretStore,
};
use node_certs_controller::observability::init_tracing;
use node_certs_controller::{NodeIdentity, ServiceEndpoint};

/// Node certificate issuer for clustered workloads
#[derive(Parser)]
#[command(name = "node-certs")]
#[command(
    about = "Issue and inspect mutual-TLS node certificate secrets",
    long_about = None,
    after_help = "\
Examples:
  node-certs ensure --pod demo-es-0 --cluster demo
  node-certs ensure --pod demo-es-0 --cluster demo --label team=search --dry-run
  node-certs inspect demo-es-0-elasticsearch.all-certs --json
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to POD_NAMESPACE, then "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the node certificate secret of a pod exists
    Ensure {
        /// Name of the pod the certificate is issued for
        #[arg(long)]
        pod: String,

        /// Cluster name; selects services labelled with the cluster name label
        #[arg(long)]
        cluster: String,

        /// Node certificate type (defaults to NODE_CERTIFICATE_TYPE)
        #[arg(long)]
        cert_type: Option<String>,

        /// Extra label for the secret, as key=value (repeatable)
        #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
        labels: Vec<(String, String)>,

        /// Keep CA and node secrets in memory instead of writing them to the cluster
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the subject and SubjectAltName entries of a stored node certificate
    Inspect {
        /// Name of the node certificate secret
        #[arg(value_name = "SECRET")]
        secret: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Required for rustls 0.23+ before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = NodeCertsConfig::from_env();
    init_tracing(&config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        built = env!("BUILD_DATETIME"),
        "Starting node-certs"
    );

    let cli = Cli::parse();
    let namespace = cli.namespace.unwrap_or_else(|| config.namespace.clone());

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Ensure {
            pod,
            cluster,
            cert_type,
            labels,
            dry_run,
        } => {
            let certificate_type =
                cert_type.unwrap_or_else(|| config.node_certificate_type.clone());
            let request = EnsureRequest {
                namespace,
                pod,
                cluster,
                certificate_type,
                labels: labels.into_iter().collect(),
                dry_run,
            };
            ensure_command(client, &config, request).await
        }
        Commands::Inspect { secret, json } => {
            inspect_command(client, &namespace, &secret, json).await
        }
    }
}

struct EnsureRequest {
    namespace: String,
    pod: String,
    cluster: String,
    certificate_type: String,
    labels: BTreeMap<String, String>,
    dry_run: bool,
}

async fn ensure_command(
    client: Client,
    config: &NodeCertsConfig,
    request: EnsureRequest,
) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &request.namespace);
    let pod = pods
        .get(&request.pod)
        .await
        .with_context(|| format!("Failed to get pod {}/{}", request.namespace, request.pod))?;
    let identity = NodeIdentity::from_pod(&pod, &request.cluster, &request.namespace)
        .context("Pod is not ready for a node certificate")?;

    let services: Api<Service> = Api::namespaced(client.clone(), &request.namespace);
    let selector = format!("{LABEL_CLUSTER_NAME}={}", request.cluster);
    let services = services
        .list(&ListParams::default().labels(&selector))
        .await
        .with_context(|| format!("Failed to list services with {selector}"))?
        .items
        .iter()
        .map(|service| ServiceEndpoint::from_service(service, &request.namespace))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid cluster service")?;

    let store: Arc<dyn SecretStore> = if request.dry_run {
        Arc::new(InMemorySecretStore::new())
    } else {
        Arc::new(KubeSecretStore::new(client))
    };

    let timeout = config.retry_timeout_duration();
    let interval = config.retry_interval_duration();

    let ca = until_success(
        || {
            ensure_cluster_ca(
                store.as_ref(),
                &request.namespace,
                &request.cluster,
                config.ca_cert_validity_duration(),
            )
        },
        timeout,
        interval,
    )
    .await
    .context("Failed to load or create the cluster CA")?;

    let validity = config.node_cert_validity_duration();
    let secret = until_success(
        || {
            ensure_node_certificate_secret_exists(
                store.as_ref(),
                &pod,
                &identity,
                &request.certificate_type,
                &request.labels,
                || issue_node_certificate(&ca, &identity, &services, validity),
            )
        },
        timeout,
        interval,
    )
    .await
    .context("Failed to ensure node certificate secret")?;

    let name = secret.metadata.name.unwrap_or_default();
    info!(
        pod = %identity.pod_name,
        secret = %name,
        namespace = %request.namespace,
        dry_run = request.dry_run,
        "Node certificate secret ready"
    );
    println!("{}/{name}", request.namespace);
    Ok(())
}

async fn inspect_command(client: Client, namespace: &str, name: &str, json: bool) -> Result<()> {
    let store = KubeSecretStore::new(client);
    let secret = store
        .get(namespace, name)
        .await?
        .with_context(|| format!("Secret {namespace}/{name} not found"))?;

    let chain = secret_string(&secret, name, SECRET_CERTIFICATE_KEY)?;
    let summary = CertificateSummary::from_pem(chain.as_bytes())
        .with_context(|| format!("Secret {namespace}/{name} does not hold a valid certificate"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Subject CN: {}", summary.common_name.as_deref().unwrap_or("<none>"));
    println!("Issuer:     {}", summary.issuer);
    println!("Serial:     {}", summary.serial);
    println!("Valid:      {} .. {}", summary.not_before, summary.not_after);
    for dns in &summary.dns_names {
        println!("DNS:        {dns}");
    }
    for ip in &summary.ip_addresses {
        println!("IP:         {ip}");
    }
    for other_name in &summary.other_names {
        println!("OtherName:  {} = {}", other_name.oid, other_name.value);
    }
    Ok(())
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
