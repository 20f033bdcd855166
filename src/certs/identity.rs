//! Node identity and service endpoint inputs to the certificate template.

use k8s_openapi::api::core::v1::{Pod, Service};

use crate::constants::{CANONICAL_IDENTITY_DOMAIN, CLUSTER_DNS_DOMAIN};
use crate::error::{NodeCertsError, Result};

/// Identity of one cluster member for a single reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub pod_name: String,
    pub pod_ip: String,
    pub cluster_name: String,
    pub namespace: String,
}

impl NodeIdentity {
    pub fn new(
        pod_name: impl Into<String>,
        pod_ip: impl Into<String>,
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            pod_name: pod_name.into(),
            pod_ip: pod_ip.into(),
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
        }
    }

    /// Build the identity from a scheduled pod.
    ///
    /// The pod must have a name and an assigned IP (`status.podIP`).
    pub fn from_pod(pod: &Pod, cluster_name: &str, namespace: &str) -> Result<Self> {
        let pod_name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| NodeCertsError::InvalidIdentity("pod has no name".to_string()))?;

        let pod_ip = pod
            .status
            .as_ref()
            .and_then(|status| status.pod_ip.clone())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| {
                NodeCertsError::InvalidIdentity(format!("pod {pod_name} has no IP assigned yet"))
            })?;

        Ok(Self::new(pod_name, pod_ip, cluster_name, namespace))
    }

    /// `<pod>.node.<cluster>.<namespace>.es.cluster.local`
    #[must_use]
    pub fn canonical_name(&self) -> String {
        format!(
            "{}.node.{}.{}.{}",
            self.pod_name, self.cluster_name, self.namespace, CANONICAL_IDENTITY_DOMAIN
        )
    }
}

/// A cluster service whose names and IP must be present in every node certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: String,
    pub namespace: String,
    pub cluster_ip: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        cluster_ip: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster_ip: cluster_ip.filter(|ip| has_cluster_ip(ip)),
        }
    }

    /// Headless services (`clusterIP: None`) contribute names but no IP
    pub fn from_service(service: &Service, default_namespace: &str) -> Result<Self> {
        let name = service
            .metadata
            .name
            .clone()
            .ok_or_else(|| NodeCertsError::InvalidIdentity("service has no name".to_string()))?;
        let namespace = service
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| default_namespace.to_string());
        let cluster_ip = service
            .spec
            .as_ref()
            .and_then(|spec| spec.cluster_ip.clone());

        Ok(Self::new(name, namespace, cluster_ip))
    }

    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.{}.{}", self.name, self.namespace, CLUSTER_DNS_DOMAIN)
    }
}

fn has_cluster_ip(ip: &str) -> bool {
    !ip.is_empty() && ip != "None"
}
