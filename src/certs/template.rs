//! # Certificate Template
//!
//! Builds the unsigned, validated description of a node certificate from the node
//! identity and the services of its cluster.
//!
//! The template is pure data: building it performs no I/O and generates no keys. The
//! subject public key comes from a [`CertificateRequest`] prepared by the caller.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use time::OffsetDateTime;

use crate::certs::identity::{NodeIdentity, ServiceEndpoint};
use crate::certs::othername::{GeneralName, Utf8OtherName, COMMON_NAME_OID};
use crate::constants::CLOCK_SKEW_MINUTES;
use crate::error::{NodeCertsError, Result};

/// Certificate signing request: the public key the certificate is issued for
#[derive(Debug, Clone)]
pub struct CertificateRequest<K> {
    pub public_key: Option<K>,
}

impl<K> CertificateRequest<K> {
    pub fn new(public_key: K) -> Self {
        Self {
            public_key: Some(public_key),
        }
    }

    /// A request without a subject key; signing it fails
    pub fn without_key() -> Self {
        Self { public_key: None }
    }
}

/// Unsigned node certificate, validated against the node identity
#[derive(Debug, Clone)]
pub struct ValidatedCertificateTemplate<K> {
    common_name: String,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    other_name: Utf8OtherName,
    public_key: Option<K>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl<K> ValidatedCertificateTemplate<K> {
    /// Validate the inputs and assemble the template.
    ///
    /// DNS names are `[pod] ++ [service, service FQDN]...`, IP addresses are
    /// `[pod IP, 127.0.0.1] ++ [service cluster IP]...`. Duplicates are kept.
    pub fn build(
        identity: &NodeIdentity,
        services: &[ServiceEndpoint],
        request: CertificateRequest<K>,
        validity: Duration,
    ) -> Result<Self> {
        validate_identity(identity)?;

        let canonical = identity.canonical_name();

        let mut dns_names = Vec::with_capacity(1 + services.len() * 2);
        dns_names.push(identity.pod_name.clone());
        for service in services {
            dns_names.push(service.name.clone());
            dns_names.push(service.fqdn());
        }
        if let Some(invalid) = dns_names.iter().find(|name| !is_valid_dns_name(name)) {
            return Err(NodeCertsError::InvalidIdentity(format!(
                "DNS name {invalid:?} must be non-empty ASCII"
            )));
        }

        let mut ip_addresses = Vec::with_capacity(2 + services.len());
        ip_addresses.push(parse_ip(&identity.pod_ip, "pod IP")?);
        ip_addresses.push(IpAddr::V4(Ipv4Addr::LOCALHOST));
        for service in services {
            if let Some(cluster_ip) = &service.cluster_ip {
                let context = format!("cluster IP of service {}", service.name);
                ip_addresses.push(parse_ip(cluster_ip, &context)?);
            }
        }

        let now = OffsetDateTime::now_utc();
        let not_before = now - time::Duration::minutes(CLOCK_SKEW_MINUTES);
        let not_after = time::Duration::try_from(validity)
            .ok()
            .and_then(|validity| now.checked_add(validity))
            .ok_or_else(|| {
                NodeCertsError::InvalidIdentity(format!(
                    "validity of {validity:?} is out of range"
                ))
            })?;

        Ok(Self {
            common_name: canonical.clone(),
            dns_names,
            ip_addresses,
            other_name: Utf8OtherName::new(COMMON_NAME_OID, canonical),
            public_key: request.public_key,
            not_before,
            not_after,
        })
    }

    #[must_use]
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    #[must_use]
    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    #[must_use]
    pub fn ip_addresses(&self) -> &[IpAddr] {
        &self.ip_addresses
    }

    #[must_use]
    pub fn other_name(&self) -> &Utf8OtherName {
        &self.other_name
    }

    #[must_use]
    pub fn public_key(&self) -> Option<&K> {
        self.public_key.as_ref()
    }

    #[must_use]
    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    #[must_use]
    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// SubjectAltName entries in extension order: DNS names, IP addresses, other name
    #[must_use]
    pub fn general_names(&self) -> Vec<GeneralName> {
        self.dns_names
            .iter()
            .cloned()
            .map(GeneralName::DnsName)
            .chain(self.ip_addresses.iter().copied().map(GeneralName::IpAddress))
            .chain(std::iter::once(GeneralName::OtherName(
                self.other_name.clone(),
            )))
            .collect()
    }
}

/// Free-function form of [`ValidatedCertificateTemplate::build`]
pub fn build_template<K>(
    identity: &NodeIdentity,
    services: &[ServiceEndpoint],
    request: CertificateRequest<K>,
    validity: Duration,
) -> Result<ValidatedCertificateTemplate<K>> {
    ValidatedCertificateTemplate::build(identity, services, request, validity)
}

fn validate_identity(identity: &NodeIdentity) -> Result<()> {
    for (field, value) in [
        ("pod name", &identity.pod_name),
        ("cluster name", &identity.cluster_name),
        ("namespace", &identity.namespace),
    ] {
        if value.is_empty() {
            return Err(NodeCertsError::InvalidIdentity(format!("{field} is empty")));
        }
    }
    Ok(())
}

fn is_valid_dns_name(name: &str) -> bool {
    !name.is_empty() && name.is_ascii()
}

fn parse_ip(value: &str, context: &str) -> Result<IpAddr> {
    let ip: IpAddr = value.parse().map_err(|_| {
        NodeCertsError::InvalidIdentity(format!("{context} {value:?} is not an IP address"))
    })?;
    Ok(normalize_ip(ip))
}

/// IPv4-mapped IPv6 addresses are stored as their IPv4 form
#[must_use]
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}
