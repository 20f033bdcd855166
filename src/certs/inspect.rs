//! Read-back view of an issued node certificate, used by `node-certs inspect`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Serialize;
use x509_parser::extensions::GeneralName as X509GeneralName;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::certs::othername::parse_certificate_other_names;
use crate::error::{NodeCertsError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtherNameSummary {
    pub oid: String,
    pub value: String,
}

/// Subject, validity and SubjectAltName entries of one certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    pub common_name: Option<String>,
    pub issuer: String,
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub other_names: Vec<OtherNameSummary>,
}

impl CertificateSummary {
    pub fn from_der(certificate_der: &[u8]) -> Result<Self> {
        let (_, certificate) = X509Certificate::from_der(certificate_der)
            .map_err(|e| NodeCertsError::Parse(format!("invalid certificate: {e}")))?;

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        let subject_alt_name = certificate
            .subject_alternative_name()
            .map_err(|e| NodeCertsError::Parse(format!("invalid SubjectAltName: {e}")))?;
        if let Some(extension) = subject_alt_name {
            for name in &extension.value.general_names {
                match name {
                    X509GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                    X509GeneralName::IPAddress(octets) => {
                        ip_addresses.push(ip_from_octets(octets)?);
                    }
                    _ => {}
                }
            }
        }

        let other_names = parse_certificate_other_names(certificate_der)?
            .into_iter()
            .map(|other_name| OtherNameSummary {
                oid: other_name.oid.to_string(),
                value: other_name.value,
            })
            .collect();

        let common_name = certificate
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        Ok(Self {
            common_name,
            issuer: certificate.issuer().to_string(),
            serial: certificate.raw_serial_as_string(),
            not_before: certificate.validity().not_before.to_string(),
            not_after: certificate.validity().not_after.to_string(),
            dns_names,
            ip_addresses,
            other_names,
        })
    }

    /// Summarize the first certificate of a PEM bundle (the leaf of a chain)
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (_, block) = parse_x509_pem(pem)
            .map_err(|e| NodeCertsError::Parse(format!("invalid PEM: {e}")))?;
        Self::from_der(&block.contents)
    }
}

fn ip_from_octets(octets: &[u8]) -> Result<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(octets) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(octets) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(NodeCertsError::Parse(format!(
        "IP address SAN has {} octets",
        octets.len()
    )))
}
