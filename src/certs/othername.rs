//! # OtherName Codec
//!
//! DER encoding and decoding of the SubjectAltName `GeneralNames` structure, including
//! the `otherName` arm that generic certificate builders do not expose.
//!
//! ```text
//! GeneralNames ::= SEQUENCE SIZE (1..MAX) OF GeneralName
//!
//! GeneralName ::= CHOICE {
//!      otherName                 [0]  IMPLICIT OtherName,
//!      dNSName                   [2]  IMPLICIT IA5String,
//!      iPAddress                 [7]  IMPLICIT OCTET STRING,
//!      ... }
//!
//! OtherName ::= SEQUENCE {
//!      type-id    OBJECT IDENTIFIER,
//!      value      [0] EXPLICIT ANY DEFINED BY type-id }
//! ```
//!
//! Only UTF8String-valued other names are produced or accepted.

use std::net::IpAddr;

use der::asn1::{AnyRef, ObjectIdentifier, Utf8StringRef};
use der::{Decode, Encode, Reader, SliceReader, Tag, TagNumber, Tagged};
use x509_parser::oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{NodeCertsError, Result};

/// OID used for the node identity other name (id-at-commonName)
pub const COMMON_NAME_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Arcs of the SubjectAltName extension OID (2.5.29.17)
pub const SUBJECT_ALT_NAME_OID_ARCS: &[u64] = &[2, 5, 29, 17];

/// `[0]` constructed: the otherName arm, and the explicit wrapper around its value
const CONTEXT_0_CONSTRUCTED: Tag = Tag::ContextSpecific {
    constructed: true,
    number: TagNumber::N0,
};

const DNS_NAME_TAG: Tag = Tag::ContextSpecific {
    constructed: false,
    number: TagNumber::N2,
};

const IP_ADDRESS_TAG: Tag = Tag::ContextSpecific {
    constructed: false,
    number: TagNumber::N7,
};

/// An otherName SAN entry whose value is a UTF8String
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Utf8OtherName {
    pub oid: ObjectIdentifier,
    pub value: String,
}

impl Utf8OtherName {
    #[must_use]
    pub fn new(oid: ObjectIdentifier, value: impl Into<String>) -> Self {
        Self {
            oid,
            value: value.into(),
        }
    }

    /// Encode as a complete `GeneralName` TLV (`[0] IMPLICIT OtherName`)
    pub fn to_general_name_der(&self) -> Result<Vec<u8>> {
        let value = Utf8StringRef::new(&self.value)?.to_der()?;
        let explicit_value = AnyRef::new(CONTEXT_0_CONSTRUCTED, &value)?.to_der()?;

        let mut body = self.oid.to_der()?;
        body.extend_from_slice(&explicit_value);

        Ok(AnyRef::new(CONTEXT_0_CONSTRUCTED, &body)?.to_der()?)
    }

    /// Decode the content octets of a `[0] IMPLICIT OtherName`
    fn from_implicit_body(body: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(body)?;
        let oid = ObjectIdentifier::decode(&mut reader)?;
        let explicit_value = AnyRef::decode(&mut reader)?;
        if !reader.is_finished() {
            return Err(NodeCertsError::Parse(format!(
                "trailing data after otherName value for {oid}"
            )));
        }

        if explicit_value.tag() != CONTEXT_0_CONSTRUCTED {
            return Err(NodeCertsError::Parse(format!(
                "otherName {oid} value has tag {}, expected [0] EXPLICIT",
                explicit_value.tag()
            )));
        }

        let value = Utf8StringRef::from_der(explicit_value.value())?;
        Ok(Self {
            oid,
            value: value.as_str().to_string(),
        })
    }
}

/// The subset of `GeneralName` arms this crate emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralName {
    OtherName(Utf8OtherName),
    DnsName(String),
    IpAddress(IpAddr),
}

impl GeneralName {
    fn to_der(&self) -> Result<Vec<u8>> {
        match self {
            GeneralName::OtherName(other_name) => other_name.to_general_name_der(),
            GeneralName::DnsName(dns) => {
                if dns.is_empty() || !dns.is_ascii() {
                    return Err(NodeCertsError::InvalidIdentity(format!(
                        "DNS name {dns:?} is not a non-empty IA5String"
                    )));
                }
                Ok(AnyRef::new(DNS_NAME_TAG, dns.as_bytes())?.to_der()?)
            }
            GeneralName::IpAddress(ip) => {
                let octets = ip_octets(*ip);
                Ok(AnyRef::new(IP_ADDRESS_TAG, &octets)?.to_der()?)
            }
        }
    }
}

/// IPv4 and IPv4-mapped IPv6 addresses become 4 octets, other IPv6 addresses 16
fn ip_octets(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.octets().to_vec(),
            None => v6.octets().to_vec(),
        },
    }
}

/// Encode the value of a SubjectAltName extension (`GeneralNames`)
pub fn encode_general_names(names: &[GeneralName]) -> Result<Vec<u8>> {
    if names.is_empty() {
        return Err(NodeCertsError::InvalidIdentity(
            "GeneralNames must contain at least one entry".to_string(),
        ));
    }

    let mut body = Vec::new();
    for name in names {
        body.extend_from_slice(&name.to_der()?);
    }

    Ok(AnyRef::new(Tag::Sequence, &body)?.to_der()?)
}

/// Extract every otherName entry from a SubjectAltName extension value.
///
/// Entries of any other `GeneralName` arm (DNS, IP, email, URI, ...) are skipped.
/// Any malformed entry fails the whole call.
pub fn parse_other_names(san_extension_value: &[u8]) -> Result<Vec<Utf8OtherName>> {
    let general_names = AnyRef::from_der(san_extension_value)?;
    if general_names.tag() != Tag::Sequence {
        return Err(NodeCertsError::Parse(format!(
            "SubjectAltName has tag {}, expected SEQUENCE",
            general_names.tag()
        )));
    }

    let mut reader = SliceReader::new(general_names.value())?;
    let mut other_names = Vec::new();
    while !reader.is_finished() {
        let entry = AnyRef::decode(&mut reader)?;
        if entry.tag() == CONTEXT_0_CONSTRUCTED {
            other_names.push(Utf8OtherName::from_implicit_body(entry.value())?);
        }
    }

    Ok(other_names)
}

/// Extract the otherName entries of a DER certificate's SubjectAltName extension.
///
/// A certificate without a SubjectAltName extension yields an empty list.
pub fn parse_certificate_other_names(certificate_der: &[u8]) -> Result<Vec<Utf8OtherName>> {
    let (_, certificate) = X509Certificate::from_der(certificate_der)
        .map_err(|e| NodeCertsError::Parse(format!("invalid certificate: {e}")))?;

    match certificate
        .extensions()
        .iter()
        .find(|ext| ext.oid == OID_X509_EXT_SUBJECT_ALT_NAME)
    {
        Some(extension) => parse_other_names(extension.value),
        None => Ok(Vec::new()),
    }
}
