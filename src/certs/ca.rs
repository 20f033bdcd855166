//! # Certificate Authority
//!
//! Cluster-local CA that signs node certificate templates.
//!
//! The CA is immutable once constructed. Signing only borrows it, so one instance can
//! be shared through an `Arc` by any number of concurrent reconcile tasks.

use std::fmt;
use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CustomExtension, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, PublicKeyData, SerialNumber,
};
use time::OffsetDateTime;
use tracing::debug;

use crate::certs::othername::{encode_general_names, SUBJECT_ALT_NAME_OID_ARCS};
use crate::certs::template::ValidatedCertificateTemplate;
use crate::constants::CLOCK_SKEW_MINUTES;
use crate::error::{NodeCertsError, Result};

/// A signed leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    pub der: Vec<u8>,
    pub pem: String,
}

pub struct CertificateAuthority {
    issuer: Certificate,
    signing_key: KeyPair,
    cert_pem: String,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("signing_algorithm", self.signing_key.algorithm())
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Generate a P-256 key and a self-signed CA certificate
    pub fn new_self_signed(common_name: &str, validity: Duration) -> Result<Self> {
        let signing_key = KeyPair::generate()?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(random_serial_number());
        let (not_before, not_after) = validity_window(validity)?;
        params.not_before = not_before;
        params.not_after = not_after;

        let issuer = params.self_signed(&signing_key)?;
        let cert_pem = issuer.pem();

        debug!(common_name = %common_name, "Generated self-signed certificate authority");
        Ok(Self {
            issuer,
            signing_key,
            cert_pem,
        })
    }

    /// Load a persisted CA from its PEM certificate and PKCS#8 PEM key
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let signing_key = KeyPair::from_pem(key_pem)?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem)?;
        // Only the issuer name and key of this certificate are used when signing;
        // the original PEM stays the one handed out in certificate chains.
        let issuer = params.self_signed(&signing_key)?;

        Ok(Self {
            issuer,
            signing_key,
            cert_pem: cert_pem.to_string(),
        })
    }

    #[must_use]
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    #[must_use]
    pub fn key_pem(&self) -> String {
        self.signing_key.serialize_pem()
    }

    /// Sign a template into a leaf certificate.
    ///
    /// The SubjectAltName extension is produced by the otherName codec so that DNS,
    /// IP and otherName entries share one extension.
    pub fn sign<K: PublicKeyData>(
        &self,
        template: &ValidatedCertificateTemplate<K>,
    ) -> Result<SignedCertificate> {
        let public_key = template.public_key().ok_or_else(|| {
            NodeCertsError::Signing("certificate request carries no public key".to_string())
        })?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(template.common_name());
        params.not_before = template.not_before();
        params.not_after = template.not_after();
        params.serial_number = Some(random_serial_number());
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let subject_alt_name = encode_general_names(&template.general_names())?;
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(
                SUBJECT_ALT_NAME_OID_ARCS,
                subject_alt_name,
            ));

        let certificate = params.signed_by(public_key, &self.issuer, &self.signing_key)?;

        debug!(
            common_name = %template.common_name(),
            dns_names = template.dns_names().len(),
            ip_addresses = template.ip_addresses().len(),
            "Signed node certificate"
        );

        Ok(SignedCertificate {
            der: certificate.der().to_vec(),
            pem: certificate.pem(),
        })
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name.to_string());
    name
}

/// 128 random bits with the sign bit cleared and a non-zero leading octet
fn random_serial_number() -> SerialNumber {
    let mut bytes = uuid::Uuid::new_v4().into_bytes();
    bytes[0] = (bytes[0] & 0x7f).max(1);
    SerialNumber::from(bytes.to_vec())
}

fn validity_window(validity: Duration) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let now = OffsetDateTime::now_utc();
    let not_after = time::Duration::try_from(validity)
        .ok()
        .and_then(|validity| now.checked_add(validity))
        .ok_or_else(|| {
            NodeCertsError::Signing(format!("CA validity of {validity:?} is out of range"))
        })?;
    Ok((now - time::Duration::minutes(CLOCK_SKEW_MINUTES), not_after))
}
