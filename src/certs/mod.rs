//! # Certificates
//!
//! Node identity, certificate templates, the SubjectAltName otherName codec and the
//! cluster certificate authority.

pub mod ca;
pub mod identity;
pub mod inspect;
pub mod othername;
pub mod template;

pub use ca::{CertificateAuthority, SignedCertificate};
pub use identity::{NodeIdentity, ServiceEndpoint};
pub use inspect::{CertificateSummary, OtherNameSummary};
pub use othername::{
    encode_general_names, parse_certificate_other_names, parse_other_names, GeneralName,
    Utf8OtherName, COMMON_NAME_OID,
};
pub use template::{build_template, CertificateRequest, ValidatedCertificateTemplate};
