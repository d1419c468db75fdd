//! X.509v3 certificate construction for the two CA roles.
//!
//! A [`CertificateData`] value describes everything that goes into a
//! certificate except key material; [`generate_certificate`] turns it into a
//! signed certificate. There are no setters and no I/O here, so the same input
//! always produces the same to-be-signed structure.
//!
//! ```text
//! Root CA (self-signed, CA=true, no pathlen)
//!   └── Intermediate CA (signed by Root, CA=true, pathlen=0)
//! ```
//!
//! Both roles carry a critical `keyUsage{keyCertSign, cRLSign}` and a
//! `subjectKeyIdentifier`. The intermediate additionally carries an
//! `authorityKeyIdentifier` pointing at the root.

use std::fmt;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKeyRef, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameRef, X509Ref, X509};

use crate::error::{CaError, Result};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const INTERMEDIATE_CA_PATH_LENGTH: u32 = 0;

/// Distinguished name fields of a certificate subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub common_name: String,
    pub organization: String,
    pub country: String,
}

impl SubjectIdentity {
    pub fn new(common_name: &str, organization: &str, country: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: organization.to_string(),
            country: country.to_string(),
        }
    }

    /// Render as `CN=.., O=.., C=..`, omitting empty components.
    pub fn distinguished_name(&self) -> String {
        let mut parts = vec![format!("CN={}", self.common_name)];
        if !self.organization.is_empty() {
            parts.push(format!("O={}", self.organization));
        }
        if !self.country.is_empty() {
            parts.push(format!("C={}", self.country));
        }
        parts.join(", ")
    }

    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(CaError::InvalidConfig(
                "subject common name must not be empty".to_string(),
            ));
        }
        if !self.country.is_empty() && self.country.chars().count() != 2 {
            return Err(CaError::InvalidConfig(format!(
                "country must be a two-letter ISO code, got '{}'",
                self.country
            )));
        }
        Ok(())
    }

    pub(crate) fn to_x509_name(&self) -> Result<X509Name> {
        self.validate()?;
        let mut name_builder =
            X509Name::builder().map_err(|e| CaError::signing("Failed to create name builder", e))?;
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &self.common_name)
            .map_err(|e| CaError::signing("Failed to set CN", e))?;
        if !self.organization.is_empty() {
            name_builder
                .append_entry_by_nid(Nid::ORGANIZATIONNAME, &self.organization)
                .map_err(|e| CaError::signing("Failed to set organization", e))?;
        }
        if !self.country.is_empty() {
            name_builder
                .append_entry_by_nid(Nid::COUNTRYNAME, &self.country)
                .map_err(|e| CaError::signing("Failed to set country", e))?;
        }
        Ok(name_builder.build())
    }
}

impl fmt::Display for SubjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.distinguished_name())
    }
}

/// Role of the certificate being built; selects the extension set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateDataType {
    RootCA,
    IntermediateCA,
}

impl CertificateDataType {
    fn path_length(self) -> Option<u32> {
        match self {
            CertificateDataType::RootCA => None,
            CertificateDataType::IntermediateCA => Some(INTERMEDIATE_CA_PATH_LENGTH),
        }
    }
}

/// Everything that goes into a certificate apart from key material.
///
/// `not_before` and `not_after` are Unix timestamps in seconds.
#[derive(Debug, Clone)]
pub struct CertificateData {
    pub subject: SubjectIdentity,
    pub serial: u64,
    pub not_before: i64,
    pub not_after: i64,
    pub cert_type: CertificateDataType,
}

/// Who signs the certificate.
#[derive(Clone, Copy)]
pub enum Issuer<'a> {
    /// Issuer name equals the subject name; signed by the subject's own key.
    SelfSigned,
    /// Issuer name and authority key identifier come from this certificate.
    Certificate(&'a X509Ref),
}

/// Build and sign an X.509v3 certificate.
///
/// `subject_key` supplies the certified public key, `issuer_key` signs with
/// SHA-256. Only RSA issuer keys are accepted.
pub fn generate_certificate<T: HasPublic>(
    cert_data: &CertificateData,
    subject_key: &PKeyRef<T>,
    issuer: Issuer<'_>,
    issuer_key: &PKeyRef<Private>,
) -> Result<X509> {
    if issuer_key.id() != Id::RSA {
        return Err(CaError::Signing(format!(
            "issuer key algorithm {:?} cannot sign with SHA256withRSA",
            issuer_key.id()
        )));
    }
    if cert_data.not_after <= cert_data.not_before {
        return Err(CaError::InvalidConfig(format!(
            "not_after ({}) must be later than not_before ({})",
            cert_data.not_after, cert_data.not_before
        )));
    }

    let mut builder =
        X509::builder().map_err(|e| CaError::signing("Failed to create X509 builder", e))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(|e| CaError::signing("Failed to set version", e))?;

    let serial = BigNum::from_slice(&cert_data.serial.to_be_bytes())
        .and_then(|bn| bn.to_asn1_integer())
        .map_err(|e| CaError::signing("Failed to encode serial number", e))?;
    builder
        .set_serial_number(&serial)
        .map_err(|e| CaError::signing("Failed to set serial number", e))?;

    let subject_name = cert_data.subject.to_x509_name()?;
    builder
        .set_subject_name(&subject_name)
        .map_err(|e| CaError::signing("Failed to set subject", e))?;
    let issuer_name = match issuer {
        Issuer::SelfSigned => &*subject_name,
        Issuer::Certificate(cert) => cert.subject_name(),
    };
    builder
        .set_issuer_name(issuer_name)
        .map_err(|e| CaError::signing("Failed to set issuer", e))?;

    let not_before = Asn1Time::from_unix(cert_data.not_before as _)
        .map_err(|e| CaError::signing("Failed to create not_before", e))?;
    builder
        .set_not_before(&not_before)
        .map_err(|e| CaError::signing("Failed to set not_before", e))?;
    let not_after = Asn1Time::from_unix(cert_data.not_after as _)
        .map_err(|e| CaError::signing("Failed to create not_after", e))?;
    builder
        .set_not_after(&not_after)
        .map_err(|e| CaError::signing("Failed to set not_after", e))?;

    builder
        .set_pubkey(subject_key)
        .map_err(|e| CaError::signing("Failed to set public key", e))?;

    let mut bc = BasicConstraints::new();
    bc.critical().ca();
    if let Some(pathlen) = cert_data.cert_type.path_length() {
        bc.pathlen(pathlen);
    }
    let extension = bc
        .build()
        .map_err(|e| CaError::signing("Failed to build BasicConstraints", e))?;
    builder
        .append_extension(extension)
        .map_err(|e| CaError::signing("Failed to add BasicConstraints", e))?;

    let ku_extension = KeyUsage::new()
        .critical()
        .key_cert_sign()
        .crl_sign()
        .build()
        .map_err(|e| CaError::signing("Failed to build KeyUsage", e))?;
    builder
        .append_extension(ku_extension)
        .map_err(|e| CaError::signing("Failed to add KeyUsage", e))?;

    let ski_extension = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .map_err(|e| CaError::signing("Failed to build SubjectKeyIdentifier", e))?;
    builder
        .append_extension(ski_extension)
        .map_err(|e| CaError::signing("Failed to add SubjectKeyIdentifier", e))?;

    if let Issuer::Certificate(issuer_cert) = issuer {
        let aki_extension = AuthorityKeyIdentifier::new()
            .keyid(true)
            .build(&builder.x509v3_context(Some(issuer_cert), None))
            .map_err(|e| CaError::signing("Failed to build AuthorityKeyIdentifier", e))?;
        builder
            .append_extension(aki_extension)
            .map_err(|e| CaError::signing("Failed to add AuthorityKeyIdentifier", e))?;
    }

    builder
        .sign(issuer_key, MessageDigest::sha256())
        .map_err(|e| CaError::signing("Failed to sign certificate", e))?;

    Ok(builder.build())
}

/// Render an X.509 name as `CN=.., O=.., C=..` in encoding order.
pub fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
