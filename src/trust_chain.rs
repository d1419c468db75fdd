//! The two-level trust chain and the routine that builds it.
//!
//! ```text
//! Root CA        issuer == subject, signed by root key
//!   └── Intermediate CA   issuer == root subject, signed by root key
//! ```
//!
//! A [`TrustChain`] is immutable once constructed. The PEM text of both
//! certificates is rendered at construction so that readers never hit an
//! encoding error.

use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use openssl::x509::{X509Ref, X509};

use crate::error::{CaError, Result};
use crate::key_material::KeyPair;
use crate::pem::certificate_to_pem;
use crate::pki_generator::{
    format_name, generate_certificate, CertificateData, CertificateDataType, Issuer,
    SubjectIdentity,
};

pub const ROOT_CA_VALIDITY_DAYS_DEFAULT: u32 = 3650;
pub const INTERMEDIATE_CA_VALIDITY_DAYS_DEFAULT: u32 = 1825;
const SECONDS_PER_DAY: i64 = 86_400;

/// Validity periods, in days from the moment of generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainValidity {
    pub root_days: u32,
    pub intermediate_days: u32,
}

impl Default for ChainValidity {
    fn default() -> Self {
        Self {
            root_days: ROOT_CA_VALIDITY_DAYS_DEFAULT,
            intermediate_days: INTERMEDIATE_CA_VALIDITY_DAYS_DEFAULT,
        }
    }
}

impl ChainValidity {
    /// An intermediate must not outlive the root that signed it.
    pub fn validate(&self) -> Result<()> {
        if self.root_days == 0 || self.intermediate_days == 0 {
            return Err(CaError::InvalidConfig(
                "validity periods must be at least one day".to_string(),
            ));
        }
        if self.intermediate_days > self.root_days {
            return Err(CaError::InvalidConfig(format!(
                "intermediate validity ({} days) exceeds root validity ({} days)",
                self.intermediate_days, self.root_days
            )));
        }
        Ok(())
    }
}

/// Root and intermediate CA certificates with their private keys.
pub struct TrustChain {
    root_certificate: X509,
    root_key: KeyPair,
    intermediate_certificate: X509,
    intermediate_key: KeyPair,
    root_pem: String,
    intermediate_pem: String,
}

impl TrustChain {
    pub fn new(
        root_certificate: X509,
        root_key: KeyPair,
        intermediate_certificate: X509,
        intermediate_key: KeyPair,
    ) -> Result<Self> {
        let root_pem = certificate_to_pem(&root_certificate)?;
        let intermediate_pem = certificate_to_pem(&intermediate_certificate)?;
        Ok(Self {
            root_certificate,
            root_key,
            intermediate_certificate,
            intermediate_key,
            root_pem,
            intermediate_pem,
        })
    }

    pub fn root_certificate(&self) -> &X509Ref {
        &self.root_certificate
    }

    pub fn root_key(&self) -> &KeyPair {
        &self.root_key
    }

    pub fn intermediate_certificate(&self) -> &X509Ref {
        &self.intermediate_certificate
    }

    pub fn intermediate_key(&self) -> &KeyPair {
        &self.intermediate_key
    }

    pub fn root_certificate_pem(&self) -> &str {
        &self.root_pem
    }

    pub fn intermediate_certificate_pem(&self) -> &str {
        &self.intermediate_pem
    }

    pub fn root_subject(&self) -> String {
        format_name(self.root_certificate.subject_name())
    }

    pub fn intermediate_subject(&self) -> String {
        format_name(self.intermediate_certificate.subject_name())
    }

    /// Check the chain-of-trust invariants.
    ///
    /// - each certificate carries the public half of its stored key
    /// - the root is self-issued and its signature verifies under its own key
    /// - the intermediate is issued by the root and verifies under the root key
    /// - the intermediate expires no later than the root
    pub fn verify(&self) -> Result<()> {
        let root = &self.root_certificate;
        let intermediate = &self.intermediate_certificate;
        let root_public = root
            .public_key()
            .map_err(|e| CaError::InvalidChain(format!("root public key unreadable: {}", e)))?;
        let intermediate_public = intermediate.public_key().map_err(|e| {
            CaError::InvalidChain(format!("intermediate public key unreadable: {}", e))
        })?;

        if !root_public.public_eq(self.root_key.private_key()) {
            return Err(CaError::InvalidChain(
                "root certificate does not match root private key".to_string(),
            ));
        }
        if !intermediate_public.public_eq(self.intermediate_key.private_key()) {
            return Err(CaError::InvalidChain(
                "intermediate certificate does not match intermediate private key".to_string(),
            ));
        }

        if name_der(root.issuer_name())? != name_der(root.subject_name())? {
            return Err(CaError::InvalidChain("root certificate is not self-issued".to_string()));
        }
        if !verify_signature(root, &root_public)? {
            return Err(CaError::InvalidChain(
                "root signature does not verify under its own key".to_string(),
            ));
        }

        if name_der(intermediate.issuer_name())? != name_der(root.subject_name())? {
            return Err(CaError::InvalidChain(
                "intermediate issuer does not match root subject".to_string(),
            ));
        }
        if !verify_signature(intermediate, &root_public)? {
            return Err(CaError::InvalidChain(
                "intermediate signature does not verify under root key".to_string(),
            ));
        }

        let ordering = intermediate
            .not_after()
            .compare(root.not_after())
            .map_err(|e| CaError::InvalidChain(format!("cannot compare expiry: {}", e)))?;
        if ordering == Ordering::Greater {
            return Err(CaError::InvalidChain(
                "intermediate certificate outlives the root".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for TrustChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustChain")
            .field("root_subject", &self.root_subject())
            .field("intermediate_subject", &self.intermediate_subject())
            .field("root_key", &self.root_key)
            .field("intermediate_key", &self.intermediate_key)
            .finish()
    }
}

fn name_der(name: &openssl::x509::X509NameRef) -> Result<Vec<u8>> {
    name.to_der()
        .map_err(|e| CaError::InvalidChain(format!("cannot encode name: {}", e)))
}

fn verify_signature(
    certificate: &X509Ref,
    key: &openssl::pkey::PKeyRef<openssl::pkey::Public>,
) -> Result<bool> {
    certificate
        .verify(key)
        .map_err(|e| CaError::InvalidChain(format!("signature check errored: {}", e)))
}

/// Generate a root CA and an intermediate CA signed by it.
///
/// Both certificates start at the current time. Serial numbers are the
/// current time in milliseconds (root) and that value plus one
/// (intermediate). The result is checked with [`TrustChain::verify`] before
/// it is returned.
pub fn build_chain(
    root_subject: &SubjectIdentity,
    intermediate_subject: &SubjectIdentity,
    validity: ChainValidity,
    key_bits: u32,
) -> Result<TrustChain> {
    validity.validate()?;
    root_subject.validate()?;
    intermediate_subject.validate()?;

    // One clock reading for both the validity start and the serial.
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CaError::Signing(format!("system clock before epoch: {}", e)))?;
    let not_before = now.as_secs() as i64;
    let root_serial = now.as_millis() as u64;

    let root_key = KeyPair::generate(key_bits)?;
    let root_data = CertificateData {
        subject: root_subject.clone(),
        serial: root_serial,
        not_before,
        not_after: not_before + i64::from(validity.root_days) * SECONDS_PER_DAY,
        cert_type: CertificateDataType::RootCA,
    };
    let root_certificate = generate_certificate(
        &root_data,
        root_key.private_key(),
        Issuer::SelfSigned,
        root_key.private_key(),
    )?;
    info!("Root CA generated: {}", root_subject);

    let intermediate_key = KeyPair::generate(key_bits)?;
    let intermediate_data = CertificateData {
        subject: intermediate_subject.clone(),
        serial: root_serial.wrapping_add(1),
        not_before,
        not_after: not_before + i64::from(validity.intermediate_days) * SECONDS_PER_DAY,
        cert_type: CertificateDataType::IntermediateCA,
    };
    let intermediate_certificate = generate_certificate(
        &intermediate_data,
        intermediate_key.private_key(),
        Issuer::Certificate(&root_certificate),
        root_key.private_key(),
    )?;
    info!("Intermediate CA generated: {}", intermediate_subject);

    let chain = TrustChain::new(
        root_certificate,
        root_key,
        intermediate_certificate,
        intermediate_key,
    )?;
    chain.verify()?;
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;

    fn subjects() -> (SubjectIdentity, SubjectIdentity) {
        (
            SubjectIdentity::new("Chat Root CA", "Chat Corp", "US"),
            SubjectIdentity::new("Chat Intermediate CA", "Chat Corp", "US"),
        )
    }

    fn test_chain() -> TrustChain {
        let (root, intermediate) = subjects();
        build_chain(&root, &intermediate, ChainValidity::default(), 2048).unwrap()
    }

    #[test]
    fn test_validity_defaults() {
        let validity = ChainValidity::default();
        assert_eq!(validity.root_days, 3650);
        assert_eq!(validity.intermediate_days, 1825);
        assert!(validity.validate().is_ok());
    }

    #[test]
    fn test_intermediate_outliving_root_rejected() {
        let validity = ChainValidity {
            root_days: 365,
            intermediate_days: 366,
        };
        assert!(matches!(validity.validate(), Err(CaError::InvalidConfig(_))));

        let (root, intermediate) = subjects();
        let err = build_chain(&root, &intermediate, validity, 2048).unwrap_err();
        assert!(matches!(err, CaError::InvalidConfig(_)));
    }

    #[test]
    fn test_root_is_self_signed() {
        let chain = test_chain();
        let root = chain.root_certificate();
        let root_public = root.public_key().unwrap();
        assert!(root.verify(&root_public).unwrap());
        assert_eq!(chain.root_subject(), "CN=Chat Root CA, O=Chat Corp, C=US");
        assert_eq!(format_name(root.issuer_name()), chain.root_subject());
    }

    #[test]
    fn test_intermediate_chains_to_root() {
        let chain = test_chain();
        let root_public = chain.root_certificate().public_key().unwrap();
        let intermediate = chain.intermediate_certificate();
        assert!(intermediate.verify(&root_public).unwrap());
        assert_eq!(format_name(intermediate.issuer_name()), chain.root_subject());
        assert_eq!(
            chain.intermediate_subject(),
            "CN=Chat Intermediate CA, O=Chat Corp, C=US"
        );
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_validity_window() {
        let chain = test_chain();
        let now = Asn1Time::days_from_now(0).unwrap();
        let root = chain.root_certificate();
        let intermediate = chain.intermediate_certificate();

        assert_ne!(root.not_before().compare(&now).unwrap(), Ordering::Greater);
        assert_eq!(root.not_after().compare(&now).unwrap(), Ordering::Greater);
        assert_ne!(
            intermediate
                .not_after()
                .compare(root.not_after())
                .unwrap(),
            Ordering::Greater
        );
        let days = root.not_before().diff(root.not_after()).unwrap().days;
        assert_eq!(days, 3650);
        let days = intermediate
            .not_before()
            .diff(intermediate.not_after())
            .unwrap()
            .days;
        assert_eq!(days, 1825);
    }

    #[test]
    fn test_serials_are_distinct() {
        let chain = test_chain();
        let root_serial = chain.root_certificate().serial_number().to_bn().unwrap();
        let int_serial = chain
            .intermediate_certificate()
            .serial_number()
            .to_bn()
            .unwrap();
        assert_ne!(root_serial, int_serial);
    }

    #[test]
    fn test_serial_taken_from_validity_start() {
        let chain = test_chain();
        let root = chain.root_certificate();

        let serial = root.serial_number().to_bn().unwrap();
        let millis: u64 = serial.to_dec_str().unwrap().parse().unwrap();
        assert_ne!(millis, 0);

        let epoch = Asn1Time::from_unix(0).unwrap();
        let since_epoch = epoch.diff(root.not_before()).unwrap();
        let not_before_secs =
            i64::from(since_epoch.days) * SECONDS_PER_DAY + i64::from(since_epoch.secs);
        assert_eq!((millis / 1000) as i64, not_before_secs);
    }

    #[test]
    fn test_extensions() {
        let chain = test_chain();
        let root_text =
            String::from_utf8(chain.root_certificate().to_text().unwrap()).unwrap();
        let int_text =
            String::from_utf8(chain.intermediate_certificate().to_text().unwrap()).unwrap();

        assert!(root_text.contains("X509v3 Basic Constraints: critical"));
        assert!(root_text.contains("CA:TRUE"));
        assert!(!root_text.contains("pathlen"));
        assert!(root_text.contains("X509v3 Key Usage: critical"));
        assert!(root_text.contains("Certificate Sign, CRL Sign"));
        assert!(root_text.contains("X509v3 Subject Key Identifier"));
        assert!(!root_text.contains("X509v3 Authority Key Identifier"));

        assert!(int_text.contains("X509v3 Basic Constraints: critical"));
        assert!(int_text.contains("CA:TRUE, pathlen:0"));
        assert!(int_text.contains("Certificate Sign, CRL Sign"));
        assert!(int_text.contains("X509v3 Subject Key Identifier"));
        assert!(int_text.contains("X509v3 Authority Key Identifier"));

        assert_eq!(
            chain
                .intermediate_certificate()
                .authority_key_id()
                .unwrap()
                .as_slice(),
            chain.root_certificate().subject_key_id().unwrap().as_slice()
        );
    }

    #[test]
    fn test_verify_detects_foreign_intermediate() {
        let chain = test_chain();
        let other = test_chain();
        let mixed = TrustChain::new(
            chain.root_certificate().to_owned(),
            KeyPair::from_private_key(chain.root_key().private_key().clone()),
            other.intermediate_certificate().to_owned(),
            KeyPair::from_private_key(other.intermediate_key().private_key().clone()),
        )
        .unwrap();
        assert!(matches!(mixed.verify(), Err(CaError::InvalidChain(_))));
    }

    #[test]
    fn test_pem_accessors() {
        let chain = test_chain();
        assert!(chain.root_certificate_pem().contains("BEGIN CERTIFICATE"));
        assert!(chain
            .intermediate_certificate_pem()
            .contains("BEGIN CERTIFICATE"));
        assert_ne!(
            chain.root_certificate_pem(),
            chain.intermediate_certificate_pem()
        );
    }
}
