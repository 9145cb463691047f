//! Certificate Authority for role identity certificates.
//!
//! Uses rcgen to parse CSRs and sign certificates. The CSR only contributes
//! its public key: subject, SANs, usages and validity are all decided here
//! from the verified identity.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::verifier::VerifiedIdentity;

/// Errors that can occur during CA operations.
#[derive(Debug, Error)]
pub enum CaError {
    #[error("failed to read CA certificate: {0}")]
    ReadCert(std::io::Error),

    #[error("failed to read CA private key: {0}")]
    ReadKey(std::io::Error),

    #[error("failed to write CA material: {0}")]
    Write(std::io::Error),

    #[error("failed to parse CA certificate: {0}")]
    ParseCert(String),

    #[error("failed to parse CA private key: {0}")]
    ParseKey(String),

    #[error("failed to generate CA: {0}")]
    Generate(String),

    #[error("failed to parse CSR: {0}")]
    ParseCsr(String),

    #[error("invalid identity for certificate: {0}")]
    InvalidIdentity(String),

    #[error("failed to sign certificate: {0}")]
    SignError(String),
}

/// Certificate Authority that signs role certificates.
pub struct CertificateAuthority {
    /// CA certificate (PEM).
    ca_cert_pem: String,

    /// CA certificate as an rcgen issuer.
    ca_cert: Certificate,

    /// CA key pair.
    ca_key_pair: KeyPair,

    /// Validity of issued certificates.
    validity: Duration,
}

impl CertificateAuthority {
    /// Load CA from certificate and key files.
    pub fn from_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        validity: Duration,
    ) -> Result<Self, CaError> {
        let ca_cert_pem = std::fs::read_to_string(cert_path).map_err(CaError::ReadCert)?;
        let ca_key_pem = std::fs::read_to_string(key_path).map_err(CaError::ReadKey)?;

        let ca_key_pair =
            KeyPair::from_pem(&ca_key_pem).map_err(|e| CaError::ParseKey(e.to_string()))?;

        // Rebuild the issuer from the stored certificate so issued
        // certificates chain to the exact subject on disk.
        let ca_params = CertificateParams::from_ca_cert_pem(&ca_cert_pem)
            .map_err(|e| CaError::ParseCert(e.to_string()))?;
        let ca_cert = ca_params
            .self_signed(&ca_key_pair)
            .map_err(|e| CaError::ParseCert(e.to_string()))?;

        Ok(Self {
            ca_cert_pem,
            ca_cert,
            ca_key_pair,
            validity,
        })
    }

    /// Generate a fresh self-signed CA.
    pub fn generate(common_name: &str, validity: Duration) -> Result<Self, CaError> {
        let ca_key_pair = KeyPair::generate().map_err(|e| CaError::Generate(e.to_string()))?;

        let mut ca_params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn.push(DnType::OrganizationName, "credmint");
        ca_params.distinguished_name = dn;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = OffsetDateTime::now_utc();
        ca_params.not_before = now;
        ca_params.not_after = now + time::Duration::days(3650);

        let ca_cert = ca_params
            .self_signed(&ca_key_pair)
            .map_err(|e| CaError::Generate(e.to_string()))?;

        Ok(Self {
            ca_cert_pem: ca_cert.pem(),
            ca_cert,
            ca_key_pair,
            validity,
        })
    }

    /// Write the CA certificate and private key as PEM files.
    pub fn write_files(
        &self,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<(), CaError> {
        std::fs::write(cert_path, &self.ca_cert_pem).map_err(CaError::Write)?;
        std::fs::write(key_path, self.ca_key_pair.serialize_pem()).map_err(CaError::Write)?;
        Ok(())
    }

    /// Get the CA certificate in PEM format.
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Validity of issued certificates.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Sign a CSR for a verified role identity.
    ///
    /// The certificate CN is the verified principal and the capability scope
    /// (the full role ARN) goes into a URI SAN.
    pub fn sign_role_csr(
        &self,
        csr_pem: &str,
        identity: &VerifiedIdentity,
    ) -> Result<SignedCertificate, CaError> {
        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| CaError::ParseCsr(e.to_string()))?;

        let scope_uri = Ia5String::try_from(identity.capability_scope.clone()).map_err(|e| {
            CaError::InvalidIdentity(format!(
                "capability scope '{}' is not a valid URI SAN: {}",
                identity.capability_scope, e
            ))
        })?;

        // Calculate validity from a single clock reading
        let issued_at = Utc::now();
        let not_before = OffsetDateTime::from_unix_timestamp(issued_at.timestamp())
            .map_err(|e| CaError::SignError(e.to_string()))?;
        let not_after = not_before + time::Duration::seconds(self.validity.as_secs() as i64);
        let expires_at = DateTime::from_timestamp(not_after.unix_timestamp(), 0)
            .ok_or_else(|| CaError::SignError("expiry out of range".to_string()))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, identity.principal.clone());
        dn.push(DnType::OrganizationName, "credmint role");

        let mut serial = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut serial);
        serial[0] &= 0x7f;

        // Override everything the requester asked for
        let params = &mut csr.params;
        params.distinguished_name = dn;
        params.subject_alt_names = vec![SanType::URI(scope_uri)];
        params.is_ca = IsCa::NoCa;
        params.not_before = not_before;
        params.not_after = not_after;
        params.serial_number = Some(SerialNumber::from_slice(&serial));
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let cert = csr
            .signed_by(&self.ca_cert, &self.ca_key_pair)
            .map_err(|e| CaError::SignError(e.to_string()))?;

        debug!(
            principal = %identity.principal,
            scope = %identity.capability_scope,
            expires_at = %expires_at,
            "Signed role certificate"
        );

        Ok(SignedCertificate {
            cert_pem: cert.pem(),
            expires_at,
            principal: identity.principal.clone(),
        })
    }
}

/// A signed certificate returned by the CA.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    /// The signed certificate in PEM format.
    pub cert_pem: String,

    /// When the certificate expires.
    pub expires_at: DateTime<Utc>,

    /// Principal placed in the CN.
    pub principal: String,
}
