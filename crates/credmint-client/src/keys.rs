//! Local key material.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use crate::error::ManagerError;

/// The client's private key and the CSR carrying its public half.
///
/// The key never leaves the process; only the CSR is sent to the authority.
#[derive(Clone)]
pub struct LocalKey {
    key_pem: String,
    csr_pem: String,
}

impl LocalKey {
    /// Generate a fresh key pair and CSR.
    pub fn generate(common_name: &str) -> Result<Self, ManagerError> {
        let key_pair =
            KeyPair::generate().map_err(|e| ManagerError::KeyGeneration(e.to_string()))?;
        Self::from_key_pair(&key_pair, common_name)
    }

    /// Reuse an existing PEM encoded private key.
    pub fn from_key_pem(key_pem: &str, common_name: &str) -> Result<Self, ManagerError> {
        let key_pair =
            KeyPair::from_pem(key_pem).map_err(|e| ManagerError::KeyGeneration(e.to_string()))?;
        Self::from_key_pair(&key_pair, common_name)
    }

    fn from_key_pair(key_pair: &KeyPair, common_name: &str) -> Result<Self, ManagerError> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;

        let csr_pem = params
            .serialize_request(key_pair)
            .and_then(|csr| csr.pem())
            .map_err(|e| ManagerError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            key_pem: key_pair.serialize_pem(),
            csr_pem,
        })
    }

    /// Private key (PEM).
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Certificate signing request (PEM).
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }
}

impl std::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKey")
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let key = LocalKey::generate("client").unwrap();
        assert!(key.key_pem().contains("PRIVATE KEY"));
        assert!(key.csr_pem().starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        assert!(!format!("{:?}", key).contains("PRIVATE"));
    }

    #[test]
    fn test_from_key_pem() {
        let key = LocalKey::generate("client").unwrap();
        let reloaded = LocalKey::from_key_pem(key.key_pem(), "client").unwrap();
        assert_eq!(reloaded.key_pem(), key.key_pem());

        let result = LocalKey::from_key_pem("nope", "client");
        assert!(matches!(result, Err(ManagerError::KeyGeneration(_))));
    }
}
