//! Key pair and CSR generation for cluster enrollment
//!
//! The node generates its key pair locally and only ever sends the CSR to the
//! cluster. The private key is written to local storage and never leaves the
//! node.

use rcgen::{
    string::Ia5String, CertificateParams, DistinguishedName, DnType, DnValue, KeyPair,
    PKCS_RSA_SHA256,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;

/// RSA modulus size for node keys
pub const RSA_KEY_BITS: usize = 2048;

/// Common name placed in every enrollment CSR; the cluster assigns the real identity
pub const CSR_COMMON_NAME: &str = "haproxy.com";

/// Contact address placed in the CSR subject
pub const CSR_EMAIL_ADDRESS: &str = "test@example.com";

/// OID for the PKCS#9 emailAddress subject attribute
const OID_EMAIL_ADDRESS: [u64; 7] = [1, 2, 840, 113549, 1, 9, 1];

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// CSR generation or encoding failed
    #[error("CSR generation failed: {0}")]
    CsrGenerationFailed(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Node certificate request (key pair and CSR generated locally)
#[derive(Clone)]
pub struct NodeCertRequest {
    /// PKCS#1 private key PEM (kept private)
    key_pem: String,
    /// CSR in PEM format (sent to the cluster)
    csr_pem: String,
}

impl NodeCertRequest {
    /// Generate a fresh RSA key pair and a SHA256-with-RSA signed CSR
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to generate RSA key: {}", e)))?;

        let pkcs8_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to encode key: {}", e)))?;
        let key_pair = KeyPair::from_pem_and_sign_algo(&pkcs8_pem, &PKCS_RSA_SHA256)
            .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to load key: {}", e)))?;

        let key_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to encode key: {}", e)))?
            .to_string();

        let mut params = CertificateParams::default();
        params.distinguished_name = csr_subject()?;

        let csr = params.serialize_request(&key_pair).map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to create CSR: {}", e))
        })?;
        let csr_pem = csr.pem().map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to serialize CSR: {}", e))
        })?;

        Ok(Self { key_pem, csr_pem })
    }

    /// Wrap existing PEM material
    pub fn from_pem(csr_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        Self {
            key_pem: key_pem.into(),
            csr_pem: csr_pem.into(),
        }
    }

    /// Get the CSR in PEM format (to send to the cluster)
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// Get the private key in PEM format (to store locally)
    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }
}

impl std::fmt::Debug for NodeCertRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCertRequest")
            .field("csr_pem", &self.csr_pem)
            .finish_non_exhaustive()
    }
}

/// Fixed subject for enrollment CSRs
fn csr_subject() -> Result<DistinguishedName> {
    let email = Ia5String::try_from(CSR_EMAIL_ADDRESS)
        .map_err(|e| PkiError::CsrGenerationFailed(format!("invalid email address: {}", e)))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(CSR_COMMON_NAME.to_string()));
    dn.push(DnType::CountryName, DnValue::Utf8String("US".to_string()));
    dn.push(DnType::LocalityName, DnValue::Utf8String("Waltham".to_string()));
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String("HAProxy Technologies LLC".to_string()),
    );
    dn.push(
        DnType::OrganizationalUnitName,
        DnValue::Utf8String("IT".to_string()),
    );
    dn.push(
        DnType::CustomDnType(OID_EMAIL_ADDRESS.to_vec()),
        DnValue::Ia5String(email),
    );
    Ok(dn)
}

/// Produces key material for a new enrollment attempt
#[cfg_attr(test, mockall::automock)]
pub trait CsrGenerator: Send + Sync {
    /// Generate a fresh key pair and CSR
    fn generate(&self) -> Result<NodeCertRequest>;
}

/// Generator backed by [`NodeCertRequest::generate`]
#[derive(Clone, Copy, Debug, Default)]
pub struct RsaCsrGenerator;

impl CsrGenerator for RsaCsrGenerator {
    fn generate(&self) -> Result<NodeCertRequest> {
        NodeCertRequest::generate()
    }
}
