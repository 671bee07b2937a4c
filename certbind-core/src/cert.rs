//! Client certificates and their hash fingerprints.
//!
//! # Security
//!
//! - Input is limited to 16KB to prevent DoS
//! - The x509_parser library handles ASN.1 parsing safely
//! - Certificates are only ever compared by [`CertHash`], never byte-for-byte

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::prelude::*;

/// Maximum certificate size (16KB is generous for a single cert)
pub const MAX_CERT_SIZE: usize = 16 * 1024;

/// Length of a hex-encoded SHA-256 digest.
pub const CERT_HASH_LEN: usize = 64;

/// Errors that can occur during certificate parsing.
#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate too large: {0} bytes (max {MAX_CERT_SIZE})")]
    TooLarge(usize),

    #[error("failed to parse X.509 certificate: {0}")]
    ParseError(String),

    #[error("failed to parse PEM: {0}")]
    Pem(String),

    #[error("invalid certificate hash: {0:?}")]
    InvalidHash(String),
}

/// A verified X.509 leaf certificate as attached by the TLS terminator.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wrap DER bytes after checking they parse as a single X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns `CertError::TooLarge` if certificate exceeds 16KB.
    /// Returns `CertError::ParseError` if the certificate is malformed.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, CertError> {
        let der = der.into();
        if der.len() > MAX_CERT_SIZE {
            return Err(CertError::TooLarge(der.len()));
        }

        X509Certificate::from_der(&der).map_err(|e| CertError::ParseError(format!("{:?}", e)))?;

        Ok(Self { der })
    }

    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertError> {
        if pem.len() > MAX_CERT_SIZE * 2 {
            return Err(CertError::TooLarge(pem.len()));
        }
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
            .map_err(|e| CertError::Pem(format!("{:?}", e)))?;
        if pem.label != "CERTIFICATE" {
            return Err(CertError::Pem(format!("unexpected PEM label {}", pem.label)));
        }
        Self::from_der(pem.contents)
    }

    /// Accept either PEM or DER, sniffing the PEM armor.
    pub fn from_pem_or_der(bytes: &[u8]) -> Result<Self, CertError> {
        if bytes.trim_ascii_start().starts_with(b"-----BEGIN") {
            Self::from_pem(bytes)
        } else {
            Self::from_der(bytes.to_vec())
        }
    }

    /// Raw DER encoding.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn hash(&self) -> CertHash {
        CertHash::of(self)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("hash", &self.hash())
            .finish()
    }
}

/// Lowercase hex SHA-256 of a certificate's DER bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertHash(String);

impl CertHash {
    pub fn of(cert: &Certificate) -> Self {
        Self(hex::encode(Sha256::digest(cert.as_der())))
    }

    /// Parse a user supplied hash. Surrounding whitespace and case are ignored.
    pub fn parse(s: &str) -> Result<Self, CertError> {
        let s = s.trim();
        if s.len() != CERT_HASH_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CertError::InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
