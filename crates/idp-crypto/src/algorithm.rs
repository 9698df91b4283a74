//! Digest and signature algorithm definitions.
//!
//! Every algorithm the identity provider can sign with is a member of
//! [`DigestAlgorithm`]. Each member maps to the pair of URIs that appear in
//! an XML-DSig `SignedInfo`: the `DigestMethod` URI and the RSA
//! `SignatureMethod` URI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for algorithm lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlgorithmError {
    /// The name or URI does not identify a supported algorithm.
    #[error("unsupported algorithm: {0}")]
    Unsupported(String),
}

/// XML-DSig digest method URIs.
pub mod digest_uris {
    /// SHA-1 digest.
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    /// SHA-256 digest.
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    /// SHA-384 digest.
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    /// SHA-512 digest.
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";
}

/// XML-DSig RSA signature method URIs.
pub mod signature_uris {
    /// RSA PKCS#1 v1.5 with SHA-1.
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    /// RSA PKCS#1 v1.5 with SHA-256.
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    /// RSA PKCS#1 v1.5 with SHA-384.
    pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
    /// RSA PKCS#1 v1.5 with SHA-512.
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
}

/// Hash algorithm used for both the reference digest and the RSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1. Kept for relying parties that cannot verify anything newer.
    Sha1,
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// All supported algorithms, weakest first.
    pub const ALL: [Self; 4] = [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512];

    /// Returns the short symbolic name (`sha256`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Returns the `DigestMethod` URI.
    #[must_use]
    pub const fn digest_uri(self) -> &'static str {
        match self {
            Self::Sha1 => digest_uris::SHA1,
            Self::Sha256 => digest_uris::SHA256,
            Self::Sha384 => digest_uris::SHA384,
            Self::Sha512 => digest_uris::SHA512,
        }
    }

    /// Returns the RSA `SignatureMethod` URI.
    #[must_use]
    pub const fn signature_uri(self) -> &'static str {
        match self {
            Self::Sha1 => signature_uris::RSA_SHA1,
            Self::Sha256 => signature_uris::RSA_SHA256,
            Self::Sha384 => signature_uris::RSA_SHA384,
            Self::Sha512 => signature_uris::RSA_SHA512,
        }
    }

    /// Returns the digest output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Parses a `DigestMethod` URI.
    #[must_use]
    pub fn from_digest_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.digest_uri() == uri)
    }

    /// Parses a `SignatureMethod` URI.
    #[must_use]
    pub fn from_signature_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.signature_uri() == uri)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(AlgorithmError::Unsupported(s.to_string())),
        }
    }
}
