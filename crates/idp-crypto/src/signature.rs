//! RSA PKCS#1 v1.5 signatures.

use rsa::pkcs1v15;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

use crate::algorithm::DigestAlgorithm;
use crate::keys::SigningKey;

/// Error type for signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signature bytes are not a well formed RSA signature.
    #[error("malformed signature: {0}")]
    Malformed(String),
}

/// Trait for signature providers.
pub trait SignatureProvider: Send + Sync {
    /// Signs the given data.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Verifies a signature made by this provider's key.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature bytes are malformed.
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, SignatureError>;

    /// Returns the hash algorithm the provider signs with.
    fn algorithm(&self) -> DigestAlgorithm;
}

/// RSA PKCS#1 v1.5 signer.
#[derive(Debug, Clone)]
pub struct RsaSigner {
    key: SigningKey,
    algorithm: DigestAlgorithm,
}

impl RsaSigner {
    /// Creates a signer for the given key and hash.
    #[must_use]
    pub const fn new(key: SigningKey, algorithm: DigestAlgorithm) -> Self {
        Self { key, algorithm }
    }
}

impl SignatureProvider for RsaSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        sign_rsa(self.key.rsa(), self.algorithm, data)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, SignatureError> {
        verify_rsa(&self.key.public_key(), self.algorithm, data, signature)
    }

    fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

/// Signs `data` with RSA PKCS#1 v1.5 using the given hash.
///
/// # Errors
///
/// Returns [`SignatureError::Signing`] if the RSA operation fails.
pub fn sign_rsa(
    key: &RsaPrivateKey,
    algorithm: DigestAlgorithm,
    data: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    macro_rules! sign_with {
        ($hasher:ty) => {{
            let signer = pkcs1v15::SigningKey::<$hasher>::new(key.clone());
            signer
                .try_sign(data)
                .map(|sig| sig.to_vec())
                .map_err(|e| SignatureError::Signing(e.to_string()))
        }};
    }

    match algorithm {
        DigestAlgorithm::Sha1 => sign_with!(Sha1),
        DigestAlgorithm::Sha256 => sign_with!(Sha256),
        DigestAlgorithm::Sha384 => sign_with!(Sha384),
        DigestAlgorithm::Sha512 => sign_with!(Sha512),
    }
}

/// Verifies an RSA PKCS#1 v1.5 signature.
///
/// Returns `Ok(false)` for a well formed signature that does not verify.
///
/// # Errors
///
/// Returns [`SignatureError::Malformed`] if the signature cannot be decoded.
pub fn verify_rsa(
    key: &RsaPublicKey,
    algorithm: DigestAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    let sig = pkcs1v15::Signature::try_from(signature)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;

    macro_rules! verify_with {
        ($hasher:ty) => {{
            let verifier = pkcs1v15::VerifyingKey::<$hasher>::new(key.clone());
            Ok(verifier.verify(data, &sig).is_ok())
        }};
    }

    match algorithm {
        DigestAlgorithm::Sha1 => verify_with!(Sha1),
        DigestAlgorithm::Sha256 => verify_with!(Sha256),
        DigestAlgorithm::Sha384 => verify_with!(Sha384),
        DigestAlgorithm::Sha512 => verify_with!(Sha512),
    }
}
