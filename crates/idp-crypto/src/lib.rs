//! # idp-crypto
//!
//! Cryptographic primitives for the SAML identity provider.
//!
//! - [`algorithm`]: digest and RSA signature method registry
//! - [`hash`]: digests and certificate fingerprints
//! - [`keys`]: RSA private keys and X.509 certificates
//! - [`signature`]: RSA PKCS#1 v1.5 signing and verification
//! - [`cipher`]: XML-Encryption block ciphers and RSA-OAEP key transport
//! - [`random`]: session keys, IVs and document identifiers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod cipher;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use algorithm::{AlgorithmError, DigestAlgorithm};
pub use cipher::{BlockEncryption, CipherError, KeyTransport};
pub use hash::{digest, fingerprint};
pub use keys::{Certificate, KeyError, SigningKey};
pub use random::{generate_reference_id, random_bytes};
pub use signature::{sign_rsa, verify_rsa, RsaSigner, SignatureError, SignatureProvider};
