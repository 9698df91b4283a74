//! XML Signature support for SAML.
//!
//! Every signature produced here is an enveloped signature over a single
//! element, referenced by `ID`, with exclusive canonicalization and an RSA
//! PKCS#1 v1.5 signature method from the
//! [`DigestAlgorithm`](idp_crypto::DigestAlgorithm) registry.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//! - RSA-SHA1, for relying parties that still require it

mod signed_info;
mod signer;
mod validator;

pub use signed_info::SignedInfoBuilder;
pub use signer::XmlSigner;
pub use validator::{extract_signature, is_signed, verify_element, XmlSignatureValidator};

use idp_crypto::DigestAlgorithm;

/// A parsed `<ds:Signature>` element.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// Hash used by the signature method.
    pub algorithm: DigestAlgorithm,
    /// Hash used by the reference digest.
    pub digest_algorithm: DigestAlgorithm,
    /// The reference URI, `#` followed by the signed element's ID.
    pub reference_uri: String,
    /// Decoded digest value.
    pub digest_value: Vec<u8>,
    /// Decoded signature value.
    pub signature_value: Vec<u8>,
    /// Embedded X.509 certificate (base64 DER), if any.
    pub x509_certificate: Option<String>,
    /// Prefixes from `ec:InclusiveNamespaces` on the reference transform.
    pub inclusive_prefixes: Vec<String>,
    /// Canonical `SignedInfo`, the exact bytes the signature covers.
    pub canonical_signed_info: String,
}

impl XmlSignature {
    /// Returns the referenced ID without the leading `#`.
    #[must_use]
    pub fn reference_id(&self) -> &str {
        self.reference_uri.trim_start_matches('#')
    }
}
