//! `ds:SignedInfo` construction.

use base64::Engine;
use idp_crypto::{DigestAlgorithm, SignatureProvider};

use crate::error::{SamlError, SamlResult};
use crate::types::{transform_algorithms, XMLDSIG_NS};
use crate::xml::{canonicalize, escape_attr, Document};

/// Builds the `SignedInfo` for one enveloped reference.
///
/// The reference always carries two transforms in this order: the
/// enveloped-signature transform, then exclusive canonicalization. The digest
/// must have been computed over exactly that pipeline.
#[derive(Debug, Clone)]
pub struct SignedInfoBuilder {
    reference_id: String,
    digest_value: Vec<u8>,
    algorithm: DigestAlgorithm,
}

impl SignedInfoBuilder {
    /// Creates a builder.
    ///
    /// `reference_id` is emitted as `URI="#_<reference_id>"`.
    #[must_use]
    pub fn new(reference_id: impl Into<String>, digest_value: Vec<u8>, algorithm: DigestAlgorithm) -> Self {
        Self {
            reference_id: reference_id.into(),
            digest_value,
            algorithm,
        }
    }

    /// Returns the reference URI.
    #[must_use]
    pub fn reference_uri(&self) -> String {
        format!("#_{}", self.reference_id)
    }

    /// Returns the base64 digest value.
    #[must_use]
    pub fn digest_value(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.digest_value)
    }

    /// Returns the `SignedInfo` element.
    #[must_use]
    pub fn raw(&self) -> String {
        format!(
            concat!(
                r#"<ds:SignedInfo xmlns:ds="{ds}">"#,
                r#"<ds:CanonicalizationMethod Algorithm="{c14n}"></ds:CanonicalizationMethod>"#,
                r#"<ds:SignatureMethod Algorithm="{sig}"></ds:SignatureMethod>"#,
                r#"<ds:Reference URI="{uri}">"#,
                r#"<ds:Transforms>"#,
                r#"<ds:Transform Algorithm="{enveloped}"></ds:Transform>"#,
                r#"<ds:Transform Algorithm="{c14n}"></ds:Transform>"#,
                r#"</ds:Transforms>"#,
                r#"<ds:DigestMethod Algorithm="{digest}"></ds:DigestMethod>"#,
                r#"<ds:DigestValue>{digest_value}</ds:DigestValue>"#,
                r#"</ds:Reference>"#,
                r#"</ds:SignedInfo>"#,
            ),
            ds = XMLDSIG_NS,
            c14n = transform_algorithms::EXCLUSIVE_C14N,
            sig = self.algorithm.signature_uri(),
            uri = escape_attr(&self.reference_uri()),
            enveloped = transform_algorithms::ENVELOPED_SIGNATURE,
            digest = self.algorithm.digest_uri(),
            digest_value = self.digest_value(),
        )
    }

    /// Returns the canonical form that gets signed.
    ///
    /// # Errors
    ///
    /// Returns an error if the generated XML fails to parse.
    pub fn canonical(&self) -> SamlResult<String> {
        let doc = Document::parse(&self.raw())?;
        Ok(canonicalize(&doc.root, None, &[]))
    }

    /// Signs the canonical `SignedInfo` and returns the base64 `SignatureValue`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if the signer uses a different
    /// algorithm than the one declared, or if the RSA operation fails.
    pub fn signed(&self, signer: &dyn SignatureProvider) -> SamlResult<String> {
        if signer.algorithm() != self.algorithm {
            return Err(SamlError::SignatureCreation(format!(
                "signer uses {} but SignedInfo declares {}",
                signer.algorithm(),
                self.algorithm
            )));
        }
        let canonical = self.canonical()?;
        let signature = signer.sign(canonical.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }
}
