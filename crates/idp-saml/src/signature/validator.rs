//! XML Signature validation.
//!
//! Only the shape this crate produces is accepted: a `ds:Signature` that is
//! a direct child of the signed element, with exactly one reference to that
//! element's `ID` and the enveloped + exclusive C14N transform pair.

use base64::Engine;
use idp_crypto::{verify_rsa, Certificate, DigestAlgorithm};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::{transform_algorithms, XMLDSIG_NS};
use crate::xml::{canonicalize, Document, Element};

use super::XmlSignature;

const EXC_C14N_NS: &str = transform_algorithms::EXCLUSIVE_C14N;

/// Validates enveloped signatures against a set of trusted certificates.
#[derive(Debug, Clone, Default)]
pub struct XmlSignatureValidator {
    trusted_certificates: Vec<Certificate>,
}

impl XmlSignatureValidator {
    /// Creates a validator that trusts the given certificates.
    #[must_use]
    pub fn new(trusted_certificates: Vec<Certificate>) -> Self {
        Self {
            trusted_certificates,
        }
    }

    /// Returns the trusted certificates.
    #[must_use]
    pub fn trusted_certificates(&self) -> &[Certificate] {
        &self.trusted_certificates
    }

    /// Validates the signature on the document element.
    ///
    /// Returns the trusted certificate that verified it.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the document is unsigned,
    /// the digest does not match, or no trusted certificate verifies it.
    pub fn validate(&self, xml: &str) -> SamlResult<Certificate> {
        let doc = Document::parse(xml)?;
        self.validate_element(&doc.root).cloned()
    }

    /// Validates the signature enveloped in `element`.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn validate_element(&self, element: &Element) -> SamlResult<&Certificate> {
        let signature = extract_signature(element)?;
        verify_digest(element, &signature)?;

        for cert in &self.trusted_certificates {
            if verify_rsa(
                cert.public_key(),
                signature.algorithm,
                signature.canonical_signed_info.as_bytes(),
                &signature.signature_value,
            )? {
                debug!(
                    reference = %signature.reference_uri,
                    fingerprint = %cert.fingerprint(DigestAlgorithm::Sha256),
                    "signature verified"
                );
                return Ok(cert);
            }
        }

        Err(SamlError::SignatureInvalid(
            "no trusted certificate verifies the signature".to_string(),
        ))
    }
}

/// Verifies the signature enveloped in `element` with one certificate.
///
/// # Errors
///
/// Returns [`SamlError::SignatureInvalid`] on any mismatch.
pub fn verify_element(element: &Element, cert: &Certificate) -> SamlResult<XmlSignature> {
    let signature = extract_signature(element)?;
    verify_digest(element, &signature)?;
    let valid = verify_rsa(
        cert.public_key(),
        signature.algorithm,
        signature.canonical_signed_info.as_bytes(),
        &signature.signature_value,
    )?;
    if valid {
        Ok(signature)
    } else {
        Err(SamlError::SignatureInvalid(
            "signature value does not verify".to_string(),
        ))
    }
}

/// Returns true if `element` has an enveloped `ds:Signature` child.
#[must_use]
pub fn is_signed(element: &Element) -> bool {
    element.child(XMLDSIG_NS, "Signature").is_some()
}

/// Parses and structurally checks the signature enveloped in `element`.
///
/// # Errors
///
/// Returns [`SamlError::SignatureInvalid`] for an unexpected structure,
/// [`SamlError::UnsupportedAlgorithm`] for an unknown method URI, and
/// [`SamlError::Base64Decode`] for undecodable values.
pub fn extract_signature(element: &Element) -> SamlResult<XmlSignature> {
    let signature = element
        .child(XMLDSIG_NS, "Signature")
        .ok_or_else(|| SamlError::SignatureInvalid("element is not signed".to_string()))?;
    let signed_info = required_child(signature, "SignedInfo")?;

    let c14n = required_child(signed_info, "CanonicalizationMethod")?;
    if c14n.attribute("Algorithm") != Some(transform_algorithms::EXCLUSIVE_C14N) {
        return Err(SamlError::SignatureInvalid(format!(
            "unsupported canonicalization method {:?}",
            c14n.attribute("Algorithm")
        )));
    }
    let signed_info_prefixes = inclusive_prefixes(c14n);

    let method_uri = required_child(signed_info, "SignatureMethod")?
        .attribute("Algorithm")
        .unwrap_or_default();
    let algorithm = DigestAlgorithm::from_signature_uri(method_uri)
        .ok_or_else(|| SamlError::UnsupportedAlgorithm(method_uri.to_string()))?;

    let references: Vec<&Element> = signed_info.children_named(XMLDSIG_NS, "Reference").collect();
    let [reference] = references.as_slice() else {
        return Err(SamlError::SignatureInvalid(format!(
            "expected exactly one reference, found {}",
            references.len()
        )));
    };

    let reference_uri = reference.attribute("URI").unwrap_or_default().to_string();
    let element_id = element
        .attribute("ID")
        .or_else(|| element.attribute("Id"))
        .ok_or_else(|| SamlError::SignatureInvalid("signed element has no ID".to_string()))?;
    if reference_uri != format!("#{element_id}") {
        return Err(SamlError::SignatureInvalid(format!(
            "reference {reference_uri} does not point at {element_id}"
        )));
    }

    let transforms: Vec<&Element> = required_child(reference, "Transforms")?
        .children_named(XMLDSIG_NS, "Transform")
        .collect();
    let transform_uris: Vec<&str> = transforms
        .iter()
        .map(|t| t.attribute("Algorithm").unwrap_or_default())
        .collect();
    if transform_uris
        != [
            transform_algorithms::ENVELOPED_SIGNATURE,
            transform_algorithms::EXCLUSIVE_C14N,
        ]
    {
        return Err(SamlError::SignatureInvalid(format!(
            "unexpected transforms {transform_uris:?}"
        )));
    }
    let reference_prefixes = inclusive_prefixes(transforms[1]);

    let digest_uri = required_child(reference, "DigestMethod")?
        .attribute("Algorithm")
        .unwrap_or_default();
    let digest_algorithm = DigestAlgorithm::from_digest_uri(digest_uri)
        .ok_or_else(|| SamlError::UnsupportedAlgorithm(digest_uri.to_string()))?;

    let digest_value = decode(&required_child(reference, "DigestValue")?.text())?;
    let signature_value = decode(&required_child(signature, "SignatureValue")?.text())?;

    let x509_certificate = signature
        .child(XMLDSIG_NS, "KeyInfo")
        .and_then(|k| k.child(XMLDSIG_NS, "X509Data"))
        .and_then(|d| d.child(XMLDSIG_NS, "X509Certificate"))
        .map(|c| c.text().split_whitespace().collect::<String>());

    Ok(XmlSignature {
        algorithm,
        digest_algorithm,
        reference_uri,
        digest_value,
        signature_value,
        x509_certificate,
        inclusive_prefixes: reference_prefixes,
        canonical_signed_info: canonicalize(signed_info, None, &signed_info_prefixes),
    })
}

fn verify_digest(element: &Element, signature: &XmlSignature) -> SamlResult<()> {
    let signature_element = element.child(XMLDSIG_NS, "Signature");
    let canonical = canonicalize(element, signature_element, &signature.inclusive_prefixes);
    let computed = idp_crypto::digest(signature.digest_algorithm, canonical.as_bytes());
    if computed == signature.digest_value {
        Ok(())
    } else {
        Err(SamlError::SignatureInvalid(format!(
            "digest mismatch for {}",
            signature.reference_uri
        )))
    }
}

fn required_child<'a>(parent: &'a Element, local_name: &str) -> SamlResult<&'a Element> {
    parent.child(XMLDSIG_NS, local_name).ok_or_else(|| {
        SamlError::SignatureInvalid(format!(
            "{} has no ds:{local_name}",
            parent.qualified_name()
        ))
    })
}

fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|n| n.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn decode(text: &str) -> SamlResult<Vec<u8>> {
    let compact: String = text.split_whitespace().collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}
