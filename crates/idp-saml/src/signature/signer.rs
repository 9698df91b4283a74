//! Enveloped XML Signature creation.

use base64::Engine;
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::{SigningContext, SAML_NS, XMLDSIG_NS};
use crate::xml::{canonicalize, Document, Element};

use super::SignedInfoBuilder;

/// Signs SAML documents with the IdP key.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    context: SigningContext,
}

impl XmlSigner {
    /// Creates a signer.
    #[must_use]
    pub const fn new(context: SigningContext) -> Self {
        Self { context }
    }

    /// Returns the signing context.
    #[must_use]
    pub const fn context(&self) -> &SigningContext {
        &self.context
    }

    /// Signs the element whose `ID` is `_<reference_id>`.
    ///
    /// The `ds:Signature` is inserted right after the element's
    /// `saml:Issuer` child, or as its first child when there is no issuer.
    /// The rest of the document is returned byte for byte.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] if no element carries the ID,
    /// [`SamlError::SignatureCreation`] if it is already signed or is an
    /// empty-element tag with no room for a child, and parse or RSA errors
    /// otherwise.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let doc = Document::parse(xml)?;
        let xml_id = format!("_{reference_id}");
        let element = doc
            .root
            .find_by_id(&xml_id)
            .ok_or_else(|| SamlError::MissingElement(format!("element with ID {xml_id}")))?;
        if element.child(XMLDSIG_NS, "Signature").is_some() {
            return Err(SamlError::SignatureCreation(format!(
                "element {xml_id} is already signed"
            )));
        }
        if element.span().end == element.start_tag_end() {
            return Err(SamlError::SignatureCreation(format!(
                "element {xml_id} is self-closing"
            )));
        }

        let algorithm = self.context.algorithm;
        let canonical = canonicalize(element, None, &[]);
        let digest = idp_crypto::digest(algorithm, canonical.as_bytes());

        let signed_info = SignedInfoBuilder::new(reference_id, digest, algorithm);
        let signature_value = signed_info.signed(&self.context.signer())?;
        let signature = build_signature_element(
            &signed_info.raw(),
            &signature_value,
            &self.context.certificate().to_base64(),
        );

        let position = insert_position(element);
        debug!(
            element = %element.qualified_name(),
            reference = %signed_info.reference_uri(),
            algorithm = %algorithm,
            "signed element"
        );

        let mut signed = String::with_capacity(xml.len() + signature.len());
        signed.push_str(&xml[..position]);
        signed.push_str(&signature);
        signed.push_str(&xml[position..]);
        Ok(signed)
    }

    /// Signs `data` with the configured key and returns base64.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if the RSA operation fails.
    pub fn sign_bytes(&self, data: &[u8]) -> SamlResult<String> {
        use idp_crypto::SignatureProvider;
        let signature = self.context.signer().sign(data)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }
}

fn insert_position(element: &Element) -> usize {
    element
        .child(SAML_NS, "Issuer")
        .map_or_else(|| element.start_tag_end(), |issuer| issuer.span().end)
}

fn build_signature_element(signed_info: &str, signature_value: &str, certificate: &str) -> String {
    format!(
        concat!(
            r#"<ds:Signature xmlns:ds="{ds}">"#,
            "{signed_info}",
            "<ds:SignatureValue>{signature_value}</ds:SignatureValue>",
            "<ds:KeyInfo><ds:X509Data>",
            "<ds:X509Certificate>{certificate}</ds:X509Certificate>",
            "</ds:X509Data></ds:KeyInfo>",
            "</ds:Signature>",
        ),
        ds = XMLDSIG_NS,
        signed_info = signed_info,
        signature_value = signature_value,
        certificate = certificate,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use idp_crypto::DigestAlgorithm;

    const IDP_KEY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/idp.key"));
    const IDP_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/idp.crt"));

    fn signer() -> XmlSigner {
        XmlSigner::new(SigningContext::from_pem(DigestAlgorithm::Sha256, IDP_KEY, IDP_CERT).unwrap())
    }

    const DOC: &str = concat!(
        r#"<Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion" ID="_abc">"#,
        "<Issuer>http://example.com</Issuer>",
        "<Subject></Subject>",
        "</Assertion>"
    );

    #[test]
    fn signature_follows_issuer() {
        let signed = signer().sign(DOC, "abc").unwrap();
        let issuer_end = signed.find("</Issuer>").unwrap();
        let sig = signed.find("<ds:Signature").unwrap();
        let subject = signed.find("<Subject>").unwrap();
        assert_eq!(sig, issuer_end + "</Issuer>".len());
        assert!(sig < subject);
    }

    #[test]
    fn embeds_certificate_and_reference() {
        let signed = signer().sign(DOC, "abc").unwrap();
        assert!(signed.contains(r##"URI="#_abc""##));
        let cert = signer().context().certificate().to_base64();
        assert!(signed.contains(&cert));
    }

    #[test]
    fn without_issuer_signature_is_first_child() {
        let xml = r#"<Root ID="_r"><Child/></Root>"#;
        let signed = signer().sign(xml, "r").unwrap();
        assert!(signed.starts_with(r#"<Root ID="_r"><ds:Signature"#));
    }

    #[test]
    fn unknown_reference_fails() {
        assert!(matches!(
            signer().sign(DOC, "nope"),
            Err(SamlError::MissingElement(_))
        ));
    }

    #[test]
    fn self_closing_target_is_rejected() {
        let xml = r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r"/>"#;
        assert!(matches!(
            signer().sign(xml, "r"),
            Err(SamlError::SignatureCreation(_))
        ));
    }

    #[test]
    fn refuses_to_sign_twice() {
        let signed = signer().sign(DOC, "abc").unwrap();
        assert!(matches!(
            signer().sign(&signed, "abc"),
            Err(SamlError::SignatureCreation(_))
        ));
    }
}
