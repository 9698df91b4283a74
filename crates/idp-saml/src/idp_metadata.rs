//! IdP metadata generation.

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{NameIdFormat, SamlBinding, SigningContext, MD_NS, SAMLP_NS, XMLDSIG_NS};
use crate::xml::{escape_attr, escape_text};

/// Builds the IdP's signed `md:EntityDescriptor`.
#[derive(Debug, Clone)]
pub struct IdpMetadataBuilder<'a> {
    signing: &'a SigningContext,
    entity_id: String,
    single_sign_on_url: String,
    single_logout_url: Option<String>,
    name_id_formats: Vec<String>,
    want_authn_requests_signed: bool,
    reference_id: String,
}

impl<'a> IdpMetadataBuilder<'a> {
    /// Creates a builder publishing every supported name ID format.
    #[must_use]
    pub fn new(
        signing: &'a SigningContext,
        entity_id: impl Into<String>,
        single_sign_on_url: impl Into<String>,
    ) -> Self {
        Self {
            signing,
            entity_id: entity_id.into(),
            single_sign_on_url: single_sign_on_url.into(),
            single_logout_url: None,
            name_id_formats: NameIdFormat::ALL.iter().map(|f| f.uri().to_string()).collect(),
            want_authn_requests_signed: true,
            reference_id: idp_crypto::generate_reference_id(),
        }
    }

    /// Publishes single logout endpoints.
    #[must_use]
    pub fn single_logout_url(mut self, url: impl Into<String>) -> Self {
        self.single_logout_url = Some(url.into());
        self
    }

    /// Replaces the published name ID formats.
    #[must_use]
    pub fn name_id_formats(mut self, formats: Vec<String>) -> Self {
        self.name_id_formats = formats;
        self
    }

    /// Sets `WantAuthnRequestsSigned`.
    #[must_use]
    pub const fn want_authn_requests_signed(mut self, want: bool) -> Self {
        self.want_authn_requests_signed = want;
        self
    }

    /// Fixes the descriptor `ID` (emitted as `_<id>`).
    #[must_use]
    pub fn reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = id.into();
        self
    }

    /// Returns the unsigned descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingField`] for an empty entity ID or SSO URL.
    pub fn raw(&self) -> SamlResult<String> {
        if self.entity_id.trim().is_empty() {
            return Err(SamlError::MissingField("entity_id"));
        }
        if self.single_sign_on_url.trim().is_empty() {
            return Err(SamlError::MissingField("single_sign_on_url"));
        }

        let certificate = self.signing.certificate().to_base64();
        let mut xml = String::with_capacity(4096);
        xml.push_str(&format!(
            r#"<md:EntityDescriptor xmlns:md="{MD_NS}" ID="_{}" entityID="{}">"#,
            escape_attr(&self.reference_id),
            escape_attr(&self.entity_id)
        ));
        xml.push_str(&format!(
            r#"<md:IDPSSODescriptor WantAuthnRequestsSigned="{}" protocolSupportEnumeration="{SAMLP_NS}">"#,
            self.want_authn_requests_signed
        ));
        for usage in ["signing", "encryption"] {
            xml.push_str(&format!(
                concat!(
                    r#"<md:KeyDescriptor use="{usage}">"#,
                    r#"<ds:KeyInfo xmlns:ds="{ds}"><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>"#,
                    "</md:KeyDescriptor>"
                ),
                usage = usage,
                ds = XMLDSIG_NS,
                cert = certificate,
            ));
        }
        if let Some(slo) = &self.single_logout_url {
            push_services(&mut xml, "SingleLogoutService", slo);
        }
        for format in &self.name_id_formats {
            xml.push_str(&format!("<md:NameIDFormat>{}</md:NameIDFormat>", escape_text(format)));
        }
        push_services(&mut xml, "SingleSignOnService", &self.single_sign_on_url);
        xml.push_str("</md:IDPSSODescriptor></md:EntityDescriptor>");
        Ok(xml)
    }

    /// Returns the descriptor signed with the IdP key.
    ///
    /// # Errors
    ///
    /// See [`raw`](Self::raw); signing errors are returned as is.
    pub fn signed(&self) -> SamlResult<String> {
        XmlSigner::new(self.signing.clone()).sign(&self.raw()?, &self.reference_id)
    }
}

fn push_services(xml: &mut String, element: &str, location: &str) {
    for binding in [SamlBinding::HttpPost, SamlBinding::HttpRedirect] {
        xml.push_str(&format!(
            r#"<md:{element} Binding="{}" Location="{}"></md:{element}>"#,
            binding.uri(),
            escape_attr(location)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idp_crypto::{Certificate, DigestAlgorithm};

    use crate::signature::XmlSignatureValidator;
    use crate::xml::Document;

    const IDP_KEY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/idp.key"));
    const IDP_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/idp.crt"));

    fn signing() -> SigningContext {
        SigningContext::from_pem(DigestAlgorithm::Sha256, IDP_KEY, IDP_CERT).unwrap()
    }

    #[test]
    fn descriptor_lists_endpoints_in_schema_order() {
        let ctx = signing();
        let xml = IdpMetadataBuilder::new(&ctx, "http://example.com", "http://example.com/sso")
            .single_logout_url("http://example.com/slo")
            .raw()
            .unwrap();
        let doc = Document::parse(&xml).unwrap();
        let idp = doc.root.child(MD_NS, "IDPSSODescriptor").unwrap();
        let order: Vec<_> = idp.elements().map(|e| e.local_name.as_str()).collect();
        assert_eq!(
            order,
            [
                "KeyDescriptor",
                "KeyDescriptor",
                "SingleLogoutService",
                "SingleLogoutService",
                "NameIDFormat",
                "NameIDFormat",
                "NameIDFormat",
                "NameIDFormat",
                "SingleSignOnService",
                "SingleSignOnService",
            ]
        );
        assert_eq!(idp.attribute("WantAuthnRequestsSigned"), Some("true"));
    }

    #[test]
    fn signed_descriptor_verifies() {
        let ctx = signing();
        let xml = IdpMetadataBuilder::new(&ctx, "http://example.com", "http://example.com/sso")
            .reference_id("idp-meta")
            .signed()
            .unwrap();
        assert!(xml.contains(r#"ID="_idp-meta""#));
        let validator = XmlSignatureValidator::new(vec![Certificate::from_pem(IDP_CERT).unwrap()]);
        validator.validate(&xml).unwrap();
    }

    #[test]
    fn empty_entity_id_fails() {
        let ctx = signing();
        assert!(matches!(
            IdpMetadataBuilder::new(&ctx, "", "http://example.com/sso").raw(),
            Err(SamlError::MissingField("entity_id"))
        ));
    }
}
