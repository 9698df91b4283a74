//! Assertion construction.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{
    format_instant, AssertedAttribute, Principal, ResponseContext, SigningContext,
    BEARER_CONFIRMATION, CLOCK_SKEW_SECS, SAML_NS, SAML_VERSION, SUBJECT_CONFIRMATION_SECS,
};
use crate::xml::{escape_attr, escape_text};

use super::encryption::encrypt_assertion;

/// Builds the `<Assertion>` for one principal.
///
/// The assertion `ID` is always `_<reference_id>` so that it matches the
/// signature reference.
#[derive(Debug, Clone, Copy)]
pub struct AssertionBuilder<'a> {
    context: &'a ResponseContext,
    principal: &'a Principal,
}

impl<'a> AssertionBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub const fn new(context: &'a ResponseContext, principal: &'a Principal) -> Self {
        Self { context, principal }
    }

    /// Returns the unsigned assertion.
    #[must_use]
    pub fn raw(&self) -> String {
        let ctx = self.context;
        let now = ctx.issue_instant;
        let issue_instant = format_instant(now);
        let not_before = format_instant(shifted(now, -Duration::seconds(CLOCK_SKEW_SECS)));
        let not_on_or_after = format_instant(shifted(now, ctx.expiry));
        let confirmation_expiry =
            format_instant(shifted(now, Duration::seconds(SUBJECT_CONFIRMATION_SECS)));
        let assertion_id = escape_attr(&ctx.assertion_id());

        let mut xml = String::with_capacity(2048);
        xml.push_str(&format!(
            r#"<Assertion xmlns="{SAML_NS}" ID="{assertion_id}" IssueInstant="{issue_instant}" Version="{SAML_VERSION}">"#
        ));
        xml.push_str(&format!("<Issuer>{}</Issuer>", escape_text(&ctx.issuer_uri)));

        xml.push_str("<Subject>");
        xml.push_str(&format!(
            r#"<NameID Format="{}">{}</NameID>"#,
            escape_attr(&self.principal.name_id_format),
            escape_text(&self.principal.name_id)
        ));
        xml.push_str(&format!(r#"<SubjectConfirmation Method="{BEARER_CONFIRMATION}">"#));
        xml.push_str("<SubjectConfirmationData");
        if let Some(request_id) = &ctx.saml_request_id {
            xml.push_str(&format!(r#" InResponseTo="{}""#, escape_attr(request_id)));
        }
        xml.push_str(&format!(
            r#" NotOnOrAfter="{confirmation_expiry}" Recipient="{}"></SubjectConfirmationData>"#,
            escape_attr(&ctx.saml_acs_url)
        ));
        xml.push_str("</SubjectConfirmation></Subject>");

        xml.push_str(&format!(
            r#"<Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">"#
        ));
        xml.push_str(&format!(
            "<AudienceRestriction><Audience>{}</Audience></AudienceRestriction>",
            escape_text(&ctx.audience_uri)
        ));
        xml.push_str("</Conditions>");

        if !self.principal.attributes.is_empty() {
            xml.push_str("<AttributeStatement>");
            for attribute in &self.principal.attributes {
                push_attribute(&mut xml, attribute);
            }
            xml.push_str("</AttributeStatement>");
        }

        xml.push_str(&format!(
            r#"<AuthnStatement AuthnInstant="{issue_instant}" SessionIndex="{assertion_id}">"#
        ));
        xml.push_str(&format!(
            "<AuthnContext><AuthnContextClassRef>{}</AuthnContextClassRef></AuthnContext>",
            escape_text(&ctx.authn_context_classref)
        ));
        xml.push_str("</AuthnStatement>");
        xml.push_str("</Assertion>");
        xml
    }

    /// Returns the assertion with an enveloped signature.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if signing fails.
    pub fn signed(&self, signing: &SigningContext) -> SamlResult<String> {
        XmlSigner::new(signing.clone()).sign(&self.raw(), &self.context.reference_id)
    }

    /// Returns the assertion wrapped in `<EncryptedAssertion>`.
    ///
    /// With `sign` the assertion is signed before it is encrypted.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingField`] when the context has no encryption
    /// options, and signing or encryption errors otherwise.
    pub fn encrypt(&self, signing: &SigningContext, sign: bool) -> SamlResult<String> {
        let opts = self
            .context
            .encryption_opts
            .as_ref()
            .ok_or(SamlError::MissingField("encryption_opts"))?;
        let plaintext = if sign { self.signed(signing)? } else { self.raw() };
        debug!(
            assertion = %self.context.assertion_id(),
            block_encryption = %opts.block_encryption,
            "encrypting assertion"
        );
        encrypt_assertion(&plaintext, opts)
    }

    /// Returns the assertion as it goes into the response: encrypted when the
    /// context carries encryption options, otherwise signed.
    ///
    /// # Errors
    ///
    /// See [`signed`](Self::signed) and [`encrypt`](Self::encrypt).
    pub fn build(&self, signing: &SigningContext) -> SamlResult<String> {
        if self.context.encryption_opts.is_some() {
            self.encrypt(signing, true)
        } else {
            self.signed(signing)
        }
    }
}

/// Offsets an instant, saturating at the ends of the calendar.
fn shifted(instant: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    instant.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

fn push_attribute(xml: &mut String, attribute: &AssertedAttribute) {
    xml.push_str(&format!(
        r#"<Attribute FriendlyName="{}" Name="{}" NameFormat="{}">"#,
        escape_attr(&attribute.friendly_name),
        escape_attr(attribute.effective_name()),
        escape_attr(attribute.effective_name_format())
    ));
    for value in &attribute.values {
        xml.push_str(&format!("<AttributeValue>{}</AttributeValue>", escape_text(value)));
    }
    xml.push_str("</Attribute>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use idp_crypto::{Certificate, DigestAlgorithm};

    use crate::signature::{extract_signature, verify_element};
    use crate::types::EncryptionOptions;
    use crate::xml::Document;

    const IDP_KEY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/idp.key"));
    const IDP_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/idp.crt"));
    const SP_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/sp.crt"));

    fn context() -> ResponseContext {
        ResponseContext::builder()
            .reference_id("abc")
            .response_id("def")
            .issuer_uri("http://example.com")
            .audience_uri("http://sp.example.com")
            .saml_acs_url("http://sportngin.com")
            .saml_request_id("134")
            .issue_instant(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
            .build()
            .unwrap()
    }

    fn principal() -> Principal {
        Principal::new("foo@example.com")
            .with_attribute(AssertedAttribute::new("email", "foo@example.com"))
            .with_attribute(AssertedAttribute::multi("groups", ["admins", "a&b"]))
    }

    fn signing() -> SigningContext {
        SigningContext::from_pem(DigestAlgorithm::Sha256, IDP_KEY, IDP_CERT).unwrap()
    }

    #[test]
    fn raw_assertion_has_expected_shape() {
        let ctx = context();
        let p = principal();
        let xml = AssertionBuilder::new(&ctx, &p).raw();
        let doc = Document::parse(&xml).unwrap();
        let root = &doc.root;
        assert!(root.is(SAML_NS, "Assertion"));
        assert_eq!(root.attribute("ID"), Some("_abc"));
        assert_eq!(root.attribute("IssueInstant"), Some("2024-05-01T12:00:00Z"));

        let names: Vec<_> = root.elements().map(|e| e.local_name.as_str()).collect();
        assert_eq!(
            names,
            ["Issuer", "Subject", "Conditions", "AttributeStatement", "AuthnStatement"]
        );

        let data = &root.descendants(SAML_NS, "SubjectConfirmationData")[0];
        assert_eq!(data.attribute("InResponseTo"), Some("134"));
        assert_eq!(data.attribute("Recipient"), Some("http://sportngin.com"));
        assert_eq!(data.attribute("NotOnOrAfter"), Some("2024-05-01T12:03:00Z"));

        let authn = root.child(SAML_NS, "AuthnStatement").unwrap();
        assert_eq!(authn.attribute("SessionIndex"), Some("_abc"));
    }

    #[test]
    fn conditions_window_is_expiry_plus_skew() {
        let ctx = context();
        let p = principal();
        let xml = AssertionBuilder::new(&ctx, &p).raw();
        assert!(xml.contains(
            r#"<Conditions NotBefore="2024-05-01T11:59:55Z" NotOnOrAfter="2024-05-01T13:00:00Z">"#
        ));
        assert!(xml.contains("<Audience>http://sp.example.com</Audience>"));
    }

    #[test]
    fn attributes_keep_order_and_escape_values() {
        let ctx = context();
        let p = principal();
        let doc = Document::parse(&AssertionBuilder::new(&ctx, &p).raw()).unwrap();
        let attributes = doc.root.descendants(SAML_NS, "Attribute");
        assert_eq!(attributes[0].attribute("Name"), Some("email"));
        assert_eq!(attributes[1].attribute("FriendlyName"), Some("groups"));
        let values: Vec<_> = attributes[1]
            .children_named(SAML_NS, "AttributeValue")
            .map(|v| v.text())
            .collect();
        assert_eq!(values, ["admins", "a&b"]);
    }

    #[test]
    fn no_attribute_statement_without_attributes() {
        let ctx = context();
        let p = Principal::new("foo@example.com");
        assert!(!AssertionBuilder::new(&ctx, &p).raw().contains("AttributeStatement"));
    }

    #[test]
    fn no_in_response_to_without_request() {
        let mut ctx = context();
        ctx.saml_request_id = None;
        let p = principal();
        assert!(!AssertionBuilder::new(&ctx, &p).raw().contains("InResponseTo"));
    }

    #[test]
    fn signed_assertion_verifies_and_references_its_id() {
        let ctx = context();
        let p = principal();
        let signed = AssertionBuilder::new(&ctx, &p).signed(&signing()).unwrap();
        let doc = Document::parse(&signed).unwrap();
        let sig = extract_signature(&doc.root).unwrap();
        assert_eq!(sig.reference_uri, "#_abc");
        verify_element(&doc.root, &Certificate::from_pem(IDP_CERT).unwrap()).unwrap();
    }

    #[test]
    fn hand_built_window_saturates_instead_of_overflowing() {
        let mut ctx = context();
        ctx.issue_instant = DateTime::<Utc>::MAX_UTC - Duration::seconds(30);
        ctx.expiry = Duration::days(365);
        let p = principal();
        let doc = Document::parse(&AssertionBuilder::new(&ctx, &p).raw()).unwrap();
        let conditions = doc.root.child(SAML_NS, "Conditions").unwrap();
        assert_eq!(
            conditions.attribute("NotOnOrAfter"),
            Some(format_instant(DateTime::<Utc>::MAX_UTC).as_str())
        );
    }

    #[test]
    fn encrypt_requires_options() {
        let ctx = context();
        let p = principal();
        assert!(matches!(
            AssertionBuilder::new(&ctx, &p).encrypt(&signing(), true),
            Err(SamlError::MissingField("encryption_opts"))
        ));
    }

    #[test]
    fn build_encrypts_when_requested() {
        let mut ctx = context();
        ctx.encryption_opts = Some(EncryptionOptions::new(Certificate::from_pem(SP_CERT).unwrap()));
        let p = principal();
        let xml = AssertionBuilder::new(&ctx, &p).build(&signing()).unwrap();
        assert!(xml.starts_with("<EncryptedAssertion"));
        assert!(xml.contains("EncryptedData"));
        assert!(!xml.contains("foo@example.com"));
    }
}
