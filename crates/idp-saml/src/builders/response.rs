//! Protocol response envelope.

use crate::types::{
    format_instant, status_codes, ResponseContext, CONSENT_UNSPECIFIED, SAMLP_NS, SAML_NS,
    SAML_VERSION,
};
use crate::xml::{escape_attr, escape_text};

/// Wraps an assertion in `<samlp:Response>`.
///
/// The envelope is pure composition: the assertion string is embedded
/// verbatim and nothing is signed here.
#[derive(Debug, Clone, Copy)]
pub struct ResponseBuilder<'a> {
    context: &'a ResponseContext,
    assertion: &'a str,
}

impl<'a> ResponseBuilder<'a> {
    /// Creates a builder around an already signed or encrypted assertion.
    #[must_use]
    pub const fn new(context: &'a ResponseContext, assertion: &'a str) -> Self {
        Self { context, assertion }
    }

    /// Returns the unsigned envelope.
    #[must_use]
    pub fn raw(&self) -> String {
        let ctx = self.context;
        let mut xml = String::with_capacity(self.assertion.len() + 512);
        xml.push_str(&format!(
            r#"<samlp:Response ID="{}" Version="{SAML_VERSION}" IssueInstant="{}" Destination="{}" Consent="{CONSENT_UNSPECIFIED}""#,
            escape_attr(&ctx.response_xml_id()),
            format_instant(ctx.issue_instant),
            escape_attr(&ctx.saml_acs_url),
        ));
        if let Some(request_id) = &ctx.saml_request_id {
            xml.push_str(&format!(r#" InResponseTo="{}""#, escape_attr(request_id)));
        }
        xml.push_str(&format!(r#" xmlns:samlp="{SAMLP_NS}">"#));
        xml.push_str(&format!(
            r#"<Issuer xmlns="{SAML_NS}">{}</Issuer>"#,
            escape_text(&ctx.issuer_uri)
        ));
        xml.push_str(&format!(
            r#"<samlp:Status><samlp:StatusCode Value="{}"></samlp:StatusCode></samlp:Status>"#,
            status_codes::SUCCESS
        ));
        xml.push_str(self.assertion);
        xml.push_str("</samlp:Response>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn context(request_id: Option<&str>) -> ResponseContext {
        let mut builder = ResponseContext::builder()
            .reference_id("abc")
            .response_id("xyz")
            .issuer_uri("http://example.com")
            .audience_uri("http://sp.example.com")
            .saml_acs_url("http://sportngin.com")
            .issue_instant(Utc.with_ymd_and_hms(2013, 10, 8, 11, 22, 0).unwrap());
        if let Some(id) = request_id {
            builder = builder.saml_request_id(id);
        }
        builder.build().unwrap()
    }

    #[test]
    fn raw_envelope_is_exact() {
        let ctx = context(Some("134"));
        let xml = ResponseBuilder::new(&ctx, "<Assertion>assertion</Assertion>").raw();
        assert_eq!(
            xml,
            concat!(
                r#"<samlp:Response ID="_xyz" Version="2.0" IssueInstant="2013-10-08T11:22:00Z" "#,
                r#"Destination="http://sportngin.com" Consent="urn:oasis:names:tc:SAML:2.0:consent:unspecified" "#,
                r#"InResponseTo="134" xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">"#,
                r#"<Issuer xmlns="urn:oasis:names:tc:SAML:2.0:assertion">http://example.com</Issuer>"#,
                r#"<samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"></samlp:StatusCode></samlp:Status>"#,
                "<Assertion>assertion</Assertion>",
                "</samlp:Response>"
            )
        );
    }

    #[test]
    fn unsolicited_response_omits_in_response_to() {
        let ctx = context(None);
        let xml = ResponseBuilder::new(&ctx, "<Assertion/>").raw();
        assert!(!xml.contains("InResponseTo"));
    }
}
