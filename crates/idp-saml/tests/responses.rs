//! Response generation, end to end.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use idp_crypto::{BlockEncryption, DigestAlgorithm, SigningKey};
use idp_saml::builders::decrypt_assertion;
use idp_saml::signature::{extract_signature, is_signed, XmlSignatureValidator};
use idp_saml::xml::Document;
use idp_saml::{
    AssertedAttribute, EncryptionOptions, Principal, ResponseBuilder, ResponseContext,
    ResponseSigning, SamlResponse, CLOCK_SKEW_SECS, SAML_NS, XMLENC_NS,
};

use crate::common;

fn principal() -> Principal {
    Principal::new("foo@example.com")
        .with_attribute(AssertedAttribute::new("email", "foo@example.com"))
        .with_attribute(AssertedAttribute::multi("groups", ["staff", "admins"]))
}

fn instant(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[tokio::test]
async fn test_every_algorithm_produces_a_verifiable_assertion() -> anyhow::Result<()> {
    let validator = XmlSignatureValidator::new(vec![common::idp_cert()]);

    for algorithm in DigestAlgorithm::ALL {
        let response = SamlResponse::new(common::context(), principal(), common::signing(algorithm));
        let xml = response.render()?;
        let doc = Document::parse(&xml)?;
        let assertion = doc
            .root
            .child(SAML_NS, "Assertion")
            .ok_or_else(|| anyhow::anyhow!("no assertion"))?;

        validator.validate_element(assertion)?;
        let signature = extract_signature(assertion)?;
        assert_eq!(signature.algorithm, algorithm);
        assert_eq!(signature.digest_algorithm, algorithm);
        assert!(
            signature
                .canonical_signed_info
                .contains(&format!("rsa-{}\"", algorithm.name())),
            "SignatureMethod for {algorithm} should end in rsa-{}",
            algorithm.name()
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_reference_uri_names_the_assertion() -> anyhow::Result<()> {
    let response = SamlResponse::new(
        common::context(),
        principal(),
        common::signing(DigestAlgorithm::Sha256),
    );
    let doc = Document::parse(&response.render()?)?;
    let assertion = doc
        .root
        .child(SAML_NS, "Assertion")
        .ok_or_else(|| anyhow::anyhow!("no assertion"))?;

    assert_eq!(assertion.attribute("ID"), Some("_abc"));
    assert_eq!(extract_signature(assertion)?.reference_uri, "#_abc");
    Ok(())
}

#[tokio::test]
async fn test_conditions_window_is_expiry_plus_skew() -> anyhow::Result<()> {
    let context = ResponseContext::builder()
        .issuer_uri("http://example.com")
        .audience_uri(common::SP_ENTITY_ID)
        .saml_acs_url("http://sp.example.com/acs")
        .expiry(Duration::minutes(20))
        .issue_instant(common::fixed_clock())
        .build()?;
    let response = SamlResponse::new(context, principal(), common::signing(DigestAlgorithm::Sha256));
    let doc = Document::parse(&response.render()?)?;
    let conditions = doc
        .root
        .descendants(SAML_NS, "Conditions")
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no conditions"))?;

    let not_before = instant(conditions.attribute("NotBefore").unwrap_or_default())?;
    let not_on_or_after = instant(conditions.attribute("NotOnOrAfter").unwrap_or_default())?;
    assert_eq!(
        not_on_or_after - not_before,
        Duration::minutes(20) + Duration::seconds(CLOCK_SKEW_SECS)
    );
    assert_eq!(not_before, common::fixed_clock() - Duration::seconds(CLOCK_SKEW_SECS));
    Ok(())
}

#[tokio::test]
async fn test_raw_response_envelope() -> anyhow::Result<()> {
    let context = common::context();
    let xml = ResponseBuilder::new(&context, "<Assertion>assertion</Assertion>").raw();

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
    Ok(())
}

#[tokio::test]
async fn test_encoded_response_round_trips_name_id_and_issuer() -> anyhow::Result<()> {
    let validator = XmlSignatureValidator::new(vec![common::idp_cert()]);

    for algorithm in DigestAlgorithm::ALL {
        for policy in [ResponseSigning::AssertionOnly, ResponseSigning::WholeResponse] {
            let encoded = SamlResponse::new(common::context(), principal(), common::signing(algorithm))
                .with_signing_policy(policy)
                .encoded()?;
            let xml = String::from_utf8(base64::engine::general_purpose::STANDARD.decode(encoded)?)?;
            let doc = Document::parse(&xml)?;

            if policy == ResponseSigning::WholeResponse {
                validator.validate_element(&doc.root)?;
            } else {
                assert!(!is_signed(&doc.root));
            }

            let assertion = doc
                .root
                .child(SAML_NS, "Assertion")
                .ok_or_else(|| anyhow::anyhow!("no assertion"))?;
            validator.validate_element(assertion)?;

            let name_id = assertion
                .descendants(SAML_NS, "NameID")
                .into_iter()
                .next()
                .map(|e| e.text());
            assert_eq!(name_id.as_deref(), Some("foo@example.com"));
            let issuer = assertion.child(SAML_NS, "Issuer").map(|e| e.text());
            assert_eq!(issuer.as_deref(), Some("http://example.com"));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_encrypted_response_carries_encrypted_data() -> anyhow::Result<()> {
    let sp_key = SigningKey::from_pem(common::SP_KEY)?;

    for cipher in [BlockEncryption::Aes256Cbc, BlockEncryption::Aes128Gcm] {
        let context = ResponseContext::builder()
            .reference_id("abc")
            .issuer_uri("http://example.com")
            .audience_uri(common::SP_ENTITY_ID)
            .saml_acs_url("http://sp.example.com/acs")
            .encryption_opts(Some(
                EncryptionOptions::new(common::sp_cert()).with_block_encryption(cipher),
            ))
            .build()?;
        let xml = SamlResponse::new(context, principal(), common::signing(DigestAlgorithm::Sha256))
            .render()?;
        let doc = Document::parse(&xml)?;

        assert!(doc.root.child(SAML_NS, "Assertion").is_none());
        let encrypted = doc
            .root
            .child(SAML_NS, "EncryptedAssertion")
            .ok_or_else(|| anyhow::anyhow!("no encrypted assertion"))?;
        let data = encrypted
            .child(XMLENC_NS, "EncryptedData")
            .ok_or_else(|| anyhow::anyhow!("no encrypted data"))?;
        assert_eq!(
            data.attribute("Type"),
            Some("http://www.w3.org/2001/04/xmlenc#Element")
        );

        let plain = decrypt_assertion(&xml[encrypted.span()], &sp_key)?;
        let assertion = Document::parse(&plain)?;
        assert!(assertion.root.is(SAML_NS, "Assertion"));
        XmlSignatureValidator::new(vec![common::idp_cert()]).validate_element(&assertion.root)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_unsolicited_response_has_no_in_response_to() -> anyhow::Result<()> {
    let context = ResponseContext::builder()
        .issuer_uri("http://example.com")
        .audience_uri(common::SP_ENTITY_ID)
        .saml_acs_url("http://sp.example.com/acs")
        .build()?;
    let xml = SamlResponse::new(context, principal(), common::signing(DigestAlgorithm::Sha256))
        .render()?;

    assert!(!xml.contains("InResponseTo"));
    Ok(())
}
