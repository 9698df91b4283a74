//! Common test utilities and fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use idp_crypto::{Certificate, DigestAlgorithm};
use idp_saml::{
    MetadataFetcher, MetadataStore, PersistedMetadata, ResponseContext, SamlError, SamlResult,
    ServiceProvider, ServiceProviderConfig, SigningContext,
};
use idp_saml::signature::XmlSigner;

pub const IDP_KEY: &str = include_str!("../../../fixtures/idp.key");
pub const IDP_CERT: &str = include_str!("../../../fixtures/idp.crt");
pub const SP_KEY: &str = include_str!("../../../fixtures/sp.key");
pub const SP_CERT: &str = include_str!("../../../fixtures/sp.crt");
pub const UNTRUSTED_KEY: &str = include_str!("../../../fixtures/untrusted.key");
pub const UNTRUSTED_CERT: &str = include_str!("../../../fixtures/untrusted.crt");

pub const SP_ENTITY_ID: &str = "http://sp.example.com";

/// The instant every deterministic test issues at.
pub fn fixed_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2013, 10, 8, 11, 22, 0).unwrap()
}

pub fn signing(algorithm: DigestAlgorithm) -> SigningContext {
    SigningContext::from_pem(algorithm, IDP_KEY, IDP_CERT).unwrap()
}

pub fn idp_cert() -> Certificate {
    Certificate::from_pem(IDP_CERT).unwrap()
}

pub fn sp_cert() -> Certificate {
    Certificate::from_pem(SP_CERT).unwrap()
}

/// A context addressed to the test relying party with fixed IDs and clock.
pub fn context() -> ResponseContext {
    ResponseContext::builder()
        .reference_id("abc")
        .response_id("xyz")
        .issuer_uri("http://example.com")
        .audience_uri(SP_ENTITY_ID)
        .saml_acs_url("http://sportngin.com")
        .saml_request_id("134")
        .issue_instant(fixed_clock())
        .build()
        .unwrap()
}

/// SP metadata with `ID="_sp-metadata"`.
pub fn sp_metadata(want_assertions_signed: bool) -> String {
    format!(
        concat!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" ID="_sp-metadata" entityID="{entity}">"#,
            r#"<md:SPSSODescriptor AuthnRequestsSigned="true" WantAssertionsSigned="{want}" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">"#,
            r#"<md:KeyDescriptor use="encryption"><ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#,
            r#"<md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</md:NameIDFormat>"#,
            r#"<md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="http://sp.example.com/acs" index="0" isDefault="true"/>"#,
            "</md:SPSSODescriptor>",
            "</md:EntityDescriptor>"
        ),
        entity = SP_ENTITY_ID,
        want = want_assertions_signed,
        cert = sp_cert().to_base64(),
    )
}

/// Signs [`sp_metadata`] with the given key pair.
pub fn signed_sp_metadata(key: &str, cert: &str, want_assertions_signed: bool) -> String {
    let ctx = SigningContext::from_pem(DigestAlgorithm::Sha256, key, cert).unwrap();
    XmlSigner::new(ctx)
        .sign(&sp_metadata(want_assertions_signed), "sp-metadata")
        .unwrap()
}

/// Serves a fixed body, or fails, and counts calls.
pub struct FakeFetcher {
    body: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn serving(body: String) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            body: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MetadataFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> SamlResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body
            .clone()
            .map(String::into_bytes)
            .ok_or_else(|| SamlError::MetadataFetch(format!("connection refused: {url}")))
    }
}

/// A store that records every `put`.
#[derive(Default)]
pub struct RecordingStore {
    entries: DashMap<String, PersistedMetadata>,
    pub puts: AtomicUsize,
}

impl RecordingStore {
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for RecordingStore {
    async fn get(&self, identifier: &str) -> SamlResult<Option<PersistedMetadata>> {
        Ok(self.entries.get(identifier).map(|e| e.value().clone()))
    }

    async fn put(&self, identifier: &str, metadata: PersistedMetadata) -> SamlResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(identifier.to_string(), metadata);
        Ok(())
    }
}

pub fn sp_config() -> ServiceProviderConfig {
    ServiceProviderConfig {
        identifier: SP_ENTITY_ID.to_string(),
        friendly_name: Some("Example SP".to_string()),
        certs: vec![SP_CERT.to_string()],
        metadata_url: Some("https://sp.example.com/saml/metadata".to_string()),
        acs_url: Some("http://sp.example.com/acs".to_string()),
        ..ServiceProviderConfig::default()
    }
}

pub fn service_provider(
    config: ServiceProviderConfig,
    fetcher: Arc<FakeFetcher>,
    store: Arc<RecordingStore>,
) -> ServiceProvider {
    ServiceProvider::new(config, fetcher, store).unwrap()
}
