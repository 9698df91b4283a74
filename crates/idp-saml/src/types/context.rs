//! Per-response and per-deployment inputs threaded through the builders.

use chrono::{DateTime, Duration, Utc};
use idp_crypto::{BlockEncryption, Certificate, DigestAlgorithm, KeyTransport, RsaSigner, SigningKey};

use crate::error::{SamlError, SamlResult};

use super::constants::AuthnContextClass;

/// Default assertion lifetime.
pub const DEFAULT_EXPIRY_SECS: i64 = 3600;

/// Allowance subtracted from the issue instant for `NotBefore`.
pub const CLOCK_SKEW_SECS: i64 = 5;

/// Lifetime of `SubjectConfirmationData`.
pub const SUBJECT_CONFIRMATION_SECS: i64 = 180;

/// Longest accepted assertion lifetime (one year).
pub const MAX_EXPIRY_SECS: i64 = 366 * 24 * 60 * 60;

/// Formats an instant as a SAML `dateTime` (UTC, whole seconds).
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Key material used to sign assertions and responses.
///
/// Treated as a secret: its `Debug` output shows only the key size and the
/// certificate fingerprint.
#[derive(Debug, Clone)]
pub struct SigningContext {
    /// Digest and signature algorithm.
    pub algorithm: DigestAlgorithm,
    private_key: SigningKey,
    x509_certificate: Certificate,
}

impl SigningContext {
    /// Creates a signing context.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Key`] if the certificate does not belong to the key.
    pub fn new(
        algorithm: DigestAlgorithm,
        private_key: SigningKey,
        x509_certificate: Certificate,
    ) -> SamlResult<Self> {
        if !x509_certificate.matches_key(&private_key) {
            return Err(SamlError::Key(
                "certificate does not match the signing key".to_string(),
            ));
        }
        Ok(Self {
            algorithm,
            private_key,
            x509_certificate,
        })
    }

    /// Creates a signing context from PEM key material.
    ///
    /// # Errors
    ///
    /// Returns an error if either PEM fails to decode or they do not match.
    pub fn from_pem(algorithm: DigestAlgorithm, key_pem: &str, cert_pem: &str) -> SamlResult<Self> {
        Self::new(
            algorithm,
            SigningKey::from_pem(key_pem)?,
            Certificate::from_pem(cert_pem)?,
        )
    }

    /// Returns a copy that signs with a different algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Returns the signing certificate.
    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.x509_certificate
    }

    /// Returns a signer for the configured algorithm.
    #[must_use]
    pub fn signer(&self) -> RsaSigner {
        RsaSigner::new(self.private_key.clone(), self.algorithm)
    }
}

/// How to encrypt an assertion for one relying party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOptions {
    /// Recipient certificate. Its key wraps the session key.
    pub cert: Certificate,
    /// Symmetric algorithm for the assertion.
    pub block_encryption: BlockEncryption,
    /// Algorithm wrapping the session key.
    pub key_transport: KeyTransport,
}

impl EncryptionOptions {
    /// Creates options with AES-256-CBC and RSA-OAEP-MGF1P.
    #[must_use]
    pub fn new(cert: Certificate) -> Self {
        Self {
            cert,
            block_encryption: BlockEncryption::default(),
            key_transport: KeyTransport::default(),
        }
    }

    /// Sets the block encryption algorithm.
    #[must_use]
    pub const fn with_block_encryption(mut self, block_encryption: BlockEncryption) -> Self {
        self.block_encryption = block_encryption;
        self
    }
}

/// Everything that varies per response.
///
/// Built once and passed by reference through every builder.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// Assertion identifier, emitted as `ID="_<reference_id>"`.
    pub reference_id: String,
    /// Response identifier, emitted as `ID="_<response_id>"`.
    pub response_id: String,
    /// IdP entity ID.
    pub issuer_uri: String,
    /// Relying party entity ID.
    pub audience_uri: String,
    /// ID of the request being answered.
    pub saml_request_id: Option<String>,
    /// Assertion consumer service URL.
    pub saml_acs_url: String,
    /// Assertion lifetime.
    pub expiry: Duration,
    /// Authentication context class reference.
    pub authn_context_classref: String,
    /// Encryption settings, if the relying party wants encrypted assertions.
    pub encryption_opts: Option<EncryptionOptions>,
    /// Issue instant shared by the response and the assertion.
    pub issue_instant: DateTime<Utc>,
}

impl ResponseContext {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ResponseContextBuilder {
        ResponseContextBuilder::default()
    }

    /// Returns the assertion `ID` attribute value.
    #[must_use]
    pub fn assertion_id(&self) -> String {
        format!("_{}", self.reference_id)
    }

    /// Returns the response `ID` attribute value.
    #[must_use]
    pub fn response_xml_id(&self) -> String {
        format!("_{}", self.response_id)
    }
}

/// Builder for [`ResponseContext`].
#[derive(Debug, Clone, Default)]
pub struct ResponseContextBuilder {
    reference_id: Option<String>,
    response_id: Option<String>,
    issuer_uri: Option<String>,
    audience_uri: Option<String>,
    saml_request_id: Option<String>,
    saml_acs_url: Option<String>,
    expiry: Option<Duration>,
    authn_context_classref: Option<String>,
    encryption_opts: Option<EncryptionOptions>,
    issue_instant: Option<DateTime<Utc>>,
}

impl ResponseContextBuilder {
    /// Sets the assertion reference ID. Generated when not set.
    #[must_use]
    pub fn reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self
    }

    /// Sets the response ID. Generated when not set.
    #[must_use]
    pub fn response_id(mut self, id: impl Into<String>) -> Self {
        self.response_id = Some(id.into());
        self
    }

    /// Sets the IdP entity ID.
    #[must_use]
    pub fn issuer_uri(mut self, uri: impl Into<String>) -> Self {
        self.issuer_uri = Some(uri.into());
        self
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience_uri(mut self, uri: impl Into<String>) -> Self {
        self.audience_uri = Some(uri.into());
        self
    }

    /// Sets the request ID being answered.
    #[must_use]
    pub fn saml_request_id(mut self, id: impl Into<String>) -> Self {
        self.saml_request_id = Some(id.into());
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn saml_acs_url(mut self, url: impl Into<String>) -> Self {
        self.saml_acs_url = Some(url.into());
        self
    }

    /// Sets the assertion lifetime.
    #[must_use]
    pub const fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Sets the authentication context class reference.
    #[must_use]
    pub fn authn_context_classref(mut self, classref: impl Into<String>) -> Self {
        self.authn_context_classref = Some(classref.into());
        self
    }

    /// Requests an encrypted assertion.
    #[must_use]
    pub fn encryption_opts(mut self, opts: Option<EncryptionOptions>) -> Self {
        self.encryption_opts = opts;
        self
    }

    /// Fixes the issue instant.
    #[must_use]
    pub const fn issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = Some(instant);
        self
    }

    /// Validates the inputs and builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingField`] for an absent or empty required
    /// field and [`SamlError::InvalidConfiguration`] for an unusable ID or an
    /// expiry outside `(0, MAX_EXPIRY_SECS]`.
    pub fn build(self) -> SamlResult<ResponseContext> {
        let issuer_uri = required(self.issuer_uri, "issuer_uri")?;
        let audience_uri = required(self.audience_uri, "audience_uri")?;
        let saml_acs_url = required(self.saml_acs_url, "saml_acs_url")?;

        let reference_id = self
            .reference_id
            .unwrap_or_else(idp_crypto::generate_reference_id);
        let response_id = self
            .response_id
            .unwrap_or_else(idp_crypto::generate_reference_id);
        check_id(&reference_id, "reference_id")?;
        check_id(&response_id, "response_id")?;
        if reference_id == response_id {
            return Err(SamlError::InvalidConfiguration(
                "reference_id and response_id must differ".to_string(),
            ));
        }

        let expiry = self
            .expiry
            .unwrap_or_else(|| Duration::seconds(DEFAULT_EXPIRY_SECS));
        if expiry <= Duration::zero() {
            return Err(SamlError::InvalidConfiguration(
                "expiry must be positive".to_string(),
            ));
        }
        if expiry > Duration::seconds(MAX_EXPIRY_SECS) {
            return Err(SamlError::InvalidConfiguration(format!(
                "expiry must not exceed {MAX_EXPIRY_SECS} seconds"
            )));
        }

        let issue_instant = self.issue_instant.unwrap_or_else(Utc::now);
        let window_fits = issue_instant
            .checked_sub_signed(Duration::seconds(CLOCK_SKEW_SECS))
            .and(issue_instant.checked_add_signed(expiry))
            .and(issue_instant.checked_add_signed(Duration::seconds(SUBJECT_CONFIRMATION_SECS)))
            .is_some();
        if !window_fits {
            return Err(SamlError::InvalidConfiguration(
                "validity window falls outside the representable range".to_string(),
            ));
        }

        Ok(ResponseContext {
            reference_id,
            response_id,
            issuer_uri,
            audience_uri,
            saml_request_id: self.saml_request_id.filter(|id| !id.is_empty()),
            saml_acs_url,
            expiry,
            authn_context_classref: self
                .authn_context_classref
                .unwrap_or_else(|| AuthnContextClass::default().uri().to_string()),
            encryption_opts: self.encryption_opts,
            issue_instant,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> SamlResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(SamlError::MissingField(field))
}

// `_` + id must be an NCName.
fn check_id(id: &str, field: &str) -> SamlResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SamlError::InvalidConfiguration(format!(
            "{field} is not usable as an XML ID: {id:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> ResponseContextBuilder {
        ResponseContext::builder()
            .issuer_uri("http://example.com")
            .audience_uri("http://sp.example.com")
            .saml_acs_url("http://sportngin.com")
            .saml_request_id("134")
    }

    #[test]
    fn defaults_are_filled_in() {
        let ctx = base().build().unwrap();
        assert_eq!(ctx.expiry, Duration::seconds(3600));
        assert_ne!(ctx.reference_id, ctx.response_id);
        assert!(ctx.assertion_id().starts_with('_'));
        assert!(ctx.authn_context_classref.ends_with("PasswordProtectedTransport"));
        assert!(ctx.encryption_opts.is_none());
    }

    #[test]
    fn oversized_expiry_is_rejected() {
        let result = base().expiry(Duration::days(365 * 100)).build();
        assert!(matches!(result, Err(SamlError::InvalidConfiguration(_))));

        let ctx = base().expiry(Duration::seconds(MAX_EXPIRY_SECS)).build().unwrap();
        assert_eq!(ctx.expiry.num_seconds(), MAX_EXPIRY_SECS);
    }

    #[test]
    fn window_past_the_calendar_end_is_rejected() {
        let result = base()
            .issue_instant(DateTime::<Utc>::MAX_UTC - Duration::seconds(60))
            .build();
        assert!(matches!(result, Err(SamlError::InvalidConfiguration(_))));
    }

    #[test]
    fn missing_audience_fails_fast() {
        let result = ResponseContext::builder()
            .issuer_uri("http://example.com")
            .saml_acs_url("http://sportngin.com")
            .build();
        assert!(matches!(result, Err(SamlError::MissingField("audience_uri"))));
    }

    #[test]
    fn blank_issuer_counts_as_missing() {
        let result = base().issuer_uri("  ").build();
        assert!(matches!(result, Err(SamlError::MissingField("issuer_uri"))));
    }

    #[test]
    fn rejects_ids_that_break_xml() {
        let result = base().reference_id("a\"b").build();
        assert!(matches!(result, Err(SamlError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_non_positive_expiry() {
        let result = base().expiry(Duration::zero()).build();
        assert!(matches!(result, Err(SamlError::InvalidConfiguration(_))));
    }

    #[test]
    fn empty_request_id_is_dropped() {
        let ctx = base().saml_request_id("").build().unwrap();
        assert!(ctx.saml_request_id.is_none());
    }

    #[test]
    fn instants_are_whole_second_utc() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_instant(instant), "2024-01-02T03:04:05Z");
    }
}
