//! Identity provider configuration.
//!
//! Configuration is read from a TOML file. A few settings can be overridden
//! from the environment (a `.env` file is honored):
//!
//! | Variable | Field |
//! |---|---|
//! | `IDP_ISSUER_URI` | `issuer_uri` |
//! | `IDP_SIGNATURE_ALGORITHM` | `algorithm` |
//! | `IDP_METADATA_FETCH_TIMEOUT_SECS` | `metadata_fetch_timeout_secs` |

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use idp_crypto::{BlockEncryption, Certificate, DigestAlgorithm, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::service_provider::{MetadataFetcher, MetadataStore, ServiceProviderRegistry};
use crate::types::{NameIdFormat, SigningContext, DEFAULT_EXPIRY_SECS, MAX_EXPIRY_SECS};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// IdP entity ID, used as `Issuer`.
    pub issuer_uri: String,

    /// SSO endpoint published in metadata.
    #[serde(default)]
    pub single_sign_on_url: Option<String>,

    /// SLO endpoint published in metadata.
    #[serde(default)]
    pub single_logout_url: Option<String>,

    /// Signature and digest algorithm.
    #[serde(default)]
    pub algorithm: DigestAlgorithm,

    /// Signing key material.
    #[serde(default)]
    pub signing: SigningConfig,

    /// Assertion lifetime in seconds.
    #[serde(default = "default_assertion_expiry_secs")]
    pub assertion_expiry_secs: i64,

    /// Bound on each SP metadata fetch, in seconds.
    #[serde(default = "default_metadata_fetch_timeout_secs")]
    pub metadata_fetch_timeout_secs: u64,

    /// Name ID formats published in metadata. Empty means all supported.
    #[serde(default)]
    pub name_id_formats: Vec<String>,

    /// Configured relying parties.
    #[serde(default)]
    pub service_providers: Vec<ServiceProviderConfig>,

    /// Directory relative key paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_assertion_expiry_secs() -> i64 {
    DEFAULT_EXPIRY_SECS
}

fn default_metadata_fetch_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Where the signing key and certificate come from.
///
/// Inline PEM wins over a path when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Path to a PKCS#8 or PKCS#1 PEM private key.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Inline PEM private key.
    #[serde(default, skip_serializing)]
    pub private_key_pem: Option<String>,
    /// Path to the PEM certificate.
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    /// Inline PEM certificate.
    #[serde(default)]
    pub certificate_pem: Option<String>,
}

/// Static configuration of one relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderConfig {
    /// Entity ID.
    pub identifier: String,
    /// Display name.
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// Trusted certificates, PEM or bare base64.
    #[serde(default)]
    pub certs: Vec<String>,
    /// Where the SP publishes its metadata.
    #[serde(default)]
    pub metadata_url: Option<String>,
    /// Assertion consumer service URL.
    #[serde(default)]
    pub acs_url: Option<String>,
    /// Logout service URL.
    #[serde(default)]
    pub assertion_consumer_logout_service_url: Option<String>,
    /// Always require signed metadata.
    #[serde(default)]
    pub validate_signature: bool,
    /// Inactive relying parties are never answered.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Symmetric cipher for encrypted assertions.
    #[serde(default)]
    pub block_encryption: Option<BlockEncryption>,
    /// Encrypt assertions for this relying party.
    #[serde(default)]
    pub encrypt_responses: bool,
    /// Sign the response envelope as well as the assertion.
    #[serde(default)]
    pub signed_response_message_requested: bool,
}

impl Default for ServiceProviderConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            friendly_name: None,
            certs: Vec::new(),
            metadata_url: None,
            acs_url: None,
            assertion_consumer_logout_service_url: None,
            validate_signature: false,
            active: true,
            block_encryption: None,
            encrypt_responses: false,
            signed_response_message_requested: false,
        }
    }
}

impl IdpConfig {
    /// Creates a configuration with defaults for everything but the issuer.
    #[must_use]
    pub fn new(issuer_uri: impl Into<String>) -> Self {
        Self {
            issuer_uri: issuer_uri.into(),
            single_sign_on_url: None,
            single_logout_url: None,
            algorithm: DigestAlgorithm::default(),
            signing: SigningConfig::default(),
            assertion_expiry_secs: default_assertion_expiry_secs(),
            metadata_fetch_timeout_secs: default_metadata_fetch_timeout_secs(),
            name_id_formats: Vec::new(),
            service_providers: Vec::new(),
            base_dir: None,
        }
    }

    /// Parses TOML.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfiguration`] for invalid TOML or an
    /// unknown algorithm name.
    pub fn from_toml_str(text: &str) -> SamlResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML file. Relative key paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> SamlResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SamlError::InvalidConfiguration(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Reads a file, applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns the first loading, override or validation error.
    pub fn load(path: impl AsRef<Path>) -> SamlResult<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment and `.env`.
    ///
    /// # Errors
    ///
    /// See [`apply_overrides`](Self::apply_overrides).
    pub fn apply_env_overrides(&mut self) -> SamlResult<()> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedAlgorithm`] for an unknown algorithm
    /// and [`SamlError::InvalidConfiguration`] for a non-numeric timeout.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> SamlResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(issuer) = lookup("IDP_ISSUER_URI") {
            self.issuer_uri = issuer;
        }
        if let Some(algorithm) = lookup("IDP_SIGNATURE_ALGORITHM") {
            self.algorithm = algorithm.parse()?;
        }
        if let Some(timeout) = lookup("IDP_METADATA_FETCH_TIMEOUT_SECS") {
            self.metadata_fetch_timeout_secs = timeout.trim().parse().map_err(|_| {
                SamlError::InvalidConfiguration(format!(
                    "IDP_METADATA_FETCH_TIMEOUT_SECS is not a number: {timeout:?}"
                ))
            })?;
        }
        Ok(())
    }

    /// Checks the configuration without loading key material.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> SamlResult<()> {
        if self.issuer_uri.trim().is_empty() {
            return Err(SamlError::MissingField("issuer_uri"));
        }
        if !(1..=MAX_EXPIRY_SECS).contains(&self.assertion_expiry_secs) {
            return Err(SamlError::InvalidConfiguration(format!(
                "assertion_expiry_secs must be between 1 and {MAX_EXPIRY_SECS}"
            )));
        }
        if self.metadata_fetch_timeout_secs == 0 {
            return Err(SamlError::InvalidConfiguration(
                "metadata_fetch_timeout_secs must be positive".to_string(),
            ));
        }
        for format in &self.name_id_formats {
            if NameIdFormat::from_uri(format).is_none() {
                return Err(SamlError::InvalidConfiguration(format!(
                    "unsupported name ID format {format}"
                )));
            }
        }

        let mut seen = HashSet::new();
        for sp in &self.service_providers {
            if sp.identifier.trim().is_empty() {
                return Err(SamlError::MissingField("service_providers.identifier"));
            }
            if !seen.insert(sp.identifier.as_str()) {
                return Err(SamlError::InvalidConfiguration(format!(
                    "duplicate service provider {}",
                    sp.identifier
                )));
            }
            if sp.encrypt_responses && sp.certs.is_empty() {
                return Err(SamlError::InvalidConfiguration(format!(
                    "{} encrypts responses but has no certificate",
                    sp.identifier
                )));
            }
        }
        Ok(())
    }

    /// Returns the assertion lifetime, clamped to `0..=MAX_EXPIRY_SECS + 1`.
    /// Values outside the valid range stay invalid after clamping, so the
    /// response context builder still rejects them.
    #[must_use]
    pub fn assertion_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.assertion_expiry_secs.clamp(0, MAX_EXPIRY_SECS + 1))
    }

    /// Returns the metadata fetch bound.
    #[must_use]
    pub const fn metadata_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_fetch_timeout_secs)
    }

    /// Returns the name ID formats to publish.
    #[must_use]
    pub fn published_name_id_formats(&self) -> Vec<String> {
        if self.name_id_formats.is_empty() {
            NameIdFormat::ALL.iter().map(|f| f.uri().to_string()).collect()
        } else {
            self.name_id_formats.clone()
        }
    }

    /// Builds the relying party registry.
    ///
    /// # Errors
    ///
    /// Returns the first relying party that fails to load.
    pub fn registry(
        &self,
        fetcher: Arc<dyn MetadataFetcher>,
        store: Arc<dyn MetadataStore>,
    ) -> SamlResult<ServiceProviderRegistry> {
        ServiceProviderRegistry::from_configs(
            self.service_providers.iter().cloned(),
            fetcher,
            store,
            self.metadata_fetch_timeout(),
        )
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl SigningContext {
    /// Loads the signing key and certificate named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingField`] when no key or certificate is
    /// configured and [`SamlError::Key`] when they do not load or match.
    pub fn from_config(config: &IdpConfig) -> SamlResult<Self> {
        let signing = &config.signing;
        let key = match (&signing.private_key_pem, &signing.private_key_path) {
            (Some(pem), _) => SigningKey::from_pem(pem)?,
            (None, Some(path)) => SigningKey::from_file(config.resolve(path))?,
            (None, None) => return Err(SamlError::MissingField("signing.private_key_path")),
        };
        let cert = match (&signing.certificate_pem, &signing.certificate_path) {
            (Some(pem), _) => Certificate::from_pem(pem)?,
            (None, Some(path)) => Certificate::from_file(config.resolve(path))?,
            (None, None) => return Err(SamlError::MissingField("signing.certificate_path")),
        };
        Self::new(config.algorithm, key, cert)
    }
}
