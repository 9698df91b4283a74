//! SAML error types.
//!
//! Every error belongs to one [`ErrorKind`]. Configuration and cryptographic
//! errors abort the current operation. Trust and transport errors are
//! absorbed by metadata refresh, which keeps the previously trusted state.

use std::fmt;
use std::time::Duration;

use idp_crypto::{AlgorithmError, CipherError, KeyError, SignatureError};
use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unsupported algorithm, missing field, bad key material.
    Configuration,
    /// A metadata signature could not be tied to a trusted certificate.
    Trust,
    /// Fetching or storing metadata failed or timed out.
    Transport,
    /// Signing or encryption failed.
    Cryptographic,
    /// Input XML or base64 could not be parsed.
    Malformed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::Trust => "trust",
            Self::Transport => "transport",
            Self::Cryptographic => "cryptographic",
            Self::Malformed => "malformed",
        })
    }
}

/// SAML errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Unsupported digest, signature or encryption algorithm.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required builder field was not supplied.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Private key or certificate could not be loaded.
    #[error("invalid key material: {0}")]
    Key(String),

    /// No service provider is registered under the identifier.
    #[error("unknown service provider: {0}")]
    UnknownServiceProvider(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// XML encryption or decryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// XML signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Metadata was not signed by any trusted certificate.
    #[error("untrusted metadata for {0}")]
    UntrustedMetadata(String),

    /// Fetching metadata failed.
    #[error("metadata fetch failed: {0}")]
    MetadataFetch(String),

    /// Fetching metadata took longer than the configured timeout.
    #[error("metadata fetch timed out after {0:?}")]
    MetadataTimeout(Duration),

    /// Metadata store operation failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SamlError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedAlgorithm(_)
            | Self::MissingField(_)
            | Self::InvalidConfiguration(_)
            | Self::Key(_)
            | Self::UnknownServiceProvider(_) => ErrorKind::Configuration,
            Self::XmlParse(_) | Self::MissingElement(_) | Self::Base64Decode(_) => {
                ErrorKind::Malformed
            }
            Self::SignatureCreation(_) | Self::Encryption(_) => ErrorKind::Cryptographic,
            Self::SignatureInvalid(_) | Self::UntrustedMetadata(_) => ErrorKind::Trust,
            Self::MetadataFetch(_) | Self::MetadataTimeout(_) | Self::Storage(_) => {
                ErrorKind::Transport
            }
        }
    }

    /// Returns true if retrying later may succeed without configuration changes.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Trust | ErrorKind::Transport)
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<AlgorithmError> for SamlError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::Unsupported(name) => Self::UnsupportedAlgorithm(name),
        }
    }
}

impl From<KeyError> for SamlError {
    fn from(err: KeyError) -> Self {
        Self::Key(err.to_string())
    }
}

impl From<SignatureError> for SamlError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Signing(msg) => Self::SignatureCreation(msg),
            SignatureError::Malformed(msg) => Self::SignatureInvalid(msg),
        }
    }
}

impl From<CipherError> for SamlError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::UnsupportedAlgorithm(name) => Self::UnsupportedAlgorithm(name),
            other => Self::Encryption(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

impl From<toml::de::Error> for SamlError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}
