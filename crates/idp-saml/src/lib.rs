//! SAML 2.0 identity provider responses and relying party trust.
//!
//! This crate builds signed (and optionally encrypted) assertions, wraps
//! them in protocol responses, and keeps per relying party trust state
//! derived from signed metadata.
//!
//! - [`types`]: constants, per-response context and the principal
//! - [`xml`]: namespace-aware tree and exclusive canonicalization
//! - [`signature`]: enveloped XML-DSig signing and validation
//! - [`builders`]: assertion, encrypted assertion and response XML
//! - [`saml_response`]: the [`SamlResponse`] entry point
//! - [`metadata`] / [`service_provider`]: relying party metadata and trust registry
//! - [`idp_metadata`]: the IdP's own signed metadata
//! - [`config`]: TOML configuration with environment overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_saml::{Principal, ResponseContext, SamlResponse, SigningContext};
//!
//! let context = ResponseContext::builder()
//!     .issuer_uri("https://idp.example.com")
//!     .audience_uri("https://sp.example.com")
//!     .saml_acs_url("https://sp.example.com/acs")
//!     .saml_request_id(request_id)
//!     .build()?;
//! let response = SamlResponse::new(context, Principal::new("foo@example.com"), signing);
//! let encoded = response.encoded()?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builders;
pub mod config;
pub mod error;
pub mod idp_metadata;
pub mod metadata;
pub mod saml_response;
pub mod service_provider;
pub mod signature;
pub mod types;
pub mod xml;

pub use builders::{AssertionBuilder, ResponseBuilder};
pub use config::{IdpConfig, ServiceProviderConfig, SigningConfig};
pub use error::{ErrorKind, SamlError, SamlResult};
pub use idp_metadata::IdpMetadataBuilder;
pub use metadata::{IncomingMetadata, PersistedMetadata};
pub use saml_response::{ResponseSigning, SamlResponse};
pub use service_provider::{
    FileMetadataFetcher, InMemoryMetadataStore, MetadataFetcher, MetadataStore, ServiceProvider,
    ServiceProviderRegistry,
};
pub use types::*;
