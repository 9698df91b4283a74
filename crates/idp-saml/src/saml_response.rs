//! Top-level response generation.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::builders::{AssertionBuilder, ResponseBuilder};
use crate::error::SamlResult;
use crate::signature::XmlSigner;
use crate::types::{Principal, ResponseContext, SigningContext};

/// Which parts of the response carry a signature.
///
/// The assertion is signed in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSigning {
    /// Only the assertion is signed; the envelope is not.
    #[default]
    AssertionOnly,
    /// The envelope is signed as well.
    WholeResponse,
}

impl ResponseSigning {
    /// Maps a relying party's "signed response message requested" flag.
    #[must_use]
    pub const fn from_sp_flag(signed_response_message_requested: bool) -> Self {
        if signed_response_message_requested {
            Self::WholeResponse
        } else {
            Self::AssertionOnly
        }
    }
}

/// Produces the SAML response for one principal and relying party.
#[derive(Debug, Clone)]
pub struct SamlResponse {
    context: ResponseContext,
    principal: Principal,
    signing: SigningContext,
    policy: ResponseSigning,
}

impl SamlResponse {
    /// Creates a response that signs the assertion only.
    #[must_use]
    pub fn new(context: ResponseContext, principal: Principal, signing: SigningContext) -> Self {
        Self {
            context,
            principal,
            signing,
            policy: ResponseSigning::default(),
        }
    }

    /// Sets the signing policy used by [`render`](Self::render).
    #[must_use]
    pub const fn with_signing_policy(mut self, policy: ResponseSigning) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the response context.
    #[must_use]
    pub const fn context(&self) -> &ResponseContext {
        &self.context
    }

    /// Returns the signing policy.
    #[must_use]
    pub const fn signing_policy(&self) -> ResponseSigning {
        self.policy
    }

    /// Returns the signed (or encrypted) assertion.
    ///
    /// # Errors
    ///
    /// Returns a cryptographic error if signing or encryption fails.
    pub fn assertion(&self) -> SamlResult<String> {
        AssertionBuilder::new(&self.context, &self.principal).build(&self.signing)
    }

    /// Returns an unsigned envelope around the signed assertion.
    ///
    /// # Errors
    ///
    /// See [`assertion`](Self::assertion).
    pub fn build(&self) -> SamlResult<String> {
        let assertion = self.assertion()?;
        Ok(ResponseBuilder::new(&self.context, &assertion).raw())
    }

    /// Returns the response with the envelope signed too.
    ///
    /// # Errors
    ///
    /// See [`assertion`](Self::assertion).
    pub fn signed(&self) -> SamlResult<String> {
        let unsigned = self.build()?;
        XmlSigner::new(self.signing.clone()).sign(&unsigned, &self.context.response_id)
    }

    /// Returns the response XML according to the signing policy.
    ///
    /// # Errors
    ///
    /// See [`assertion`](Self::assertion).
    pub fn render(&self) -> SamlResult<String> {
        let xml = match self.policy {
            ResponseSigning::AssertionOnly => self.build()?,
            ResponseSigning::WholeResponse => self.signed()?,
        };
        info!(
            response = %self.context.response_xml_id(),
            audience = %self.context.audience_uri,
            algorithm = %self.signing.algorithm,
            policy = ?self.policy,
            encrypted = self.context.encryption_opts.is_some(),
            "built SAML response"
        );
        Ok(xml)
    }

    /// Returns [`render`](Self::render) base64-encoded for the POST binding.
    ///
    /// # Errors
    ///
    /// See [`assertion`](Self::assertion).
    pub fn encoded(&self) -> SamlResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.render()?))
    }
}
