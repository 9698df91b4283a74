//! Relying party metadata documents.
//!
//! [`IncomingMetadata`] is a freshly fetched `md:EntityDescriptor` that has
//! not been trusted yet. [`PersistedMetadata`] is the snapshot kept in the
//! metadata store once the document passed the trust gate.

use chrono::{DateTime, Utc};
use idp_crypto::Certificate;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::is_signed;
use crate::types::{SamlBinding, MD_NS, XMLDSIG_NS};
use crate::xml::{Document, Element};

/// A service endpoint published in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Binding URI.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
    /// `index` for indexed endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// `isDefault` for indexed endpoints.
    #[serde(default)]
    pub is_default: bool,
}

impl Endpoint {
    /// Returns the binding, if it is one this IdP knows.
    #[must_use]
    pub fn saml_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(&self.binding)
    }
}

/// `md:ContactPerson` details.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactPerson {
    /// `contactType` attribute.
    pub contact_type: Option<String>,
    /// Company name.
    pub company: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Surname.
    pub surname: Option<String>,
    /// First email address.
    pub email_address: Option<String>,
    /// First telephone number.
    pub telephone_number: Option<String>,
}

/// Trusted metadata snapshot, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedMetadata {
    /// Relying party entity ID.
    pub entity_id: String,
    /// `WantAssertionsSigned`.
    #[serde(default)]
    pub sign_assertions: bool,
    /// `AuthnRequestsSigned`.
    #[serde(default)]
    pub sign_authn_request: bool,
    /// Organization display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// First contact person.
    #[serde(default)]
    pub contact_person: Option<ContactPerson>,
    /// Base64 DER certificates with `use="signing"` or no `use`.
    #[serde(default)]
    pub signing_certificates: Vec<String>,
    /// Base64 DER certificates with `use="encryption"` or no `use`.
    #[serde(default)]
    pub encryption_certificates: Vec<String>,
    /// Supported name ID formats, in document order.
    #[serde(default)]
    pub name_id_formats: Vec<String>,
    /// Assertion consumer services, in document order.
    #[serde(default)]
    pub assertion_consumer_services: Vec<Endpoint>,
    /// Single logout services, in document order.
    #[serde(default)]
    pub single_logout_services: Vec<Endpoint>,
    /// When the document was fetched.
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PersistedMetadata {
    /// Returns the default assertion consumer service.
    ///
    /// Prefers `isDefault="true"`, then the lowest index, then document order.
    #[must_use]
    pub fn default_acs(&self) -> Option<&Endpoint> {
        self.assertion_consumer_services
            .iter()
            .find(|e| e.is_default)
            .or_else(|| {
                self.assertion_consumer_services
                    .iter()
                    .filter(|e| e.index.is_some())
                    .min_by_key(|e| e.index)
            })
            .or_else(|| self.assertion_consumer_services.first())
    }

    /// Parses the published encryption certificates.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Key`] if a certificate does not parse.
    pub fn encryption_certs(&self) -> SamlResult<Vec<Certificate>> {
        self.encryption_certificates
            .iter()
            .map(|c| Certificate::from_base64(c).map_err(SamlError::from))
            .collect()
    }
}

/// A fetched, not yet trusted, `md:EntityDescriptor`.
#[derive(Debug, Clone)]
pub struct IncomingMetadata {
    document: Document,
    metadata: PersistedMetadata,
}

impl IncomingMetadata {
    /// Parses a metadata document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed XML and
    /// [`SamlError::MissingElement`] if the root is not an entity descriptor
    /// or has no `SPSSODescriptor`.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let document = Document::parse(xml)?;
        let root = &document.root;
        if !root.is(MD_NS, "EntityDescriptor") {
            return Err(SamlError::MissingElement("md:EntityDescriptor".to_string()));
        }
        let entity_id = root
            .attribute("entityID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SamlError::MissingElement("EntityDescriptor/@entityID".to_string()))?
            .to_string();
        let sp = root
            .child(MD_NS, "SPSSODescriptor")
            .ok_or_else(|| SamlError::MissingElement("md:SPSSODescriptor".to_string()))?;

        let mut signing_certificates = Vec::new();
        let mut encryption_certificates = Vec::new();
        for descriptor in sp.children_named(MD_NS, "KeyDescriptor") {
            let usage = descriptor.attribute("use");
            for cert in descriptor.descendants(XMLDSIG_NS, "X509Certificate") {
                let body: String = cert.text().split_whitespace().collect();
                if usage != Some("encryption") {
                    signing_certificates.push(body.clone());
                }
                if usage != Some("signing") {
                    encryption_certificates.push(body);
                }
            }
        }

        let metadata = PersistedMetadata {
            sign_assertions: bool_attribute(sp, "WantAssertionsSigned"),
            sign_authn_request: bool_attribute(sp, "AuthnRequestsSigned"),
            display_name: root
                .child(MD_NS, "Organization")
                .and_then(|org| org.child(MD_NS, "OrganizationDisplayName"))
                .map(|n| n.text().trim().to_string()),
            contact_person: root.child(MD_NS, "ContactPerson").map(parse_contact),
            signing_certificates,
            encryption_certificates,
            name_id_formats: sp
                .children_named(MD_NS, "NameIDFormat")
                .map(|f| f.text().trim().to_string())
                .collect(),
            assertion_consumer_services: endpoints(sp, "AssertionConsumerService"),
            single_logout_services: endpoints(sp, "SingleLogoutService"),
            entity_id,
            fetched_at: None,
        };

        Ok(Self { document, metadata })
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.metadata.entity_id
    }

    /// Returns the parsed attributes.
    #[must_use]
    pub const fn attributes(&self) -> &PersistedMetadata {
        &self.metadata
    }

    /// Returns the parsed document.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Returns true if the entity descriptor carries an enveloped signature.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        is_signed(&self.document.root)
    }

    /// Converts into the stored snapshot.
    #[must_use]
    pub fn into_persisted(self, fetched_at: DateTime<Utc>) -> PersistedMetadata {
        PersistedMetadata {
            fetched_at: Some(fetched_at),
            ..self.metadata
        }
    }
}

fn bool_attribute(element: &Element, name: &str) -> bool {
    matches!(element.attribute(name), Some("true" | "1"))
}

fn endpoints(sp: &Element, local_name: &str) -> Vec<Endpoint> {
    sp.children_named(MD_NS, local_name)
        .filter_map(|e| {
            Some(Endpoint {
                binding: e.attribute("Binding")?.to_string(),
                location: e.attribute("Location")?.to_string(),
                index: e.attribute("index").and_then(|i| i.parse().ok()),
                is_default: bool_attribute(e, "isDefault"),
            })
        })
        .collect()
}

fn parse_contact(contact: &Element) -> ContactPerson {
    let text = |name: &str| contact.child(MD_NS, name).map(|e| e.text().trim().to_string());
    ContactPerson {
        contact_type: contact.attribute("contactType").map(str::to_string),
        company: text("Company"),
        given_name: text("GivenName"),
        surname: text("SurName"),
        email_address: text("EmailAddress"),
        telephone_number: text("TelephoneNumber"),
    }
}
