//! The authenticated subject of an assertion.

use serde::{Deserialize, Serialize};

use super::constants::{attribute_name_formats, NameIdFormat};

/// One attribute asserted about the principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertedAttribute {
    /// Short name, emitted as `FriendlyName`.
    pub friendly_name: String,
    /// Attribute `Name`. Defaults to the friendly name.
    #[serde(default)]
    pub name: Option<String>,
    /// Attribute `NameFormat`. Defaults to the URI name format.
    #[serde(default)]
    pub name_format: Option<String>,
    /// Values, one `AttributeValue` each.
    #[serde(default)]
    pub values: Vec<String>,
}

impl AssertedAttribute {
    /// Creates an attribute with a single value.
    #[must_use]
    pub fn new(friendly_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            name: None,
            name_format: None,
            values: vec![value.into()],
        }
    }

    /// Creates an attribute with several values.
    #[must_use]
    pub fn multi<I, S>(friendly_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            friendly_name: friendly_name.into(),
            name: None,
            name_format: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the attribute `Name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the attribute `NameFormat`.
    #[must_use]
    pub fn with_name_format(mut self, name_format: impl Into<String>) -> Self {
        self.name_format = Some(name_format.into());
        self
    }

    /// Returns the `Name` to emit.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.friendly_name)
    }

    /// Returns the `NameFormat` to emit.
    #[must_use]
    pub fn effective_name_format(&self) -> &str {
        self.name_format
            .as_deref()
            .unwrap_or(attribute_name_formats::URI)
    }
}

/// The authenticated principal.
///
/// Built per response and never persisted. Attribute order is the order in
/// which attributes were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject `NameID` value.
    pub name_id: String,
    /// Subject `NameID` `Format` URI.
    pub name_id_format: String,
    /// Asserted attributes, in emission order.
    #[serde(default)]
    pub attributes: Vec<AssertedAttribute>,
}

impl Principal {
    /// Creates a principal with the email address name ID format.
    #[must_use]
    pub fn new(name_id: impl Into<String>) -> Self {
        Self {
            name_id: name_id.into(),
            name_id_format: NameIdFormat::default().uri().to_string(),
            attributes: Vec::new(),
        }
    }

    /// Sets the name ID format URI.
    #[must_use]
    pub fn with_name_id_format(mut self, format: impl Into<String>) -> Self {
        self.name_id_format = format.into();
        self
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AssertedAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Returns `(friendly_name, values)` pairs in emission order.
    #[must_use]
    pub fn to_mapping(&self) -> Vec<(&str, &[String])> {
        self.attributes
            .iter()
            .map(|a| (a.friendly_name.as_str(), a.values.as_slice()))
            .collect()
    }
}
