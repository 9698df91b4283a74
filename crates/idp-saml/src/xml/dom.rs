//! Namespace-aware element tree built from `quick-xml` events.
//!
//! Comments and the XML declaration are dropped. Document type declarations
//! are rejected outright. Each element keeps its byte span in the source so
//! that signatures can be spliced into the original text.

use std::collections::BTreeMap;
use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The document element.
    pub root: Element,
}

/// A child node.
#[derive(Debug, Clone)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data with entities resolved.
    Text(String),
    /// Processing instruction body (`target data`).
    ProcessingInstruction(String),
}

/// An attribute with its namespace resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI. Unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Normalized value with entities resolved.
    pub value: String,
}

impl Attribute {
    /// Returns `prefix:local` or `local`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }
}

/// An element with its namespace resolved.
#[derive(Debug, Clone)]
pub struct Element {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI.
    pub namespace: Option<String>,
    /// Attributes other than namespace declarations, in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
    scope: BTreeMap<String, String>,
    span: Range<usize>,
    start_tag_end: usize,
}

impl Document {
    /// Parses a document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed input, a DOCTYPE, an
    /// unbound prefix, or content outside the document element.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let start = reader.buffer_position();
            let event = reader.read_event()?;
            let end = reader.buffer_position();

            match event {
                Event::Start(e) => {
                    let scope = stack.last().map_or_else(base_scope, |p| p.scope.clone());
                    stack.push(open_element(&e, scope, start, end)?);
                }
                Event::Empty(e) => {
                    let scope = stack.last().map_or_else(base_scope, |p| p.scope.clone());
                    let element = open_element(&e, scope, start, end)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unexpected end tag".to_string()))?;
                    element.span.end = end;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    let raw = utf8(&t)?;
                    let text = quick_xml::escape::unescape(&normalize_newlines(raw))
                        .map_err(|e| SamlError::XmlParse(e.to_string()))?
                        .into_owned();
                    push_text(&mut stack, text)?;
                }
                Event::CData(c) => {
                    let text = normalize_newlines(utf8(&c)?);
                    push_text(&mut stack, text)?;
                }
                Event::PI(p) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::ProcessingInstruction(utf8(&p)?.to_string()));
                    }
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
                }
                Event::Comment(_) | Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(SamlError::XmlParse("unclosed element".to_string()));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| SamlError::XmlParse("no document element".to_string()))
    }
}

impl Element {
    /// Returns `prefix:local` or `local`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Looks up an unprefixed attribute.
    #[must_use]
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(namespace, local_name))
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(namespace, local_name))
    }

    /// Collects all descendant elements with the given name, in document order.
    #[must_use]
    pub fn descendants(&self, namespace: &str, local_name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        for child in self.elements() {
            if child.is(namespace, local_name) {
                found.push(child);
            }
            found.extend(child.descendants(namespace, local_name));
        }
        found
    }

    /// Finds this element or a descendant whose `ID` (or `Id`) equals `id`.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.attribute("ID").or_else(|| self.attribute("Id")) == Some(id) {
            return Some(self);
        }
        self.elements().find_map(|child| child.find_by_id(id))
    }

    /// Concatenates direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns the namespace bound to `prefix` (`""` for the default).
    #[must_use]
    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.scope.get(prefix).map(String::as_str)
    }

    /// Byte range of the whole element in the source.
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Byte offset just past the start tag.
    #[must_use]
    pub const fn start_tag_end(&self) -> usize {
        self.start_tag_end
    }
}

fn base_scope() -> BTreeMap<String, String> {
    BTreeMap::from([("xml".to_string(), XML_NS.to_string())])
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn utf8(bytes: &[u8]) -> SamlResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

// Attribute value normalization: literal whitespace becomes a space,
// character references are kept.
fn normalize_attribute(raw: &str) -> SamlResult<String> {
    let spaced: String = raw
        .replace("\r\n", " ")
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect();
    quick_xml::escape::unescape(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn open_element(
    e: &BytesStart<'_>,
    mut scope: BTreeMap<String, String>,
    start: usize,
    end: usize,
) -> SamlResult<Element> {
    let mut raw_attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = normalize_attribute(utf8(&attr.value)?)?;
        if key == "xmlns" {
            if value.is_empty() {
                scope.remove("");
            } else {
                scope.insert(String::new(), value);
            }
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value);
        } else {
            raw_attributes.push((key, value));
        }
    }

    let qname = utf8(e.name().as_ref())?.to_string();
    let (prefix, local) = split_qname(&qname);
    let namespace = match prefix {
        Some(p) => Some(
            scope
                .get(p)
                .cloned()
                .ok_or_else(|| SamlError::XmlParse(format!("unbound prefix '{p}' on {qname}")))?,
        ),
        None => scope.get("").cloned(),
    };

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_namespace = match attr_prefix {
            Some(p) => Some(
                scope
                    .get(p)
                    .cloned()
                    .ok_or_else(|| SamlError::XmlParse(format!("unbound prefix '{p}' on {key}")))?,
            ),
            None => None,
        };
        attributes.push(Attribute {
            prefix: attr_prefix.map(str::to_string),
            local_name: attr_local.to_string(),
            namespace: attr_namespace,
            value,
        });
    }

    Ok(Element {
        prefix: prefix.map(str::to_string),
        local_name: local.to_string(),
        namespace,
        attributes,
        children: Vec::new(),
        scope,
        span: start..end,
        start_tag_end: end,
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> SamlResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        Ok(())
    } else if root.is_some() {
        Err(SamlError::XmlParse("multiple document elements".to_string()))
    } else {
        *root = Some(element);
        Ok(())
    }
}

fn push_text(stack: &mut [Element], text: String) -> SamlResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            if !text.is_empty() {
                parent.children.push(Node::Text(text));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(SamlError::XmlParse(
            "text outside the document element".to_string(),
        )),
    }
}
