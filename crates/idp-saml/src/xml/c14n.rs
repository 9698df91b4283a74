//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! A namespace declaration is emitted on an element only when the element
//! or one of its attributes uses the prefix and the nearest output ancestor
//! did not already emit the same binding. Prefixes named in an
//! `InclusiveNamespaces` list are treated as always used.

use std::collections::BTreeMap;

use super::dom::{Element, Node};
use super::escape::{escape_attr, escape_text};

/// Canonicalizes `element` and its subtree.
///
/// `exclude` removes one descendant and its subtree from the output, which
/// is how the enveloped-signature transform is applied.
#[must_use]
pub fn canonicalize(element: &Element, exclude: Option<&Element>, inclusive_prefixes: &[String]) -> String {
    let mut out = String::new();
    let rendered = BTreeMap::new();
    write_element(&mut out, element, &rendered, exclude, inclusive_prefixes);
    out
}

fn write_element(
    out: &mut String,
    element: &Element,
    rendered: &BTreeMap<String, String>,
    exclude: Option<&Element>,
    inclusive_prefixes: &[String],
) {
    let mut utilized: Vec<String> = Vec::new();
    utilized.push(element.prefix.clone().unwrap_or_default());
    for attr in &element.attributes {
        if let Some(prefix) = &attr.prefix {
            utilized.push(prefix.clone());
        }
    }
    for prefix in inclusive_prefixes {
        let key = if prefix == "#default" { String::new() } else { prefix.clone() };
        if element.lookup_namespace(&key).is_some() {
            utilized.push(key);
        }
    }
    utilized.sort();
    utilized.dedup();

    let mut scope = rendered.clone();
    let mut declarations: Vec<(String, String)> = Vec::new();
    for prefix in utilized {
        if prefix == "xml" {
            continue;
        }
        let uri = element.lookup_namespace(&prefix).unwrap_or("").to_string();
        let already = rendered.get(&prefix).map_or("", String::as_str);
        let needs_output = if prefix.is_empty() {
            uri != already
        } else {
            !uri.is_empty() && rendered.get(&prefix) != Some(&uri)
        };
        if needs_output {
            scope.insert(prefix.clone(), uri.clone());
            declarations.push((prefix, uri));
        }
    }
    // Default namespace sorts first because its key is empty.
    declarations.sort();

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| {
        let a_key = (a.namespace.as_deref().unwrap_or(""), a.local_name.as_str());
        let b_key = (b.namespace.as_deref().unwrap_or(""), b.local_name.as_str());
        a_key.cmp(&b_key)
    });

    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);
    for (prefix, uri) in &declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attr(uri));
        out.push('"');
    }
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape_attr(&attr.value));
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => {
                if exclude.is_some_and(|x| std::ptr::eq(x, e)) {
                    continue;
                }
                write_element(out, e, &scope, exclude, inclusive_prefixes);
            }
            Node::Text(t) => out.push_str(&escape_text(t)),
            Node::ProcessingInstruction(pi) => {
                out.push_str("<?");
                out.push_str(pi);
                out.push_str("?>");
            }
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    fn c14n(xml: &str) -> String {
        let doc = Document::parse(xml).unwrap();
        canonicalize(&doc.root, None, &[])
    }

    #[test]
    fn expands_empty_elements_and_sorts_attributes() {
        assert_eq!(c14n(r#"<a z="1" b="2"><c/></a>"#), r#"<a b="2" z="1"><c></c></a>"#);
    }

    #[test]
    fn drops_unused_namespace_declarations() {
        assert_eq!(
            c14n(r#"<a xmlns:x="urn:x" xmlns:y="urn:y"><x:b/></a>"#),
            r#"<a><x:b xmlns:x="urn:x"></x:b></a>"#
        );
    }

    #[test]
    fn does_not_repeat_inherited_declarations() {
        assert_eq!(
            c14n(r#"<x:a xmlns:x="urn:x"><x:b xmlns:x="urn:x"/></x:a>"#),
            r#"<x:a xmlns:x="urn:x"><x:b></x:b></x:a>"#
        );
    }

    #[test]
    fn default_namespace_first_then_prefixes() {
        assert_eq!(
            c14n(r#"<a xmlns:z="urn:z" xmlns="urn:d" z:k="v" xmlns:b="urn:b" b:k="w"/>"#),
            r#"<a xmlns="urn:d" xmlns:b="urn:b" xmlns:z="urn:z" b:k="w" z:k="v"></a>"#
        );
    }

    #[test]
    fn unprefixed_attributes_sort_before_namespaced() {
        assert_eq!(
            c14n(r#"<a xmlns:n="urn:n" n:a="1" z="2"/>"#),
            r#"<a xmlns:n="urn:n" z="2" n:a="1"></a>"#
        );
    }

    #[test]
    fn undeclares_default_namespace_when_needed() {
        assert_eq!(
            c14n(r#"<a xmlns="urn:d"><b xmlns=""/></a>"#),
            r#"<a xmlns="urn:d"><b xmlns=""></b></a>"#
        );
    }

    #[test]
    fn strips_comments_declaration_and_escapes() {
        assert_eq!(
            c14n("<?xml version=\"1.0\"?>\n<a t=\"&quot;\"><!-- c -->x &amp; y &gt; z</a>"),
            "<a t=\"&quot;\">x &amp; y &gt; z</a>"
        );
    }

    #[test]
    fn subtree_renders_inherited_namespace() {
        let doc = Document::parse(
            r#"<samlp:Response xmlns:samlp="urn:p" xmlns:saml="urn:a"><saml:Assertion ID="_1"><saml:Issuer>i</saml:Issuer></saml:Assertion></samlp:Response>"#,
        )
        .unwrap();
        let assertion = doc.root.elements().next().unwrap();
        assert_eq!(
            canonicalize(assertion, None, &[]),
            r#"<saml:Assertion xmlns:saml="urn:a" ID="_1"><saml:Issuer>i</saml:Issuer></saml:Assertion>"#
        );
    }

    #[test]
    fn excluded_subtree_is_omitted() {
        let doc = Document::parse(r#"<a><b/><sig/><c/></a>"#).unwrap();
        let sig = doc.root.elements().nth(1).unwrap();
        assert_eq!(canonicalize(&doc.root, Some(sig), &[]), "<a><b></b><c></c></a>");
    }

    #[test]
    fn inclusive_prefixes_are_always_rendered() {
        let doc = Document::parse(r#"<a xmlns:xs="urn:xs"><b/></a>"#).unwrap();
        assert_eq!(
            canonicalize(&doc.root, None, &["xs".to_string()]),
            r#"<a xmlns:xs="urn:xs"><b></b></a>"#
        );
    }
}
