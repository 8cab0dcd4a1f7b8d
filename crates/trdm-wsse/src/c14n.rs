//! Exclusive XML canonicalization (without comments).
//!
//! A namespace declaration is rendered on an element only when that
//! element visibly uses the prefix (its own name or one of its attribute
//! names) or the prefix is on the `InclusiveNamespaces` list, and only if
//! the nearest output ancestor has not already rendered the same binding.
//! Declarations come first sorted by prefix, then attributes sorted by
//! `(namespace URI, local name)` with unqualified attributes first. Empty
//! elements are written as start/end tag pairs.

use std::collections::{BTreeMap, BTreeSet};

use trdm_crypto::Digest512;

use crate::error::{WsseError, WsseResult};
use crate::ns;
use crate::xml::{escape_attr, escape_text, Element, Node};

/// Canonicalize the element at `path` within `root`.
///
/// Namespace bindings declared by ancestors are in scope for the subtree;
/// whether they are rendered follows the exclusive rules above.
pub fn canonicalize(root: &Element, path: &[usize], inclusive: &[String]) -> WsseResult<Vec<u8>> {
    let apex = root
        .at_path(path)
        .ok_or_else(|| WsseError::MissingElement(format!("path {path:?}")))?;
    let scope = root.ancestor_namespaces(path);
    let mut out = String::new();
    write_element(apex, &scope, &BTreeMap::new(), inclusive, &mut out)?;
    Ok(out.into_bytes())
}

/// Canonicalize the unique element carrying `Id`/`wsu:Id` = `id`.
pub fn canonicalize_by_id(root: &Element, id: &str, inclusive: &[String]) -> WsseResult<Vec<u8>> {
    let count = root.count_id(id);
    if count != 1 {
        return Err(WsseError::AmbiguousId {
            id: id.to_string(),
            count,
        });
    }
    let path = root
        .path_to_id(id)
        .ok_or_else(|| WsseError::MissingElement(format!("#{id}")))?;
    canonicalize(root, &path, inclusive)
}

/// SHA-512 of the canonical form of the element carrying `id`.
pub fn digest_by_id(root: &Element, id: &str, inclusive: &[String]) -> WsseResult<Digest512> {
    Ok(Digest512::of(&canonicalize_by_id(root, id, inclusive)?))
}

/// Split an `InclusiveNamespaces/@PrefixList`; `#default` names the
/// default namespace.
pub fn parse_prefix_list(list: &str) -> Vec<String> {
    list.split_whitespace()
        .map(|p| if p == "#default" { String::new() } else { p.to_string() })
        .collect()
}

fn write_element(
    el: &Element,
    parent_scope: &BTreeMap<String, String>,
    rendered: &BTreeMap<String, String>,
    inclusive: &[String],
    out: &mut String,
) -> WsseResult<()> {
    let mut scope = parent_scope.clone();
    for (prefix, uri) in el.namespaces() {
        scope.insert(prefix.clone(), uri.clone());
    }

    let mut utilized: BTreeSet<&str> = BTreeSet::new();
    utilized.insert(el.name().prefix().unwrap_or(""));
    for attr in el.attributes() {
        if let Some(prefix) = attr.name.prefix() {
            utilized.insert(prefix);
        }
    }
    for prefix in inclusive {
        if scope.contains_key(prefix) {
            utilized.insert(prefix);
        }
    }

    let mut decls: Vec<(&str, &str)> = Vec::new();
    let mut now_rendered = rendered.clone();
    for prefix in utilized {
        if prefix == "xml" {
            continue;
        }
        let uri = match scope.get(prefix) {
            Some(uri) => uri.as_str(),
            None if prefix.is_empty() => "",
            None => return Err(WsseError::UnboundPrefix(prefix.to_string())),
        };
        let current = rendered.get(prefix).map(String::as_str);
        let needed = if prefix.is_empty() {
            current.unwrap_or("") != uri
        } else {
            current != Some(uri)
        };
        if needed {
            decls.push((prefix, uri));
            now_rendered.insert(prefix.to_string(), uri.to_string());
        }
    }

    let mut attrs = Vec::with_capacity(el.attributes().len());
    for attr in el.attributes() {
        let uri = match attr.name.prefix() {
            None => "",
            Some("xml") => ns::XML,
            Some(prefix) => scope
                .get(prefix)
                .map(String::as_str)
                .ok_or_else(|| WsseError::UnboundPrefix(prefix.to_string()))?,
        };
        attrs.push((uri, attr.name.local(), attr));
    }
    attrs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let tag = el.name().to_string();
    out.push('<');
    out.push_str(&tag);
    for (prefix, uri) in decls {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attr(uri, out);
        out.push('"');
    }
    for (_, _, attr) in attrs {
        out.push(' ');
        out.push_str(&attr.name.to_string());
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }
    out.push('>');

    for child in el.children() {
        match child {
            Node::Element(c) => write_element(c, &scope, &now_rendered, inclusive, out)?,
            Node::Text(t) => escape_text(t, out),
        }
    }

    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use proptest::prelude::*;

    fn canon_str(root: &Element, path: &[usize], inclusive: &[&str]) -> String {
        let inclusive: Vec<String> = inclusive.iter().map(|s| s.to_string()).collect();
        String::from_utf8(canonicalize(root, path, &inclusive).unwrap()).unwrap()
    }

    const DOC: &str = r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b" xmlns:c="urn:c"><a:child b:attr="1" z="2" y="&amp;"><c:leaf/></a:child></a:root>"#;

    #[test]
    fn renders_only_utilized_namespaces() {
        let root = parse(DOC).unwrap();
        assert_eq!(
            canon_str(&root, &[0], &[]),
            r#"<a:child xmlns:a="urn:a" xmlns:b="urn:b" y="&amp;" z="2" b:attr="1"><c:leaf xmlns:c="urn:c"></c:leaf></a:child>"#
        );
    }

    #[test]
    fn inclusive_prefix_rendered_at_apex_only() {
        let root = parse(DOC).unwrap();
        assert_eq!(
            canon_str(&root, &[0], &["c"]),
            r#"<a:child xmlns:a="urn:a" xmlns:b="urn:b" xmlns:c="urn:c" y="&amp;" z="2" b:attr="1"><c:leaf></c:leaf></a:child>"#
        );
    }

    #[test]
    fn inclusive_prefix_out_of_scope_is_ignored() {
        let root = parse(DOC).unwrap();
        assert_eq!(
            canon_str(&root, &[0, 0], &["ret", "soap"]),
            r#"<c:leaf xmlns:c="urn:c"></c:leaf>"#
        );
    }

    #[test]
    fn redundant_redeclaration_dropped() {
        let root = parse(r#"<p:a xmlns:p="urn:p"><p:b xmlns:p="urn:p"><p:c/></p:b></p:a>"#).unwrap();
        assert_eq!(
            canon_str(&root, &[], &[]),
            r#"<p:a xmlns:p="urn:p"><p:b><p:c></p:c></p:b></p:a>"#
        );
    }

    #[test]
    fn rebinding_is_rendered() {
        let root = parse(r#"<p:a xmlns:p="urn:one"><p:b xmlns:p="urn:two"/></p:a>"#).unwrap();
        assert_eq!(
            canon_str(&root, &[], &[]),
            r#"<p:a xmlns:p="urn:one"><p:b xmlns:p="urn:two"></p:b></p:a>"#
        );
    }

    #[test]
    fn default_namespace_inherited_by_subtree() {
        let root = parse(r#"<root xmlns="urn:d"><child x="1"/></root>"#).unwrap();
        assert_eq!(
            canon_str(&root, &[0], &[]),
            r#"<child xmlns="urn:d" x="1"></child>"#
        );
    }

    #[test]
    fn unused_namespace_declarations_dropped() {
        let root = parse(r#"<r xmlns:unused="urn:u"><x/></r>"#).unwrap();
        assert_eq!(canon_str(&root, &[], &[]), "<r><x></x></r>");
        assert_eq!(canon_str(&root, &[], &["#default"]), "<r><x></x></r>");
    }

    #[test]
    fn escapes_text_and_attributes() {
        let root = Element::new("e")
            .with_attr("v", "\t\n\"<>&")
            .with_text("a<b>&\r\"");
        assert_eq!(
            canon_str(&root, &[], &[]),
            "<e v=\"&#x9;&#xA;&quot;&lt;>&amp;\">a&lt;b&gt;&amp;&#xD;\"</e>"
        );
    }

    #[test]
    fn unbound_prefix_is_an_error() {
        let root = Element::new("x:orphan");
        assert!(matches!(
            canonicalize(&root, &[], &[]),
            Err(WsseError::UnboundPrefix(p)) if p == "x"
        ));
    }

    #[test]
    fn xml_prefix_needs_no_declaration() {
        let root = Element::new("e").with_attr("xml:lang", "en");
        assert_eq!(canon_str(&root, &[], &[]), r#"<e xml:lang="en"></e>"#);
    }

    #[test]
    fn by_id_requires_unique_id() {
        let root = Element::new("r")
            .with_child(Element::new("a").with_attr("Id", "dup"))
            .with_child(Element::new("b").with_attr("Id", "dup"));
        assert!(matches!(
            canonicalize_by_id(&root, "dup", &[]),
            Err(WsseError::AmbiguousId { count: 2, .. })
        ));
        assert!(matches!(
            canonicalize_by_id(&root, "none", &[]),
            Err(WsseError::AmbiguousId { count: 0, .. })
        ));
    }

    #[test]
    fn prefix_list_parsing() {
        assert_eq!(parse_prefix_list("wsse ret  soap"), vec!["wsse", "ret", "soap"]);
        assert_eq!(parse_prefix_list("#default ret"), vec!["", "ret"]);
        assert!(parse_prefix_list("").is_empty());
    }

    proptest! {
        #[test]
        fn canonical_form_is_deterministic(
            text in "[a-zA-Z0-9 <>&\"'\\n\\t\\r]{0,40}",
            value in "[a-zA-Z0-9 <>&\"'\\n\\t\\r]{0,40}",
        ) {
            let root = Element::new("s:Body")
                .with_namespace("s", "urn:s")
                .with_child(Element::new("s:v").with_attr("k", value).with_text(text));
            let first = canonicalize(&root, &[], &[]).unwrap();
            let second = canonicalize(&root, &[], &[]).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(Digest512::of(&first), Digest512::of(&second));
        }

        #[test]
        fn canonical_form_survives_serialize_and_parse(
            text in "[a-zA-Z0-9 <>&\"'\\n\\t\\r]{0,40}",
            value in "[a-zA-Z0-9 <>&\"'\\n\\t\\r]{0,40}",
        ) {
            let root = Element::new("s:Body")
                .with_namespace("s", "urn:s")
                .with_namespace("unused", "urn:u")
                .with_child(Element::new("s:v").with_attr("k", value).with_text(text));
            let reparsed = parse(&root.to_xml_string()).unwrap();
            prop_assert_eq!(
                canonicalize(&root, &[], &[]).unwrap(),
                canonicalize(&reparsed, &[], &[]).unwrap()
            );
        }
    }
}
