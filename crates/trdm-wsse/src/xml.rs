//! Minimal owned XML element tree.
//!
//! Elements keep namespace declarations separate from ordinary attributes
//! and preserve text exactly as parsed, which is what canonicalization
//! needs. Positions inside a tree are addressed by child-index paths so a
//! subtree can be canonicalized with its ancestors' namespace context.

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{WsseError, WsseResult};

/// A possibly prefixed element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    prefix: Option<String>,
    local: String,
}

impl QName {
    /// Split `prefix:local`; a name without a colon has no prefix.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => Self {
                prefix: None,
                local: raw.to_string(),
            },
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its namespace declarations, attributes, and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: QName,
    /// `(prefix, uri)`; the default namespace uses an empty prefix.
    namespaces: Vec<(String, String)>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: QName::parse(name),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.declare_namespace(prefix, uri);
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        match self.namespaces.iter_mut().find(|(p, _)| p == prefix) {
            Some(slot) => slot.1 = uri.to_string(),
            None => self.namespaces.push((prefix.to_string(), uri.to_string())),
        }
    }

    /// Set an attribute by qualified name, replacing an existing value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let qname = QName::parse(name);
        match self.attributes.iter_mut().find(|a| a.name == qname) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute { name: qname, value }),
        }
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a trailing text node.
    pub fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// Replace all direct text content.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.retain(|c| matches!(c, Node::Element(_)));
        self.children.push(Node::Text(text.into()));
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Attribute value by qualified name as written (`wsu:Id`, `URI`).
    pub fn attr(&self, name: &str) -> Option<&str> {
        let qname = QName::parse(name);
        self.attributes
            .iter()
            .find(|a| a.name == qname)
            .map(|a| a.value.as_str())
    }

    /// Attribute value by local name, ignoring any prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local() == local)
            .map(|a| a.value.as_str())
    }

    /// The `Id` / `wsu:Id` attribute, if any.
    pub fn id(&self) -> Option<&str> {
        self.attr_local("Id")
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name.local() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.name.local() == local)
    }

    /// Follow a chain of local names through direct children.
    pub fn descend(&self, locals: &[&str]) -> Option<&Element> {
        locals.iter().try_fold(self, |el, local| el.child(local))
    }

    /// Depth-first search (self included) for the first matching element.
    pub fn find(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        if pred(self) {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find(pred))
    }

    pub fn find_local(&self, local: &str) -> Option<&Element> {
        self.find(&|e| e.name.local() == local)
    }

    /// Child-index path to the first matching element (empty for `self`).
    pub fn find_path(&self, pred: &dyn Fn(&Element) -> bool) -> Option<Vec<usize>> {
        if pred(self) {
            return Some(Vec::new());
        }
        for (idx, child) in self.children.iter().enumerate() {
            if let Node::Element(e) = child {
                if let Some(mut path) = e.find_path(pred) {
                    path.insert(0, idx);
                    return Some(path);
                }
            }
        }
        None
    }

    pub fn path_to_id(&self, id: &str) -> Option<Vec<usize>> {
        self.find_path(&|e| e.id() == Some(id))
    }

    /// Number of elements in this subtree carrying the id.
    pub fn count_id(&self, id: &str) -> usize {
        let own = usize::from(self.id() == Some(id));
        own + self.child_elements().map(|c| c.count_id(id)).sum::<usize>()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.find(&|e| e.id() == Some(id))
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        path.iter().try_fold(self, |el, &idx| match el.children.get(idx) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        })
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut el = self;
        for &idx in path {
            el = match el.children.get_mut(idx) {
                Some(Node::Element(e)) => e,
                _ => return None,
            };
        }
        Some(el)
    }

    /// Namespaces declared by the ancestors of the element at `path`,
    /// innermost declaration winning. The element's own declarations are
    /// not included.
    pub fn ancestor_namespaces(&self, path: &[usize]) -> BTreeMap<String, String> {
        let mut scope = BTreeMap::new();
        let mut el = self;
        for &idx in path {
            for (prefix, uri) in &el.namespaces {
                scope.insert(prefix.clone(), uri.clone());
            }
            match el.children.get(idx) {
                Some(Node::Element(e)) => el = e,
                _ => break,
            }
        }
        scope
    }

    /// Serialize as-is: declarations where they were made, attributes in
    /// insertion order, empty elements self-closed.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_plain(&mut out);
        out
    }

    fn write_plain(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name.to_string());
        for (prefix, uri) in &self.namespaces {
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
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name.to_string());
            out.push_str("=\"");
            escape_attr(&attr.value, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_plain(out),
                Node::Text(t) => escape_text(t, out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name.to_string());
        out.push('>');
    }
}

/// Escape character data: `&`, `<`, `>`, and carriage return.
pub fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

/// Parse a document into its root element.
///
/// Comments, processing instructions, and the XML declaration are dropped.
/// Text, including whitespace, is kept verbatim so signed subtrees
/// canonicalize to the same bytes the sender digested.
pub fn parse(input: &str) -> WsseResult<Element> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| WsseError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let el = element_from_start(&start)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| WsseError::Xml("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| WsseError::Xml(e.to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(WsseError::Xml("text outside the root element".into())),
                }
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                let text = std::str::from_utf8(&raw).map_err(|e| WsseError::Xml(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(WsseError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| WsseError::Xml("document has no root element".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> WsseResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_child(el);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        None => Err(WsseError::Xml("multiple root elements".into())),
    }
}

fn element_from_start(start: &BytesStart<'_>) -> WsseResult<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| WsseError::Xml(e.to_string()))?
        .to_string();
    let mut el = Element::new(&name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| WsseError::Xml(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| WsseError::Xml(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| WsseError::Xml(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            el.declare_namespace("", &value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            el.declare_namespace(prefix, &value);
        } else {
            el.attributes.push(Attribute {
                name: QName::parse(&key),
                value,
            });
        }
    }
    Ok(el)
}
