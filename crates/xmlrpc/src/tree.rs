//! A small owned XML element tree built on `xml-rs`.
//!
//! Both the XML-RPC and SOAP decoders walk whole documents, so the pull events
//! are collected into [`Element`]s once and inspected from there. Namespaces
//! are kept but lookups go by local name.

use std::borrow::Cow;

use api::ApiError;
use xml::Encoding;
use xml::reader::{ParserConfig, XmlEvent};

/// One attribute of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub value: String,
}

/// An XML element with its attributes, child elements and text content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local name, without prefix.
    pub name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Element>,
    /// Concatenated character data directly inside this element.
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Value of the attribute with the given local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Depth-first search for the first descendant (or self) with the given
    /// local name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Every descendant (and self) with the given local name, in document order.
    pub fn find_all<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.find_all(name, found);
        }
    }
}

/// Parses a complete document into its root element.
///
/// `text` is already decoded, so any `encoding` in the XML declaration is
/// ignored. Malformed XML maps to a not-well-formed error (-32700).
pub fn parse(text: &str) -> Result<Element, ApiError> {
    let reader = ParserConfig::new()
        .trim_whitespace(false)
        .whitespace_to_characters(true)
        .cdata_to_characters(true)
        .ignore_comments(true)
        .override_encoding(Some(Encoding::Utf8))
        .ignore_invalid_encoding_declarations(true)
        .create_reader(text.as_bytes());

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    for event in reader {
        let event = event.map_err(|e| ApiError::from_fault(-32700, format!("Malformed XML: {e}")))?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                stack.push(Element {
                    name: name.local_name,
                    prefix: name.prefix,
                    namespace: name.namespace,
                    attributes: attributes
                        .into_iter()
                        .map(|a| Attribute {
                            name: a.name.local_name,
                            prefix: a.name.prefix,
                            namespace: a.name.namespace,
                            value: a.value,
                        })
                        .collect(),
                    children: Vec::new(),
                    text: String::new(),
                });
            }
            XmlEvent::EndElement { .. } => {
                let Some(done) = stack.pop() else {
                    return Err(ApiError::from_fault(-32700, "Malformed XML: unbalanced end tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = Some(done),
                }
            }
            XmlEvent::Characters(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            _ => {}
        }
    }

    root.ok_or_else(|| ApiError::from_fault(-32700, "Malformed XML: no root element"))
}

/// Escapes text for use as element content.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    xml::escape::escape_str_pcdata(text)
}

/// Escapes text for use inside a double-quoted attribute.
pub fn escape_attr(text: &str) -> Cow<'_, str> {
    xml::escape::escape_str_attribute(text)
}
