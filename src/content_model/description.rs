//! The in-memory description a `ContentModel` parses a row into and
//! serializes back to a `Graph` (spec §6.2's `parse`/`serialize`).
//!
//! Embedded (hash-URI) sub-objects are represented as nested `Description`
//! values rather than owning pointers, per the Design Notes: everything is
//! addressed by URI, and the only thing that distinguishes an embedded
//! object from a top-level one is that its URI is the parent's stem plus a
//! `#fragment`.

use std::collections::BTreeMap;

/// One property value: either an object-property URI or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Uri(String),
    Literal(LiteralValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralValue {
    pub value: String,
    pub lang: Option<String>,
    pub datatype: Option<String>,
}

impl PropertyValue {
    pub fn literal(value: impl Into<String>) -> Self {
        PropertyValue::Literal(LiteralValue {
            value: value.into(),
            lang: None,
            datatype: None,
        })
    }

    pub fn uri(value: impl Into<String>) -> Self {
        PropertyValue::Uri(value.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            PropertyValue::Uri(u) => u,
            PropertyValue::Literal(l) => &l.value,
        }
    }
}

/// A parsed resource: its own URI, its scalar/multi-valued property slots,
/// its embedded sub-objects (keyed by attribute name, each carrying its own
/// fragment id), and the `rdf:type` values to stamp on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub uri: String,
    pub values: BTreeMap<String, Vec<PropertyValue>>,
    pub embedded: BTreeMap<String, Vec<EmbeddedDescription>>,
    pub rdf_type: Vec<String>,
}

/// An embedded object: its fragment id (stable across runs via the `INDEX`
/// column) plus its own description.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDescription {
    pub fragment_id: String,
    pub description: Description,
}

impl Description {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn set(&mut self, attr: &str, values: Vec<PropertyValue>) {
        if values.is_empty() {
            self.values.remove(attr);
        } else {
            self.values.insert(attr.to_string(), values);
        }
    }

    pub fn get(&self, attr: &str) -> &[PropertyValue] {
        self.values.get(attr).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_changes(&self, other: &Description) -> bool {
        self != other
    }
}

impl EmbeddedDescription {
    /// The embedded object's own hash URI: the parent stem plus `#fragment`.
    pub fn fragment_uri(parent_uri: &str, fragment_id: &str) -> String {
        let stem = parent_uri.split('#').next().unwrap_or(parent_uri);
        format!("{stem}#{fragment_id}")
    }
}
