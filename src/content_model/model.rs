//! The content-model capability surface. A `ContentModel` is a plain
//! data description of one RDF resource shape — its header map, its
//! property rules, the `rdf:type`s it stamps — and `parse`/`serialize`/
//! `validate` are generic functions driven entirely by that description, so
//! adding a new model never requires new Rust code, only a new `ModelDef`
//! (spec §6.2, "a capability contract, not a class hierarchy").

use std::collections::BTreeMap;

use tracing::warn;

use crate::content_model::description::{Description, EmbeddedDescription, LiteralValue, PropertyValue};
use crate::content_model::header_map::HeaderMap;
use crate::content_model::validation::{ValidationResult, ValidationResults};
use crate::content_model::vocabulary::{UnreachableVocabularyFetcher, VocabularyCache, VocabularyFetcher};
use crate::rdf::{Graph, Literal, NamedNode, RdfObject, RdfPredicate, RdfSubject, Triple};

/// What kind of RDF term a property's values are rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Literal,
    Uri,
}

/// One property rule. `embed` turns this into an embedded-object slot: its
/// values are not literals/URIs directly on this resource but whole
/// sub-descriptions reached by a hash URI.
pub struct Property {
    pub attr: &'static str,
    pub predicate: &'static str,
    pub kind: PropertyKind,
    pub datatype: Option<&'static str>,
    pub required: bool,
    pub repeatable: bool,
    pub vocabulary: Option<&'static str>,
    pub embed: Option<&'static ModelDef>,
}

impl Property {
    pub const fn literal(attr: &'static str, predicate: &'static str) -> Self {
        Self {
            attr,
            predicate,
            kind: PropertyKind::Literal,
            datatype: None,
            required: false,
            repeatable: false,
            vocabulary: None,
            embed: None,
        }
    }

    pub const fn uri(attr: &'static str, predicate: &'static str) -> Self {
        Self {
            attr,
            predicate,
            kind: PropertyKind::Uri,
            datatype: None,
            required: false,
            repeatable: false,
            vocabulary: None,
            embed: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub const fn with_datatype(mut self, datatype: &'static str) -> Self {
        self.datatype = Some(datatype);
        self
    }

    pub const fn with_vocabulary(mut self, vocabulary: &'static str) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub const fn embedded(attr: &'static str, predicate: &'static str, model: &'static ModelDef) -> Self {
        Self {
            attr,
            predicate,
            kind: PropertyKind::Uri,
            datatype: None,
            required: false,
            repeatable: false,
            vocabulary: None,
            embed: Some(model),
        }
    }
}

/// The complete shape of one content model: name, column header map,
/// property rules, and `rdf:type` stamps.
pub struct ModelDef {
    pub name: &'static str,
    pub rdf_types: &'static [&'static str],
    pub header_map: fn() -> HeaderMap,
    pub properties: &'static [Property],
}

impl ModelDef {
    /// Build a `Description` from flat, dotted-path row data (already
    /// language/datatype-decorated per column) plus the embedded-object
    /// index recovered from the `INDEX` column.
    pub fn parse(&self, uri: &str, row: &RowFields, index: &EmbeddedIndex) -> Description {
        self.parse_at(uri, "", row, index)
    }

    fn parse_at(&self, uri: &str, prefix: &str, row: &RowFields, index: &EmbeddedIndex) -> Description {
        let mut description = Description::new(uri);
        description.rdf_type = self.rdf_types.iter().map(|s| s.to_string()).collect();

        for property in self.properties {
            let path = dotted(prefix, property.attr);
            match property.embed {
                Some(submodel) => {
                    let count = row.embedded_count(&path);
                    let mut slots = Vec::with_capacity(count);
                    for n in 0..count {
                        let fragment_id = index
                            .get(&path, n)
                            .map(str::to_string)
                            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                        let sub_uri = EmbeddedDescription::fragment_uri(uri, &fragment_id);
                        let sub_row = row.slot(&path, n);
                        let sub_description = submodel.parse_at(&sub_uri, "", &sub_row, index);
                        slots.push(EmbeddedDescription {
                            fragment_id,
                            description: sub_description,
                        });
                    }
                    if !slots.is_empty() {
                        description.embedded.insert(property.attr.to_string(), slots);
                    }
                }
                None => {
                    let values: Vec<PropertyValue> = row
                        .values(&path)
                        .into_iter()
                        .map(|v| match property.kind {
                            PropertyKind::Uri => PropertyValue::Uri(v.value),
                            PropertyKind::Literal => PropertyValue::Literal(LiteralValue {
                                value: v.value,
                                lang: v.lang,
                                datatype: v.datatype.or_else(|| property.datatype.map(str::to_string)),
                            }),
                        })
                        .collect();
                    description.set(property.attr, values);
                }
            }
        }
        description
    }

    /// Render a `Description` (and its embedded sub-objects) into an RDF
    /// graph.
    pub fn serialize(&self, description: &Description) -> Graph {
        let mut graph = Graph::new();
        self.serialize_into(description, &mut graph);
        graph
    }

    fn serialize_into(&self, description: &Description, graph: &mut Graph) {
        let subject = match NamedNode::new(&description.uri) {
            Ok(n) => RdfSubject::NamedNode(n),
            Err(_) => return,
        };
        for rdf_type in &description.rdf_type {
            if let Ok(t) = NamedNode::new(rdf_type) {
                if let Ok(p) = RdfPredicate::new("http://www.w3.org/1999/02/22-rdf-syntax-ns#type") {
                    graph.insert(Triple::new(subject.clone(), p, t.into()));
                }
            }
        }
        for property in self.properties {
            if property.embed.is_some() {
                if let Some(slots) = description.embedded.get(property.attr) {
                    let predicate = match RdfPredicate::new(property.predicate) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    let submodel = property.embed.unwrap();
                    for slot in slots {
                        if let Ok(obj) = NamedNode::new(&slot.description.uri) {
                            graph.insert(Triple::new(subject.clone(), predicate.clone(), obj.into()));
                        }
                        submodel.serialize_into(&slot.description, graph);
                    }
                }
                continue;
            }
            let Some(values) = description.values.get(property.attr) else {
                continue;
            };
            let predicate = match RdfPredicate::new(property.predicate) {
                Ok(p) => p,
                Err(_) => continue,
            };
            for value in values {
                let object = match value {
                    PropertyValue::Uri(u) => match NamedNode::new(u) {
                        Ok(n) => n.into(),
                        Err(_) => continue,
                    },
                    PropertyValue::Literal(l) => {
                        let literal = if let Some(lang) = &l.lang {
                            match Literal::new_language_tagged(&l.value, lang) {
                                Ok(lit) => lit,
                                Err(_) => Literal::new_simple(&l.value),
                            }
                        } else if let Some(datatype) = &l.datatype {
                            match NamedNode::new(datatype) {
                                Ok(dt) => Literal::new_typed(&l.value, dt),
                                Err(_) => Literal::new_simple(&l.value),
                            }
                        } else {
                            Literal::new_simple(&l.value)
                        };
                        literal.into()
                    }
                };
                graph.insert(Triple::new(subject.clone(), predicate.clone(), object));
            }
        }
    }

    /// Inverse of `serialize`: reconstruct a `Description` from a raw graph
    /// already rooted at `uri`. Grounded on `updatejob.py`'s
    /// `resource.describe(model_class)`, which re-describes a resource's
    /// graph after a SPARQL Update has been applied to it in memory, so the
    /// result can be handed to `validate` the same way a freshly parsed row
    /// would be.
    pub fn describe(&self, uri: &str, graph: &Graph) -> Description {
        let mut description = Description::new(uri);
        for triple in graph.iter() {
            if subject_is(&triple.subject, uri) && predicate_is(&triple.predicate, RDF_TYPE) {
                if let RdfObject::NamedNode(n) = &triple.object {
                    description.rdf_type.push(n.as_str().to_string());
                }
            }
        }
        for property in self.properties {
            match property.embed {
                Some(submodel) => {
                    let mut slots = Vec::new();
                    for triple in graph.iter() {
                        if !subject_is(&triple.subject, uri) || !predicate_is(&triple.predicate, property.predicate) {
                            continue;
                        }
                        if let RdfObject::NamedNode(n) = &triple.object {
                            let sub_uri = n.as_str().to_string();
                            let fragment_id = sub_uri.rsplit('#').next().unwrap_or(&sub_uri).to_string();
                            let sub_description = submodel.describe(&sub_uri, graph);
                            slots.push(EmbeddedDescription {
                                fragment_id,
                                description: sub_description,
                            });
                        }
                    }
                    if !slots.is_empty() {
                        description.embedded.insert(property.attr.to_string(), slots);
                    }
                }
                None => {
                    let mut values = Vec::new();
                    for triple in graph.iter() {
                        if !subject_is(&triple.subject, uri) || !predicate_is(&triple.predicate, property.predicate) {
                            continue;
                        }
                        let value = match &triple.object {
                            RdfObject::NamedNode(n) => PropertyValue::Uri(n.as_str().to_string()),
                            RdfObject::Literal(l) => PropertyValue::Literal(LiteralValue {
                                value: l.value().to_string(),
                                lang: l.language().map(str::to_string),
                                datatype: if l.language().is_some() || l.datatype().as_str() == XSD_STRING {
                                    None
                                } else {
                                    Some(l.datatype().as_str().to_string())
                                },
                            }),
                            RdfObject::BlankNode(_) => continue,
                        };
                        values.push(value);
                    }
                    description.set(property.attr, values);
                }
            }
        }
        description
    }

    /// Run every property rule over a `Description`, refreshing the
    /// vocabulary cache on membership-check misses.
    pub async fn validate(&self, description: &Description, fetcher: &dyn VocabularyFetcher) -> ValidationResults {
        let mut results = ValidationResults::new();
        self.validate_into(description, fetcher, &mut results).await;
        results
    }

    async fn validate_into(
        &self,
        description: &Description,
        fetcher: &dyn VocabularyFetcher,
        results: &mut ValidationResults,
    ) {
        for property in self.properties {
            if let Some(submodel) = property.embed {
                let slots = description.embedded.get(property.attr).map(|s| s.as_slice()).unwrap_or(&[]);
                if property.required && slots.is_empty() {
                    results.insert(property.attr, ValidationResult::failure("is required"));
                    continue;
                }
                if !property.repeatable && slots.len() > 1 {
                    results.insert(
                        property.attr,
                        ValidationResult::failure("is not repeatable but has multiple values"),
                    );
                }
                for slot in slots {
                    Box::pin(submodel.validate_into(&slot.description, fetcher, results)).await;
                }
                continue;
            }

            let values = description.get(property.attr);
            if property.required && values.is_empty() {
                results.insert(property.attr, ValidationResult::failure("is required"));
                continue;
            }
            if !property.repeatable && values.len() > 1 {
                results.insert(
                    property.attr,
                    ValidationResult::failure("is not repeatable but has multiple values"),
                );
                continue;
            }
            if let Some(vocabulary_uri) = property.vocabulary {
                for value in values {
                    let term = value.as_str();
                    if !VocabularyCache::global().contains(vocabulary_uri, term, fetcher).await {
                        results.insert(
                            property.attr,
                            ValidationResult::failure(format!("'{term}' is not a member of {vocabulary_uri}")),
                        );
                    }
                }
            }
            results.entry_or_success(property.attr);
        }
    }
}

trait ValidationResultsExt {
    fn entry_or_success(&mut self, attr: &str);
}

impl ValidationResultsExt for ValidationResults {
    /// Record success for an attribute with no rule failure already
    /// recorded, so every rule-bearing attribute appears in the result set.
    fn entry_or_success(&mut self, attr: &str) {
        if !self.has(attr) {
            self.insert(attr, ValidationResult::Success);
        }
    }
}

/// Row data already split into dotted attribute paths with per-value
/// language/datatype decoration resolved, as produced by the spreadsheet
/// reader.
#[derive(Debug, Clone, Default)]
pub struct RowFields {
    pub scalar: BTreeMap<String, Vec<DecoratedValue>>,
    pub embedded_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecoratedValue {
    pub value: String,
    pub lang: Option<String>,
    pub datatype: Option<String>,
}

impl RowFields {
    pub fn values(&self, path: &str) -> Vec<DecoratedValue> {
        self.scalar.get(path).cloned().unwrap_or_default()
    }

    pub fn embedded_count(&self, path: &str) -> usize {
        *self.embedded_counts.get(path).unwrap_or(&0)
    }

    /// The nth slot's row data for an embedded attribute's sub-model: every
    /// scalar field beneath `path.` reindexed to its nth value only.
    pub fn slot(&self, path: &str, n: usize) -> RowFields {
        let prefix = format!("{path}.");
        let mut slot = RowFields::default();
        for (key, values) in &self.scalar {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Some(v) = values.get(n) {
                    slot.scalar.insert(rest.to_string(), vec![v.clone()]);
                }
            }
        }
        for (key, count) in &self.embedded_counts {
            if let Some(rest) = key.strip_prefix(&prefix) {
                slot.embedded_counts.insert(rest.to_string(), *count);
            }
        }
        slot
    }
}

/// Fragment-id lookup recovered from an `INDEX` column (spec §6.2 "embedded
/// object identity stability").
#[derive(Debug, Clone, Default)]
pub struct EmbeddedIndex {
    entries: BTreeMap<(String, usize), String>,
}

impl EmbeddedIndex {
    pub fn insert(&mut self, attr: impl Into<String>, n: usize, fragment_id: impl Into<String>) {
        self.entries.insert((attr.into(), n), fragment_id.into());
    }

    pub fn get(&self, attr: &str, n: usize) -> Option<&str> {
        self.entries.get(&(attr.to_string(), n)).map(String::as_str)
    }
}

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

fn subject_is(subject: &RdfSubject, uri: &str) -> bool {
    matches!(subject, RdfSubject::NamedNode(n) if n.as_str() == uri)
}

fn predicate_is(predicate: &RdfPredicate, iri: &str) -> bool {
    predicate.as_named_node().as_str() == iri
}

fn dotted(prefix: &str, attr: &str) -> String {
    if prefix.is_empty() {
        attr.to_string()
    } else {
        format!("{prefix}.{attr}")
    }
}

/// A fetcher usable wherever validation runs with no repository handle
/// available (e.g. unit tests or a dry-run `validate` CLI command).
pub fn no_vocabulary_fetcher() -> UnreachableVocabularyFetcher {
    UnreachableVocabularyFetcher
}

#[cfg(test)]
mod tests {
    use super::*;

    static SUBJECT_MODEL: ModelDef = ModelDef {
        name: "Subject",
        rdf_types: &[],
        header_map: || {
            HeaderMap::embedded([
                ("label", HeaderMap::Label(String::new())),
                ("uri", HeaderMap::Label(String::new())),
            ])
        },
        properties: &[
            Property::literal("label", "http://www.w3.org/2000/01/rdf-schema#label"),
            Property::uri("uri", "http://www.w3.org/2002/07/owl#sameAs"),
        ],
    };

    static ITEM_MODEL: ModelDef = ModelDef {
        name: "Item",
        rdf_types: &["http://purl.org/dc/dcmitype/Text"],
        header_map: || HeaderMap::Label(String::new()),
        properties: &[
            Property::literal("title", "http://purl.org/dc/terms/title").required(),
            Property::literal("identifier", "http://purl.org/dc/terms/identifier").required(),
            Property::embedded("subject", "http://purl.org/dc/terms/subject", &SUBJECT_MODEL).repeatable(),
        ],
    };

    fn fields(title: &str, subjects: &[(&str, &str)]) -> RowFields {
        let mut row = RowFields::default();
        row.scalar.insert(
            "title".to_string(),
            vec![DecoratedValue {
                value: title.to_string(),
                lang: None,
                datatype: None,
            }],
        );
        row.scalar.insert(
            "identifier".to_string(),
            vec![DecoratedValue {
                value: "item-1".to_string(),
                lang: None,
                datatype: None,
            }],
        );
        row.embedded_counts.insert("subject".to_string(), subjects.len());
        for (n, (label, uri)) in subjects.iter().enumerate() {
            row.scalar.insert(
                "subject.label".to_string(),
                row.scalar
                    .get("subject.label")
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .chain(std::iter::once(DecoratedValue {
                        value: label.to_string(),
                        lang: None,
                        datatype: None,
                    }))
                    .collect(),
            );
            row.scalar.insert(
                "subject.uri".to_string(),
                row.scalar
                    .get("subject.uri")
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .chain(std::iter::once(DecoratedValue {
                        value: uri.to_string(),
                        lang: None,
                        datatype: None,
                    }))
                    .collect(),
            );
            let _ = n;
        }
        row
    }

    #[test]
    fn parse_builds_embedded_objects_with_fresh_fragment_ids() {
        let row = fields("A Title", &[("Cats", "http://ex/cats")]);
        let index = EmbeddedIndex::default();
        let description = ITEM_MODEL.parse("http://repo/1", &row, &index);
        assert_eq!(description.get("title")[0].as_str(), "A Title");
        let subjects = description.embedded.get("subject").unwrap();
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].description.uri.starts_with("http://repo/1#"));
    }

    #[test]
    fn parse_reuses_fragment_id_from_index() {
        let row = fields("A Title", &[("Cats", "http://ex/cats")]);
        let mut index = EmbeddedIndex::default();
        index.insert("subject", 0, "stable-id");
        let description = ITEM_MODEL.parse("http://repo/1", &row, &index);
        let subjects = description.embedded.get("subject").unwrap();
        assert_eq!(subjects[0].fragment_id, "stable-id");
        assert_eq!(subjects[0].description.uri, "http://repo/1#stable-id");
    }

    #[test]
    fn serialize_emits_parent_and_embedded_triples() {
        let row = fields("A Title", &[("Cats", "http://ex/cats")]);
        let index = EmbeddedIndex::default();
        let description = ITEM_MODEL.parse("http://repo/1", &row, &index);
        let graph = ITEM_MODEL.serialize(&description);
        assert!(graph.len() >= 4);
    }

    #[tokio::test]
    async fn validate_flags_missing_required_property() {
        let mut row = fields("", &[]);
        row.scalar.remove("title");
        let index = EmbeddedIndex::default();
        let description = ITEM_MODEL.parse("http://repo/1", &row, &index);
        let results = ITEM_MODEL.validate(&description, &no_vocabulary_fetcher()).await;
        assert!(!results.ok());
    }

    #[tokio::test]
    async fn validate_passes_for_complete_description() {
        let row = fields("A Title", &[("Cats", "http://ex/cats")]);
        let index = EmbeddedIndex::default();
        let description = ITEM_MODEL.parse("http://repo/1", &row, &index);
        let results = ITEM_MODEL.validate(&description, &no_vocabulary_fetcher()).await;
        assert!(results.ok());
    }
}
