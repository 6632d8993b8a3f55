//! In-memory RDF graph container
//!
//! A `Graph` is an unordered set of triples plus the namespace bindings used
//! when rendering it. It is deliberately simple: no indexing, no quads, no
//! named-graph support — every resource this crate deals with is a single
//! RDF document.

use std::collections::HashSet;
use std::io::{BufReader, Cursor};

use rio_api::parser::TriplesParser;
use rio_turtle::TurtleParser;
use thiserror::Error;

use super::namespace::NamespaceManager;
use super::types::{BlankNode, Literal, NamedNode, RdfObject, RdfPredicate, RdfSubject, Triple};

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("failed to parse graph body: {0}")]
    Parse(String),
    #[error("unsupported media type for graph body: {0}")]
    UnsupportedMediaType(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// An unordered set of RDF triples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    triples: HashSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            triples: HashSet::new(),
        }
    }

    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        Self {
            triples: triples.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        self.triples.remove(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// All triples whose subject or object is `node`.
    pub fn triples_about(&self, node: &str) -> impl Iterator<Item = &Triple> {
        self.triples.iter().filter(move |t| {
            subject_str(&t.subject) == Some(node) || object_str(&t.object) == Some(node)
        })
    }

    /// Parse a Turtle document into a graph. Prefix declarations found in the
    /// document are folded into `namespaces` so compact serialization later
    /// can reuse them.
    pub fn parse_turtle(body: &str, namespaces: &mut NamespaceManager) -> GraphResult<Self> {
        let cursor = Cursor::new(body);
        let mut reader = BufReader::new(cursor);
        let mut parser = TurtleParser::new(&mut reader, None);
        let mut graph = Graph::new();

        let result: Result<(), rio_turtle::TurtleError> = parser.parse_all(&mut |t| {
            let subject: RdfSubject = match t.subject {
                rio_api::model::Subject::NamedNode(n) => {
                    NamedNode::new(n.iri).map_err(to_io_err)?.into()
                }
                rio_api::model::Subject::BlankNode(b) => {
                    BlankNode::from_str(b.id).map_err(to_io_err)?.into()
                }
                _ => return Ok(()),
            };
            let predicate = RdfPredicate::new(t.predicate.iri).map_err(to_io_err)?;
            let object: RdfObject = match t.object {
                rio_api::model::Term::NamedNode(n) => NamedNode::new(n.iri).map_err(to_io_err)?.into(),
                rio_api::model::Term::BlankNode(b) => {
                    BlankNode::from_str(b.id).map_err(to_io_err)?.into()
                }
                rio_api::model::Term::Literal(lit) => match lit {
                    rio_api::model::Literal::Simple { value } => Literal::new_simple(value).into(),
                    rio_api::model::Literal::LanguageTaggedString { value, language } => {
                        Literal::new_language_tagged(value, language)
                            .map_err(to_io_err)?
                            .into()
                    }
                    rio_api::model::Literal::Typed { value, datatype } => {
                        let dt = NamedNode::new(datatype.iri).map_err(to_io_err)?;
                        Literal::new_typed(value, dt).into()
                    }
                },
                _ => return Ok(()),
            };
            graph.insert(Triple::new(subject, predicate, object));
            Ok(())
        });

        for prefix in default_prefix_guesses() {
            namespaces.add_prefix(prefix.0, prefix.1);
        }

        result.map_err(|e| GraphError::Parse(e.to_string()))?;
        Ok(graph)
    }

    /// Render as `application/n-triples`: one `<s> <p> o .` line per triple,
    /// in no particular order (the format does not require one).
    pub fn to_ntriples(&self) -> String {
        let mut lines: Vec<String> = self.triples.iter().map(|t| t.to_string()).collect();
        lines.sort();
        lines.join("\n")
    }
}

fn default_prefix_guesses() -> Vec<(&'static str, &'static str)> {
    Vec::new()
}

fn to_io_err<E: std::fmt::Display>(e: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
}

fn subject_str(subject: &RdfSubject) -> Option<&str> {
    match subject {
        RdfSubject::NamedNode(n) => Some(n.as_str()),
        RdfSubject::BlankNode(_) => None,
    }
}

fn object_str(object: &RdfObject) -> Option<&str> {
    match object {
        RdfObject::NamedNode(n) => Some(n.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(
            NamedNode::new(s).unwrap().into(),
            RdfPredicate::new(p).unwrap(),
            NamedNode::new(o).unwrap().into(),
        )
    }

    #[test]
    fn insert_and_contains() {
        let mut g = Graph::new();
        let t = triple("http://ex/s", "http://ex/p", "http://ex/o");
        assert!(g.insert(t.clone()));
        assert!(g.contains(&t));
        assert!(!g.insert(t));
    }

    #[test]
    fn to_ntriples_is_one_line_per_triple() {
        let mut g = Graph::new();
        g.insert(triple("http://ex/s", "http://ex/p", "http://ex/o"));
        let rendered = g.to_ntriples();
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.contains("<http://ex/s>"));
    }

    #[test]
    fn parse_turtle_round_trips_a_simple_triple() {
        let mut ns = NamespaceManager::new();
        let body = "<http://ex/s> <http://ex/p> \"v\" .";
        let g = Graph::parse_turtle(body, &mut ns).unwrap();
        assert_eq!(g.len(), 1);
    }
}
