//! Applying a SPARQL Update string to an in-memory `Graph`.
//!
//! The update engine needs this to parse the update locally, re-describe
//! the resource in memory, and run validation against it — i.e. simulate
//! what the PATCH would do to the resource *before* ever sending it, so a
//! model's validation rules can reject a bad update without mutating the
//! repository. Only the three shapes `build_sparql_update` itself produces
//! are supported — `INSERT DATA {}`, `DELETE DATA {}`, and `DELETE {}
//! INSERT {} WHERE {}` with an empty WHERE clause — since that covers
//! every update this system's own import/update engines construct, and
//! hand-authored updates submitted to the update engine are expected to
//! follow the same ground-triple shape. Parsing itself is delegated to
//! `spargebra`, the SPARQL 1.1 grammar this corpus already depends on.

use spargebra::algebra::{GraphPattern, GraphUpdateOperation};
use spargebra::term::{
    GraphName, GraphNamePattern, GroundSubject, GroundTerm, GroundTermPattern, NamedNodePattern,
    TermPattern,
};
use spargebra::Update;
use thiserror::Error;

use super::graph::Graph;
use super::types::{NamedNode, RdfObject, RdfPredicate, RdfSubject, Triple};

#[derive(Error, Debug)]
pub enum SparqlUpdateError {
    #[error("could not parse SPARQL update: {0}")]
    Syntax(String),
    #[error("unsupported SPARQL update feature: {0}")]
    Unsupported(&'static str),
}

pub type SparqlUpdateResult<T> = Result<T, SparqlUpdateError>;

/// The parsed delete/insert triple sets a SPARQL Update string names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUpdate {
    pub deletes: Graph,
    pub inserts: Graph,
}

/// Parse one of the three update shapes `build_sparql_update` generates
/// into its delete/insert triple sets, without touching any repository.
pub fn parse_sparql_update(update: &str) -> SparqlUpdateResult<ParsedUpdate> {
    let parsed =
        Update::parse(update, None).map_err(|e| SparqlUpdateError::Syntax(e.to_string()))?;

    let mut deletes = Graph::new();
    let mut inserts = Graph::new();

    for operation in parsed.operations {
        match operation {
            GraphUpdateOperation::InsertData { data } => {
                for quad in data {
                    require_default_graph(&quad.graph_name)?;
                    let subject: RdfSubject = quad.subject.into();
                    let object: RdfObject = quad.object.into();
                    let predicate = RdfPredicate::from(NamedNode::from(quad.predicate));
                    inserts.insert(Triple::new(subject, predicate, object));
                }
            }
            GraphUpdateOperation::DeleteData { data } => {
                for quad in data {
                    require_default_graph(&quad.graph_name)?;
                    let subject = ground_subject_to_rdf_subject(quad.subject)?;
                    let object = ground_term_to_rdf_object(quad.object)?;
                    let predicate = RdfPredicate::from(NamedNode::from(quad.predicate));
                    deletes.insert(Triple::new(subject, predicate, object));
                }
            }
            GraphUpdateOperation::DeleteInsert {
                delete,
                insert,
                pattern,
                ..
            } => {
                if !is_trivial_pattern(&pattern) {
                    return Err(SparqlUpdateError::Unsupported(
                        "a WHERE clause with patterns is not evaluated; only WHERE {} is supported",
                    ));
                }
                for quad in delete {
                    require_default_graph_pattern(&quad.graph_name)?;
                    let subject = ground_term_pattern_to_subject(quad.subject)?;
                    let object = ground_term_pattern_to_object(quad.object)?;
                    let predicate = named_node_pattern_to_predicate(quad.predicate)?;
                    deletes.insert(Triple::new(subject, predicate, object));
                }
                for quad in insert {
                    require_default_graph_pattern(&quad.graph_name)?;
                    let subject = term_pattern_to_subject(quad.subject)?;
                    let object = term_pattern_to_object(quad.object)?;
                    let predicate = named_node_pattern_to_predicate(quad.predicate)?;
                    inserts.insert(Triple::new(subject, predicate, object));
                }
            }
            _ => {
                return Err(SparqlUpdateError::Unsupported(
                    "only INSERT DATA, DELETE DATA and DELETE/INSERT/WHERE {} are supported",
                ))
            }
        }
    }

    Ok(ParsedUpdate { deletes, inserts })
}

/// Apply a parsed update to `graph`, returning the resulting graph. Deletes
/// are removed first, then inserts are added, matching SPARQL Update's own
/// delete-then-insert semantics within one request.
pub fn apply_update(graph: &Graph, update: &ParsedUpdate) -> Graph {
    let mut result = graph.clone();
    for triple in update.deletes.iter() {
        result.remove(triple);
    }
    for triple in update.inserts.iter() {
        result.insert(triple.clone());
    }
    result
}

fn is_trivial_pattern(pattern: &GraphPattern) -> bool {
    matches!(pattern, GraphPattern::Bgp { patterns } if patterns.is_empty())
}

fn require_default_graph(graph_name: &GraphName) -> SparqlUpdateResult<()> {
    match graph_name {
        GraphName::DefaultGraph => Ok(()),
        _ => Err(SparqlUpdateError::Unsupported(
            "named graphs are not supported; every resource is a single default-graph document",
        )),
    }
}

fn require_default_graph_pattern(graph_name: &GraphNamePattern) -> SparqlUpdateResult<()> {
    match graph_name {
        GraphNamePattern::DefaultGraph => Ok(()),
        _ => Err(SparqlUpdateError::Unsupported(
            "named graphs are not supported; every resource is a single default-graph document",
        )),
    }
}

fn ground_subject_to_rdf_subject(subject: GroundSubject) -> SparqlUpdateResult<RdfSubject> {
    match subject {
        GroundSubject::NamedNode(n) => Ok(RdfSubject::NamedNode(n.into())),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlUpdateError::Unsupported(
            "RDF-star subjects are not supported",
        )),
    }
}

fn ground_term_to_rdf_object(term: GroundTerm) -> SparqlUpdateResult<RdfObject> {
    match term {
        GroundTerm::NamedNode(n) => Ok(RdfObject::NamedNode(n.into())),
        GroundTerm::Literal(l) => Ok(RdfObject::Literal(l.into())),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlUpdateError::Unsupported(
            "RDF-star terms are not supported",
        )),
    }
}

fn ground_term_pattern_to_subject(pattern: GroundTermPattern) -> SparqlUpdateResult<RdfSubject> {
    match pattern {
        GroundTermPattern::NamedNode(n) => Ok(RdfSubject::NamedNode(n.into())),
        GroundTermPattern::Variable(_) => Err(SparqlUpdateError::Unsupported(
            "variables are not supported in DELETE templates",
        )),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlUpdateError::Unsupported(
            "only named-node subjects are supported in DELETE templates",
        )),
    }
}

fn ground_term_pattern_to_object(pattern: GroundTermPattern) -> SparqlUpdateResult<RdfObject> {
    match pattern {
        GroundTermPattern::NamedNode(n) => Ok(RdfObject::NamedNode(n.into())),
        GroundTermPattern::Literal(l) => Ok(RdfObject::Literal(l.into())),
        GroundTermPattern::Variable(_) => Err(SparqlUpdateError::Unsupported(
            "variables are not supported in DELETE templates",
        )),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlUpdateError::Unsupported(
            "RDF-star terms are not supported",
        )),
    }
}

fn term_pattern_to_subject(pattern: TermPattern) -> SparqlUpdateResult<RdfSubject> {
    match pattern {
        TermPattern::NamedNode(n) => Ok(RdfSubject::NamedNode(n.into())),
        TermPattern::BlankNode(b) => Ok(RdfSubject::BlankNode(b.into())),
        TermPattern::Variable(_) => Err(SparqlUpdateError::Unsupported(
            "variables are not supported in INSERT templates",
        )),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlUpdateError::Unsupported(
            "a literal or RDF-star term cannot be a subject",
        )),
    }
}

fn term_pattern_to_object(pattern: TermPattern) -> SparqlUpdateResult<RdfObject> {
    match pattern {
        TermPattern::NamedNode(n) => Ok(RdfObject::NamedNode(n.into())),
        TermPattern::BlankNode(b) => Ok(RdfObject::BlankNode(b.into())),
        TermPattern::Literal(l) => Ok(RdfObject::Literal(l.into())),
        TermPattern::Variable(_) => Err(SparqlUpdateError::Unsupported(
            "variables are not supported in INSERT templates",
        )),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlUpdateError::Unsupported(
            "RDF-star terms are not supported",
        )),
    }
}

fn named_node_pattern_to_predicate(pattern: NamedNodePattern) -> SparqlUpdateResult<RdfPredicate> {
    match pattern {
        NamedNodePattern::NamedNode(n) => Ok(RdfPredicate::from(NamedNode::from(n))),
        NamedNodePattern::Variable(_) => Err(SparqlUpdateError::Unsupported(
            "variable predicates are not supported",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(
            RdfSubject::NamedNode(NamedNode::new(s).unwrap()),
            RdfPredicate::new(p).unwrap(),
            NamedNode::new(o).unwrap().into(),
        )
    }

    #[test]
    fn parses_insert_data() {
        let update = "INSERT DATA { <http://ex/s> <http://ex/p> <http://ex/o> . }";
        let parsed = parse_sparql_update(update).unwrap();
        assert!(parsed.deletes.is_empty());
        assert_eq!(parsed.inserts.len(), 1);
    }

    #[test]
    fn parses_delete_data() {
        let update = "DELETE DATA { <http://ex/s> <http://ex/p> <http://ex/o> . }";
        let parsed = parse_sparql_update(update).unwrap();
        assert_eq!(parsed.deletes.len(), 1);
        assert!(parsed.inserts.is_empty());
    }

    #[test]
    fn parses_delete_insert_where() {
        let update = "DELETE { <http://ex/s> <http://ex/p> <http://ex/old> . } \
                       INSERT { <http://ex/s> <http://ex/p> <http://ex/new> . } WHERE {}";
        let parsed = parse_sparql_update(update).unwrap();
        assert_eq!(parsed.deletes.len(), 1);
        assert_eq!(parsed.inserts.len(), 1);
    }

    #[test]
    fn rejects_a_where_clause_with_real_patterns() {
        let update = "DELETE { <http://ex/s> <http://ex/p> ?o . } \
                       INSERT { <http://ex/s> <http://ex/p> <http://ex/new> . } \
                       WHERE { <http://ex/s> <http://ex/p> ?o . }";
        assert!(parse_sparql_update(update).is_err());
    }

    #[test]
    fn apply_update_deletes_then_inserts() {
        let mut graph = Graph::new();
        graph.insert(triple("http://ex/s", "http://ex/p", "http://ex/old"));
        let update = ParsedUpdate {
            deletes: Graph::from_triples([triple("http://ex/s", "http://ex/p", "http://ex/old")]),
            inserts: Graph::from_triples([triple("http://ex/s", "http://ex/p", "http://ex/new")]),
        };
        let result = apply_update(&graph, &update);
        assert_eq!(result.len(), 1);
        assert!(result.contains(&triple("http://ex/s", "http://ex/p", "http://ex/new")));
    }
}
