//! Graph diffing and SPARQL Update construction
//!
//! Grounded on the two-phase diff the original import job performs before
//! patching a resource: compute the raw delete/insert sets from set
//! difference, then cancel any triple that ended up on both sides (which
//! happens when a later pass re-adds a triple already scheduled for
//! deletion, e.g. a value whose position in a multi-valued column changed
//! but whose value did not).

use super::graph::Graph;
use super::types::Triple;

/// The result of diffing a freshly-constructed description against the
/// existing repository graph for the same resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoChangeset {
    pub deletes: Vec<Triple>,
    pub inserts: Vec<Triple>,
}

impl RepoChangeset {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

/// Diff `existing` against `updated`, returning the triples to delete and
/// insert to bring the former in line with the latter.
pub fn create_repo_changeset(existing: &Graph, updated: &Graph) -> RepoChangeset {
    let (deletes, inserts) = compute_raw_diff(existing, updated);
    let (deletes, inserts) = cancel_common(deletes, inserts);
    RepoChangeset { deletes, inserts }
}

/// Phase one: plain set difference in both directions.
fn compute_raw_diff(existing: &Graph, updated: &Graph) -> (Vec<Triple>, Vec<Triple>) {
    let deletes: Vec<Triple> = existing
        .iter()
        .filter(|t| !updated.contains(t))
        .cloned()
        .collect();
    let inserts: Vec<Triple> = updated
        .iter()
        .filter(|t| !existing.contains(t))
        .cloned()
        .collect();
    (deletes, inserts)
}

/// Phase two: a triple appearing in both vectors is removed from both. Plain
/// set difference already excludes this case for the common path, but
/// callers that build `deletes`/`inserts` incrementally (e.g. per
/// embedded-object slot) can reintroduce the overlap; this pass is the
/// invariant's enforcement point regardless of how the vectors were built.
fn cancel_common(deletes: Vec<Triple>, inserts: Vec<Triple>) -> (Vec<Triple>, Vec<Triple>) {
    let delete_set: std::collections::HashSet<Triple> = deletes.into_iter().collect();
    let insert_set: std::collections::HashSet<Triple> = inserts.into_iter().collect();
    let common: std::collections::HashSet<Triple> =
        delete_set.intersection(&insert_set).cloned().collect();
    let deletes = delete_set.difference(&common).cloned().collect();
    let inserts = insert_set.difference(&common).cloned().collect();
    (deletes, inserts)
}

/// Build a SPARQL Update string from delete/insert triple sets, per the
/// four cases: both empty, inserts-only, deletes-only, both.
pub fn build_sparql_update(deletes: &[Triple], inserts: &[Triple]) -> String {
    match (deletes.is_empty(), inserts.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("INSERT DATA {{ {} }}", render_block(inserts)),
        (false, true) => format!("DELETE DATA {{ {} }}", render_block(deletes)),
        (false, false) => format!(
            "DELETE {{ {} }} INSERT {{ {} }} WHERE {{}}",
            render_block(deletes),
            render_block(inserts)
        ),
    }
}

fn render_block(triples: &[Triple]) -> String {
    triples
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::types::{NamedNode, RdfPredicate};

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(
            NamedNode::new(s).unwrap().into(),
            RdfPredicate::new(p).unwrap(),
            NamedNode::new(o).unwrap().into(),
        )
    }

    #[test]
    fn both_empty_yields_empty_string() {
        assert_eq!(build_sparql_update(&[], &[]), "");
    }

    #[test]
    fn inserts_only() {
        let t = triple("http://ex/s", "http://ex/p", "http://ex/o");
        let out = build_sparql_update(&[], &[t]);
        assert!(out.starts_with("INSERT DATA"));
    }

    #[test]
    fn deletes_only() {
        let t = triple("http://ex/s", "http://ex/p", "http://ex/o");
        let out = build_sparql_update(&[t], &[]);
        assert!(out.starts_with("DELETE DATA"));
    }

    #[test]
    fn both_sides_present() {
        let d = triple("http://ex/s", "http://ex/p", "http://ex/old");
        let i = triple("http://ex/s", "http://ex/p", "http://ex/new");
        let out = build_sparql_update(&[d], &[i]);
        assert!(out.starts_with("DELETE {"));
        assert!(out.contains("INSERT {"));
        assert!(out.ends_with("WHERE {}"));
    }

    #[test]
    fn changeset_never_has_triple_on_both_sides() {
        let mut existing = Graph::new();
        existing.insert(triple("http://ex/s", "http://ex/p", "http://ex/keep"));
        existing.insert(triple("http://ex/s", "http://ex/p", "http://ex/old"));

        let mut updated = Graph::new();
        updated.insert(triple("http://ex/s", "http://ex/p", "http://ex/keep"));
        updated.insert(triple("http://ex/s", "http://ex/p", "http://ex/new"));

        let changeset = create_repo_changeset(&existing, &updated);
        assert_eq!(changeset.deletes.len(), 1);
        assert_eq!(changeset.inserts.len(), 1);
        for d in &changeset.deletes {
            assert!(!changeset.inserts.contains(d));
        }
    }

    #[test]
    fn unchanged_graphs_yield_empty_changeset() {
        let mut g = Graph::new();
        g.insert(triple("http://ex/s", "http://ex/p", "http://ex/o"));
        let changeset = create_repo_changeset(&g, &g.clone());
        assert!(changeset.is_empty());
    }
}
