//! URI rewriting between a repository's public address space and the
//! scoped address space of an open transaction.
//!
//! For endpoint `E` and transaction URL `T`, a resource path `P` has a
//! public form `E/P` and a scoped form `T/P`; rewriting is string-prefix
//! substitution, applied recursively over triple subject/object positions
//! when rewriting a whole graph.

use crate::rdf::{Graph, NamedNode, RdfObject, RdfSubject, Triple};

pub fn insert_transaction_uri(uri: &str, endpoint_prefix: &str, tx_prefix: &str) -> String {
    if let Some(suffix) = uri.strip_prefix(endpoint_prefix) {
        format!("{}{}", tx_prefix, suffix)
    } else {
        uri.to_string()
    }
}

pub fn remove_transaction_uri(uri: &str, endpoint_prefix: &str, tx_prefix: &str) -> String {
    if let Some(suffix) = uri.strip_prefix(tx_prefix) {
        format!("{}{}", endpoint_prefix, suffix)
    } else {
        uri.to_string()
    }
}

/// Rewrite every subject/object named node in `graph` whose IRI starts with
/// `from_prefix`, substituting `to_prefix`. Blank nodes, literals, and
/// predicates (never transaction-scoped in this repository's URI space) are
/// left untouched.
pub fn rewrite_graph(graph: &Graph, from_prefix: &str, to_prefix: &str) -> Graph {
    let mut out = Graph::new();
    for triple in graph.iter() {
        let subject = match &triple.subject {
            RdfSubject::NamedNode(n) => rewrite_named_node(n, from_prefix, to_prefix).into(),
            other => other.clone(),
        };
        let object = match &triple.object {
            RdfObject::NamedNode(n) => rewrite_named_node(n, from_prefix, to_prefix).into(),
            other => other.clone(),
        };
        out.insert(Triple::new(subject, triple.predicate.clone(), object));
    }
    out
}

fn rewrite_named_node(node: &NamedNode, from_prefix: &str, to_prefix: &str) -> NamedNode {
    if let Some(suffix) = node.as_str().strip_prefix(from_prefix) {
        NamedNode::new(&format!("{}{}", to_prefix, suffix)).unwrap_or_else(|_| node.clone())
    } else {
        node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_is_identity() {
        let endpoint = "http://h/rest";
        let tx = "http://h/rest/tx:abc";
        let uri = "http://h/rest/x/y";
        let scoped = insert_transaction_uri(uri, endpoint, tx);
        assert_eq!(scoped, "http://h/rest/tx:abc/x/y");
        assert_eq!(remove_transaction_uri(&scoped, endpoint, tx), uri);
    }

    #[test]
    fn remove_then_insert_is_identity() {
        let endpoint = "http://h/rest";
        let tx = "http://h/rest/tx:abc";
        let scoped = "http://h/rest/tx:abc/x/new";
        let public = remove_transaction_uri(scoped, endpoint, tx);
        assert_eq!(public, "http://h/rest/x/new");
        assert_eq!(insert_transaction_uri(&public, endpoint, tx), scoped);
    }

    #[test]
    fn non_matching_uri_is_unchanged() {
        let endpoint = "http://h/rest";
        let tx = "http://h/rest/tx:abc";
        let uri = "http://other/x";
        assert_eq!(insert_transaction_uri(uri, endpoint, tx), uri);
    }
}
