//! Graph utilities: term wrappers, an in-memory triple graph, and
//! diff-based SPARQL Update construction.
//!
//! This is the smallest layer in the crate: a `Graph` is just a set of
//! triples, and the only derived operation is the delete/insert diff the
//! import and update engines PATCH to the repository with.

mod apply;
mod diff;
mod graph;
mod namespace;
mod types;

pub use apply::{apply_update, parse_sparql_update, ParsedUpdate, SparqlUpdateError, SparqlUpdateResult};
pub use diff::{build_sparql_update, create_repo_changeset, RepoChangeset};
pub use graph::{Graph, GraphError, GraphResult};
pub use namespace::{Namespace, NamespaceManager, PrefixError, PrefixResult};
pub use types::{
    BlankNode, Literal, NamedNode, RdfError, RdfObject, RdfPredicate, RdfResult, RdfSubject,
    Triple,
};
