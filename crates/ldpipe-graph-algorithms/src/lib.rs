//! Generic breadth-first traversal used by the update engine (C9) to walk a
//! resource graph outward from a set of starting URIs, following a
//! configured list of predicates, visiting each resource at most once.

pub mod traversal;

pub use traversal::{bfs_reachable, Frontier};
