//! The repository HTTP surface: a base LDP client and a transaction
//! client that wraps it with transaction lifecycle and URI rewriting.

mod client;
mod endpoint;
mod rewrite;
mod transaction;

pub use client::{parse_describedby_link, Client, ClientError, ClientResult, Created, N_TRIPLES, PREFER_MINIMAL, SPARQL_UPDATE, TURTLE};
pub use endpoint::Endpoint;
pub use rewrite::{insert_transaction_uri, remove_transaction_uri, rewrite_graph};
pub use transaction::{with_transaction, TransactionClient, TransactionError, TransactionResult};
