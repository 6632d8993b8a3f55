//! The publication engine. For each URI, toggles the "published" and
//! "hidden" type markers on the resource and either mints (publish) or
//! retains (unpublish) a handle. Grounded on
//! `original_source/plastron-jobs/.../publicationjob.py`
//! (`PublicationAction`, `PublicationJob.run`, `get_final_state`).

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::handle::{HandleClient, HandleError};
use crate::jobs::{open_completed_log, CompletedItem, ItemLogError, Job};
use crate::rdf::{build_sparql_update, Literal, NamedNode, RdfError, RdfPredicate, RdfSubject, Triple};
use crate::repo::{with_transaction, Client, ClientError, TransactionClient, TransactionError};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const PUBLISHED_TYPE: &str = "http://vocab.lib.umd.edu/access#Published";
const HIDDEN_TYPE: &str = "http://vocab.lib.umd.edu/access#Hidden";
const IDENTIFIER_PREDICATE: &str = "http://purl.org/dc/terms/identifier";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    ItemLog(#[from] ItemLogError),
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error(transparent)]
    Rdf(#[from] RdfError),
}

pub type PublishResultT<T> = Result<T, PublishError>;

/// Which direction a publication run moves a resource in. Mirrors
/// `PublicationAction` — parsed from a plain string since it arrives that
/// way off the message dispatcher, with anything else falling
/// through to `PublishState::Error` rather than failing the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    Publish,
    Unpublish,
}

impl PublishAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "publish" => Some(Self::Publish),
            "unpublish" => Some(Self::Unpublish),
            _ => None,
        }
    }
}

/// The terminal state one publication run ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    PublishComplete,
    PublishIncomplete,
    UnpublishComplete,
    UnpublishIncomplete,
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PublishCounts {
    pub total: usize,
    pub done: usize,
    pub errors: usize,
}

/// The outcome for one resource, analogous to the `result` dict yielded
/// per-URI by the original job.
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub uri: String,
    pub handle: Option<String>,
    pub published: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishProgress {
    pub counts: PublishCounts,
    pub result: Option<PublishResult>,
    pub state: Option<PublishState>,
}

/// Options controlling one publication run. `force_hidden`/`force_visible`
/// toggle the hidden marker independently of `action`, matching
/// `PublicationJob.force_hidden`/`force_visible`.
pub struct PublishOptions {
    pub action: String,
    pub force_hidden: bool,
    pub force_visible: bool,
    pub use_transactions: bool,
    pub keep_alive_seconds: u64,
}

/// Run one publication pass over `uris`. Each resource is read, has its
/// access-type markers toggled, and is PATCHed back; a handle is minted (or,
/// for unpublish, simply left alone) via `handle_client`.
pub async fn run_publish(
    job: &Job,
    client: Client,
    handle_client: &dyn HandleClient,
    options: PublishOptions,
    uris: Vec<String>,
    progress: UnboundedSender<PublishProgress>,
) -> PublishResultT<PublishState> {
    let mut completed_log = open_completed_log(job.completed_log_path())?;
    let mut counts = PublishCounts {
        total: uris.len(),
        ..Default::default()
    };

    let Some(action) = PublishAction::parse(&options.action) else {
        warn!(action = %options.action, "unknown publication action");
        send_progress(&progress, &counts, None, Some(PublishState::Error));
        return Ok(PublishState::Error);
    };

    send_progress(&progress, &counts, None, None);

    for uri in &uris {
        let outcome = if options.use_transactions {
            run_one_transactional(&client, uri, action, &options, handle_client).await
        } else {
            run_one(&client, uri, action, &options, handle_client).await
        };

        let result = match outcome {
            Ok(result) => {
                counts.done += 1;
                completed_log.append(CompletedItem {
                    id: uri.clone(),
                    timestamp: now_rfc3339(),
                    title: String::new(),
                    uri: uri.clone(),
                    status: status_label(action).to_string(),
                })?;
                result
            }
            Err(e) => {
                warn!(uri = %uri, error = %e, "publication action failed for resource");
                counts.errors += 1;
                PublishResult {
                    uri: uri.clone(),
                    handle: None,
                    published: false,
                    hidden: false,
                }
            }
        };
        send_progress(&progress, &counts, Some(result), None);
    }

    let state = final_state(action, &counts);
    send_progress(&progress, &counts, None, Some(state));
    info!(?state, done = counts.done, total = counts.total, "publication run finished");
    Ok(state)
}

fn status_label(action: PublishAction) -> &'static str {
    match action {
        PublishAction::Publish => "PUBLISHED",
        PublishAction::Unpublish => "UNPUBLISHED",
    }
}

fn final_state(action: PublishAction, counts: &PublishCounts) -> PublishState {
    let complete = counts.done >= counts.total;
    match (action, complete) {
        (PublishAction::Publish, true) => PublishState::PublishComplete,
        (PublishAction::Publish, false) => PublishState::PublishIncomplete,
        (PublishAction::Unpublish, true) => PublishState::UnpublishComplete,
        (PublishAction::Unpublish, false) => PublishState::UnpublishIncomplete,
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn send_progress(
    progress: &UnboundedSender<PublishProgress>,
    counts: &PublishCounts,
    result: Option<PublishResult>,
    state: Option<PublishState>,
) {
    let _ = progress.send(PublishProgress {
        counts: *counts,
        result,
        state,
    });
}

async fn run_one(
    client: &Client,
    uri: &str,
    action: PublishAction,
    options: &PublishOptions,
    handle_client: &dyn HandleClient,
) -> PublishResultT<PublishResult> {
    let existing = client.get_graph(uri).await?;
    let (update, result) = build_toggle(uri, &existing, action, options, handle_client).await?;
    if !update.is_empty() {
        client.patch_graph(uri, &update).await?;
    }
    Ok(result)
}

async fn run_one_transactional(
    client: &Client,
    uri: &str,
    action: PublishAction,
    options: &PublishOptions,
    handle_client: &dyn HandleClient,
) -> PublishResultT<PublishResult> {
    let uri = uri.to_string();
    let action_name = options.action.clone();
    let force_hidden = options.force_hidden;
    let force_visible = options.force_visible;
    let keep_alive = options.keep_alive_seconds;

    with_transaction(client.clone(), keep_alive, move |tx| async move {
        let sub_options = PublishOptions {
            action: action_name,
            force_hidden,
            force_visible,
            use_transactions: true,
            keep_alive_seconds: keep_alive,
        };
        let result = run_one_tx(&tx, &uri, action, &sub_options, handle_client).await;
        (tx, result)
    })
    .await
}

async fn run_one_tx(
    tx: &TransactionClient,
    uri: &str,
    action: PublishAction,
    options: &PublishOptions,
    handle_client: &dyn HandleClient,
) -> PublishResultT<PublishResult> {
    let existing = tx.get_graph(uri).await?;
    let (update, result) = build_toggle(uri, &existing, action, options, handle_client).await?;
    if !update.is_empty() {
        tx.patch_graph(uri, &update).await?;
    }
    Ok(result)
}

/// Compute the delete/insert triples that move `existing` into the toggled
/// state `action` (plus `force_hidden`/`force_visible`) calls for, minting a
/// handle first when publishing.
async fn build_toggle(
    uri: &str,
    existing: &crate::rdf::Graph,
    action: PublishAction,
    options: &PublishOptions,
    handle_client: &dyn HandleClient,
) -> PublishResultT<(String, PublishResult)> {
    let mut deletes = Vec::new();
    let mut inserts = Vec::new();
    let mut handle_url = None;

    let has_type = |iri: &str| -> bool {
        existing.iter().any(|t| {
            matches!(&t.subject, RdfSubject::NamedNode(n) if n.as_str() == uri)
                && t.predicate.as_named_node().as_str() == RDF_TYPE
                && matches!(&t.object, crate::rdf::RdfObject::NamedNode(n) if n.as_str() == iri)
        })
    };

    match action {
        PublishAction::Publish => {
            if !has_type(PUBLISHED_TYPE) {
                inserts.push(type_triple(uri, PUBLISHED_TYPE)?);
            }
            let handle = handle_client.mint_or_update(uri, uri).await?;
            if !existing.iter().any(|t| {
                matches!(&t.subject, RdfSubject::NamedNode(n) if n.as_str() == uri)
                    && t.predicate.as_named_node().as_str() == IDENTIFIER_PREDICATE
            }) {
                inserts.push(identifier_triple(uri, &handle.url)?);
            }
            handle_url = Some(handle.url);
        }
        PublishAction::Unpublish => {
            if has_type(PUBLISHED_TYPE) {
                deletes.push(type_triple(uri, PUBLISHED_TYPE)?);
            }
        }
    }

    if options.force_hidden && !has_type(HIDDEN_TYPE) {
        inserts.push(type_triple(uri, HIDDEN_TYPE)?);
    }
    if options.force_visible && has_type(HIDDEN_TYPE) {
        deletes.push(type_triple(uri, HIDDEN_TYPE)?);
    }

    let hidden = (has_type(HIDDEN_TYPE) || options.force_hidden) && !options.force_visible;
    let published = match action {
        PublishAction::Publish => true,
        PublishAction::Unpublish => false,
    };

    let update = build_sparql_update(&deletes, &inserts);
    Ok((
        update,
        PublishResult {
            uri: uri.to_string(),
            handle: handle_url,
            published,
            hidden,
        },
    ))
}

fn type_triple(uri: &str, type_iri: &str) -> PublishResultT<Triple> {
    Ok(Triple::new(
        RdfSubject::NamedNode(NamedNode::new(uri)?),
        RdfPredicate::new(RDF_TYPE)?,
        NamedNode::new(type_iri)?.into(),
    ))
}

fn identifier_triple(uri: &str, handle_url: &str) -> PublishResultT<Triple> {
    Ok(Triple::new(
        RdfSubject::NamedNode(NamedNode::new(uri)?),
        RdfPredicate::new(IDENTIFIER_PREDICATE)?,
        Literal::new_simple(handle_url).into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::rdf::Graph;
    use async_trait::async_trait;

    struct StubHandleClient;

    #[async_trait]
    impl HandleClient for StubHandleClient {
        async fn mint_or_update(&self, _uri: &str, _target: &str) -> Result<Handle, HandleError> {
            Ok(Handle {
                prefix: "1903.1".to_string(),
                suffix: "1".to_string(),
                url: "http://hdl.handle.net/1903.1/1".to_string(),
            })
        }
    }

    fn options(action: &str) -> PublishOptions {
        PublishOptions {
            action: action.to_string(),
            force_hidden: false,
            force_visible: false,
            use_transactions: false,
            keep_alive_seconds: 90,
        }
    }

    #[test]
    fn unknown_action_does_not_parse() {
        assert!(PublishAction::parse("delete").is_none());
        assert_eq!(PublishAction::parse("publish"), Some(PublishAction::Publish));
        assert_eq!(PublishAction::parse("unpublish"), Some(PublishAction::Unpublish));
    }

    #[tokio::test]
    async fn publish_adds_published_type_and_mints_handle() {
        let uri = "http://repo.example/rest/item/1";
        let existing = Graph::new();
        let handle_client = StubHandleClient;
        let (update, result) = build_toggle(uri, &existing, PublishAction::Publish, &options("publish"), &handle_client)
            .await
            .unwrap();
        assert!(update.contains(PUBLISHED_TYPE));
        assert!(result.published);
        assert!(result.handle.is_some());
    }

    #[tokio::test]
    async fn unpublish_removes_published_type_without_minting() {
        let uri = "http://repo.example/rest/item/1";
        let mut existing = Graph::new();
        existing.insert(type_triple(uri, PUBLISHED_TYPE).unwrap());
        let handle_client = StubHandleClient;
        let (update, result) = build_toggle(uri, &existing, PublishAction::Unpublish, &options("unpublish"), &handle_client)
            .await
            .unwrap();
        assert!(update.starts_with("DELETE DATA"));
        assert!(!result.published);
        assert!(result.handle.is_none());
    }

    #[tokio::test]
    async fn force_hidden_adds_hidden_type_on_publish() {
        let uri = "http://repo.example/rest/item/1";
        let existing = Graph::new();
        let handle_client = StubHandleClient;
        let mut opts = options("publish");
        opts.force_hidden = true;
        let (update, result) = build_toggle(uri, &existing, PublishAction::Publish, &opts, &handle_client)
            .await
            .unwrap();
        assert!(update.contains(HIDDEN_TYPE));
        assert!(result.hidden);
    }

    #[tokio::test]
    async fn already_published_with_identifier_set_produces_no_update() {
        let uri = "http://repo.example/rest/item/1";
        let mut existing = Graph::new();
        existing.insert(type_triple(uri, PUBLISHED_TYPE).unwrap());
        existing.insert(identifier_triple(uri, "http://hdl.example/1").unwrap());
        let handle_client = StubHandleClient;
        let (update, _result) = build_toggle(uri, &existing, PublishAction::Publish, &options("publish"), &handle_client)
            .await
            .unwrap();
        assert!(update.is_empty());
    }
}
