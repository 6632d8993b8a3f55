//! The update engine. Applies one SPARQL Update to a set of starting
//! resources, optionally walking outward across a configured list of
//! predicates, under transactional guarantees with per-resource validation.
//! Grounded on `original_source/plastron-jobs/.../updatejob.py`.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use ldpipe_graph_algorithms::Frontier;

use crate::content_model::{ModelDef, VocabularyFetcher};
use crate::jobs::{open_completed_log, CompletedItem, DroppedItem, ItemLogError, Job, Run};
use crate::rdf::{apply_update, parse_sparql_update, Graph, RdfObject, RdfSubject, SparqlUpdateError};
use crate::repo::{with_transaction, Client, ClientError, TransactionClient, TransactionError};

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    SparqlUpdate(#[from] SparqlUpdateError),
    #[error(transparent)]
    ItemLog(#[from] ItemLogError),
}

pub type UpdateResultT<T> = Result<T, UpdateError>;

/// The terminal state one update run ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    UpdateComplete,
    UpdateIncomplete,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UpdateCounts {
    pub visited: usize,
    pub skipped: usize,
    pub updated: usize,
    pub invalid: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateProgress {
    pub counts: UpdateCounts,
    pub state: Option<UpdateState>,
}

/// Options controlling one update run.
pub struct UpdateOptions<'a> {
    pub starting_uris: Vec<String>,
    pub sparql_update: String,
    pub model: Option<&'a ModelDef>,
    pub traverse_predicates: Vec<String>,
    pub dry_run: bool,
    pub use_transactions: bool,
    pub keep_alive_seconds: u64,
}

/// A repository handle the traversal can run over: either the base client
/// (no transaction) or a transaction client. Kept as a trait so
/// `traverse_seed` does not need two copies of itself.
#[async_trait]
trait UpdateRepo: Send + Sync {
    async fn get_graph(&self, uri: &str) -> UpdateResultT<Graph>;
    async fn patch_graph(&self, uri: &str, update: &str) -> UpdateResultT<()>;
}

#[async_trait]
impl UpdateRepo for Client {
    async fn get_graph(&self, uri: &str) -> UpdateResultT<Graph> {
        Ok(Client::get_graph(self, uri).await?)
    }

    async fn patch_graph(&self, uri: &str, update: &str) -> UpdateResultT<()> {
        Ok(Client::patch_graph(self, uri, update).await?)
    }
}

#[async_trait]
impl UpdateRepo for TransactionClient {
    async fn get_graph(&self, uri: &str) -> UpdateResultT<Graph> {
        Ok(TransactionClient::get_graph(self, uri).await?)
    }

    async fn patch_graph(&self, uri: &str, update: &str) -> UpdateResultT<()> {
        Ok(TransactionClient::patch_graph(self, uri, update).await?)
    }
}

/// What happened to one resource visited during a seed's traversal.
enum ResourceOutcome {
    Skipped,
    Updated,
    Invalid(String),
    DryRun,
}

/// Everything one seed's traversal produced, committed to the durable logs
/// only once the whole seed finishes (so a mid-traversal transaction
/// rollback does not leave a completed-log entry for a PATCH that never
/// actually landed).
#[derive(Default)]
struct SeedOutcome {
    updated: Vec<String>,
    invalid: Vec<(String, String)>,
    skipped: usize,
    dry_run: usize,
}

/// Run one update pass: for each starting URI, walk outward following
/// `options.traverse_predicates` breadth-first with no revisits, applying
/// the update to every resource reached.
pub async fn run_update(
    job: &Job,
    run: &Run,
    client: Client,
    fetcher: &dyn VocabularyFetcher,
    options: UpdateOptions<'_>,
    progress: UnboundedSender<UpdateProgress>,
) -> UpdateResultT<UpdateState> {
    let mut completed_log = open_completed_log(job.completed_log_path())?;
    let mut invalid_log = run.dropped_invalid_log()?;
    let mut errors_log = run.dropped_failed_log()?;

    let already_completed: HashSet<String> = completed_log.iter().map(|u| u.uri.clone()).collect();
    let parsed_update = parse_sparql_update(&options.sparql_update)?;
    let mut counts = UpdateCounts::default();

    for seed in &options.starting_uris {
        let outcome = if options.use_transactions {
            run_seed_transactional(&client, seed, &options, &parsed_update, fetcher, &already_completed).await
        } else {
            let outcome = run_seed(&client, seed, &options, &parsed_update, fetcher, &already_completed).await;
            outcome.map_err(|e| {
                warn!(seed = %seed, error = %e, "update traversal failed for seed");
                e
            })
        };

        match outcome {
            Ok(seed_outcome) => {
                counts.skipped += seed_outcome.skipped;
                counts.visited += seed_outcome.updated.len() + seed_outcome.invalid.len() + seed_outcome.dry_run;
                for uri in seed_outcome.updated {
                    completed_log.append(CompletedItem {
                        id: uri.clone(),
                        timestamp: now_rfc3339(),
                        title: String::new(),
                        uri,
                        status: "UPDATED".to_string(),
                    })?;
                    counts.updated += 1;
                }
                for (uri, reason) in seed_outcome.invalid {
                    invalid_log.append(DroppedItem {
                        id: uri.clone(),
                        timestamp: now_rfc3339(),
                        title: String::new(),
                        uri,
                        reason,
                    })?;
                    counts.invalid += 1;
                }
            }
            Err(e) => {
                counts.errors += 1;
                errors_log.append(DroppedItem {
                    id: seed.clone(),
                    timestamp: now_rfc3339(),
                    title: String::new(),
                    uri: seed.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        send_progress(&progress, &counts, None);
    }

    let state = if counts.errors == 0 && counts.invalid == 0 {
        UpdateState::UpdateComplete
    } else {
        UpdateState::UpdateIncomplete
    };
    send_progress(&progress, &counts, Some(state));
    info!(?state, visited = counts.visited, "update run finished");
    Ok(state)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn send_progress(progress: &UnboundedSender<UpdateProgress>, counts: &UpdateCounts, state: Option<UpdateState>) {
    let _ = progress.send(UpdateProgress { counts: *counts, state });
}

/// Non-transactional traversal: a failure visiting one resource is recorded
/// as that resource's outcome and traversal continues, since there is no
/// atomicity to protect.
async fn run_seed(
    client: &Client,
    seed: &str,
    options: &UpdateOptions<'_>,
    update: &crate::rdf::ParsedUpdate,
    fetcher: &dyn VocabularyFetcher,
    already_completed: &HashSet<String>,
) -> UpdateResultT<SeedOutcome> {
    traverse(client, seed, options, update, fetcher, already_completed, false).await
}

/// Transactional traversal: the whole seed runs inside one transaction; any
/// resource-level transport error aborts the remaining traversal for this
/// seed and rolls back every PATCH already issued, so the seed's outcome is
/// only committed to the durable logs when the transaction itself commits.
async fn run_seed_transactional(
    client: &Client,
    seed: &str,
    options: &UpdateOptions<'_>,
    update: &crate::rdf::ParsedUpdate,
    fetcher: &dyn VocabularyFetcher,
    already_completed: &HashSet<String>,
) -> UpdateResultT<SeedOutcome> {
    let seed = seed.to_string();
    let predicates = options.traverse_predicates.clone();
    let model = options.model;
    let dry_run = options.dry_run;
    let update = update.clone();
    let completed = already_completed.clone();
    let sparql_update = options.sparql_update.clone();

    let keep_alive = options.keep_alive_seconds;
    with_transaction(client.clone(), keep_alive, move |tx| async move {
        let sub_options = UpdateOptions {
            starting_uris: Vec::new(),
            sparql_update,
            model,
            traverse_predicates: predicates,
            dry_run,
            use_transactions: true,
            keep_alive_seconds: keep_alive,
        };
        let result = traverse(&tx, &seed, &sub_options, &update, fetcher, &completed, true).await;
        (tx, result)
    })
    .await
}

/// Breadth-first traversal from `seed` following `options.traverse_predicates`,
/// applying `update` to each resource reached. When `abort_on_error` is set
/// (the transactional path), a transport failure on any resource aborts the
/// remaining traversal for this seed rather than being recorded and
/// skipped.
async fn traverse<R: UpdateRepo>(
    repo: &R,
    seed: &str,
    options: &UpdateOptions<'_>,
    update: &crate::rdf::ParsedUpdate,
    fetcher: &dyn VocabularyFetcher,
    already_completed: &HashSet<String>,
    abort_on_error: bool,
) -> UpdateResultT<SeedOutcome> {
    let mut outcome = SeedOutcome::default();
    let mut frontier = Frontier::new([seed.to_string()]);

    while let Some(uri) = frontier.pop() {
        if already_completed.contains(&uri) {
            outcome.skipped += 1;
            continue;
        }

        let existing = match repo.get_graph(&uri).await {
            Ok(g) => g,
            Err(e) if abort_on_error => return Err(e),
            Err(e) => {
                warn!(uri = %uri, error = %e, "could not fetch resource for update; skipping");
                continue;
            }
        };

        for next in follow_predicates(&existing, &uri, &options.traverse_predicates) {
            frontier.push(next);
        }

        match apply_one(repo, &uri, &existing, update, options, fetcher).await {
            Ok(ResourceOutcome::Skipped) => outcome.skipped += 1,
            Ok(ResourceOutcome::Updated) => outcome.updated.push(uri),
            Ok(ResourceOutcome::DryRun) => outcome.dry_run += 1,
            Ok(ResourceOutcome::Invalid(reason)) => outcome.invalid.push((uri, reason)),
            Err(e) if abort_on_error => return Err(e),
            Err(e) => {
                warn!(uri = %uri, error = %e, "update failed for resource; continuing traversal");
            }
        }
    }

    Ok(outcome)
}

async fn apply_one<R: UpdateRepo>(
    repo: &R,
    uri: &str,
    existing: &Graph,
    update: &crate::rdf::ParsedUpdate,
    options: &UpdateOptions<'_>,
    fetcher: &dyn VocabularyFetcher,
) -> UpdateResultT<ResourceOutcome> {
    if let Some(model) = options.model {
        let simulated = apply_update(existing, update);
        let description = model.describe(uri, &simulated);
        let validation = model.validate(&description, fetcher).await;
        if !validation.ok() {
            let reason = validation
                .failures()
                .map(|(attr, result)| match result {
                    crate::content_model::ValidationResult::Failure { message } => format!("{attr} {message}"),
                    crate::content_model::ValidationResult::Success => String::new(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Ok(ResourceOutcome::Invalid(reason));
        }
    }

    if options.dry_run {
        info!(uri = %uri, "dry run: update would be applied");
        return Ok(ResourceOutcome::DryRun);
    }

    repo.patch_graph(uri, &options.sparql_update).await?;
    Ok(ResourceOutcome::Updated)
}

/// Objects reached from `uri` by any of `predicates`, used to extend the
/// traversal frontier. Only named-node objects are followable.
fn follow_predicates(graph: &Graph, uri: &str, predicates: &[String]) -> Vec<String> {
    if predicates.is_empty() {
        return Vec::new();
    }
    graph
        .iter()
        .filter(|t| matches!(&t.subject, RdfSubject::NamedNode(n) if n.as_str() == uri))
        .filter(|t| predicates.iter().any(|p| p == t.predicate.as_named_node().as_str()))
        .filter_map(|t| match &t.object {
            RdfObject::NamedNode(n) => Some(n.as_str().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{NamedNode, RdfPredicate, Triple};

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(
            RdfSubject::NamedNode(NamedNode::new(s).unwrap()),
            RdfPredicate::new(p).unwrap(),
            NamedNode::new(o).unwrap().into(),
        )
    }

    #[test]
    fn follow_predicates_only_matches_configured_ones() {
        let mut graph = Graph::new();
        graph.insert(triple("http://ex/1", "http://ex/hasPart", "http://ex/2"));
        graph.insert(triple("http://ex/1", "http://ex/other", "http://ex/3"));
        let next = follow_predicates(&graph, "http://ex/1", &["http://ex/hasPart".to_string()]);
        assert_eq!(next, vec!["http://ex/2".to_string()]);
    }

    #[test]
    fn follow_predicates_with_no_configured_predicates_stops_traversal() {
        let mut graph = Graph::new();
        graph.insert(triple("http://ex/1", "http://ex/hasPart", "http://ex/2"));
        assert!(follow_predicates(&graph, "http://ex/1", &[]).is_empty());
    }
}
