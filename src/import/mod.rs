//! The import engine. Each row either mints a new resource in the job's
//! configured container or reads an existing one by URI and patches it.

pub mod pcdm;

mod text_extract;

pub use text_extract::{build_text_annotation, extract_plain_text};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::binary::{open_binary_source, BinarySource, BinarySourceError, BinarySourceFactoryError};
use crate::content_model::{ModelDef, ValidationResults, VocabularyFetcher};
use crate::handle::HandleClient;
use crate::jobs::item_log::ItemLogError;
use crate::jobs::{open_completed_log, CompletedItem, DroppedItem, Job, JobConfig, JobConfigError, Run};
use crate::rdf::{build_sparql_update, Triple};
use crate::repo::{with_transaction, Client, ClientError, TransactionClient, TransactionError, TURTLE};
use crate::spreadsheet::{MetadataSpreadsheet, Row, RowOutcome, SpreadsheetError};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),
    #[error(transparent)]
    JobConfig(#[from] JobConfigError),
    #[error(transparent)]
    ItemLog(#[from] ItemLogError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    BinarySource(#[from] BinarySourceError),
    #[error(transparent)]
    BinarySourceFactory(#[from] BinarySourceFactoryError),
    #[error("row '{0}' names files but the job has no binaries location configured")]
    NoBinariesLocation(String),
}

pub type ImportResultT<T> = Result<T, ImportError>;

/// The terminal state one import run ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    ValidateSuccess,
    ValidateFailed,
    ImportComplete,
    ImportIncomplete,
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ImportCounts {
    pub total_items: usize,
    pub rows: usize,
    pub errors: usize,
    pub files: usize,
    pub valid_items: usize,
    pub invalid_items: usize,
    pub created_items: usize,
    pub updated_items: usize,
    pub unchanged_items: usize,
    pub skipped_items: usize,
    pub initially_completed_items: usize,
}

/// One progress update, emitted after every row and once more, carrying the
/// terminal `state`, after the run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct ImportProgress {
    pub counts: ImportCounts,
    pub state: Option<ImportState>,
}

/// Options controlling one import run.
pub struct ImportOptions<'a> {
    pub model: &'a ModelDef,
    pub limit: Option<usize>,
    pub percentage: Option<u8>,
    pub validate_only: bool,
    pub dry_run: bool,
    pub keep_alive_seconds: u64,
    /// HTTP client used to open `http:`/`https:` binary sources, kept
    /// separate from the repository client's own so binaries and LDP
    /// traffic can carry different credentials.
    pub http_client: reqwest::Client,
}

enum RowResult {
    Valid { created: bool, updated: bool, files: usize },
    Invalid(String),
}

/// Run one import pass over `job`'s source spreadsheet, reporting progress
/// over `progress` as each row completes and once more at termination.
pub async fn run_import(
    job: &Job,
    run: &Run,
    client: Client,
    fetcher: &dyn VocabularyFetcher,
    handle_client: &dyn HandleClient,
    options: ImportOptions<'_>,
    progress: UnboundedSender<ImportProgress>,
) -> ImportResultT<ImportState> {
    let config = job.load_config()?;
    let spreadsheet = MetadataSpreadsheet::open(job.source_csv_path(), (options.model.header_map)())?;

    let mut completed_log = open_completed_log(job.completed_log_path())?;
    let mut dropped_invalid = run.dropped_invalid_log()?;
    let mut dropped_failed = run.dropped_failed_log()?;

    let completed: HashSet<String> = completed_log.iter().map(|c| c.id.clone()).collect();
    let mut counts = ImportCounts {
        total_items: spreadsheet.total(),
        initially_completed_items: completed.len(),
        ..Default::default()
    };

    let rows = spreadsheet.rows(options.limit, options.percentage, completed)?;

    for outcome in rows {
        counts.rows += 1;
        match outcome? {
            RowOutcome::Invalid(invalid) => {
                counts.invalid_items += 1;
                dropped_invalid.append(DroppedItem {
                    id: invalid.line_reference.clone(),
                    timestamp: now_rfc3339(),
                    title: String::new(),
                    uri: String::new(),
                    reason: invalid.reason,
                })?;
                send_progress(&progress, &counts, None);
            }
            RowOutcome::Row(row) => {
                let result = process_row(&client, &config, &options, fetcher, handle_client, &row).await;
                match result {
                    Ok(RowResult::Valid { created, updated, files }) => {
                        counts.valid_items += 1;
                        counts.files += files;
                        if created {
                            counts.created_items += 1;
                        } else if updated {
                            counts.updated_items += 1;
                        } else {
                            counts.unchanged_items += 1;
                        }
                        if !options.validate_only && !options.dry_run {
                            let status = if created { "CREATED" } else if updated { "MODIFIED" } else { "UNCHANGED" };
                            completed_log.append(CompletedItem {
                                id: row.identifier.clone(),
                                timestamp: now_rfc3339(),
                                title: row.identifier.clone(),
                                uri: row.uri.clone(),
                                status: status.to_string(),
                            })?;
                        }
                    }
                    Ok(RowResult::Invalid(reason)) => {
                        counts.invalid_items += 1;
                        dropped_invalid.append(DroppedItem {
                            id: row.identifier.clone(),
                            timestamp: now_rfc3339(),
                            title: row.identifier.clone(),
                            uri: row.uri.clone(),
                            reason,
                        })?;
                    }
                    Err(e) => {
                        counts.errors += 1;
                        dropped_failed.append(DroppedItem {
                            id: row.identifier.clone(),
                            timestamp: now_rfc3339(),
                            title: row.identifier.clone(),
                            uri: row.uri.clone(),
                            reason: e.to_string(),
                        })?;
                        warn!(identifier = %row.identifier, error = %e, "row import failed");
                    }
                }
                send_progress(&progress, &counts, None);
            }
        }
    }

    let state = if options.validate_only {
        if counts.invalid_items == 0 {
            ImportState::ValidateSuccess
        } else {
            ImportState::ValidateFailed
        }
    } else if counts.errors == 0 && counts.invalid_items == 0 {
        ImportState::ImportComplete
    } else {
        ImportState::ImportIncomplete
    };

    send_progress(&progress, &counts, Some(state));
    info!(?state, rows = counts.rows, "import run finished");
    Ok(state)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn send_progress(progress: &UnboundedSender<ImportProgress>, counts: &ImportCounts, state: Option<ImportState>) {
    let _ = progress.send(ImportProgress { counts: *counts, state });
}

async fn process_row(
    client: &Client,
    config: &JobConfig,
    options: &ImportOptions<'_>,
    fetcher: &dyn VocabularyFetcher,
    handle_client: &dyn HandleClient,
    row: &Row,
) -> ImportResultT<RowResult> {
    if row.has_files() || row.has_item_files() {
        let Some(location) = &config.binaries_location else {
            return Ok(RowResult::Invalid(
                "row names files but the job has no binaries location configured".to_string(),
            ));
        };
        for filename in row.filenames() {
            let source = open_binary_source(location, filename, options.http_client.clone())?;
            if !source.exists().await? {
                return Ok(RowResult::Invalid(format!("file '{filename}' does not exist at {location}")));
            }
        }
    }

    let description = options.model.parse(&row.uri, &row.fields, &row.index);
    let validation = options.model.validate(&description, fetcher).await;
    if !validation.ok() {
        return Ok(RowResult::Invalid(format_validation_failures(&validation)));
    }

    if options.validate_only {
        return Ok(RowResult::Valid {
            created: false,
            updated: false,
            files: 0,
        });
    }

    if !row.has_uri() {
        if options.dry_run {
            return Ok(RowResult::Valid {
                created: true,
                updated: false,
                files: 0,
            });
        }
        let files = create_row(client, config, options, handle_client, row).await?;
        return Ok(RowResult::Valid {
            created: true,
            updated: false,
            files,
        });
    }

    // Patch path: re-read the resource before diffing so server-managed and
    // otherwise-added triples survive the round trip.
    let existing = client.get_graph(&row.uri).await?;
    let updated_graph = options.model.serialize(&description);
    let changeset = crate::rdf::create_repo_changeset(&existing, &updated_graph);
    if changeset.is_empty() {
        return Ok(RowResult::Valid {
            created: false,
            updated: false,
            files: 0,
        });
    }
    if options.dry_run {
        return Ok(RowResult::Valid {
            created: false,
            updated: true,
            files: 0,
        });
    }
    let update = build_sparql_update(&changeset.deletes, &changeset.inserts);
    client.patch_graph(&row.uri, &update).await?;
    Ok(RowResult::Valid {
        created: false,
        updated: true,
        files: 0,
    })
}

fn format_validation_failures(results: &ValidationResults) -> String {
    results
        .failures()
        .map(|(attr, result)| match result {
            crate::content_model::ValidationResult::Failure { message } => format!("{attr} {message}"),
            crate::content_model::ValidationResult::Success => String::new(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// The create path, run inside one transaction.
/// Returns the count of binaries attached.
async fn create_row(
    client: &Client,
    config: &JobConfig,
    options: &ImportOptions<'_>,
    handle_client: &dyn HandleClient,
    row: &Row,
) -> ImportResultT<usize> {
    let container = config.container.clone();
    let binaries_location = config.binaries_location.clone();
    let http_client = options.http_client.clone();
    let model = options.model;
    let extract_text_types = config.extract_text_types.clone();

    with_transaction(client.clone(), options.keep_alive_seconds, move |tx| async move {
        let result = create_row_inner(
            &tx,
            &container,
            model,
            row,
            &binaries_location,
            &extract_text_types,
            http_client,
            handle_client,
            row.publish,
        )
        .await;
        (tx, result)
    })
    .await
}

#[allow(clippy::too_many_arguments)]
async fn create_row_inner(
    tx: &TransactionClient,
    container: &str,
    model: &ModelDef,
    row: &Row,
    binaries_location: &Option<String>,
    extract_text_types: &[String],
    http_client: reqwest::Client,
    handle_client: &dyn HandleClient,
    publish: bool,
) -> ImportResultT<usize> {
    // Step 1: mint the main resource inside the configured container.
    let created = tx.create(container, None, TURTLE, Vec::new()).await?;
    let uri = created.uri.clone();
    let description_uri = created.describedby.clone().unwrap_or_else(|| uri.clone());

    // Re-parse the row rooted at the real URI now that it's known, reusing
    // the same EmbeddedIndex so embedded fragment ids stay stable.
    let description = model.parse(&uri, &row.fields, &row.index);
    let graph = model.serialize(&description);
    let update = build_sparql_update(&[], &graph.iter().cloned().collect::<Vec<_>>());
    tx.patch_graph(&description_uri, &update).await?;

    let mut files_attached = 0usize;

    // Steps 2-3: page groups under `m/`, files under each page's `f/`, and
    // the ordered proxy sequence under `x/`.
    if row.has_files() {
        let location = binaries_location
            .as_ref()
            .ok_or_else(|| ImportError::NoBinariesLocation(row.identifier.clone()))?;
        let mut pages = Vec::new();
        for (n, group) in row.file_groups.iter().enumerate() {
            let mut sources: Vec<(&str, Box<dyn BinarySource>)> = Vec::new();
            for file in &group.files {
                sources.push((
                    file.filename.as_str(),
                    open_binary_source(location, &file.filename, http_client.clone())?,
                ));
            }
            files_attached += sources.len();
            let page = pcdm::create_page(tx, &uri, group, n + 1, &sources).await?;
            for (filename, file) in group.files.iter().zip(page.files.iter()) {
                maybe_attach_text_annotation(tx, extract_text_types, &sources, filename, file).await?;
            }
            pages.push(page);
        }
        let parent_extra = pcdm::create_proxy_sequence(tx, &uri, &pages).await?;
        if !parent_extra.is_empty() {
            let update = build_sparql_update(&[], &parent_extra);
            tx.patch_graph(&description_uri, &update).await?;
        }
    }

    // Step 4: item-level files, attached directly to the parent.
    if row.has_item_files() {
        let location = binaries_location
            .as_ref()
            .ok_or_else(|| ImportError::NoBinariesLocation(row.identifier.clone()))?;
        for item_file in &row.item_files {
            let source = open_binary_source(location, &item_file.filename, http_client.clone())?;
            pcdm::create_file(tx, &uri, source.as_ref(), &item_file.filename).await?;
            files_attached += 1;
        }
    }

    // Step 5: publish — mint or reuse a handle and set the public URL.
    if publish {
        match handle_client.mint_or_update(&uri, &uri).await {
            Ok(handle) => {
                if let (Ok(s), Ok(p)) = (
                    crate::rdf::NamedNode::new(&description_uri),
                    crate::rdf::RdfPredicate::new("http://purl.org/dc/terms/identifier"),
                ) {
                    let triple = Triple::new(
                        crate::rdf::RdfSubject::NamedNode(s),
                        p,
                        crate::rdf::Literal::new_simple(&handle.url).into(),
                    );
                    let update = build_sparql_update(&[], std::slice::from_ref(&triple));
                    tx.patch_graph(&description_uri, &update).await?;
                }
            }
            Err(e) => {
                warn!(uri = %uri, error = %e, "handle minting failed; resource created without a public handle");
            }
        }
    }

    Ok(files_attached)
}

/// For each HTML file among the sources just attached to a page, extract
/// its plain text and attach it as a full-text annotation targeting that
/// file, before the row's main create step continues.
async fn maybe_attach_text_annotation(
    tx: &TransactionClient,
    extract_text_types: &[String],
    sources: &[(&str, Box<dyn BinarySource>)],
    filename: &crate::spreadsheet::GroupedFile,
    created_file: &pcdm::CreatedFile,
) -> ImportResultT<()> {
    if extract_text_types.is_empty() {
        return Ok(());
    }
    let Some((_, source)) = sources.iter().find(|(name, _)| *name == filename.filename.as_str()) else {
        return Ok(());
    };
    let mimetype = source.mimetype().await?.unwrap_or_default();
    if !extract_text_types.iter().any(|t| t == &mimetype) {
        return Ok(());
    }
    let bytes = source.open().await?;
    let Some(text) = extract_plain_text(&bytes) else {
        warn!(filename = %filename.filename, "could not decode HTML member as text; dropping annotation");
        return Ok(());
    };
    let fragment_id = format!("text-{}", uuid::Uuid::new_v4());
    let triples = build_text_annotation(&created_file.uri, &fragment_id, &created_file.uri, &text);
    let update = build_sparql_update(&[], &triples);
    tx.patch_graph(&created_file.uri, &update).await?;
    Ok(())
}
