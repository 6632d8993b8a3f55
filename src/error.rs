//! Top-level error type for the CLI and daemon binaries. Library code
//! returns the typed, per-subsystem errors (`RdfError`, `ClientError`,
//! `ImportError`, ...); the two outermost binaries collapse whichever one
//! came back into `IngestError` so a single `main() -> Result<(), IngestError>`
//! can report it.

use thiserror::Error;

use crate::binary::BinarySourceError;
use crate::content_model::ModelNotFoundError;
use crate::dispatcher::DaemonError;
use crate::handle::HandleError;
use crate::import::ImportError;
use crate::jobs::{ItemLogError, JobConfigError, JobStoreError};
use crate::publish::PublishError;
use crate::rdf::RdfError;
use crate::repo::{ClientError, TransactionError};
use crate::spreadsheet::SpreadsheetError;
use crate::update::UpdateError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Rdf(#[from] RdfError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    BinarySource(#[from] BinarySourceError),

    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error(transparent)]
    JobConfig(#[from] JobConfigError),

    #[error(transparent)]
    JobStore(#[from] JobStoreError),

    #[error(transparent)]
    ItemLog(#[from] ItemLogError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error(transparent)]
    Model(#[from] ModelNotFoundError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
