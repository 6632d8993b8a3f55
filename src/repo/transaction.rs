//! The transaction client. Wraps `Client` with transaction lifecycle,
//! a background keep-alive worker, and URI rewriting in both directions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::rdf::Graph;

use super::client::{Client, ClientError, Created};
use super::rewrite::{insert_transaction_uri, remove_transaction_uri, rewrite_graph};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("a transaction is already active on this client")]
    AlreadyActive,
    #[error("no transaction is active on this client")]
    NotActive,
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Shared failure state the keep-alive task and the foreground client both
/// observe; flipped once and never reset within the life of one
/// transaction.
#[derive(Clone)]
struct FailureFlag {
    failed: Arc<AtomicBool>,
    cause: Arc<Mutex<Option<String>>>,
}

impl FailureFlag {
    fn new() -> Self {
        Self {
            failed: Arc::new(AtomicBool::new(false)),
            cause: Arc::new(Mutex::new(None)),
        }
    }

    fn is_set(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    async fn set(&self, cause: String) {
        self.failed.store(true, Ordering::SeqCst);
        *self.cause.lock().await = Some(cause);
    }

    async fn cause(&self) -> String {
        self.cause
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| "transaction keep-alive failed".to_string())
    }
}

/// An open server-side transaction: its scoped URL and the handle to its
/// background keep-alive task.
struct ActiveTransaction {
    tx_url: String,
    failure: FailureFlag,
    keep_alive: Option<JoinHandle<()>>,
}

/// Wraps a base `Client` and adds transaction lifecycle management. Only
/// one transaction may be active per `TransactionClient` at a time.
pub struct TransactionClient {
    client: Client,
    tx: Option<ActiveTransaction>,
}

impl TransactionClient {
    pub fn new(client: Client) -> Self {
        Self { client, tx: None }
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    pub fn transaction_url(&self) -> Option<&str> {
        self.tx.as_ref().map(|t| t.tx_url.as_str())
    }

    /// Begin a transaction and start its keep-alive worker. Nesting is
    /// disallowed.
    pub async fn begin(&mut self, keep_alive_seconds: u64) -> TransactionResult<()> {
        if self.tx.is_some() {
            return Err(TransactionError::AlreadyActive);
        }
        let response = self
            .client
            .post(
                &self.client.endpoint().transaction_creation_url(),
                HeaderMap::new(),
                Vec::new(),
            )
            .await?;
        let tx_url = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                TransactionError::TransactionFailed("no Location header on fcr:tx response".into())
            })?;

        let failure = FailureFlag::new();
        let keep_alive = spawn_keep_alive(
            self.client.endpoint().url().to_string(),
            tx_url.clone(),
            Duration::from_secs(keep_alive_seconds),
            failure.clone(),
        );

        info!(tx_url = %tx_url, "began transaction");
        self.tx = Some(ActiveTransaction {
            tx_url,
            failure,
            keep_alive: Some(keep_alive),
        });
        Ok(())
    }

    async fn stop_keep_alive(&mut self) {
        if let Some(tx) = self.tx.as_mut() {
            if let Some(handle) = tx.keep_alive.take() {
                handle.abort();
            }
        }
    }

    pub async fn commit(&mut self) -> TransactionResult<()> {
        self.stop_keep_alive().await;
        let tx = self.tx.take().ok_or(TransactionError::NotActive)?;
        if tx.failure.is_set() {
            warn!(tx_url = %tx.tx_url, "keep-alive failed before commit; rolling back instead");
            self.client
                .post(&format!("{}/fcr:tx/fcr:rollback", tx.tx_url), HeaderMap::new(), Vec::new())
                .await?;
            return Err(TransactionError::TransactionFailed(
                "transaction keep-alive previously failed; rolled back instead of committing".to_string(),
            ));
        }
        self.client
            .post(&format!("{}/fcr:tx/fcr:commit", tx.tx_url), HeaderMap::new(), Vec::new())
            .await?;
        info!(tx_url = %tx.tx_url, "committed transaction");
        Ok(())
    }

    pub async fn rollback(&mut self) -> TransactionResult<()> {
        self.stop_keep_alive().await;
        let tx = self.tx.take().ok_or(TransactionError::NotActive)?;
        self.client
            .post(&format!("{}/fcr:tx/fcr:rollback", tx.tx_url), HeaderMap::new(), Vec::new())
            .await?;
        warn!(tx_url = %tx.tx_url, "rolled back transaction");
        Ok(())
    }

    fn check_failure(&self) -> TransactionResult<()> {
        if let Some(tx) = &self.tx {
            if tx.failure.is_set() {
                return Err(TransactionError::TransactionFailed(
                    "transaction keep-alive previously failed".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn scope(&self, uri: &str) -> String {
        match &self.tx {
            Some(tx) => insert_transaction_uri(uri, self.client.endpoint().url(), &tx.tx_url),
            None => uri.to_string(),
        }
    }

    fn unscope(&self, uri: &str) -> String {
        match &self.tx {
            Some(tx) => remove_transaction_uri(uri, self.client.endpoint().url(), &tx.tx_url),
            None => uri.to_string(),
        }
    }

    fn unscope_graph(&self, graph: Graph) -> Graph {
        match &self.tx {
            Some(tx) => rewrite_graph(&graph, &tx.tx_url, self.client.endpoint().url()),
            None => graph,
        }
    }

    pub async fn get_graph(&self, uri: &str) -> TransactionResult<Graph> {
        self.check_failure()?;
        let scoped = self.scope(uri);
        let graph = self.client.get_graph(&scoped).await?;
        Ok(self.unscope_graph(graph))
    }

    pub async fn put_graph(&self, uri: &str, graph: &Graph) -> TransactionResult<()> {
        self.check_failure()?;
        let scoped_uri = self.scope(uri);
        let scoped_graph = match &self.tx {
            Some(tx) => rewrite_graph(graph, self.client.endpoint().url(), &tx.tx_url),
            None => graph.clone(),
        };
        self.client.put_graph(&scoped_uri, &scoped_graph).await?;
        Ok(())
    }

    pub async fn patch_graph(&self, uri: &str, sparql_update: &str) -> TransactionResult<()> {
        self.check_failure()?;
        let scoped = self.scope(uri);
        self.client.patch_graph(&scoped, sparql_update).await?;
        Ok(())
    }

    pub async fn create(
        &self,
        container_uri: &str,
        slug: Option<&str>,
        content_type: &str,
        body: Vec<u8>,
    ) -> TransactionResult<Created> {
        self.check_failure()?;
        let scoped = self.scope(container_uri);
        let created = self.client.create(&scoped, slug, content_type, body).await?;
        Ok(Created {
            uri: self.unscope(&created.uri),
            describedby: created.describedby.map(|d| self.unscope(&d)),
        })
    }

    pub async fn create_binary(
        &self,
        container_uri: &str,
        slug: Option<&str>,
        content_type: &str,
        digest: &str,
        filename: &str,
        body: Vec<u8>,
    ) -> TransactionResult<Created> {
        self.check_failure()?;
        let scoped = self.scope(container_uri);
        let created = self
            .client
            .create_binary(&scoped, slug, content_type, digest, filename, body)
            .await?;
        Ok(Created {
            uri: self.unscope(&created.uri),
            describedby: created.describedby.map(|d| self.unscope(&d)),
        })
    }

    pub async fn exists(&self, uri: &str) -> TransactionResult<bool> {
        self.check_failure()?;
        let scoped = self.scope(uri);
        Ok(self.client.exists(&scoped).await?)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn spawn_keep_alive(
    endpoint_url: String,
    tx_url: String,
    interval: Duration,
    failure: FailureFlag,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let http = reqwest::Client::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let response = http
                .post(format!("{}/fcr:tx", tx_url))
                .send()
                .await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    debug!(tx_url = %tx_url, endpoint = %endpoint_url, "keep-alive ok");
                }
                Ok(resp) => {
                    let cause = format!("keep-alive ping returned {}", resp.status());
                    error!(tx_url = %tx_url, %cause, "transaction keep-alive failed");
                    failure.set(cause).await;
                    break;
                }
                Err(e) => {
                    let cause = format!("keep-alive ping failed: {e}");
                    error!(tx_url = %tx_url, %cause, "transaction keep-alive failed");
                    failure.set(cause).await;
                    break;
                }
            }
        }
    })
}

/// Run `body` inside a fresh transaction: begin, run, commit on success or
/// roll back on error, keep-alive always stopped. This is the "scoped
/// acquisition" pattern engines use so no transaction is ever leaked.
pub async fn with_transaction<F, Fut, T, E>(
    client: Client,
    keep_alive_seconds: u64,
    body: F,
) -> Result<T, E>
where
    F: FnOnce(TransactionClient) -> Fut,
    Fut: std::future::Future<Output = (TransactionClient, Result<T, E>)>,
    E: From<TransactionError>,
{
    let mut tx_client = TransactionClient::new(client);
    tx_client.begin(keep_alive_seconds).await?;
    let (mut tx_client, result) = body(tx_client).await;
    match result {
        Ok(value) => {
            tx_client.commit().await?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx_client.rollback().await;
            Err(e)
        }
    }
}