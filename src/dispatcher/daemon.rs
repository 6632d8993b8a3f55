//! The message-driven job dispatcher. Connects to a STOMP broker,
//! persists incoming commands to a durable inbox keyed by job id, watches
//! that inbox for new files, runs the matching engine (import, update, or
//! publish) in a bounded worker pool, streams progress to a topic, and
//! delivers the terminal response through a durable outbox so a broker
//! disconnect (or a process crash) never loses a finished job's result —
//! terminal delivery is at-least-once.
//!
//! Grounded on `original_source/plastron-stomp/.../daemon.py`, `broker.py`,
//! `inbox_watcher.py`, and `listeners.py` for the daemon/broker/watcher/
//! listener shapes, and on the connection-handling loop in
//! `src/protocol/server.rs` for the "decode frames off a buffer, dispatch,
//! write the response back" shape.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::content_model::{ModelRegistry, VocabularyFetcher};
use crate::handle::HandleClient;
use crate::import::{self, ImportOptions, ImportProgress};
use crate::jobs::{run_timestamp, Job, JobConfig, JobStore, JobStoreError};
use crate::publish::{self, PublishOptions, PublishProgress};
use crate::repo::{Client, Endpoint};
use crate::update::{self, UpdateOptions, UpdateProgress};

use super::boxes::MessageBox;
use super::broker::{self, BrokerAddress, BrokerError, BrokerReader, BrokerWriter};
use super::command::{IncomingCommand, JobKind, ERROR_HEADER, JOB_ID_HEADER, STATE_HEADER};
use super::frame::{FrameError, StompFrame};
use super::watcher::InboxWatcher;

pub use super::command::{DispatchError, DispatchResult};

const ASYNC_SUBSCRIPTION_ID: &str = "ldpipe-async";
const SYNC_SUBSCRIPTION_ID: &str = "ldpipe-sync";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Watch(#[from] notify::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;

/// Static configuration for one dispatcher instance.
pub struct DispatcherConfig {
    pub broker: BrokerAddress,
    pub async_queue: String,
    pub sync_queue: String,
    pub status_queue: String,
    pub progress_topic: String,
    pub endpoint: Endpoint,
    pub jobs_root: PathBuf,
    pub inbox_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    pub default_keep_alive_seconds: u64,
}

#[derive(Deserialize)]
struct UpdatePayload {
    starting_uris: Vec<String>,
    sparql_update: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    traverse_predicates: Vec<String>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    use_transactions: bool,
}

#[derive(Deserialize)]
struct PublishPayload {
    uris: Vec<String>,
    #[serde(default)]
    force_hidden: bool,
    #[serde(default)]
    force_visible: bool,
    #[serde(default)]
    use_transactions: bool,
}

/// What a finished or in-progress job sends back through the broker
/// connection. Kept as an enum over a single channel so the event loop's
/// "things I might need to write to the broker" branch only ever borrows
/// the writer once.
enum OutgoingMessage {
    Progress(StompFrame),
    Terminal { job_id: String, frame: StompFrame },
}

pub struct Dispatcher {
    config: DispatcherConfig,
    job_store: JobStore,
    inbox: MessageBox,
    outbox: MessageBox,
    handle_client: Arc<dyn HandleClient>,
    vocabulary_fetcher: Arc<dyn VocabularyFetcher>,
    http_client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        handle_client: Arc<dyn HandleClient>,
        vocabulary_fetcher: Arc<dyn VocabularyFetcher>,
    ) -> std::io::Result<Arc<Self>> {
        let inbox = MessageBox::open(&config.inbox_dir, "inbox")?;
        let outbox = MessageBox::open(&config.outbox_dir, "outbox")?;
        let job_store = JobStore::new(&config.jobs_root);
        let max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        Ok(Arc::new(Self {
            config,
            job_store,
            inbox,
            outbox,
            handle_client,
            vocabulary_fetcher,
            http_client: reqwest::Client::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
        }))
    }

    /// Run forever, reconnecting to the broker on any connection error.
    /// Spec.md §7: "Broker disconnects abort the dispatcher, which is then
    /// reconnected by the surrounding thread."
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.clone().run_once().await {
                Ok(()) => {
                    info!("dispatcher loop exited cleanly");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "dispatcher connection lost; reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn run_once(self: Arc<Self>) -> DaemonResult<()> {
        let (mut writer, mut reader) = broker::connect(&self.config.broker).await?;

        // At-least-once terminal delivery: replay whatever the outbox still
        // holds from a previous crash before touching anything new.
        self.replay_outbox(&mut writer).await?;

        writer.subscribe(&self.config.async_queue, ASYNC_SUBSCRIPTION_ID, "client-individual").await?;
        writer.subscribe(&self.config.sync_queue, SYNC_SUBSCRIPTION_ID, "client-individual").await?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<OutgoingMessage>();
        let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<PathBuf>();
        let _watcher = InboxWatcher::watch(&self.config.inbox_dir, watch_tx)?;

        // Startup reconciliation: a file already sitting in the inbox with
        // no corresponding outbox entry was left over by a crash before it
        // was dispatched. The watcher only sees *new* creations, so these
        // would otherwise sit untouched forever.
        for job_id in self.inbox.job_ids()? {
            if self.outbox.get(&job_id)?.is_none() {
                self.clone().dispatch_job(job_id, outgoing_tx.clone());
            }
        }

        loop {
            tokio::select! {
                frame = reader.recv() => {
                    match frame? {
                        None => return Err(BrokerError::Closed.into()),
                        Some(frame) if frame.command == "MESSAGE" => {
                            self.handle_incoming(&mut writer, frame, &outgoing_tx).await?;
                        }
                        Some(frame) if frame.command == "ERROR" => {
                            warn!(message = ?frame.header("message"), "broker sent an ERROR frame");
                        }
                        Some(_) => {}
                    }
                }
                Some(path) = watch_rx.recv() => {
                    if let Some(job_id) = job_id_from_path(&path) {
                        self.clone().dispatch_job(job_id, outgoing_tx.clone());
                    }
                }
                Some(message) = outgoing_rx.recv() => {
                    self.send_outgoing(&mut writer, message).await;
                }
            }
        }
    }

    async fn replay_outbox(&self, writer: &mut BrokerWriter) -> DaemonResult<()> {
        for job_id in self.outbox.job_ids()? {
            let Some(bytes) = self.outbox.get(&job_id)? else { continue };
            let mut buf = BytesMut::from(&bytes[..]);
            let Some(frame) = StompFrame::decode(&mut buf)? else { continue };
            writer.send(frame).await?;
            self.outbox.remove(&job_id)?;
            self.inbox.remove(&job_id)?;
            info!(job_id = %job_id, "replayed terminal response from outbox after reconnect");
        }
        Ok(())
    }

    /// Persist a newly arrived `MESSAGE` frame to the inbox and ack it.
    /// Processing itself happens off the inbox watcher's creation event,
    /// not here, so a restart between this ack and that dispatch still
    /// picks the job back up via startup reconciliation.
    async fn handle_incoming(
        self: &Arc<Self>,
        writer: &mut BrokerWriter,
        frame: StompFrame,
        _outgoing_tx: &mpsc::UnboundedSender<OutgoingMessage>,
    ) -> DaemonResult<()> {
        let ack_id = frame.header("ack").map(str::to_string);
        match IncomingCommand::from_frame(&frame) {
            Ok(cmd) => {
                // `inbox.put` renames the file into place, which the watcher
                // observes as a `Create` event and dispatches from. Don't
                // also dispatch here, or the job runs twice.
                self.inbox.put(&cmd.job_id, &frame.encode())?;
                if let Some(ack_id) = &ack_id {
                    writer.ack(ack_id).await?;
                }
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed command message");
                if let Some(ack_id) = &ack_id {
                    writer.ack(ack_id).await?;
                }
            }
        }
        Ok(())
    }

    async fn send_outgoing(&self, writer: &mut BrokerWriter, message: OutgoingMessage) {
        match message {
            OutgoingMessage::Progress(frame) => {
                if let Err(e) = writer.send(frame).await {
                    warn!(error = %e, "failed to publish a progress message");
                }
            }
            OutgoingMessage::Terminal { job_id, frame } => match writer.send(frame).await {
                Ok(()) => {
                    if let Err(e) = self.outbox.remove(&job_id) {
                        warn!(job_id = %job_id, error = %e, "failed to remove outbox entry after delivery");
                    }
                    if let Err(e) = self.inbox.remove(&job_id) {
                        warn!(job_id = %job_id, error = %e, "failed to remove inbox entry after delivery");
                    }
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "terminal response send failed; outbox entry kept for replay");
                }
            },
        }
    }

    /// Spawn one job's processing in the bounded worker pool: each accepted
    /// job runs in a pooled worker, bounded by `max_concurrent_jobs`.
    fn dispatch_job(self: Arc<Self>, job_id: String, outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>) {
        tokio::spawn(async move {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(e) = self.process_job(&job_id, &outgoing_tx).await {
                error!(job_id = %job_id, error = %e, "job processing failed to even produce a terminal response");
            }
            drop(permit);
        });
    }

    async fn process_job(&self, job_id: &str, outgoing_tx: &mpsc::UnboundedSender<OutgoingMessage>) -> DaemonResult<()> {
        let Some(bytes) = self.inbox.get(job_id)? else {
            // Already answered (outbox replay or a previous worker run) and
            // removed; nothing left to do.
            return Ok(());
        };
        let mut buf = BytesMut::from(&bytes[..]);
        let Some(frame) = StompFrame::decode(&mut buf)? else {
            warn!(job_id = %job_id, "inbox entry did not decode as a frame; dropping");
            self.inbox.remove(job_id)?;
            return Ok(());
        };
        let cmd = IncomingCommand::from_frame(&frame)?;
        let is_sync = frame.header("subscription") == Some(SYNC_SUBSCRIPTION_ID);

        debug!(job_id = %job_id, command = %cmd.command, sync = is_sync, "dispatching job");

        let result = match cmd.kind() {
            Ok(JobKind::Import) => self.run_import(&cmd, outgoing_tx).await,
            Ok(JobKind::Update) => self.run_update(&cmd, outgoing_tx).await,
            Ok(JobKind::Publish) => self.run_publish(&cmd, "publish", outgoing_tx).await,
            Ok(JobKind::Unpublish) => self.run_publish(&cmd, "unpublish", outgoing_tx).await,
            Err(e) => Err(e.into()),
        };

        let terminal_frame = match result {
            Ok(frame) => frame,
            Err(e) => error_frame(&cmd.job_id, &e),
        };

        let destination = if is_sync {
            cmd.reply_to.clone().unwrap_or_else(|| self.config.status_queue.clone())
        } else {
            self.config.status_queue.clone()
        };
        let terminal_frame = terminal_frame.with_header("destination", destination);

        self.outbox.put(job_id, &terminal_frame.encode())?;
        let _ = outgoing_tx.send(OutgoingMessage::Terminal {
            job_id: job_id.to_string(),
            frame: terminal_frame,
        });
        Ok(())
    }

    fn ensure_job(&self, job_id: &str, default_model: &str) -> Result<Job, JobStoreError> {
        match self.job_store.get_job(job_id) {
            Ok(job) => Ok(job),
            Err(JobStoreError::NotFound(_)) => self.job_store.create_job(JobConfig {
                job_id: job_id.to_string(),
                model: default_model.to_string(),
                access: None,
                member_of: None,
                container: String::new(),
                binaries_location: None,
                extract_text_types: Vec::new(),
            }),
            Err(e) => Err(e),
        }
    }

    fn import_job_config(&self, cmd: &IncomingCommand) -> DispatchResult<JobConfig> {
        let model = cmd
            .arg("model")
            .ok_or_else(|| DispatchError::MalformedPayload("import command missing a 'model' arg".to_string()))?
            .to_string();
        let container = cmd
            .arg("container")
            .ok_or_else(|| DispatchError::MalformedPayload("import command missing a 'container' arg".to_string()))?
            .to_string();
        Ok(JobConfig {
            job_id: cmd.job_id.clone(),
            model,
            access: cmd.arg("access").map(str::to_string),
            member_of: cmd.arg("member-of").map(str::to_string),
            container,
            binaries_location: cmd.arg("binaries-location").map(str::to_string),
            extract_text_types: cmd
                .arg("extract-text-types")
                .map(|s| s.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    async fn run_import(&self, cmd: &IncomingCommand, outgoing_tx: &mpsc::UnboundedSender<OutgoingMessage>) -> DispatchResult<StompFrame> {
        let job = match self.job_store.get_job(&cmd.job_id) {
            Ok(job) => job,
            Err(JobStoreError::NotFound(_)) => self.job_store.create_job(self.import_job_config(cmd)?)?,
            Err(e) => return Err(e.into()),
        };
        if !cmd.body.is_empty() {
            std::fs::write(job.source_csv_path(), &cmd.body)?;
        }
        let config = job.load_config()?;
        let model = ModelRegistry::global().get(&config.model)?;
        let run = job.new_run(&run_timestamp(Utc::now()))?;

        let options = ImportOptions {
            model,
            limit: cmd.arg("limit").and_then(|s| s.parse().ok()),
            percentage: cmd.arg("percentage").and_then(|s| s.parse().ok()),
            validate_only: cmd.arg("validate-only").is_some_and(|s| s == "true"),
            dry_run: cmd.arg("dry-run").is_some_and(|s| s == "true"),
            keep_alive_seconds: cmd
                .arg("keep-alive-seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(self.config.default_keep_alive_seconds),
            http_client: self.http_client.clone(),
        };
        let client = Client::new(self.config.endpoint.clone());

        let (progress_tx, progress_rx) = mpsc::unbounded_channel::<ImportProgress>();
        let forwarder = self.spawn_progress_forwarder(cmd.job_id.clone(), progress_rx, outgoing_tx.clone());

        let state = import::run_import(&job, &run, client, self.vocabulary_fetcher.as_ref(), self.handle_client.as_ref(), options, progress_tx)
            .await
            .map_err(DispatchError::from);
        let _ = forwarder.await;

        Ok(state_frame(&cmd.job_id, state?))
    }

    async fn run_update(&self, cmd: &IncomingCommand, outgoing_tx: &mpsc::UnboundedSender<OutgoingMessage>) -> DispatchResult<StompFrame> {
        let payload: UpdatePayload = serde_json::from_slice(&cmd.body).map_err(|e| DispatchError::MalformedPayload(e.to_string()))?;
        let job = self.ensure_job(&cmd.job_id, payload.model.as_deref().unwrap_or(""))?;
        let run = job.new_run(&run_timestamp(Utc::now()))?;
        let model = match &payload.model {
            Some(name) => Some(ModelRegistry::global().get(name)?),
            None => None,
        };
        let options = UpdateOptions {
            starting_uris: payload.starting_uris,
            sparql_update: payload.sparql_update,
            model,
            traverse_predicates: payload.traverse_predicates,
            dry_run: payload.dry_run,
            use_transactions: payload.use_transactions,
            keep_alive_seconds: self.config.default_keep_alive_seconds,
        };
        let client = Client::new(self.config.endpoint.clone());

        let (progress_tx, progress_rx) = mpsc::unbounded_channel::<UpdateProgress>();
        let forwarder = self.spawn_progress_forwarder(cmd.job_id.clone(), progress_rx, outgoing_tx.clone());

        let state = update::run_update(&job, &run, client, self.vocabulary_fetcher.as_ref(), options, progress_tx)
            .await
            .map_err(DispatchError::from);
        let _ = forwarder.await;

        Ok(state_frame(&cmd.job_id, state?))
    }

    async fn run_publish(
        &self,
        cmd: &IncomingCommand,
        action: &str,
        outgoing_tx: &mpsc::UnboundedSender<OutgoingMessage>,
    ) -> DispatchResult<StompFrame> {
        let payload: PublishPayload = serde_json::from_slice(&cmd.body).map_err(|e| DispatchError::MalformedPayload(e.to_string()))?;
        let job = self.ensure_job(&cmd.job_id, "")?;
        let client = Client::new(self.config.endpoint.clone());
        let options = PublishOptions {
            action: action.to_string(),
            force_hidden: payload.force_hidden,
            force_visible: payload.force_visible,
            use_transactions: payload.use_transactions,
            keep_alive_seconds: self.config.default_keep_alive_seconds,
        };

        let (progress_tx, progress_rx) = mpsc::unbounded_channel::<PublishProgress>();
        let forwarder = self.spawn_progress_forwarder(cmd.job_id.clone(), progress_rx, outgoing_tx.clone());

        let state = publish::run_publish(&job, client, self.handle_client.as_ref(), options, payload.uris, progress_tx)
            .await
            .map_err(DispatchError::from);
        let _ = forwarder.await;

        Ok(state_frame(&cmd.job_id, state?))
    }

    /// Stream every progress object a running engine yields to the
    /// progress topic, tagged with the job id. The returned handle resolves
    /// once the channel is closed, i.e. once the engine call that owns
    /// `progress_tx` has returned.
    fn spawn_progress_forwarder<P>(
        &self,
        job_id: String,
        mut progress_rx: mpsc::UnboundedReceiver<P>,
        outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>,
    ) -> tokio::task::JoinHandle<()>
    where
        P: serde::Serialize + Send + 'static,
    {
        let destination = self.config.progress_topic.clone();
        tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let Ok(body) = serde_json::to_vec(&progress) else { continue };
                let frame = StompFrame::new("SEND")
                    .with_header("destination", destination.clone())
                    .with_header(JOB_ID_HEADER, job_id.clone())
                    .with_header("content-type", "application/json")
                    .with_body(body);
                let _ = outgoing_tx.send(OutgoingMessage::Progress(frame));
            }
        })
    }
}

fn job_id_from_path(path: &std::path::Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let decoded = percent_encoding::percent_decode_str(stem).decode_utf8().ok()?;
    Some(decoded.into_owned())
}

/// Build the terminal `SEND` frame for a successful run: a `state` header
/// plus a JSON body carrying the same value.
fn state_frame<S: serde::Serialize>(job_id: &str, state: S) -> StompFrame {
    let state_value = serde_json::to_value(&state).unwrap_or(serde_json::Value::Null);
    let state_label = state_value.as_str().map(str::to_string).unwrap_or_else(|| state_value.to_string());
    let body = serde_json::json!({ "state": state_value }).to_string();
    StompFrame::new("SEND")
        .with_header(JOB_ID_HEADER, job_id.to_string())
        .with_header(STATE_HEADER, state_label)
        .with_header("content-type", "application/json")
        .with_body(body.into_bytes())
}

/// Build the terminal frame for a failed run, carrying `PlastronJobError`
/// instead of `state`.
fn error_frame(job_id: &str, error: &DispatchError) -> StompFrame {
    StompFrame::new("SEND")
        .with_header(JOB_ID_HEADER, job_id.to_string())
        .with_header(ERROR_HEADER, error.to_string())
        .with_header("content-type", "text/plain")
        .with_body(error.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_from_path_decodes_percent_escapes() {
        let path = std::path::Path::new("/tmp/inbox/import%2Fbatch%3A42.inbox");
        assert_eq!(job_id_from_path(path).as_deref(), Some("import/batch:42"));
    }

    #[test]
    fn state_frame_carries_both_header_and_body() {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "snake_case")]
        enum Fake {
            ImportComplete,
        }
        let frame = state_frame("job-1", Fake::ImportComplete);
        assert_eq!(frame.header(STATE_HEADER), Some("import_complete"));
        assert!(frame.body_str().unwrap().contains("import_complete"));
    }

    #[test]
    fn error_frame_carries_the_error_header() {
        let frame = error_frame("job-1", &DispatchError::UnknownCommand("export".to_string()));
        assert!(frame.header(ERROR_HEADER).is_some());
    }
}
