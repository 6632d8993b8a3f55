//! Command header parsing: `PlastronCommand`, `PlastronJobId`,
//! and zero or more `PlastronArg-<name>` headers are pulled off an incoming
//! `MESSAGE` frame into a plain argument map, and the command name is routed
//! to the engine that handles it, per `plastron-stomp/.../commands/`'s
//! command-name → job-class table.

use std::collections::HashMap;

use thiserror::Error;

use crate::content_model::ModelNotFoundError;
use crate::import::ImportError;
use crate::jobs::{JobConfigError, JobStoreError};
use crate::publish::PublishError;
use crate::update::UpdateError;

use super::frame::StompFrame;

pub const COMMAND_HEADER: &str = "PlastronCommand";
pub const JOB_ID_HEADER: &str = "PlastronJobId";
pub const ARG_PREFIX: &str = "PlastronArg-";
pub const ERROR_HEADER: &str = "PlastronJobError";
pub const STATE_HEADER: &str = "state";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("message is missing the '{0}' header")]
    MissingHeader(&'static str),
    #[error("unrecognized job command '{0}'")]
    UnknownCommand(String),
    #[error("malformed command payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
    #[error(transparent)]
    JobConfig(#[from] JobConfigError),
    #[error(transparent)]
    Model(#[from] ModelNotFoundError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// The command name → engine routing table. `export` is named in the
/// original broker's table but is out of scope for this core, so it is
/// not a variant here; an incoming `export` message falls through
/// `JobKind::parse` to `UnknownCommand` like any other unrecognized name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Import,
    Update,
    Publish,
    Unpublish,
}

impl JobKind {
    pub fn parse(command: &str) -> DispatchResult<Self> {
        match command {
            "import" => Ok(Self::Import),
            "update" => Ok(Self::Update),
            "publish" => Ok(Self::Publish),
            "unpublish" => Ok(Self::Unpublish),
            other => Err(DispatchError::UnknownCommand(other.to_string())),
        }
    }
}

/// One command message, with its headers already pulled apart into a typed
/// shape the rest of the dispatcher works with instead of raw frame bytes.
#[derive(Debug, Clone)]
pub struct IncomingCommand {
    pub command: String,
    pub job_id: String,
    pub args: HashMap<String, String>,
    pub reply_to: Option<String>,
    pub ack_id: Option<String>,
    pub body: Vec<u8>,
}

impl IncomingCommand {
    pub fn from_frame(frame: &StompFrame) -> DispatchResult<Self> {
        let command = frame
            .header(COMMAND_HEADER)
            .ok_or(DispatchError::MissingHeader(COMMAND_HEADER))?
            .to_string();
        let job_id = frame
            .header(JOB_ID_HEADER)
            .ok_or(DispatchError::MissingHeader(JOB_ID_HEADER))?
            .to_string();

        let mut args = HashMap::new();
        for (k, v) in &frame.headers {
            if let Some(name) = k.strip_prefix(ARG_PREFIX) {
                args.insert(name.to_string(), v.clone());
            }
        }

        Ok(Self {
            command,
            job_id,
            args,
            reply_to: frame.header("reply-to").map(str::to_string),
            ack_id: frame.header("ack").map(str::to_string),
            body: frame.body.clone(),
        })
    }

    pub fn kind(&self) -> DispatchResult<JobKind> {
        JobKind::parse(&self.command)
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}

/// Build the response frame's headers shared by every command kind: just
/// the job id; error responses additionally carry the `PlastronJobError`
/// marker (see `ERROR_HEADER`).
pub fn base_response_headers(job_id: &str) -> Vec<(String, String)> {
    vec![(JOB_ID_HEADER.to_string(), job_id.to_string())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_args_and_job_id() {
        let frame = StompFrame::new("MESSAGE")
            .with_header(COMMAND_HEADER, "import")
            .with_header(JOB_ID_HEADER, "import:2024")
            .with_header(format!("{ARG_PREFIX}model"), "Item")
            .with_header(format!("{ARG_PREFIX}container"), "collections/1")
            .with_header("reply-to", "/temp-queue/reply-abc")
            .with_header("ack", "client-42")
            .with_body(b"Title,Identifier\n".to_vec());

        let cmd = IncomingCommand::from_frame(&frame).unwrap();
        assert_eq!(cmd.command, "import");
        assert_eq!(cmd.job_id, "import:2024");
        assert_eq!(cmd.arg("model"), Some("Item"));
        assert_eq!(cmd.arg("container"), Some("collections/1"));
        assert_eq!(cmd.reply_to.as_deref(), Some("/temp-queue/reply-abc"));
        assert_eq!(cmd.kind().unwrap(), JobKind::Import);
    }

    #[test]
    fn missing_job_id_is_an_error() {
        let frame = StompFrame::new("MESSAGE").with_header(COMMAND_HEADER, "import");
        assert!(matches!(
            IncomingCommand::from_frame(&frame),
            Err(DispatchError::MissingHeader(JOB_ID_HEADER))
        ));
    }

    #[test]
    fn unknown_command_name_is_rejected_not_panicked() {
        let frame = StompFrame::new("MESSAGE")
            .with_header(COMMAND_HEADER, "export")
            .with_header(JOB_ID_HEADER, "x");
        let cmd = IncomingCommand::from_frame(&frame).unwrap();
        assert!(matches!(cmd.kind(), Err(DispatchError::UnknownCommand(name)) if name == "export"));
    }
}
