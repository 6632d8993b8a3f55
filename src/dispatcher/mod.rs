//! The message dispatcher: a STOMP-driven front end that turns broker
//! commands into import/update/publish runs, with durable at-least-once
//! delivery of the terminal response.

mod boxes;
mod broker;
mod command;
mod daemon;
mod frame;
mod watcher;

pub use boxes::MessageBox;
pub use broker::{BrokerAddress, BrokerError, BrokerReader, BrokerResult, BrokerWriter};
pub use command::{
    base_response_headers, DispatchError, DispatchResult, IncomingCommand, JobKind, ARG_PREFIX, COMMAND_HEADER, ERROR_HEADER,
    JOB_ID_HEADER, STATE_HEADER,
};
pub use daemon::{DaemonError, DaemonResult, Dispatcher, DispatcherConfig};
pub use frame::{FrameError, FrameResult, StompFrame};
pub use watcher::InboxWatcher;
