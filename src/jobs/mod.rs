//! Job directory model: per-job configuration and completed-item log,
//! plus the run subdirectories each import/update/publication pass writes
//! its dropped-row logs into.

mod completed;
mod item_log;
mod run;
mod store;

pub use completed::{open_completed_log, CompletedItem, COMPLETED_HEADER};
pub use item_log::{ItemLog, ItemLogError, ItemLogResult};
pub use run::{run_timestamp, DroppedItem, Run, RunState};
pub use store::{Job, JobConfig, JobConfigError, JobStore, JobStoreError};
