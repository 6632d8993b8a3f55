//! The job-level completed log: one fixed-schema CSV shared by every
//! engine that runs against a job, so a second import, update, or
//! publication run against the same job id can skip whatever a previous
//! run already finished regardless of which engine produced that entry.

use serde::{Deserialize, Serialize};

use super::item_log::{ItemLog, ItemLogResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedItem {
    pub id: String,
    pub timestamp: String,
    pub title: String,
    pub uri: String,
    pub status: String,
}

pub fn completed_key(item: &CompletedItem) -> &str {
    &item.id
}

pub const COMPLETED_HEADER: [&str; 5] = ["id", "timestamp", "title", "uri", "status"];

pub fn open_completed_log(path: impl Into<std::path::PathBuf>) -> ItemLogResult<ItemLog<CompletedItem>> {
    ItemLog::open(path, &COMPLETED_HEADER, completed_key)
}
