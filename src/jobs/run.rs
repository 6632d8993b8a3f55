//! A single run of a job, identified by its `YYYYMMDDHHMMSS` timestamp
//! directory. Each run owns its own dropped-invalid and dropped-failed logs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item_log::{ItemLog, ItemLogResult};

/// A dropped-row record: the row's identifying key, its title and uri (when
/// known), a reason, and the timestamp it was dropped at. Used for both the
/// invalid-row and the failed-row logs; the two logs differ only in which
/// phase writes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroppedItem {
    pub id: String,
    pub timestamp: String,
    pub title: String,
    pub uri: String,
    pub reason: String,
}

fn dropped_key(item: &DroppedItem) -> &str {
    &item.id
}

const DROPPED_HEADER: [&str; 5] = ["id", "timestamp", "title", "uri", "reason"];

/// The state a run ends in; mirrors the terminal states an import, update,
/// or publication job run can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Complete,
    Stopped,
    Failed,
}

pub struct Run {
    dir: PathBuf,
    timestamp: String,
}

impl Run {
    pub fn existing(dir: PathBuf, timestamp: String) -> Self {
        Self { dir, timestamp }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_str(&format!("{} +0000", self.timestamp), "%Y%m%d%H%M%S %z")
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn dropped_invalid_log(&self) -> ItemLogResult<ItemLog<DroppedItem>> {
        ItemLog::open(self.dir.join("dropped-invalid.log.csv"), &DROPPED_HEADER, dropped_key)
    }

    pub fn dropped_failed_log(&self) -> ItemLogResult<ItemLog<DroppedItem>> {
        ItemLog::open(self.dir.join("dropped-failed.log.csv"), &DROPPED_HEADER, dropped_key)
    }
}

/// Render the current instant as a run directory name. Callers pass in
/// `now` rather than this module calling `Utc::now()` itself, so run
/// creation stays deterministic and testable.
pub fn run_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_timestamp_is_fourteen_digits() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 1).unwrap();
        let ts = run_timestamp(now);
        assert_eq!(ts, "20240305093001");
        assert_eq!(ts.len(), 14);
    }

    #[test]
    fn started_at_round_trips_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::existing(dir.path().to_path_buf(), "20240305093001".to_string());
        let started = run.started_at().unwrap();
        assert_eq!(started.format("%Y%m%d%H%M%S").to_string(), "20240305093001");
    }

    #[test]
    fn dropped_logs_are_independent_files() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::existing(dir.path().to_path_buf(), "20240305093001".to_string());
        let mut invalid = run.dropped_invalid_log().unwrap();
        invalid
            .append(DroppedItem {
                id: "row-3".into(),
                timestamp: "2024-03-05T09:30:05Z".into(),
                title: "Untitled Item".into(),
                uri: String::new(),
                reason: "missing required field 'title'".into(),
            })
            .unwrap();
        let failed = run.dropped_failed_log().unwrap();
        assert_eq!(failed.len(), 0);
        assert!(invalid.contains_key("row-3"));
        assert!(dir.path().join("dropped-invalid.log.csv").exists());
        assert!(dir.path().join("dropped-failed.log.csv").exists());
    }
}
