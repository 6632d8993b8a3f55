//! An append-only, keyed CSV log. Used for the completed log and the
//! per-run dropped-invalid/dropped-failed logs.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ItemLogError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub type ItemLogResult<T> = Result<T, ItemLogError>;

/// An append-only CSV log over records of type `T`, keyed by `key_fn`.
/// Every record already read at open time is held in memory so
/// `contains_key`/`len`/`iter`/`get` don't re-read the file.
pub struct ItemLog<T> {
    path: PathBuf,
    expected_header: Vec<String>,
    records: Vec<T>,
    writer: File,
    key_fn: fn(&T) -> &str,
}

impl<T> ItemLog<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Open (creating if absent) a log at `path` with the given expected
    /// header row and key accessor. If the file exists but its header row
    /// does not match `expected_header`, a warning is logged and the file
    /// is still used — callers get degraded indexing (records before the
    /// mismatch may not parse) rather than a hard failure.
    pub fn open(path: impl Into<PathBuf>, expected_header: &[&str], key_fn: fn(&T) -> &str) -> ItemLogResult<Self> {
        let path = path.into();
        let expected_header: Vec<String> = expected_header.iter().map(|s| s.to_string()).collect();
        let mut records = Vec::new();

        if path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(&path)
                .map_err(|source| ItemLogError::Csv {
                    path: path.clone(),
                    source,
                })?;
            let actual_header: Vec<String> = reader
                .headers()
                .map_err(|source| ItemLogError::Csv {
                    path: path.clone(),
                    source,
                })?
                .iter()
                .map(|s| s.to_string())
                .collect();
            if actual_header != expected_header {
                warn!(path = %path.display(), ?actual_header, ?expected_header, "item log header mismatch");
            }
            for result in reader.deserialize::<T>() {
                match result {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable item log row"),
                }
            }
        }

        let needs_header = !path.exists() || std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let mut writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ItemLogError::Io {
                path: path.clone(),
                source,
            })?;
        if needs_header {
            writeln!(writer, "{}", expected_header.join(","))
                .map_err(|source| ItemLogError::Io {
                    path: path.clone(),
                    source,
                })?;
            writer.flush().map_err(|source| ItemLogError::Io {
                path: path.clone(),
                source,
            })?;
        }

        Ok(Self {
            path,
            expected_header,
            records,
            writer,
            key_fn,
        })
    }

    /// Append a record, flushing immediately so it is durable before this
    /// call returns.
    pub fn append(&mut self, record: T) -> ItemLogResult<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        csv_writer
            .serialize(&record)
            .map_err(|source| ItemLogError::Csv {
                path: self.path.clone(),
                source,
            })?;
        let row = csv_writer
            .into_inner()
            .map_err(|e| e.into_error())
            .map_err(|source| ItemLogError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.writer
            .write_all(&row)
            .map_err(|source| ItemLogError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.writer.flush().map_err(|source| ItemLogError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.records.push(record);
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.iter().any(|r| (self.key_fn)(r) == key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.records.get(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.expected_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct CompletedItem {
        id: String,
        timestamp: String,
        title: String,
        uri: String,
        status: String,
    }

    fn key(item: &CompletedItem) -> &str {
        &item.id
    }

    const HEADER: [&str; 5] = ["id", "timestamp", "title", "uri", "status"];

    #[test]
    fn append_then_reopen_recovers_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("completed.log.csv");

        {
            let mut log = ItemLog::<CompletedItem>::open(&path, &HEADER, key).unwrap();
            log.append(CompletedItem {
                id: "item-1".into(),
                timestamp: "2024-01-01T00:00:00Z".into(),
                title: "Title".into(),
                uri: "http://h/rest/x/1".into(),
                status: "CREATED".into(),
            })
            .unwrap();
        }

        let log = ItemLog::<CompletedItem>::open(&path, &HEADER, key).unwrap();
        assert_eq!(log.len(), 1);
        assert!(log.contains_key("item-1"));
        assert!(!log.contains_key("item-2"));
    }

    #[test]
    fn empty_file_gets_header_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("completed.log.csv");
        let _log = ItemLog::<CompletedItem>::open(&path, &HEADER, key).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "id,timestamp,title,uri,status");
    }
}
