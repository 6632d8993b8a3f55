//! Durable inbox/outbox message boxes: one file per job id, written
//! atomically — a temp file then a rename — so a crash mid-write never
//! leaves a partially-written message for the dispatcher to replay or
//! process on restart. Grounded on `original_source/plastron-stomp/
//! .../inbox_watcher.py` and `listeners.py` for the box shape, and on the
//! `PersistenceManager`/WAL fsync-then-rename discipline in
//! `src/persistence/wal.rs` for the durability technique.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

const JOB_ID_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b':').add(b'%');

/// A single-directory, keyed-by-job-id store for raw message bytes. Used
/// for both the inbox (incoming command frames awaiting processing) and
/// the outbox (terminal response frames awaiting delivery); the two differ
/// only in which extension they use, so tests and callers can't cross-wire
/// them by accident.
pub struct MessageBox {
    dir: PathBuf,
    extension: &'static str,
}

impl MessageBox {
    pub fn open(dir: impl Into<PathBuf>, extension: &'static str) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, extension })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, job_id: &str) -> PathBuf {
        let encoded = utf8_percent_encode(job_id, JOB_ID_ENCODE_SET).to_string();
        self.dir.join(format!("{encoded}.{}", self.extension))
    }

    fn tmp_path(&self, job_id: &str) -> PathBuf {
        let encoded = utf8_percent_encode(job_id, JOB_ID_ENCODE_SET).to_string();
        self.dir.join(format!("{encoded}.{}.tmp", self.extension))
    }

    /// Durably persist `bytes` under `job_id`, replacing whatever was there.
    pub fn put(&self, job_id: &str, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.tmp_path(job_id);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.path(job_id))?;
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(job_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn remove(&self, job_id: &str) -> io::Result<()> {
        match fs::remove_file(self.path(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Job ids of every message currently held, in directory-listing order
    /// (no ordering guarantee beyond that — callers that care about
    /// creation order should consult the filesystem watcher's event
    /// stream instead; this is only used for startup reconciliation).
    pub fn job_ids(&self) -> io::Result<Vec<String>> {
        let suffix = format!(".{}", self.extension);
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(encoded) = name.strip_suffix(&suffix) else { continue };
            if encoded.is_empty() {
                continue;
            }
            let decoded = percent_encoding::percent_decode_str(encoded)
                .decode_utf8()
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| encoded.to_string());
            ids.push(decoded);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = MessageBox::open(dir.path(), "inbox").unwrap();
        inbox.put("import:2024", b"hello").unwrap();
        assert_eq!(inbox.get("import:2024").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn missing_entry_is_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = MessageBox::open(dir.path(), "inbox").unwrap();
        assert_eq!(inbox.get("absent").unwrap(), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = MessageBox::open(dir.path(), "outbox").unwrap();
        outbox.put("job-1", b"x").unwrap();
        outbox.remove("job-1").unwrap();
        outbox.remove("job-1").unwrap();
        assert_eq!(outbox.get("job-1").unwrap(), None);
    }

    #[test]
    fn job_ids_with_slashes_and_colons_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = MessageBox::open(dir.path(), "inbox").unwrap();
        inbox.put("import/batch:42", b"x").unwrap();
        let ids = inbox.job_ids().unwrap();
        assert_eq!(ids, vec!["import/batch:42".to_string()]);
    }

    #[test]
    fn no_tmp_file_left_behind_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = MessageBox::open(dir.path(), "inbox").unwrap();
        inbox.put("job-1", b"x").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(entries.iter().all(|n| !n.ends_with(".tmp")));
    }
}
