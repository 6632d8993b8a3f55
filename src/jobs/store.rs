//! Per-job directory layout, config load/save, run subdirectories.

use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::run::Run;

const JOB_ID_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b':').add(b'%');

#[derive(Error, Debug)]
pub enum JobConfigError {
    #[error("job config file is missing: {0}")]
    Missing(PathBuf),
    #[error("job config file is empty: {0}")]
    Empty(PathBuf),
    #[error("job config file is malformed: {0}: {1}")]
    Malformed(PathBuf, serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Config(#[from] JobConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Import job configuration, persisted as `config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    pub job_id: String,
    pub model: String,
    pub access: Option<String>,
    pub member_of: Option<String>,
    pub container: String,
    pub binaries_location: Option<String>,
    #[serde(default)]
    pub extract_text_types: Vec<String>,
}

/// A handle to one job's directory.
pub struct Job {
    dir: PathBuf,
    pub id: String,
}

impl Job {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.yml")
    }

    pub fn source_csv_path(&self) -> PathBuf {
        self.dir.join("source.csv")
    }

    pub fn completed_log_path(&self) -> PathBuf {
        self.dir.join("completed.log.csv")
    }

    pub fn load_config(&self) -> Result<JobConfig, JobConfigError> {
        let path = self.config_path();
        if !path.exists() {
            return Err(JobConfigError::Missing(path));
        }
        let contents = std::fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Err(JobConfigError::Empty(path));
        }
        serde_yaml::from_str(&contents).map_err(|e| JobConfigError::Malformed(path, e))
    }

    pub fn update_config(&self, config: &JobConfig) -> Result<(), JobConfigError> {
        let yaml = serde_yaml::to_string(config).map_err(|e| JobConfigError::Malformed(self.config_path(), e))?;
        std::fs::write(self.config_path(), yaml)?;
        Ok(())
    }

    pub fn latest_run(&self) -> std::io::Result<Option<Run>> {
        let mut runs: Vec<Run> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .filter(|name| name.len() == 14 && name.chars().all(|c| c.is_ascii_digit()))
                    .map(|name| Run::existing(e.path(), name.to_string()))
            })
            .collect();
        runs.sort_by(|a, b| a.timestamp().cmp(b.timestamp()));
        Ok(runs.into_iter().next_back())
    }

    /// Create a new, timestamped run subdirectory.
    pub fn new_run(&self, timestamp: &str) -> std::io::Result<Run> {
        let dir = self.dir.join(timestamp);
        std::fs::create_dir_all(&dir)?;
        Ok(Run::existing(dir, timestamp.to_string()))
    }
}

/// Root of the jobs directory tree; job ids are URL-encoded to their
/// filesystem form so slashes and colons are safe path segments.
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn encode_id(id: &str) -> String {
        utf8_percent_encode(id, JOB_ID_ENCODE_SET).to_string()
    }

    fn job_dir(&self, id: &str) -> PathBuf {
        self.root.join(Self::encode_id(id))
    }

    pub fn create_job(&self, config: JobConfig) -> Result<Job, JobStoreError> {
        let dir = self.job_dir(&config.job_id);
        if dir.exists() {
            return Err(JobStoreError::AlreadyExists(config.job_id));
        }
        std::fs::create_dir_all(&dir)?;
        let job = Job {
            dir,
            id: config.job_id.clone(),
        };
        job.update_config(&config)?;
        Ok(job)
    }

    pub fn get_job(&self, id: &str) -> Result<Job, JobStoreError> {
        let dir = self.job_dir(id);
        if !dir.exists() {
            return Err(JobStoreError::NotFound(id.to_string()));
        }
        Ok(Job {
            dir,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(job_id: &str) -> JobConfig {
        JobConfig {
            job_id: job_id.to_string(),
            model: "Item".to_string(),
            access: None,
            member_of: None,
            container: "collections/1".to_string(),
            binaries_location: Some("/data/binaries".to_string()),
            extract_text_types: vec!["text/html".to_string()],
        }
    }

    #[test]
    fn create_then_get_round_trips_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let job = store.create_job(sample_config("import:2024")).unwrap();
        let loaded = job.load_config().unwrap();
        assert_eq!(loaded.job_id, "import:2024");

        let fetched = store.get_job("import:2024").unwrap();
        assert_eq!(fetched.load_config().unwrap(), loaded);
    }

    #[test]
    fn create_job_twice_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        store.create_job(sample_config("dup")).unwrap();
        let err = store.create_job(sample_config("dup")).unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyExists(_)));
    }

    #[test]
    fn get_missing_job_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let err = store.get_job("missing").unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[test]
    fn missing_config_file_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("bare")).unwrap();
        let job = store.get_job("bare").unwrap();
        assert!(matches!(job.load_config(), Err(JobConfigError::Missing(_))));
    }

    #[test]
    fn empty_config_file_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let job_dir = dir.path().join("empty");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("config.yml"), "").unwrap();
        let job = store.get_job("empty").unwrap();
        assert!(matches!(job.load_config(), Err(JobConfigError::Empty(_))));
    }

    #[test]
    fn malformed_config_file_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let job_dir = dir.path().join("bad");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("config.yml"), "not: [valid yaml for this struct").unwrap();
        let job = store.get_job("bad").unwrap();
        assert!(matches!(job.load_config(), Err(JobConfigError::Malformed(_, _))));
    }

    #[test]
    fn job_id_with_slashes_and_colons_is_encoded_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        store.create_job(sample_config("import/batch:42")).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(entries.iter().all(|name| !name.contains('/') && !name.contains(':')));
    }
}
