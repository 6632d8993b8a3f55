use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use super::local::mime_guess_from_extension;
use super::{sha1_digest, BinarySource, BinarySourceError, BinarySourceResult};

/// A binary located at `member_path` inside a local ZIP archive.
pub struct ZipBinarySource {
    archive_path: PathBuf,
    member_path: String,
}

impl ZipBinarySource {
    pub fn new(archive_path: impl Into<PathBuf>, member_path: impl Into<String>) -> Self {
        Self {
            archive_path: archive_path.into(),
            member_path: member_path.into(),
        }
    }

    fn read_member_blocking(archive_path: &std::path::Path, member_path: &str) -> BinarySourceResult<Vec<u8>> {
        let file = std::fs::File::open(archive_path).map_err(|e| map_io(archive_path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_err(archive_path, e))?;
        let mut entry = archive.by_name(member_path).map_err(|_| {
            BinarySourceError::NotFound(format!(
                "{}!{}",
                archive_path.display(),
                member_path
            ))
        })?;
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| map_io(archive_path, e))?;
        Ok(buf)
    }
}

#[async_trait]
impl BinarySource for ZipBinarySource {
    async fn open(&self) -> BinarySourceResult<Bytes> {
        let archive_path = self.archive_path.clone();
        let member_path = self.member_path.clone();
        tokio::task::spawn_blocking(move || {
            Self::read_member_blocking(&archive_path, &member_path).map(Bytes::from)
        })
        .await
        .map_err(|e| transport(&self.member_path, e))?
    }

    async fn exists(&self) -> BinarySourceResult<bool> {
        Ok(self.open().await.is_ok())
    }

    async fn mimetype(&self) -> BinarySourceResult<Option<String>> {
        Ok(mime_guess_from_extension(std::path::Path::new(
            &self.member_path,
        )))
    }

    async fn digest(&self) -> BinarySourceResult<String> {
        let bytes = self.open().await?;
        Ok(sha1_digest(&bytes))
    }
}

fn map_io(path: &std::path::Path, source: std::io::Error) -> BinarySourceError {
    if source.kind() == std::io::ErrorKind::NotFound {
        BinarySourceError::NotFound(path.display().to_string())
    } else {
        BinarySourceError::Io {
            location: path.display().to_string(),
            source,
        }
    }
}

fn zip_err(path: &std::path::Path, source: zip::result::ZipError) -> BinarySourceError {
    BinarySourceError::Transport {
        location: path.display().to_string(),
        message: source.to_string(),
    }
}

fn transport<E: std::fmt::Display>(location: &str, source: E) -> BinarySourceError {
    BinarySourceError::Transport {
        location: location.to_string(),
        message: source.to_string(),
    }
}
