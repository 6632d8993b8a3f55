use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use super::{sha1_digest, BinarySource, BinarySourceError, BinarySourceResult};

/// A binary located on the local filesystem.
pub struct LocalBinarySource {
    path: PathBuf,
}

impl LocalBinarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BinarySource for LocalBinarySource {
    async fn open(&self) -> BinarySourceResult<Bytes> {
        let path = self.path.clone();
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|source| map_io_error(&path, source))
    }

    async fn exists(&self) -> BinarySourceResult<bool> {
        Ok(tokio::fs::metadata(&self.path).await.is_ok())
    }

    async fn mimetype(&self) -> BinarySourceResult<Option<String>> {
        Ok(mime_guess_from_extension(&self.path))
    }

    async fn digest(&self) -> BinarySourceResult<String> {
        let bytes = self.open().await?;
        Ok(sha1_digest(&bytes))
    }
}

fn map_io_error(path: &std::path::Path, source: std::io::Error) -> BinarySourceError {
    let location = path.display().to_string();
    if source.kind() == std::io::ErrorKind::NotFound {
        BinarySourceError::NotFound(location)
    } else {
        BinarySourceError::Io { location, source }
    }
}

/// Extension-based MIME type guess; used by every source that doesn't have
/// a declared content type or remote `file --mime-type` to fall back on.
pub(crate) fn mime_guess_from_extension(path: &std::path::Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let guess = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "xml" => "text/xml",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "wav" => "audio/x-wav",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(guess.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let src = LocalBinarySource::new("/nonexistent/does-not-exist.jpg");
        let err = src.open().await.unwrap_err();
        assert!(matches!(err, BinarySourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn existing_file_opens_and_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let src = LocalBinarySource::new(&path);
        assert!(src.exists().await.unwrap());
        let bytes = src.open().await.unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(src.mimetype().await.unwrap(), Some("image/jpeg".to_string()));
        assert!(src.digest().await.unwrap().starts_with("sha1="));
    }
}
