//! Binary sources: a uniform capability interface over local files,
//! HTTP(S) URLs, SFTP URLs, ZIP members, and ZIP members read over SFTP.
//!
//! Every implementation answers the same four questions — can I open it,
//! does it exist, what's its MIME type, what's its digest — so the import
//! engine never has to know which transport a filename resolved to.

mod factory;
mod http_source;
mod local;
mod sftp;
mod zip_sftp_source;
mod zip_source;

pub use factory::{open_binary_source, BinarySourceFactoryError};
pub use http_source::HttpBinarySource;
pub use local::LocalBinarySource;
pub use sftp::SftpBinarySource;
pub use zip_sftp_source::ZipSftpBinarySource;
pub use zip_source::ZipBinarySource;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinarySourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error reading {location}: {message}")]
    Transport { location: String, message: String },
    #[error("io error reading {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

pub type BinarySourceResult<T> = Result<T, BinarySourceError>;

/// Uniform read/exists/mimetype/digest interface over a located binary.
#[async_trait]
pub trait BinarySource: Send + Sync {
    /// Read the entire binary into memory. Binaries handled by this system
    /// (page images, PDFs, small AV derivatives) are not large enough to
    /// warrant a streaming upload path through every transport.
    async fn open(&self) -> BinarySourceResult<Bytes>;

    async fn exists(&self) -> BinarySourceResult<bool>;

    /// Best-effort MIME type; callers fall back to a declared default when
    /// this returns `None`.
    async fn mimetype(&self) -> BinarySourceResult<Option<String>>;

    /// SHA-1 digest formatted as `sha1=<hex>`, matching the `Digest` header
    /// the repository client attaches to binary uploads.
    async fn digest(&self) -> BinarySourceResult<String>;
}

/// Compute a `sha1=<hex>` digest string over raw bytes. Shared by every
/// `BinarySource` implementation that doesn't have a cheaper remote-side
/// digest available.
pub fn sha1_digest(bytes: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("sha1={:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_digest_format() {
        let d = sha1_digest(b"hello");
        assert!(d.starts_with("sha1="));
        assert_eq!(d.len(), "sha1=".len() + 40);
    }
}
