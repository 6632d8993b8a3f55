use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use ssh2::Session;
use thiserror::Error;

use super::{sha1_digest, BinarySource, BinarySourceError, BinarySourceResult};

#[derive(Error, Debug)]
pub enum SftpUrlError {
    #[error("not an sftp:// url: {0}")]
    NotSftp(String),
    #[error("sftp url missing host: {0}")]
    MissingHost(String),
}

/// A parsed `sftp://user@host[:port]/path` location.
#[derive(Debug, Clone)]
pub struct SftpLocation {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl SftpLocation {
    pub fn parse(location: &str) -> Result<Self, SftpUrlError> {
        let url = url::Url::parse(location).map_err(|_| SftpUrlError::NotSftp(location.to_string()))?;
        if url.scheme() != "sftp" {
            return Err(SftpUrlError::NotSftp(location.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| SftpUrlError::MissingHost(location.to_string()))?
            .to_string();
        Ok(Self {
            user: if url.username().is_empty() {
                "anonymous".to_string()
            } else {
                url.username().to_string()
            },
            host,
            port: url.port().unwrap_or(22),
            path: url.path().to_string(),
        })
    }
}

/// A binary located on a remote host, read via SFTP. `ssh2` is a
/// synchronous API, so every operation is dispatched to the blocking thread
/// pool.
pub struct SftpBinarySource {
    location: SftpLocation,
}

impl SftpBinarySource {
    pub fn new(location: SftpLocation) -> Self {
        Self { location }
    }

    fn open_session(&self) -> BinarySourceResult<Session> {
        let addr = format!("{}:{}", self.location.host, self.location.port);
        let tcp = TcpStream::connect(&addr).map_err(|e| transport(&self.location.path, e))?;
        let mut session = Session::new().map_err(|e| transport(&self.location.path, e))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| transport(&self.location.path, e))?;
        session
            .userauth_agent(&self.location.user)
            .map_err(|e| transport(&self.location.path, e))?;
        Ok(session)
    }

    fn exec(&self, command: &str) -> BinarySourceResult<String> {
        let session = self.open_session()?;
        let mut channel = session
            .channel_session()
            .map_err(|e| transport(&self.location.path, e))?;
        channel
            .exec(command)
            .map_err(|e| transport(&self.location.path, e))?;
        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| io_err(&self.location.path, e))?;
        channel.wait_close().ok();
        Ok(output.trim().to_string())
    }
}

#[async_trait]
impl BinarySource for SftpBinarySource {
    async fn open(&self) -> BinarySourceResult<Bytes> {
        let location = self.location.clone();
        tokio::task::spawn_blocking(move || {
            let src = SftpBinarySource::new(location.clone());
            let session = src.open_session()?;
            let sftp = session.sftp().map_err(|e| transport(&location.path, e))?;
            let mut file = sftp.open(Path::new(&location.path)).map_err(|e| {
                if e.code() == ssh2::ErrorCode::Session(-31) {
                    BinarySourceError::NotFound(location.path.clone())
                } else {
                    transport(&location.path, e)
                }
            })?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| io_err(&location.path, e))?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| transport(&self.location.path, e))?
    }

    async fn exists(&self) -> BinarySourceResult<bool> {
        let location = self.location.clone();
        tokio::task::spawn_blocking(move || {
            let src = SftpBinarySource::new(location.clone());
            let session = src.open_session()?;
            let sftp = session.sftp().map_err(|e| transport(&location.path, e))?;
            Ok(sftp.stat(Path::new(&location.path)).is_ok())
        })
        .await
        .map_err(|e| transport(&self.location.path, e))?
    }

    async fn mimetype(&self) -> BinarySourceResult<Option<String>> {
        let command = format!("file --mime-type -b '{}'", self.location.path.replace('\'', "'\\''"));
        let location = self.location.clone();
        let result = tokio::task::spawn_blocking(move || {
            SftpBinarySource::new(location.clone()).exec(&command)
        })
        .await
        .map_err(|e| transport(&self.location.path, e))?;
        match result {
            Ok(s) if !s.is_empty() => Ok(Some(s)),
            Ok(_) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    async fn digest(&self) -> BinarySourceResult<String> {
        let command = format!("sha1sum '{}'", self.location.path.replace('\'', "'\\''"));
        let location = self.location.clone();
        let output = tokio::task::spawn_blocking(move || {
            SftpBinarySource::new(location.clone()).exec(&command)
        })
        .await
        .map_err(|e| transport(&self.location.path, e))??;
        let hex = output.split_whitespace().next().unwrap_or_default();
        if hex.len() == 40 {
            Ok(format!("sha1={}", hex))
        } else {
            let bytes = self.open().await?;
            Ok(sha1_digest(&bytes))
        }
    }
}

fn transport<E: std::fmt::Display>(location: &str, source: E) -> BinarySourceError {
    BinarySourceError::Transport {
        location: location.to_string(),
        message: source.to_string(),
    }
}

fn io_err(location: &str, source: std::io::Error) -> BinarySourceError {
    BinarySourceError::Io {
        location: location.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sftp_url() {
        let loc = SftpLocation::parse("sftp://bob@host.example/path/to/file.jpg").unwrap();
        assert_eq!(loc.user, "bob");
        assert_eq!(loc.host, "host.example");
        assert_eq!(loc.path, "/path/to/file.jpg");
        assert_eq!(loc.port, 22);
    }

    #[test]
    fn rejects_non_sftp_scheme() {
        assert!(SftpLocation::parse("http://host/path").is_err());
    }
}
