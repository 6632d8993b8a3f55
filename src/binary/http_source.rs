use async_trait::async_trait;
use bytes::Bytes;

use super::{sha1_digest, BinarySource, BinarySourceError, BinarySourceResult};

/// A binary fetched over HTTP or HTTPS.
pub struct HttpBinarySource {
    client: reqwest::Client,
    url: String,
}

impl HttpBinarySource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BinarySource for HttpBinarySource {
    async fn open(&self) -> BinarySourceResult<Bytes> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| transport_error(&self.url, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BinarySourceError::NotFound(self.url.clone()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| transport_error(&self.url, e))?;
        response
            .bytes()
            .await
            .map_err(|e| transport_error(&self.url, e))
    }

    async fn exists(&self) -> BinarySourceResult<bool> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| transport_error(&self.url, e))?;
        Ok(response.status().is_success())
    }

    async fn mimetype(&self) -> BinarySourceResult<Option<String>> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| transport_error(&self.url, e))?;
        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()))
    }

    async fn digest(&self) -> BinarySourceResult<String> {
        let bytes = self.open().await?;
        Ok(sha1_digest(&bytes))
    }
}

fn transport_error(url: &str, source: reqwest::Error) -> BinarySourceError {
    BinarySourceError::Transport {
        location: url.to_string(),
        message: source.to_string(),
    }
}
