//! The handle-minting seam used by the import and publication engines.
//! Handle minting itself is an external collaborator outside this crate,
//! so the engines depend on this trait rather than a concrete
//! handle-service client.

use async_trait::async_trait;
use thiserror::Error;

/// A minted persistent identifier: its prefix/suffix pair and the resolvable
/// URL it redirects to.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub prefix: String,
    pub suffix: String,
    pub url: String,
}

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("handle service error: {0}")]
    Service(String),
}

#[async_trait]
pub trait HandleClient: Send + Sync {
    /// Mint a new handle for `uri`, or update an existing one, to resolve to
    /// `target`.
    async fn mint_or_update(&self, uri: &str, target: &str) -> Result<Handle, HandleError>;
}

/// Default handle client for deployments with no handle service configured.
/// Every call fails outright rather than fabricating a handle, so the engine
/// still runs end to end — publish requests just log that no handle was
/// minted instead of silently pretending one was.
pub struct NullHandleClient;

#[async_trait]
impl HandleClient for NullHandleClient {
    async fn mint_or_update(&self, uri: &str, _target: &str) -> Result<Handle, HandleError> {
        Err(HandleError::Service(format!(
            "no handle service configured; cannot mint a handle for {uri}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_handle_client_always_errors() {
        let client = NullHandleClient;
        assert!(client.mint_or_update("http://h/rest/1", "http://h/rest/1").await.is_err());
    }
}
