//! The base LDP HTTP client.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::rdf::{Graph, GraphError, NamespaceManager};

use super::endpoint::Endpoint;

pub const TURTLE: &str = "text/turtle";
pub const N_TRIPLES: &str = "application/n-triples";
pub const SPARQL_UPDATE: &str = "application/sparql-update";

/// Requests only user-authored triples, omitting server-managed ones
/// (`fedora:created`, `fedora:lastModified`, etc.).
pub const PREFER_MINIMAL: &str =
    "return=representation; omit=\"http://fedora.info/definitions/v4/repository#ServerManaged\"";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http {status} for {method} {uri}: {reason}")]
    Http {
        method: String,
        uri: String,
        status: StatusCode,
        reason: String,
    },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("resource has no describedby resolution and is not itself RDF: {0}")]
    NoDescription(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// A created resource's own URI and, when the created resource is a binary,
/// the URI of its RDF description.
#[derive(Debug, Clone)]
pub struct Created {
    pub uri: String,
    pub describedby: Option<String>,
}

/// Thin LDP client: CRUD plus describedby resolution and `Prefer` handling.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl Client {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn with_http_client(endpoint: Endpoint, http: reqwest::Client) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn forwarded_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.endpoint.is_forwarded() {
            if let Some(external) = self.endpoint.external_url() {
                if let Ok(url) = url::Url::parse(external) {
                    if let Some(host) = url.host_str() {
                        if let Ok(v) = HeaderValue::from_str(host) {
                            headers.insert("X-Forwarded-Host", v);
                        }
                    }
                    if let Ok(v) = HeaderValue::from_str(url.scheme()) {
                        headers.insert("X-Forwarded-Proto", v);
                    }
                }
            }
        }
        headers
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> ClientResult<reqwest::Response> {
        let mut builder = self
            .http
            .request(method.clone(), uri)
            .headers(self.forwarded_headers())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;
        if response.status().is_client_error() || response.status().is_server_error() {
            let status = response.status();
            let reason = status.canonical_reason().unwrap_or("unknown").to_string();
            return Err(ClientError::Http {
                method: method.to_string(),
                uri: uri.to_string(),
                status,
                reason,
            });
        }
        Ok(response)
    }

    pub async fn get(&self, uri: &str) -> ClientResult<reqwest::Response> {
        self.send(Method::GET, uri, HeaderMap::new(), None).await
    }

    pub async fn head(&self, uri: &str) -> ClientResult<reqwest::Response> {
        self.send(Method::HEAD, uri, HeaderMap::new(), None).await
    }

    pub async fn post(&self, uri: &str, headers: HeaderMap, body: Vec<u8>) -> ClientResult<reqwest::Response> {
        self.send(Method::POST, uri, headers, Some(body)).await
    }

    pub async fn put(&self, uri: &str, headers: HeaderMap, body: Vec<u8>) -> ClientResult<reqwest::Response> {
        self.send(Method::PUT, uri, headers, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, headers: HeaderMap, body: Vec<u8>) -> ClientResult<reqwest::Response> {
        self.send(Method::PATCH, uri, headers, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> ClientResult<reqwest::Response> {
        self.send(Method::DELETE, uri, HeaderMap::new(), None).await
    }

    pub async fn exists(&self, uri: &str) -> ClientResult<bool> {
        match self.head(uri).await {
            Ok(_) => Ok(true),
            Err(ClientError::Http { status, .. }) if status == StatusCode::NOT_FOUND || status == StatusCode::GONE => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn path_exists(&self, path: &str) -> ClientResult<bool> {
        self.exists(&self.endpoint.resolve(path)).await
    }

    /// `describedby` link relation from a HEAD response, if any.
    pub async fn describedby(&self, uri: &str) -> ClientResult<Option<String>> {
        let response = self.head(uri).await?;
        Ok(parse_describedby_link(response.headers()))
    }

    /// Resolve `uri` to its RDF description, returning the media type and
    /// raw body text of whichever resource actually carries the triples.
    pub async fn get_description(&self, uri: &str) -> ClientResult<(String, String)> {
        let head = self.head(uri).await?;
        let description_uri = parse_describedby_link(head.headers()).unwrap_or_else(|| uri.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static(TURTLE));
        headers.insert(reqwest::header::PREFER, HeaderValue::from_static(PREFER_MINIMAL));
        let response = self.send(Method::GET, &description_uri, headers, None).await?;
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
            .unwrap_or_else(|| TURTLE.to_string());
        let text = response.text().await?;
        Ok((media_type, text))
    }

    pub async fn get_graph(&self, uri: &str) -> ClientResult<Graph> {
        let (_media_type, text) = self.get_description(uri).await?;
        let mut ns = NamespaceManager::new();
        Ok(Graph::parse_turtle(&text, &mut ns)?)
    }

    pub async fn put_graph(&self, uri: &str, graph: &Graph) -> ClientResult<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static(N_TRIPLES),
        );
        self.put(uri, headers, graph.to_ntriples().into_bytes()).await?;
        Ok(())
    }

    pub async fn patch_graph(&self, uri: &str, sparql_update: &str) -> ClientResult<()> {
        if sparql_update.is_empty() {
            return Ok(());
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static(SPARQL_UPDATE),
        );
        self.patch(uri, headers, sparql_update.as_bytes().to_vec()).await?;
        Ok(())
    }

    /// Create a resource. A path ending without a trailing slash and
    /// already fully specified uses PUT (caller names the final segment); a
    /// container path uses POST with an optional `Slug` hint.
    pub async fn create(
        &self,
        container_uri: &str,
        slug: Option<&str>,
        content_type: &str,
        body: Vec<u8>,
    ) -> ClientResult<Created> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static(TURTLE)),
        );
        if let Some(slug) = slug {
            if let Ok(v) = HeaderValue::from_str(slug) {
                headers.insert("Slug", v);
            }
        }
        let response = self.post(container_uri, headers, body).await?;
        self.created_from_response(container_uri, &response).await
    }

    /// Create a binary resource, attaching the `Digest` and
    /// `Content-Disposition` headers a binary upload carries alongside its
    /// content type.
    pub async fn create_binary(
        &self,
        container_uri: &str,
        slug: Option<&str>,
        content_type: &str,
        digest: &str,
        filename: &str,
        body: Vec<u8>,
    ) -> ClientResult<Created> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static(TURTLE)),
        );
        if let Some(slug) = slug {
            if let Ok(v) = HeaderValue::from_str(slug) {
                headers.insert("Slug", v);
            }
        }
        if let Ok(v) = HeaderValue::from_str(digest) {
            headers.insert("Digest", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
            headers.insert(reqwest::header::CONTENT_DISPOSITION, v);
        }
        let response = self.post(container_uri, headers, body).await?;
        self.created_from_response(container_uri, &response).await
    }

    async fn created_from_response(&self, container_uri: &str, response: &reqwest::Response) -> ClientResult<Created> {
        let uri = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| container_uri.to_string());
        let describedby = self.describedby(&uri).await.unwrap_or(None);
        Ok(Created { uri, describedby })
    }
}

/// Parse the `describedby` relation out of a `Link` header, of the form
/// `<url>; rel="describedby", <url2>; rel="type"`.
pub fn parse_describedby_link(headers: &HeaderMap) -> Option<String> {
    let link_header = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    for part in link_header.split(',') {
        if part.contains("rel=\"describedby\"") {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            return Some(part[start..end].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_describedby_extracts_url() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            HeaderValue::from_static("<http://h/rest/f/1/fcr:metadata>; rel=\"describedby\""),
        );
        assert_eq!(
            parse_describedby_link(&headers),
            Some("http://h/rest/f/1/fcr:metadata".to_string())
        );
    }

    #[test]
    fn parse_describedby_absent() {
        let headers = HeaderMap::new();
        assert_eq!(parse_describedby_link(&headers), None);
    }
}
