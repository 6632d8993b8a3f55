/// The repository's address: an internal URL the client actually talks to,
/// and an optional external URL used to populate `X-Forwarded-*` headers
/// when the two differ (e.g. the client runs inside a cluster but the
/// repository is fronted by a public reverse proxy).
#[derive(Debug, Clone)]
pub struct Endpoint {
    internal_url: String,
    external_url: Option<String>,
}

impl Endpoint {
    pub fn new(internal_url: impl Into<String>) -> Self {
        Self {
            internal_url: trim_trailing_slash(internal_url.into()),
            external_url: None,
        }
    }

    pub fn with_external_url(mut self, external_url: impl Into<String>) -> Self {
        self.external_url = Some(trim_trailing_slash(external_url.into()));
        self
    }

    /// The base URL requests are actually sent to.
    pub fn url(&self) -> &str {
        &self.internal_url
    }

    pub fn external_url(&self) -> Option<&str> {
        self.external_url.as_deref()
    }

    /// `true` when forwarded headers should be attached because the
    /// external address differs from the internal one.
    pub fn is_forwarded(&self) -> bool {
        self.external_url
            .as_deref()
            .is_some_and(|external| external != self.internal_url)
    }

    pub fn transaction_creation_url(&self) -> String {
        format!("{}/fcr:tx", self.internal_url)
    }

    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.internal_url, path.trim_start_matches('/'))
        }
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_joins_path() {
        let ep = Endpoint::new("http://h/rest");
        assert_eq!(ep.resolve("x/y"), "http://h/rest/x/y");
        assert_eq!(ep.resolve("/x/y"), "http://h/rest/x/y");
    }

    #[test]
    fn resolve_passes_through_absolute_urls() {
        let ep = Endpoint::new("http://h/rest");
        assert_eq!(ep.resolve("http://other/x"), "http://other/x");
    }

    #[test]
    fn forwarded_only_when_urls_differ() {
        let same = Endpoint::new("http://h/rest").with_external_url("http://h/rest");
        assert!(!same.is_forwarded());
        let different = Endpoint::new("http://internal/rest").with_external_url("http://public/rest");
        assert!(different.is_forwarded());
    }
}
