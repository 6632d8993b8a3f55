//! Process-wide vocabulary term cache, refreshed at most once per miss
//! (spec §6.2: "a vocabulary-membership check refreshes its cache once on a
//! miss, and accepts the term if the refreshed vocabulary still lacks it
//! only when the vocabulary itself was unreachable").

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::OnceLock;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Vocabularies tend to be reused across many rows of one import but there
/// is no bound on how many distinct vocabulary URIs a long-lived daemon
/// process will see over its lifetime, so the cache is capacity-bounded
/// rather than allowed to grow forever.
const CAPACITY: usize = 256;

/// Fetches the member terms of a SKOS-style vocabulary graph. Production
/// code fetches over HTTP through a `TransactionClient`; tests substitute a
/// fixed set.
#[async_trait]
pub trait VocabularyFetcher: Send + Sync {
    async fn fetch(&self, vocabulary_uri: &str) -> anyhow::Result<HashSet<String>>;
}

/// A fetcher that always fails, for contexts with no repository access.
pub struct UnreachableVocabularyFetcher;

#[async_trait]
impl VocabularyFetcher for UnreachableVocabularyFetcher {
    async fn fetch(&self, vocabulary_uri: &str) -> anyhow::Result<HashSet<String>> {
        anyhow::bail!("no vocabulary fetcher configured for {vocabulary_uri}")
    }
}

struct Cache {
    terms: LruCache<String, HashSet<String>>,
}

/// A cache of vocabulary term sets, keyed by vocabulary URI. Bounded to
/// `CAPACITY` entries, evicting the least-recently-used vocabulary first.
pub struct VocabularyCache {
    inner: RwLock<Cache>,
}

impl VocabularyCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Cache {
                terms: LruCache::new(NonZeroUsize::new(CAPACITY).expect("CAPACITY is nonzero")),
            }),
        }
    }

    pub fn global() -> &'static VocabularyCache {
        static CACHE: OnceLock<VocabularyCache> = OnceLock::new();
        CACHE.get_or_init(VocabularyCache::new)
    }

    /// Check whether `term` is a member of `vocabulary_uri`. On a cache
    /// miss the vocabulary is refetched once; if the refetch itself fails
    /// (the vocabulary is unreachable), the term is accepted rather than
    /// rejected, since an import must not fail solely because a vocabulary
    /// server is down.
    pub async fn contains(
        &self,
        vocabulary_uri: &str,
        term: &str,
        fetcher: &dyn VocabularyFetcher,
    ) -> bool {
        {
            // `LruCache::get` touches recency order, so even a pure lookup
            // needs the write lock.
            let mut cache = self.inner.write().await;
            if let Some(terms) = cache.terms.get(vocabulary_uri) {
                return terms.contains(term);
            }
        }

        match fetcher.fetch(vocabulary_uri).await {
            Ok(terms) => {
                let found = terms.contains(term);
                debug!(vocabulary_uri, term, found, "refreshed vocabulary cache");
                self.inner.write().await.terms.put(vocabulary_uri.to_string(), terms);
                found
            }
            Err(e) => {
                warn!(vocabulary_uri, error = %e, "vocabulary unreachable, accepting term");
                true
            }
        }
    }

    pub async fn invalidate(&self, vocabulary_uri: &str) {
        self.inner.write().await.terms.pop(vocabulary_uri);
    }
}

impl Default for VocabularyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFetcher(HashSet<String>);

    #[async_trait]
    impl VocabularyFetcher for FixedFetcher {
        async fn fetch(&self, _vocabulary_uri: &str) -> anyhow::Result<HashSet<String>> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl VocabularyFetcher for FailingFetcher {
        async fn fetch(&self, _vocabulary_uri: &str) -> anyhow::Result<HashSet<String>> {
            anyhow::bail!("unreachable")
        }
    }

    #[tokio::test]
    async fn miss_then_hit_refreshes_once() {
        let cache = VocabularyCache::new();
        let fetcher = FixedFetcher(HashSet::from(["text".to_string()]));
        assert!(cache.contains("http://ex/vocab", "text", &fetcher).await);
        assert!(!cache.contains("http://ex/vocab", "video", &fetcher).await);
    }

    #[tokio::test]
    async fn unreachable_vocabulary_accepts_term() {
        let cache = VocabularyCache::new();
        assert!(cache.contains("http://ex/vocab", "anything", &FailingFetcher).await);
    }
}
