//! Domain block gate.
//!
//! Consulted before every network call and before trusting a host taken
//! from remote content. Matching is exact and case-insensitive; there are no
//! wildcards at this layer. A storage error propagates, and callers abort
//! (fail closed).

use std::sync::Arc;

use reqwest::Url;

use crate::error::{Cause, DerefError, DerefResult};
use crate::storage::{Storage, StorageError};

/// Parse an absolute `http(s)` URI.
pub fn parse_remote_uri(uri: &str) -> Result<Url, Cause> {
    let url = Url::parse(uri).map_err(|e| Cause::InvalidUri(format!("{uri}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Cause::InvalidUri(uri.to_string()));
    }
    Ok(url)
}

/// `host[:port]`, lowercased. Two URIs with equal authorities belong to the
/// same server.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}

#[derive(Clone)]
pub struct DomainGate {
    storage: Arc<dyn Storage>,
}

impl DomainGate {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Whether `host` is federation-blocked. An empty host never is.
    pub async fn is_blocked(&self, host: &str) -> Result<bool, StorageError> {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return Ok(false);
        }
        self.storage.is_domain_blocked(&host).await
    }

    /// Parse `uri` and refuse it if its host is blocked.
    pub async fn check_uri(&self, uri: &str) -> DerefResult<Url> {
        let url = parse_remote_uri(uri)?;
        let host = url.host_str().unwrap_or_default();
        if self.is_blocked(host).await? {
            tracing::debug!("blocks: refusing {uri}");
            return Err(DerefError::new(Cause::DomainBlocked(host.to_string())));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn case_insensitive_exact_match() {
        let storage = Arc::new(MemoryStorage::default());
        storage.add_domain_block("evil.example").await.unwrap();
        let gate = DomainGate::new(storage);

        assert!(gate.is_blocked("EVIL.example").await.unwrap());
        assert!(!gate.is_blocked("sub.evil.example").await.unwrap());
        assert!(!gate.is_blocked("").await.unwrap());

        let err = gate.check_uri("https://evil.example/users/x").await.unwrap_err();
        assert!(err.is_domain_blocked());
        assert!(gate.check_uri("https://fine.example/users/x").await.is_ok());
    }

    #[test]
    fn rejects_non_http_uris() {
        assert!(parse_remote_uri("acct:alice@a.example").is_err());
        assert!(parse_remote_uri("not a uri").is_err());
        let url = parse_remote_uri("http://A.example:8080/x").unwrap();
        assert_eq!(authority(&url), "a.example:8080");
    }
}
