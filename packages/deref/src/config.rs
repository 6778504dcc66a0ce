//! Engine configuration, populated from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the dereferencing engine.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `SHADOWFED_HOST` | `localhost` | This server's host; URIs on it are never dereferenced |
/// | `SHADOWFED_ACCOUNT_DOMAIN` | = host | Domain of local handles |
/// | `SHADOWFED_DB` | (absent = in-memory) | Path to the SQLite database file |
/// | `SHADOWFED_MEDIA_DIR` | `./media` | Local media cache directory |
/// | `SHADOWFED_MEDIA_MAX_BYTES` | `41943040` | Per-file media size cap |
/// | `SHADOWFED_HTTP_TIMEOUT_SECS` | `30` | Per-request HTTP timeout |
/// | `SHADOWFED_USER_AGENT` | `shadowfed/<version>` | Outbound User-Agent |
/// | `SHADOWFED_ACCOUNT_REFRESH_SECS` | `172800` | Staleness interval for remote accounts |
/// | `SHADOWFED_STATUS_REFRESH_SECS` | `7200` | Staleness interval for remote statuses |
/// | `SHADOWFED_THREAD_MAX_STATUSES` | `512` | Visited-set bound for one thread traversal |
/// | `SHADOWFED_INSECURE_HTTP` | `false` | Use `http://` for webfinger and instance lookups |
#[derive(Debug, Clone)]
pub struct DerefConfig {
    /// This server's own host, lowercased.
    pub host: String,

    /// Domain used in local `user@domain` handles.
    pub account_domain: String,

    /// `None` means an in-memory store (data is lost on restart).
    pub db_path: Option<String>,

    pub media_dir: PathBuf,
    pub media_max_bytes: u64,

    pub http_timeout: Duration,
    pub user_agent: String,

    /// A remote account fetched longer ago than this is refreshed.
    pub account_refresh: Duration,
    /// A remote status fetched longer ago than this is refreshed.
    pub status_refresh: Duration,

    /// Maximum distinct statuses one thread traversal may visit.
    pub thread_max_statuses: usize,

    /// Scheme for URLs built from a bare host.
    pub insecure_http: bool,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl DerefConfig {
    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Self {
        let host = std::env::var("SHADOWFED_HOST")
            .unwrap_or_else(|_| "localhost".into())
            .to_ascii_lowercase();
        let account_domain = std::env::var("SHADOWFED_ACCOUNT_DOMAIN")
            .map(|d| d.to_ascii_lowercase())
            .unwrap_or_else(|_| host.clone());

        Self {
            account_domain,
            db_path: std::env::var("SHADOWFED_DB").ok(),
            media_dir: std::env::var("SHADOWFED_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./media")),
            media_max_bytes: env_parse("SHADOWFED_MEDIA_MAX_BYTES", 40 * 1024 * 1024),
            http_timeout: Duration::from_secs(env_parse("SHADOWFED_HTTP_TIMEOUT_SECS", 30)),
            user_agent: std::env::var("SHADOWFED_USER_AGENT")
                .unwrap_or_else(|_| default_user_agent()),
            account_refresh: Duration::from_secs(env_parse(
                "SHADOWFED_ACCOUNT_REFRESH_SECS",
                48 * 60 * 60,
            )),
            status_refresh: Duration::from_secs(env_parse(
                "SHADOWFED_STATUS_REFRESH_SECS",
                2 * 60 * 60,
            )),
            thread_max_statuses: env_parse("SHADOWFED_THREAD_MAX_STATUSES", 512),
            insecure_http: env_parse("SHADOWFED_INSECURE_HTTP", false),
            host,
        }
    }

    /// Defaults for `host`, with nothing read from the environment.
    pub fn for_host(host: impl Into<String>) -> Self {
        let host = host.into().to_ascii_lowercase();
        Self {
            account_domain: host.clone(),
            host,
            db_path: None,
            media_dir: PathBuf::from("./media"),
            media_max_bytes: 40 * 1024 * 1024,
            http_timeout: Duration::from_secs(30),
            user_agent: default_user_agent(),
            account_refresh: Duration::from_secs(48 * 60 * 60),
            status_refresh: Duration::from_secs(2 * 60 * 60),
            thread_max_statuses: 512,
            insecure_http: false,
        }
    }

    /// `http` or `https`, for URLs built from a bare host.
    pub fn scheme(&self) -> &'static str {
        if self.insecure_http {
            "http"
        } else {
            "https"
        }
    }

    /// Whether `host` is this server.
    pub fn is_local_host(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case(&self.host) || host.eq_ignore_ascii_case(&self.account_domain)
    }
}

fn default_user_agent() -> String {
    format!("shadowfed/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_host_defaults() {
        let c = DerefConfig::for_host("Local.Example");
        assert_eq!(c.host, "local.example");
        assert_eq!(c.account_domain, "local.example");
        assert_eq!(c.scheme(), "https");
        assert_eq!(c.thread_max_statuses, 512);
        assert_eq!(c.media_max_bytes, 41_943_040);
        assert!(c.is_local_host("LOCAL.example"));
        assert!(!c.is_local_host("remote.example"));
    }

    #[test]
    fn insecure_switches_scheme() {
        let mut c = DerefConfig::for_host("local.example");
        c.insecure_http = true;
        assert_eq!(c.scheme(), "http");
    }
}
