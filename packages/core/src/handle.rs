//! Account handles: `user@domain`.
//!
//! A [`Handle`] names an account by username and account domain, the form
//! people type and webfinger resolves. Three spellings are accepted:
//!
//! ```text
//! alice@social.example
//! @alice@social.example
//! acct:alice@social.example
//! ```

use thiserror::Error;
use urlencoding::encode;

/// Errors that can occur when parsing a handle string.
#[derive(Debug, Error, PartialEq)]
pub enum HandleError {
    #[error("missing '@' separator in handle: '{0}'")]
    MissingAt(String),

    #[error("empty username in handle: '{0}'")]
    EmptyUsername(String),

    #[error("empty domain in handle: '{0}'")]
    EmptyDomain(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub username: String,
    /// Lowercased account domain.
    pub domain: String,
}

impl Handle {
    /// Construct from pre-validated parts.
    pub fn new(username: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            domain: domain.into().to_ascii_lowercase(),
        }
    }

    /// Parse `user@domain`, `@user@domain` or `acct:user@domain`.
    ///
    /// Splits on the **last** `@`.
    pub fn parse(s: &str) -> Result<Self, HandleError> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix("acct:").unwrap_or(trimmed);
        let bare = bare.strip_prefix('@').unwrap_or(bare);

        let at = bare
            .rfind('@')
            .ok_or_else(|| HandleError::MissingAt(s.to_string()))?;

        let username = bare[..at].trim();
        let domain = bare[at + 1..].trim();

        if username.is_empty() {
            return Err(HandleError::EmptyUsername(s.to_string()));
        }
        if domain.is_empty() {
            return Err(HandleError::EmptyDomain(s.to_string()));
        }

        Ok(Self::new(username, domain))
    }

    /// `acct:user@domain`, the webfinger resource form.
    pub fn acct_uri(&self) -> String {
        format!("acct:{}@{}", self.username, self.domain)
    }

    /// The webfinger lookup URL on `host` for this handle.
    ///
    /// `host` is where the query goes, which may differ from the account
    /// domain.
    pub fn webfinger_url(&self, scheme: &str, host: &str) -> String {
        format!(
            "{scheme}://{host}/.well-known/webfinger?resource={}",
            encode(&self.acct_uri())
        )
    }

    /// Same username, compared case-insensitively.
    pub fn same_user(&self, username: &str) -> bool {
        self.username.eq_ignore_ascii_case(username)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.domain)
    }
}

impl std::str::FromStr for Handle {
    type Err = HandleError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::parse(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let h = Handle::parse("alice@Social.Example").unwrap();
        assert_eq!(h.username, "alice");
        assert_eq!(h.domain, "social.example");
    }

    #[test]
    fn parse_leading_at_and_acct() {
        assert_eq!(
            Handle::parse("@alice@social.example").unwrap(),
            Handle::new("alice", "social.example")
        );
        assert_eq!(
            Handle::parse("acct:alice@social.example").unwrap(),
            Handle::new("alice", "social.example")
        );
    }

    #[test]
    fn parse_missing_at() {
        assert_eq!(
            Handle::parse("alice"),
            Err(HandleError::MissingAt("alice".into()))
        );
    }

    #[test]
    fn parse_empty_parts() {
        assert!(matches!(
            Handle::parse("@social.example"),
            Err(HandleError::MissingAt(_))
        ));
        assert!(matches!(
            Handle::parse("@@social.example"),
            Err(HandleError::EmptyUsername(_))
        ));
        assert!(matches!(
            Handle::parse("alice@"),
            Err(HandleError::EmptyDomain(_))
        ));
    }

    #[test]
    fn webfinger_url_encodes_resource() {
        let h = Handle::new("alice", "social.example");
        assert_eq!(
            h.webfinger_url("https", "social.example"),
            "https://social.example/.well-known/webfinger?resource=acct%3Aalice%40social.example"
        );
    }

    #[test]
    fn display_roundtrip() {
        let h: Handle = "alice@social.example".parse().unwrap();
        assert_eq!(h.to_string(), "alice@social.example");
    }
}
