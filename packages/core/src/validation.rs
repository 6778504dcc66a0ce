use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::{ShadowAccount, ShadowEmoji};

/// Errors returned when remote-supplied fields fail basic sanity checks.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("username must match [A-Za-z0-9_.-]{{1,64}}, got: {0:?}")]
    InvalidUsername(String),

    #[error("domain must be a lowercase hostname, got: {0:?}")]
    InvalidDomain(String),

    #[error("emoji shortcode must match [A-Za-z0-9_]{{1,64}}, got: {0:?}")]
    InvalidShortcode(String),

    #[error("uri must be absolute http(s), got: {0:?}")]
    InvalidUri(String),
}

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").unwrap());

static SHORTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").unwrap());

// Labels separated by dots, optional port.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9\-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]*[a-z0-9])?)*(:[0-9]{1,5})?$")
        .unwrap()
});

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(username.to_string()))
    }
}

pub fn validate_shortcode(shortcode: &str) -> Result<(), ValidationError> {
    if SHORTCODE_RE.is_match(shortcode) {
        Ok(())
    } else {
        Err(ValidationError::InvalidShortcode(shortcode.to_string()))
    }
}

/// Lowercase and check a hostname.
pub fn normalize_domain(domain: &str) -> Result<String, ValidationError> {
    let d = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if DOMAIN_RE.is_match(&d) {
        Ok(d)
    } else {
        Err(ValidationError::InvalidDomain(domain.to_string()))
    }
}

/// Cheap shape check: `http://` or `https://` followed by something.
pub fn validate_http_uri(uri: &str) -> Result<(), ValidationError> {
    let rest = uri
        .strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"));
    match rest {
        Some(r) if !r.is_empty() && !r.starts_with('/') => Ok(()),
        _ => Err(ValidationError::InvalidUri(uri.to_string())),
    }
}

/// Validate the identity fields of an account converted from remote data.
pub fn validate_account(account: &ShadowAccount) -> Result<(), ValidationError> {
    validate_http_uri(&account.uri)?;
    validate_username(&account.username)?;
    normalize_domain(&account.domain)?;
    Ok(())
}

pub fn validate_emoji(emoji: &ShadowEmoji) -> Result<(), ValidationError> {
    validate_shortcode(&emoji.shortcode)?;
    normalize_domain(&emoji.domain)?;
    validate_http_uri(&emoji.image_remote_url)?;
    Ok(())
}
