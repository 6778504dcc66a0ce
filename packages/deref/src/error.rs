//! The error taxonomy that crosses the engine boundary.
//!
//! Internally, failures carry a [`Cause`] plus `(operation, identifier)`
//! frames added as they propagate outwards. Callers branch on
//! [`DerefError::kind`]:
//!
//! | Kind | Meaning | Caller should |
//! |------|---------|---------------|
//! | [`ErrorKind::Unretrievable`] | Remote object is gone, or a local URI is absent | Treat as permanent |
//! | [`ErrorKind::Transport`] | Network, TLS, timeout, signing, cancellation | Retry later |
//! | [`ErrorKind::Database`] | Local storage failed unexpectedly | Alert an operator |
//! | [`ErrorKind::Other`] | Remote object exists but is unusable or not allowed | Alert an operator |

use std::fmt;

use shadowfed_wire::VocabError;
use thiserror::Error;

use crate::media::MediaError;
use crate::storage::StorageError;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unretrievable,
    Transport,
    Database,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Unretrievable => "unretrievable",
            ErrorKind::Transport => "transport",
            ErrorKind::Database => "database",
            ErrorKind::Other => "other",
        })
    }
}

/// The innermost failure.
#[derive(Debug, Clone, Error)]
pub enum Cause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("database error: {0}")]
    Storage(#[from] StorageError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("remote object has been deleted (tombstone)")]
    Tombstone,

    #[error("local object not found: {0}")]
    LocalNotFound(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("expected {expected}, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: String,
    },

    #[error("uri mismatch: requested {requested}, document declares {declared}")]
    UriMismatch { requested: String, declared: String },

    #[error("username mismatch: expected {expected}, got {actual}")]
    UsernameMismatch { expected: String, actual: String },

    #[error("domain {0} is blocked")]
    DomainBlocked(String),

    #[error("public key changed for {0} and the stored key is not expired")]
    KeyRotationRefused(String),

    #[error("{interaction} forbidden by interaction policy")]
    PolicyForbidden { interaction: String },

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("{0}")]
    Invalid(String),
}

impl From<VocabError> for Cause {
    fn from(e: VocabError) -> Self {
        match e {
            VocabError::WrongType { expected, actual } => Cause::WrongType { expected, actual },
            other => Cause::Decode(other.to_string()),
        }
    }
}

/// An error from the engine, with its causal chain.
///
/// `Clone` so that single-flight followers can observe the leader's failure.
#[derive(Debug, Clone)]
pub struct DerefError {
    cause: Cause,
    /// Innermost first.
    frames: Vec<(&'static str, String)>,
}

impl DerefError {
    pub fn new(cause: impl Into<Cause>) -> Self {
        Self {
            cause: cause.into(),
            frames: Vec::new(),
        }
    }

    /// Wrap with an outer `(operation, identifier)` frame.
    pub fn context(mut self, op: &'static str, id: impl fmt::Display) -> Self {
        self.frames.push((op, id.to_string()));
        self
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// Operations the error passed through, outermost first.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().rev().map(|(op, _)| *op)
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.cause {
            Cause::Transport(t) => match t {
                TransportError::Gone(_) => ErrorKind::Unretrievable,
                TransportError::Decode(_) => ErrorKind::Other,
                TransportError::Status(_)
                | TransportError::Network(_)
                | TransportError::Signing(_)
                | TransportError::Cancelled => ErrorKind::Transport,
            },
            Cause::Media(MediaError::Transport(TransportError::Gone(_))) => ErrorKind::Unretrievable,
            Cause::Media(MediaError::Transport(t)) if !matches!(t, TransportError::Decode(_)) => {
                ErrorKind::Transport
            }
            Cause::Media(_) => ErrorKind::Other,
            Cause::Tombstone | Cause::LocalNotFound(_) => ErrorKind::Unretrievable,
            Cause::Storage(_) => ErrorKind::Database,
            Cause::Decode(_)
            | Cause::WrongType { .. }
            | Cause::UriMismatch { .. }
            | Cause::UsernameMismatch { .. }
            | Cause::DomainBlocked(_)
            | Cause::KeyRotationRefused(_)
            | Cause::PolicyForbidden { .. }
            | Cause::InvalidUri(_)
            | Cause::Invalid(_) => ErrorKind::Other,
        }
    }

    pub fn is_unretrievable(&self) -> bool {
        self.kind() == ErrorKind::Unretrievable
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, Cause::Transport(TransportError::Cancelled))
    }

    pub fn is_domain_blocked(&self) -> bool {
        matches!(self.cause, Cause::DomainBlocked(_))
    }
}

impl fmt::Display for DerefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (op, id) in self.frames.iter().rev() {
            write!(f, "{op} {id}: ")?;
        }
        write!(f, "{}", self.cause)
    }
}

impl std::error::Error for DerefError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl From<Cause> for DerefError {
    fn from(cause: Cause) -> Self {
        DerefError::new(cause)
    }
}

impl From<TransportError> for DerefError {
    fn from(e: TransportError) -> Self {
        DerefError::new(e)
    }
}

impl From<StorageError> for DerefError {
    fn from(e: StorageError) -> Self {
        DerefError::new(e)
    }
}

impl From<MediaError> for DerefError {
    fn from(e: MediaError) -> Self {
        DerefError::new(e)
    }
}

impl From<VocabError> for DerefError {
    fn from(e: VocabError) -> Self {
        DerefError::new(e)
    }
}

/// `.context(op, id)` on any result whose error converts into [`DerefError`].
pub trait ResultExt<T> {
    fn context(self, op: &'static str, id: impl fmt::Display) -> Result<T, DerefError>;
}

impl<T, E: Into<DerefError>> ResultExt<T> for Result<T, E> {
    fn context(self, op: &'static str, id: impl fmt::Display) -> Result<T, DerefError> {
        self.map_err(|e| e.into().context(op, id))
    }
}

pub type DerefResult<T> = Result<T, DerefError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_outermost_first() {
        let err = DerefError::new(TransportError::Network("connection refused".into()))
            .context("resolve_account", "https://a.example/users/x")
            .context("resolve_status", "https://a.example/s/1");
        assert_eq!(
            err.to_string(),
            "resolve_status https://a.example/s/1: resolve_account https://a.example/users/x: \
             network error: connection refused"
        );
        assert_eq!(
            err.operations().collect::<Vec<_>>(),
            vec!["resolve_status", "resolve_account"]
        );
    }

    #[test]
    fn classification() {
        assert_eq!(
            DerefError::new(TransportError::Gone(410)).kind(),
            ErrorKind::Unretrievable
        );
        assert_eq!(DerefError::new(Cause::Tombstone).kind(), ErrorKind::Unretrievable);
        assert_eq!(
            DerefError::new(TransportError::Status(503)).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            DerefError::new(TransportError::Cancelled).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            DerefError::new(StorageError::Internal("disk full".into())).kind(),
            ErrorKind::Database
        );
        assert_eq!(
            DerefError::new(Cause::UriMismatch {
                requested: "a".into(),
                declared: "b".into()
            })
            .kind(),
            ErrorKind::Other
        );
        assert_eq!(
            DerefError::new(Cause::DomainBlocked("evil.example".into())).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn result_ext_adds_frame() {
        let r: Result<(), TransportError> = Err(TransportError::Gone(404));
        let err = r.context("dereference", "https://a.example/x").unwrap_err();
        assert!(err.is_unretrievable());
        assert!(err.to_string().starts_with("dereference https://a.example/x: "));
    }
}
