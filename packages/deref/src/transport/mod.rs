//! The outbound transport the resolvers fetch through.
//!
//! A [`Transport`] is already scoped to one local requesting user, so every
//! request it makes is signed as that user. [`TransportController`] hands
//! out transports per user.
//!
//! | Operation | Returns |
//! |-----------|---------|
//! | [`Transport::dereference`] | ActivityPub document body and the URI it was finally served from |
//! | [`Transport::finger`] | Raw JRD bytes for `username@host` |
//! | [`Transport::dereference_media`] | A byte stream plus declared size and type |
//! | [`Transport::get_json`] | Raw body of a plain JSON document (instance metadata) |

pub mod http;
pub mod signature;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// 404 or 410: the object does not exist (any more).
    #[error("remote object gone (HTTP {0})")]
    Gone(u16),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// DNS, connect, TLS, timeout, or a broken body stream.
    #[error("network error: {0}")]
    Network(String),

    #[error("signing error: {0}")]
    Signing(String),

    /// The server answered, but not with something usable.
    #[error("response decode error: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// The remote server produced an HTTP response.
    pub fn got_response(&self) -> bool {
        matches!(
            self,
            TransportError::Gone(_) | TransportError::Status(_) | TransportError::Decode(_)
        )
    }
}

/// A fetched ActivityPub document.
#[derive(Debug, Clone)]
pub struct DerefResponse {
    /// Where the body was served from after redirects.
    pub final_uri: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A remote binary resource, not yet read.
pub struct RemoteMedia {
    pub stream: BoxStream<'static, Result<Bytes, TransportError>>,
    /// `Content-Length`, when declared.
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

impl std::fmt::Debug for RemoteMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMedia")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn dereference(&self, uri: &str) -> Result<DerefResponse, TransportError>;

    async fn finger(&self, username: &str, host: &str) -> Result<Bytes, TransportError>;

    async fn dereference_media(&self, uri: &str) -> Result<RemoteMedia, TransportError>;

    async fn get_json(&self, uri: &str) -> Result<Bytes, TransportError>;
}

#[async_trait]
pub trait TransportController: Send + Sync {
    /// A transport signing as `username`. An empty username means the
    /// instance actor.
    async fn transport_for(&self, username: &str) -> Result<Arc<dyn Transport>, TransportError>;
}
