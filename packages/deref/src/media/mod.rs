//! Media manager: turns a remote byte stream into a cached local file.
//!
//! The resolver hands the manager a [`DataFn`] (which opens the remote
//! stream when called) together with the record to fill in. The manager
//! returns a [`Processing`] handle at once; [`Processing::load`] drives the
//! fetch and yields the finished record. Persisting the record is the
//! caller's job.

pub mod local;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use shadowfed::{ShadowEmoji, ShadowMediaAttachment};

use crate::transport::{RemoteMedia, TransportError};

/// Opens the remote byte stream. Called at most once.
pub type DataFn =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<RemoteMedia, TransportError>> + Send>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("media exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("media i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        MediaError::Io(e.to_string())
    }
}

/// A pending media job.
pub struct Processing<T> {
    id: String,
    fut: BoxFuture<'static, Result<T, MediaError>>,
}

impl<T> Processing<T> {
    pub fn new(id: impl Into<String>, fut: BoxFuture<'static, Result<T, MediaError>>) -> Self {
        Self { id: id.into(), fut }
    }

    /// Id of the record being produced.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the job and return the finished record.
    pub async fn load(self) -> Result<T, MediaError> {
        self.fut.await
    }
}

#[async_trait]
pub trait MediaManager: Send + Sync {
    async fn process_media(
        &self,
        data: DataFn,
        media: ShadowMediaAttachment,
    ) -> Result<Processing<ShadowMediaAttachment>, MediaError>;

    async fn process_emoji(
        &self,
        data: DataFn,
        emoji: ShadowEmoji,
    ) -> Result<Processing<ShadowEmoji>, MediaError>;

    /// Re-fetch bytes for an existing record, keeping its identity.
    async fn recache_media(
        &self,
        data: DataFn,
        media: ShadowMediaAttachment,
    ) -> Result<Processing<ShadowMediaAttachment>, MediaError> {
        self.process_media(data, media).await
    }

    async fn recache_emoji(
        &self,
        data: DataFn,
        emoji: ShadowEmoji,
    ) -> Result<Processing<ShadowEmoji>, MediaError> {
        self.process_emoji(data, emoji).await
    }
}
