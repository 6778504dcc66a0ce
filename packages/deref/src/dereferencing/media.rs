//! Attachments, avatars and headers.
//!
//! Staleness is field-by-field: a record whose bytes are cached is reused
//! and only its metadata is updated. A record that is known but not cached
//! is re-fetched under the same id.

use std::sync::Arc;

use futures_util::FutureExt;
use shadowfed::ShadowMediaAttachment;

use super::{Dereferencer, Requester};
use crate::error::{Cause, DerefError, DerefResult, ResultExt};
use crate::media::{DataFn, Processing};
use crate::storage::StorageError;
use crate::transport::{Transport, TransportError};

/// What the referencing document says about a media file.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub status_id: Option<String>,
    pub content_type: Option<String>,
    pub description: Option<String>,
    pub blurhash: Option<String>,
    pub avatar: bool,
    pub header: bool,
}

/// Copy `info` onto `media`. Returns whether anything changed.
fn apply_info(media: &mut ShadowMediaAttachment, info: &MediaInfo) -> bool {
    let before = (
        media.status_id.clone(),
        media.description.clone(),
        media.blurhash.clone(),
        media.avatar,
        media.header,
    );
    if info.status_id.is_some() {
        media.status_id = info.status_id.clone();
    }
    if info.content_type.is_some() && media.content_type.is_none() {
        media.content_type = info.content_type.clone();
    }
    media.description = info.description.clone();
    media.blurhash = info.blurhash.clone();
    media.avatar |= info.avatar;
    media.header |= info.header;
    before
        != (
            media.status_id.clone(),
            media.description.clone(),
            media.blurhash.clone(),
            media.avatar,
            media.header,
        )
}

impl Dereferencer {
    /// A [`DataFn`] fetching `url` through `transport`, abandoned on
    /// cancellation.
    pub(crate) fn media_source(
        &self,
        transport: Arc<dyn Transport>,
        req: &Requester,
        url: &str,
    ) -> DataFn {
        let cancel = req.cancel.clone();
        let url = url.to_string();
        Box::new(move || {
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                    r = transport.dereference_media(&url) => r,
                }
            }
            .boxed()
        })
    }

    /// Drive a media job, stopping early on cancellation.
    pub(crate) async fn load<T>(&self, req: &Requester, job: Processing<T>) -> DerefResult<T> {
        tokio::select! {
            biased;
            _ = req.cancel.cancelled() => Err(DerefError::new(TransportError::Cancelled)),
            r = job.load() => r.map_err(DerefError::from),
        }
    }

    /// Resolve a media file owned by `account_id`.
    #[tracing::instrument(skip(self, req, info), fields(url = %remote_url))]
    pub async fn resolve_media(
        &self,
        req: &Requester,
        account_id: &str,
        remote_url: &str,
        info: MediaInfo,
    ) -> DerefResult<ShadowMediaAttachment> {
        self.gate
            .check_uri(remote_url)
            .await
            .map_err(|e| e.context("resolve_media", remote_url))?;

        let existing = self
            .storage
            .get_media_by_remote_url(account_id, remote_url)
            .await
            .context("resolve_media", remote_url)?;

        if let Some(mut media) = existing {
            let changed = apply_info(&mut media, &info);
            if media.cached {
                if changed {
                    self.storage
                        .update_media(&media)
                        .await
                        .context("resolve_media", remote_url)?;
                }
                return Ok(media);
            }

            tracing::debug!("media: recaching {remote_url}");
            let transport = self.transport(req).await?;
            let job = self
                .media
                .recache_media(self.media_source(transport, req, remote_url), media)
                .await
                .context("resolve_media", remote_url)?;
            let media = self
                .load(req, job)
                .await
                .map_err(|e| e.context("resolve_media", remote_url))?;
            self.storage
                .update_media(&media)
                .await
                .context("resolve_media", remote_url)?;
            return Ok(media);
        }

        let mut media = ShadowMediaAttachment::new(account_id, remote_url);
        apply_info(&mut media, &info);

        let transport = self.transport(req).await?;
        let job = self
            .media
            .process_media(self.media_source(transport, req, remote_url), media)
            .await
            .context("resolve_media", remote_url)?;
        let media = self
            .load(req, job)
            .await
            .map_err(|e| e.context("resolve_media", remote_url))?;

        match self.storage.put_media(&media).await {
            Ok(()) => Ok(media),
            Err(StorageError::AlreadyExists(_)) => self
                .storage
                .get_media_by_remote_url(account_id, remote_url)
                .await
                .context("resolve_media", remote_url)?
                .ok_or_else(|| {
                    DerefError::new(Cause::Invalid("media vanished after conflict".into()))
                        .context("resolve_media", remote_url)
                }),
            Err(e) => Err(DerefError::new(e).context("resolve_media", remote_url)),
        }
    }
}
