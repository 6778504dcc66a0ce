//! Custom emoji, de-duplicated per `shortcode@domain`.

use shadowfed::{validate_emoji, ShadowEmoji};

use super::{Dereferencer, Requester};
use crate::error::{Cause, DerefError, DerefResult, ResultExt};
use crate::storage::StorageError;

impl Dereferencer {
    /// Resolve an emoji described by a tag.
    ///
    /// `candidate` carries the remote's view (shortcode, domain, URIs). A
    /// stored, cached emoji with the same URIs is returned as is; otherwise
    /// the image is (re)fetched. Concurrent calls for one key share a
    /// single fetch.
    #[tracing::instrument(skip(self, req, candidate), fields(emoji = %candidate.key()))]
    pub async fn resolve_emoji(
        &self,
        req: &Requester,
        candidate: ShadowEmoji,
    ) -> DerefResult<ShadowEmoji> {
        let key = candidate.key();
        validate_emoji(&candidate)
            .map_err(|e| DerefError::new(Cause::Invalid(e.to_string())).context("resolve_emoji", &key))?;

        if self.config.is_local_host(&candidate.domain) {
            return self
                .storage
                .get_emoji(&candidate.shortcode, &candidate.domain)
                .await
                .context("resolve_emoji", &key)?
                .ok_or_else(|| {
                    DerefError::new(Cause::LocalNotFound(key.clone())).context("resolve_emoji", &key)
                });
        }

        if self
            .gate
            .is_blocked(&candidate.domain)
            .await
            .context("resolve_emoji", &key)?
        {
            return Err(DerefError::new(Cause::DomainBlocked(candidate.domain.clone()))
                .context("resolve_emoji", &key));
        }
        self.gate
            .check_uri(&candidate.image_remote_url)
            .await
            .map_err(|e| e.context("resolve_emoji", &key))?;

        self.emoji_flight
            .run(key.clone(), || self.fetch_emoji(req, candidate))
            .await
            .map_err(|e| e.context("resolve_emoji", &key))
    }

    async fn fetch_emoji(&self, req: &Requester, candidate: ShadowEmoji) -> DerefResult<ShadowEmoji> {
        let existing = self
            .storage
            .get_emoji(&candidate.shortcode, &candidate.domain)
            .await?;

        if let Some(mut emoji) = existing {
            let moved = emoji.uri != candidate.uri
                || emoji.image_remote_url != candidate.image_remote_url
                || (candidate.image_static_remote_url.is_some()
                    && emoji.image_static_remote_url != candidate.image_static_remote_url);
            if emoji.cached && !moved {
                return Ok(emoji);
            }

            tracing::debug!("emoji: refreshing {}", emoji.key());
            emoji.uri = candidate.uri;
            emoji.image_remote_url = candidate.image_remote_url;
            if candidate.image_static_remote_url.is_some() {
                emoji.image_static_remote_url = candidate.image_static_remote_url;
            }
            let transport = self.transport(req).await?;
            let source = self.media_source(transport, req, &emoji.image_remote_url);
            let job = self.media.recache_emoji(source, emoji).await?;
            let emoji = self.load(req, job).await?;
            self.storage.update_emoji(&emoji).await?;
            return Ok(emoji);
        }

        let transport = self.transport(req).await?;
        let source = self.media_source(transport, req, &candidate.image_remote_url);
        let (shortcode, domain) = (candidate.shortcode.clone(), candidate.domain.clone());
        let job = self.media.process_emoji(source, candidate).await?;
        let emoji = self.load(req, job).await?;

        match self.storage.put_emoji(&emoji).await {
            Ok(()) => Ok(emoji),
            Err(StorageError::AlreadyExists(_)) => self
                .storage
                .get_emoji(&shortcode, &domain)
                .await?
                .ok_or_else(|| DerefError::new(Cause::Invalid("emoji vanished after conflict".into()))),
            Err(e) => Err(e.into()),
        }
    }
}
