//! Remote posts and boosts.

use chrono::Utc;
use shadowfed::{ShadowAccount, ShadowStatus};
use shadowfed_wire::{StatusObject, Statusable, Vocab};

use super::convert;
use super::media::MediaInfo;
use super::{is_stale, Dereferencer, Requester};
use crate::blocks::{authority, parse_remote_uri};
use crate::error::{Cause, DerefError, DerefResult, ResultExt};
use crate::storage::StorageError;

impl Dereferencer {
    /// Resolve a remote status by URI.
    ///
    /// The author is resolved first and is required. Attachments, mentions,
    /// emoji and the local reply linkage are filled in best-effort. A reply
    /// the parent's policy refuses is not stored, and any stored copy is
    /// deleted.
    #[tracing::instrument(skip(self, req), fields(uri = %uri))]
    pub async fn resolve_status(
        &self,
        req: &Requester,
        uri: &str,
    ) -> DerefResult<(ShadowStatus, bool)> {
        self.resolve_status_inner(req, uri, false)
            .await
            .map_err(|e| e.context("resolve_status", uri))
    }

    /// Re-fetch a known status. `force` ignores the staleness interval.
    pub async fn refresh_status(
        &self,
        req: &Requester,
        status: &ShadowStatus,
        force: bool,
    ) -> DerefResult<(ShadowStatus, bool)> {
        self.resolve_status_inner(req, &status.uri, force)
            .await
            .map_err(|e| e.context("refresh_status", &status.uri))
    }

    /// Fill in the boosted status of a boost wrapper and gate the boost.
    ///
    /// A refused boost is retracted if it was stored.
    pub async fn enrich_boost(
        &self,
        req: &Requester,
        mut wrapper: ShadowStatus,
    ) -> DerefResult<ShadowStatus> {
        let Some(target_uri) = wrapper.boost_of_uri.clone() else {
            return Ok(wrapper);
        };

        let target = if self.is_local_uri(&target_uri) {
            self.storage
                .get_status_by_uri(&target_uri)
                .await
                .context("enrich_boost", &wrapper.uri)?
                .ok_or_else(|| {
                    DerefError::new(Cause::LocalNotFound(target_uri.clone()))
                        .context("enrich_boost", &wrapper.uri)
                })?
        } else {
            self.resolve_status(req, &target_uri)
                .await
                .map_err(|e| e.context("enrich_boost", &wrapper.uri))?
                .0
        };

        let booster = self
            .storage
            .get_account_by_id(&wrapper.account_id)
            .await
            .context("enrich_boost", &wrapper.uri)?
            .ok_or_else(|| {
                DerefError::new(Cause::Invalid(format!(
                    "booster {} is not stored",
                    wrapper.account_uri
                )))
                .context("enrich_boost", &wrapper.uri)
            })?;

        wrapper.boost_of_id = Some(target.id.clone());
        wrapper.boost_of_account_id = Some(target.account_id.clone());

        self.permit_boost(req, &mut wrapper, &booster, &target)
            .await
            .map_err(|e| e.context("enrich_boost", &wrapper.uri))?;
        Ok(wrapper)
    }

    pub(crate) fn is_local_uri(&self, uri: &str) -> bool {
        parse_remote_uri(uri)
            .map(|u| self.config.is_local_host(&authority(&u)))
            .unwrap_or(false)
    }

    async fn resolve_status_inner(
        &self,
        req: &Requester,
        uri: &str,
        force: bool,
    ) -> DerefResult<(ShadowStatus, bool)> {
        let url = self.gate.check_uri(uri).await?;
        let host = authority(&url);
        let existing = self.storage.get_status_by_uri(uri).await?;

        if self.config.is_local_host(&host) {
            return existing
                .map(|s| (s, false))
                .ok_or_else(|| DerefError::new(Cause::LocalNotFound(uri.to_string())));
        }

        if let Some(status) = &existing {
            if !force && !is_stale(status.fetched_at, self.config.status_refresh, Utc::now()) {
                return Ok((status.clone(), false));
            }
        }

        let resp = self.fetch_document(req, uri).await?;

        let obj = match Vocab::decode(&resp.body)? {
            Vocab::Status(_, obj) => obj,
            Vocab::Tombstone(_) => return Err(Cause::Tombstone.into()),
            other => {
                return Err(Cause::WrongType {
                    expected: "status",
                    actual: other.type_name().to_string(),
                }
                .into())
            }
        };

        if obj.id != uri {
            tracing::warn!("status: {uri} declares id {}, rejecting", obj.id);
            return Err(Cause::UriMismatch {
                requested: uri.to_string(),
                declared: obj.id.clone(),
            }
            .into());
        }

        let author_uri = obj
            .attributed_to()
            .ok_or_else(|| Cause::Invalid(format!("status {uri} has no attributedTo")))?
            .to_string();
        let author_host = authority(&parse_remote_uri(&author_uri)?);
        if author_host != host {
            tracing::warn!("status: {uri} attributed to foreign host {author_host}");
            return Err(Cause::Invalid(format!(
                "status host {host} does not match author host {author_host}"
            ))
            .into());
        }

        let (author, _) = self.resolve_account(req, &author_uri).await?;

        let mut status = convert::status_from_object(&obj, &author, existing.as_ref());
        self.permit_reply(req, &mut status, &author).await?;
        self.enrich_status(req, &mut status, &author, &obj).await;
        status.fetched_at = Some(Utc::now());

        if existing.is_some() {
            self.storage.update_status(&status).await?;
            return Ok((status, true));
        }
        match self.storage.put_status(&status).await {
            Ok(()) => Ok((status, true)),
            Err(StorageError::AlreadyExists(_)) => {
                let stored = self.storage.get_status_by_uri(uri).await?.ok_or_else(|| {
                    DerefError::new(Cause::Invalid("status vanished after conflict".into()))
                })?;
                Ok((stored, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mentions, attachments, emoji and reply linkage. Per-item failures
    /// are logged and skipped.
    async fn enrich_status(
        &self,
        req: &Requester,
        status: &mut ShadowStatus,
        author: &ShadowAccount,
        obj: &StatusObject,
    ) {
        for mention in status.mentions.iter_mut() {
            if mention.target_account_id.is_some() {
                continue;
            }
            let uri = mention.target_account_uri.clone();
            let resolved = match self.resolve_account(req, &uri).await {
                Ok((account, _)) => Ok(account),
                Err(e) if e.is_cancelled() || e.is_domain_blocked() || self.is_local_uri(&uri) => {
                    Err(e)
                }
                Err(e) => {
                    tracing::debug!("status: mention {uri} unresolvable ({e}), using placeholder");
                    self.placeholder_account(&uri, mention.name.as_deref()).await
                }
            };
            match resolved {
                Ok(account) => mention.target_account_id = Some(account.id),
                Err(e) => tracing::debug!("status: skipping mention {uri} on {}: {e}", status.uri),
            }
        }

        let mut attachment_ids = Vec::new();
        for attachment in obj.attachments() {
            let Some(url) = attachment.url() else {
                continue;
            };
            let info = MediaInfo {
                status_id: Some(status.id.clone()),
                content_type: attachment.media_type.clone(),
                description: attachment.name.clone(),
                blurhash: attachment.blurhash.clone(),
                ..Default::default()
            };
            match self.resolve_media(req, &author.id, url, info).await {
                Ok(m) => attachment_ids.push(m.id),
                Err(e) => tracing::debug!("status: skipping attachment {url} on {}: {e}", status.uri),
            }
        }
        status.attachment_ids = attachment_ids;

        let mut emoji_ids = Vec::new();
        for tag in obj.emojis() {
            let Some(candidate) = convert::emoji_from_tag(tag, &author.domain) else {
                continue;
            };
            match self.resolve_emoji(req, candidate).await {
                Ok(e) => emoji_ids.push(e.id),
                Err(e) => tracing::debug!("status: skipping emoji on {}: {e}", status.uri),
            }
        }
        status.emoji_ids = emoji_ids;

        if let Some(parent_uri) = status.in_reply_to_uri.clone() {
            match self.storage.get_status_by_uri(&parent_uri).await {
                Ok(Some(parent)) => {
                    status.in_reply_to_id = Some(parent.id);
                    status.in_reply_to_account_id = Some(parent.account_id);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("status: reply linkage for {}: {e}", status.uri),
            }
        }
    }
}
