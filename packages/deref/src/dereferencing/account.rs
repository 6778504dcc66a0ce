//! Remote actors.

use chrono::Utc;
use shadowfed::{validate_account, ShadowAccount};
use shadowfed_wire::{Accountable, ActorDoc, Vocab};

use super::convert;
use super::media::MediaInfo;
use super::{is_stale, Dereferencer, Requester};
use crate::blocks::authority;
use crate::error::{Cause, DerefError, DerefResult, ResultExt};
use crate::storage::StorageError;
use crate::webfinger;

impl Dereferencer {
    /// Resolve a remote actor by URI.
    ///
    /// Returns the stored record and whether it was fetched during this
    /// call. Records on the local host are served from storage only.
    #[tracing::instrument(skip(self, req), fields(uri = %uri))]
    pub async fn resolve_account(
        &self,
        req: &Requester,
        uri: &str,
    ) -> DerefResult<(ShadowAccount, bool)> {
        self.resolve_account_inner(req, uri, false)
            .await
            .map_err(|e| e.context("resolve_account", uri))
    }

    /// Resolve `username@domain`, fingering the domain when the account is
    /// not already stored.
    #[tracing::instrument(skip(self, req))]
    pub async fn resolve_account_by_handle(
        &self,
        req: &Requester,
        username: &str,
        domain: &str,
    ) -> DerefResult<(ShadowAccount, bool)> {
        let handle = format!("{username}@{domain}");
        let stored = self
            .storage
            .get_account_by_handle(username, domain)
            .await
            .context("resolve_account_by_handle", &handle)?;

        let local = self.config.is_local_host(domain)
            || domain.eq_ignore_ascii_case(&self.config.account_domain);

        if let Some(account) = stored {
            if local {
                return Ok((account, false));
            }
            return self
                .resolve_account(req, &account.uri)
                .await
                .map_err(|e| e.context("resolve_account_by_handle", &handle));
        }

        if local {
            return Err(DerefError::new(Cause::LocalNotFound(handle.clone()))
                .context("resolve_account_by_handle", &handle));
        }
        if self
            .gate
            .is_blocked(domain)
            .await
            .context("resolve_account_by_handle", &handle)?
        {
            return Err(DerefError::new(Cause::DomainBlocked(domain.to_ascii_lowercase()))
                .context("resolve_account_by_handle", &handle));
        }

        let transport = self.transport(req).await?;
        let fingered = webfinger::finger(transport.as_ref(), req, username, domain)
            .await
            .map_err(|e| e.context("resolve_account_by_handle", &handle))?;

        self.resolve_account(req, &fingered.actor_uri)
            .await
            .map_err(|e| e.context("resolve_account_by_handle", &handle))
    }

    /// Re-fetch a known account. `force` ignores the staleness interval.
    pub async fn refresh_account(
        &self,
        req: &Requester,
        account: &ShadowAccount,
        force: bool,
    ) -> DerefResult<(ShadowAccount, bool)> {
        self.resolve_account_inner(req, &account.uri, force)
            .await
            .map_err(|e| e.context("refresh_account", &account.uri))
    }

    /// Store a placeholder for an actor known only by URI, or return the
    /// record already stored for it.
    pub async fn placeholder_account(
        &self,
        uri: &str,
        name: Option<&str>,
    ) -> DerefResult<ShadowAccount> {
        let url = self
            .gate
            .check_uri(uri)
            .await
            .map_err(|e| e.context("placeholder_account", uri))?;
        if let Some(existing) = self
            .storage
            .get_account_by_uri(uri)
            .await
            .context("placeholder_account", uri)?
        {
            return Ok(existing);
        }

        // `@user@domain` from a mention tag, else the last path segment.
        let (username, domain) = match name.map(|n| n.trim_start_matches('@')).and_then(|n| n.split_once('@')) {
            Some((u, d)) if !u.is_empty() && !d.is_empty() => (u.to_string(), d.to_ascii_lowercase()),
            _ => {
                let last = url
                    .path_segments()
                    .and_then(|mut s| s.next_back())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("unknown")
                    .trim_start_matches('@')
                    .to_string();
                (last, authority(&url))
            }
        };

        let account = ShadowAccount::placeholder(uri, username, domain);
        match self.storage.put_account(&account).await {
            Ok(()) => {
                tracing::info!("account: stored placeholder for {uri}");
                Ok(account)
            }
            Err(StorageError::AlreadyExists(_)) => self.reread_account(uri).await,
            Err(e) => Err(DerefError::new(e).context("placeholder_account", uri)),
        }
    }

    async fn reread_account(&self, uri: &str) -> DerefResult<ShadowAccount> {
        self.storage
            .get_account_by_uri(uri)
            .await?
            .ok_or_else(|| DerefError::new(Cause::Invalid("account vanished after conflict".into())))
    }

    async fn resolve_account_inner(
        &self,
        req: &Requester,
        uri: &str,
        force: bool,
    ) -> DerefResult<(ShadowAccount, bool)> {
        let url = self.gate.check_uri(uri).await?;
        let host = authority(&url);
        let existing = self.storage.get_account_by_uri(uri).await?;

        if self.config.is_local_host(&host) {
            return existing
                .map(|a| (a, false))
                .ok_or_else(|| DerefError::new(Cause::LocalNotFound(uri.to_string())));
        }

        if let Some(account) = &existing {
            let now = Utc::now();
            if !force
                && !account.key_expired(now)
                && !is_stale(account.fetched_at, self.config.account_refresh, now)
            {
                return Ok((account.clone(), false));
            }
        }

        let key = (req.username.clone(), uri.to_string());
        if let Some(account) = &existing {
            if self.handshakes.contains(&key) {
                tracing::debug!("account: handshake with {uri} in progress, using stored record");
                return Ok((account.clone(), false));
            }
        }

        self.handshakes
            .run(key, || self.fetch_account(req, uri, host))
            .await
    }

    async fn fetch_account(
        &self,
        req: &Requester,
        uri: &str,
        host: String,
    ) -> DerefResult<(ShadowAccount, bool)> {
        // Re-read: a previous leader may have finished while we queued.
        let existing = self.storage.get_account_by_uri(uri).await?;

        let resp = self.fetch_document(req, uri).await?;

        let (kind, actor) = match Vocab::decode(&resp.body)? {
            Vocab::Actor(kind, actor) => (kind, actor),
            Vocab::Tombstone(_) => return Err(Cause::Tombstone.into()),
            other => {
                return Err(Cause::WrongType {
                    expected: "actor",
                    actual: other.type_name().to_string(),
                }
                .into())
            }
        };
        let doc = ActorDoc {
            kind,
            actor: &actor,
        };

        if doc.id() != uri {
            tracing::warn!("account: {uri} declares id {}, rejecting", doc.id());
            return Err(Cause::UriMismatch {
                requested: uri.to_string(),
                declared: doc.id().to_string(),
            }
            .into());
        }

        let domain = match &existing {
            Some(e) if !e.is_placeholder() => e.domain.clone(),
            _ => self.canonical_domain(req, &doc, uri, &host).await,
        };

        let mut account = convert::account_from_actor(&doc, &domain, existing.as_ref())?;
        validate_account(&account).map_err(|e| Cause::Invalid(e.to_string()))?;

        let now = Utc::now();
        if let Some(old) = &existing {
            if !old.is_placeholder()
                && old.public_key.is_some()
                && account.public_key != old.public_key
            {
                if !old.key_expired(now) {
                    tracing::warn!("account: refusing key change for {uri}");
                    return Err(Cause::KeyRotationRefused(uri.to_string()).into());
                }
                tracing::info!("account: accepted new key for {uri}");
            }
        }
        if existing
            .as_ref()
            .map_or(true, |old| old.public_key != account.public_key || old.key_expired(now))
        {
            account.public_key_expires_at = None;
        }
        account.fetched_at = Some(now);

        if existing.is_some() {
            self.storage.update_account(&account).await?;
        } else {
            match self.storage.put_account(&account).await {
                Ok(()) => {}
                Err(StorageError::AlreadyExists(_)) => {
                    return Ok((self.reread_account(uri).await?, false));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if self.enrich_account(req, &mut account, &doc).await {
            self.storage.update_account(&account).await?;
        }
        Ok((account, true))
    }

    /// The account domain webfinger vouches for, else the URI host.
    async fn canonical_domain(
        &self,
        req: &Requester,
        doc: &ActorDoc<'_>,
        uri: &str,
        host: &str,
    ) -> String {
        let Some(username) = doc.preferred_username().filter(|u| !u.is_empty()) else {
            return host.to_string();
        };
        let transport = match self.transport(req).await {
            Ok(t) => t,
            Err(_) => return host.to_string(),
        };
        match webfinger::finger(transport.as_ref(), req, username, host).await {
            Ok(f) if f.actor_uri == uri => f.domain,
            Ok(f) => {
                tracing::debug!(
                    "account: webfinger for {username}@{host} points at {}, keeping host",
                    f.actor_uri
                );
                host.to_string()
            }
            Err(e) => {
                tracing::debug!("account: webfinger for {username}@{host} failed: {e}");
                host.to_string()
            }
        }
    }

    /// Avatar, header and emoji. Failures are logged and skipped. Returns
    /// whether the record changed.
    async fn enrich_account(
        &self,
        req: &Requester,
        account: &mut ShadowAccount,
        doc: &ActorDoc<'_>,
    ) -> bool {
        let mut changed = false;

        if let Some(url) = account.avatar_remote_url.clone() {
            let info = MediaInfo {
                avatar: true,
                description: doc.avatar().and_then(|i| i.name.clone()),
                ..Default::default()
            };
            match self.resolve_media(req, &account.id, &url, info).await {
                Ok(m) => {
                    changed |= account.avatar_media_id.as_deref() != Some(m.id.as_str());
                    account.avatar_media_id = Some(m.id);
                }
                Err(e) => tracing::debug!("account: skipping avatar for {}: {e}", account.uri),
            }
        }

        if let Some(url) = account.header_remote_url.clone() {
            let info = MediaInfo {
                header: true,
                description: doc.header().and_then(|i| i.name.clone()),
                ..Default::default()
            };
            match self.resolve_media(req, &account.id, &url, info).await {
                Ok(m) => {
                    changed |= account.header_media_id.as_deref() != Some(m.id.as_str());
                    account.header_media_id = Some(m.id);
                }
                Err(e) => tracing::debug!("account: skipping header for {}: {e}", account.uri),
            }
        }

        let mut emoji_ids = Vec::new();
        for tag in doc.emojis() {
            let Some(candidate) = convert::emoji_from_tag(tag, &account.domain) else {
                continue;
            };
            match self.resolve_emoji(req, candidate).await {
                Ok(e) => emoji_ids.push(e.id),
                Err(e) => tracing::debug!("account: skipping emoji on {}: {e}", account.uri),
            }
        }
        if emoji_ids != account.emoji_ids {
            account.emoji_ids = emoji_ids;
            changed = true;
        }

        changed
    }
}
