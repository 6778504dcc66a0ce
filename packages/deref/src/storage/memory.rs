//! In-memory storage implementation.
//!
//! All records live in RAM behind a [`RwLock`] and are lost when the process
//! exits. Secondary indexes (URI, handle, remote URL) map natural keys to
//! record ids and are maintained alongside the primary maps.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use shadowfed::{ShadowAccount, ShadowEmoji, ShadowMediaAttachment, ShadowStatus};

use super::{Storage, StorageError};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, ShadowAccount>,
    account_by_uri: HashMap<String, String>,
    /// (lowercase username, lowercase domain) -> id
    account_by_handle: HashMap<(String, String), String>,

    statuses: HashMap<String, ShadowStatus>,
    status_by_uri: HashMap<String, String>,

    media: HashMap<String, ShadowMediaAttachment>,
    /// (account id, remote url) -> id
    media_by_remote: HashMap<(String, String), String>,

    /// (shortcode, lowercase domain) -> emoji
    emoji: HashMap<(String, String), ShadowEmoji>,

    domain_blocks: HashSet<String>,
    follows: HashSet<(String, String)>,
}

fn handle_key(username: &str, domain: &str) -> (String, String) {
    (username.to_lowercase(), domain.to_ascii_lowercase())
}

fn emoji_key(shortcode: &str, domain: &str) -> (String, String) {
    (shortcode.to_string(), domain.to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory implementation of [`Storage`].
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StorageError> {
        self.inner
            .write()
            .map_err(|_| StorageError::Internal("memory store lock poisoned".into()))
    }
}

// ---------------------------------------------------------------------------
// Storage impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Storage for MemoryStorage {
    // --- Accounts ------------------------------------------------------------

    async fn put_account(&self, account: &ShadowAccount) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let hkey = handle_key(&account.username, &account.domain);
        if inner.accounts.contains_key(&account.id)
            || inner.account_by_uri.contains_key(&account.uri)
            || inner.account_by_handle.contains_key(&hkey)
        {
            return Err(StorageError::AlreadyExists(format!(
                "account {}",
                account.uri
            )));
        }
        inner
            .account_by_uri
            .insert(account.uri.clone(), account.id.clone());
        inner.account_by_handle.insert(hkey, account.id.clone());
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn update_account(&self, account: &ShadowAccount) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let old = inner
            .accounts
            .get(&account.id)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        let new_key = handle_key(&account.username, &account.domain);
        let old_key = handle_key(&old.username, &old.domain);
        if new_key != old_key {
            if inner
                .account_by_handle
                .get(&new_key)
                .is_some_and(|id| id != &account.id)
            {
                return Err(StorageError::AlreadyExists(format!(
                    "account {}",
                    account.handle()
                )));
            }
            inner.account_by_handle.remove(&old_key);
            inner.account_by_handle.insert(new_key, account.id.clone());
        }
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account_by_id(&self, id: &str) -> Result<Option<ShadowAccount>, StorageError> {
        Ok(self.read()?.accounts.get(id).cloned())
    }

    async fn get_account_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<ShadowAccount>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .account_by_uri
            .get(uri)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn get_account_by_handle(
        &self,
        username: &str,
        domain: &str,
    ) -> Result<Option<ShadowAccount>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .account_by_handle
            .get(&handle_key(username, domain))
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    // --- Statuses ------------------------------------------------------------

    async fn put_status(&self, status: &ShadowStatus) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        if inner.statuses.contains_key(&status.id) || inner.status_by_uri.contains_key(&status.uri)
        {
            return Err(StorageError::AlreadyExists(format!("status {}", status.uri)));
        }
        inner
            .status_by_uri
            .insert(status.uri.clone(), status.id.clone());
        inner.statuses.insert(status.id.clone(), status.clone());
        Ok(())
    }

    async fn update_status(&self, status: &ShadowStatus) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        if !inner.statuses.contains_key(&status.id) {
            return Err(StorageError::NotFound);
        }
        inner.statuses.insert(status.id.clone(), status.clone());
        Ok(())
    }

    async fn delete_status(&self, id: &str) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let status = inner.statuses.remove(id).ok_or(StorageError::NotFound)?;
        inner.status_by_uri.remove(&status.uri);
        Ok(())
    }

    async fn get_status_by_id(&self, id: &str) -> Result<Option<ShadowStatus>, StorageError> {
        Ok(self.read()?.statuses.get(id).cloned())
    }

    async fn get_status_by_uri(&self, uri: &str) -> Result<Option<ShadowStatus>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .status_by_uri
            .get(uri)
            .and_then(|id| inner.statuses.get(id))
            .cloned())
    }

    // --- Media ---------------------------------------------------------------

    async fn put_media(&self, media: &ShadowMediaAttachment) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let key = (media.account_id.clone(), media.remote_url.clone());
        if inner.media.contains_key(&media.id) || inner.media_by_remote.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!(
                "media {}",
                media.remote_url
            )));
        }
        inner.media_by_remote.insert(key, media.id.clone());
        inner.media.insert(media.id.clone(), media.clone());
        Ok(())
    }

    async fn update_media(&self, media: &ShadowMediaAttachment) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let old = inner
            .media
            .get(&media.id)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        if old.remote_url != media.remote_url {
            inner
                .media_by_remote
                .remove(&(old.account_id.clone(), old.remote_url.clone()));
            inner.media_by_remote.insert(
                (media.account_id.clone(), media.remote_url.clone()),
                media.id.clone(),
            );
        }
        inner.media.insert(media.id.clone(), media.clone());
        Ok(())
    }

    async fn get_media_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ShadowMediaAttachment>, StorageError> {
        Ok(self.read()?.media.get(id).cloned())
    }

    async fn get_media_by_remote_url(
        &self,
        account_id: &str,
        remote_url: &str,
    ) -> Result<Option<ShadowMediaAttachment>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .media_by_remote
            .get(&(account_id.to_string(), remote_url.to_string()))
            .and_then(|id| inner.media.get(id))
            .cloned())
    }

    // --- Emoji ---------------------------------------------------------------

    async fn put_emoji(&self, emoji: &ShadowEmoji) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let key = emoji_key(&emoji.shortcode, &emoji.domain);
        if inner.emoji.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!("emoji {}", emoji.key())));
        }
        inner.emoji.insert(key, emoji.clone());
        Ok(())
    }

    async fn update_emoji(&self, emoji: &ShadowEmoji) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let key = emoji_key(&emoji.shortcode, &emoji.domain);
        match inner.emoji.get(&key) {
            Some(existing) if existing.id == emoji.id => {
                inner.emoji.insert(key, emoji.clone());
                Ok(())
            }
            _ => Err(StorageError::NotFound),
        }
    }

    async fn get_emoji(
        &self,
        shortcode: &str,
        domain: &str,
    ) -> Result<Option<ShadowEmoji>, StorageError> {
        Ok(self.read()?.emoji.get(&emoji_key(shortcode, domain)).cloned())
    }

    // --- Domain blocks -------------------------------------------------------

    async fn add_domain_block(&self, domain: &str) -> Result<(), StorageError> {
        self.write()?.domain_blocks.insert(domain.to_ascii_lowercase());
        Ok(())
    }

    async fn remove_domain_block(&self, domain: &str) -> Result<(), StorageError> {
        self.write()?
            .domain_blocks
            .remove(&domain.to_ascii_lowercase());
        Ok(())
    }

    async fn is_domain_blocked(&self, domain: &str) -> Result<bool, StorageError> {
        Ok(self
            .read()?
            .domain_blocks
            .contains(&domain.to_ascii_lowercase()))
    }

    // --- Follows -------------------------------------------------------------

    async fn add_follow(&self, follower_id: &str, target_id: &str) -> Result<(), StorageError> {
        self.write()?
            .follows
            .insert((follower_id.to_string(), target_id.to_string()));
        Ok(())
    }

    async fn remove_follow(
        &self,
        follower_id: &str,
        target_id: &str,
    ) -> Result<(), StorageError> {
        self.write()?
            .follows
            .remove(&(follower_id.to_string(), target_id.to_string()));
        Ok(())
    }

    async fn is_following(
        &self,
        follower_id: &str,
        target_id: &str,
    ) -> Result<bool, StorageError> {
        Ok(self
            .read()?
            .follows
            .contains(&(follower_id.to_string(), target_id.to_string())))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
