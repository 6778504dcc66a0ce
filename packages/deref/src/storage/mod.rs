//! Storage abstraction for shadow records.
//!
//! The [`Storage`] trait is the narrow contract the resolvers persist
//! through: typed get/put/update/delete per record kind, a domain-block
//! existence check, and the follow relationship the policy evaluator
//! queries. Each call is individually atomic; there are no multi-record
//! transactions.
//!
//! Getters return `Ok(None)` for "no such record". `put_*` returns
//! [`StorageError::AlreadyExists`] when the natural key is taken, which the
//! resolvers treat as a lost race and re-read.
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryStorage`] | Tests, the conformance suite, one-shot CLI runs |
//! | [`SqliteStorage`] | Durable single-file database |
//!
//! [`MemoryStorage`]: memory::MemoryStorage
//! [`SqliteStorage`]: sqlite::SqliteStorage

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use shadowfed::{ShadowAccount, ShadowEmoji, ShadowMediaAttachment, ShadowStatus};

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Update or delete of a record that does not exist.
    #[error("not found")]
    NotFound,

    /// A record with the same natural key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An unexpected error in the underlying storage backend.
    #[error("internal storage error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    // --- Accounts ------------------------------------------------------------

    /// Insert a new account. `AlreadyExists` if the URI or the
    /// (username, domain) pair is taken.
    async fn put_account(&self, account: &ShadowAccount) -> Result<(), StorageError>;

    /// Replace the account with the same `id`.
    async fn update_account(&self, account: &ShadowAccount) -> Result<(), StorageError>;

    async fn get_account_by_id(&self, id: &str) -> Result<Option<ShadowAccount>, StorageError>;

    async fn get_account_by_uri(&self, uri: &str)
        -> Result<Option<ShadowAccount>, StorageError>;

    /// Case-insensitive on both parts.
    async fn get_account_by_handle(
        &self,
        username: &str,
        domain: &str,
    ) -> Result<Option<ShadowAccount>, StorageError>;

    // --- Statuses ------------------------------------------------------------

    /// Insert a new status. `AlreadyExists` if the URI is taken.
    async fn put_status(&self, status: &ShadowStatus) -> Result<(), StorageError>;

    async fn update_status(&self, status: &ShadowStatus) -> Result<(), StorageError>;

    async fn delete_status(&self, id: &str) -> Result<(), StorageError>;

    async fn get_status_by_id(&self, id: &str) -> Result<Option<ShadowStatus>, StorageError>;

    async fn get_status_by_uri(&self, uri: &str) -> Result<Option<ShadowStatus>, StorageError>;

    // --- Media ---------------------------------------------------------------

    /// Insert a new attachment. `AlreadyExists` if (account, remote URL) is taken.
    async fn put_media(&self, media: &ShadowMediaAttachment) -> Result<(), StorageError>;

    async fn update_media(&self, media: &ShadowMediaAttachment) -> Result<(), StorageError>;

    async fn get_media_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ShadowMediaAttachment>, StorageError>;

    async fn get_media_by_remote_url(
        &self,
        account_id: &str,
        remote_url: &str,
    ) -> Result<Option<ShadowMediaAttachment>, StorageError>;

    // --- Emoji ---------------------------------------------------------------

    /// Insert a new emoji. `AlreadyExists` if (shortcode, domain) is taken.
    async fn put_emoji(&self, emoji: &ShadowEmoji) -> Result<(), StorageError>;

    async fn update_emoji(&self, emoji: &ShadowEmoji) -> Result<(), StorageError>;

    async fn get_emoji(
        &self,
        shortcode: &str,
        domain: &str,
    ) -> Result<Option<ShadowEmoji>, StorageError>;

    // --- Domain blocks -------------------------------------------------------

    async fn add_domain_block(&self, domain: &str) -> Result<(), StorageError>;

    async fn remove_domain_block(&self, domain: &str) -> Result<(), StorageError>;

    /// Exact, case-insensitive match.
    async fn is_domain_blocked(&self, domain: &str) -> Result<bool, StorageError>;

    // --- Follows -------------------------------------------------------------

    /// Record that `follower_id` follows `target_id`. Idempotent.
    async fn add_follow(&self, follower_id: &str, target_id: &str) -> Result<(), StorageError>;

    async fn remove_follow(&self, follower_id: &str, target_id: &str)
        -> Result<(), StorageError>;

    async fn is_following(&self, follower_id: &str, target_id: &str)
        -> Result<bool, StorageError>;
}
