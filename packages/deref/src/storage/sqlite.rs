//! SQLite-backed storage implementation.
//!
//! Uses `rusqlite` (with bundled SQLite) wrapped in an `Arc<Mutex<Connection>>`
//! to satisfy the `Send + Sync` requirements. All blocking calls are offloaded
//! to a thread-pool via `tokio::task::spawn_blocking`.
//!
//! # Schema
//!
//! Every record table stores the full JSON blob in `data`, plus the natural
//! key columns with UNIQUE constraints. A constraint violation on insert is
//! reported as [`StorageError::AlreadyExists`].
//!
//! - `accounts`: unique `uri`, unique (`username_lc`, `domain_lc`).
//! - `statuses`: unique `uri`.
//! - `media`: unique (`account_id`, `remote_url`).
//! - `emoji`: unique (`shortcode`, `domain`).
//! - `domain_blocks`, `follows`: plain key tables.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use shadowfed::{ShadowAccount, ShadowEmoji, ShadowMediaAttachment, ShadowStatus};

use super::{Storage, StorageError};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id          TEXT PRIMARY KEY,
    uri         TEXT NOT NULL UNIQUE,
    username_lc TEXT NOT NULL,
    domain_lc   TEXT NOT NULL,
    data        TEXT NOT NULL,
    UNIQUE (username_lc, domain_lc)
);

CREATE TABLE IF NOT EXISTS statuses (
    id          TEXT PRIMARY KEY,
    uri         TEXT NOT NULL UNIQUE,
    account_id  TEXT NOT NULL,
    data        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_statuses_account ON statuses(account_id);

CREATE TABLE IF NOT EXISTS media (
    id          TEXT PRIMARY KEY,
    account_id  TEXT NOT NULL,
    remote_url  TEXT NOT NULL,
    data        TEXT NOT NULL,
    UNIQUE (account_id, remote_url)
);

CREATE TABLE IF NOT EXISTS emoji (
    id          TEXT PRIMARY KEY,
    shortcode   TEXT NOT NULL,
    domain      TEXT NOT NULL,
    data        TEXT NOT NULL,
    UNIQUE (shortcode, domain)
);

CREATE TABLE IF NOT EXISTS domain_blocks (
    domain TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS follows (
    follower_id TEXT NOT NULL,
    target_id   TEXT NOT NULL,
    PRIMARY KEY (follower_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_follows_target ON follows(target_id);
";

// ---------------------------------------------------------------------------
// SqliteStorage
// ---------------------------------------------------------------------------

/// SQLite-backed implementation of [`Storage`].
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the SQLite database at `path` and apply the schema.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database (data is lost when dropped).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Internal("sqlite connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Internal(format!("task join error: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Error conversions and row helpers
// ---------------------------------------------------------------------------

fn map_err(e: rusqlite::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

fn map_json_err(e: serde_json::Error) -> StorageError {
    StorageError::Internal(format!("JSON error: {e}"))
}

/// Like [`map_err`], but a UNIQUE violation becomes `AlreadyExists(what)`.
fn map_insert_err(what: String) -> impl FnOnce(rusqlite::Error) -> StorageError {
    move |e| {
        let unique = matches!(
            &e,
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
        );
        if unique {
            StorageError::AlreadyExists(what)
        } else {
            map_err(e)
        }
    }
}

fn get_json<T: DeserializeOwned, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    p: P,
) -> Result<Option<T>, StorageError> {
    let data: Option<String> = conn
        .query_row(sql, p, |row| row.get(0))
        .optional()
        .map_err(map_err)?;
    data.map(|d| serde_json::from_str(&d).map_err(map_json_err))
        .transpose()
}

fn affected_or_not_found(n: usize) -> Result<(), StorageError> {
    if n == 0 {
        Err(StorageError::NotFound)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Storage for SqliteStorage {
    // --- Accounts ------------------------------------------------------------

    async fn put_account(&self, account: &ShadowAccount) -> Result<(), StorageError> {
        let account = account.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&account).map_err(map_json_err)?;
            conn.execute(
                "INSERT INTO accounts (id, uri, username_lc, domain_lc, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    account.id,
                    account.uri,
                    account.username.to_lowercase(),
                    account.domain.to_ascii_lowercase(),
                    data,
                ],
            )
            .map_err(map_insert_err(format!("account {}", account.uri)))?;
            Ok(())
        })
        .await
    }

    async fn update_account(&self, account: &ShadowAccount) -> Result<(), StorageError> {
        let account = account.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&account).map_err(map_json_err)?;
            let n = conn
                .execute(
                    "UPDATE accounts SET uri = ?2, username_lc = ?3, domain_lc = ?4, data = ?5
                     WHERE id = ?1",
                    params![
                        account.id,
                        account.uri,
                        account.username.to_lowercase(),
                        account.domain.to_ascii_lowercase(),
                        data,
                    ],
                )
                .map_err(map_insert_err(format!("account {}", account.handle())))?;
            affected_or_not_found(n)
        })
        .await
    }

    async fn get_account_by_id(&self, id: &str) -> Result<Option<ShadowAccount>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            get_json(conn, "SELECT data FROM accounts WHERE id = ?1", params![id])
        })
        .await
    }

    async fn get_account_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<ShadowAccount>, StorageError> {
        let uri = uri.to_string();
        self.with_conn(move |conn| {
            get_json(conn, "SELECT data FROM accounts WHERE uri = ?1", params![uri])
        })
        .await
    }

    async fn get_account_by_handle(
        &self,
        username: &str,
        domain: &str,
    ) -> Result<Option<ShadowAccount>, StorageError> {
        let username = username.to_lowercase();
        let domain = domain.to_ascii_lowercase();
        self.with_conn(move |conn| {
            get_json(
                conn,
                "SELECT data FROM accounts WHERE username_lc = ?1 AND domain_lc = ?2",
                params![username, domain],
            )
        })
        .await
    }

    // --- Statuses ------------------------------------------------------------

    async fn put_status(&self, status: &ShadowStatus) -> Result<(), StorageError> {
        let status = status.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&status).map_err(map_json_err)?;
            conn.execute(
                "INSERT INTO statuses (id, uri, account_id, data) VALUES (?1, ?2, ?3, ?4)",
                params![status.id, status.uri, status.account_id, data],
            )
            .map_err(map_insert_err(format!("status {}", status.uri)))?;
            Ok(())
        })
        .await
    }

    async fn update_status(&self, status: &ShadowStatus) -> Result<(), StorageError> {
        let status = status.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&status).map_err(map_json_err)?;
            let n = conn
                .execute(
                    "UPDATE statuses SET account_id = ?2, data = ?3 WHERE id = ?1",
                    params![status.id, status.account_id, data],
                )
                .map_err(map_err)?;
            affected_or_not_found(n)
        })
        .await
    }

    async fn delete_status(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = conn
                .execute("DELETE FROM statuses WHERE id = ?1", params![id])
                .map_err(map_err)?;
            affected_or_not_found(n)
        })
        .await
    }

    async fn get_status_by_id(&self, id: &str) -> Result<Option<ShadowStatus>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            get_json(conn, "SELECT data FROM statuses WHERE id = ?1", params![id])
        })
        .await
    }

    async fn get_status_by_uri(&self, uri: &str) -> Result<Option<ShadowStatus>, StorageError> {
        let uri = uri.to_string();
        self.with_conn(move |conn| {
            get_json(conn, "SELECT data FROM statuses WHERE uri = ?1", params![uri])
        })
        .await
    }

    // --- Media ---------------------------------------------------------------

    async fn put_media(&self, media: &ShadowMediaAttachment) -> Result<(), StorageError> {
        let media = media.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&media).map_err(map_json_err)?;
            conn.execute(
                "INSERT INTO media (id, account_id, remote_url, data) VALUES (?1, ?2, ?3, ?4)",
                params![media.id, media.account_id, media.remote_url, data],
            )
            .map_err(map_insert_err(format!("media {}", media.remote_url)))?;
            Ok(())
        })
        .await
    }

    async fn update_media(&self, media: &ShadowMediaAttachment) -> Result<(), StorageError> {
        let media = media.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&media).map_err(map_json_err)?;
            let n = conn
                .execute(
                    "UPDATE media SET account_id = ?2, remote_url = ?3, data = ?4 WHERE id = ?1",
                    params![media.id, media.account_id, media.remote_url, data],
                )
                .map_err(map_insert_err(format!("media {}", media.remote_url)))?;
            affected_or_not_found(n)
        })
        .await
    }

    async fn get_media_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ShadowMediaAttachment>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            get_json(conn, "SELECT data FROM media WHERE id = ?1", params![id])
        })
        .await
    }

    async fn get_media_by_remote_url(
        &self,
        account_id: &str,
        remote_url: &str,
    ) -> Result<Option<ShadowMediaAttachment>, StorageError> {
        let account_id = account_id.to_string();
        let remote_url = remote_url.to_string();
        self.with_conn(move |conn| {
            get_json(
                conn,
                "SELECT data FROM media WHERE account_id = ?1 AND remote_url = ?2",
                params![account_id, remote_url],
            )
        })
        .await
    }

    // --- Emoji ---------------------------------------------------------------

    async fn put_emoji(&self, emoji: &ShadowEmoji) -> Result<(), StorageError> {
        let emoji = emoji.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&emoji).map_err(map_json_err)?;
            conn.execute(
                "INSERT INTO emoji (id, shortcode, domain, data) VALUES (?1, ?2, ?3, ?4)",
                params![
                    emoji.id,
                    emoji.shortcode,
                    emoji.domain.to_ascii_lowercase(),
                    data
                ],
            )
            .map_err(map_insert_err(format!("emoji {}", emoji.key())))?;
            Ok(())
        })
        .await
    }

    async fn update_emoji(&self, emoji: &ShadowEmoji) -> Result<(), StorageError> {
        let emoji = emoji.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&emoji).map_err(map_json_err)?;
            let n = conn
                .execute(
                    "UPDATE emoji SET shortcode = ?2, domain = ?3, data = ?4 WHERE id = ?1",
                    params![
                        emoji.id,
                        emoji.shortcode,
                        emoji.domain.to_ascii_lowercase(),
                        data
                    ],
                )
                .map_err(map_insert_err(format!("emoji {}", emoji.key())))?;
            affected_or_not_found(n)
        })
        .await
    }

    async fn get_emoji(
        &self,
        shortcode: &str,
        domain: &str,
    ) -> Result<Option<ShadowEmoji>, StorageError> {
        let shortcode = shortcode.to_string();
        let domain = domain.to_ascii_lowercase();
        self.with_conn(move |conn| {
            get_json(
                conn,
                "SELECT data FROM emoji WHERE shortcode = ?1 AND domain = ?2",
                params![shortcode, domain],
            )
        })
        .await
    }

    // --- Domain blocks -------------------------------------------------------

    async fn add_domain_block(&self, domain: &str) -> Result<(), StorageError> {
        let domain = domain.to_ascii_lowercase();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO domain_blocks (domain) VALUES (?1)",
                params![domain],
            )
            .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn remove_domain_block(&self, domain: &str) -> Result<(), StorageError> {
        let domain = domain.to_ascii_lowercase();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM domain_blocks WHERE domain = ?1", params![domain])
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn is_domain_blocked(&self, domain: &str) -> Result<bool, StorageError> {
        let domain = domain.to_ascii_lowercase();
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM domain_blocks WHERE domain = ?1",
                    params![domain],
                    |row| row.get(0),
                )
                .map_err(map_err)?;
            Ok(count > 0)
        })
        .await
    }

    // --- Follows -------------------------------------------------------------

    async fn add_follow(&self, follower_id: &str, target_id: &str) -> Result<(), StorageError> {
        let (follower_id, target_id) = (follower_id.to_string(), target_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, target_id) VALUES (?1, ?2)",
                params![follower_id, target_id],
            )
            .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn remove_follow(
        &self,
        follower_id: &str,
        target_id: &str,
    ) -> Result<(), StorageError> {
        let (follower_id, target_id) = (follower_id.to_string(), target_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND target_id = ?2",
                params![follower_id, target_id],
            )
            .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn is_following(
        &self,
        follower_id: &str,
        target_id: &str,
    ) -> Result<bool, StorageError> {
        let (follower_id, target_id) = (follower_id.to_string(), target_id.to_string());
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND target_id = ?2",
                    params![follower_id, target_id],
                    |row| row.get(0),
                )
                .map_err(map_err)?;
            Ok(count > 0)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
