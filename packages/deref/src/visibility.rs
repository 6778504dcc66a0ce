//! Whether an account may see a status.

use std::sync::Arc;

use async_trait::async_trait;
use shadowfed::{ShadowAccount, ShadowStatus, Visibility};

use crate::storage::{Storage, StorageError};

#[async_trait]
pub trait VisibilityFilter: Send + Sync {
    async fn status_visible(
        &self,
        requester: &ShadowAccount,
        status: &ShadowStatus,
    ) -> Result<bool, StorageError>;
}

/// Visibility from addressing and the stored follow graph.
pub struct StorageVisibility {
    storage: Arc<dyn Storage>,
}

impl StorageVisibility {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl VisibilityFilter for StorageVisibility {
    async fn status_visible(
        &self,
        requester: &ShadowAccount,
        status: &ShadowStatus,
    ) -> Result<bool, StorageError> {
        if requester.id == status.account_id
            || status.mentions_account(&requester.id)
            || status
                .mentions
                .iter()
                .any(|m| m.target_account_uri == requester.uri)
        {
            return Ok(true);
        }
        Ok(match status.visibility {
            Visibility::Public | Visibility::Unlocked => true,
            Visibility::FollowersOnly => {
                self.storage
                    .is_following(&requester.id, &status.account_id)
                    .await?
            }
            Visibility::MutualsOnly => {
                self.storage
                    .is_following(&requester.id, &status.account_id)
                    .await?
                    && self
                        .storage
                        .is_following(&status.account_id, &requester.id)
                        .await?
            }
            Visibility::Direct => false,
        })
    }
}
