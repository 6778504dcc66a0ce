//! Interaction policy evaluation.
//!
//! [`InteractionFilter::check`] answers "may `requester` like / reply to /
//! boost `target`?" with Permitted, WithApproval or Forbidden.
//!
//! Preconditions and shortcuts, in order:
//!
//! 1. Replying to or boosting a boost wrapper is Forbidden.
//! 2. A local target must be visible to the requester.
//! 3. Boosting a Direct status is Forbidden.
//! 4. Replying to a status that is itself pending approval needs approval,
//!    unless the requester started the thread.
//! 5. The author may always interact with their own status.
//!
//! Then the effective policy's Always set is tried, then its WithApproval
//! set. Within a set the values are tried as author, mentioned, explicit
//! URI, followers, following, public; the first match wins. A failed
//! follow-graph query is an error, never a Forbidden.

use std::sync::Arc;

use shadowfed::{
    InteractionPolicy, InteractionType, PolicyCheckResult, PolicyValue, ShadowAccount,
    ShadowStatus, Visibility,
};

use crate::storage::{Storage, StorageError};
use crate::visibility::VisibilityFilter;

/// Upper bound on parent hops when looking for a thread's first post.
const MAX_THREAD_DEPTH: usize = 512;

#[derive(Clone)]
pub struct InteractionFilter {
    storage: Arc<dyn Storage>,
    visibility: Arc<dyn VisibilityFilter>,
}

/// Follow-graph answers, each queried at most once per check.
#[derive(Default)]
struct Memo {
    follows_author: Option<bool>,
    followed_by_author: Option<bool>,
    author: Option<Option<ShadowAccount>>,
}

impl InteractionFilter {
    pub fn new(storage: Arc<dyn Storage>, visibility: Arc<dyn VisibilityFilter>) -> Self {
        Self {
            storage,
            visibility,
        }
    }

    pub async fn check(
        &self,
        interaction: InteractionType,
        requester: &ShadowAccount,
        target: &ShadowStatus,
    ) -> Result<PolicyCheckResult, StorageError> {
        if target.is_boost()
            && matches!(interaction, InteractionType::Reply | InteractionType::Announce)
        {
            tracing::debug!("policy: {interaction} of boost wrapper {} refused", target.uri);
            return Ok(PolicyCheckResult::forbidden());
        }

        if target.local && !self.visibility.status_visible(requester, target).await? {
            tracing::debug!("policy: {} cannot see {}", requester.uri, target.uri);
            return Ok(PolicyCheckResult::forbidden());
        }

        if interaction == InteractionType::Announce && target.visibility == Visibility::Direct {
            return Ok(PolicyCheckResult::forbidden());
        }

        if interaction == InteractionType::Reply
            && target.pending_approval
            && !self.started_thread(requester, target).await?
        {
            return Ok(PolicyCheckResult::with_approval(None));
        }

        if requester.id == target.account_id {
            return Ok(PolicyCheckResult::permitted(PolicyValue::Author));
        }

        let policy = target.effective_policy();
        self.check_rules(&policy, interaction, requester, target).await
    }

    async fn check_rules(
        &self,
        policy: &InteractionPolicy,
        interaction: InteractionType,
        requester: &ShadowAccount,
        target: &ShadowStatus,
    ) -> Result<PolicyCheckResult, StorageError> {
        let rules = policy.rules_for(interaction);
        let mut memo = Memo::default();

        if let Some(v) = self
            .match_set(&rules.always, requester, target, &mut memo)
            .await?
        {
            return Ok(PolicyCheckResult::permitted(v));
        }
        if let Some(v) = self
            .match_set(&rules.with_approval, requester, target, &mut memo)
            .await?
        {
            return Ok(PolicyCheckResult::with_approval(Some(v)));
        }
        Ok(PolicyCheckResult::forbidden())
    }

    /// First matching value in the fixed evaluation order.
    async fn match_set(
        &self,
        values: &[PolicyValue],
        requester: &ShadowAccount,
        target: &ShadowStatus,
        memo: &mut Memo,
    ) -> Result<Option<PolicyValue>, StorageError> {
        if values.is_empty() {
            return Ok(None);
        }

        // Explicit URIs naming the author's own collections act as the
        // symbolic values.
        let mut followers = values.contains(&PolicyValue::Followers);
        let mut following = values.contains(&PolicyValue::Following);
        let uris: Vec<&str> = values
            .iter()
            .filter_map(|v| match v {
                PolicyValue::Uri(u) => Some(u.as_str()),
                _ => None,
            })
            .collect();
        if !uris.is_empty() {
            if let Some(author) = self.author(target, memo).await? {
                followers |= author.followers_uri.as_deref().is_some_and(|f| uris.contains(&f));
                following |= author.following_uri.as_deref().is_some_and(|f| uris.contains(&f));
            }
        }

        if values.contains(&PolicyValue::Author) && requester.id == target.account_id {
            return Ok(Some(PolicyValue::Author));
        }
        if values.contains(&PolicyValue::Mentioned) && is_mentioned(requester, target) {
            return Ok(Some(PolicyValue::Mentioned));
        }
        if uris.contains(&requester.uri.as_str()) {
            return Ok(Some(PolicyValue::Uri(requester.uri.clone())));
        }
        if followers && self.follows_author(requester, target, memo).await? {
            return Ok(Some(PolicyValue::Followers));
        }
        if following && self.followed_by_author(requester, target, memo).await? {
            return Ok(Some(PolicyValue::Following));
        }
        if values.contains(&PolicyValue::Public) {
            return Ok(Some(PolicyValue::Public));
        }
        Ok(None)
    }

    async fn author<'m>(
        &self,
        target: &ShadowStatus,
        memo: &'m mut Memo,
    ) -> Result<Option<&'m ShadowAccount>, StorageError> {
        if memo.author.is_none() {
            memo.author = Some(self.storage.get_account_by_id(&target.account_id).await?);
        }
        Ok(memo.author.as_ref().and_then(Option::as_ref))
    }

    async fn follows_author(
        &self,
        requester: &ShadowAccount,
        target: &ShadowStatus,
        memo: &mut Memo,
    ) -> Result<bool, StorageError> {
        if let Some(b) = memo.follows_author {
            return Ok(b);
        }
        let b = self
            .storage
            .is_following(&requester.id, &target.account_id)
            .await?;
        memo.follows_author = Some(b);
        Ok(b)
    }

    async fn followed_by_author(
        &self,
        requester: &ShadowAccount,
        target: &ShadowStatus,
        memo: &mut Memo,
    ) -> Result<bool, StorageError> {
        if let Some(b) = memo.followed_by_author {
            return Ok(b);
        }
        let b = self
            .storage
            .is_following(&target.account_id, &requester.id)
            .await?;
        memo.followed_by_author = Some(b);
        Ok(b)
    }

    /// Whether `requester` wrote the first post of the thread `status` is in.
    async fn started_thread(
        &self,
        requester: &ShadowAccount,
        status: &ShadowStatus,
    ) -> Result<bool, StorageError> {
        let mut current = status.clone();
        for _ in 0..MAX_THREAD_DEPTH {
            let parent = match (&current.in_reply_to_id, &current.in_reply_to_uri) {
                (Some(id), _) => self.storage.get_status_by_id(id).await?,
                (None, Some(uri)) => self.storage.get_status_by_uri(uri).await?,
                (None, None) => None,
            };
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        Ok(current.account_id == requester.id)
    }
}

/// Mentioned by the status, or the account it replies to.
fn is_mentioned(requester: &ShadowAccount, target: &ShadowStatus) -> bool {
    target.in_reply_to_account_id.as_deref() == Some(requester.id.as_str())
        || target.mentions.iter().any(|m| {
            m.target_account_id.as_deref() == Some(requester.id.as_str())
                || m.target_account_uri == requester.uri
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::visibility::StorageVisibility;
    use shadowfed::{Mention, PolicyPermission, PolicyRules};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        filter: InteractionFilter,
        author: ShadowAccount,
        other: ShadowAccount,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::default());
        let mut author = ShadowAccount::new("https://a.example/users/author", "author", "a.example");
        author.followers_uri = Some("https://a.example/users/author/followers".into());
        let other = ShadowAccount::new("https://b.example/users/other", "other", "b.example");
        storage.put_account(&author).await.unwrap();
        storage.put_account(&other).await.unwrap();
        let filter = InteractionFilter::new(
            storage.clone(),
            Arc::new(StorageVisibility::new(storage.clone())),
        );
        Fixture {
            storage,
            filter,
            author,
            other,
        }
    }

    #[tokio::test]
    async fn direct_forbids_followers() {
        let f = fixture().await;
        f.storage.add_follow(&f.other.id, &f.author.id).await.unwrap();
        let mut status = ShadowStatus::new("https://a.example/s/1", &f.author);
        status.visibility = Visibility::Direct;

        for t in [InteractionType::Like, InteractionType::Reply, InteractionType::Announce] {
            let r = f.filter.check(t, &f.other, &status).await.unwrap();
            assert!(r.is_forbidden(), "{t} should be forbidden");
        }
    }

    #[tokio::test]
    async fn direct_permits_mentioned() {
        let f = fixture().await;
        let mut status = ShadowStatus::new("https://a.example/s/1", &f.author);
        status.visibility = Visibility::Direct;
        status.mentions.push(Mention {
            name: None,
            target_account_uri: f.other.uri.clone(),
            target_account_id: Some(f.other.id.clone()),
        });
        let r = f
            .filter
            .check(InteractionType::Reply, &f.other, &status)
            .await
            .unwrap();
        assert_eq!(r, PolicyCheckResult::permitted(PolicyValue::Mentioned));
    }

    #[tokio::test]
    async fn always_beats_with_approval() {
        let f = fixture().await;
        let mut status = ShadowStatus::new("https://a.example/s/1", &f.author);
        let both = PolicyRules {
            always: vec![PolicyValue::Uri(f.other.uri.clone())],
            with_approval: vec![PolicyValue::Uri(f.other.uri.clone()), PolicyValue::Public],
        };
        status.interaction_policy = Some(InteractionPolicy {
            can_like: both.clone(),
            can_reply: both.clone(),
            can_announce: both,
        });
        let r = f
            .filter
            .check(InteractionType::Reply, &f.other, &status)
            .await
            .unwrap();
        assert_eq!(r.permission, PolicyPermission::Permitted);
        assert_eq!(r.matched_on, Some(PolicyValue::Uri(f.other.uri.clone())));
    }

    #[tokio::test]
    async fn with_approval_when_only_in_approval_set() {
        let f = fixture().await;
        let mut status = ShadowStatus::new("https://a.example/s/1", &f.author);
        let rules = PolicyRules {
            always: vec![PolicyValue::Author],
            with_approval: vec![PolicyValue::Public],
        };
        status.interaction_policy = Some(InteractionPolicy {
            can_like: rules.clone(),
            can_reply: rules.clone(),
            can_announce: rules,
        });
        let r = f
            .filter
            .check(InteractionType::Reply, &f.other, &status)
            .await
            .unwrap();
        assert!(r.with_approval_required());
    }

    #[tokio::test]
    async fn followers_collection_uri_acts_as_followers() {
        let f = fixture().await;
        f.storage.add_follow(&f.other.id, &f.author.id).await.unwrap();
        let mut status = ShadowStatus::new("https://a.example/s/1", &f.author);
        let rules = PolicyRules::always([PolicyValue::Uri(
            "https://a.example/users/author/followers".into(),
        )]);
        status.interaction_policy = Some(InteractionPolicy {
            can_like: rules.clone(),
            can_reply: rules.clone(),
            can_announce: rules,
        });
        let r = f
            .filter
            .check(InteractionType::Like, &f.other, &status)
            .await
            .unwrap();
        assert!(r.matched_on_collection());
    }

    #[tokio::test]
    async fn boost_wrapper_cannot_be_replied_to() {
        let f = fixture().await;
        let mut wrapper = ShadowStatus::new("https://a.example/s/boost", &f.author);
        wrapper.boost_of_uri = Some("https://c.example/s/9".into());
        let r = f
            .filter
            .check(InteractionType::Reply, &f.author, &wrapper)
            .await
            .unwrap();
        assert!(r.is_forbidden());
    }

    #[tokio::test]
    async fn reply_to_pending_needs_approval_unless_thread_starter() {
        let f = fixture().await;
        let root = ShadowStatus::new("https://a.example/s/root", &f.author);
        f.storage.put_status(&root).await.unwrap();
        let mut pending = ShadowStatus::new("https://b.example/s/reply", &f.other);
        pending.in_reply_to_uri = Some(root.uri.clone());
        pending.in_reply_to_id = Some(root.id.clone());
        pending.pending_approval = true;

        let r = f
            .filter
            .check(InteractionType::Reply, &f.other, &pending)
            .await
            .unwrap();
        assert!(r.with_approval_required());

        let r = f
            .filter
            .check(InteractionType::Reply, &f.author, &pending)
            .await
            .unwrap();
        assert!(r.is_permitted());
    }
}
