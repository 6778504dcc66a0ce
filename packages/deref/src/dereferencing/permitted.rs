//! Reply and boost gating for freshly dereferenced statuses.
//!
//! | Target | Outcome | Effect |
//! |--------|---------|--------|
//! | remote, `approvedBy` set | approval valid | keep |
//! | remote, `approvedBy` set | approval invalid or unreachable | drop, delete any stored copy |
//! | any | Forbidden | drop, delete any stored copy |
//! | local | Permitted via followers/following | keep, `pending_approval` + `pre_approved` |
//! | local | WithApproval | keep, `pending_approval` |
//! | remote | WithApproval, or Permitted via followers/following | drop, delete any stored copy |
//! | any | other Permitted | keep |
//!
//! An approval is an `Accept` served from the target author's host, by the
//! target author, whose object is the interaction. Without one, a remote
//! author's consent or a remote collection's membership cannot be
//! confirmed from here.

use shadowfed::{InteractionType, PolicyCheckResult, ShadowAccount, ShadowStatus};
use shadowfed_wire::Vocab;

use super::{Dereferencer, Requester};
use crate::blocks::{authority, parse_remote_uri};
use crate::error::{Cause, DerefError, DerefResult, ErrorKind, ResultExt};

impl Dereferencer {
    /// Gate a reply against its parent, when the parent is stored locally.
    ///
    /// Adjusts the approval flags on `status` when it may be kept.
    pub(crate) async fn permit_reply(
        &self,
        req: &Requester,
        status: &mut ShadowStatus,
        author: &ShadowAccount,
    ) -> DerefResult<()> {
        let Some(parent_uri) = status.in_reply_to_uri.clone() else {
            return Ok(());
        };
        let parent = match &status.in_reply_to_id {
            Some(id) => self.storage.get_status_by_id(id).await,
            None => self.storage.get_status_by_uri(&parent_uri).await,
        }
        .context("permit_reply", &status.uri)?;
        let Some(parent) = parent else {
            return Ok(());
        };

        let result = self
            .interactions
            .check(InteractionType::Reply, author, &parent)
            .await
            .context("permit_reply", &status.uri)?;
        self.apply(req, InteractionType::Reply, &result, &parent, status)
            .await
    }

    /// Gate a boost wrapper against the boosted status.
    pub(crate) async fn permit_boost(
        &self,
        req: &Requester,
        wrapper: &mut ShadowStatus,
        booster: &ShadowAccount,
        target: &ShadowStatus,
    ) -> DerefResult<()> {
        let result = self
            .interactions
            .check(InteractionType::Announce, booster, target)
            .await
            .context("permit_boost", &wrapper.uri)?;
        self.apply(req, InteractionType::Announce, &result, target, wrapper)
            .await
    }

    async fn apply(
        &self,
        req: &Requester,
        interaction: InteractionType,
        result: &PolicyCheckResult,
        target: &ShadowStatus,
        status: &mut ShadowStatus,
    ) -> DerefResult<()> {
        if !target.local {
            if let Some(approval) = status.approved_by_uri.clone() {
                if !self.approval_holds(req, &approval, target, status).await? {
                    return Err(self.retract(interaction, status).await);
                }
                status.pending_approval = false;
                status.pre_approved = false;
                return Ok(());
            }
        }

        if result.is_forbidden() {
            return Err(self.retract(interaction, status).await);
        }

        if target.local {
            if result.matched_on_collection() {
                status.pending_approval = true;
                status.pre_approved = true;
            } else if result.with_approval_required() {
                status.pending_approval = true;
                status.pre_approved = false;
            } else {
                status.pending_approval = false;
                status.pre_approved = false;
            }
            return Ok(());
        }

        if result.with_approval_required() || result.matched_on_collection() {
            tracing::debug!(
                "permit: {interaction} {} needs approval from remote {}",
                status.uri,
                target.uri
            );
            return Err(self.retract(interaction, status).await);
        }
        Ok(())
    }

    /// Fetch the approval at `approval_uri` and check that the author of
    /// `target` accepted `status`. Only cancellation is an error; anything
    /// wrong with the approval itself is `false`.
    async fn approval_holds(
        &self,
        req: &Requester,
        approval_uri: &str,
        target: &ShadowStatus,
        status: &ShadowStatus,
    ) -> DerefResult<bool> {
        match self.gate.check_uri(approval_uri).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Database => return Err(e),
            Err(e) => {
                tracing::info!("permit: approval {approval_uri} for {} refused: {e}", status.uri);
                return Ok(false);
            }
        }
        let resp = match self.fetch_document(req, approval_uri).await {
            Ok(resp) => resp,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::info!("permit: approval {approval_uri} for {} unusable: {e}", status.uri);
                return Ok(false);
            }
        };
        let accept = match Vocab::decode(&resp.body) {
            Ok(Vocab::Accept(accept)) => accept,
            Ok(other) => {
                tracing::info!("permit: approval {approval_uri} is a {}", other.type_name());
                return Ok(false);
            }
            Err(e) => {
                tracing::info!("permit: approval {approval_uri} undecodable: {e}");
                return Ok(false);
            }
        };

        if resp.final_uri != approval_uri && accept.id != resp.final_uri {
            tracing::info!(
                "permit: approval served from {} declares id {}",
                resp.final_uri,
                accept.id
            );
            return Ok(false);
        }
        let Ok(accept_url) = parse_remote_uri(&accept.id) else {
            return Ok(false);
        };

        let Some(actor) = accept.actor() else {
            tracing::info!("permit: approval {approval_uri} has no actor");
            return Ok(false);
        };
        let actor_host = parse_remote_uri(actor).map(|u| authority(&u)).ok();
        if actor_host.as_deref() != Some(authority(&accept_url).as_str()) {
            tracing::info!("permit: approval {approval_uri} actor {actor} is on another host");
            return Ok(false);
        }
        if actor != target.account_uri {
            tracing::info!(
                "permit: approval {approval_uri} by {actor}, expected {}",
                target.account_uri
            );
            return Ok(false);
        }
        if accept.object() != Some(status.uri.as_str()) {
            tracing::info!("permit: approval {approval_uri} does not accept {}", status.uri);
            return Ok(false);
        }
        if accept.target().is_some_and(|t| t != target.uri) {
            tracing::info!("permit: approval {approval_uri} targets another status");
            return Ok(false);
        }
        Ok(true)
    }

    /// Delete any stored copy of `status` and build the refusal.
    async fn retract(&self, interaction: InteractionType, status: &ShadowStatus) -> DerefError {
        let refusal = DerefError::new(Cause::PolicyForbidden {
            interaction: interaction.to_string(),
        })
        .context("permit", &status.uri);

        match self.storage.get_status_by_uri(&status.uri).await {
            Ok(Some(stored)) => {
                if let Err(e) = self.storage.delete_status(&stored.id).await {
                    return DerefError::new(e).context("retract", &status.uri);
                }
                tracing::info!("permit: retracted stored {interaction} {}", status.uri);
            }
            Ok(None) => {
                tracing::info!("permit: dropped {interaction} {}", status.uri);
            }
            Err(e) => return DerefError::new(e).context("retract", &status.uri),
        }
        refusal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dereferencing::testing::{harness, Harness};
    use crate::storage::Storage;
    use serde_json::json;
    use shadowfed::{InteractionPolicy, PolicyRules, PolicyValue, Visibility};

    const APPROVAL: &str = "https://b.example/accepts/1";

    fn accounts() -> (ShadowAccount, ShadowAccount) {
        let mut owner = ShadowAccount::new("https://local.example/users/owner", "owner", "local.example");
        owner.followers_uri = Some("https://local.example/users/owner/followers".into());
        let replier = ShadowAccount::new("https://a.example/users/r", "r", "a.example");
        (owner, replier)
    }

    fn reply_to(parent: &ShadowStatus, author: &ShadowAccount) -> ShadowStatus {
        let mut s = ShadowStatus::new("https://a.example/s/reply", author);
        s.in_reply_to_uri = Some(parent.uri.clone());
        s
    }

    #[tokio::test]
    async fn follower_reply_to_local_is_pre_approved() {
        let h = harness();
        let (owner, replier) = accounts();
        h.storage.put_account(&owner).await.unwrap();
        h.storage.put_account(&replier).await.unwrap();
        h.storage.add_follow(&replier.id, &owner.id).await.unwrap();

        let mut parent = ShadowStatus::new("https://local.example/s/1", &owner);
        parent.local = true;
        parent.visibility = Visibility::FollowersOnly;
        h.storage.put_status(&parent).await.unwrap();

        let mut reply = reply_to(&parent, &replier);
        h.deref.permit_reply(&Requester::new("alice"), &mut reply, &replier).await.unwrap();
        assert!(reply.pending_approval);
        assert!(reply.pre_approved);
    }

    #[tokio::test]
    async fn forbidden_reply_is_deleted() {
        let h = harness();
        let (mut owner, replier) = accounts();
        owner.uri = "https://b.example/users/owner".into();
        h.storage.put_account(&owner).await.unwrap();
        h.storage.put_account(&replier).await.unwrap();

        let mut parent = ShadowStatus::new("https://b.example/s/1", &owner);
        parent.visibility = Visibility::Direct;
        h.storage.put_status(&parent).await.unwrap();

        let mut reply = reply_to(&parent, &replier);
        h.storage.put_status(&reply).await.unwrap();

        let err = h.deref.permit_reply(&Requester::new("alice"), &mut reply, &replier).await.unwrap_err();
        assert!(matches!(err.cause(), Cause::PolicyForbidden { .. }));
        assert!(h.storage.get_status_by_uri(&reply.uri).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approval_on_remote_target_drops() {
        let h = harness();
        let (mut owner, replier) = accounts();
        owner.uri = "https://b.example/users/owner".into();
        h.storage.put_account(&owner).await.unwrap();
        h.storage.put_account(&replier).await.unwrap();

        let mut parent = ShadowStatus::new("https://b.example/s/1", &owner);
        let mut policy = InteractionPolicy::default_for(Visibility::Public);
        policy.can_reply = PolicyRules {
            always: vec![PolicyValue::Author],
            with_approval: vec![PolicyValue::Public],
        };
        parent.interaction_policy = Some(policy);
        h.storage.put_status(&parent).await.unwrap();

        let mut reply = reply_to(&parent, &replier);
        assert!(h.deref.permit_reply(&Requester::new("alice"), &mut reply, &replier).await.is_err());
    }

    #[tokio::test]
    async fn unknown_parent_is_not_checked() {
        let h = harness();
        let (_, replier) = accounts();
        let mut reply = ShadowStatus::new("https://a.example/s/reply", &replier);
        reply.in_reply_to_uri = Some("https://c.example/s/unknown".into());
        h.deref.permit_reply(&Requester::new("alice"), &mut reply, &replier).await.unwrap();
        assert!(!reply.pending_approval);
    }

    /// A remote parent whose replies need the author's approval, and a
    /// stored reply to it claiming approval at [`APPROVAL`].
    async fn approval_needed(h: &Harness) -> (ShadowStatus, ShadowStatus, ShadowAccount) {
        let (mut owner, replier) = accounts();
        owner.uri = "https://b.example/users/owner".into();
        h.storage.put_account(&owner).await.unwrap();
        h.storage.put_account(&replier).await.unwrap();

        let mut parent = ShadowStatus::new("https://b.example/s/1", &owner);
        let mut policy = InteractionPolicy::default_for(Visibility::Public);
        policy.can_reply = PolicyRules {
            always: vec![PolicyValue::Author],
            with_approval: vec![PolicyValue::Public],
        };
        parent.interaction_policy = Some(policy);
        h.storage.put_status(&parent).await.unwrap();

        let mut reply = reply_to(&parent, &replier);
        reply.approved_by_uri = Some(APPROVAL.into());
        h.storage.put_status(&reply).await.unwrap();
        (parent, reply, replier)
    }

    fn accept(actor: &str, object: &str, target: &str) -> serde_json::Value {
        json!({
            "type": "Accept",
            "id": APPROVAL,
            "actor": actor,
            "object": object,
            "target": target
        })
    }

    #[tokio::test]
    async fn valid_remote_approval_keeps_reply() {
        let h = harness();
        let (parent, mut reply, replier) = approval_needed(&h).await;
        h.transport
            .doc(APPROVAL, accept(&parent.account_uri, &reply.uri, &parent.uri));

        h.deref
            .permit_reply(&Requester::new("alice"), &mut reply, &replier)
            .await
            .unwrap();
        assert!(!reply.pending_approval);
        assert!(h.storage.get_status_by_uri(&reply.uri).await.unwrap().is_some());
        assert_eq!(h.transport.calls(), vec![APPROVAL.to_string()]);
    }

    #[tokio::test]
    async fn approval_from_another_account_drops() {
        let h = harness();
        let (parent, mut reply, replier) = approval_needed(&h).await;
        h.transport.doc(
            APPROVAL,
            accept("https://b.example/users/mallory", &reply.uri, &parent.uri),
        );

        let err = h
            .deref
            .permit_reply(&Requester::new("alice"), &mut reply, &replier)
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), Cause::PolicyForbidden { .. }));
        assert!(h.storage.get_status_by_uri(&reply.uri).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approval_of_another_interaction_drops() {
        let h = harness();
        let (parent, mut reply, replier) = approval_needed(&h).await;
        h.transport.doc(
            APPROVAL,
            accept(&parent.account_uri, "https://a.example/s/other", &parent.uri),
        );

        let err = h
            .deref
            .permit_reply(&Requester::new("alice"), &mut reply, &replier)
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), Cause::PolicyForbidden { .. }));
    }

    #[tokio::test]
    async fn approval_that_is_not_an_accept_drops() {
        let h = harness();
        let (parent, mut reply, replier) = approval_needed(&h).await;
        h.transport.doc(
            APPROVAL,
            json!({"type": "Note", "id": APPROVAL, "attributedTo": parent.account_uri}),
        );

        assert!(h
            .deref
            .permit_reply(&Requester::new("alice"), &mut reply, &replier)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn approval_on_blocked_host_is_not_fetched() {
        let h = harness();
        let (parent, mut reply, replier) = approval_needed(&h).await;
        reply.approved_by_uri = Some("https://evil.example/accepts/1".into());
        h.storage.add_domain_block("evil.example").await.unwrap();
        h.transport.doc(
            "https://evil.example/accepts/1",
            accept(&parent.account_uri, &reply.uri, &parent.uri),
        );

        assert!(h
            .deref
            .permit_reply(&Requester::new("alice"), &mut reply, &replier)
            .await
            .is_err());
        assert!(h.transport.calls().is_empty());
    }
}
