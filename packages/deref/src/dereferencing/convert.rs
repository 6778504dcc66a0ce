//! Wire documents to shadow records.
//!
//! Conversions merge into an existing record when there is one: identity
//! (`id`, `uri`, `created_at`) is kept and fields the remote no longer
//! sends are cleared.

use chrono::Utc;
use shadowfed::{
    InteractionPolicy, InteractionType, Mention, PolicyRules, PolicyValue, ShadowAccount,
    ShadowEmoji, ShadowStatus, Visibility,
};
use shadowfed_wire::vocab::WirePolicyRules;
use shadowfed_wire::{is_public_iri, Accountable, EmojiObject, Statusable, WireInteractionPolicy};

use crate::error::Cause;

pub(super) fn account_from_actor(
    doc: &impl Accountable,
    domain: &str,
    existing: Option<&ShadowAccount>,
) -> Result<ShadowAccount, Cause> {
    let username = doc
        .preferred_username()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Cause::Invalid(format!("actor {} has no preferredUsername", doc.id())))?;

    let mut account = match existing {
        Some(e) => e.clone(),
        None => ShadowAccount::new(doc.id(), username, domain),
    };
    account.username = username.to_string();
    account.domain = domain.to_ascii_lowercase();
    account.url = doc.profile_url().map(str::to_string);
    account.display_name = doc.display_name().map(str::to_string);
    account.note = doc.note().map(str::to_string);
    account.actor_kind = doc.kind();
    account.locked = doc.locked();
    account.discoverable = doc.discoverable();

    account.public_key = doc.public_key().map(|k| k.public_key_pem.clone());
    account.public_key_uri = doc.public_key().map(|k| k.id.clone());

    account.inbox_uri = doc.inbox().map(str::to_string);
    account.shared_inbox_uri = doc.shared_inbox().map(str::to_string);
    account.outbox_uri = doc.outbox().map(str::to_string);
    account.followers_uri = doc.followers().map(str::to_string);
    account.following_uri = doc.following().map(str::to_string);
    account.featured_uri = doc.featured().map(str::to_string);

    let avatar = doc.avatar().and_then(|i| i.url()).map(str::to_string);
    if avatar != account.avatar_remote_url {
        account.avatar_media_id = None;
    }
    account.avatar_remote_url = avatar;

    let header = doc.header().and_then(|i| i.url()).map(str::to_string);
    if header != account.header_remote_url {
        account.header_media_id = None;
    }
    account.header_remote_url = header;

    account.updated_at = Utc::now();
    Ok(account)
}

/// Visibility from addressing.
pub(super) fn visibility_of(status: &impl Statusable, author: &ShadowAccount) -> Visibility {
    let to = status.to();
    let cc = status.cc();
    if to.iter().any(|a| is_public_iri(a)) {
        return Visibility::Public;
    }
    if cc.iter().any(|a| is_public_iri(a)) {
        return Visibility::Unlocked;
    }
    if let Some(followers) = author.followers_uri.as_deref() {
        if to.iter().chain(cc.iter()).any(|a| *a == followers) {
            return Visibility::FollowersOnly;
        }
    }
    Visibility::Direct
}

fn policy_value(iri: &str, author: &ShadowAccount) -> PolicyValue {
    if is_public_iri(iri) {
        PolicyValue::Public
    } else if iri == author.uri {
        PolicyValue::Author
    } else if author.followers_uri.as_deref() == Some(iri) {
        PolicyValue::Followers
    } else if author.following_uri.as_deref() == Some(iri) {
        PolicyValue::Following
    } else {
        PolicyValue::from(iri)
    }
}

fn rules_from_wire(
    wire: Option<&WirePolicyRules>,
    fallback: &PolicyRules,
    author: &ShadowAccount,
) -> PolicyRules {
    let Some(wire) = wire else {
        return fallback.clone();
    };
    let convert = |v: &Option<shadowfed_wire::vocab::OneOrMany<String>>| -> Vec<PolicyValue> {
        v.iter()
            .flat_map(|m| m.iter())
            .map(|iri| policy_value(iri, author))
            .collect()
    };
    PolicyRules {
        always: convert(&wire.automatic_approval),
        with_approval: convert(&wire.manual_approval),
    }
}

/// An explicit policy. Interaction types the remote leaves out get the
/// visibility default.
pub(super) fn policy_from_wire(
    wire: &WireInteractionPolicy,
    visibility: Visibility,
    author: &ShadowAccount,
) -> InteractionPolicy {
    let defaults = InteractionPolicy::default_for(visibility);
    InteractionPolicy {
        can_like: rules_from_wire(
            wire.can_like.as_ref(),
            defaults.rules_for(InteractionType::Like),
            author,
        ),
        can_reply: rules_from_wire(
            wire.can_reply.as_ref(),
            defaults.rules_for(InteractionType::Reply),
            author,
        ),
        can_announce: rules_from_wire(
            wire.can_announce.as_ref(),
            defaults.rules_for(InteractionType::Announce),
            author,
        ),
    }
}

/// Convert a status document, merging into `existing`.
///
/// Linked ids (attachments, emoji, reply target) are left for enrichment.
pub(super) fn status_from_object(
    obj: &impl Statusable,
    author: &ShadowAccount,
    existing: Option<&ShadowStatus>,
) -> ShadowStatus {
    let now = Utc::now();
    let mut status = match existing {
        Some(e) => e.clone(),
        None => {
            let mut s = ShadowStatus::new(obj.id(), author);
            s.created_at = obj.published().unwrap_or(now);
            s
        }
    };

    status.account_id = author.id.clone();
    status.account_uri = author.uri.clone();
    status.url = obj.url().map(str::to_string);
    status.content = obj.content().unwrap_or_default().to_string();
    status.content_warning = obj.content_warning().map(str::to_string);
    status.sensitive = obj.sensitive();
    let visibility = visibility_of(obj, author);
    status.visibility = visibility;
    status.interaction_policy = obj
        .interaction_policy()
        .map(|p| policy_from_wire(p, visibility, author));
    status.replies_uri = obj.replies().and_then(|r| r.iri()).map(str::to_string);
    status.approved_by_uri = obj.approved_by().map(str::to_string);

    let in_reply_to = obj.in_reply_to().map(str::to_string);
    if in_reply_to != status.in_reply_to_uri {
        status.in_reply_to_id = None;
        status.in_reply_to_account_id = None;
    }
    status.in_reply_to_uri = in_reply_to;

    let previous = std::mem::take(&mut status.mentions);
    status.mentions = obj
        .mentions()
        .into_iter()
        .map(|(href, name)| Mention {
            name: name.map(str::to_string),
            target_account_uri: href.to_string(),
            target_account_id: previous
                .iter()
                .find(|m| m.target_account_uri == href)
                .and_then(|m| m.target_account_id.clone()),
        })
        .collect();

    if let (Some(updated), Some(published)) = (obj.updated(), obj.published()) {
        if updated > published {
            status.edited_at = Some(updated);
        }
    }
    status.updated_at = now;
    status
}

/// A bare emoji record from a tag, or `None` when the tag is unusable.
pub(super) fn emoji_from_tag(tag: &EmojiObject, fallback_domain: &str) -> Option<ShadowEmoji> {
    let shortcode = tag.shortcode();
    let image = tag.icon.as_ref()?.url()?;
    let uri = tag.id.as_deref().unwrap_or(image);
    let domain = reqwest::Url::parse(uri)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| fallback_domain.to_ascii_lowercase());
    if shortcode.is_empty() {
        return None;
    }
    let mut emoji = ShadowEmoji::new(shortcode, domain, uri, image);
    emoji.content_type = tag.icon.as_ref().and_then(|i| i.media_type.clone());
    Some(emoji)
}
