use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::InteractionPolicy;

/// Generate a fresh record identifier.
///
/// Identifiers are UUIDv7 strings, so they sort by creation time.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Controls who may see a status.
///
/// Serialises as a snake_case string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Addressed to the public collection and shown on public timelines.
    #[default]
    Public,
    /// Public addressing in `cc` only: visible to anyone, not timeline-listed.
    Unlocked,
    /// Addressed to the author's followers collection.
    FollowersOnly,
    /// Visible to accounts that follow the author and are followed back.
    MutualsOnly,
    /// Addressed only to mentioned accounts.
    Direct,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Unlocked => "unlocked",
            Visibility::FollowersOnly => "followers_only",
            Visibility::MutualsOnly => "mutuals_only",
            Visibility::Direct => "direct",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "unlocked" => Ok(Visibility::Unlocked),
            "followers_only" => Ok(Visibility::FollowersOnly),
            "mutuals_only" => Ok(Visibility::MutualsOnly),
            "direct" => Ok(Visibility::Direct),
            _ => Err(format!(
                "unknown visibility {s:?}; expected one of: public, unlocked, \
                 followers_only, mutuals_only, direct"
            )),
        }
    }
}

/// The ActivityStreams actor type a remote account declared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ActorKind {
    #[default]
    Person,
    Service,
    Application,
    Group,
    Organization,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Person => "Person",
            ActorKind::Service => "Service",
            ActorKind::Application => "Application",
            ActorKind::Group => "Group",
            ActorKind::Organization => "Organization",
        }
    }

    /// Map a vocabulary type tag onto an actor kind, if it is one.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            "Person" => Some(ActorKind::Person),
            "Service" => Some(ActorKind::Service),
            "Application" => Some(ActorKind::Application),
            "Group" => Some(ActorKind::Group),
            "Organization" => Some(ActorKind::Organization),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// The local, persisted mirror of a remote actor.
///
/// `uri` is the primary identity and never changes once stored. The pair
/// (`username`, `domain`) is unique as well. A record with `fetched_at ==
/// None` is a placeholder: it was created from a reference (a mention, say)
/// and has never been dereferenced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShadowAccount {
    pub id: String,
    pub uri: String,
    /// Human-facing profile page, when the actor publishes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub username: String,
    /// Account domain. Usually the URI host, but webfinger may name another.
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub actor_kind: ActorKind,
    /// Follow requests need manual approval.
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub discoverable: bool,

    /// PEM-encoded public key. `None` until a key has been accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_uri: Option<String>,
    /// Set when the key has been observed to be invalid and must be replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_media_id: Option<String>,
    #[serde(default)]
    pub emoji_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last successful dereference. `None` marks a placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ShadowAccount {
    /// A bare record with only identity fields set.
    pub fn new(
        uri: impl Into<String>,
        username: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            uri: uri.into(),
            url: None,
            username: username.into(),
            domain: domain.into(),
            display_name: None,
            note: None,
            actor_kind: ActorKind::Person,
            locked: false,
            discoverable: false,
            public_key: None,
            public_key_uri: None,
            public_key_expires_at: None,
            inbox_uri: None,
            shared_inbox_uri: None,
            outbox_uri: None,
            followers_uri: None,
            following_uri: None,
            featured_uri: None,
            avatar_remote_url: None,
            avatar_media_id: None,
            header_remote_url: None,
            header_media_id: None,
            emoji_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            fetched_at: None,
        }
    }

    /// A placeholder for an account known only by reference.
    ///
    /// Carries no key and no `fetched_at`, so the first real dereference is
    /// free to fill in anything.
    pub fn placeholder(
        uri: impl Into<String>,
        username: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self::new(uri, username, domain)
    }

    pub fn is_placeholder(&self) -> bool {
        self.fetched_at.is_none()
    }

    /// The stored key has been marked expired at or before `now`.
    pub fn key_expired(&self, now: DateTime<Utc>) -> bool {
        self.public_key_expires_at.is_some_and(|at| at <= now)
    }

    /// `username@domain`.
    pub fn handle(&self) -> String {
        format!("{}@{}", self.username, self.domain)
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// One account mentioned in a status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mention {
    /// `@user@domain` as written in the tag, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub target_account_uri: String,
    /// Local account id, once the target has been resolved or placeheld.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_account_id: Option<String>,
}

/// The local mirror of a remote post.
///
/// `uri` is immutable identity. Refreshes merge fields into the existing
/// record rather than replacing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShadowStatus {
    pub id: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub account_id: String,
    pub account_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_account_id: Option<String>,

    /// Set on boost wrappers: the status being reposted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost_of_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost_of_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost_of_account_id: Option<String>,

    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_warning: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default)]
    pub attachment_ids: Vec<String>,
    #[serde(default)]
    pub emoji_ids: Vec<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,

    /// Explicit policy. `None` means the default for `visibility`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_policy: Option<InteractionPolicy>,

    /// Replies collection, kept so thread descent can resume from storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies_uri: Option<String>,

    /// The target owner's approval of this interaction, as claimed by
    /// its author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by_uri: Option<String>,
    /// Interaction awaiting the target owner's approval.
    #[serde(default)]
    pub pending_approval: bool,
    /// Approval was implied by a followers/following match.
    #[serde(default)]
    pub pre_approved: bool,
    /// Authored on this server.
    #[serde(default)]
    pub local: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ShadowStatus {
    pub fn new(uri: impl Into<String>, author: &ShadowAccount) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            uri: uri.into(),
            url: None,
            account_id: author.id.clone(),
            account_uri: author.uri.clone(),
            in_reply_to_uri: None,
            in_reply_to_id: None,
            in_reply_to_account_id: None,
            boost_of_uri: None,
            boost_of_id: None,
            boost_of_account_id: None,
            content: String::new(),
            content_warning: None,
            sensitive: false,
            visibility: Visibility::Public,
            attachment_ids: Vec::new(),
            emoji_ids: Vec::new(),
            mentions: Vec::new(),
            interaction_policy: None,
            replies_uri: None,
            approved_by_uri: None,
            pending_approval: false,
            pre_approved: false,
            local: false,
            created_at: now,
            updated_at: now,
            edited_at: None,
            fetched_at: None,
        }
    }

    /// A boost wrapper carries no content of its own.
    pub fn is_boost(&self) -> bool {
        self.boost_of_uri.is_some()
    }

    pub fn mentions_account(&self, account_id: &str) -> bool {
        self.mentions
            .iter()
            .any(|m| m.target_account_id.as_deref() == Some(account_id))
    }

    /// The policy in force: the explicit one, else the visibility default.
    pub fn effective_policy(&self) -> InteractionPolicy {
        self.interaction_policy
            .clone()
            .unwrap_or_else(|| InteractionPolicy::default_for(self.visibility))
    }
}

// ---------------------------------------------------------------------------
// Media and emoji
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Gifv,
    Video,
    Audio,
    #[default]
    Unknown,
}

impl MediaKind {
    /// Guess from a MIME type such as `image/png`.
    pub fn from_content_type(content_type: &str) -> Self {
        let major = content_type.split('/').next().unwrap_or_default();
        match major {
            "image" if content_type == "image/gif" => MediaKind::Gifv,
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            _ => MediaKind::Unknown,
        }
    }
}

/// Local mirror of a remote attachment, avatar, or header.
///
/// Identity is (`account_id`, `remote_url`). `cached` tracks whether the
/// bytes are on local disk, independently of whether metadata is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShadowMediaAttachment {
    pub id: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    pub remote_url: String,
    #[serde(default)]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blurhash: Option<String>,
    #[serde(default)]
    pub avatar: bool,
    #[serde(default)]
    pub header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub cached: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShadowMediaAttachment {
    pub fn new(account_id: impl Into<String>, remote_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            account_id: account_id.into(),
            status_id: None,
            remote_url: remote_url.into(),
            kind: MediaKind::Unknown,
            content_type: None,
            description: None,
            blurhash: None,
            avatar: false,
            header: false,
            file_path: None,
            file_size: 0,
            cached: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Local mirror of a remote custom emoji. Identity is (`shortcode`, `domain`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShadowEmoji {
    pub id: String,
    pub shortcode: String,
    pub domain: String,
    pub uri: String,
    pub image_remote_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_static_remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub cached: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShadowEmoji {
    pub fn new(
        shortcode: impl Into<String>,
        domain: impl Into<String>,
        uri: impl Into<String>,
        image_remote_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            shortcode: shortcode.into(),
            domain: domain.into(),
            uri: uri.into(),
            image_remote_url: image_remote_url.into(),
            image_static_remote_url: None,
            content_type: None,
            file_path: None,
            file_size: 0,
            cached: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// `shortcode@domain`, the single-flight key for this emoji.
    pub fn key(&self) -> String {
        format!("{}@{}", self.shortcode, self.domain)
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// Best-effort metadata about a remote server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShadowInstance {
    pub domain: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_account_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrations_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_count: Option<u64>,
}

impl ShadowInstance {
    /// Only domain and URI known.
    pub fn minimal(domain: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            uri: uri.into(),
            ..Default::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
