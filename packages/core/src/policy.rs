//! Interaction policies.
//!
//! Every status carries a policy, either explicitly or by default for its
//! [`Visibility`]. A policy holds one [`PolicyRules`] per [`InteractionType`];
//! each rule set names who is *always* permitted and who is permitted only
//! *with approval*.
//!
//! | Visibility | like / reply | announce |
//! |---|---|---|
//! | public, unlocked | public | public |
//! | followers-only, mutuals-only | author, followers, mentioned | author |
//! | direct | author, mentioned | author |
//!
//! Evaluation itself needs storage (follow relationships, mentions) and
//! lives in the engine crate. This module only holds the model.

use serde::{Deserialize, Serialize};

use crate::types::Visibility;

/// A symbolic audience or an explicit actor/collection URI.
///
/// Serialises as a bare string: the keywords `public`, `followers`,
/// `following`, `mentioned`, `author`, or anything else as a URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PolicyValue {
    Public,
    Followers,
    Following,
    Mentioned,
    Author,
    Uri(String),
}

impl PolicyValue {
    pub fn as_str(&self) -> &str {
        match self {
            PolicyValue::Public => "public",
            PolicyValue::Followers => "followers",
            PolicyValue::Following => "following",
            PolicyValue::Mentioned => "mentioned",
            PolicyValue::Author => "author",
            PolicyValue::Uri(u) => u,
        }
    }

    /// Matched through a followers/following collection membership test.
    pub fn is_collection(&self) -> bool {
        matches!(self, PolicyValue::Followers | PolicyValue::Following)
    }
}

impl From<String> for PolicyValue {
    fn from(s: String) -> Self {
        match s.as_str() {
            "public" => PolicyValue::Public,
            "followers" => PolicyValue::Followers,
            "following" => PolicyValue::Following,
            "mentioned" => PolicyValue::Mentioned,
            "author" => PolicyValue::Author,
            _ => PolicyValue::Uri(s),
        }
    }
}

impl From<&str> for PolicyValue {
    fn from(s: &str) -> Self {
        PolicyValue::from(s.to_string())
    }
}

impl From<PolicyValue> for String {
    fn from(v: PolicyValue) -> Self {
        match v {
            PolicyValue::Uri(u) => u,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may perform one kind of interaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyRules {
    #[serde(default)]
    pub always: Vec<PolicyValue>,
    #[serde(default)]
    pub with_approval: Vec<PolicyValue>,
}

impl PolicyRules {
    pub fn always(values: impl IntoIterator<Item = PolicyValue>) -> Self {
        Self {
            always: values.into_iter().collect(),
            with_approval: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Like,
    Reply,
    Announce,
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InteractionType::Like => "like",
            InteractionType::Reply => "reply",
            InteractionType::Announce => "announce",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionPolicy {
    pub can_like: PolicyRules,
    pub can_reply: PolicyRules,
    pub can_announce: PolicyRules,
}

impl InteractionPolicy {
    /// Default policy for a visibility level.
    pub fn default_for(visibility: Visibility) -> Self {
        use PolicyValue::*;
        match visibility {
            Visibility::Public | Visibility::Unlocked => Self {
                can_like: PolicyRules::always([Public]),
                can_reply: PolicyRules::always([Public]),
                can_announce: PolicyRules::always([Public]),
            },
            Visibility::FollowersOnly | Visibility::MutualsOnly => Self {
                can_like: PolicyRules::always([Author, Followers, Mentioned]),
                can_reply: PolicyRules::always([Author, Followers, Mentioned]),
                can_announce: PolicyRules::always([Author]),
            },
            Visibility::Direct => Self {
                can_like: PolicyRules::always([Author, Mentioned]),
                can_reply: PolicyRules::always([Author, Mentioned]),
                can_announce: PolicyRules::always([Author]),
            },
        }
    }

    pub fn rules_for(&self, interaction: InteractionType) -> &PolicyRules {
        match interaction {
            InteractionType::Like => &self.can_like,
            InteractionType::Reply => &self.can_reply,
            InteractionType::Announce => &self.can_announce,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyPermission {
    Forbidden,
    WithApproval,
    Permitted,
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCheckResult {
    pub permission: PolicyPermission,
    /// The value that produced the match. `None` for Forbidden and for
    /// outcomes decided before any rule was consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_on: Option<PolicyValue>,
}

impl PolicyCheckResult {
    pub fn forbidden() -> Self {
        Self {
            permission: PolicyPermission::Forbidden,
            matched_on: None,
        }
    }

    pub fn permitted(matched_on: PolicyValue) -> Self {
        Self {
            permission: PolicyPermission::Permitted,
            matched_on: Some(matched_on),
        }
    }

    pub fn with_approval(matched_on: Option<PolicyValue>) -> Self {
        Self {
            permission: PolicyPermission::WithApproval,
            matched_on,
        }
    }

    pub fn is_permitted(&self) -> bool {
        self.permission == PolicyPermission::Permitted
    }

    pub fn is_forbidden(&self) -> bool {
        self.permission == PolicyPermission::Forbidden
    }

    pub fn with_approval_required(&self) -> bool {
        self.permission == PolicyPermission::WithApproval
    }

    /// Permitted via followers/following membership.
    pub fn matched_on_collection(&self) -> bool {
        self.is_permitted() && self.matched_on.as_ref().is_some_and(PolicyValue::is_collection)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
