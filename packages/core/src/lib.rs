//! Local shadow model for remote federated objects.
//!
//! A *shadow record* is the persisted local mirror of something that lives
//! on another server: an actor, a post, a media file, a custom emoji, or
//! instance metadata. This crate holds those records and the interaction
//! policy model that gates replies, likes and boosts. It does no I/O; the
//! `shadowfed-deref` engine fetches, converts and stores these types.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | [`ShadowAccount`], [`ShadowStatus`], [`ShadowMediaAttachment`], [`ShadowEmoji`], [`ShadowInstance`], [`Visibility`] |
//! | [`policy`] | [`InteractionPolicy`], [`PolicyRules`], [`PolicyValue`], [`PolicyCheckResult`] and the per-visibility defaults |
//! | [`handle`] | `user@domain` parsing via [`Handle`] |
//! | [`validation`] | Sanity checks for remote-supplied identity fields |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use shadowfed::{Handle, InteractionPolicy, InteractionType, Visibility};
//!
//! let handle = Handle::parse("@alice@social.example")?;
//! let policy = InteractionPolicy::default_for(Visibility::FollowersOnly);
//! let rules = policy.rules_for(InteractionType::Reply);
//! ```

pub mod handle;
pub mod policy;
pub mod types;
pub mod validation;

pub use handle::{Handle, HandleError};
pub use policy::{
    InteractionPolicy, InteractionType, PolicyCheckResult, PolicyPermission, PolicyRules,
    PolicyValue,
};
pub use types::{
    new_id, ActorKind, MediaKind, Mention, ShadowAccount, ShadowEmoji, ShadowInstance,
    ShadowMediaAttachment, ShadowStatus, Visibility,
};
pub use validation::{
    normalize_domain, validate_account, validate_emoji, validate_http_uri, validate_shortcode,
    validate_username, ValidationError,
};
