//! The slice of the ActivityStreams vocabulary the resolver understands.
//!
//! Remote documents are decoded into [`Vocab`], a closed enum keyed by the
//! document's `type` tag. Anything else is rejected with
//! [`VocabError::UnsupportedType`]; nothing is coerced.
//!
//! | `type` | Variant |
//! |---|---|
//! | Person, Service, Application, Group, Organization | [`Vocab::Actor`] |
//! | Note, Article, Page, Question, Event, Document, Image, Video, Audio | [`Vocab::Status`] |
//! | Announce | [`Vocab::Announce`] |
//! | Accept | [`Vocab::Accept`] |
//! | Collection, OrderedCollection, CollectionPage, OrderedCollectionPage | [`Vocab::Collection`] |
//! | Emoji | [`Vocab::Emoji`] |
//! | Tombstone | [`Vocab::Tombstone`] |
//!
//! Properties that ActivityStreams lets servers send either as an IRI or as
//! an embedded object, or as one value or an array, are modelled with
//! [`OneOrMany`], [`Reference`] and [`IriOrObject`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shadowfed::ActorKind;
use thiserror::Error;

/// The special collection meaning "everyone".
pub const PUBLIC_IRI: &str = "https://www.w3.org/ns/activitystreams#Public";

/// True for the full public IRI and its compacted spellings.
pub fn is_public_iri(iri: &str) -> bool {
    matches!(iri, PUBLIC_IRI | "as:Public" | "Public")
}

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document has no type")]
    MissingType,

    #[error("unsupported type {0:?}")]
    UnsupportedType(String),

    #[error("invalid {kind} document: {source}")]
    Invalid {
        kind: String,
        source: serde_json::Error,
    },

    #[error("expected {expected}, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: String,
    },
}

// ---------------------------------------------------------------------------
// Property shapes
// ---------------------------------------------------------------------------

/// A property that may be a single value or an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(v) => std::slice::from_ref(v).iter(),
            OneOrMany::Many(v) => v.iter(),
        }
    }

    pub fn first(&self) -> Option<&T> {
        self.iter().next()
    }
}

/// An object reference: a bare IRI or an embedded object with an `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Reference {
    Iri(String),
    Object { id: String },
}

impl Reference {
    pub fn id(&self) -> &str {
        match self {
            Reference::Iri(s) => s,
            Reference::Object { id } => id,
        }
    }
}

/// First id of an optional reference property.
pub fn first_id(prop: &Option<OneOrMany<Reference>>) -> Option<&str> {
    prop.as_ref().and_then(|p| p.first()).map(Reference::id)
}

/// All ids of an optional reference property.
pub fn all_ids(prop: &Option<OneOrMany<Reference>>) -> Vec<&str> {
    prop.iter().flat_map(|p| p.iter()).map(Reference::id).collect()
}

/// `url` values: a string or a Link object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UrlProperty {
    Iri(String),
    Link {
        href: String,
        #[serde(rename = "mediaType", default)]
        media_type: Option<String>,
    },
}

impl UrlProperty {
    pub fn href(&self) -> &str {
        match self {
            UrlProperty::Iri(s) => s,
            UrlProperty::Link { href, .. } => href,
        }
    }
}

fn first_url(prop: &Option<OneOrMany<UrlProperty>>) -> Option<&str> {
    prop.as_ref().and_then(|p| p.first()).map(UrlProperty::href)
}

/// A value that is either an IRI to dereference or the embedded object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IriOrObject<T> {
    Iri(String),
    Object(Box<T>),
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub public_key_pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default)]
    pub shared_inbox: Option<String>,
}

/// An image such as an avatar, header, or emoji icon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageObject {
    #[serde(default)]
    pub url: Option<OneOrMany<UrlProperty>>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub blurhash: Option<String>,
}

impl ImageObject {
    pub fn url(&self) -> Option<&str> {
        first_url(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<OneOrMany<UrlProperty>>,
    #[serde(default)]
    pub inbox: Option<String>,
    #[serde(default)]
    pub outbox: Option<String>,
    #[serde(default)]
    pub followers: Option<String>,
    #[serde(default)]
    pub following: Option<String>,
    #[serde(default)]
    pub featured: Option<String>,
    #[serde(default)]
    pub endpoints: Option<Endpoints>,
    #[serde(default)]
    pub public_key: Option<PublicKey>,
    #[serde(default)]
    pub icon: Option<OneOrMany<ImageObject>>,
    #[serde(default)]
    pub image: Option<OneOrMany<ImageObject>>,
    #[serde(default)]
    pub manually_approves_followers: Option<bool>,
    #[serde(default)]
    pub discoverable: Option<bool>,
    #[serde(default)]
    pub tag: Option<OneOrMany<Tag>>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Note,
    Article,
    Page,
    Question,
    Event,
    Document,
    Image,
    Video,
    Audio,
}

impl StatusKind {
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Note" => StatusKind::Note,
            "Article" => StatusKind::Article,
            "Page" => StatusKind::Page,
            "Question" => StatusKind::Question,
            "Event" => StatusKind::Event,
            "Document" => StatusKind::Document,
            "Image" => StatusKind::Image,
            "Video" => StatusKind::Video,
            "Audio" => StatusKind::Audio,
            _ => return None,
        })
    }
}

/// A media attachment on a status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<OneOrMany<UrlProperty>>,
    #[serde(default)]
    pub media_type: Option<String>,
    /// Alt text.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub blurhash: Option<String>,
}

impl Attachment {
    pub fn url(&self) -> Option<&str> {
        first_url(&self.url)
    }
}

/// A custom emoji, standalone or embedded as a tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmojiObject {
    #[serde(default)]
    pub id: Option<String>,
    /// `:shortcode:`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<ImageObject>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl EmojiObject {
    /// `name` without surrounding colons.
    pub fn shortcode(&self) -> &str {
        self.name.trim().trim_matches(':')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Tag {
    Mention {
        #[serde(default)]
        href: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    Hashtag {
        #[serde(default)]
        href: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    Emoji(EmojiObject),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WirePolicyRules {
    #[serde(default, alias = "always")]
    pub automatic_approval: Option<OneOrMany<String>>,
    #[serde(default, alias = "approvalRequired")]
    pub manual_approval: Option<OneOrMany<String>>,
}

/// `interactionPolicy` as published by servers that support it.
///
/// Values are IRIs: the public collection, the author's own URI, the
/// author's followers/following collections, or other actors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireInteractionPolicy {
    #[serde(default)]
    pub can_like: Option<WirePolicyRules>,
    #[serde(default)]
    pub can_reply: Option<WirePolicyRules>,
    #[serde(default)]
    pub can_announce: Option<WirePolicyRules>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusObject {
    pub id: String,
    #[serde(default)]
    pub attributed_to: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub in_reply_to: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub sensitive: Option<bool>,
    #[serde(default)]
    pub url: Option<OneOrMany<UrlProperty>>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub cc: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub attachment: Option<OneOrMany<Attachment>>,
    #[serde(default)]
    pub tag: Option<OneOrMany<Tag>>,
    #[serde(default)]
    pub replies: Option<IriOrObject<Collection>>,
    #[serde(default)]
    pub interaction_policy: Option<WireInteractionPolicy>,
    /// Where the interacted-with author's approval can be fetched.
    #[serde(default)]
    pub approved_by: Option<String>,
}

/// A boost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Announce {
    pub id: String,
    #[serde(default)]
    pub actor: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub object: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub cc: Option<OneOrMany<Reference>>,
}

/// An approval of someone else's interaction: `actor` accepts `object`,
/// optionally naming the interacted-with status as `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Accept {
    pub id: String,
    #[serde(default)]
    pub actor: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub object: Option<OneOrMany<Reference>>,
    #[serde(default)]
    pub target: Option<OneOrMany<Reference>>,
}

impl Accept {
    pub fn actor(&self) -> Option<&str> {
        first_id(&self.actor)
    }
    pub fn object(&self) -> Option<&str> {
        first_id(&self.object)
    }
    pub fn target(&self) -> Option<&str> {
        first_id(&self.target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub former_type: Option<String>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Collection,
    OrderedCollection,
    CollectionPage,
    OrderedCollectionPage,
}

impl CollectionKind {
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Collection" => CollectionKind::Collection,
            "OrderedCollection" => CollectionKind::OrderedCollection,
            "CollectionPage" => CollectionKind::CollectionPage,
            "OrderedCollectionPage" => CollectionKind::OrderedCollectionPage,
            _ => return None,
        })
    }

    pub fn is_page(&self) -> bool {
        matches!(
            self,
            CollectionKind::CollectionPage | CollectionKind::OrderedCollectionPage
        )
    }
}

/// A collection or one page of it. Pages use the same shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub first: Option<IriOrObject<Collection>>,
    #[serde(default)]
    pub next: Option<IriOrObject<Collection>>,
    #[serde(default)]
    pub part_of: Option<String>,
    #[serde(default)]
    pub items: Option<OneOrMany<CollectionItem>>,
    #[serde(default)]
    pub ordered_items: Option<OneOrMany<CollectionItem>>,
}

impl Collection {
    /// Items from `orderedItems` and `items`, in document order.
    pub fn items(&self) -> impl Iterator<Item = &CollectionItem> {
        self.ordered_items
            .iter()
            .flat_map(|i| i.iter())
            .chain(self.items.iter().flat_map(|i| i.iter()))
    }
}

impl IriOrObject<Collection> {
    /// The IRI, or the embedded collection's `id`.
    pub fn iri(&self) -> Option<&str> {
        match self {
            IriOrObject::Iri(s) => Some(s),
            IriOrObject::Object(c) => c.id.as_deref(),
        }
    }
}

/// One collection member, by IRI or embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CollectionItem {
    Iri(String),
    Object(Value),
}

impl CollectionItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            CollectionItem::Iri(s) => Some(s),
            CollectionItem::Object(v) => v.get("id").and_then(Value::as_str),
        }
    }
}

// ---------------------------------------------------------------------------
// The closed enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Vocab {
    Actor(ActorKind, Actor),
    Status(StatusKind, StatusObject),
    Announce(Announce),
    Accept(Accept),
    Collection(CollectionKind, Collection),
    Emoji(EmojiObject),
    Tombstone(Tombstone),
}

enum Tagged {
    Actor(ActorKind),
    Status(StatusKind),
    Announce,
    Accept,
    Collection(CollectionKind),
    Emoji,
    Tombstone,
}

fn classify(tag: &str) -> Option<Tagged> {
    if let Some(k) = ActorKind::from_type_tag(tag) {
        return Some(Tagged::Actor(k));
    }
    if let Some(k) = StatusKind::from_type_tag(tag) {
        return Some(Tagged::Status(k));
    }
    if let Some(k) = CollectionKind::from_type_tag(tag) {
        return Some(Tagged::Collection(k));
    }
    match tag {
        "Announce" => Some(Tagged::Announce),
        "Accept" => Some(Tagged::Accept),
        "Emoji" => Some(Tagged::Emoji),
        "Tombstone" => Some(Tagged::Tombstone),
        _ => None,
    }
}

fn typed<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, VocabError> {
    serde_json::from_value(value).map_err(|source| VocabError::Invalid {
        kind: kind.to_string(),
        source,
    })
}

impl Vocab {
    /// Decode a JSON document.
    pub fn decode(bytes: &[u8]) -> Result<Self, VocabError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed document. `type` may be a string or an
    /// array; the first recognised entry wins.
    pub fn from_value(value: Value) -> Result<Self, VocabError> {
        let tags: Vec<String> = match value.get("type") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(a)) => a
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => return Err(VocabError::MissingType),
        };
        let Some((tag, tagged)) = tags
            .iter()
            .find_map(|t| classify(t).map(|c| (t.as_str(), c)))
        else {
            return Err(VocabError::UnsupportedType(tags.join(",")));
        };

        Ok(match tagged {
            Tagged::Actor(k) => Vocab::Actor(k, typed(tag, value)?),
            Tagged::Status(k) => Vocab::Status(k, typed(tag, value)?),
            Tagged::Announce => Vocab::Announce(typed(tag, value)?),
            Tagged::Accept => Vocab::Accept(typed(tag, value)?),
            Tagged::Collection(k) => Vocab::Collection(k, typed(tag, value)?),
            Tagged::Emoji => Vocab::Emoji(typed(tag, value)?),
            Tagged::Tombstone => Vocab::Tombstone(typed(tag, value)?),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Vocab::Actor(..) => "actor",
            Vocab::Status(..) => "status",
            Vocab::Announce(_) => "Announce",
            Vocab::Accept(_) => "Accept",
            Vocab::Collection(..) => "collection",
            Vocab::Emoji(_) => "Emoji",
            Vocab::Tombstone(_) => "Tombstone",
        }
    }

    /// The document's own `id`, when it has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Vocab::Actor(_, a) => Some(&a.id),
            Vocab::Status(_, s) => Some(&s.id),
            Vocab::Announce(a) => Some(&a.id),
            Vocab::Accept(a) => Some(&a.id),
            Vocab::Collection(_, c) => c.id.as_deref(),
            Vocab::Emoji(e) => e.id.as_deref(),
            Vocab::Tombstone(t) => t.id.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// What the resolver reads from an actor document.
pub trait Accountable {
    fn id(&self) -> &str;
    fn kind(&self) -> ActorKind;
    fn preferred_username(&self) -> Option<&str>;
    fn display_name(&self) -> Option<&str>;
    fn note(&self) -> Option<&str>;
    fn profile_url(&self) -> Option<&str>;
    fn public_key(&self) -> Option<&PublicKey>;
    fn inbox(&self) -> Option<&str>;
    fn shared_inbox(&self) -> Option<&str>;
    fn outbox(&self) -> Option<&str>;
    fn followers(&self) -> Option<&str>;
    fn following(&self) -> Option<&str>;
    fn featured(&self) -> Option<&str>;
    fn avatar(&self) -> Option<&ImageObject>;
    fn header(&self) -> Option<&ImageObject>;
    fn locked(&self) -> bool;
    fn discoverable(&self) -> bool;
    fn emojis(&self) -> Vec<&EmojiObject>;
}

/// What the resolver reads from a status document.
pub trait Statusable {
    fn id(&self) -> &str;
    fn attributed_to(&self) -> Option<&str>;
    fn in_reply_to(&self) -> Option<&str>;
    fn content(&self) -> Option<&str>;
    fn content_warning(&self) -> Option<&str>;
    fn sensitive(&self) -> bool;
    fn url(&self) -> Option<&str>;
    fn published(&self) -> Option<DateTime<Utc>>;
    fn updated(&self) -> Option<DateTime<Utc>>;
    fn to(&self) -> Vec<&str>;
    fn cc(&self) -> Vec<&str>;
    fn attachments(&self) -> Vec<&Attachment>;
    fn mentions(&self) -> Vec<(&str, Option<&str>)>;
    fn emojis(&self) -> Vec<&EmojiObject>;
    fn replies(&self) -> Option<&IriOrObject<Collection>>;
    fn interaction_policy(&self) -> Option<&WireInteractionPolicy>;
    fn approved_by(&self) -> Option<&str>;
}

fn tag_emojis(tag: &Option<OneOrMany<Tag>>) -> Vec<&EmojiObject> {
    tag.iter()
        .flat_map(|t| t.iter())
        .filter_map(|t| match t {
            Tag::Emoji(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// An actor document together with its declared kind.
pub struct ActorDoc<'a> {
    pub kind: ActorKind,
    pub actor: &'a Actor,
}

impl Accountable for ActorDoc<'_> {
    fn id(&self) -> &str {
        &self.actor.id
    }
    fn kind(&self) -> ActorKind {
        self.kind
    }
    fn preferred_username(&self) -> Option<&str> {
        self.actor.preferred_username.as_deref()
    }
    fn display_name(&self) -> Option<&str> {
        self.actor.name.as_deref()
    }
    fn note(&self) -> Option<&str> {
        self.actor.summary.as_deref()
    }
    fn profile_url(&self) -> Option<&str> {
        first_url(&self.actor.url)
    }
    fn public_key(&self) -> Option<&PublicKey> {
        self.actor.public_key.as_ref()
    }
    fn inbox(&self) -> Option<&str> {
        self.actor.inbox.as_deref()
    }
    fn shared_inbox(&self) -> Option<&str> {
        self.actor.endpoints.as_ref()?.shared_inbox.as_deref()
    }
    fn outbox(&self) -> Option<&str> {
        self.actor.outbox.as_deref()
    }
    fn followers(&self) -> Option<&str> {
        self.actor.followers.as_deref()
    }
    fn following(&self) -> Option<&str> {
        self.actor.following.as_deref()
    }
    fn featured(&self) -> Option<&str> {
        self.actor.featured.as_deref()
    }
    fn avatar(&self) -> Option<&ImageObject> {
        self.actor.icon.as_ref()?.first()
    }
    fn header(&self) -> Option<&ImageObject> {
        self.actor.image.as_ref()?.first()
    }
    fn locked(&self) -> bool {
        self.actor.manually_approves_followers.unwrap_or(false)
    }
    fn discoverable(&self) -> bool {
        self.actor.discoverable.unwrap_or(false)
    }
    fn emojis(&self) -> Vec<&EmojiObject> {
        tag_emojis(&self.actor.tag)
    }
}

impl Statusable for StatusObject {
    fn id(&self) -> &str {
        &self.id
    }
    fn attributed_to(&self) -> Option<&str> {
        first_id(&self.attributed_to)
    }
    fn in_reply_to(&self) -> Option<&str> {
        first_id(&self.in_reply_to)
    }
    fn content(&self) -> Option<&str> {
        self.content.as_deref().or(self.name.as_deref())
    }
    fn content_warning(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.is_empty())
    }
    fn sensitive(&self) -> bool {
        self.sensitive.unwrap_or(false) || self.content_warning().is_some()
    }
    fn url(&self) -> Option<&str> {
        first_url(&self.url)
    }
    fn published(&self) -> Option<DateTime<Utc>> {
        self.published
    }
    fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }
    fn to(&self) -> Vec<&str> {
        all_ids(&self.to)
    }
    fn cc(&self) -> Vec<&str> {
        all_ids(&self.cc)
    }
    fn attachments(&self) -> Vec<&Attachment> {
        self.attachment.iter().flat_map(|a| a.iter()).collect()
    }
    fn mentions(&self) -> Vec<(&str, Option<&str>)> {
        self.tag
            .iter()
            .flat_map(|t| t.iter())
            .filter_map(|t| match t {
                Tag::Mention {
                    href: Some(href),
                    name,
                } => Some((href.as_str(), name.as_deref())),
                _ => None,
            })
            .collect()
    }
    fn emojis(&self) -> Vec<&EmojiObject> {
        tag_emojis(&self.tag)
    }
    fn replies(&self) -> Option<&IriOrObject<Collection>> {
        self.replies.as_ref()
    }
    fn interaction_policy(&self) -> Option<&WireInteractionPolicy> {
        self.interaction_policy.as_ref()
    }
    fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_person() {
        let v = Vocab::from_value(json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Person",
            "id": "https://a.example/users/alice",
            "preferredUsername": "alice",
            "inbox": "https://a.example/users/alice/inbox",
            "endpoints": { "sharedInbox": "https://a.example/inbox" },
            "publicKey": {
                "id": "https://a.example/users/alice#main-key",
                "owner": "https://a.example/users/alice",
                "publicKeyPem": "-----BEGIN PUBLIC KEY-----\n..."
            },
            "icon": { "type": "Image", "url": "https://a.example/avatar.png", "mediaType": "image/png" }
        }))
        .unwrap();
        let Vocab::Actor(kind, actor) = v else {
            panic!("expected actor");
        };
        assert_eq!(kind, ActorKind::Person);
        let doc = ActorDoc { kind, actor: &actor };
        assert_eq!(doc.preferred_username(), Some("alice"));
        assert_eq!(doc.shared_inbox(), Some("https://a.example/inbox"));
        assert_eq!(doc.avatar().and_then(ImageObject::url), Some("https://a.example/avatar.png"));
    }

    #[test]
    fn type_array_picks_first_known() {
        let v = Vocab::from_value(json!({
            "type": ["toot:Custom", "Note"],
            "id": "https://a.example/s/1"
        }))
        .unwrap();
        assert!(matches!(v, Vocab::Status(StatusKind::Note, _)));
    }

    #[test]
    fn unsupported_and_missing_type() {
        assert!(matches!(
            Vocab::from_value(json!({"type": "Like", "id": "x"})),
            Err(VocabError::UnsupportedType(t)) if t == "Like"
        ));
        assert!(matches!(
            Vocab::from_value(json!({"id": "x"})),
            Err(VocabError::MissingType)
        ));
    }

    #[test]
    fn status_tags_and_references() {
        let v = Vocab::from_value(json!({
            "type": "Note",
            "id": "https://a.example/s/2",
            "attributedTo": { "type": "Person", "id": "https://a.example/users/alice" },
            "inReplyTo": "https://b.example/s/1",
            "content": "<p>hi @bob :blob:</p>",
            "to": ["https://www.w3.org/ns/activitystreams#Public"],
            "tag": [
                { "type": "Mention", "href": "https://b.example/users/bob", "name": "@bob@b.example" },
                { "type": "Emoji", "name": ":blob:", "icon": { "url": "https://a.example/blob.png" } },
                { "type": "Hashtag", "name": "#x" },
                { "type": "SomethingElse" }
            ],
            "replies": {
                "type": "Collection",
                "id": "https://a.example/s/2/replies",
                "first": "https://a.example/s/2/replies?page=1"
            }
        }))
        .unwrap();
        let Vocab::Status(_, st) = v else {
            panic!("expected status");
        };
        assert_eq!(st.attributed_to(), Some("https://a.example/users/alice"));
        assert_eq!(st.in_reply_to(), Some("https://b.example/s/1"));
        assert!(is_public_iri(st.to()[0]));
        assert_eq!(
            st.mentions(),
            vec![("https://b.example/users/bob", Some("@bob@b.example"))]
        );
        assert_eq!(st.emojis()[0].shortcode(), "blob");
        let replies = st.replies().unwrap();
        assert_eq!(replies.iri(), Some("https://a.example/s/2/replies"));
        let IriOrObject::Object(c) = replies else {
            panic!("expected embedded collection");
        };
        assert_eq!(
            c.first.as_ref().and_then(|f| f.iri()),
            Some("https://a.example/s/2/replies?page=1")
        );
    }

    #[test]
    fn collection_items_mixed() {
        let v = Vocab::from_value(json!({
            "type": "OrderedCollectionPage",
            "id": "https://a.example/c?page=1",
            "next": "https://a.example/c?page=2",
            "orderedItems": ["https://a.example/s/1", { "type": "Note", "id": "https://a.example/s/2" }]
        }))
        .unwrap();
        let Vocab::Collection(kind, page) = v else {
            panic!("expected collection");
        };
        assert!(kind.is_page());
        let ids: Vec<_> = page.items().filter_map(CollectionItem::id).collect();
        assert_eq!(ids, vec!["https://a.example/s/1", "https://a.example/s/2"]);
        assert_eq!(page.next.as_ref().and_then(|n| n.iri()), Some("https://a.example/c?page=2"));
    }

    #[test]
    fn approval_reference_and_accept() {
        let v = Vocab::from_value(json!({
            "type": "Note",
            "id": "https://a.example/s/3",
            "inReplyTo": "https://b.example/s/1",
            "approvedBy": "https://b.example/accepts/9"
        }))
        .unwrap();
        let Vocab::Status(_, st) = v else {
            panic!("expected status");
        };
        assert_eq!(st.approved_by(), Some("https://b.example/accepts/9"));

        let v = Vocab::from_value(json!({
            "type": "Accept",
            "id": "https://b.example/accepts/9",
            "actor": "https://b.example/users/bob",
            "object": { "type": "Note", "id": "https://a.example/s/3" },
            "target": "https://b.example/s/1"
        }))
        .unwrap();
        let Vocab::Accept(accept) = v else {
            panic!("expected accept");
        };
        assert_eq!(accept.actor(), Some("https://b.example/users/bob"));
        assert_eq!(accept.object(), Some("https://a.example/s/3"));
        assert_eq!(accept.target(), Some("https://b.example/s/1"));
    }

    #[test]
    fn interaction_policy_aliases() {
        let p: WireInteractionPolicy = serde_json::from_value(json!({
            "canReply": {
                "always": ["https://a.example/users/alice"],
                "approvalRequired": "https://www.w3.org/ns/activitystreams#Public"
            },
            "canLike": { "automaticApproval": ["https://www.w3.org/ns/activitystreams#Public"] }
        }))
        .unwrap();
        let reply = p.can_reply.unwrap();
        assert_eq!(reply.automatic_approval.unwrap().iter().count(), 1);
        assert!(reply.manual_approval.is_some());
        assert!(p.can_like.is_some());
        assert!(p.can_announce.is_none());
    }
}
