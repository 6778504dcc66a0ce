//! Wire types for what remote federated servers send.
//!
//! This crate only describes documents; fetching them is the engine's job.
//!
//! | Module | Documents |
//! |--------|-----------|
//! | [`jrd`] | Webfinger JRD: [`Jrd`], [`JrdLink`] |
//! | [`vocab`] | ActivityStreams objects decoded into the closed [`Vocab`] enum, with the [`Accountable`] and [`Statusable`] capability traits |
//! | [`instance`] | `/api/v1/instance` and nodeinfo: [`ApiV1Instance`], [`NodeInfoLinks`], [`NodeInfo`] |

pub mod instance;
pub mod jrd;
pub mod vocab;

pub use instance::{ApiV1Instance, NodeInfo, NodeInfoLinks};
pub use jrd::{is_activitypub_content_type, Jrd, JrdLink};
pub use vocab::{
    is_public_iri, Accept, Accountable, ActorDoc, Announce, Collection, CollectionItem, CollectionKind,
    EmojiObject, IriOrObject, Statusable, StatusKind, StatusObject, Tombstone, Vocab, VocabError,
    WireInteractionPolicy, PUBLIC_IRI,
};
