//! Public surface for the `shadowfed-deref` crate.
//!
//! The engine turns remote federated identifiers into stored shadow
//! records. Build a [`Dereferencer`] from a [`Storage`], a
//! [`TransportController`] and a [`MediaManager`], then call the resolvers
//! with a [`Requester`].
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`dereferencing`] | The resolvers: accounts, statuses, media, emoji, instances, collections, threads |
//! | [`blocks`] | Domain block gate consulted before any network call |
//! | [`webfinger`] | `user@host` to actor URI |
//! | [`singleflight`] | Keyed de-duplication of in-flight work |
//! | [`interaction`] | Reply/like/boost policy evaluation |
//! | [`visibility`] | Who may see a status |
//! | [`storage`] | Persistence trait with memory and SQLite backends |
//! | [`transport`] | Signed HTTP fetching |
//! | [`media`] | Media caching |
//! | [`error`] | [`DerefError`] and its [`ErrorKind`] classification |
//! | [`config`] | [`DerefConfig`] |

pub mod blocks;
pub mod config;
pub mod dereferencing;
pub mod error;
pub mod interaction;
pub mod media;
pub mod singleflight;
pub mod storage;
pub mod transport;
pub mod visibility;
pub mod webfinger;

pub use config::DerefConfig;
pub use dereferencing::collection::CollectionPager;
pub use dereferencing::media::MediaInfo;
pub use dereferencing::{Dereferencer, Requester};
pub use error::{Cause, DerefError, DerefResult, ErrorKind};
pub use interaction::InteractionFilter;
pub use media::{local::LocalMediaManager, MediaManager};
pub use storage::{memory::MemoryStorage, sqlite::SqliteStorage, Storage, StorageError};
pub use transport::http::{HttpTransport, HttpTransportController};
pub use transport::signature::Signer;
pub use transport::{Transport, TransportController, TransportError};
pub use visibility::{StorageVisibility, VisibilityFilter};
