//! The object resolvers.
//!
//! [`Dereferencer`] turns remote identifiers into stored shadow records.
//! Every public operation takes a [`Requester`]: the local user whose key
//! signs the fetches, and a cancellation token that every network await
//! races against.
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`account`] | `resolve_account`, `resolve_account_by_handle`, `refresh_account`, `placeholder_account` |
//! | [`status`] | `resolve_status`, `refresh_status`, `enrich_boost` |
//! | [`media`] | `resolve_media` |
//! | [`emoji`] | `resolve_emoji` |
//! | [`instance`] | `resolve_instance` |
//! | [`collection`] | `dereference_collection` and the [`collection::CollectionPager`] |
//! | [`thread`] | `resolve_thread`, `walk_ancestors` |
//! | [`permitted`] | reply/boost policy gate with retraction |
//!
//! Resolvers share one shape: block gate, storage lookup, freshness check,
//! one dereference, type check, conversion, URI match, persist, then
//! best-effort enrichment. A lost insert race (`AlreadyExists`) re-reads
//! and returns the stored record.

pub mod account;
pub mod collection;
mod convert;
pub mod emoji;
pub mod instance;
pub mod media;
pub mod permitted;
pub mod status;
pub mod thread;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shadowfed::{ShadowAccount, ShadowEmoji};
use tokio_util::sync::CancellationToken;

use crate::blocks::{authority, parse_remote_uri, DomainGate};
use crate::config::DerefConfig;
use crate::error::{Cause, DerefError, DerefResult, ResultExt};
use crate::interaction::InteractionFilter;
use crate::media::MediaManager;
use crate::singleflight::SingleFlight;
use crate::storage::Storage;
use crate::transport::{DerefResponse, Transport, TransportController, TransportError};
use crate::visibility::{StorageVisibility, VisibilityFilter};

/// Who is asking, and how to stop.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    /// Local username whose key signs outbound requests. Empty means the
    /// instance actor.
    pub username: String,
    pub cancel: CancellationToken,
}

impl Requester {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sign as the instance actor.
    pub fn instance() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Await `fut` unless cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            r = fut => r,
        }
    }
}

pub struct Dereferencer {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) transports: Arc<dyn TransportController>,
    pub(crate) media: Arc<dyn MediaManager>,
    pub(crate) config: Arc<DerefConfig>,
    pub(crate) gate: DomainGate,
    pub(crate) interactions: InteractionFilter,
    emoji_flight: SingleFlight<String, DerefResult<ShadowEmoji>>,
    /// Account fetches in progress, keyed by (requesting user, actor URI).
    handshakes: SingleFlight<(String, String), DerefResult<(ShadowAccount, bool)>>,
}

impl Dereferencer {
    pub fn new(
        storage: Arc<dyn Storage>,
        transports: Arc<dyn TransportController>,
        media: Arc<dyn MediaManager>,
        config: DerefConfig,
    ) -> Self {
        let visibility: Arc<dyn VisibilityFilter> =
            Arc::new(StorageVisibility::new(Arc::clone(&storage)));
        Self::with_visibility(storage, transports, media, config, visibility)
    }

    pub fn with_visibility(
        storage: Arc<dyn Storage>,
        transports: Arc<dyn TransportController>,
        media: Arc<dyn MediaManager>,
        config: DerefConfig,
        visibility: Arc<dyn VisibilityFilter>,
    ) -> Self {
        Self {
            gate: DomainGate::new(Arc::clone(&storage)),
            interactions: InteractionFilter::new(Arc::clone(&storage), visibility),
            storage,
            transports,
            media,
            config: Arc::new(config),
            emoji_flight: SingleFlight::new(),
            handshakes: SingleFlight::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &DerefConfig {
        &self.config
    }

    pub fn interactions(&self) -> &InteractionFilter {
        &self.interactions
    }

    pub(crate) async fn transport(&self, req: &Requester) -> DerefResult<Arc<dyn Transport>> {
        req.run(self.transports.transport_for(&req.username))
            .await
            .context("transport_for", &req.username)
    }

    /// Dereference `uri` as `req`. A response finally served by another
    /// server, or by a blocked host, is refused.
    pub(crate) async fn fetch_document(
        &self,
        req: &Requester,
        uri: &str,
    ) -> DerefResult<DerefResponse> {
        let transport = self.transport(req).await?;
        let resp = req
            .run(transport.dereference(uri))
            .await
            .context("dereference", uri)?;
        if resp.final_uri == uri {
            return Ok(resp);
        }

        let requested = parse_remote_uri(uri).context("dereference", uri)?;
        let served = self
            .gate
            .check_uri(&resp.final_uri)
            .await
            .map_err(|e| e.context("dereference", uri))?;
        if authority(&served) != authority(&requested) {
            tracing::warn!("deref: {uri} was served from {}", resp.final_uri);
            return Err(DerefError::new(Cause::UriMismatch {
                requested: uri.to_string(),
                declared: resp.final_uri,
            })
            .context("dereference", uri));
        }
        Ok(resp)
    }
}

/// `fetched_at` is older than `interval`, or unset.
pub(crate) fn is_stale(
    fetched_at: Option<DateTime<Utc>>,
    interval: std::time::Duration,
    now: DateTime<Utc>,
) -> bool {
    match fetched_at {
        None => true,
        Some(at) => chrono::Duration::from_std(interval)
            .map(|d| at + d <= now)
            .unwrap_or(false),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-crate fakes shared by the resolver unit tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::StreamExt;

    use super::*;
    use crate::media::local::LocalMediaManager;
    use crate::storage::memory::MemoryStorage;
    use crate::transport::{DerefResponse, RemoteMedia};

    #[derive(Default)]
    pub struct FakeTransport {
        pub docs: Mutex<HashMap<String, serde_json::Value>>,
        pub jrds: Mutex<HashMap<String, serde_json::Value>>,
        pub media: Mutex<HashMap<String, Vec<u8>>>,
        /// Requested URI to the URI the body is reported as served from.
        pub redirects: Mutex<HashMap<String, String>>,
        pub calls: Mutex<Vec<String>>,
        pub media_calls: AtomicUsize,
    }

    impl FakeTransport {
        pub fn doc(&self, uri: &str, v: serde_json::Value) {
            self.docs.lock().unwrap().insert(uri.to_string(), v);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn dereference(&self, uri: &str) -> Result<DerefResponse, TransportError> {
            self.calls.lock().unwrap().push(uri.to_string());
            let doc = self.docs.lock().unwrap().get(uri).cloned();
            let final_uri = self
                .redirects
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .unwrap_or_else(|| uri.to_string());
            match doc {
                Some(v) => Ok(DerefResponse {
                    final_uri,
                    content_type: Some("application/activity+json".into()),
                    body: Bytes::from(serde_json::to_vec(&v).unwrap()),
                }),
                None => Err(TransportError::Gone(404)),
            }
        }

        async fn finger(&self, username: &str, host: &str) -> Result<Bytes, TransportError> {
            let key = format!("{username}@{host}");
            self.calls.lock().unwrap().push(format!("finger:{key}"));
            match self.jrds.lock().unwrap().get(&key) {
                Some(v) => Ok(Bytes::from(serde_json::to_vec(v).unwrap())),
                None => Err(TransportError::Gone(404)),
            }
        }

        async fn dereference_media(&self, uri: &str) -> Result<RemoteMedia, TransportError> {
            self.media_calls.fetch_add(1, Ordering::SeqCst);
            let bytes = self
                .media
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .ok_or(TransportError::Gone(404))?;
            let size = bytes.len() as u64;
            Ok(RemoteMedia {
                stream: futures_util::stream::once(async move { Ok(Bytes::from(bytes)) }).boxed(),
                size: Some(size),
                content_type: Some("image/png".into()),
            })
        }

        async fn get_json(&self, uri: &str) -> Result<Bytes, TransportError> {
            self.calls.lock().unwrap().push(uri.to_string());
            match self.docs.lock().unwrap().get(uri) {
                Some(v) => Ok(Bytes::from(serde_json::to_vec(v).unwrap())),
                None => Err(TransportError::Gone(404)),
            }
        }
    }

    pub struct FakeController(pub Arc<FakeTransport>);

    #[async_trait]
    impl TransportController for FakeController {
        async fn transport_for(&self, _: &str) -> Result<Arc<dyn Transport>, TransportError> {
            Ok(self.0.clone())
        }
    }

    pub struct Harness {
        pub deref: Dereferencer,
        pub transport: Arc<FakeTransport>,
        pub storage: Arc<MemoryStorage>,
        pub _media_dir: tempfile::TempDir,
    }

    pub fn harness() -> Harness {
        harness_with(|_| {})
    }

    pub fn harness_with(tweak: impl FnOnce(&mut DerefConfig)) -> Harness {
        let storage = Arc::new(MemoryStorage::default());
        let transport = Arc::new(FakeTransport::default());
        let dir = tempfile::tempdir().unwrap();
        let mut config = DerefConfig::for_host("local.example");
        config.media_dir = dir.path().to_path_buf();
        tweak(&mut config);
        let deref = Dereferencer::new(
            storage.clone(),
            Arc::new(FakeController(transport.clone())),
            Arc::new(LocalMediaManager::new(dir.path(), 1024 * 1024)),
            config,
        );
        Harness {
            deref,
            transport,
            storage,
            _media_dir: dir,
        }
    }

    pub fn actor(uri: &str, username: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "Person",
            "id": uri,
            "preferredUsername": username,
            "inbox": format!("{uri}/inbox"),
            "followers": format!("{uri}/followers"),
            "following": format!("{uri}/following"),
            "publicKey": {
                "id": format!("{uri}#main-key"),
                "owner": uri,
                "publicKeyPem": format!("-----BEGIN PUBLIC KEY-----{username}-----END PUBLIC KEY-----")
            }
        })
    }

    pub fn note(uri: &str, author: &str, in_reply_to: Option<&str>) -> serde_json::Value {
        let mut v = serde_json::json!({
            "type": "Note",
            "id": uri,
            "attributedTo": author,
            "content": format!("<p>{uri}</p>"),
            "to": ["https://www.w3.org/ns/activitystreams#Public"],
            "published": "2024-05-01T12:00:00Z"
        });
        if let Some(parent) = in_reply_to {
            v["inReplyTo"] = serde_json::Value::String(parent.to_string());
        }
        v
    }
}
