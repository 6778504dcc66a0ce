//! Scripted remote server shared by the integration tests.
//!
//! [`Remote`] answers from in-memory maps and records every request it
//! receives, so tests can assert both on results and on what was (or was
//! not) fetched.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};
use shadowfed_deref::transport::{DerefResponse, RemoteMedia};
use shadowfed_deref::{
    DerefConfig, Dereferencer, LocalMediaManager, MemoryStorage, Transport, TransportController,
    TransportError,
};

pub const LOCAL: &str = "local.example";

#[derive(Default)]
pub struct Remote {
    docs: Mutex<HashMap<String, Value>>,
    jrds: Mutex<HashMap<String, Value>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
    media_fetches: AtomicUsize,
    /// Added before every answer so concurrent callers overlap.
    latency: Duration,
}

impl Remote {
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn serve(&self, uri: &str, doc: Value) {
        self.docs.lock().unwrap().insert(uri.to_string(), doc);
    }

    pub fn serve_jrd(&self, acct: &str, jrd: Value) {
        self.jrds.lock().unwrap().insert(acct.to_string(), jrd);
    }

    pub fn serve_media(&self, url: &str, bytes: &[u8]) {
        self.media.lock().unwrap().insert(url.to_string(), bytes.to_vec());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, uri: &str) -> usize {
        self.requests().iter().filter(|r| *r == uri).count()
    }

    pub fn media_fetches(&self) -> usize {
        self.media_fetches.load(Ordering::SeqCst)
    }

    async fn answer(&self, key: String, found: Option<Vec<u8>>) -> Result<Bytes, TransportError> {
        self.requests.lock().unwrap().push(key);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        found.map(Bytes::from).ok_or(TransportError::Gone(404))
    }
}

#[async_trait]
impl Transport for Remote {
    async fn dereference(&self, uri: &str) -> Result<DerefResponse, TransportError> {
        let found = self
            .docs
            .lock()
            .unwrap()
            .get(uri)
            .map(|v| serde_json::to_vec(v).unwrap());
        let body = self.answer(uri.to_string(), found).await?;
        Ok(DerefResponse {
            final_uri: uri.to_string(),
            content_type: Some("application/activity+json".into()),
            body,
        })
    }

    async fn finger(&self, username: &str, host: &str) -> Result<Bytes, TransportError> {
        let acct = format!("{username}@{host}");
        let found = self
            .jrds
            .lock()
            .unwrap()
            .get(&acct)
            .map(|v| serde_json::to_vec(v).unwrap());
        self.answer(format!("finger:{acct}"), found).await
    }

    async fn dereference_media(&self, uri: &str) -> Result<RemoteMedia, TransportError> {
        self.media_fetches.fetch_add(1, Ordering::SeqCst);
        let found = self.media.lock().unwrap().get(uri).cloned();
        let bytes = self.answer(uri.to_string(), found).await?;
        let size = bytes.len() as u64;
        Ok(RemoteMedia {
            stream: futures_util::stream::once(async move { Ok(bytes) }).boxed(),
            size: Some(size),
            content_type: Some("image/png".into()),
        })
    }

    async fn get_json(&self, uri: &str) -> Result<Bytes, TransportError> {
        let found = self
            .docs
            .lock()
            .unwrap()
            .get(uri)
            .map(|v| serde_json::to_vec(v).unwrap());
        self.answer(uri.to_string(), found).await
    }
}

struct Single(Arc<Remote>);

#[async_trait]
impl TransportController for Single {
    async fn transport_for(&self, _: &str) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(self.0.clone())
    }
}

pub struct Node {
    pub deref: Arc<Dereferencer>,
    pub remote: Arc<Remote>,
    pub storage: Arc<MemoryStorage>,
    _media: tempfile::TempDir,
}

pub fn node() -> Node {
    node_with(Remote::default())
}

pub fn node_with(remote: Remote) -> Node {
    let storage = Arc::new(MemoryStorage::new());
    let remote = Arc::new(remote);
    let dir = tempfile::tempdir().unwrap();
    let mut config = DerefConfig::for_host(LOCAL);
    config.media_dir = dir.path().to_path_buf();
    let deref = Dereferencer::new(
        storage.clone(),
        Arc::new(Single(remote.clone())),
        Arc::new(LocalMediaManager::new(dir.path(), 1024 * 1024)),
        config,
    );
    Node {
        deref: Arc::new(deref),
        remote,
        storage,
        _media: dir,
    }
}

pub fn person(uri: &str, username: &str, key: &str) -> Value {
    json!({
        "type": "Person",
        "id": uri,
        "preferredUsername": username,
        "inbox": format!("{uri}/inbox"),
        "followers": format!("{uri}/followers"),
        "publicKey": {
            "id": format!("{uri}#main-key"),
            "owner": uri,
            "publicKeyPem": format!("-----BEGIN PUBLIC KEY-----{key}-----END PUBLIC KEY-----")
        }
    })
}

pub fn note(uri: &str, author: &str, in_reply_to: Option<&str>) -> Value {
    let mut v = json!({
        "type": "Note",
        "id": uri,
        "attributedTo": author,
        "content": format!("<p>{uri}</p>"),
        "to": ["https://www.w3.org/ns/activitystreams#Public"],
        "published": "2024-05-01T12:00:00Z"
    });
    if let Some(parent) = in_reply_to {
        v["inReplyTo"] = Value::String(parent.to_string());
    }
    v
}

pub fn with_replies(mut note: Value, replies: &str) -> Value {
    note["replies"] = json!(replies);
    note
}

pub fn replies(id: &str, items: &[&str]) -> Value {
    json!({
        "type": "OrderedCollection",
        "id": id,
        "totalItems": items.len(),
        "orderedItems": items,
    })
}
