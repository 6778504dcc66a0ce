//! Shared helpers for the shadowfed end-to-end suite.
//!
//! [`spawn_remote`] binds a real TCP listener and serves scripted
//! ActivityPub documents with axum, checking the HTTP Signature on every
//! request it receives. [`local_node`] builds a [`Dereferencer`] wired to
//! the real `reqwest` transport, with its signing keys trusted by the
//! remote, so tests exercise the whole path from resolver to socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use ed25519_dalek::VerifyingKey;
use serde_json::Value;
use shadowfed::Handle;
use shadowfed_deref::transport::signature::SignatureHeader;
use shadowfed_deref::{
    DerefConfig, Dereferencer, HttpTransportController, LocalMediaManager, MemoryStorage, Signer,
};

/// The local server name every [`LocalNode`] claims.
pub const LOCAL_HOST: &str = "local.example";

/// Users with their own signing key on a [`LocalNode`].
pub const LOCAL_USERS: &[&str] = &["alice", "bob"];

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    content_type: String,
    location: Option<String>,
    body: Vec<u8>,
}

/// One request as the remote saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    /// `keyId` of a signature that verified, `None` if absent or invalid.
    pub signed_by: Option<String>,
}

#[derive(Default)]
struct RemoteState {
    routes: Mutex<HashMap<String, Canned>>,
    trusted: Mutex<HashMap<String, VerifyingKey>>,
    seen: Mutex<Vec<Seen>>,
}

/// Handle on a running scripted remote.
#[derive(Clone)]
pub struct Remote {
    /// `http://127.0.0.1:<port>`
    pub base: String,
    /// `127.0.0.1:<port>`, the remote's domain as the engine sees it.
    pub authority: String,
    state: Arc<RemoteState>,
}

impl Remote {
    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn respond(&self, path: &str, status: StatusCode, content_type: &str, body: Vec<u8>) {
        self.state.routes.lock().unwrap().insert(
            path.to_string(),
            Canned {
                status,
                content_type: content_type.to_string(),
                location: None,
                body,
            },
        );
    }

    /// Serve `doc` as `application/activity+json` at `path`.
    pub fn activity(&self, path: &str, doc: Value) {
        self.respond(
            path,
            StatusCode::OK,
            "application/activity+json",
            serde_json::to_vec(&doc).unwrap(),
        );
    }

    /// Serve `doc` as plain JSON at `path`.
    pub fn json(&self, path: &str, doc: Value) {
        self.respond(path, StatusCode::OK, "application/json", serde_json::to_vec(&doc).unwrap());
    }

    pub fn bytes(&self, path: &str, content_type: &str, body: &[u8]) {
        self.respond(path, StatusCode::OK, content_type, body.to_vec());
    }

    /// Answer `path` with a bare status code.
    pub fn status(&self, path: &str, status: u16) {
        let status = StatusCode::from_u16(status).unwrap();
        self.respond(path, status, "text/plain", Vec::new());
    }

    /// Answer `path` with a `302 Found` pointing at `location`.
    pub fn redirect(&self, path: &str, location: &str) {
        self.state.routes.lock().unwrap().insert(
            path.to_string(),
            Canned {
                status: StatusCode::FOUND,
                content_type: "text/plain".to_string(),
                location: Some(location.to_string()),
                body: Vec::new(),
            },
        );
    }

    /// Publish a webfinger record for `username` on this remote.
    pub fn webfinger(&self, username: &str, subject: &str, actor_path: &str) {
        let url = Handle::new(username, &self.authority).webfinger_url("http", &self.authority);
        let path = url.trim_start_matches(&self.base).to_string();
        let jrd = serde_json::json!({
            "subject": subject,
            "links": [{
                "rel": "self",
                "type": "application/activity+json",
                "href": self.url(actor_path),
            }]
        });
        self.respond(
            &path,
            StatusCode::OK,
            "application/jrd+json",
            serde_json::to_vec(&jrd).unwrap(),
        );
    }

    /// Accept signatures made with `key` under `key_id`.
    pub fn trust(&self, key_id: &str, key: VerifyingKey) {
        self.state
            .trusted
            .lock()
            .unwrap()
            .insert(key_id.to_string(), key);
    }

    /// Every request received so far, in arrival order.
    pub fn seen(&self) -> Vec<Seen> {
        self.state.seen.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.seen().iter().filter(|s| s.path == path).count()
    }
}

fn check_signature(state: &RemoteState, method: &Method, path: &str, headers: &HeaderMap) -> Option<String> {
    let header = headers.get("signature")?.to_str().ok()?;
    let parsed: SignatureHeader = header.parse().ok()?;
    let key = *state.trusted.lock().unwrap().get(&parsed.key_id)?;
    let lookup = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    parsed.verify(method.as_str(), path, lookup, &key).ok()?;
    Some(parsed.key_id)
}

async fn serve(
    State(state): State<Arc<RemoteState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let signed_by = check_signature(&state, &method, &path, &headers);
    state.seen.lock().unwrap().push(Seen {
        method: method.to_string(),
        path: path.clone(),
        signed_by,
    });

    let canned = state.routes.lock().unwrap().get(&path).cloned();
    match canned {
        Some(c) => {
            let mut builder = Response::builder()
                .status(c.status)
                .header(header::CONTENT_TYPE, c.content_type);
            if let Some(location) = c.location {
                builder = builder.header(header::LOCATION, location);
            }
            builder.body(Body::from(c.body)).unwrap()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Start a scripted remote on an OS-assigned port of `127.0.0.1`.
///
/// # Panics
///
/// Panics if the listener cannot be bound.
pub async fn spawn_remote() -> Remote {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    let state = Arc::new(RemoteState::default());
    let router = Router::new().fallback(serve).with_state(Arc::clone(&state));

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("scripted remote error");
    });

    Remote {
        base: format!("http://{addr}"),
        authority: addr.to_string(),
        state,
    }
}

// ---------------------------------------------------------------------------
// Local node
// ---------------------------------------------------------------------------

pub struct LocalNode {
    pub deref: Dereferencer,
    pub storage: Arc<MemoryStorage>,
    pub media_dir: tempfile::TempDir,
}

/// Key id the instance actor signs with.
pub fn instance_key_id() -> String {
    format!("http://{LOCAL_HOST}/actor#main-key")
}

/// Key id `username` signs with.
pub fn user_key_id(username: &str) -> String {
    format!("http://{LOCAL_HOST}/users/{username}#main-key")
}

/// A dereferencer over plain HTTP whose keys `remote` trusts.
pub fn local_node(remote: &Remote, tweak: impl FnOnce(&mut DerefConfig)) -> LocalNode {
    let media_dir = tempfile::tempdir().expect("media tempdir");
    let mut config = DerefConfig::for_host(LOCAL_HOST);
    config.insecure_http = true;
    config.media_dir = media_dir.path().to_path_buf();
    tweak(&mut config);

    let instance = Signer::generate(instance_key_id());
    remote.trust(instance.key_id(), instance.verifying_key());
    let transports =
        HttpTransportController::from_config(&config, instance).expect("build HTTP client");
    for user in LOCAL_USERS {
        let signer = Signer::generate(user_key_id(user));
        remote.trust(signer.key_id(), signer.verifying_key());
        transports.register_user(user, signer).expect("register signer");
    }

    let storage = Arc::new(MemoryStorage::new());
    let media = LocalMediaManager::new(media_dir.path(), config.media_max_bytes);
    let deref = Dereferencer::new(storage.clone(), Arc::new(transports), Arc::new(media), config);
    LocalNode {
        deref,
        storage,
        media_dir,
    }
}
