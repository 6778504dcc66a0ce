//! `reqwest`-backed transport with signed GETs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{StatusCode, Url};
use shadowfed::Handle;
use shadowfed_wire::is_activitypub_content_type;

use super::signature::Signer;
use super::{DerefResponse, RemoteMedia, Transport, TransportController, TransportError};
use crate::config::DerefConfig;

const ACCEPT_ACTIVITY: &str =
    r#"application/activity+json, application/ld+json; profile="https://www.w3.org/ns/activitystreams""#;
const ACCEPT_JRD: &str = "application/jrd+json, application/json";
const ACCEPT_JSON: &str = "application/json";
const MAX_REDIRECTS: usize = 5;

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

/// `host[:port]` exactly as the `Host` header will carry it.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Follow redirects only while they stay on the server first asked.
/// A hop elsewhere comes back as the 3xx response itself.
fn same_server_redirects() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        let origin = attempt.previous().first().and_then(host_header);
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if origin.is_some() && origin == host_header(attempt.url()) {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

/// A transport signing every request as one local actor.
pub struct HttpTransport {
    client: reqwest::Client,
    signer: Arc<Signer>,
    scheme: &'static str,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        signer: Arc<Signer>,
        scheme: &'static str,
        user_agent: String,
    ) -> Self {
        Self {
            client,
            signer,
            scheme,
            user_agent,
        }
    }

    async fn signed_get(&self, uri: &str, accept: &str) -> Result<reqwest::Response, TransportError> {
        let url = Url::parse(uri).map_err(|e| TransportError::Network(format!("{uri}: {e}")))?;
        let host = host_header(&url)
            .ok_or_else(|| TransportError::Network(format!("{uri}: no host")))?;
        let (date, signature) = self
            .signer
            .sign_request("get", &path_and_query(&url), &host);

        tracing::debug!("transport: GET {uri}");
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, &self.user_agent)
            .header("Date", date)
            .header("Signature", signature)
            .send()
            .await
            .map_err(network)?;

        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(TransportError::Gone(resp.status().as_u16()))
            }
            s => Err(TransportError::Status(s.as_u16())),
        }
    }
}

fn content_type(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn is_json_like(ct: &str) -> bool {
    let media = ct.split(';').next().unwrap_or_default().trim();
    media.eq_ignore_ascii_case("application/json") || media.ends_with("+json")
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dereference(&self, uri: &str) -> Result<DerefResponse, TransportError> {
        let resp = self.signed_get(uri, ACCEPT_ACTIVITY).await?;
        let ct = content_type(&resp);
        if let Some(ct) = &ct {
            if !is_activitypub_content_type(ct) && !is_json_like(ct) {
                return Err(TransportError::Decode(format!(
                    "{uri}: non-ActivityPub content type {ct:?}"
                )));
            }
        }
        let final_uri = resp.url().to_string();
        let body = resp.bytes().await.map_err(network)?;
        Ok(DerefResponse {
            final_uri,
            content_type: ct,
            body,
        })
    }

    async fn finger(&self, username: &str, host: &str) -> Result<Bytes, TransportError> {
        let url = Handle::new(username, host).webfinger_url(self.scheme, host);
        let resp = self.signed_get(&url, ACCEPT_JRD).await?;
        resp.bytes().await.map_err(network)
    }

    async fn dereference_media(&self, uri: &str) -> Result<RemoteMedia, TransportError> {
        let resp = self.signed_get(uri, "*/*").await?;
        let size = resp.content_length();
        let content_type = content_type(&resp);
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(network))
            .boxed();
        Ok(RemoteMedia {
            stream,
            size,
            content_type,
        })
    }

    async fn get_json(&self, uri: &str) -> Result<Bytes, TransportError> {
        let resp = self.signed_get(uri, ACCEPT_JSON).await?;
        resp.bytes().await.map_err(network)
    }
}

/// Hands out [`HttpTransport`]s keyed by local username.
///
/// Users without a registered key sign as the instance actor.
pub struct HttpTransportController {
    client: reqwest::Client,
    scheme: &'static str,
    user_agent: String,
    instance: Arc<Signer>,
    users: RwLock<HashMap<String, Arc<Signer>>>,
}

impl HttpTransportController {
    pub fn new(client: reqwest::Client, config: &DerefConfig, instance: Signer) -> Self {
        Self {
            client,
            scheme: config.scheme(),
            user_agent: config.user_agent.clone(),
            instance: Arc::new(instance),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Build a client with the configured timeout and user agent.
    pub fn from_config(config: &DerefConfig, instance: Signer) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(same_server_redirects())
            .build()
            .map_err(network)?;
        Ok(Self::new(client, config, instance))
    }

    pub fn register_user(&self, username: &str, signer: Signer) -> Result<(), TransportError> {
        self.users
            .write()
            .map_err(|_| TransportError::Signing("signer registry lock poisoned".into()))?
            .insert(username.to_string(), Arc::new(signer));
        Ok(())
    }

    fn signer_for(&self, username: &str) -> Result<Arc<Signer>, TransportError> {
        if username.is_empty() {
            return Ok(Arc::clone(&self.instance));
        }
        let users = self
            .users
            .read()
            .map_err(|_| TransportError::Signing("signer registry lock poisoned".into()))?;
        Ok(users
            .get(username)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.instance)))
    }
}

#[async_trait]
impl TransportController for HttpTransportController {
    async fn transport_for(&self, username: &str) -> Result<Arc<dyn Transport>, TransportError> {
        let signer = self.signer_for(username)?;
        Ok(Arc::new(HttpTransport::new(
            self.client.clone(),
            signer,
            self.scheme,
            self.user_agent.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_keeps_port() {
        let u = Url::parse("http://127.0.0.1:8080/users/a?x=1").unwrap();
        assert_eq!(host_header(&u).as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(path_and_query(&u), "/users/a?x=1");
        let u = Url::parse("https://a.example/users/a").unwrap();
        assert_eq!(host_header(&u).as_deref(), Some("a.example"));
    }

    #[test]
    fn json_like_content_types() {
        assert!(is_json_like("application/json; charset=utf-8"));
        assert!(is_json_like("application/activity+json"));
        assert!(!is_json_like("text/html"));
    }

    #[tokio::test]
    async fn unknown_user_signs_as_instance() {
        let config = DerefConfig::for_host("local.example");
        let ctrl = HttpTransportController::from_config(
            &config,
            Signer::generate("https://local.example/actor#main-key"),
        )
        .unwrap();
        ctrl.register_user("alice", Signer::generate("https://local.example/users/alice#main-key"))
            .unwrap();
        assert_eq!(
            ctrl.signer_for("alice").unwrap().key_id(),
            "https://local.example/users/alice#main-key"
        );
        assert_eq!(
            ctrl.signer_for("bob").unwrap().key_id(),
            "https://local.example/actor#main-key"
        );
        assert!(ctrl.transport_for("").await.is_ok());
    }
}
