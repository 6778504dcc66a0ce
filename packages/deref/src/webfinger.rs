//! Webfinger: `username@host` to an actor URI.
//!
//! One lookup per call. No retries and no fallback discovery.

use shadowfed_wire::jrd::REL_SELF;
use shadowfed_wire::{is_activitypub_content_type, Jrd};

use crate::blocks::parse_remote_uri;
use crate::dereferencing::Requester;
use crate::error::{Cause, DerefResult, ResultExt};
use crate::transport::Transport;

/// What a webfinger lookup established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingered {
    /// Username as the subject spells it.
    pub username: String,
    /// Account domain from the subject, lowercased.
    pub domain: String,
    pub actor_uri: String,
}

/// Interpret a JRD returned for `username`.
///
/// The subject's username must match. The first `self` link with an
/// ActivityPub type and an absolute http(s) href wins; other links are
/// skipped.
pub fn parse_jrd(body: &[u8], username: &str) -> Result<Fingered, Cause> {
    let jrd: Jrd = serde_json::from_slice(body)
        .map_err(|e| Cause::Decode(format!("webfinger response: {e}")))?;

    if jrd.subject.is_empty() {
        return Err(Cause::Invalid("webfinger response has no subject".into()));
    }
    let (subject_user, subject_domain) = jrd
        .subject_parts()
        .ok_or_else(|| Cause::Invalid(format!("unparseable webfinger subject {:?}", jrd.subject)))?;
    if !subject_user.eq_ignore_ascii_case(username) {
        return Err(Cause::UsernameMismatch {
            expected: username.to_string(),
            actual: subject_user.to_string(),
        });
    }

    for link in &jrd.links {
        if link.rel != REL_SELF {
            continue;
        }
        let Some(ct) = link.link_type.as_deref() else {
            tracing::debug!("webfinger: skipping self link without type");
            continue;
        };
        if !is_activitypub_content_type(ct) {
            tracing::debug!("webfinger: skipping self link of type {ct:?}");
            continue;
        }
        let Some(href) = link.href.as_deref() else {
            tracing::debug!("webfinger: skipping self link without href");
            continue;
        };
        if let Err(e) = parse_remote_uri(href) {
            tracing::debug!("webfinger: skipping self link: {e}");
            continue;
        }
        return Ok(Fingered {
            username: subject_user.to_string(),
            domain: subject_domain.to_ascii_lowercase(),
            actor_uri: href.to_string(),
        });
    }

    Err(Cause::Invalid(format!(
        "no usable self link in webfinger response for {}",
        jrd.subject
    )))
}

/// Finger `username@host` through `transport`, giving up when `req` is
/// cancelled.
pub async fn finger(
    transport: &dyn Transport,
    req: &Requester,
    username: &str,
    host: &str,
) -> DerefResult<Fingered> {
    let id = format!("{username}@{host}");
    let body = req
        .run(transport.finger(username, host))
        .await
        .context("finger", &id)?;
    parse_jrd(&body, username).context("finger", &id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dereferencing::testing::FakeTransport;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn first_valid_self_link_wins() {
        let b = body(json!({
            "subject": "acct:Alice@Social.Example",
            "links": [
                { "rel": "http://webfinger.net/rel/profile-page", "type": "text/html",
                  "href": "https://social.example/@alice" },
                { "rel": "self", "type": "text/html", "href": "https://social.example/wrong" },
                { "rel": "self", "type": "application/activity+json", "href": "not-a-url" },
                { "rel": "self", "type": "application/activity+json",
                  "href": "https://social.example/users/alice" },
                { "rel": "self", "type": "application/activity+json",
                  "href": "https://social.example/users/second" }
            ]
        }));
        let f = parse_jrd(&b, "alice").unwrap();
        assert_eq!(f.actor_uri, "https://social.example/users/alice");
        assert_eq!(f.domain, "social.example");
        assert_eq!(f.username, "Alice");
    }

    #[test]
    fn subject_mismatch_fails_despite_self_link() {
        let b = body(json!({
            "subject": "acct:mallory@social.example",
            "links": [{ "rel": "self", "type": "application/activity+json",
                        "href": "https://social.example/users/mallory" }]
        }));
        assert!(matches!(
            parse_jrd(&b, "alice"),
            Err(Cause::UsernameMismatch { .. })
        ));
    }

    #[test]
    fn no_usable_link_fails() {
        let b = body(json!({
            "subject": "acct:alice@social.example",
            "links": [{ "rel": "self", "type": "text/html", "href": "https://x/y" }]
        }));
        assert!(matches!(parse_jrd(&b, "alice"), Err(Cause::Invalid(_))));
    }

    #[test]
    fn missing_subject_fails() {
        let b = body(json!({ "links": [] }));
        assert!(parse_jrd(&b, "alice").is_err());
    }

    #[test]
    fn ld_json_profile_is_accepted() {
        let b = body(json!({
            "subject": "acct:alice@social.example",
            "links": [{ "rel": "self",
                        "type": "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
                        "href": "https://social.example/users/alice" }]
        }));
        assert!(parse_jrd(&b, "alice").is_ok());
    }

    fn alice_jrd() -> serde_json::Value {
        json!({
            "subject": "acct:alice@social.example",
            "links": [{ "rel": "self", "type": "application/activity+json",
                        "href": "https://social.example/users/alice" }]
        })
    }

    #[tokio::test]
    async fn finger_parses_transport_reply() {
        let transport = FakeTransport::default();
        transport
            .jrds
            .lock()
            .unwrap()
            .insert("alice@social.example".into(), alice_jrd());

        let f = finger(&transport, &Requester::new("bob"), "alice", "social.example")
            .await
            .unwrap();
        assert_eq!(f.actor_uri, "https://social.example/users/alice");
        assert_eq!(transport.calls(), vec!["finger:alice@social.example".to_string()]);
    }

    #[tokio::test]
    async fn finger_gives_up_when_cancelled() {
        let transport = FakeTransport::default();
        transport
            .jrds
            .lock()
            .unwrap()
            .insert("alice@social.example".into(), alice_jrd());
        let req = Requester::new("bob");
        req.cancel.cancel();

        let err = finger(&transport, &req, "alice", "social.example")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
