//! End-to-end resolution against a scripted remote.
//!
//! | Test | Checks |
//! |------|--------|
//! | `blocked_domain_makes_no_requests` | every resolver refuses a blocked host before any request |
//! | `concurrent_account_resolution_shares_one_fetch` | one requester, many callers, one dereference, one record |
//! | `concurrent_requesters_converge_on_one_record` | different requesters race, same stored id |
//! | `status_id_mismatch_is_rejected` | served `id` must equal the requested URI |
//! | `tombstone_is_unretrievable` | a `Tombstone` maps to the unretrievable kind |
//! | `webfinger_subject_mismatch_fails` | `alice@host` answered for `mallory` is refused |
//! | `key_rotation_is_refused_while_key_valid` | a changed key does not replace a valid one |
//! | `concurrent_emoji_fetch_image_once` | one image download for many callers |
//! | `forbidden_reply_is_removed_on_refresh` | a stored reply disappears when policy forbids it |

mod common;

use std::time::Duration;

use common::{node, node_with, note, person, Remote};
use serde_json::json;
use shadowfed::{ShadowAccount, ShadowEmoji, ShadowStatus, Visibility};
use shadowfed_deref::{Cause, ErrorKind, Requester, Storage};

const ALICE: &str = "https://a.example/users/alice";

// ---------------------------------------------------------------------------
// Domain blocks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocked_domain_makes_no_requests() {
    let n = node();
    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));
    n.storage.add_domain_block("a.example").await.unwrap();
    let req = Requester::new("bob");

    let err = n.deref.resolve_account(&req, ALICE).await.unwrap_err();
    assert!(err.is_domain_blocked());
    let err = n
        .deref
        .resolve_account_by_handle(&req, "alice", "a.example")
        .await
        .unwrap_err();
    assert!(err.is_domain_blocked());
    let err = n
        .deref
        .resolve_status(&req, "https://A.example/s/1")
        .await
        .unwrap_err();
    assert!(err.is_domain_blocked());
    assert!(n.deref.resolve_instance(&req, "a.example").await.is_err());

    assert!(n.remote.requests().is_empty(), "{:?}", n.remote.requests());
    assert!(n.storage.get_account_by_uri(ALICE).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_account_resolution_shares_one_fetch() {
    let n = node_with(Remote::slow(Duration::from_millis(50)));
    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let deref = n.deref.clone();
            tokio::spawn(async move { deref.resolve_account(&Requester::new("bob"), ALICE).await })
        })
        .collect();
    let mut ids = Vec::new();
    for t in tasks {
        let (acc, _) = t.await.unwrap().unwrap();
        ids.push(acc.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(n.remote.requests_for(ALICE), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requesters_converge_on_one_record() {
    let n = node_with(Remote::slow(Duration::from_millis(20)));
    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));

    let tasks: Vec<_> = ["bob", "carol", "dave", ""]
        .into_iter()
        .map(|who| {
            let deref = n.deref.clone();
            tokio::spawn(async move { deref.resolve_account(&Requester::new(who), ALICE).await })
        })
        .collect();
    let mut ids = Vec::new();
    for t in tasks {
        ids.push(t.await.unwrap().unwrap().0.id);
    }

    let stored = n.storage.get_account_by_uri(ALICE).await.unwrap().unwrap();
    assert!(ids.iter().all(|id| *id == stored.id), "{ids:?} vs {}", stored.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_emoji_fetch_image_once() {
    let n = node_with(Remote::slow(Duration::from_millis(30)));
    n.remote.serve_media("https://a.example/emoji/blob.png", b"\x89PNG");
    let candidate = || {
        ShadowEmoji::new(
            "blob",
            "a.example",
            "https://a.example/emoji/blob",
            "https://a.example/emoji/blob.png",
        )
    };

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let deref = n.deref.clone();
            let emoji = candidate();
            tokio::spawn(async move { deref.resolve_emoji(&Requester::new("bob"), emoji).await })
        })
        .collect();
    let mut ids = Vec::new();
    for t in tasks {
        let emoji = t.await.unwrap().unwrap();
        assert!(emoji.cached);
        ids.push(emoji.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(n.remote.media_fetches(), 1);
}

// ---------------------------------------------------------------------------
// Document checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_id_mismatch_is_rejected() {
    let n = node();
    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));
    n.remote.serve(
        "https://a.example/s/1",
        note("https://a.example/s/other", ALICE, None),
    );

    let err = n
        .deref
        .resolve_status(&Requester::new("bob"), "https://a.example/s/1")
        .await
        .unwrap_err();
    assert!(matches!(err.cause(), Cause::UriMismatch { .. }), "{err}");
    assert!(n
        .storage
        .get_status_by_uri("https://a.example/s/1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn tombstone_is_unretrievable() {
    let n = node();
    n.remote.serve(
        "https://a.example/s/1",
        json!({"type": "Tombstone", "id": "https://a.example/s/1"}),
    );
    let err = n
        .deref
        .resolve_status(&Requester::new("bob"), "https://a.example/s/1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unretrievable);
    assert!(err.is_unretrievable());
}

#[tokio::test]
async fn webfinger_subject_mismatch_fails() {
    let n = node();
    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));
    n.remote.serve_jrd(
        "alice@a.example",
        json!({
            "subject": "acct:mallory@a.example",
            "links": [{"rel": "self", "type": "application/activity+json", "href": ALICE}]
        }),
    );

    let err = n
        .deref
        .resolve_account_by_handle(&Requester::new("bob"), "alice", "a.example")
        .await
        .unwrap_err();
    assert!(matches!(err.cause(), Cause::UsernameMismatch { .. }), "{err}");
    assert_eq!(n.remote.requests_for(ALICE), 0);
}

#[tokio::test]
async fn key_rotation_is_refused_while_key_valid() {
    let n = node();
    let req = Requester::new("bob");
    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));
    let (first, _) = n.deref.resolve_account(&req, ALICE).await.unwrap();

    n.remote.serve(ALICE, person(ALICE, "alice", "k2"));
    let err = n.deref.refresh_account(&req, &first, true).await.unwrap_err();
    assert!(matches!(err.cause(), Cause::KeyRotationRefused(_)), "{err}");

    let stored = n.storage.get_account_by_uri(ALICE).await.unwrap().unwrap();
    assert_eq!(stored.public_key, first.public_key);
}

// ---------------------------------------------------------------------------
// Interaction policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forbidden_reply_is_removed_on_refresh() {
    let n = node();
    let req = Requester::new("bob");

    let owner = ShadowAccount::new("https://b.example/users/owner", "owner", "b.example");
    n.storage.put_account(&owner).await.unwrap();
    let mut parent = ShadowStatus::new("https://b.example/s/1", &owner);
    n.storage.put_status(&parent).await.unwrap();

    n.remote.serve(ALICE, person(ALICE, "alice", "k1"));
    n.remote.serve(
        "https://a.example/s/r",
        note("https://a.example/s/r", ALICE, Some("https://b.example/s/1")),
    );
    let (reply, _) = n.deref.resolve_status(&req, "https://a.example/s/r").await.unwrap();
    assert_eq!(reply.in_reply_to_id.as_deref(), Some(parent.id.as_str()));

    // The parent turns out to be a direct message alice was never party to.
    parent.visibility = Visibility::Direct;
    n.storage.update_status(&parent).await.unwrap();

    let err = n.deref.refresh_status(&req, &reply, true).await.unwrap_err();
    assert!(matches!(err.cause(), Cause::PolicyForbidden { .. }), "{err}");
    assert!(n
        .storage
        .get_status_by_uri("https://a.example/s/r")
        .await
        .unwrap()
        .is_none());
}
