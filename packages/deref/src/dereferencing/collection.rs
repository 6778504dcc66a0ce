//! Paging through remote collections.
//!
//! Nothing here is persisted. A [`CollectionPager`] hands back item ids one
//! page at a time; callers resolve whatever they need from them.
//!
//! Paging rules:
//! - the head's own items come first, then its `first` page, then `next`
//!   links in order;
//! - `first` and `next` may be embedded objects or IRIs;
//! - a page reached through `next` with no items ends paging, as does a
//!   missing `next` or a page id already seen.

use std::collections::HashSet;

use shadowfed_wire::{Collection, CollectionKind, IriOrObject, Vocab};

use super::{Dereferencer, Requester};
use crate::error::{Cause, DerefResult};

enum Pending {
    Head(Box<Collection>),
    Page {
        source: IriOrObject<Collection>,
        via_next: bool,
    },
}

pub struct CollectionPager<'a> {
    deref: &'a Dereferencer,
    req: Requester,
    uri: String,
    kind: CollectionKind,
    total_items: Option<u64>,
    pending: Option<Pending>,
    seen: HashSet<String>,
}

impl<'a> CollectionPager<'a> {
    fn new(
        deref: &'a Dereferencer,
        req: Requester,
        uri: &str,
        kind: CollectionKind,
        head: Collection,
    ) -> Self {
        let mut seen = HashSet::new();
        seen.insert(uri.to_string());
        if let Some(id) = &head.id {
            seen.insert(id.clone());
        }
        Self {
            deref,
            req,
            uri: uri.to_string(),
            kind,
            total_items: head.total_items,
            pending: Some(Pending::Head(Box::new(head))),
            seen,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// `totalItems` as declared by the head document.
    pub fn total_items(&self) -> Option<u64> {
        self.total_items
    }

    /// Item ids of the next page, or `None` when paging is over.
    pub async fn next_page(&mut self) -> DerefResult<Option<Vec<String>>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };

        let (page, via_next, head) = match pending {
            Pending::Head(c) => (*c, false, true),
            Pending::Page {
                source: IriOrObject::Object(c),
                via_next,
            } => (*c, via_next, false),
            Pending::Page {
                source: IriOrObject::Iri(iri),
                via_next,
            } => {
                let (_, page) = self
                    .deref
                    .fetch_collection(&self.req, &iri)
                    .await
                    .map_err(|e| e.context("next_page", &self.uri))?;
                (page, via_next, false)
            }
        };

        let items: Vec<String> = page
            .items()
            .filter_map(|i| i.id())
            .map(str::to_string)
            .collect();
        if via_next && items.is_empty() {
            tracing::debug!("collection: empty page ends {}", self.uri);
            return Ok(None);
        }

        let follow = if head {
            match page.first {
                Some(first) => Some((first, false)),
                None => page.next.map(|n| (n, true)),
            }
        } else {
            page.next.map(|n| (n, true))
        };
        if let Some((source, via_next)) = follow {
            match source.iri() {
                Some(id) if !self.seen.insert(id.to_string()) => {
                    tracing::debug!("collection: page {id} repeats in {}", self.uri);
                }
                _ => self.pending = Some(Pending::Page { source, via_next }),
            }
        }

        Ok(Some(items))
    }

    /// Drain up to `limit` item ids.
    pub async fn collect_ids(mut self, limit: usize) -> DerefResult<Vec<String>> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.next_page().await? {
                Some(items) => out.extend(items),
                None => break,
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}

impl Dereferencer {
    /// Fetch a collection's head document and return a pager over it.
    #[tracing::instrument(skip(self, req), fields(uri = %uri))]
    pub async fn dereference_collection(
        &self,
        req: &Requester,
        uri: &str,
    ) -> DerefResult<CollectionPager<'_>> {
        let (kind, head) = self
            .fetch_collection(req, uri)
            .await
            .map_err(|e| e.context("dereference_collection", uri))?;
        Ok(CollectionPager::new(self, req.clone(), uri, kind, head))
    }

    pub(crate) async fn fetch_collection(
        &self,
        req: &Requester,
        uri: &str,
    ) -> DerefResult<(CollectionKind, Collection)> {
        self.gate.check_uri(uri).await?;
        let resp = self.fetch_document(req, uri).await?;
        match Vocab::decode(&resp.body)? {
            Vocab::Collection(kind, c) => Ok((kind, c)),
            other => Err(Cause::WrongType {
                expected: "collection",
                actual: other.type_name().to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dereferencing::testing::harness;
    use serde_json::json;

    const C: &str = "https://a.example/s/1/replies";

    #[tokio::test]
    async fn embedded_first_then_next_iri() {
        let h = harness();
        h.transport.doc(
            C,
            json!({
                "type": "Collection", "id": C,
                "first": {
                    "type": "CollectionPage",
                    "items": ["https://a.example/s/2"],
                    "next": "https://a.example/s/1/replies?page=2"
                }
            }),
        );
        h.transport.doc(
            "https://a.example/s/1/replies?page=2",
            json!({
                "type": "CollectionPage",
                "id": "https://a.example/s/1/replies?page=2",
                "items": [{"id": "https://a.example/s/3", "type": "Note"}],
                "next": "https://a.example/s/1/replies?page=3"
            }),
        );
        h.transport.doc(
            "https://a.example/s/1/replies?page=3",
            json!({"type": "CollectionPage", "items": [],
                   "next": "https://a.example/s/1/replies?page=4"}),
        );

        let pager = h
            .deref
            .dereference_collection(&Requester::new("alice"), C)
            .await
            .unwrap();
        let ids = pager.collect_ids(100).await.unwrap();
        assert_eq!(ids, vec!["https://a.example/s/2", "https://a.example/s/3"]);
        assert!(!h.transport.calls().iter().any(|c| c.ends_with("page=4")));
    }

    #[tokio::test]
    async fn repeated_page_stops() {
        let h = harness();
        h.transport.doc(
            C,
            json!({"type": "OrderedCollectionPage", "id": C,
                   "orderedItems": ["https://a.example/s/2"], "next": C}),
        );
        let ids = h
            .deref
            .dereference_collection(&Requester::new("alice"), C)
            .await
            .unwrap()
            .collect_ids(100)
            .await
            .unwrap();
        assert_eq!(ids, vec!["https://a.example/s/2"]);
        assert_eq!(h.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn non_collection_is_wrong_type() {
        let h = harness();
        h.transport.doc(C, json!({"type": "Note", "id": C}));
        let err = h
            .deref
            .dereference_collection(&Requester::new("alice"), C)
            .await
            .err()
            .unwrap();
        assert!(matches!(err.cause(), Cause::WrongType { expected: "collection", .. }));
    }
}
