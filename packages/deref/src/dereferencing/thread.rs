//! Whole-conversation backfill.
//!
//! Two phases, strictly in order:
//!
//! 1. **Ancestors.** Follow `inReplyTo` upwards, preferring stored linkage
//!    over a network hop. The first unreachable parent ends the walk
//!    quietly.
//! 2. **Descendants.** Starting from the topmost ancestor, walk replies
//!    collections depth-first with an explicit stack of pagers. Statuses on
//!    the local host are never fetched and local statuses are not
//!    expanded.
//!
//! Both phases share a visited set capped at `thread_max_statuses`. The
//! start status and its ancestors are fetched once on the way up and have
//! their replies expanded from storage on the way down.
//! Requests are issued one at a time.

use std::collections::{HashSet, VecDeque};

use shadowfed::ShadowStatus;

use super::collection::CollectionPager;
use super::{Dereferencer, Requester};
use crate::error::{DerefResult, ResultExt};

struct Frame<'a> {
    parent: String,
    pager: CollectionPager<'a>,
    queued: VecDeque<String>,
}

/// URIs touched during one traversal.
struct Visited {
    seen: HashSet<String>,
    max: usize,
}

impl Visited {
    fn new(max: usize) -> Self {
        Self {
            seen: HashSet::new(),
            max,
        }
    }

    /// Record `uri`. `None` when the cap is reached, else whether it was new.
    fn insert(&mut self, uri: &str) -> Option<bool> {
        if self.seen.contains(uri) {
            return Some(false);
        }
        if self.seen.len() >= self.max {
            return None;
        }
        self.seen.insert(uri.to_string());
        Some(true)
    }
}

impl Dereferencer {
    /// Resolve the conversation around `uri`: its ancestors, then every
    /// reachable remote reply below the topmost ancestor.
    ///
    /// Whatever was stored before a failure or cancellation stays stored.
    #[tracing::instrument(skip(self, req), fields(uri = %uri))]
    pub async fn resolve_thread(&self, req: &Requester, uri: &str) -> DerefResult<()> {
        let (start, _) = self
            .resolve_status(req, uri)
            .await
            .map_err(|e| e.context("resolve_thread", uri))?;

        let mut visited = Visited::new(self.config.thread_max_statuses.max(1));
        visited.insert(&start.uri);

        let ancestors = self
            .ancestors(req, &start, &mut visited)
            .await
            .map_err(|e| e.context("resolve_thread", uri))?;
        let root = ancestors.last().unwrap_or(&start).clone();
        tracing::debug!(
            "thread: {} ancestors above {uri}, descending from {}",
            ancestors.len(),
            root.uri
        );

        self.descendants(req, root, &mut visited)
            .await
            .map_err(|e| e.context("resolve_thread", uri))
    }

    /// Ancestors of `status`, nearest first.
    pub async fn walk_ancestors(
        &self,
        req: &Requester,
        status: &ShadowStatus,
    ) -> DerefResult<Vec<ShadowStatus>> {
        let mut visited = Visited::new(self.config.thread_max_statuses.max(1));
        visited.insert(&status.uri);
        self.ancestors(req, status, &mut visited)
            .await
            .map_err(|e| e.context("walk_ancestors", &status.uri))
    }

    async fn ancestors(
        &self,
        req: &Requester,
        status: &ShadowStatus,
        visited: &mut Visited,
    ) -> DerefResult<Vec<ShadowStatus>> {
        let mut out = Vec::new();
        let mut current = status.clone();

        while let Some(parent_uri) = current.in_reply_to_uri.clone() {
            match visited.insert(&parent_uri) {
                Some(true) => {}
                Some(false) => {
                    tracing::warn!("thread: reply cycle at {parent_uri}");
                    break;
                }
                None => {
                    tracing::warn!("thread: status cap reached walking up from {}", status.uri);
                    break;
                }
            }

            let stored = match &current.in_reply_to_id {
                Some(id) => self.storage.get_status_by_id(id).await,
                None => self.storage.get_status_by_uri(&parent_uri).await,
            }
            .context("walk_ancestors", &parent_uri)?;

            let parent = match stored {
                Some(p) => p,
                None if self.is_local_uri(&parent_uri) => {
                    tracing::debug!("thread: local parent {parent_uri} is not stored");
                    break;
                }
                None => match self.resolve_status(req, &parent_uri).await {
                    Ok((p, _)) => {
                        self.link_parent(&current, &p).await;
                        p
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::debug!("thread: ancestor {parent_uri} unreachable: {e}");
                        break;
                    }
                },
            };

            out.push(parent.clone());
            current = parent;
        }
        Ok(out)
    }

    /// Record the parent ids on a stored child that was resolved before
    /// its parent.
    async fn link_parent(&self, child: &ShadowStatus, parent: &ShadowStatus) {
        if child.in_reply_to_id.is_some() || child.local {
            return;
        }
        let Ok(Some(mut stored)) = self.storage.get_status_by_uri(&child.uri).await else {
            return;
        };
        stored.in_reply_to_id = Some(parent.id.clone());
        stored.in_reply_to_account_id = Some(parent.account_id.clone());
        if let Err(e) = self.storage.update_status(&stored).await {
            tracing::debug!("thread: linking {} to parent: {e}", child.uri);
        }
    }

    /// Open the replies pager for `status`, if it should be expanded.
    async fn open_replies(
        &self,
        req: &Requester,
        status: &ShadowStatus,
    ) -> DerefResult<Option<Frame<'_>>> {
        if status.local || self.is_local_uri(&status.uri) {
            return Ok(None);
        }
        let Some(replies) = status.replies_uri.as_deref() else {
            return Ok(None);
        };
        if self.is_local_uri(replies) {
            return Ok(None);
        }
        match self.dereference_collection(req, replies).await {
            Ok(pager) => Ok(Some(Frame {
                parent: status.uri.clone(),
                pager,
                queued: VecDeque::new(),
            })),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::debug!("thread: replies of {} unavailable: {e}", status.uri);
                Ok(None)
            }
        }
    }

    async fn descendants(
        &self,
        req: &Requester,
        root: ShadowStatus,
        visited: &mut Visited,
    ) -> DerefResult<()> {
        let mut stack: Vec<Frame<'_>> = Vec::new();
        // Statuses whose replies have been opened. The start status and its
        // ancestors are visited before descent but not yet expanded.
        let mut expanded: HashSet<String> = HashSet::new();
        expanded.insert(root.uri.clone());
        if let Some(frame) = self.open_replies(req, &root).await? {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let Some(child_uri) = frame.queued.pop_front() else {
                match frame.pager.next_page().await {
                    Ok(Some(items)) => frame.queued.extend(items),
                    Ok(None) => {
                        stack.pop();
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::debug!("thread: paging replies of {} failed: {e}", frame.parent);
                        stack.pop();
                    }
                }
                continue;
            };

            if self.is_local_uri(&child_uri) {
                continue;
            }
            if expanded.contains(&child_uri) {
                continue;
            }
            let child = match visited.insert(&child_uri) {
                Some(true) => match self.resolve_status(req, &child_uri).await {
                    Ok((child, _)) => child,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::debug!("thread: skipping reply {child_uri}: {e}");
                        continue;
                    }
                },
                // Seen on the way up: expand the stored copy.
                Some(false) => {
                    match self
                        .storage
                        .get_status_by_uri(&child_uri)
                        .await
                        .context("resolve_thread", &child_uri)?
                    {
                        Some(stored) => stored,
                        None => continue,
                    }
                }
                None => {
                    tracing::warn!(
                        "thread: status cap of {} reached, stopping descent",
                        visited.max
                    );
                    return Ok(());
                }
            };
            expanded.insert(child_uri);
            if let Some(frame) = self.open_replies(req, &child).await? {
                stack.push(frame);
            }
        }
        Ok(())
    }
}
