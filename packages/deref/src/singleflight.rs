//! Keyed de-duplication of in-flight work.
//!
//! For one key at most one call runs at a time. Callers arriving while it
//! runs wait and receive a clone of its result. The map lock is held only
//! to register or remove an entry, never across the work itself.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

pub struct SingleFlight<K, T> {
    inflight: Mutex<HashMap<K, watch::Receiver<Option<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Removes the leader's entry however the leader exits.
struct Unregister<'a, K: Eq + Hash, T> {
    flight: &'a SingleFlight<K, T>,
    key: Option<K>,
}

impl<K: Eq + Hash, T> Drop for Unregister<'_, K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.flight.map().remove(&key);
        }
    }
}

impl<K, T> SingleFlight<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<K, watch::Receiver<Option<T>>>> {
        // The map holds no invariant a panicking holder could break.
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Whether a call for `key` is running right now.
    pub fn contains(&self, key: &K) -> bool {
        self.map().contains_key(key)
    }

    /// Run `work` for `key`, or wait for the call already running.
    ///
    /// If the running call is dropped before finishing (its caller was
    /// cancelled), a waiter takes over and runs `work` itself.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let role = {
                let mut map = self.map();
                match map.get(&key) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        map.insert(key.clone(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _unregister = Unregister {
                        flight: self,
                        key: Some(key.clone()),
                    };
                    let out = work().await;
                    tx.send_replace(Some(out.clone()));
                    return out;
                }
                Role::Follower(mut rx) => {
                    if let Ok(done) = rx.wait_for(Option::is_some).await {
                        let out: Option<T> = (*done).clone();
                        if let Some(out) = out {
                            return out;
                        }
                    }
                    tracing::debug!("singleflight: leader went away, retrying");
                }
            }
        }
    }
}
