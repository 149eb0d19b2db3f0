//! Remote entities referenced by a post link, populated in the background.
//!
//! The extractor only knows an identifier when it sees a link to a subreddit,
//! post, comment or user. It hands out a [`Live`] cell for that identifier and
//! spawns a detached fetch that fills the cell in later. Readers must cope with
//! observing the cell both before and after it settles: poll [`Live::version`]
//! or block on [`Live::subscribe`].

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::reddit::{Comment, Post, Subreddit, User};

/// Source of full entity data for the identifiers found in links.
pub trait EntityFetcher: Send + Sync {
    fn fetch_subreddit(&self, name: &str) -> Result<Subreddit>;
    fn fetch_post(&self, id: &str) -> Result<Post>;
    fn fetch_comment(&self, id: &str) -> Result<Comment>;
    fn fetch_user(&self, name: &str) -> Result<User>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityState<T> {
    Unpopulated,
    Pending,
    Populated(T),
}

struct Slot<T> {
    state: EntityState<T>,
    version: u64,
    waiters: Vec<Sender<()>>,
}

struct Inner<T> {
    id: String,
    slot: Mutex<Slot<T>>,
}

/// Shared cell holding an identifier and, once fetched, the entity behind it.
///
/// Equality only looks at the identifier.
pub struct Live<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Live<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Live<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                slot: Mutex::new(Slot {
                    state: EntityState::Unpopulated,
                    version: 0,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_populated(&self) -> bool {
        matches!(self.inner.slot.lock().state, EntityState::Populated(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.slot.lock().state, EntityState::Pending)
    }

    /// Bumped on every state transition.
    pub fn version(&self) -> u64 {
        self.inner.slot.lock().version
    }

    /// One-shot signal that fires when the current fetch settles, or right
    /// away if nothing is in flight.
    pub fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        let mut slot = self.inner.slot.lock();
        if matches!(slot.state, EntityState::Pending) {
            slot.waiters.push(tx);
        } else {
            let _ = tx.send(());
        }
        rx
    }

    /// Blocks until the fetch settles or `timeout` elapses. Returns whether
    /// the cell is populated afterwards.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let _ = self.subscribe().recv_timeout(timeout);
        self.is_populated()
    }

    fn begin(&self) {
        let mut slot = self.inner.slot.lock();
        slot.state = EntityState::Pending;
        slot.version += 1;
    }

    fn settle(&self, value: Option<T>) {
        let waiters = {
            let mut slot = self.inner.slot.lock();
            slot.state = match value {
                Some(value) => EntityState::Populated(value),
                None => EntityState::Unpopulated,
            };
            slot.version += 1;
            std::mem::take(&mut slot.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl<T: Clone> Live<T> {
    pub fn get(&self) -> Option<T> {
        match &self.inner.slot.lock().state {
            EntityState::Populated(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> EntityState<T> {
        self.inner.slot.lock().state.clone()
    }
}

impl<T> PartialEq for Live<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Live<T> {}

impl<T> fmt::Debug for Live<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        let state = match slot.state {
            EntityState::Unpopulated => "unpopulated",
            EntityState::Pending => "pending",
            EntityState::Populated(_) => "populated",
        };
        f.debug_struct("Live")
            .field("id", &self.inner.id)
            .field("state", &state)
            .field("version", &slot.version)
            .finish()
    }
}

impl<T: Serialize> Serialize for Live<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let slot = self.inner.slot.lock();
        let entity = match &slot.state {
            EntityState::Populated(value) => Some(value),
            _ => None,
        };
        let mut out = serializer.serialize_struct("Live", 3)?;
        out.serialize_field("id", &self.inner.id)?;
        out.serialize_field("populated", &entity.is_some())?;
        out.serialize_field("entity", &entity)?;
        out.end()
    }
}

/// Marks `live` pending and fills it from `fetch` on a detached thread.
/// Failures are logged and leave the cell unpopulated.
pub(crate) fn spawn_fetch<T, F>(live: &Live<T>, kind: &'static str, fetch: F)
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    live.begin();
    let cell = live.clone();
    let spawned = thread::Builder::new()
        .name(format!("self-fetch-{}", kind))
        .spawn(move || match fetch() {
            Ok(value) => {
                debug!(kind, id = cell.id(), "self-fetch complete");
                cell.settle(Some(value));
            }
            Err(err) => {
                warn!(kind, id = cell.id(), error = ?err, "self-fetch failed");
                cell.settle(None);
            }
        });
    if let Err(err) = spawned {
        warn!(kind, id = live.id(), error = %err, "self-fetch thread spawn failed");
        live.settle(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn new_cell_is_settled_and_empty() {
        let live: Live<String> = Live::new("abc");
        assert_eq!(live.id(), "abc");
        assert!(!live.is_populated());
        assert_eq!(live.version(), 0);
        assert!(live.subscribe().try_recv().is_ok());
    }

    #[test]
    fn successful_fetch_populates_and_notifies() {
        let live: Live<String> = Live::new("pics");
        let (gate_tx, gate_rx) = bounded::<()>(1);
        spawn_fetch(&live, "test", move || {
            gate_rx.recv().ok();
            Ok("payload".to_string())
        });
        assert!(live.is_pending());
        let done = live.subscribe();
        assert!(done.try_recv().is_err());
        gate_tx.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(live.get().as_deref(), Some("payload"));
        assert_eq!(live.version(), 2);
    }

    #[test]
    fn failed_fetch_stays_unpopulated() {
        let live: Live<String> = Live::new("gone");
        spawn_fetch(&live, "test", || Err(anyhow!("boom")));
        assert!(!live.wait_timeout(Duration::from_secs(5)));
        assert_eq!(live.state(), EntityState::Unpopulated);
        assert_eq!(live.version(), 2);
    }

    #[test]
    fn equality_ignores_contents() {
        let fetched: Live<String> = Live::new("same");
        fetched.settle(Some("data".into()));
        let empty: Live<String> = Live::new("same");
        assert_eq!(fetched, empty);
        assert_ne!(fetched, Live::new("other"));
    }

    #[test]
    fn serializes_snapshot() {
        let live: Live<String> = Live::new("u1");
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["populated"], false);
        assert!(json["entity"].is_null());

        live.settle(Some("name".into()));
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["populated"], true);
        assert_eq!(json["entity"], "name");
    }
}
