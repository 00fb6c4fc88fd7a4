//! Service registries.
//!
//! A registry is an ordered map of live services keyed by id, guarded by one
//! registry-wide lock. Entries are shared handles: per-entry state lives
//! behind the entry's own synchronization, so the registry lock is only ever
//! held for short, non-blocking traversals and mutations.
//!
//! Ids are handed out in connection order, so iteration order (by id) is
//! also join order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Map of live entries, ordered by id.
pub type Entries<T> = BTreeMap<u64, Arc<T>>;

/// Registry of live services of one kind.
#[derive(Debug)]
pub struct Registry<T> {
    /// Human readable kind, used in log fields
    kind: &'static str,

    entries: Mutex<Entries<T>>,

    next_id: AtomicU64,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocates the id for a new entry.
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds an entry under `id`.
    pub async fn insert(&self, id: u64, entry: Arc<T>) {
        let mut entries = self.entries.lock().await;
        entries.insert(id, entry);
        debug!(kind = self.kind, id, count = entries.len(), "Registered service");
    }

    /// Removes the entry under `id`, returning it if it was present.
    pub async fn remove(&self, id: u64) -> Option<Arc<T>> {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(&id);
        if removed.is_some() {
            debug!(kind = self.kind, id, count = entries.len(), "Deregistered service");
        } else {
            debug!(kind = self.kind, id, "Service already deregistered");
        }
        removed
    }

    /// Locks the registry for traversal.
    ///
    /// Callers must not hold the guard across a blocking wait.
    pub async fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries.lock().await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, id: u64) -> bool {
        self.entries.lock().await.contains_key(&id)
    }
}
