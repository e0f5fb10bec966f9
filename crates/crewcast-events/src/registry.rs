use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::subscriber::SubscriberId;

/// Copy-on-write set of live subscribers.
///
/// Readers take a [`Snapshot`] by cloning an `Arc`, so a broadcast never holds
/// the lock while it delivers. Writers clone the map only when a snapshot is
/// still alive.
///
/// Cloning a `Registry` yields another handle to the same set.
pub struct Registry<T> {
    entries: Arc<RwLock<Arc<BTreeMap<SubscriberId, T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Arc::new(BTreeMap::new()))),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates an empty registry that draws ids from the same counter as
    /// `other`, keeping handles unique across both.
    pub fn sharing_ids<U>(other: &Registry<U>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Arc::new(BTreeMap::new()))),
            next_id: Arc::clone(&other.next_id),
        }
    }

    pub fn register(&self, entry: T) -> SubscriberId {
        let id = SubscriberId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write();
        Arc::make_mut(&mut entries).insert(id, entry);
        id
    }

    /// Removes `id`. Unknown or already-removed ids are a no-op.
    pub fn unregister(&self, id: SubscriberId) -> Option<T> {
        let mut entries = self.entries.write();
        if !entries.contains_key(&id) {
            return None;
        }
        Arc::make_mut(&mut entries).remove(&id)
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            entries: Arc::clone(&self.entries.read()),
        }
    }

    /// Removes every entry at once, returning them in registration order.
    pub fn drain(&self) -> Vec<(SubscriberId, T)> {
        let mut entries = self.entries.write();
        let taken = std::mem::take(&mut *entries);
        match Arc::try_unwrap(taken) {
            Ok(map) => map.into_iter().collect(),
            Err(shared) => shared.iter().map(|(id, e)| (*id, e.clone())).collect(),
        }
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Point-in-time view of a [`Registry`].
///
/// Later registrations and removals do not show up here.
pub struct Snapshot<T> {
    entries: Arc<BTreeMap<SubscriberId, T>>,
}

impl<T> Snapshot<T> {
    /// Iterates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SubscriberId, &T)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
