use payloads::EntityId;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Ids checked in one table. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: Arc<Mutex<BTreeSet<EntityId>>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<EntityId>> {
        // a panic while holding the lock cannot leave a set half-updated
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Flip one row. Returns whether it is now selected.
    pub fn toggle(&self, id: EntityId) -> bool {
        let mut ids = self.lock();
        if ids.remove(&id) {
            false
        } else {
            ids.insert(id);
            true
        }
    }

    pub fn set(&self, ids: impl IntoIterator<Item = EntityId>) {
        *self.lock() = ids.into_iter().collect();
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.lock().iter().copied().collect()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.lock().contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
