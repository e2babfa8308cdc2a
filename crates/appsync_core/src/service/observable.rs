//! Read-only observable list owned by the sync service.
//!
//! # Invariants
//! - Only the owning service replaces the contents; readers get immutable
//!   `Arc<Vec<T>>` snapshots.
//! - Every replacement bumps `version` by one and is atomic.
//! - Observers run after the internal lock is released.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Callback receiving the replacement contents and their version.
pub type ListObserver<T> = Arc<dyn Fn(&Arc<Vec<T>>, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

struct ListState<T> {
    items: Arc<Vec<T>>,
    version: u64,
}

/// Wholesale-replaced list with change observers.
pub struct ObservableList<T> {
    state: RwLock<ListState<T>>,
    observers: Mutex<BTreeMap<ObserverId, ListObserver<T>>>,
    next_observer_id: AtomicU64,
}

/// Replacement already applied whose observers have not run yet.
#[must_use]
pub(crate) struct ListChange<T> {
    items: Arc<Vec<T>>,
    version: u64,
    observers: Vec<ListObserver<T>>,
}

impl<T> ListChange<T> {
    pub(crate) fn notify(self) {
        for observer in self.observers {
            observer(&self.items, self.version);
        }
    }
}

impl<T> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObservableList<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ListState {
                items: Arc::new(Vec::new()),
                version: 0,
            }),
            observers: Mutex::new(BTreeMap::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    /// Returns the latest contents.
    pub fn current(&self) -> Arc<Vec<T>> {
        Arc::clone(
            &self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .items,
        )
    }

    /// Number of replacements applied so far.
    pub fn version(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Registers a change observer; it does not fire for the current contents.
    pub fn observe(&self, observer: ListObserver<T>) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, observer);
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub(crate) fn replace(&self, items: Vec<T>) -> ListChange<T> {
        let (items, version) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.items = Arc::new(items);
            state.version += 1;
            (Arc::clone(&state.items), state.version)
        };
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        ListChange {
            items,
            version,
            observers,
        }
    }
}
