//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes memos and effects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::runtime::Reactive;

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, effect, or other reactive computation) gets a unique
/// ID when created. This ID is used to track dependencies and avoid duplicate
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The computations subscribed to one reactive source.
///
/// Entries are weak so a subscription never keeps a computation alive.
/// Insertion order is kept, which makes notification order deterministic.
#[derive(Default)]
pub struct Subscribers {
    entries: Mutex<IndexMap<SubscriberId, Weak<dyn Reactive>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Re-inserting an existing ID is a no-op.
    pub fn insert(&self, id: SubscriberId, reactive: Weak<dyn Reactive>) {
        self.entries.lock().entry(id).or_insert(reactive);
    }

    /// Remove a subscriber.
    pub fn remove(&self, id: SubscriberId) {
        self.entries.lock().shift_remove(&id);
    }

    /// Get the number of subscribers, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell every live subscriber that the source may have changed.
    ///
    /// Dropped subscribers are pruned. The lock is released before any
    /// subscriber runs, so subscribers may freely re-subscribe.
    pub fn notify(&self) {
        let live: SmallVec<[Arc<dyn Reactive>; 4]> = {
            let mut entries = self.entries.lock();
            entries.retain(|_, weak| weak.strong_count() > 0);
            entries.values().filter_map(Weak::upgrade).collect()
        };

        for reactive in live {
            reactive.mark_maybe_dirty();
        }
    }
}
