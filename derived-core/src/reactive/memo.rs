//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked "maybe dirty" and passes
//!    the notification on to its own subscribers.
//!
//! 4. On next access, the memo re-checks if inputs actually changed by
//!    comparing their versions against the ones it recorded.
//!
//! 5. If inputs changed, recompute. The memo's own version only moves when
//!    the new value is not equal to the cached one, so dependents of a memo
//!    that recomputed to an equal value stay clean.
//!
//! # Thread Safety
//!
//! Memos are thread-safe. No lock is held while the computation runs.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::context::{ReactiveContext, TrackedSources};
use super::host::EqualFn;
use super::runtime::{Dependency, Reactive};
use super::subscriber::{SubscriberId, Subscribers};

/// Counter for generating unique memo IDs.
static MEMO_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique memo ID.
fn next_memo_id() -> u64 {
    MEMO_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. Need to check.
    MaybeDirty,

    /// The memo definitely needs to recompute.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Change detection uses an equality function: `PartialEq` for
/// [`Memo::new`], or any caller-supplied function for
/// [`Memo::with_equality`].
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    id: u64,
    subscriber_id: SubscriberId,
    this: Weak<MemoInner<T>>,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    equal: EqualFn<T>,
    /// `None` until first computed.
    value: RwLock<Option<T>>,
    state: Mutex<MemoState>,
    version: AtomicU64,
    /// Sources read during the last computation.
    sources: Mutex<TrackedSources>,
    subscribers: Subscribers,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::with_equality(compute, Arc::new(|a: &T, b: &T| a == b))
    }

    /// Create a memo that uses `equal` to decide whether a recomputed value
    /// counts as a change.
    pub fn with_equality<F>(compute: F, equal: EqualFn<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| MemoInner {
            id: next_memo_id(),
            subscriber_id: SubscriberId::new(),
            this: this.clone(),
            compute: Box::new(compute),
            equal,
            value: RwLock::new(None),
            state: Mutex::new(MemoState::Dirty),
            version: AtomicU64::new(0),
            sources: Mutex::new(TrackedSources::new()),
            subscribers: Subscribers::new(),
        });

        Self { inner }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        let version = self.inner.refresh();

        let source: Arc<dyn Dependency> = self.inner.clone();
        if let Some((id, reactive)) = ReactiveContext::track(source, version) {
            self.inner.subscribers.insert(id, reactive);
        }

        self.inner.cached()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.refresh();
        self.inner.cached()
    }

    /// Mark the memo as potentially needing recomputation.
    ///
    /// Called when a dependency changes.
    pub fn mark_maybe_dirty(&self) {
        Reactive::mark_maybe_dirty(&*self.inner);
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.lock() = MemoState::Dirty;
        self.inner.subscribers.notify();
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.lock()
    }

    /// Get the number of times the value changed.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn cached(&self) -> T {
        self.value
            .read()
            .clone()
            .expect("refreshed memo should have a value")
    }

    /// Recompute the memo's value.
    ///
    /// This runs the computation function within a reactive context to
    /// track dependencies.
    fn recompute(&self) {
        // Drop old subscriptions; the reads below re-register the live ones
        let previous = std::mem::take(&mut *self.sources.lock());
        for tracked in &previous {
            tracked.source.unsubscribe(self.subscriber_id);
        }

        // Clean before computing so a change arriving mid-computation is kept
        *self.state.lock() = MemoState::Clean;

        let ctx = ReactiveContext::enter(self.subscriber_id, self.this.clone());
        let new_value = (self.compute)();
        *self.sources.lock() = ctx.finish();

        let changed = match &*self.value.read() {
            Some(current) => !(self.equal)(current, &new_value),
            None => true,
        };

        if changed {
            *self.value.write() = Some(new_value);
            self.version.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl<T> Dependency for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn refresh(&self) -> u64 {
        let state = *self.state.lock();

        let stale = match state {
            MemoState::Clean => false,
            MemoState::Dirty => true,
            MemoState::MaybeDirty => {
                let sources = self.sources.lock().clone();
                sources.iter().any(|tracked| tracked.changed())
            }
        };

        if stale {
            self.recompute();
        } else if state == MemoState::MaybeDirty {
            *self.state.lock() = MemoState::Clean;
        }

        self.version.load(Ordering::Acquire)
    }

    fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.subscribers.remove(subscriber_id);
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        {
            let mut state = self.state.lock();
            if *state != MemoState::Clean {
                return;
            }
            *state = MemoState::MaybeDirty;
        }
        self.subscribers.notify();
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
