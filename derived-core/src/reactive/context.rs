//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the subscriber onto the stack. When the computation completes, we pop it.
//!
//! Untracked sections push a frame without a subscriber. Reads made while
//! such a frame is on top register nothing, even if a tracking frame sits
//! further down the stack.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use super::runtime::{Dependency, Reactive};
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// A source read during a computation, with the version that was observed.
#[derive(Clone)]
pub struct TrackedSource {
    pub source: Arc<dyn Dependency>,
    pub version: u64,
}

impl TrackedSource {
    /// Whether the source moved past the observed version.
    ///
    /// Derived sources are brought up to date first.
    pub fn changed(&self) -> bool {
        self.source.refresh() != self.version
    }
}

pub type TrackedSources = SmallVec<[TrackedSource; 4]>;

#[derive(Clone)]
struct Observer {
    id: SubscriberId,
    reactive: Weak<dyn Reactive>,
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// `None` for untracked frames.
    observer: Option<Observer>,
    /// Sources read during this computation, deduplicated.
    dependencies: TrackedSources,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any signals that are read will
    /// register the subscriber as a dependent.
    pub fn enter(subscriber_id: SubscriberId, reactive: Weak<dyn Reactive>) -> Self {
        Self::push(Some(Observer {
            id: subscriber_id,
            reactive,
        }))
    }

    /// Enter a frame in which reads are not tracked.
    pub fn enter_untracked() -> Self {
        Self::push(None)
    }

    /// Run `f` without tracking any reads it makes.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::enter_untracked();
        f()
    }

    fn push(observer: Option<Observer>) -> Self {
        let subscriber_id = observer.as_ref().map(|o| o.id);
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer,
                dependencies: SmallVec::new(),
            });
        });

        Self {
            subscriber_id,
            finished: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if reads are being tracked.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.observer.as_ref().map(|o| o.id))
        })
    }

    /// Record a read of `source` at `version`.
    ///
    /// Returns the subscriber the source should notify, or `None` when the
    /// read is untracked.
    pub fn track(
        source: Arc<dyn Dependency>,
        version: u64,
    ) -> Option<(SubscriberId, Weak<dyn Reactive>)> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let observer = entry.observer.clone()?;

            let seen = entry
                .dependencies
                .iter()
                .any(|d| same_source(&d.source, &source));
            if !seen {
                entry.dependencies.push(TrackedSource { source, version });
            }

            Some((observer.id, observer.reactive))
        })
    }

    /// Get the number of dependencies collected in the current context.
    pub fn dependency_count() -> usize {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.len())
                .unwrap_or_default()
        })
    }

    /// Leave the context and hand back everything that was read in it.
    pub fn finish(mut self) -> TrackedSources {
        self.finished = true;
        self.pop().map(|entry| entry.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            if let Some(entry) = &popped {
                debug_assert_eq!(
                    entry.observer.as_ref().map(|o| o.id),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
            popped
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

fn same_source(a: &Arc<dyn Dependency>, b: &Arc<dyn Dependency>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
