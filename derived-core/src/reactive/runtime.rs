//! Reactive Runtime
//!
//! The runtime is the scheduling half of the reactive system: it owns the
//! queue of effects waiting to re-run and drains it on [`Runtime::flush`].
//!
//! # How It Works
//!
//! 1. When a signal changes, it notifies its subscribers directly.
//!
//! 2. Memos mark themselves "maybe dirty" and forward the notification to
//!    their own subscribers. They recompute lazily, on the next read.
//!
//! 3. Effects created on a runtime enqueue themselves here. Effects created
//!    without one re-run synchronously instead.
//!
//! 4. `flush` runs the queued effects. Each effect first checks whether any
//!    of its sources actually produced a new version, so a memo that
//!    recomputed to an equal value does not re-run its dependents.
//!
//! # Thread Safety
//!
//! Runtime handles are cheap to clone and can be shared across threads, but
//! scheduling is cooperative: effects only ever run inside `flush` (or inline
//! for runtime-less effects), one at a time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::subscriber::SubscriberId;
use crate::error::{BoxError, FlushError};

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    fn mark_maybe_dirty(&self);
}

/// A reactive value that computations can depend on.
pub trait Dependency: Send + Sync {
    /// Bring the value up to date and return its version.
    ///
    /// The version only moves when the value actually changed.
    fn refresh(&self) -> u64;

    /// Stop notifying the given subscriber.
    fn unsubscribe(&self, subscriber_id: SubscriberId);
}

/// Work the runtime can run during a flush.
pub(crate) trait Scheduled: Send + Sync {
    /// Run if still needed. Returns whether anything ran.
    fn run_scheduled(&self) -> Result<bool, BoxError>;
}

/// Handle to an effect queue.
///
/// Each runtime is independent; effects only run when the runtime they were
/// created on is flushed.
#[derive(Clone, Default)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

#[derive(Default)]
struct RuntimeInner {
    queue: Mutex<VecDeque<Weak<dyn Scheduled>>>,
    flushing: AtomicBool,
}

/// Clears the flushing flag even if an effect panics.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue(&self, effect: Weak<dyn Scheduled>) {
        self.inner.queue.lock().push_back(effect);
    }

    /// Number of effects waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Effects queued while flushing run in the same flush. A failing effect
    /// does not stop the others; every failure is reported in the returned
    /// [`FlushError`]. Returns the number of effects that actually ran.
    /// Calling `flush` from inside an effect is a no-op.
    pub fn flush(&self) -> Result<usize, FlushError> {
        if self.inner.flushing.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }
        let _guard = FlushGuard(&self.inner.flushing);

        let mut ran = 0;
        let mut errors = Vec::new();

        loop {
            let next = self.inner.queue.lock().pop_front();
            let Some(weak) = next else { break };
            let Some(effect) = weak.upgrade() else { continue };

            match effect.run_scheduled() {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(error) => {
                    ran += 1;
                    tracing::error!(%error, "effect failed during flush");
                    errors.push(error);
                }
            }
        }

        if errors.is_empty() {
            Ok(ran)
        } else {
            Err(FlushError { errors })
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pending", &self.pending())
            .field("flushing", &self.inner.flushing.load(Ordering::Acquire))
            .finish()
    }
}
