//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs (or is queued to run) to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is scheduled to re-run.
//!    Effects created on a [`Runtime`] wait for the next flush; the others
//!    re-run synchronously.
//!
//! 3. Before re-running, the effect checks that at least one source really
//!    produced a new version, then clears its old dependencies and tracks
//!    new ones during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Errors
//!
//! Effect bodies may fail. A failed run still records its dependencies, so
//! the effect runs again on the next change. Failures surface from
//! [`Effect::execute`] or from [`Runtime::flush`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::{ReactiveContext, TrackedSources};
use super::runtime::{Reactive, Runtime, Scheduled};
use super::subscriber::SubscriberId;
use crate::error::BoxError;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique effect ID.
fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type EffectFn = Box<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(|| {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    this: Weak<EffectInner>,
    run: EffectFn,
    /// Queue to re-run on. `None` re-runs synchronously.
    runtime: Option<Runtime>,
    sources: Mutex<TrackedSources>,
    disposed: AtomicBool,
    queued: AtomicBool,
    forced: AtomicBool,
    run_count: AtomicUsize,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish dependencies and re-runs
    /// synchronously whenever one of them changes.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);

        // Run immediately to establish dependencies
        effect.log_failure(effect.execute());

        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// Useful for cases where you want to control when the effect first runs.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(
            Box::new(move || -> Result<(), BoxError> {
                run();
                Ok(())
            }),
            None,
        )
    }

    /// Create a fallible effect that runs on `runtime`.
    ///
    /// The first run is queued, not performed here: it happens on the next
    /// [`Runtime::flush`], as do all re-runs.
    pub fn scheduled<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let effect = Self::build(Box::new(run), Some(runtime.clone()));
        effect.schedule();
        effect
    }

    fn build(run: EffectFn, runtime: Option<Runtime>) -> Self {
        let inner = Arc::new_cyclic(|this| EffectInner {
            id: next_effect_id(),
            subscriber_id: SubscriberId::new(),
            this: this.clone(),
            run,
            runtime,
            sources: Mutex::new(TrackedSources::new()),
            disposed: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            forced: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function now.
    ///
    /// This runs the function within a reactive context to track dependencies.
    pub fn execute(&self) -> Result<(), BoxError> {
        self.inner.execute()
    }

    /// Schedule the effect to re-run even if no dependency changed.
    pub fn schedule(&self) {
        self.inner.forced.store(true, Ordering::Release);
        self.inner.enqueue();
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again and holds no
    /// subscriptions.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.release_sources();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Acquire)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    fn log_failure(&self, result: Result<(), BoxError>) {
        if let Err(error) = result {
            tracing::error!(effect = self.inner.id, %error, "effect failed");
        }
    }
}

impl EffectInner {
    fn execute(&self) -> Result<(), BoxError> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }

        // Clear old dependencies
        self.release_sources();

        // Enter a reactive context to track dependencies
        let ctx = ReactiveContext::enter(self.subscriber_id, self.this.clone());
        let result = (self.run)();
        let sources = ctx.finish();

        if self.disposed.load(Ordering::Acquire) {
            // Disposed from inside its own run
            for tracked in &sources {
                tracked.source.unsubscribe(self.subscriber_id);
            }
        } else {
            *self.sources.lock() = sources;
        }

        self.run_count.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn release_sources(&self) {
        let sources = std::mem::take(&mut *self.sources.lock());
        for tracked in &sources {
            tracked.source.unsubscribe(self.subscriber_id);
        }
    }

    fn enqueue(&self) {
        if self.disposed.load(Ordering::Acquire) || self.queued.swap(true, Ordering::AcqRel) {
            return;
        }

        match &self.runtime {
            Some(runtime) => runtime.enqueue(self.this.clone()),
            None => {
                if let Err(error) = self.run_scheduled() {
                    tracing::error!(effect = self.id, %error, "effect failed");
                }
            }
        }
    }

    fn sources_changed(&self) -> bool {
        let sources = self.sources.lock().clone();
        sources.iter().any(|tracked| tracked.changed())
    }
}

impl Scheduled for EffectInner {
    fn run_scheduled(&self) -> Result<bool, BoxError> {
        self.queued.store(false, Ordering::Release);
        if self.disposed.load(Ordering::Acquire) {
            return Ok(false);
        }

        let forced = self.forced.swap(false, Ordering::AcqRel);
        let first_run = self.run_count.load(Ordering::Acquire) == 0;
        if !forced && !first_run && !self.sources_changed() {
            return Ok(false);
        }

        self.execute().map(|()| true)
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        self.enqueue();
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
