//! Scopes
//!
//! A Scope owns the reactive resources created through it and releases them
//! together. Destroying a scope disposes its effects, then runs its teardown
//! callbacks in reverse registration order. Dropping the last handle to a
//! scope destroys it.
//!
//! `Scope` is also this crate's [`ReactiveHost`]: cells are [`Signal`]s,
//! computed reads are [`Memo`]s, and effects are queued on the scope's
//! [`Runtime`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::host::{EqualFn, ReactiveHost, ReadCell, WriteCell};
use super::{Effect, Memo, Runtime, Signal};
use crate::error::BoxError;

type Teardown = Box<dyn FnOnce() + Send>;

/// Owner of effects and teardown callbacks.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    runtime: Runtime,
    effects: Mutex<Vec<Effect>>,
    teardowns: Mutex<Vec<Teardown>>,
    destroyed: AtomicBool,
}

impl Scope {
    /// Create a scope whose effects run on `runtime`.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                runtime: runtime.clone(),
                effects: Mutex::new(Vec::new()),
                teardowns: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// The runtime this scope's effects are queued on.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Destroy the scope. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Number of effects owned by the scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.lock().len()
    }
}

impl ScopeInner {
    fn register_teardown(&self, teardown: Teardown) {
        if self.destroyed.load(Ordering::Acquire) {
            teardown();
            return;
        }
        self.teardowns.lock().push(teardown);
    }

    fn register_effect(&self, effect: Effect) {
        if self.destroyed.load(Ordering::Acquire) {
            effect.dispose();
            return;
        }
        self.effects.lock().push(effect);
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let effects = std::mem::take(&mut *self.effects.lock());
        for effect in &effects {
            effect.dispose();
        }

        let teardowns = std::mem::take(&mut *self.teardowns.lock());
        tracing::debug!(
            effects = effects.len(),
            teardowns = teardowns.len(),
            "scope destroyed"
        );
        for teardown in teardowns.into_iter().rev() {
            teardown();
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl ReactiveHost for Scope {
    fn cell<V>(&self, initial: V) -> Arc<dyn WriteCell<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        Arc::new(Signal::new(initial))
    }

    fn computed<V, F>(&self, compute: F, equal: EqualFn<V>) -> Arc<dyn ReadCell<V>>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> V + Send + Sync + 'static,
    {
        Arc::new(Memo::with_equality(compute, equal))
    }

    fn effect<F>(&self, run: F)
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let effect = Effect::scheduled(&self.inner.runtime, run);
        self.inner.register_effect(effect);
    }

    fn untracked<R>(f: impl FnOnce() -> R) -> R {
        ReactiveContext::untracked(f)
    }

    fn on_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.register_teardown(Box::new(teardown));
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("effects", &self.effect_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
