//! Host Capabilities
//!
//! The async-derived machinery in [`crate::derived`] never names a concrete
//! signal or effect type. It asks for the small capability set below, which
//! any fine-grained reactive system can provide:
//!
//! - a settable cell
//! - a computed read with an equality function
//! - an effect that re-runs on dependency change
//! - untracked reads
//! - teardown registration
//!
//! [`Scope`](super::Scope) implements it on top of this crate's runtime.

use std::sync::Arc;

use super::{Memo, Signal};
use crate::error::BoxError;

/// Decides whether two values are the same for change notification.
pub type EqualFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A readable reactive cell.
pub trait ReadCell<V>: Send + Sync {
    /// Read the value, registering a dependency in the current context.
    fn get(&self) -> V;

    /// Read the value without registering a dependency.
    fn get_untracked(&self) -> V;
}

/// A reactive cell that can be written.
pub trait WriteCell<V>: ReadCell<V> {
    /// Replace the value and notify dependents.
    fn set(&self, value: V);
}

/// The reactive primitives a derived value is built from.
pub trait ReactiveHost {
    /// Create a settable cell.
    fn cell<V>(&self, initial: V) -> Arc<dyn WriteCell<V>>
    where
        V: Clone + Send + Sync + 'static;

    /// Create a lazily computed read that only notifies when `equal` says
    /// the value changed.
    fn computed<V, F>(&self, compute: F, equal: EqualFn<V>) -> Arc<dyn ReadCell<V>>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> V + Send + Sync + 'static;

    /// Register an effect. Its first run happens on the host's next
    /// scheduling turn, not inside this call.
    fn effect<F>(&self, run: F)
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static;

    /// Run `f` without tracking the reads it makes.
    fn untracked<R>(f: impl FnOnce() -> R) -> R;

    /// Run `teardown` when the owning scope is destroyed.
    fn on_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static;
}

impl<V> ReadCell<V> for Signal<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self) -> V {
        Signal::get(self)
    }

    fn get_untracked(&self) -> V {
        Signal::get_untracked(self)
    }
}

impl<V> WriteCell<V> for Signal<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn set(&self, value: V) {
        Signal::set(self, value);
    }
}

impl<V> ReadCell<V> for Memo<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self) -> V {
        Memo::get(self)
    }

    fn get_untracked(&self) -> V {
        Memo::get_untracked(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_twice<V>(cell: &dyn ReadCell<V>) -> (V, V) {
        (cell.get(), cell.get_untracked())
    }

    #[test]
    fn signal_is_a_write_cell() {
        let signal = Signal::new(1);
        let cell: Arc<dyn WriteCell<i32>> = Arc::new(signal.clone());

        cell.set(9);
        assert_eq!(signal.get(), 9);
        assert_eq!(cell.get_untracked(), 9);
        assert_eq!(read_twice(&signal), (9, 9));
    }

    #[test]
    fn memo_is_a_read_cell() {
        let signal = Signal::new(2);
        let signal_clone = signal.clone();
        let memo = Memo::new(move || signal_clone.get() * 10);
        let cell: Arc<dyn ReadCell<i32>> = Arc::new(memo);

        assert_eq!(read_twice(&*cell), (20, 20));
        signal.set(3);
        assert_eq!(cell.get(), 30);
    }
}
