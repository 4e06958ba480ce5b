//! Reactive Primitives
//!
//! This module implements the fine-grained reactive system the derived
//! values are hosted on: signals, memos, effects, and scopes.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only notifies further when the new
//! value is not equal to the old one.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects created on a [`Runtime`] are queued and run on
//! [`Runtime::flush`].
//!
//! ## Scopes
//!
//! A [`Scope`] owns effects and teardown callbacks and releases them together.
//! It also implements [`ReactiveHost`], the capability set the async-derived
//! values depend on.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency together with the
//! version that was read.

mod context;
mod effect;
mod host;
mod memo;
mod runtime;
mod scope;
mod signal;
mod subscriber;

pub use context::{ReactiveContext, TrackedSource, TrackedSources};
pub use effect::Effect;
pub use host::{EqualFn, ReactiveHost, ReadCell, WriteCell};
pub use memo::{Memo, MemoState};
pub use runtime::{Dependency, Reactive, Runtime};
pub use scope::Scope;
pub use signal::Signal;
pub use subscriber::{SubscriberId, Subscribers};
