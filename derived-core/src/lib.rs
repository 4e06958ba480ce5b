//! Derived Core
//!
//! This crate provides reactive values derived from asynchronous
//! computations. It implements:
//!
//! - Async derived values with switch, merge, concat and exhaust flattening
//! - An optional synchronous-value requirement checked at setup
//! - A small fine-grained reactive runtime (signals, memos, effects, scopes)
//!   to host them
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `derived`: the async derived value, its state, funnel and options
//! - `reactive`: core reactive primitives and dependency tracking
//! - `error`: setup, source and flush errors
//!
//! The `derived` module only talks to the host through the
//! [`ReactiveHost`](reactive::ReactiveHost) trait; [`Scope`](reactive::Scope)
//! is the bundled implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use derived_core::{derive_async, DeriveOptions, Source};
//! use derived_core::reactive::{Runtime, Scope, Signal};
//!
//! let runtime = Runtime::new();
//! let scope = Scope::new(&runtime);
//! let query = Signal::new(String::from("rust"));
//!
//! let q = query.clone();
//! let results = derive_async(
//!     &scope,
//!     move |_previous| Ok(Source::deferred(search(q.get()))),
//!     DeriveOptions::new(),
//! )?;
//!
//! runtime.flush()?;
//! // A newer query supersedes a search still in flight.
//! query.set(String::from("tokio"));
//! runtime.flush()?;
//! ```

pub mod derived;
pub mod error;
pub mod reactive;

pub use derived::{
    derive_async, AsyncState, Behavior, DeriveConfig, DeriveOptions, DerivedAsync, Source,
};
pub use error::{DeriveError, FlushError, SourceError};
