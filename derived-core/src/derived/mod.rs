//! Async Derived Values
//!
//! A derived value whose computation produces async sources (plain values,
//! deferred values or streams) instead of plain values. The latest settled
//! outcome is exposed as an ordinary reactive read.
//!
//! # Concepts
//!
//! ## State
//!
//! Every derived value owns an [`AsyncState`] cell: nothing settled yet, a
//! value, or an error. Only the funnel's sink (and the synchronous
//! bootstrap) ever write it.
//!
//! ## Funnel
//!
//! Each recomputation produces a new [`Source`]. The [`Funnel`] decides how
//! that source interacts with the ones still in flight, per [`Behavior`],
//! and writes every emission into the state.
//!
//! ## Driver
//!
//! An effect re-runs the computation whenever something it read changes,
//! passing the previous value (read untracked) and submitting the result.
//!
//! ## Output
//!
//! Readers see a computed projection of the state, [`DerivedAsync`], which
//! only notifies dependents when the caller's equality says the value
//! changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use derived_core::derived::{derive_async, DeriveOptions, Source};
//! use derived_core::reactive::{Runtime, Scope, Signal};
//!
//! let runtime = Runtime::new();
//! let scope = Scope::new(&runtime);
//! let user_id = Signal::new(1);
//!
//! let id = user_id.clone();
//! let user = derive_async(
//!     &scope,
//!     move |_previous| Ok(Source::deferred(fetch_user(id.get()))),
//!     DeriveOptions::new(),
//! )?;
//!
//! runtime.flush()?;
//! // Ok(None) until the fetch completes, then Ok(Some(user)).
//! let current = user.get();
//! ```

mod driver;
mod funnel;
mod gate;
mod options;
mod output;
mod source;
mod state;

use std::sync::Arc;

pub use driver::Computation;
pub use funnel::{Funnel, FunnelSubscription, Isolation, Sink};
pub use options::{Behavior, DeriveConfig, DeriveOptions, ValueEqualFn};
pub use output::{DerivedAsync, Reading};
pub use source::{Deferred, Source, SourceKind, SourceStream};
pub use state::AsyncState;

use driver::Driver;
use crate::error::{BoxError, DeriveError, SourceError};
use crate::reactive::{ReactiveHost, ReadCell, WriteCell};

/// Create a derived value on `host`.
///
/// The computation first runs on the host's next scheduling turn, then
/// again whenever anything it read changes. With `require_sync` and no
/// initial value it also runs once here, and setup fails unless that run
/// settles immediately.
///
/// Everything created here is released when the host's scope is torn
/// down. If setup fails, nothing outlives this call.
pub fn derive_async<T, H, F>(
    host: &H,
    computation: F,
    options: DeriveOptions<T>,
) -> Result<DerivedAsync<T>, DeriveError>
where
    T: Clone + Send + Sync + 'static,
    H: ReactiveHost + 'static,
    F: Fn(Option<T>) -> Result<Source<T>, SourceError> + Send + Sync + 'static,
{
    let DeriveOptions {
        initial_value,
        require_sync,
        behavior,
        equal,
    } = options;
    let gated = require_sync && initial_value.is_none();

    let state = host.cell(initial_value.map_or(AsyncState::NoValue, AsyncState::Value));
    let sink_state = state.clone();
    let funnel = Funnel::with_isolation(
        behavior,
        untracked_pass::<H>,
        move |emission: Result<T, SourceError>| {
            sink_state.set(AsyncState::from(emission));
        },
    );
    // Closes the funnel if anything below fails.
    let subscription = funnel.subscription();

    let computation: Arc<Computation<T>> = Arc::new(computation);
    let driver = Arc::new(Driver::new(computation.clone(), state.clone(), funnel.clone()));

    if gated {
        H::untracked(|| gate::bootstrap(&*computation, &*state, &funnel))?;
        driver.skip_next_submission();
    }

    host.on_teardown(move || subscription.unsubscribe());
    host.effect(move || driver.run::<H>().map_err(BoxError::from));

    let output = host.computed(move || state.get().read(), output::reading_equality(equal));
    tracing::debug!(%behavior, require_sync, gated, "derived async value created");

    Ok(DerivedAsync::new(output, behavior))
}

/// Sources may wake the funnel from inside another computation's frame.
fn untracked_pass<H: ReactiveHost>(pass: &mut dyn FnMut()) {
    H::untracked(pass)
}
