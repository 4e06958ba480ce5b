//! Synchronization Gate
//!
//! With `require_sync` and no initial value, a derived value must already
//! hold something when setup returns. The gate runs the computation once,
//! up front, and refuses sources that cannot settle immediately.

use super::driver::Computation;
use super::funnel::Funnel;
use super::source::Source;
use super::state::AsyncState;
use crate::error::DeriveError;
use crate::reactive::{ReadCell, WriteCell};

/// Run the computation once and make sure the state settled.
///
/// Plain values are written straight to the state. Streams go through the
/// funnel and must emit (a value or an error) before `submit` returns.
pub(crate) fn bootstrap<T>(
    computation: &Computation<T>,
    state: &dyn WriteCell<AsyncState<T>>,
    funnel: &Funnel<T>,
) -> Result<(), DeriveError>
where
    T: Clone + Send + Sync + 'static,
{
    let source = computation(None).map_err(DeriveError::Computation)?;
    tracing::debug!(kind = ?source.kind(), "running synchronous bootstrap");

    match source {
        Source::Deferred(_) => Err(DeriveError::RequireSyncDeferred),
        Source::Value(value) => {
            state.set(AsyncState::Value(value));
            Ok(())
        }
        stream @ Source::Stream(_) => {
            funnel.submit(stream);
            if state.get_untracked().is_no_value() {
                return Err(DeriveError::RequireSyncNoEmission);
            }
            Ok(())
        }
    }
}
