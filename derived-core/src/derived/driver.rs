//! Recomputation Driver
//!
//! The body of the effect that keeps a derived value current: read the
//! previous value without tracking it, run the computation (tracking only
//! what the computation itself reads), and hand the result to the funnel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::funnel::Funnel;
use super::source::Source;
use super::state::AsyncState;
use crate::error::SourceError;
use crate::reactive::{ReactiveHost, ReadCell, WriteCell};

/// The user computation: previous value in, next source out.
pub type Computation<T> = dyn Fn(Option<T>) -> Result<Source<T>, SourceError> + Send + Sync;

pub(crate) struct Driver<T> {
    computation: Arc<Computation<T>>,
    state: Arc<dyn WriteCell<AsyncState<T>>>,
    funnel: Funnel<T>,
    skip_next: AtomicBool,
}

impl<T> Driver<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        computation: Arc<Computation<T>>,
        state: Arc<dyn WriteCell<AsyncState<T>>>,
        funnel: Funnel<T>,
    ) -> Self {
        Self {
            computation,
            state,
            funnel,
            skip_next: AtomicBool::new(false),
        }
    }

    /// Discard the result of the next run. Its reads are still tracked.
    pub(crate) fn skip_next_submission(&self) {
        self.skip_next.store(true, Ordering::Release);
    }

    /// One recomputation cycle.
    ///
    /// A computation error aborts the cycle before anything is submitted and
    /// is handed back to the caller; the state is left as it was. A pending
    /// skip is used up by the cycle either way.
    pub(crate) fn run<H: ReactiveHost>(&self) -> Result<(), SourceError> {
        let skip = self.skip_next.swap(false, Ordering::AcqRel);
        let previous = H::untracked(|| self.state.get().previous());
        let source = (self.computation)(previous)?;

        if skip {
            tracing::debug!(kind = ?source.kind(), "discarding first run after synchronous setup");
            return Ok(());
        }

        H::untracked(|| self.funnel.submit(source));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::Behavior;
    use crate::reactive::{Effect, Runtime, Scope, Signal};
    use std::sync::atomic::AtomicUsize;

    fn computation<F>(f: F) -> Arc<Computation<i32>>
    where
        F: Fn(Option<i32>) -> Result<Source<i32>, SourceError> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    fn state_and_funnel(behavior: Behavior) -> (Signal<AsyncState<i32>>, Funnel<i32>) {
        let state = Signal::new(AsyncState::NoValue);
        let sink_state = state.clone();
        let funnel = Funnel::new(behavior, move |emission: Result<i32, SourceError>| {
            sink_state.set(emission.into())
        });
        (state, funnel)
    }

    #[test]
    fn run_passes_previous_value_and_submits() {
        let (state, funnel) = state_and_funnel(Behavior::Switch);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let driver = Driver::new(
            computation(move |previous| {
                seen_clone.lock().push(previous);
                Ok(Source::value(previous.unwrap_or(0) + 1))
            }),
            Arc::new(state.clone()),
            funnel,
        );

        driver.run::<Scope>().unwrap();
        driver.run::<Scope>().unwrap();

        assert_eq!(*seen.lock(), vec![None, Some(1)]);
        assert_eq!(state.get_untracked().previous(), Some(2));
    }

    #[test]
    fn computation_error_leaves_state_untouched() {
        let (state, funnel) = state_and_funnel(Behavior::Switch);
        state.set(AsyncState::value(5));

        let driver = Driver::new(
            computation(|_| Err(SourceError::msg("no input"))),
            Arc::new(state.clone()),
            funnel.clone(),
        );

        let err = driver.run::<Scope>().unwrap_err();
        assert_eq!(err.to_string(), "no input");
        assert_eq!(state.get_untracked().previous(), Some(5));
        assert_eq!(funnel.in_flight(), 0);
    }

    #[test]
    fn skipped_run_still_calls_computation() {
        let (state, funnel) = state_and_funnel(Behavior::Switch);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let driver = Driver::new(
            computation(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Source::value(9))
            }),
            Arc::new(state.clone()),
            funnel,
        );

        driver.skip_next_submission();
        driver.run::<Scope>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(state.get_untracked().is_no_value());

        driver.run::<Scope>().unwrap();
        assert_eq!(state.get_untracked().previous(), Some(9));
    }

    #[test]
    fn failed_skipped_run_does_not_carry_skip_forward() {
        let (state, funnel) = state_and_funnel(Behavior::Switch);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let driver = Driver::new(
            computation(move |_| match calls_clone.fetch_add(1, Ordering::SeqCst) {
                0 => Err(SourceError::msg("not ready")),
                n => Ok(Source::value(n as i32)),
            }),
            Arc::new(state.clone()),
            funnel,
        );

        driver.skip_next_submission();
        assert!(driver.run::<Scope>().is_err());

        driver.run::<Scope>().unwrap();
        assert_eq!(state.get_untracked().previous(), Some(1));
    }

    #[test]
    fn only_computation_reads_are_tracked() {
        let runtime = Runtime::new();
        let (state, funnel) = state_and_funnel(Behavior::Switch);
        let input = Signal::new(1);

        let input_clone = input.clone();
        let driver = Arc::new(Driver::new(
            computation(move |_| Ok(Source::value(input_clone.get() * 10))),
            Arc::new(state.clone()),
            funnel,
        ));

        let effect_driver = driver.clone();
        let effect = Effect::scheduled(&runtime, move || {
            effect_driver.run::<Scope>().map_err(Into::into)
        });
        runtime.flush().unwrap();

        assert_eq!(effect.dependency_count(), 1);
        assert_eq!(state.subscriber_count(), 0);

        input.set(2);
        assert_eq!(runtime.flush().unwrap(), 1);
        assert_eq!(state.get_untracked().previous(), Some(20));
    }
}
