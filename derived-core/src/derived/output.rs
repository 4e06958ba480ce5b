//! Output Cell
//!
//! The read side of a derived value: a computed projection of its state.

use std::fmt;
use std::sync::Arc;

use super::options::{Behavior, ValueEqualFn};
use crate::error::SourceError;
use crate::reactive::{EqualFn, ReadCell};

/// What a read of a derived value yields.
pub type Reading<T> = Result<Option<T>, SourceError>;

/// Build the equality the output cell notifies by.
///
/// Two readings are equal only if both hold a value (or both hold none)
/// and `equal` says so. Errors never compare equal. Without `equal`,
/// nothing does.
pub(crate) fn reading_equality<T>(equal: Option<ValueEqualFn<T>>) -> EqualFn<Reading<T>>
where
    T: 'static,
{
    match equal {
        Some(equal) => Arc::new(move |a: &Reading<T>, b: &Reading<T>| -> bool {
            match (a, b) {
                (Ok(a), Ok(b)) => equal(a.as_ref(), b.as_ref()),
                _ => false,
            }
        }),
        None => Arc::new(|_: &Reading<T>, _: &Reading<T>| false),
    }
}

/// A value derived from an async computation.
///
/// Reading it yields `Ok(None)` until something settles, `Ok(Some(value))`
/// after a value settles, and `Err` after a source failed, until a later
/// settlement replaces the error.
pub struct DerivedAsync<T> {
    output: Arc<dyn ReadCell<Reading<T>>>,
    behavior: Behavior,
}

impl<T> DerivedAsync<T> {
    pub(crate) fn new(output: Arc<dyn ReadCell<Reading<T>>>, behavior: Behavior) -> Self {
        Self { output, behavior }
    }

    /// Read the current value, registering a dependency.
    pub fn get(&self) -> Reading<T> {
        self.output.get()
    }

    /// Read the current value without registering a dependency.
    pub fn get_untracked(&self) -> Reading<T> {
        self.output.get_untracked()
    }

    /// The flattening behavior this value was created with.
    pub fn behavior(&self) -> Behavior {
        self.behavior
    }
}

impl<T> ReadCell<Reading<T>> for DerivedAsync<T>
where
    T: Send + Sync,
{
    fn get(&self) -> Reading<T> {
        DerivedAsync::get(self)
    }

    fn get_untracked(&self) -> Reading<T> {
        DerivedAsync::get_untracked(self)
    }
}

impl<T> Clone for DerivedAsync<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            behavior: self.behavior,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DerivedAsync<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAsync")
            .field("behavior", &self.behavior)
            .field("value", &self.get_untracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Memo, Signal};

    fn distinct() -> ValueEqualFn<i32> {
        Arc::new(|a: Option<&i32>, b: Option<&i32>| a == b)
    }

    #[test]
    fn caller_equality_compares_values() {
        let equal = reading_equality(Some(distinct()));

        assert!(equal(&Ok(Some(1)), &Ok(Some(1))));
        assert!(equal(&Ok(None), &Ok(None)));
        assert!(!equal(&Ok(Some(1)), &Ok(Some(2))));
        assert!(!equal(&Ok(None), &Ok(Some(2))));
    }

    #[test]
    fn errors_never_compare_equal() {
        let equal = reading_equality(Some(distinct()));
        let err = SourceError::msg("down");

        assert!(!equal(&Err(err.clone()), &Err(err.clone())));
        assert!(!equal(&Err(err), &Ok(None)));
    }

    #[test]
    fn without_equality_everything_differs() {
        let equal = reading_equality::<i32>(None);
        assert!(!equal(&Ok(Some(1)), &Ok(Some(1))));
    }

    #[test]
    fn reads_go_through_the_output_cell() {
        let source = Signal::new(Ok(Some(4)));
        let source_clone = source.clone();
        let memo = Memo::with_equality(
            move || source_clone.get(),
            reading_equality::<i32>(None),
        );
        let derived = DerivedAsync::new(Arc::new(memo), Behavior::Concat);

        assert_eq!(derived.get().unwrap(), Some(4));
        source.set(Err(SourceError::msg("gone")));
        assert_eq!(derived.get_untracked().unwrap_err().to_string(), "gone");
        assert_eq!(derived.behavior(), Behavior::Concat);
        assert!(format!("{:?}", derived.clone()).starts_with("DerivedAsync { behavior: Concat"));
    }
}
