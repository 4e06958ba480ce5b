//! Async State
//!
//! The settled state of a derived value. Exactly one variant is active at a
//! time; every transition replaces the whole state.

use crate::error::SourceError;

/// Last settled outcome of a derived value.
#[derive(Debug, Clone, Default)]
pub enum AsyncState<T> {
    /// Nothing has settled yet.
    #[default]
    NoValue,

    /// The last settled value.
    Value(T),

    /// The last attempt failed.
    Error(SourceError),
}

impl<T> AsyncState<T> {
    pub fn no_value() -> Self {
        Self::NoValue
    }

    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    pub fn error(error: SourceError) -> Self {
        Self::Error(error)
    }

    pub fn is_no_value(&self) -> bool {
        matches!(self, Self::NoValue)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl<T: Clone> AsyncState<T> {
    /// Project the state for a reader.
    ///
    /// `Ok(None)` while nothing settled; the stored error is handed back as
    /// `Err` so it flows through the reader's own error handling.
    pub fn read(&self) -> Result<Option<T>, SourceError> {
        match self {
            Self::NoValue => Ok(None),
            Self::Value(value) => Ok(Some(value.clone())),
            Self::Error(error) => Err(error.clone()),
        }
    }

    /// The value to hand to the next computation run, if any.
    pub fn previous(&self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value.clone()),
            Self::NoValue | Self::Error(_) => None,
        }
    }
}

impl<T> From<Result<T, SourceError>> for AsyncState<T> {
    fn from(result: Result<T, SourceError>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_projects_each_variant() {
        assert_eq!(AsyncState::<i32>::no_value().read().unwrap(), None);
        assert_eq!(AsyncState::value(4).read().unwrap(), Some(4));

        let err = SourceError::msg("timeout");
        let read = AsyncState::<i32>::error(err.clone()).read().unwrap_err();
        assert!(read.ptr_eq(&err));
    }

    #[test]
    fn previous_ignores_errors() {
        assert_eq!(AsyncState::value("a").previous(), Some("a"));
        assert_eq!(AsyncState::<&str>::NoValue.previous(), None);
        assert_eq!(
            AsyncState::<&str>::error(SourceError::msg("x")).previous(),
            None
        );
    }

    #[test]
    fn from_result_replaces_whole_state() {
        let state: AsyncState<u8> = Ok(1).into();
        assert!(state.is_value());

        let state: AsyncState<u8> = Err(SourceError::msg("bad")).into();
        assert!(state.is_error());
        assert!(!state.is_value());
        assert!(AsyncState::<u8>::default().is_no_value());
    }
}
