//! Error Types
//!
//! Errors fall into three groups:
//!
//! - [`DeriveError`]: setup-time configuration failures. Fatal; the derived
//!   value is never created.
//! - [`SourceError`]: failures reported by an async source (or by the
//!   computation producing one). Stored in the state and re-raised on read.
//! - [`FlushError`]: failures collected while the runtime ran queued effects.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error used at the effect boundary.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure reported by an async source or by the computation that produced it.
///
/// Cheap to clone: every reader of a derived value in the error state gets the
/// same underlying error.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct SourceError(Arc<dyn StdError + Send + Sync>);

impl SourceError {
    /// Wrap an arbitrary error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Attempt to downcast to the concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether both handles point at the same underlying error.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// Setup-time failure of [`derive_async`](crate::derived::derive_async).
#[derive(Debug, Error)]
pub enum DeriveError {
    /// `require_sync` was requested but the computation produced a deferred value.
    #[error("deferred values cannot be used with require_sync; pass an initial value or disable require_sync")]
    RequireSyncDeferred,

    /// `require_sync` was requested but the stream did not emit during setup.
    #[error("the stream passed to derive_async did not emit synchronously; pass an initial value or disable require_sync")]
    RequireSyncNoEmission,

    /// The computation failed while the synchronous gate ran it.
    #[error("initial computation failed")]
    Computation(#[source] SourceError),
}

/// One or more effects failed during [`Runtime::flush`](crate::reactive::Runtime::flush).
///
/// The remaining queued effects still ran.
#[derive(Debug, Error)]
#[error("{} effect(s) failed during flush", .errors.len())]
pub struct FlushError {
    /// Errors in the order the failing effects ran.
    pub errors: Vec<BoxError>,
}

/// Unrecognised flattening behavior name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown behavior `{0}`, expected one of switch, merge, concat, exhaust")]
pub struct ParseBehaviorError(pub String);
