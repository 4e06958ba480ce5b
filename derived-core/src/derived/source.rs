//! Async Sources
//!
//! What a computation hands back: a plain value, a deferred value, or a
//! stream. The funnel only ever sees one shape, a boxed stream of results,
//! so plain values and deferred values are wrapped as single-item streams.

use std::fmt;
use std::future::Future;

use futures_util::future::{self, BoxFuture};
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::{FutureExt, StreamExt};

use crate::error::SourceError;

/// The uniform shape the funnel consumes.
pub type SourceStream<T> = BoxStream<'static, Result<T, SourceError>>;

/// A value produced at most once, later.
pub type Deferred<T> = BoxFuture<'static, Result<T, SourceError>>;

/// Result of one computation run.
pub enum Source<T> {
    /// Already available.
    Value(T),

    /// Settles once, later.
    Deferred(Deferred<T>),

    /// Emits any number of results until it ends.
    Stream(SourceStream<T>),
}

/// Variant tag of a [`Source`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Value,
    Deferred,
    Stream,
}

impl<T> Source<T>
where
    T: Send + 'static,
{
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, SourceError>> + Send + 'static,
    {
        Self::Deferred(future.boxed())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, SourceError>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// A stream that emits `values` immediately, in order.
    pub fn values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::stream(stream::iter(values).map(Ok))
    }

    /// A source that fails as soon as it is polled.
    pub fn failed(error: SourceError) -> Self {
        Self::stream(stream::once(future::ready(Err(error))))
    }

    /// Wrap into the single shape the funnel consumes.
    pub fn into_stream(self) -> SourceStream<T> {
        match self {
            Self::Value(value) => stream::once(future::ready(Ok(value))).boxed(),
            Self::Deferred(deferred) => deferred.into_stream().boxed(),
            Self::Stream(stream) => stream,
        }
    }
}

impl<T> Source<T> {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Value(_) => SourceKind::Value,
            Self::Deferred(_) => SourceKind::Deferred,
            Self::Stream(_) => SourceKind::Stream,
        }
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Source").field(&self.kind()).finish()
    }
}
