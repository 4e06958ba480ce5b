//! Flattening Funnel
//!
//! The funnel turns a sequence of submitted sources into one sequence of
//! emissions, according to a [`Behavior`]. Every emission goes to a single
//! sink attached when the funnel is created.
//!
//! # How It Works
//!
//! Submissions land in an `incoming` queue. The admission dispatcher moves
//! them into the `active` set according to the behavior:
//!
//! - `Switch`: only the latest submission survives; everything else,
//!   queued or active, is dropped.
//! - `Merge`: everything is admitted.
//! - `Concat`: the oldest submission is admitted once nothing is active.
//! - `Exhaust`: a submission is admitted only if nothing is active,
//!   otherwise it is dropped unpolled.
//!
//! Active sources are polled inline, both on submission and whenever one
//! of them wakes the funnel's waker. A pass delivers at most one emission
//! and then re-runs admission, so a sink that submits re-entrantly sees its
//! submission admitted before anything else is polled.
//!
//! No lock is held while the sink or a source's destructor runs.
//!
//! A waker can fire from inside an unrelated reactive computation (a source
//! fed by a channel that an effect writes to, for instance). Polling and
//! delivery therefore run through the funnel's isolation hook, which a
//! reactive host uses to hide them from whatever frame is current.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use futures_util::task::{self, ArcWake};
use futures_util::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::options::Behavior;
use super::source::{Source, SourceStream};
use crate::error::SourceError;

/// Receives every emission of a funnel.
pub type Sink<T> = Box<dyn Fn(Result<T, SourceError>) + Send + Sync>;

/// Runs a pump pass, typically outside of any dependency tracking.
pub type Isolation = fn(&mut dyn FnMut());

fn run_inline(pass: &mut dyn FnMut()) {
    pass()
}

/// Flattens submitted sources into a single sink.
pub struct Funnel<T> {
    inner: Arc<FunnelInner<T>>,
}

struct FunnelInner<T> {
    behavior: Behavior,
    sink: Sink<T>,
    isolation: Isolation,
    waker: Waker,
    incoming: Mutex<VecDeque<Submission<T>>>,
    active: Mutex<IndexMap<u64, SourceStream<T>>>,
    next_id: AtomicU64,
    pumping: AtomicBool,
    repoll: AtomicBool,
    closed: AtomicBool,
}

struct Submission<T> {
    id: u64,
    stream: SourceStream<T>,
}

/// Wakes the funnel when one of its sources is ready to make progress.
struct FunnelWaker<T> {
    funnel: Weak<FunnelInner<T>>,
}

impl<T: Send + 'static> ArcWake for FunnelWaker<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if let Some(funnel) = arc_self.funnel.upgrade() {
            funnel.pump();
        }
    }
}

/// Clears the pumping flag even if the sink panics.
struct PumpGuard<'a>(&'a AtomicBool);

impl Drop for PumpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> Funnel<T>
where
    T: Send + 'static,
{
    /// Create a funnel that delivers every emission to `sink`.
    pub fn new<F>(behavior: Behavior, sink: F) -> Self
    where
        F: Fn(Result<T, SourceError>) + Send + Sync + 'static,
    {
        Self::with_isolation(behavior, run_inline, sink)
    }

    /// Create a funnel whose pump passes run inside `isolation`.
    pub fn with_isolation<F>(behavior: Behavior, isolation: Isolation, sink: F) -> Self
    where
        F: Fn(Result<T, SourceError>) + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this: &Weak<FunnelInner<T>>| FunnelInner {
            behavior,
            sink: Box::new(sink),
            isolation,
            waker: task::waker(Arc::new(FunnelWaker {
                funnel: this.clone(),
            })),
            incoming: Mutex::new(VecDeque::new()),
            active: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(0),
            pumping: AtomicBool::new(false),
            repoll: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        Self { inner }
    }

    /// Hand a new source to the funnel.
    ///
    /// The source is polled before this returns, so anything it can emit
    /// immediately has reached the sink by then.
    pub fn submit(&self, source: Source<T>) {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            tracing::warn!(kind = ?source.kind(), "source submitted after close, dropping");
            return;
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            id,
            kind = ?source.kind(),
            behavior = %inner.behavior,
            "source submitted"
        );
        inner.incoming.lock().push_back(Submission {
            id,
            stream: source.into_stream(),
        });
        inner.pump();
    }

    /// Drop every source and ignore all later submissions and wakes.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// A guard that closes this funnel when dropped.
    pub fn subscription(&self) -> FunnelSubscription<T> {
        FunnelSubscription {
            funnel: self.clone(),
        }
    }
}

impl<T> Funnel<T> {
    pub fn behavior(&self) -> Behavior {
        self.inner.behavior
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of sources currently being polled.
    pub fn in_flight(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Number of submissions waiting for admission.
    pub fn pending(&self) -> usize {
        self.inner.incoming.lock().len()
    }
}

impl<T> FunnelInner<T> {
    fn pump(&self) {
        self.repoll.store(true, Ordering::Release);

        loop {
            // Whoever holds the flag drains; a nested or concurrent caller
            // only leaves `repoll` set for it.
            if self.pumping.swap(true, Ordering::AcqRel) {
                return;
            }
            {
                let _guard = PumpGuard(&self.pumping);
                (self.isolation)(&mut || self.drain());
            }
            if !self.repoll.load(Ordering::Acquire) {
                return;
            }
        }
    }

    fn drain(&self) {
        while self.repoll.swap(false, Ordering::AcqRel) {
            loop {
                if self.closed.load(Ordering::Acquire) {
                    return;
                }
                self.admit();
                let Some(emission) = self.next_emission() else {
                    break;
                };
                tracing::trace!(ok = emission.is_ok(), "delivering emission");
                (self.sink)(emission);
            }
        }
    }

    /// Move incoming submissions into the active set.
    fn admit(&self) {
        let mut incoming = self.incoming.lock();
        if incoming.is_empty() {
            return;
        }
        let mut active = self.active.lock();
        let mut discarded: SmallVec<[SourceStream<T>; 4]> = SmallVec::new();

        match self.behavior {
            Behavior::Switch => {
                let latest = incoming.pop_back();
                discarded.extend(incoming.drain(..).map(|submission| submission.stream));
                discarded.extend(active.drain(..).map(|(_, stream)| stream));
                if let Some(Submission { id, stream }) = latest {
                    if !discarded.is_empty() {
                        tracing::debug!(id, superseded = discarded.len(), "switched to latest source");
                    }
                    active.insert(id, stream);
                }
            }
            Behavior::Merge => {
                for Submission { id, stream } in incoming.drain(..) {
                    active.insert(id, stream);
                }
            }
            Behavior::Concat => {
                if active.is_empty() {
                    if let Some(Submission { id, stream }) = incoming.pop_front() {
                        tracing::debug!(id, queued = incoming.len(), "concat started source");
                        active.insert(id, stream);
                    }
                }
            }
            Behavior::Exhaust => {
                for Submission { id, stream } in incoming.drain(..) {
                    if active.is_empty() {
                        active.insert(id, stream);
                    } else {
                        tracing::debug!(id, "source in flight, dropping submission");
                        discarded.push(stream);
                    }
                }
            }
        }

        drop(active);
        drop(incoming);
        drop(discarded);
    }

    /// Poll active sources in admission order until one yields an item.
    ///
    /// Completed and failed sources are removed and dropped once the lock is
    /// released. Either sets `repoll`, so admission runs again for anything
    /// that was waiting on them.
    fn next_emission(&self) -> Option<Result<T, SourceError>> {
        let mut cx = Context::from_waker(&self.waker);
        let mut active = self.active.lock();
        let mut index = 0;

        while index < active.len() {
            let Some((&id, stream)) = active.get_index_mut(index) else {
                break;
            };
            match stream.poll_next_unpin(&mut cx) {
                Poll::Ready(Some(Ok(value))) => return Some(Ok(value)),
                Poll::Ready(Some(Err(error))) => {
                    tracing::warn!(id, %error, "source failed");
                    let finished = active.shift_remove_index(index);
                    drop(active);
                    drop(finished);
                    self.repoll.store(true, Ordering::Release);
                    return Some(Err(error));
                }
                Poll::Ready(None) => {
                    tracing::debug!(id, "source completed");
                    let finished = active.shift_remove_index(index);
                    drop(active);
                    drop(finished);
                    self.repoll.store(true, Ordering::Release);
                    return None;
                }
                Poll::Pending => index += 1,
            }
        }
        None
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let incoming = std::mem::take(&mut *self.incoming.lock());
        let active = std::mem::take(&mut *self.active.lock());
        tracing::debug!(
            queued = incoming.len(),
            active = active.len(),
            "funnel closed"
        );
    }
}

impl<T> Clone for Funnel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Funnel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Funnel")
            .field("behavior", &self.behavior())
            .field("in_flight", &self.in_flight())
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Keeps a funnel open. Closes it when dropped or unsubscribed.
pub struct FunnelSubscription<T> {
    funnel: Funnel<T>,
}

impl<T> FunnelSubscription<T> {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for FunnelSubscription<T> {
    fn drop(&mut self) {
        self.funnel.inner.close();
    }
}

impl<T> std::fmt::Debug for FunnelSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FunnelSubscription").field(&self.funnel).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;
    use tokio::sync::oneshot;

    type Log = Arc<Mutex<Vec<Result<i32, String>>>>;

    fn recording(behavior: Behavior) -> (Funnel<i32>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = log.clone();
        let funnel = Funnel::new(behavior, move |emission: Result<i32, SourceError>| {
            sink_log.lock().push(emission.map_err(|e| e.to_string()));
        });
        (funnel, log)
    }

    fn deferred(rx: oneshot::Receiver<i32>) -> Source<i32> {
        Source::deferred(async move { rx.await.map_err(SourceError::new) })
    }

    /// A source that counts how often it was started.
    fn counted(polled: &Arc<AtomicUsize>, value: i32) -> Source<i32> {
        let polled = polled.clone();
        Source::deferred(async move {
            polled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, SourceError>(value)
        })
    }

    #[test]
    fn switch_drops_superseded_source() {
        let (funnel, log) = recording(Behavior::Switch);
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        funnel.submit(deferred(rx1));
        funnel.submit(deferred(rx2));
        assert!(tx1.is_closed());
        assert_eq!(funnel.in_flight(), 1);

        tx2.send(2).unwrap();
        assert!(tx1.send(1).is_err());
        assert_eq!(*log.lock(), vec![Ok(2)]);
    }

    #[test]
    fn merge_applies_in_settlement_order() {
        let (funnel, log) = recording(Behavior::Merge);
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        funnel.submit(deferred(rx1));
        funnel.submit(deferred(rx2));
        assert_eq!(funnel.in_flight(), 2);

        tx2.send(2).unwrap();
        tx1.send(1).unwrap();
        assert_eq!(*log.lock(), vec![Ok(2), Ok(1)]);
        assert_eq!(funnel.in_flight(), 0);
    }

    #[test]
    fn merge_breaks_ties_by_submission_order() {
        let (funnel, log) = recording(Behavior::Merge);
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        funnel.submit(deferred(rx1));
        funnel.submit(deferred(rx2));
        // Settle both before anything can wake the funnel.
        let _pause = funnel.inner.pumping.swap(true, Ordering::AcqRel);
        tx2.send(2).unwrap();
        tx1.send(1).unwrap();
        funnel.inner.pumping.store(false, Ordering::Release);
        funnel.inner.pump();

        assert_eq!(*log.lock(), vec![Ok(1), Ok(2)]);
    }

    #[test]
    fn concat_waits_for_earlier_source() {
        let (funnel, log) = recording(Behavior::Concat);
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        funnel.submit(deferred(rx1));
        funnel.submit(deferred(rx2));
        assert_eq!((funnel.in_flight(), funnel.pending()), (1, 1));

        tx2.send(2).unwrap();
        assert!(log.lock().is_empty());

        tx1.send(1).unwrap();
        assert_eq!(*log.lock(), vec![Ok(1), Ok(2)]);
        assert_eq!((funnel.in_flight(), funnel.pending()), (0, 0));
    }

    #[test]
    fn exhaust_never_starts_dropped_submissions() {
        let (funnel, log) = recording(Behavior::Exhaust);
        let (tx1, rx1) = oneshot::channel();
        let polled = Arc::new(AtomicUsize::new(0));

        funnel.submit(deferred(rx1));
        funnel.submit(counted(&polled, 2));
        assert_eq!(funnel.pending(), 0);

        tx1.send(1).unwrap();
        assert_eq!(*log.lock(), vec![Ok(1)]);
        assert_eq!(polled.load(Ordering::SeqCst), 0);

        funnel.submit(counted(&polled, 3));
        assert_eq!(*log.lock(), vec![Ok(1), Ok(3)]);
        assert_eq!(polled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn immediate_value_is_delivered_inline() {
        let (funnel, log) = recording(Behavior::Switch);

        funnel.submit(Source::value(7));
        assert_eq!(*log.lock(), vec![Ok(7)]);
        assert_eq!(funnel.in_flight(), 0);
    }

    #[test]
    fn source_error_does_not_stop_funnel() {
        let (funnel, log) = recording(Behavior::Switch);

        funnel.submit(Source::failed(SourceError::msg("boom")));
        funnel.submit(Source::value(1));
        assert_eq!(*log.lock(), vec![Err("boom".to_string()), Ok(1)]);
    }

    #[test]
    fn error_ends_only_the_failing_source() {
        let (funnel, log) = recording(Behavior::Merge);
        let (tx, rx) = oneshot::channel();

        funnel.submit(deferred(rx));
        funnel.submit(Source::stream(stream::iter(vec![
            Ok(1),
            Err(SourceError::msg("broken")),
            Ok(2),
        ])));
        assert_eq!(funnel.in_flight(), 1);

        tx.send(3).unwrap();
        assert_eq!(
            *log.lock(),
            vec![Ok(1), Err("broken".to_string()), Ok(3)]
        );
    }

    #[test]
    fn close_drops_sources_and_ignores_submissions() {
        let (funnel, log) = recording(Behavior::Merge);
        let (tx, rx) = oneshot::channel();

        funnel.submit(deferred(rx));
        funnel.close();
        funnel.close();
        assert!(funnel.is_closed());
        assert!(tx.is_closed());

        funnel.submit(Source::value(1));
        assert!(log.lock().is_empty());
        assert_eq!((funnel.in_flight(), funnel.pending()), (0, 0));
    }

    #[test]
    fn sink_can_submit_reentrantly() {
        let funnel_slot: Arc<OnceLock<Funnel<i32>>> = Arc::new(OnceLock::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let slot = funnel_slot.clone();
        let sink_log = log.clone();
        let funnel = Funnel::new(Behavior::Concat, move |emission: Result<i32, SourceError>| {
            let value = emission.map_err(|e| e.to_string());
            sink_log.lock().push(value.clone());
            if value == Ok(1) {
                if let Some(funnel) = slot.get() {
                    funnel.submit(Source::value(2));
                }
            }
        });
        funnel_slot.set(funnel.clone()).unwrap();

        funnel.submit(Source::values(vec![1, 10]));
        assert_eq!(*log.lock(), vec![Ok(1), Ok(10), Ok(2)]);

        funnel.close();
    }

    thread_local! {
        static PASSES: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }

    fn counting_pass(pass: &mut dyn FnMut()) {
        PASSES.with(|passes| passes.set(passes.get() + 1));
        pass()
    }

    #[test]
    fn wakeups_pump_through_isolation() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = log.clone();
        let funnel = Funnel::with_isolation(
            Behavior::Switch,
            counting_pass,
            move |emission: Result<i32, SourceError>| {
                sink_log.lock().push(emission.map_err(|e| e.to_string()));
            },
        );
        let (tx, rx) = oneshot::channel();

        funnel.submit(deferred(rx));
        assert_eq!(PASSES.with(|passes| passes.get()), 1);

        tx.send(5).unwrap();
        assert_eq!(PASSES.with(|passes| passes.get()), 2);
        assert_eq!(*log.lock(), vec![Ok(5)]);
    }

    /// Emits `values`, then ends; runs `on_drop` when dropped.
    struct Finishing {
        values: VecDeque<i32>,
        on_drop: Option<Box<dyn FnOnce() + Send>>,
    }

    impl futures_util::Stream for Finishing {
        type Item = Result<i32, SourceError>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.values.pop_front().map(Ok))
        }
    }

    impl Drop for Finishing {
        fn drop(&mut self) {
            if let Some(on_drop) = self.on_drop.take() {
                on_drop();
            }
        }
    }

    #[test]
    fn completed_source_is_dropped_outside_the_lock() {
        let (funnel, log) = recording(Behavior::Merge);
        let funnel_slot: Arc<OnceLock<Funnel<i32>>> = Arc::new(OnceLock::new());
        funnel_slot.set(funnel.clone()).unwrap();
        let in_flight_at_drop = Arc::new(Mutex::new(None));

        let slot = funnel_slot.clone();
        let seen = in_flight_at_drop.clone();
        funnel.submit(Source::stream(Finishing {
            values: VecDeque::from(vec![1]),
            on_drop: Some(Box::new(move || {
                if let Some(funnel) = slot.get() {
                    *seen.lock() = Some(funnel.in_flight());
                }
            })),
        }));

        assert_eq!(*log.lock(), vec![Ok(1)]);
        assert_eq!(*in_flight_at_drop.lock(), Some(0));

        funnel.submit(Source::value(2));
        assert_eq!(*log.lock(), vec![Ok(1), Ok(2)]);
    }

    #[test]
    fn subscription_closes_on_drop() {
        let (funnel, _log) = recording(Behavior::Switch);

        let subscription = funnel.subscription();
        assert!(!funnel.is_closed());
        subscription.unsubscribe();
        assert!(funnel.is_closed());
    }
}
