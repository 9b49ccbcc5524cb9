//! The single dedicated worker thread that drives every pipe, connection and
//! session created under it.
//!
//! All embedder callbacks (`RelayObserver`), all pipe continuations, and
//! every socket operation run on this one thread. The event loop itself is a
//! cheap, cloneable handle (`Arc`-backed); the thread it owns runs a
//! `compio` runtime for the lifetime of the loop.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tracing::{debug, warn};

use crate::observer::RelayObserver;
use relay_core::error::{RelayError, Result};

/// A unit of work executed exactly once on the worker thread.
///
/// Must be `Send` because `schedule` is callable from any thread; the
/// closure typically does nothing but build and `compio::runtime::spawn` an
/// `Rc`-based future once it is actually running on the worker, where
/// building non-`Send` state is safe again.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// How long the worker keeps polling after `dispose` before it abruptly
/// drops its runtime. Shutdown is abrupt by design, not graceful; this
/// window exists only to give in-flight tasks a chance to observe
/// `CancelToken` and run their own disposal before the executor that
/// drives them disappears.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(50);
const SHUTDOWN_DRAIN_STEP: Duration = Duration::from_millis(1);

/// A cooperative cancellation flag, checked by every long-running loop
/// (accept, recv, frame, send) before its next suspension point.
///
/// This is not preemptive: an in-flight socket operation runs to completion
/// before its task notices cancellation. Given how frequently these loops
/// suspend, that's an acceptable approximation of "propagated to every
/// socket operation" without requiring a cancellation-aware I/O API.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Observers only notice at their next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct Inner {
    tx: Sender<WorkItem>,
    worker_thread_id: ThreadId,
    tick_period_ms: Arc<AtomicU64>,
    disposing: AtomicBool,
    disposed: AtomicBool,
    cancel: CancelToken,
    observer: Arc<dyn RelayObserver>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn join_worker(&self) {
        if let Some(handle) = self.thread.lock().expect("event loop thread mutex poisoned").take() {
            let _ = handle.join();
        }
        self.disposed.store(true, Ordering::Release);
    }
}

/// Handle to the event loop's dedicated worker thread.
///
/// Cheap to clone; every clone refers to the same worker and the same
/// shared state.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<Inner>,
}

impl EventLoop {
    /// Spawn the worker thread and start its `compio` runtime.
    ///
    /// Blocks briefly until the worker has recorded its thread id, so
    /// `is_worker_thread` is answerable correctly as soon as this returns.
    #[must_use]
    pub fn new(observer: Arc<dyn RelayObserver>, tick_period_ms: u64) -> Self {
        let (tx, rx) = flume::unbounded::<WorkItem>();
        let (id_tx, id_rx) = flume::bounded::<ThreadId>(1);
        let cancel = CancelToken::new();
        let tick_period_ms = Arc::new(AtomicU64::new(tick_period_ms));

        let thread_cancel = cancel.clone();
        let thread_observer = observer.clone();
        let thread_tick_period_ms = tick_period_ms.clone();
        let handle = thread::Builder::new()
            .name("relay-worker".into())
            .spawn(move || {
                let _ = id_tx.send(thread::current().id());
                worker_main(rx, thread_cancel, thread_observer, thread_tick_period_ms);
            })
            .expect("failed to spawn relay worker thread");

        let worker_thread_id = id_rx.recv().expect("worker thread dropped before reporting its id");

        Self {
            inner: Arc::new(Inner {
                tx,
                worker_thread_id,
                tick_period_ms,
                disposing: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                cancel,
                observer,
                thread: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Enqueue a work item. Fails with `ShuttingDown` once the loop has
    /// entered *disposing*.
    pub fn schedule<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.disposing.load(Ordering::Acquire) {
            return Err(RelayError::ShuttingDown);
        }
        self.inner
            .tx
            .send(Box::new(f))
            .map_err(|_| RelayError::ShuttingDown)
    }

    /// `true` iff called from the loop's own worker thread.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.inner.worker_thread_id
    }

    /// Minimum milliseconds between tick emissions.
    #[must_use]
    pub fn tick_period_ms(&self) -> u64 {
        self.inner.tick_period_ms.load(Ordering::Relaxed)
    }

    /// Update the tick cadence; takes effect from the worker's next wait.
    pub fn set_tick_period_ms(&self, period_ms: u64) {
        self.inner.tick_period_ms.store(period_ms, Ordering::Relaxed);
    }

    /// The loop's cancellation handle, observable by long-running tasks.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.inner.cancel.clone()
    }

    /// The observer registered at construction.
    #[must_use]
    pub fn observer(&self) -> Arc<dyn RelayObserver> {
        self.inner.observer.clone()
    }

    /// `true` once the worker thread has been joined.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Idempotent. If called from the worker, teardown is deferred to a
    /// foreign thread to avoid the worker joining itself.
    pub fn dispose(&self) {
        if self.inner.disposing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();
        if self.is_worker_thread() {
            let inner = self.inner.clone();
            thread::spawn(move || inner.join_worker());
        } else {
            self.inner.join_worker();
        }
    }
}

fn worker_main(
    rx: Receiver<WorkItem>,
    cancel: CancelToken,
    observer: Arc<dyn RelayObserver>,
    tick_period_ms: Arc<AtomicU64>,
) {
    let rt = compio::runtime::Runtime::new().expect("failed to start relay worker runtime");
    rt.block_on(async move {
        let start = Instant::now();

        loop {
            let tick_period = Duration::from_millis(tick_period_ms.load(Ordering::Relaxed));
            let item = match compio::time::timeout(tick_period, rx.recv_async()).await {
                Ok(Ok(item)) => Some(item),
                Ok(Err(_)) => None, // all senders dropped; nothing queued
                Err(_) => None,     // timed out waiting for the next item
            };
            if let Some(item) = item {
                run_item(item, &observer);
                while let Ok(item) = rx.try_recv() {
                    run_item(item, &observer);
                }
            }

            if cancel.is_cancelled() {
                debug!("relay worker observed cancellation, draining before shutdown");
                let mut drained = Duration::ZERO;
                while drained < SHUTDOWN_DRAIN {
                    compio::time::sleep(SHUTDOWN_DRAIN_STEP).await;
                    drained += SHUTDOWN_DRAIN_STEP;
                    while let Ok(item) = rx.try_recv() {
                        run_item(item, &observer);
                    }
                }
                break;
            }

            observer.on_tick(start.elapsed().as_millis() as u64);
        }
    });
}

fn run_item(item: WorkItem, observer: &Arc<dyn RelayObserver>) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(item)) {
        let message = panic
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("work item panicked with a non-string payload");
        warn!(%message, "scheduled work item panicked; event loop continues");
        observer.on_callback_panic(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn schedule_runs_on_worker_thread() {
        let event_loop = EventLoop::new(Arc::new(NoopObserver), 1);
        let (done_tx, done_rx) = flume::bounded(1);
        let loop_clone = event_loop.clone();
        event_loop
            .schedule(move || {
                let _ = done_tx.send(loop_clone.is_worker_thread());
            })
            .unwrap();
        let ran_on_worker = done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(ran_on_worker);
        event_loop.dispose();
    }

    #[test]
    fn caller_thread_is_not_the_worker() {
        let event_loop = EventLoop::new(Arc::new(NoopObserver), 1);
        assert!(!event_loop.is_worker_thread());
        event_loop.dispose();
    }

    #[test]
    fn schedule_after_dispose_is_shutting_down() {
        let event_loop = EventLoop::new(Arc::new(NoopObserver), 1);
        event_loop.dispose();
        // Give the worker a moment to actually exit.
        std::thread::sleep(Duration::from_millis(100));
        let result = event_loop.schedule(|| {});
        assert!(matches!(result, Err(RelayError::ShuttingDown)));
    }

    #[test]
    fn dispose_is_idempotent_and_safe_from_the_worker() {
        let event_loop = EventLoop::new(Arc::new(NoopObserver), 1);
        let loop_clone = event_loop.clone();
        event_loop
            .schedule(move || loop_clone.dispose())
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));
        event_loop.dispose();
        assert!(event_loop.is_disposed());
    }

    #[test]
    fn panicking_work_item_does_not_kill_the_loop() {
        let event_loop = EventLoop::new(Arc::new(NoopObserver), 1);
        event_loop.schedule(|| panic!("boom")).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let (done_tx, done_rx) = flume::bounded(1);
        event_loop
            .schedule(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            })
            .unwrap();
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        event_loop.dispose();
    }

    #[test]
    fn panicking_work_item_is_reported_to_the_observer() {
        struct PanicObserver {
            tx: flume::Sender<String>,
        }
        impl RelayObserver for PanicObserver {
            fn on_callback_panic(&self, message: &str) {
                let _ = self.tx.send(message.to_string());
            }
        }

        let (tx, rx) = flume::bounded(1);
        let event_loop = EventLoop::new(Arc::new(PanicObserver { tx }), 1);
        event_loop.schedule(|| panic!("observer sees this")).unwrap();

        let message = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(message, "observer sees this");
        event_loop.dispose();
    }
}
