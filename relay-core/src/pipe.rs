//! `ByteStreamPipe`: a single-producer/single-consumer byte pipe with
//! backpressure, modeled after `System.IO.Pipelines.Pipe` but built on an
//! arena-backed slab (`alloc::IoArena`) and a segmented byte queue
//! (`buffer::SegmentedBuffer`) instead of a managed ring.
//!
//! Both halves are always driven from the same worker thread in this system
//! (see `relay::event_loop`), so the shared state is a plain `RefCell`, not a
//! mutex: a borrow is never held across an `.await` point, and there is
//! never more than one task polling each half.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use flume::{Receiver, Sender};

use crate::alloc::{IoArena, SlabMut, PAGE_SIZE};
use crate::backpressure::{BackpressurePolicy, Watermarks};
use crate::buffer::SegmentedBuffer;

/// Outcome of `PipeWriter::flush`.
#[derive(Debug, Clone, Copy)]
pub struct FlushResult {
    /// `true` iff the reader half has called `complete()` — the writer
    /// should stop producing, since nothing further will be consumed.
    pub completed: bool,
}

/// Outcome of `PipeReader::read`.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Bytes available since the last `advance_to`, possibly spanning
    /// multiple segments.
    pub buffer: SegmentedBuffer,
    /// `true` iff the writer half has completed *and* `buffer` is empty —
    /// i.e. there is truly nothing left to read. A writer that completes
    /// with a trailing message still buffered reports `completed = false`
    /// until that trailing data has been drained: completion observed with
    /// data still buffered must not swallow the last message.
    pub completed: bool,
}

/// A single-slot wakeup channel. Ringing it when nobody is waiting leaves a
/// token in the slot so the next `wait` returns immediately instead of
/// missing the signal — the cooperative-single-thread scheduling model means
/// there is never a race between the condition check and the wait itself.
struct Doorbell {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Doorbell {
    fn new() -> Self {
        let (tx, rx) = flume::bounded(1);
        Self { tx, rx }
    }

    fn ring(&self) {
        let _ = self.tx.try_send(());
    }

    fn subscribe(&self) -> Receiver<()> {
        self.rx.clone()
    }
}

struct Shared {
    buffer: SegmentedBuffer,
    /// Bytes from the current buffer start that the reader has already
    /// examined without consuming. `read` does not report as "new" until
    /// the buffer grows past this point, per `advance_to`'s contract.
    examined: usize,
    writer_completed: bool,
    reader_completed: bool,
    watermarks: Watermarks,
    data_ready: Doorbell,
    drained: Doorbell,
}

impl Shared {
    fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// The writable half of a `ByteStreamPipe`.
pub struct PipeWriter {
    shared: Rc<RefCell<Shared>>,
    arena: IoArena,
}

/// The readable half of a `ByteStreamPipe`.
pub struct PipeReader {
    shared: Rc<RefCell<Shared>>,
}

/// Create a connected writer/reader pair, applying `watermarks` as the
/// backpressure policy.
#[must_use]
pub fn pipe(watermarks: Watermarks) -> (PipeWriter, PipeReader) {
    let shared = Rc::new(RefCell::new(Shared {
        buffer: SegmentedBuffer::new(),
        examined: 0,
        writer_completed: false,
        reader_completed: false,
        watermarks,
        data_ready: Doorbell::new(),
        drained: Doorbell::new(),
    }));
    (
        PipeWriter {
            shared: shared.clone(),
            arena: IoArena::new(),
        },
        PipeReader { shared },
    )
}

impl PipeWriter {
    /// Acquire a writable region of at least `min` bytes, suitable for an
    /// in-place socket read.
    ///
    /// Clamped to `alloc::PAGE_SIZE`: this method is for the arena-backed,
    /// zero-copy socket-read path, which never requests more than one read
    /// buffer's worth at a time. Outgoing application messages (which have
    /// no size cap) should be staged with `write_bytes` instead.
    pub fn get_writable_memory(&mut self, min: usize) -> SlabMut {
        self.arena.alloc_mut(min.min(PAGE_SIZE))
    }

    /// Mark `n` bytes of a region returned by `get_writable_memory` as
    /// produced. Must be called before the next `flush`.
    pub fn advance(&mut self, slab: SlabMut, n: usize) {
        let bytes = slab.freeze();
        let bytes = if n < bytes.len() { bytes.slice(0..n) } else { bytes };
        self.stage(bytes);
    }

    /// Stage an already-assembled `Bytes` value directly, bypassing the
    /// arena. Used for outgoing application messages, which are built fresh
    /// on every send and gain nothing from arena reuse.
    pub fn write_bytes(&mut self, bytes: Bytes) {
        self.stage(bytes);
    }

    fn stage(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        let mut inner = self.shared.borrow_mut();
        if inner.writer_completed {
            return;
        }
        inner.buffer.push(bytes);
    }

    /// Make staged bytes visible to the reader without waiting for the
    /// reader to drain. Useful for callers that cannot suspend (e.g. a
    /// synchronous callback enqueuing an outgoing message) and are willing
    /// to let the pipe grow past its high watermark rather than block.
    ///
    /// Returns `true` iff the reader has completed the pipe.
    pub fn notify(&mut self) -> bool {
        let inner = self.shared.borrow();
        if inner.writer_completed {
            return inner.reader_completed;
        }
        inner.data_ready.ring();
        inner.reader_completed
    }

    /// Make staged bytes visible to the reader. Suspends until the reader
    /// has drained back under the low watermark if the high watermark was
    /// crossed, or until the reader completes.
    pub async fn flush(&mut self) -> FlushResult {
        {
            let inner = self.shared.borrow();
            if inner.writer_completed {
                return FlushResult {
                    completed: inner.reader_completed,
                };
            }
        }
        self.shared.borrow().data_ready.ring();

        loop {
            let (should_wait, reader_completed) = {
                let inner = self.shared.borrow();
                (
                    !inner.reader_completed
                        && inner.watermarks.should_suspend(inner.buffered_len()),
                    inner.reader_completed,
                )
            };
            if !should_wait {
                return FlushResult {
                    completed: reader_completed,
                };
            }
            let rx = self.shared.borrow().drained.subscribe();
            let _ = rx.recv_async().await;
        }
    }

    /// Signal EOF to the reader. Idempotent.
    pub fn complete(&mut self) {
        let mut inner = self.shared.borrow_mut();
        if inner.writer_completed {
            return;
        }
        inner.writer_completed = true;
        inner.data_ready.ring();
    }
}

impl PipeReader {
    /// Read available bytes, suspending until the buffer holds unexamined
    /// data or the writer completes.
    pub async fn read(&mut self) -> ReadResult {
        loop {
            {
                let inner = self.shared.borrow();
                if inner.reader_completed {
                    return ReadResult {
                        buffer: SegmentedBuffer::new(),
                        completed: true,
                    };
                }
                if inner.buffer.len() > inner.examined || inner.writer_completed {
                    return ReadResult {
                        buffer: inner.buffer.clone(),
                        completed: inner.writer_completed && inner.buffer.is_empty(),
                    };
                }
            }
            let rx = self.shared.borrow().data_ready.subscribe();
            let _ = rx.recv_async().await;
        }
    }

    /// Release the consumed prefix and record how far the reader examined
    /// the buffer. `read` will not report new data until the buffer grows
    /// past `examined` or the writer completes.
    ///
    /// # Panics
    ///
    /// Panics if `examined < consumed`.
    pub fn advance_to(&mut self, consumed: usize, examined: usize) {
        assert!(
            examined >= consumed,
            "examined position must not precede consumed position"
        );
        let mut inner = self.shared.borrow_mut();
        inner.buffer.advance(consumed);
        inner.examined = examined - consumed;

        let should_resume =
            !inner.writer_completed && inner.watermarks.should_resume(inner.buffered_len());
        if should_resume {
            inner.drained.ring();
        }
    }

    /// Signal that no further reads will occur. Idempotent.
    pub fn complete(&mut self) {
        let mut inner = self.shared.borrow_mut();
        if inner.reader_completed {
            return;
        }
        inner.reader_completed = true;
        inner.drained.ring();
    }
}
