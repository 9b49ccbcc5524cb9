//! `PipedConnection`: one TCP socket plus a recv pipe and a send pipe, and
//! the three cooperative tasks that move bytes between them.
//!
//! The tasks themselves are free functions rather than methods, so they
//! carry no knowledge of `ProxySession` — callers (see `relay::session`)
//! supply plain closures for "a complete message arrived" and "this side
//! hit EOF or an error, start disposal".

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;

use bytes::BytesMut;
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use compio::net::TcpStream;
use tracing::trace;

use relay_core::backpressure::Watermarks;
use relay_core::error::{RelayError, Result};
use relay_core::pipe::{pipe, PipeReader, PipeWriter, ReadResult};

use crate::event_loop::CancelToken;

/// The pipe halves a connection's three cooperative tasks need. Produced by
/// `PipedConnection::new` alongside the connection itself and consumed once,
/// when the owning session starts those tasks.
pub(crate) struct ConnectionTaskPipes {
    pub recv_writer: PipeWriter,
    pub recv_reader: PipeReader,
    pub send_reader: PipeReader,
}

/// One read chunk requested per `recv_from_socket` iteration.
const RECV_CHUNK: usize = 8 * 1024;

/// Which peer a connection faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The inbound peer that connected to the acceptor.
    Local,
    /// The upstream peer the acceptor dialed on the client's behalf.
    Remote,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A single TCP socket wrapped in a recv/send pipe pair.
///
/// The pipe halves driven by the cooperative tasks (the recv pipe's
/// writer, the recv pipe's reader, the send pipe's reader) are moved out to
/// those tasks at construction time; `PipedConnection` itself retains only
/// what the public surface and disposal need: the socket (for shutdown),
/// the send pipe's writer (for `send`), and the disposed flag.
pub struct PipedConnection {
    direction: Direction,
    socket: RefCell<TcpStream>,
    send_writer: RefCell<PipeWriter>,
    disposed: Cell<bool>,
}

impl PipedConnection {
    /// Builds the connection and the recv/send pipes it needs, split into
    /// the halves each of the three cooperative tasks will own.
    pub(crate) fn new(
        direction: Direction,
        socket: TcpStream,
        watermarks: Watermarks,
    ) -> (Self, ConnectionTaskPipes) {
        let (recv_writer, recv_reader) = pipe(watermarks);
        let (send_writer, send_reader) = pipe(watermarks);
        let connection = Self {
            direction,
            socket: RefCell::new(socket),
            send_writer: RefCell::new(send_writer),
            disposed: Cell::new(false),
        };
        (connection, ConnectionTaskPipes { recv_writer, recv_reader, send_reader })
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn socket_clone(&self) -> TcpStream {
        self.socket.borrow().clone()
    }

    /// Enqueue `bytes` on this connection's send pipe, NUL-terminated.
    ///
    /// Does not wait for the peer to drain: a synchronous embedder callback
    /// has no suspension point to wait from, so this stages the frame and
    /// wakes `send_to_socket` without applying backpressure. The socket
    /// write itself still applies backpressure against the wire.
    ///
    /// The worker-thread restriction is enforced by the caller
    /// (`Session::send_local`/`send_remote`), which is where the event loop
    /// handle lives.
    pub(crate) fn send(&self, bytes: &[u8]) -> Result<()> {
        self.send_framed(bytes)
    }

    /// Same as `send`, encoding `text` as ASCII bytes.
    pub(crate) fn send_text(&self, text: &str) -> Result<()> {
        self.send_framed(text.as_bytes())
    }

    fn send_framed(&self, payload: &[u8]) -> Result<()> {
        if self.disposed.get() {
            return Err(RelayError::ShuttingDown);
        }
        let mut framed = BytesMut::with_capacity(payload.len() + 1);
        framed.extend_from_slice(payload);
        framed.extend_from_slice(&[0]);
        let mut writer = self.send_writer.borrow_mut();
        writer.write_bytes(framed.freeze());
        writer.notify();
        Ok(())
    }

    /// Idempotent. Completes the send pipe's writer half and shuts down
    /// *both* directions of the socket (spec.md §4.4 step 2): a write-only
    /// half-close would leave `recv_from_socket`'s clone of this socket
    /// blocked in a pending read forever whenever disposal is triggered by
    /// the peer direction rather than this one. The recv pipe and the send
    /// pipe's reader half complete themselves naturally once their owning
    /// tasks observe the resulting EOF/error from that shutdown.
    pub(crate) async fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.send_writer.borrow_mut().complete();
        if let Err(e) = relay_core::tcp::shutdown_both(&*self.socket.borrow()) {
            trace!(error = %e, direction = %self.direction, "socket shutdown failed during disposal");
        }
    }
}

/// Loop: acquire a writable region from the recv pipe, read the socket into
/// it, advance and flush. Breaks on a zero-length read, a non-recoverable
/// error, cancellation, or a completed reader, then completes the pipe and
/// runs `on_eof`.
pub(crate) async fn recv_from_socket(
    mut socket: TcpStream,
    mut writer: PipeWriter,
    cancel: CancelToken,
    on_error: impl FnOnce(io::Error) + 'static,
    on_eof: impl FnOnce() + 'static,
) {
    let mut failure = None;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let slab = writer.get_writable_memory(RECV_CHUNK);
        let outcome = socket.read(slab).await;
        match outcome.0 {
            Ok(0) => break,
            Ok(n) => {
                writer.advance(outcome.1, n);
                if writer.flush().await.completed {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                trace!(error = %e, "recv_from_socket: treating as EOF");
                failure = Some(e);
                break;
            }
        }
    }
    writer.complete();
    if let Some(e) = failure {
        on_error(e);
    }
    on_eof();
}

/// Loop: read from the recv pipe, peel off every complete NUL-terminated
/// frame, deliver each to `on_message`, and advance past what was consumed.
/// A trailing partial frame is left buffered via `advance_to`'s `examined`
/// so the pipe does not re-fire until more bytes arrive.
pub(crate) async fn frame_from_recv(
    mut reader: PipeReader,
    cancel: CancelToken,
    mut on_message: impl FnMut(&str) + 'static,
    on_eof: impl FnOnce() + 'static,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let ReadResult { mut buffer, completed } = reader.read().await;
        let mut consumed = 0usize;
        while let Some(terminator) = buffer.position_of(0) {
            if let Some(message) = buffer.take_bytes(terminator) {
                // The core performs no content validation (spec Non-goal):
                // every NUL-delimited frame is delivered, even one
                // containing bytes outside 7-bit ASCII. `String`'s lossy
                // conversion is the only way to hand a non-UTF8-safe byte
                // sequence to the `&str`-shaped observer API without
                // silently dropping the message.
                match std::str::from_utf8(&message) {
                    Ok(text) => on_message(text),
                    Err(_) => {
                        trace!("frame_from_recv: lossily decoding non-ASCII frame");
                        on_message(&String::from_utf8_lossy(&message));
                    }
                }
            }
            buffer.advance(1); // the NUL itself
            consumed += terminator + 1;
        }
        let examined = consumed + buffer.len();
        reader.advance_to(consumed, examined);
        if completed {
            break;
        }
    }
    reader.complete();
    on_eof();
}

/// Loop: read from the send pipe, write the whole returned buffer to the
/// socket, advance past it. Breaks on a completed reader, cancellation, or
/// a socket write error.
pub(crate) async fn send_to_socket(
    mut socket: TcpStream,
    mut reader: PipeReader,
    cancel: CancelToken,
    on_error: impl FnOnce(io::Error) + 'static,
    on_eof: impl FnOnce() + 'static,
) {
    let mut failure = None;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let ReadResult { mut buffer, completed } = reader.read().await;
        let total = buffer.len();
        let mut write_failed = false;
        if total > 0 {
            if let Some(bytes) = buffer.take_bytes(total) {
                if let Err(e) = socket.write_all(bytes).await.0 {
                    trace!(error = %e, "send_to_socket: treating as EOF");
                    write_failed = true;
                    failure = Some(e);
                }
            }
        }
        reader.advance_to(total, total);
        if write_failed || completed {
            break;
        }
    }
    reader.complete();
    if let Some(e) = failure {
        on_error(e);
    }
    on_eof();
}
