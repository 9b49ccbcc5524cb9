//! `ProxySession`: a paired local/remote `PipedConnection`, the tasks that
//! drive them, and the joint lifecycle that disposes both at once.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use relay_core::backpressure::Watermarks;
use relay_core::error::{RelayError, Result};

use crate::connection::{self, ConnectionTaskPipes, Direction, PipedConnection};
use crate::event_loop::EventLoop;

struct SessionInner {
    local: PipedConnection,
    remote: PipedConnection,
    pending_pipes: RefCell<Option<(ConnectionTaskPipes, ConnectionTaskPipes)>>,
    event_loop: EventLoop,
    disposed: Cell<bool>,
    user_token: RefCell<Option<Box<dyn Any>>>,
}

/// A paired inbound/upstream connection and its associated state.
///
/// Cheap to clone; every clone refers to the same underlying session. All
/// methods besides construction are meant to be called from the owning
/// event loop's worker thread — `send_local`/`send_remote` enforce this.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// *pending*: both sockets are connected but no task has been scheduled
    /// yet. Call `start` to transition to *running*.
    pub(crate) fn new(
        event_loop: EventLoop,
        watermarks: Watermarks,
        local_socket: compio::net::TcpStream,
        remote_socket: compio::net::TcpStream,
    ) -> Self {
        let (local, local_pipes) = PipedConnection::new(Direction::Local, local_socket, watermarks);
        let (remote, remote_pipes) = PipedConnection::new(Direction::Remote, remote_socket, watermarks);
        Self {
            inner: Rc::new(SessionInner {
                local,
                remote,
                pending_pipes: RefCell::new(Some((local_pipes, remote_pipes))),
                event_loop,
                disposed: Cell::new(false),
                user_token: RefCell::new(None),
            }),
        }
    }

    /// pending -> running: emits the *connected* event, then spawns the
    /// three cooperative tasks for each connection.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same session.
    pub(crate) fn start(&self) {
        let (local_pipes, remote_pipes) = self
            .inner
            .pending_pipes
            .borrow_mut()
            .take()
            .expect("Session::start called twice");

        self.inner.event_loop.observer().on_client_state_changed(self, true);

        let cancel = self.inner.event_loop.cancel_token();

        let ConnectionTaskPipes { recv_writer, recv_reader, send_reader } = local_pipes;
        compio::runtime::spawn(connection::recv_from_socket(
            self.inner.local.socket_clone(),
            recv_writer,
            cancel.clone(),
            self.on_error(Direction::Local),
            self.on_eof(),
        ))
        .detach();
        compio::runtime::spawn(connection::frame_from_recv(
            recv_reader,
            cancel.clone(),
            self.on_message(Direction::Local),
            self.on_eof(),
        ))
        .detach();
        compio::runtime::spawn(connection::send_to_socket(
            self.inner.local.socket_clone(),
            send_reader,
            cancel.clone(),
            self.on_error(Direction::Local),
            self.on_eof(),
        ))
        .detach();

        let ConnectionTaskPipes { recv_writer, recv_reader, send_reader } = remote_pipes;
        compio::runtime::spawn(connection::recv_from_socket(
            self.inner.remote.socket_clone(),
            recv_writer,
            cancel.clone(),
            self.on_error(Direction::Remote),
            self.on_eof(),
        ))
        .detach();
        compio::runtime::spawn(connection::frame_from_recv(
            recv_reader,
            cancel.clone(),
            self.on_message(Direction::Remote),
            self.on_eof(),
        ))
        .detach();
        compio::runtime::spawn(connection::send_to_socket(
            self.inner.remote.socket_clone(),
            send_reader,
            cancel,
            self.on_error(Direction::Remote),
            self.on_eof(),
        ))
        .detach();
    }

    fn on_message(&self, direction: Direction) -> impl FnMut(&str) + 'static {
        let session = self.clone();
        move |text: &str| {
            let observer = session.inner.event_loop.observer();
            match direction {
                Direction::Local => observer.on_local_message(&session, text),
                Direction::Remote => observer.on_remote_message(&session, text),
            }
        }
    }

    fn on_error(&self, direction: Direction) -> impl FnOnce(std::io::Error) + 'static {
        let session = self.clone();
        move |error: std::io::Error| {
            session.inner.event_loop.observer().on_transport_error(&session, direction, &error);
        }
    }

    fn on_eof(&self) -> impl FnOnce() + 'static {
        let session = self.clone();
        move || session.trigger_disposal()
    }

    /// First caller wins; later callers are no-ops. Runs the async teardown
    /// (socket shutdown, disconnected event) as a detached worker-local
    /// task, since the task loops that call this are themselves
    /// synchronous callbacks.
    pub(crate) fn trigger_disposal(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let session = self.clone();
        compio::runtime::spawn(async move {
            session.inner.event_loop.observer().on_client_state_changed(&session, false);
            session.inner.local.dispose().await;
            session.inner.remote.dispose().await;
        })
        .detach();
    }

    /// `true` once disposal has been triggered (teardown may still be
    /// in flight on the worker).
    #[must_use]
    pub(crate) fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn send_on(&self, connection: &PipedConnection, bytes: &[u8]) -> Result<()> {
        if !self.inner.event_loop.is_worker_thread() {
            return Err(RelayError::WrongThread);
        }
        connection.send(bytes)
    }

    fn send_text_on(&self, connection: &PipedConnection, text: &str) -> Result<()> {
        if !self.inner.event_loop.is_worker_thread() {
            return Err(RelayError::WrongThread);
        }
        connection.send_text(text)
    }

    /// Push a message to the inbound peer. NUL terminator is appended by
    /// the core. Fails with `WrongThread` off the worker.
    pub fn send_local(&self, bytes: &[u8]) -> Result<()> {
        self.send_on(&self.inner.local, bytes)
    }

    /// Same as `send_local`, encoding `text` as ASCII bytes.
    pub fn send_local_text(&self, text: &str) -> Result<()> {
        self.send_text_on(&self.inner.local, text)
    }

    /// Push a message to the upstream peer. NUL terminator is appended by
    /// the core. Fails with `WrongThread` off the worker.
    pub fn send_remote(&self, bytes: &[u8]) -> Result<()> {
        self.send_on(&self.inner.remote, bytes)
    }

    /// Same as `send_remote`, encoding `text` as ASCII bytes.
    pub fn send_remote_text(&self, text: &str) -> Result<()> {
        self.send_text_on(&self.inner.remote, text)
    }

    /// Attach arbitrary embedder state to this session, replacing any
    /// previous token.
    pub fn set_user_token<T: 'static>(&self, token: T) {
        *self.inner.user_token.borrow_mut() = Some(Box::new(token));
    }

    /// Borrow the attached token, if one was set and its type matches `T`.
    #[must_use]
    pub fn user_token<T: 'static>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.inner.user_token.borrow(), |slot| {
            slot.as_ref().and_then(|boxed| boxed.downcast_ref::<T>())
        })
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use std::sync::Arc;

    fn make_event_loop() -> EventLoop {
        EventLoop::new(Arc::new(NoopObserver), 1)
    }

    #[test]
    fn user_token_round_trips_by_type() {
        let event_loop = make_event_loop();
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let listener = compio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let connect = compio::net::TcpStream::connect(addr);
            let (accepted, dialed) = futures::future::join(
                async { listener.accept().await.unwrap().0 },
                async { connect.await.unwrap() },
            )
            .await;

            let session = Session::new(event_loop.clone(), Watermarks::default(), accepted, dialed);
            session.set_user_token(42u32);
            assert_eq!(*session.user_token::<u32>().unwrap(), 42);
            assert!(session.user_token::<String>().is_none());
        });
        event_loop.dispose();
    }

    #[test]
    fn send_off_worker_thread_fails() {
        let event_loop = make_event_loop();
        let rt = compio::runtime::Runtime::new().unwrap();
        let session = rt.block_on(async {
            let listener = compio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let connect = compio::net::TcpStream::connect(addr);
            let (accepted, dialed) = futures::future::join(
                async { listener.accept().await.unwrap().0 },
                async { connect.await.unwrap() },
            )
            .await;
            Session::new(event_loop.clone(), Watermarks::default(), accepted, dialed)
        });

        assert!(matches!(session.send_local(b"hi"), Err(RelayError::WrongThread)));
        event_loop.dispose();
    }
}
