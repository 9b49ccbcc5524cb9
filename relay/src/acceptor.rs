//! `Acceptor`: the listening socket, and the loop that turns each inbound
//! connection into a running `Session`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{info, warn};

use relay_core::config::RelayConfig;
use relay_core::error::Result;

use crate::event_loop::EventLoop;
use crate::session::Session;

/// How often the accept loop wakes up to re-check cancellation when no
/// connection is pending. Keeps `dispose()` responsive even on an idle
/// listener instead of blocking in `accept()` until the next connection.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Binds a listening socket and, for each accepted connection, dials the
/// configured remote endpoint and starts a session.
pub struct Acceptor {
    event_loop: EventLoop,
}

impl Acceptor {
    #[must_use]
    pub fn new(event_loop: EventLoop) -> Self {
        Self { event_loop }
    }

    /// Begin accepting. If not already on the worker thread, schedules
    /// itself there first so the listening socket is owned consistently
    /// with every other resource the relay creates.
    ///
    /// Applies `config.tick_period_ms` to the owning event loop, so the
    /// cadence configured here (spec.md §6) is the one `on_tick` actually
    /// runs at, rather than whatever was passed to `EventLoop::new`.
    pub fn bind(&self, config: RelayConfig) -> Result<()> {
        let event_loop = self.event_loop.clone();
        event_loop.set_tick_period_ms(config.tick_period_ms);
        if event_loop.is_worker_thread() {
            spawn_accept_loop(event_loop, config);
            Ok(())
        } else {
            event_loop.clone().schedule(move || spawn_accept_loop(event_loop, config))
        }
    }
}

fn spawn_accept_loop(event_loop: EventLoop, config: RelayConfig) {
    compio::runtime::spawn(async move {
        if let Err(e) = accept_loop(event_loop, config).await {
            warn!(error = %e, "acceptor stopped");
        }
    })
    .detach();
}

async fn accept_loop(event_loop: EventLoop, config: RelayConfig) -> Result<()> {
    let listener = relay_core::tcp::bind_listener(config.local.addr(), config.backlog)?;
    let cancel = event_loop.cancel_token();
    let sessions: Rc<RefCell<Vec<Session>>> = Rc::new(RefCell::new(Vec::new()));

    info!(local = %config.local, remote = %config.remote, "acceptor listening");

    loop {
        sessions.borrow_mut().retain(|s| !s.is_disposed());

        if cancel.is_cancelled() {
            dispose_all(&sessions);
            break;
        }

        match compio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((local_stream, _peer_addr))) => {
                if let Err(e) = relay_core::tcp::enable_tcp_nodelay(&local_stream) {
                    warn!(error = %e, "failed to set TCP_NODELAY on accepted socket");
                }
                match compio::net::TcpStream::connect(config.remote.addr()).await {
                    Ok(remote_stream) => {
                        if let Err(e) = relay_core::tcp::enable_tcp_nodelay(&remote_stream) {
                            warn!(error = %e, "failed to set TCP_NODELAY on dialed socket");
                        }
                        let session = Session::new(
                            event_loop.clone(),
                            config.watermarks,
                            local_stream,
                            remote_stream,
                        );
                        sessions.borrow_mut().push(session.clone());
                        session.start();
                    }
                    Err(e) => {
                        warn!(error = %e, remote = %config.remote, "dial failed, dropping accepted connection");
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "accept failed, continuing");
            }
            Err(_) => {} // poll interval elapsed, loop back to the cancellation check
        }
    }

    let _ = listener.close().await;
    Ok(())
}

fn dispose_all(sessions: &Rc<RefCell<Vec<Session>>>) {
    for session in sessions.borrow().iter() {
        session.trigger_disposal();
    }
}
