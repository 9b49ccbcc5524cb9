//! The embedder's event sink.
//!
//! Registered once, at construction, and shared process-wide by every
//! session the relay creates: a single explicit observer object avoids the
//! data races a mutable per-session event-slot registry would invite.
//! Every method runs on the event loop's worker thread.

use crate::connection::Direction;
use crate::session::Session;

/// Callbacks the relay invokes as sessions connect, exchange messages, and
/// disconnect, plus the loop's periodic heartbeat.
///
/// All methods default to doing nothing, so an embedder only implements the
/// ones it cares about.
pub trait RelayObserver: Send + Sync {
    /// A complete message was received from the inbound peer.
    fn on_local_message(&self, _session: &Session, _text: &str) {}

    /// A complete message was received from the upstream peer.
    fn on_remote_message(&self, _session: &Session, _text: &str) {}

    /// The session entered *running* (`true`) or *disposed* (`false`).
    fn on_client_state_changed(&self, _session: &Session, _connected: bool) {}

    /// Periodic heartbeat; `elapsed_ms` is monotonically non-decreasing
    /// since the loop started.
    fn on_tick(&self, _elapsed_ms: u64) {}

    /// A socket read/write on `direction` failed and was recovered locally
    /// (treated as EOF, triggering session disposal). Per the error handling
    /// design this is diagnostics only: the session's fate is already
    /// decided by the time this fires, and is also visible as
    /// `on_client_state_changed(_, false)`.
    fn on_transport_error(&self, _session: &Session, _direction: Direction, _error: &std::io::Error) {}

    /// A scheduled work item or tick callback panicked; the loop caught it
    /// and continues. `message` is the panic payload, stringified.
    fn on_callback_panic(&self, _message: &str) {}
}

/// An observer that discards every event. Useful for tests and for
/// embedders that only want `send`/control-surface access without
/// reacting to traffic.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {}
