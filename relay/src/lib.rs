//! # Relay
//!
//! A transparent TCP proxy for a length-delimited, NUL-terminated ASCII
//! message protocol, built on `io_uring` via `compio`.
//!
//! The relay accepts inbound connections on a local endpoint, dials a fixed
//! remote endpoint for each one, and relays bytes in both directions while
//! exposing every complete message to an embedder-supplied [`RelayObserver`].
//! It emits a periodic tick usable for timeouts, keep-alives, or synthetic
//! injection.
//!
//! ## Architecture
//!
//! - **`relay-core`**: runtime-agnostic building blocks — the slab allocator,
//!   the segmented byte buffer, backpressure watermarks, and the pipe built
//!   from them.
//! - **`relay`** (this crate): the single-threaded [`EventLoop`] worker, the
//!   per-socket [`PipedConnection`], the paired [`Session`], and the
//!   [`Acceptor`] that ties them together.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relay::{Acceptor, EventLoop, RelayObserver, Session};
//! use relay_core::config::RelayConfig;
//! use relay_core::endpoint::Endpoint;
//!
//! struct Echo;
//!
//! impl RelayObserver for Echo {
//!     fn on_local_message(&self, session: &Session, text: &str) {
//!         let _ = session.send_remote_text(text);
//!     }
//! }
//!
//! # fn main() -> relay_core::error::Result<()> {
//! let event_loop = EventLoop::new(Arc::new(Echo), 1);
//! let config = RelayConfig::new(
//!     Endpoint::parse("127.0.0.1:9000")?,
//!     Endpoint::parse("127.0.0.1:9001")?,
//! );
//! Acceptor::new(event_loop.clone()).bind(config)?;
//! # event_loop.dispose();
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! `unsafe` code is isolated to `relay-core::alloc` (the pinned slab
//! allocator feeding zero-copy socket reads) and a small raw-fd shim in
//! `relay-core::tcp` for setting `TCP_NODELAY`. Everything in this crate is
//! safe Rust.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)] // single-threaded worker; futures are intentionally !Send
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod acceptor;
pub mod connection;
pub mod event_loop;
pub mod observer;
pub mod session;

/// Development helpers (benches/tests).
pub mod dev_tracing;

pub use acceptor::Acceptor;
pub use connection::{Direction, PipedConnection};
pub use event_loop::{CancelToken, EventLoop};
pub use observer::{NoopObserver, RelayObserver};
pub use session::Session;

pub use relay_core::config::RelayConfig;
pub use relay_core::endpoint::Endpoint;
pub use relay_core::error::{RelayError, Result};
