//! Relay Core
//!
//! Runtime-agnostic building blocks shared by the relay's connection and
//! session plumbing:
//! - Pinned / io_uring-safe slab allocation (`alloc`)
//! - Zero-copy segmented byte queue (`buffer`)
//! - Byte-count backpressure policy (`backpressure`)
//! - The backpressured byte pipe built from the above (`pipe`)
//! - TCP endpoint addressing (`endpoint`)
//! - Relay configuration (`config`)
//! - Error types (`error`)
//! - Socket tuning helpers (`tcp`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]
pub mod alloc;
pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod pipe;
pub mod tcp;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::alloc::{IoArena, SlabMut};
    pub use crate::backpressure::{BackpressurePolicy, Watermarks};
    pub use crate::buffer::SegmentedBuffer;
    pub use crate::config::RelayConfig;
    pub use crate::endpoint::{Endpoint, EndpointError};
    pub use crate::error::{RelayError, Result};
    pub use crate::pipe::{pipe, FlushResult, PipeReader, PipeWriter, ReadResult};
}
