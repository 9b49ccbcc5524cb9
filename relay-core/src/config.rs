//! Relay configuration.
//!
//! No environment variables or config files are read by the core itself —
//! `RelayConfig` is assembled in-process by the embedder.

use crate::backpressure::Watermarks;
use crate::endpoint::Endpoint;

/// Configuration for one relay: which local endpoint to accept on, which
/// remote endpoint to dial per accepted connection, and the operational
/// knobs that don't belong to either.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Endpoint the acceptor binds and listens on.
    pub local: Endpoint,

    /// Endpoint dialed once per accepted local connection.
    pub remote: Endpoint,

    /// Minimum milliseconds between tick emissions. `0` means "spin" —
    /// emit a tick every time the work queue drains.
    pub tick_period_ms: u64,

    /// Listener backlog. Fixed at 128 by default per the relay's documented
    /// contract; exposed so tests can shrink it.
    pub backlog: u32,

    /// Backpressure watermarks applied to every pipe the relay creates.
    pub watermarks: Watermarks,
}

impl RelayConfig {
    #[must_use]
    pub fn new(local: Endpoint, remote: Endpoint) -> Self {
        Self {
            local,
            remote,
            tick_period_ms: 1,
            backlog: 128,
            watermarks: Watermarks::default(),
        }
    }

    #[must_use]
    pub const fn with_tick_period_ms(mut self, tick_period_ms: u64) -> Self {
        self.tick_period_ms = tick_period_ms;
        self
    }

    #[must_use]
    pub const fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    #[must_use]
    pub const fn with_watermarks(mut self, watermarks: Watermarks) -> Self {
        self.watermarks = watermarks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_contract() {
        let local = Endpoint::parse("127.0.0.1:0").unwrap();
        let remote = Endpoint::parse("127.0.0.1:1").unwrap();
        let cfg = RelayConfig::new(local, remote);
        assert_eq!(cfg.tick_period_ms, 1);
        assert_eq!(cfg.backlog, 128);
    }

    #[test]
    fn builder_overrides_apply() {
        let local = Endpoint::parse("127.0.0.1:0").unwrap();
        let remote = Endpoint::parse("127.0.0.1:1").unwrap();
        let cfg = RelayConfig::new(local, remote)
            .with_tick_period_ms(10)
            .with_backlog(16);
        assert_eq!(cfg.tick_period_ms, 10);
        assert_eq!(cfg.backlog, 16);
    }
}
