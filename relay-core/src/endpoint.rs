//! TCP endpoint addressing.
//!
//! The relay is TCP-only, so `Endpoint` is a thin `tcp://host:port` parser
//! rather than the transport-agnostic enum a broader messaging runtime
//! would need.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A TCP transport endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(pub SocketAddr);

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Accepts `tcp://host:port` or a bare `host:port` (the `tcp://` prefix
    /// is optional so embedders can pass a `SocketAddr`'s `Display` output
    /// straight through).
    ///
    /// # Examples
    ///
    /// ```
    /// use relay_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
    ///
    /// let endpoint = Endpoint::parse("127.0.0.1:5555").unwrap();
    /// assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr_str = s.strip_prefix("tcp://").unwrap_or(s);
        addr_str
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| EndpointError::InvalidTcpAddress(addr_str.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.0)
    }
}

/// Errors that can occur when parsing an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid TCP address: {0}")]
    InvalidTcpAddress(String),
}
