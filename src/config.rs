//! Server configuration. The binary takes no CLI arguments; this exists so
//! tests can bind an ephemeral port instead of the fixed one.

use std::net::SocketAddr;
use std::time::Duration;

/// Listen backlog passed to `listen(2)`.
pub const BACKLOG: i32 = 10;
/// Poll tick interval; exists for future housekeeping, no time-based work
/// is required yet.
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Config {
    /// IPv4 any-address to bind. `0.0.0.0:3490` by default, any free port in
    /// tests.
    pub bind_addr: SocketAddr,
    /// IPv6 any-address to bind alongside `bind_addr`, covering "any-address,
    /// port 3490" for both families. `None` disables the IPv6 listener
    /// (tests use a single ephemeral port and don't need it).
    pub bind_addr_v6: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3490".parse().expect("valid default address"),
            bind_addr_v6: Some("[::]:3490".parse().expect("valid default address")),
        }
    }
}

impl Config {
    /// A config bound to a single address, with no IPv6 listener. Used by
    /// tests that want one predictable ephemeral port.
    pub fn with_addr(bind_addr: SocketAddr) -> Self {
        Self { bind_addr, bind_addr_v6: None }
    }
}
