//! Timing and port constants of the traversal protocol.
//!
//! All durations are milliseconds; the peer core and the simulator share a
//! single `u64` millisecond clock.

/// Default main port a peer binds and speaks from.
pub const LOCAL_PORT: u16 = 3456;

/// Default probe port used to detect unsolicited inbound reachability.
pub const TEST_PORT: u16 = 3457;

/// Cadence of birthday-scan probes from the easy side.
pub const BDP_INTERVAL: u64 = 10;

/// Upper bound on birthday-scan probes per attempt.
pub const BDP_MAX_PACKETS: u32 = 1000;

/// Number of fresh local ports the hard side opens in one burst.
pub const BDP_SOCKETS: usize = 256;

/// Window during which a connection attempt suppresses a new one.
pub const CONNECTING_MAX_TIME: u64 = BDP_INTERVAL * BDP_MAX_PACKETS as u64;

/// Silence threshold driving liveness classification, and the default
/// keepalive interval.
pub const KEEP_ALIVE_TIMEOUT: u64 = 29_000;

/// How long NAT evaluation waits for introducer responses before deciding
/// with whatever arrived.
pub const NAT_EVAL_TIMEOUT: u64 = 2_000;

/// Minimum spacing between pings to the same peer.
pub const RETRY_PING_INTERVAL: u64 = 1_000;

/// Default number of introductions requested by a join.
pub const DEFAULT_JOIN_PEERS: u32 = 4;

/// Lowest port drawn by birthday-scan probes and simulated allocators.
pub const PORT_FLOOR: u16 = 1024;

/// Whether a port is one of the two reserved protocol ports.
pub fn is_reserved_port(port: u16) -> bool {
    port == LOCAL_PORT || port == TEST_PORT
}
