use std::net::SocketAddrV4;

use crate::{
    protocol::{DEFAULT_JOIN_PEERS, KEEP_ALIVE_TIMEOUT, LOCAL_PORT, TEST_PORT},
    types::PeerId,
};

/// Operator inputs for one peer.
#[derive(Debug, Clone)]
pub struct Config {
    /// This peer's identity.
    pub id: PeerId,
    /// Statically reachable peers used for NAT evaluation, introductions and
    /// swarm joins. The first two answer the evaluation pings.
    pub introducers: Vec<SocketAddrV4>,
    /// Main bound port.
    pub local_port: u16,
    /// Probe port for unsolicited-inbound detection.
    pub test_port: u16,
    /// Keepalive interval in milliseconds; 0 disables the interval.
    pub keep_alive: u64,
    /// Introductions requested per join.
    pub join_peers: u32,
    /// Serve intro/join/test for other peers. Introducers skip NAT
    /// evaluation; their address is static by definition.
    pub introducer: bool,
    /// Seed for the peer's private PRNG (scan ports, shuffles).
    pub seed: u64,
}

impl Config {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            introducers: Vec::new(),
            local_port: LOCAL_PORT,
            test_port: TEST_PORT,
            keep_alive: KEEP_ALIVE_TIMEOUT,
            join_peers: DEFAULT_JOIN_PEERS,
            introducer: false,
            seed: 0,
        }
    }
}
