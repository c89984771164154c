//! The narrow interface a peer drives its host through.
//!
//! Both the simulator ([`crate::sim`]) and the real UDP binding
//! ([`crate::udp`]) implement [`Transport`]; the peer is indifferent to
//! which. Timers are identified by token rather than callback so the peer
//! stays a single-owner state machine: the host calls
//! [`crate::peer::Peer::on_timer`] with the token when it fires.

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

use crate::types::PeerId;

/// Token naming a scheduled firing back into the peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timer {
    /// The periodic keepalive interval.
    KeepAlive,
    /// Deadline for NAT evaluation to decide with whatever arrived.
    NatEval,
    /// Next birthday-scan probe toward a hard peer.
    BdpProbe(PeerId),
}

/// Fatal at startup for the two reserved ports; burst binds degrade
/// gracefully instead.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("port {0} is already bound")]
    InUse(u16),
    #[error("no ephemeral ports available")]
    Exhausted,
    #[error("bind failed: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Transport {
    /// Fire-and-forget datagram send from a bound local port.
    fn send(&mut self, payload: &[u8], to: SocketAddrV4, from_port: u16);

    /// Schedule `timer` to fire after `delay` ms; a nonzero `repeat`
    /// reschedules it every `repeat` ms after that. A zero delay fires at the
    /// current tick, after the event being processed.
    fn set_timer(&mut self, timer: Timer, delay: u64, repeat: u64);

    /// Bind a local port; 0 requests a fresh ephemeral port. Returns the
    /// port actually bound.
    fn bind(&mut self, port: u16) -> Result<u16, BindError>;

    /// The address this host presents inside its own network segment.
    fn local_addr(&self) -> Ipv4Addr;
}
