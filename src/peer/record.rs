use std::net::{Ipv4Addr, SocketAddrV4};

use crate::types::{Liveness, NatKind, PeerId};

/// The most recently observed view of ourselves echoed by some pong:
/// `address`/`port` are our external endpoint as the pong's sender saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongState {
    pub timestamp: u64,
    pub address: Ipv4Addr,
    pub port: u16,
}

/// Everything known about one remote peer. Records are created on first
/// learned contact and removed only explicitly; Forgotten is a
/// classification, not a deletion.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: PeerId,
    pub address: Ipv4Addr,
    pub port: u16,
    pub nat: NatKind,
    /// Local port a traversal burst punched for this peer; sends prefer it
    /// over the main port once set.
    pub outport: Option<u16>,
    /// The peer's boot timestamp, for restart detection.
    pub restart: u64,
    /// When we last sent to this peer; 0 means never.
    pub last_sent: u64,
    /// When we last heard from this peer; `None` means never.
    pub last_recv: Option<u64>,
    /// Their latest echo of our external endpoint.
    pub pong: Option<PongState>,
}

impl PeerRecord {
    pub fn new(id: PeerId, address: Ipv4Addr, port: u16, nat: NatKind) -> Self {
        Self {
            id,
            address,
            port,
            nat,
            outport: None,
            restart: 0,
            last_sent: 0,
            last_recv: None,
            pong: None,
        }
    }

    pub fn endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }

    /// Point the record at a new endpoint, dropping state tied to the old
    /// one (their echo of us, the send throttle, the punched port).
    pub fn relocate(&mut self, address: Ipv4Addr, port: u16) {
        if self.address != address || self.port != port {
            self.address = address;
            self.port = port;
            self.pong = None;
            self.outport = None;
            self.last_sent = 0;
        }
    }

    pub fn heard(&mut self, now: u64) {
        self.last_recv = Some(now);
    }

    /// Liveness by silence duration. A record never heard from classifies as
    /// Missing: known, but not yet proven reachable.
    pub fn classify(&self, now: u64) -> Liveness {
        match self.last_recv {
            None => Liveness::Missing,
            Some(t) => Liveness::of_silence(now.saturating_sub(t)),
        }
    }

    /// Whether a message arrived from this peer within `window` ms.
    pub fn heard_within(&self, now: u64, window: u64) -> bool {
        self.last_recv
            .is_some_and(|t| now.saturating_sub(t) < window)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
