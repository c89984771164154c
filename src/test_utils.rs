//! Shared test scaffolding: a recording transport and proptest strategies.

use std::{
    collections::BTreeSet,
    net::{Ipv4Addr, SocketAddrV4},
};

use proptest::prelude::*;

use crate::{
    transport::{BindError, Timer, Transport},
    types::{NatKind, PeerId},
    wire::Message,
};

/// One datagram captured by [`MockTransport`], already decoded.
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub msg: Message,
    pub to: SocketAddrV4,
    pub from: u16,
}

/// Transport that records everything a peer does to it.
pub struct MockTransport {
    pub addr: Ipv4Addr,
    pub sent: Vec<SentPacket>,
    pub timers: Vec<(Timer, u64, u64)>,
    pub bound: BTreeSet<u16>,
    /// Ports that refuse to bind, for failure-path tests.
    pub refuse: BTreeSet<u16>,
    next_ephemeral: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            addr: Ipv4Addr::new(192, 168, 0, 10),
            sent: Vec::new(),
            timers: Vec::new(),
            bound: BTreeSet::new(),
            refuse: BTreeSet::new(),
            next_ephemeral: 49152,
        }
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.timers.clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&mut self, payload: &[u8], to: SocketAddrV4, from_port: u16) {
        let msg = crate::wire::decode(payload)
            .expect("peers only emit well-formed envelopes in tests");
        self.sent.push(SentPacket {
            msg,
            to,
            from: from_port,
        });
    }

    fn set_timer(&mut self, timer: Timer, delay: u64, repeat: u64) {
        self.timers.push((timer, delay, repeat));
    }

    fn bind(&mut self, port: u16) -> Result<u16, BindError> {
        if port != 0 {
            if self.refuse.contains(&port) {
                return Err(BindError::InUse(port));
            }
            match self.bound.insert(port) {
                true => Ok(port),
                false => Err(BindError::InUse(port)),
            }
        } else {
            loop {
                let candidate = self.next_ephemeral;
                self.next_ephemeral = self.next_ephemeral.checked_add(1).ok_or(BindError::Exhausted)?;
                if !self.refuse.contains(&candidate) && self.bound.insert(candidate) {
                    return Ok(candidate);
                }
            }
        }
    }

    fn local_addr(&self) -> Ipv4Addr {
        self.addr
    }
}

// ─── Proptest strategies ────────────────────────────────────────────────────

pub fn arb_peer_id() -> impl Strategy<Value = PeerId> {
    "[a-f0-9]{16}".prop_map(PeerId::new)
}

pub fn arb_nat_kind() -> impl Strategy<Value = NatKind> {
    prop_oneof![
        Just(NatKind::Unknown),
        Just(NatKind::Static),
        Just(NatKind::Easy),
        Just(NatKind::Hard),
    ]
}

pub fn arb_public_ipv4() -> impl Strategy<Value = Ipv4Addr> {
    (1u8..=223, any::<u8>(), any::<u8>(), 1u8..=254)
        .prop_map(|(a, b, c, d)| Ipv4Addr::new(a, b, c, d))
        .prop_filter("public address", |ip| {
            !ip.is_private() && !ip.is_loopback() && !ip.is_multicast()
        })
}

pub fn arb_endpoint() -> impl Strategy<Value = SocketAddrV4> {
    (arb_public_ipv4(), 1024u16..=65535).prop_map(|(ip, port)| SocketAddrV4::new(ip, port))
}
