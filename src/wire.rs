//! The tagged message envelope.
//!
//! Every payload is a self-describing UTF-8 JSON record whose `type` field
//! selects the variant. Receivers ignore unknown fields; unknown tags and
//! malformed payloads decode to `None` and are dropped by callers.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::types::{NatKind, PeerId, SwarmId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Ping {
        id: PeerId,
        nat: NatKind,
        restart: u64,
    },
    /// Echo of the receiver's view of the sender: `address`/`port` are the
    /// source endpoint the pong's sender observed.
    Pong {
        id: PeerId,
        address: Ipv4Addr,
        port: u16,
        nat: NatKind,
        restart: u64,
        timestamp: u64,
    },
    /// Reachability probe aimed at the well-known test port.
    Test {
        id: PeerId,
        address: Ipv4Addr,
        port: u16,
        nat: NatKind,
    },
    Intro {
        id: PeerId,
        target: PeerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        swarm: Option<SwarmId>,
    },
    IntroError {
        id: PeerId,
        target: PeerId,
        call: String,
    },
    /// Introduction payload describing the peer named `target`.
    Connect {
        id: PeerId,
        target: PeerId,
        address: Ipv4Addr,
        port: u16,
        nat: NatKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        swarm: Option<SwarmId>,
    },
    /// Advertises the sender's LAN endpoint for same-NAT pairs.
    Local {
        id: PeerId,
        address: Ipv4Addr,
        port: u16,
    },
    Join {
        id: PeerId,
        swarm: SwarmId,
        nat: NatKind,
        peers: u32,
    },
    JoinError {
        id: PeerId,
        swarm: SwarmId,
        peers: u32,
        call: String,
    },
    /// Envelope forwarded verbatim to `target`; the content stays an opaque
    /// JSON value so unknown inner envelopes survive the hop.
    Relay {
        target: PeerId,
        content: serde_json::Value,
    },
}

impl Message {
    /// Wrap `inner` for forwarding to `target` through an introducer.
    pub fn relay(target: PeerId, inner: &Message) -> Message {
        // Infallible: Message serializes through derived impls with string keys only
        let content =
            serde_json::to_value(inner).expect("message enum always serializes to a JSON value");
        Message::Relay { target, content }
    }
}

pub fn encode(msg: &Message) -> Vec<u8> {
    // Infallible: Message serializes through derived impls with string keys only
    serde_json::to_vec(msg).expect("message enum always serializes to JSON")
}

pub fn decode(data: &[u8]) -> Option<Message> {
    serde_json::from_slice(data).ok()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
