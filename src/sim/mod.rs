//! Deterministic in-memory model of IPv4 networks, NAT gateways and
//! sleeping hosts.
//!
//! Nodes live in an arena and refer to their parent network by id, so the
//! ownership graph stays acyclic while packets climb "up" through gateways.
//! A single seeded PRNG decides latency, loss and port allocation; the event
//! queue breaks timestamp ties FIFO. Two runs with the same seed and the
//! same calls produce byte-identical traces.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    net::{Ipv4Addr, SocketAddrV4},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::trace;

use crate::{
    config::Config,
    peer::Peer,
    transport::{BindError, Timer, Transport},
    types::{PeerId, SwarmId},
};

pub mod nat;
pub mod queue;

pub use nat::{Keying, NatProfile, NatTable, PortAlloc};
pub use queue::EventQueue;

type Thunk = Box<dyn FnOnce(&mut Simulator)>;

/// Deferred firings a sleeping node can hold before dropping new ones.
const AWAKEN_MAX: usize = 128;

/// Ephemeral range used for simulated `bind(0)`.
const EPHEMERAL_FLOOR: u16 = 49152;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena position; stable for a given construction order. Trace lines
    /// name nodes by this index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Link parameters applied to every scheduled hop.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    pub latency_min: u64,
    pub latency_max: u64,
    /// Probability a hop silently drops the packet.
    pub loss: f64,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            latency_min: 2,
            latency_max: 20,
            loss: 0.0,
        }
    }
}

struct Slot {
    parent: Option<NodeId>,
    /// Address within the parent network; for a NAT this is its public face.
    addr: Ipv4Addr,
    sleeping: bool,
    awaken: VecDeque<Deferred>,
    kind: Kind,
}

enum Kind {
    Host(Host),
    Net(Net),
    Nat(NatGateway),
}

#[derive(Default)]
struct Host {
    peer: Option<Peer>,
    bound: BTreeSet<u16>,
}

#[derive(Default)]
struct Net {
    subnet: BTreeMap<Ipv4Addr, NodeId>,
}

struct NatGateway {
    net: Net,
    table: NatTable,
}

enum Deferred {
    Message {
        data: Vec<u8>,
        src: SocketAddrV4,
        to_port: u16,
    },
    Timer {
        timer: Timer,
        repeat: u64,
    },
}

enum Route {
    Deliver { child: NodeId, to_port: u16 },
    Translated { ext_port: u16 },
    Drop(&'static str),
}

enum Inbound {
    ToPeer,
    Forward { child: NodeId, to_port: u16 },
    Drop(&'static str),
}

pub struct Simulator {
    queue: EventQueue<Thunk>,
    rng: StdRng,
    nodes: Vec<Slot>,
    root: NodeId,
    link: LinkOptions,
    /// Human-readable delivery/drop log; two equal-seed runs produce equal
    /// traces.
    pub trace: Vec<String>,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        let root = Slot {
            parent: None,
            addr: Ipv4Addr::UNSPECIFIED,
            sleeping: false,
            awaken: VecDeque::new(),
            kind: Kind::Net(Net::default()),
        };
        Self {
            queue: EventQueue::new(),
            rng: StdRng::seed_from_u64(seed),
            nodes: vec![root],
            root: NodeId(0),
            link: LinkOptions::default(),
            trace: Vec::new(),
        }
    }

    pub fn set_link(&mut self, link: LinkOptions) {
        self.link = link;
    }

    pub fn now(&self) -> u64 {
        self.queue.now()
    }

    /// The public internet: parent of every top-level host and NAT.
    pub fn root(&self) -> NodeId {
        self.root
    }

    // ─── Topology ───────────────────────────────────────────────────────────

    pub fn add_host(&mut self, parent: NodeId, addr: Ipv4Addr) -> NodeId {
        self.add_node(parent, addr, Kind::Host(Host::default()))
    }

    pub fn add_nat(&mut self, parent: NodeId, public_addr: Ipv4Addr, profile: NatProfile) -> NodeId {
        self.add_node(
            parent,
            public_addr,
            Kind::Nat(NatGateway {
                net: Net::default(),
                table: NatTable::new(profile),
            }),
        )
    }

    fn add_node(&mut self, parent: NodeId, addr: Ipv4Addr, kind: Kind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot {
            parent: Some(parent),
            addr,
            sleeping: false,
            awaken: VecDeque::new(),
            kind,
        });
        match &mut self.nodes[parent.0].kind {
            Kind::Net(net) => net.subnet.insert(addr, id),
            Kind::Nat(gw) => gw.net.subnet.insert(addr, id),
            Kind::Host(_) => panic!("a host cannot contain other nodes"),
        };
        id
    }

    /// Construct a peer on `node`; its boot sends run at the current tick.
    pub fn install_peer(&mut self, node: NodeId, cfg: Config) -> Result<PeerId, BindError> {
        let pid = cfg.id.clone();
        let now = self.queue.now();
        let mut io = SimIo { sim: self, node };
        let peer = Peer::new(cfg, now, &mut io)?;
        let Kind::Host(host) = &mut self.nodes[node.0].kind else {
            panic!("peers live on host nodes");
        };
        host.peer = Some(peer);
        Ok(pid)
    }

    // ─── Clock ──────────────────────────────────────────────────────────────

    pub fn run_until(&mut self, ts: u64) {
        while let Some(thunk) = self.queue.pop_due(ts) {
            thunk(self);
        }
        self.queue.advance(ts);
    }

    pub fn run_for(&mut self, ms: u64) {
        self.run_until(self.queue.now() + ms);
    }

    // ─── Sleep ──────────────────────────────────────────────────────────────

    pub fn sleep(&mut self, node: NodeId) {
        self.nodes[node.0].sleeping = true;
    }

    /// Drain the awaken queue FIFO until empty or the node sleeps again.
    /// A repeating timer deferred while asleep fires once here, then resumes
    /// its schedule.
    pub fn wake(&mut self, node: NodeId) {
        self.nodes[node.0].sleeping = false;
        while !self.nodes[node.0].sleeping {
            let Some(deferred) = self.nodes[node.0].awaken.pop_front() else {
                break;
            };
            match deferred {
                Deferred::Message { data, src, to_port } => self.deliver(node, data, src, to_port),
                Deferred::Timer { timer, repeat } => self.fire_peer_timer(node, timer, repeat),
            }
        }
    }

    // ─── Peer access ────────────────────────────────────────────────────────

    pub fn peer(&self, node: NodeId) -> &Peer {
        match &self.nodes[node.0].kind {
            Kind::Host(Host {
                peer: Some(peer), ..
            }) => peer,
            _ => panic!("no peer installed on node {}", node.0),
        }
    }

    /// Run a host-facing peer operation with the simulator as transport.
    pub fn with_peer<R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Peer, u64, &mut dyn Transport) -> R,
    ) -> R {
        let mut peer = self.take_peer(node);
        let now = self.queue.now();
        let mut io = SimIo { sim: self, node };
        let out = f(&mut peer, now, &mut io);
        self.put_peer(node, peer);
        out
    }

    pub fn peer_join(&mut self, node: NodeId, swarm: SwarmId) {
        self.with_peer(node, |peer, now, io| peer.join(swarm, now, io));
    }

    pub fn peer_intro(&mut self, node: NodeId, target: PeerId, swarm: Option<SwarmId>) {
        self.with_peer(node, |peer, _now, io| peer.intro(target, swarm, io));
    }

    /// Ports currently bound on a host, burst ports included.
    pub fn bound_ports(&self, node: NodeId) -> usize {
        match &self.nodes[node.0].kind {
            Kind::Host(host) => host.bound.len(),
            _ => 0,
        }
    }

    fn take_peer(&mut self, node: NodeId) -> Peer {
        match &mut self.nodes[node.0].kind {
            Kind::Host(host) => host.peer.take().expect("no peer installed on node"),
            _ => panic!("node is not a host"),
        }
    }

    fn try_take_peer(&mut self, node: NodeId) -> Option<Peer> {
        match &mut self.nodes[node.0].kind {
            Kind::Host(host) => host.peer.take(),
            _ => None,
        }
    }

    fn put_peer(&mut self, node: NodeId, peer: Peer) {
        if let Kind::Host(host) = &mut self.nodes[node.0].kind {
            host.peer = Some(peer);
        }
    }

    // ─── Routing ────────────────────────────────────────────────────────────

    /// Climb from a sender toward the root, translating at each NAT, until
    /// some network owns the destination address.
    fn send_from(&mut self, node: NodeId, data: Vec<u8>, to: SocketAddrV4, from_port: u16) {
        let mut src = SocketAddrV4::new(self.nodes[node.0].addr, from_port);
        let mut current = self.nodes[node.0].parent;
        while let Some(net_id) = current {
            let now = self.queue.now();
            let step = {
                let Simulator { nodes, rng, .. } = self;
                route_step(&mut nodes[net_id.0], to, src, now, rng)
            };
            match step {
                Route::Deliver { child, to_port } => {
                    self.schedule_delivery(child, data, src, to_port);
                    return;
                }
                Route::Translated { ext_port } => {
                    src = SocketAddrV4::new(self.nodes[net_id.0].addr, ext_port);
                    current = self.nodes[net_id.0].parent;
                }
                Route::Drop(reason) => {
                    self.trace
                        .push(format!("{now} drop({reason}) {src} -> {to}"));
                    return;
                }
            }
        }
    }

    fn schedule_delivery(&mut self, node: NodeId, data: Vec<u8>, src: SocketAddrV4, to_port: u16) {
        let now = self.queue.now();
        if self.link.loss > 0.0 && self.rng.gen_bool(self.link.loss) {
            self.trace
                .push(format!("{now} lose {src} -> node{} :{to_port}", node.0));
            return;
        }
        let latency = self
            .rng
            .gen_range(self.link.latency_min..=self.link.latency_max);
        self.queue.add(
            now + latency,
            Box::new(move |sim| sim.deliver(node, data, src, to_port)),
        );
    }

    fn deliver(&mut self, node: NodeId, data: Vec<u8>, src: SocketAddrV4, to_port: u16) {
        if self.nodes[node.0].sleeping {
            self.defer(node, Deferred::Message { data, src, to_port });
            return;
        }
        let now = self.queue.now();
        let inbound = match &mut self.nodes[node.0].kind {
            Kind::Host(host) => {
                if host.bound.contains(&to_port) && host.peer.is_some() {
                    Inbound::ToPeer
                } else {
                    Inbound::Drop("port not bound")
                }
            }
            Kind::Nat(gw) => match gw.table.inbound(to_port, now) {
                Some((addr, port)) => match gw.net.subnet.get(&addr) {
                    Some(&child) => Inbound::Forward {
                        child,
                        to_port: port,
                    },
                    None => Inbound::Drop("mapping to unknown host"),
                },
                None => Inbound::Drop("mapping miss"),
            },
            Kind::Net(_) => Inbound::Drop("network has no endpoint"),
        };
        match inbound {
            Inbound::ToPeer => {
                self.trace.push(format!(
                    "{now} node{} :{to_port} <- {src} {}",
                    node.0,
                    String::from_utf8_lossy(&data),
                ));
                self.dispatch_message(node, data, src, to_port);
            }
            Inbound::Forward { child, to_port } => {
                self.schedule_delivery(child, data, src, to_port);
            }
            Inbound::Drop(reason) => {
                trace!(node = node.0, to_port, reason, "inbound dropped");
                self.trace
                    .push(format!("{now} node{} drop({reason}) :{to_port}", node.0));
            }
        }
    }

    fn dispatch_message(&mut self, node: NodeId, data: Vec<u8>, src: SocketAddrV4, to_port: u16) {
        let Some(mut peer) = self.try_take_peer(node) else {
            return;
        };
        let now = self.queue.now();
        let mut io = SimIo { sim: self, node };
        peer.on_message(&data, src, to_port, now, &mut io);
        self.put_peer(node, peer);
    }

    fn fire_peer_timer(&mut self, node: NodeId, timer: Timer, repeat: u64) {
        if self.nodes[node.0].sleeping {
            // Interval collapse: a timer already deferred swallows further
            // firings; the wake-up catch-up runs it once.
            let slot = &mut self.nodes[node.0];
            let already = slot
                .awaken
                .iter()
                .any(|d| matches!(d, Deferred::Timer { timer: t, .. } if *t == timer));
            if !already {
                self.defer(node, Deferred::Timer { timer, repeat });
            }
            return;
        }
        if let Some(mut peer) = self.try_take_peer(node) {
            let now = self.queue.now();
            let mut io = SimIo { sim: self, node };
            peer.on_timer(timer.clone(), now, &mut io);
            self.put_peer(node, peer);
        }
        if repeat > 0 {
            let at = self.queue.now() + repeat;
            self.queue.add(
                at,
                Box::new(move |sim| sim.fire_peer_timer(node, timer, repeat)),
            );
        }
    }

    fn defer(&mut self, node: NodeId, deferred: Deferred) {
        let now = self.queue.now();
        let slot = &mut self.nodes[node.0];
        if slot.awaken.len() >= AWAKEN_MAX {
            self.trace
                .push(format!("{now} node{} awaken overflow", node.0));
            return;
        }
        slot.awaken.push_back(deferred);
    }
}

fn route_step(
    slot: &mut Slot,
    to: SocketAddrV4,
    src: SocketAddrV4,
    now: u64,
    rng: &mut StdRng,
) -> Route {
    match &mut slot.kind {
        // The base network delivers locally or signals failure; only NAT
        // gateways escalate upward.
        Kind::Net(net) => match net.subnet.get(to.ip()) {
            Some(&child) => Route::Deliver {
                child,
                to_port: to.port(),
            },
            None => Route::Drop("unroutable"),
        },
        Kind::Nat(gw) => {
            if let Some(&child) = gw.net.subnet.get(to.ip()) {
                return Route::Deliver {
                    child,
                    to_port: to.port(),
                };
            }
            if *to.ip() == slot.addr {
                // An internal sender addressed our public face.
                if !gw.table.hairpin_enabled() {
                    return Route::Drop("hairpin disabled");
                }
                return match gw.table.inbound(to.port(), now) {
                    Some((addr, port)) => match gw.net.subnet.get(&addr) {
                        Some(&child) => Route::Deliver {
                            child,
                            to_port: port,
                        },
                        None => Route::Drop("hairpin to unknown host"),
                    },
                    None => Route::Drop("hairpin mapping miss"),
                };
            }
            match gw.table.outbound(to, (*src.ip(), src.port()), now, rng) {
                Some(ext_port) => Route::Translated { ext_port },
                None => Route::Drop("nat ports exhausted"),
            }
        }
        Kind::Host(_) => Route::Drop("host cannot route"),
    }
}

// ─── Transport binding ──────────────────────────────────────────────────────

struct SimIo<'a> {
    sim: &'a mut Simulator,
    node: NodeId,
}

impl Transport for SimIo<'_> {
    fn send(&mut self, payload: &[u8], to: SocketAddrV4, from_port: u16) {
        self.sim.send_from(self.node, payload.to_vec(), to, from_port);
    }

    fn set_timer(&mut self, timer: Timer, delay: u64, repeat: u64) {
        let node = self.node;
        let at = self.sim.queue.now() + delay;
        self.sim.queue.add(
            at,
            Box::new(move |sim| sim.fire_peer_timer(node, timer, repeat)),
        );
    }

    fn bind(&mut self, port: u16) -> Result<u16, BindError> {
        let Simulator { nodes, rng, .. } = &mut *self.sim;
        let Kind::Host(host) = &mut nodes[self.node.0].kind else {
            panic!("binding on a non-host node");
        };
        if port != 0 {
            match host.bound.insert(port) {
                true => Ok(port),
                false => Err(BindError::InUse(port)),
            }
        } else {
            // Ephemeral picks come from the simulator PRNG so traces stay
            // reproducible per seed.
            for _ in 0..4096 {
                let candidate = rng.gen_range(EPHEMERAL_FLOOR..=u16::MAX);
                if host.bound.insert(candidate) {
                    return Ok(candidate);
                }
            }
            Err(BindError::Exhausted)
        }
    }

    fn local_addr(&self) -> Ipv4Addr {
        self.sim.nodes[self.node.0].addr
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
