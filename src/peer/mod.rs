//! The NAT-traversal state machine.
//!
//! A [`Peer`] is reactive: every "wait for X then decide" sequence of the
//! protocol is stored as partial state and advanced by `on_message` /
//! `on_timer`. All side effects go through the injected [`Transport`], so the
//! same code runs against the simulator and the real UDP binding.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::{Ipv4Addr, SocketAddrV4},
};

use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{debug, info, trace, warn};

use crate::{
    config::Config,
    protocol::{
        BDP_INTERVAL, BDP_MAX_PACKETS, BDP_SOCKETS, CONNECTING_MAX_TIME, KEEP_ALIVE_TIMEOUT,
        NAT_EVAL_TIMEOUT, PORT_FLOOR, RETRY_PING_INTERVAL,
    },
    transport::{BindError, Timer, Transport},
    types::{Liveness, NatKind, PeerId, SwarmId},
    wire::{self, Message},
};

pub mod record;
pub mod swarm;

pub use record::{PeerRecord, PongState};
pub use swarm::Swarm;

/// In-flight NAT evaluation: introducer pongs collected so far, keyed by the
/// introducer endpoint that sent them.
#[derive(Debug)]
struct NatEval {
    pongs: Vec<(SocketAddrV4, u16)>,
}

/// An in-flight easy-side birthday scan toward one hard peer.
#[derive(Debug)]
struct BdpScan {
    started: u64,
    address: Ipv4Addr,
    sent: u32,
    tried: BTreeSet<u16>,
}

pub struct Peer {
    cfg: Config,
    /// Boot timestamp; echoed in pings so remotes detect restarts.
    restart: u64,
    nat: NatKind,
    public_address: Option<Ipv4Addr>,
    public_port: Option<u16>,
    /// Latest echo of our external endpoint via any pong.
    pong: Option<PongState>,
    peers: BTreeMap<PeerId, PeerRecord>,
    swarms: BTreeMap<SwarmId, Swarm>,
    /// Attempt start time per target; suppresses overlapping traversal.
    connecting: BTreeMap<PeerId, u64>,
    eval: Option<NatEval>,
    scans: BTreeMap<PeerId, BdpScan>,
    last_tick: u64,
    rng: SmallRng,
}

impl Peer {
    /// Bind the two reserved ports, arm the keepalive interval and enter NAT
    /// evaluation. A bind failure is fatal: the peer never starts.
    pub fn new(cfg: Config, now: u64, io: &mut dyn Transport) -> Result<Self, BindError> {
        io.bind(cfg.local_port)?;
        io.bind(cfg.test_port)?;

        let mut peer = Self {
            restart: now,
            nat: if cfg.introducer {
                NatKind::Static
            } else {
                NatKind::Unknown
            },
            public_address: None,
            public_port: None,
            pong: None,
            peers: BTreeMap::new(),
            swarms: BTreeMap::new(),
            connecting: BTreeMap::new(),
            eval: None,
            scans: BTreeMap::new(),
            last_tick: now,
            rng: SmallRng::seed_from_u64(cfg.seed),
            cfg,
        };

        if peer.cfg.keep_alive > 0 {
            io.set_timer(Timer::KeepAlive, peer.cfg.keep_alive, peer.cfg.keep_alive);
        }
        if !peer.cfg.introducer {
            peer.evaluate_nat(now, io);
        }
        Ok(peer)
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn id(&self) -> &PeerId {
        &self.cfg.id
    }

    pub fn nat(&self) -> NatKind {
        self.nat
    }

    pub fn public_endpoint(&self) -> Option<SocketAddrV4> {
        Some(SocketAddrV4::new(self.public_address?, self.public_port?))
    }

    pub fn pong(&self) -> Option<&PongState> {
        self.pong.as_ref()
    }

    pub fn record(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    pub fn classify(&self, id: &PeerId, now: u64) -> Option<Liveness> {
        Some(self.peers.get(id)?.classify(now))
    }

    /// Whether a traversal attempt toward `id` is currently suppressing new
    /// ones.
    pub fn connecting(&self, id: &PeerId, now: u64) -> bool {
        self.connecting
            .get(id)
            .is_some_and(|t| now.saturating_sub(*t) < CONNECTING_MAX_TIME)
    }

    // ─── Host-facing operations ─────────────────────────────────────────────

    /// Record a peer learned out of band.
    pub fn add_peer(&mut self, id: PeerId, endpoint: SocketAddrV4, nat: NatKind) {
        self.peers
            .entry(id.clone())
            .or_insert_with(|| PeerRecord::new(id, *endpoint.ip(), endpoint.port(), nat));
    }

    /// Ask an introducer to connect us with `target`.
    pub fn intro(&mut self, target: PeerId, swarm: Option<SwarmId>, io: &mut dyn Transport) {
        let Some(introducer) = self.cfg.introducers.first().copied() else {
            warn!("intro requested with no introducers configured");
            return;
        };
        let msg = Message::Intro {
            id: self.cfg.id.clone(),
            target,
            swarm,
        };
        io.send(&wire::encode(&msg), introducer, self.cfg.local_port);
    }

    /// Join a swarm: membership is tracked locally and announced to every
    /// configured introducer.
    pub fn join(&mut self, swarm: SwarmId, now: u64, io: &mut dyn Transport) {
        let entry = self.swarms.entry(swarm.clone()).or_insert_with(Swarm::new);
        entry.joined = true;
        entry.last_heard = now;
        self.send_join(&swarm, io);
    }

    /// The host observed an interface change: the old NAT class and public
    /// endpoint are stale.
    pub fn network_changed(&mut self, now: u64, io: &mut dyn Transport) {
        info!("network changed, re-evaluating nat class");
        self.evaluate_nat(now, io);
    }

    // ─── NAT evaluation ─────────────────────────────────────────────────────

    fn evaluate_nat(&mut self, _now: u64, io: &mut dyn Transport) {
        self.nat = NatKind::Unknown;
        self.public_address = None;
        self.public_port = None;
        self.eval = Some(NatEval { pongs: Vec::new() });

        let ping = wire::encode(&self.ping_msg());
        for introducer in self.cfg.introducers.clone() {
            io.send(&ping, introducer, self.cfg.local_port);
        }
        io.set_timer(Timer::NatEval, NAT_EVAL_TIMEOUT, 0);
    }

    fn conclude_eval(&mut self, eval: NatEval) {
        if self.nat == NatKind::Static {
            return;
        }
        let decided = match eval.pongs.as_slice() {
            [] => {
                warn!("nat evaluation got no introducer responses");
                return;
            }
            // A single view cannot distinguish easy from hard; assume the
            // traversable class and let punching attempts correct us.
            [_] => NatKind::Easy,
            [(_, first), (_, second), ..] => {
                if first == second {
                    NatKind::Easy
                } else {
                    NatKind::Hard
                }
            }
        };
        self.nat = decided;
        info!(nat = %self.nat, "nat class decided");
    }

    // ─── Timers ─────────────────────────────────────────────────────────────

    pub fn on_timer(&mut self, timer: Timer, now: u64, io: &mut dyn Transport) {
        match timer {
            Timer::KeepAlive => self.keepalive_tick(now, io),
            Timer::NatEval => {
                if let Some(eval) = self.eval.take() {
                    self.conclude_eval(eval);
                }
            }
            Timer::BdpProbe(id) => self.bdp_probe(&id, now, io),
        }
    }

    fn keepalive_tick(&mut self, now: u64, io: &mut dyn Transport) {
        let elapsed = now.saturating_sub(self.last_tick);
        self.last_tick = now;
        self.connecting
            .retain(|_, started| now.saturating_sub(*started) < CONNECTING_MAX_TIME);

        // A tick arriving well past its period means the host was suspended:
        // mappings and classifications are stale, so refresh everything.
        let woke = elapsed > self.cfg.keep_alive * 3 / 2;
        if woke {
            info!(elapsed, "wall clock skew detected, refreshing after wakeup");
            let ids: Vec<PeerId> = self.peers.keys().cloned().collect();
            for id in ids {
                self.send_ping(&id, now, io);
            }
            let joined: Vec<SwarmId> = self
                .swarms
                .iter()
                .filter(|(_, s)| s.joined)
                .map(|(id, _)| id.clone())
                .collect();
            for swarm in joined {
                self.send_join(&swarm, io);
            }
            if self.nat == NatKind::Unknown && self.eval.is_none() {
                self.evaluate_nat(now, io);
            }
            return;
        }

        let ids: Vec<PeerId> = self
            .peers
            .values()
            .filter(|r| r.classify(now) < Liveness::Forgotten)
            .map(|r| r.id.clone())
            .collect();
        for id in ids {
            self.retry_ping(&id, now, io);
        }
        if self.nat == NatKind::Unknown && self.eval.is_none() {
            self.evaluate_nat(now, io);
        }
    }

    // ─── Inbound dispatch ───────────────────────────────────────────────────

    pub fn on_message(
        &mut self,
        data: &[u8],
        src: SocketAddrV4,
        recv_port: u16,
        now: u64,
        io: &mut dyn Transport,
    ) {
        let Some(msg) = wire::decode(data) else {
            trace!(%src, len = data.len(), "dropping undecodable payload");
            return;
        };
        match msg {
            Message::Ping { id, nat, restart } => {
                self.on_ping(id, nat, restart, src, recv_port, now, io)
            }
            Message::Pong {
                id,
                address,
                port,
                nat,
                restart,
                timestamp,
            } => self.on_pong(id, address, port, nat, restart, timestamp, src, recv_port, now),
            Message::Test {
                id,
                address,
                port,
                nat,
            } => self.on_test(id, address, port, nat, src, recv_port, now),
            Message::Intro { id, target, swarm } => {
                self.on_intro(id, target, swarm, src, recv_port, now, io)
            }
            Message::IntroError { target, call, .. } => {
                warn!(%target, call, "introduction failed");
            }
            Message::Connect {
                target,
                address,
                port,
                nat,
                swarm,
                ..
            } => self.on_connect(target, address, port, nat, swarm, src, now, io),
            Message::Local { id, address, port } => self.on_local(id, address, port, now, io),
            Message::Join {
                id,
                swarm,
                nat,
                peers,
            } => self.on_join(id, swarm, nat, peers, src, recv_port, now, io),
            Message::JoinError { swarm, peers, .. } => {
                info!(%swarm, peers, "join produced no introductions yet");
            }
            Message::Relay { target, content } => self.on_relay(target, content, io),
        }
    }

    /// Fold an identified sender into the peer table: the observed source
    /// endpoint wins, a changed restart timestamp invalidates their echo of
    /// us, and a hit on a non-reserved receive port becomes the flow port.
    fn note_sender(
        &mut self,
        id: &PeerId,
        src: SocketAddrV4,
        nat: Option<NatKind>,
        restart: Option<u64>,
        recv_port: u16,
        now: u64,
    ) {
        let rec = self.peers.entry(id.clone()).or_insert_with(|| {
            PeerRecord::new(
                id.clone(),
                *src.ip(),
                src.port(),
                nat.unwrap_or(NatKind::Unknown),
            )
        });
        rec.relocate(*src.ip(), src.port());
        if let Some(nat) = nat {
            rec.nat = nat;
        }
        if let Some(restart) = restart {
            if rec.restart != 0 && rec.restart != restart {
                debug!(peer = %id, "peer restarted");
                rec.pong = None;
            }
            rec.restart = restart;
        }
        if recv_port != self.cfg.local_port && recv_port != self.cfg.test_port {
            rec.outport = Some(recv_port);
        }
        rec.heard(now);
    }

    #[allow(clippy::too_many_arguments)]
    fn on_ping(
        &mut self,
        id: PeerId,
        nat: NatKind,
        restart: u64,
        src: SocketAddrV4,
        recv_port: u16,
        now: u64,
        io: &mut dyn Transport,
    ) {
        self.note_sender(&id, src, Some(nat), Some(restart), recv_port, now);
        let pong = Message::Pong {
            id: self.cfg.id.clone(),
            address: *src.ip(),
            port: src.port(),
            nat: self.nat,
            restart: self.restart,
            timestamp: now,
        };
        io.send(&wire::encode(&pong), src, recv_port);

        if self.cfg.introducer {
            let test = Message::Test {
                id: self.cfg.id.clone(),
                address: *src.ip(),
                port: src.port(),
                nat: self.nat,
            };
            let probe = SocketAddrV4::new(*src.ip(), self.cfg.test_port);
            io.send(&wire::encode(&test), probe, self.cfg.local_port);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_pong(
        &mut self,
        id: PeerId,
        address: Ipv4Addr,
        port: u16,
        nat: NatKind,
        restart: u64,
        timestamp: u64,
        src: SocketAddrV4,
        recv_port: u16,
        now: u64,
    ) {
        self.note_sender(&id, src, Some(nat), Some(restart), recv_port, now);
        let echo = PongState {
            timestamp,
            address,
            port,
        };
        if let Some(rec) = self.peers.get_mut(&id) {
            rec.pong = Some(echo);
        }
        self.pong = Some(echo);
        if self.scans.remove(&id).is_some() {
            debug!(peer = %id, "birthday scan confirmed by pong");
        }

        // Only a trusted introducer's echo may define our public endpoint.
        if self.is_introducer_src(src) {
            self.public_address = Some(address);
            self.public_port = Some(port);
            let complete = match self.eval.as_mut() {
                Some(eval) => {
                    if !eval.pongs.iter().any(|(from, _)| *from == src) {
                        eval.pongs.push((src, port));
                    }
                    eval.pongs.len() >= 2
                }
                None => false,
            };
            if complete && let Some(eval) = self.eval.take() {
                self.conclude_eval(eval);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_test(
        &mut self,
        id: PeerId,
        address: Ipv4Addr,
        port: u16,
        nat: NatKind,
        src: SocketAddrV4,
        recv_port: u16,
        now: u64,
    ) {
        // Anything not aimed at the probe port is noise.
        if recv_port != self.cfg.test_port {
            trace!(%src, recv_port, "test probe on unexpected port dropped");
            return;
        }
        self.note_sender(&id, src, Some(nat), None, recv_port, now);
        self.pong = Some(PongState {
            timestamp: now,
            address,
            port,
        });
        if self.nat != NatKind::Static {
            info!("unsolicited probe reached the test port, endpoint is static");
        }
        self.nat = NatKind::Static;
    }

    #[allow(clippy::too_many_arguments)]
    fn on_intro(
        &mut self,
        requester: PeerId,
        target: PeerId,
        swarm: Option<SwarmId>,
        src: SocketAddrV4,
        recv_port: u16,
        now: u64,
        io: &mut dyn Transport,
    ) {
        self.note_sender(&requester, src, None, None, recv_port, now);
        let known = target != requester && self.peers.contains_key(&target);
        if !known {
            let err = Message::IntroError {
                id: self.cfg.id.clone(),
                target,
                call: "intro".into(),
            };
            io.send(&wire::encode(&err), src, recv_port);
            return;
        }
        self.send_connect_pair(&requester, &target, swarm, io);
    }

    /// Cross-introduce two known peers: each side gets a connect naming the
    /// other.
    fn send_connect_pair(
        &mut self,
        a: &PeerId,
        b: &PeerId,
        swarm: Option<SwarmId>,
        io: &mut dyn Transport,
    ) {
        let (Some(rec_a), Some(rec_b)) = (self.peers.get(a), self.peers.get(b)) else {
            return;
        };
        let to_a = Message::Connect {
            id: self.cfg.id.clone(),
            target: b.clone(),
            address: rec_b.address,
            port: rec_b.port,
            nat: rec_b.nat,
            swarm: swarm.clone(),
        };
        let to_b = Message::Connect {
            id: self.cfg.id.clone(),
            target: a.clone(),
            address: rec_a.address,
            port: rec_a.port,
            nat: rec_a.nat,
            swarm,
        };
        let (ep_a, ep_b) = (rec_a.endpoint(), rec_b.endpoint());
        io.send(&wire::encode(&to_a), ep_a, self.cfg.local_port);
        io.send(&wire::encode(&to_b), ep_b, self.cfg.local_port);
    }

    #[allow(clippy::too_many_arguments)]
    fn on_connect(
        &mut self,
        target: PeerId,
        address: Ipv4Addr,
        port: u16,
        nat: NatKind,
        swarm: Option<SwarmId>,
        src: SocketAddrV4,
        now: u64,
        io: &mut dyn Transport,
    ) {
        if target == self.cfg.id {
            return;
        }
        let rec = self
            .peers
            .entry(target.clone())
            .or_insert_with(|| PeerRecord::new(target.clone(), address, port, nat));
        rec.relocate(address, port);
        rec.nat = nat;
        let recently_heard = rec.heard_within(now, KEEP_ALIVE_TIMEOUT);

        // Swarm tagging only applies to swarms we joined ourselves.
        if let Some(swarm) = swarm
            && let Some(entry) = self.swarms.get_mut(&swarm)
            && entry.joined
        {
            entry.members.insert(target.clone());
            entry.last_heard = now;
        }

        // An attempt in flight or a live exchange means the path either
        // exists or is being punched; a lone ping keeps it warm.
        if self.connecting(&target, now) || recently_heard {
            self.retry_ping(&target, now, io);
            return;
        }
        self.connecting.insert(target.clone(), now);

        // Behind the same NAT the public path is useless without
        // hairpinning; trade LAN endpoints through the introducer instead.
        if self.public_address == Some(address) {
            debug!(peer = %target, "same public address, advertising local endpoint");
            let local = Message::Local {
                id: self.cfg.id.clone(),
                address: io.local_addr(),
                port: self.cfg.local_port,
            };
            let relay = Message::relay(target, &local);
            io.send(&wire::encode(&relay), src, self.cfg.local_port);
            return;
        }

        match (self.nat, nat) {
            (NatKind::Hard, NatKind::Hard) => {
                warn!(peer = %target, "hard-to-hard pair cannot hole punch");
                self.connecting.remove(&target);
            }
            (NatKind::Hard, _) => self.bdp_burst(&target, now, io),
            (_, NatKind::Hard) => self.bdp_scan(&target, now, io),
            _ => self.retry_ping(&target, now, io),
        }
    }

    fn on_local(
        &mut self,
        id: PeerId,
        address: Ipv4Addr,
        port: u16,
        now: u64,
        io: &mut dyn Transport,
    ) {
        debug!(peer = %id, %address, port, "switching to advertised local endpoint");
        let rec = self
            .peers
            .entry(id.clone())
            .or_insert_with(|| PeerRecord::new(id.clone(), address, port, NatKind::Unknown));
        rec.relocate(address, port);
        self.retry_ping(&id, now, io);
    }

    #[allow(clippy::too_many_arguments)]
    fn on_join(
        &mut self,
        sender: PeerId,
        swarm: SwarmId,
        nat: NatKind,
        want: u32,
        src: SocketAddrV4,
        recv_port: u16,
        now: u64,
        io: &mut dyn Transport,
    ) {
        self.note_sender(&sender, src, Some(nat), None, recv_port, now);
        let entry = self.swarms.entry(swarm.clone()).or_insert_with(Swarm::new);
        entry.members.insert(sender.clone());
        entry.last_heard = now;
        let members = entry.members.clone();

        if members.len() <= 1 {
            let err = Message::JoinError {
                id: self.cfg.id.clone(),
                swarm,
                peers: 1,
                call: "join".into(),
            };
            io.send(&wire::encode(&err), src, recv_port);
            return;
        }

        let picks = swarm::select_introductions(
            &members,
            &sender,
            nat,
            *src.ip(),
            &self.peers,
            want as usize,
            &mut self.rng,
        );
        debug!(%swarm, sender = %sender, picks = picks.len(), "fanning out introductions");
        for pick in picks {
            let Some(rec) = self.peers.get(&pick) else {
                continue;
            };
            let to_sender = Message::Connect {
                id: self.cfg.id.clone(),
                target: pick.clone(),
                address: rec.address,
                port: rec.port,
                nat: rec.nat,
                swarm: Some(swarm.clone()),
            };
            let to_pick = Message::Connect {
                id: self.cfg.id.clone(),
                target: sender.clone(),
                address: *src.ip(),
                port: src.port(),
                nat,
                swarm: Some(swarm.clone()),
            };
            let pick_ep = rec.endpoint();
            io.send(&wire::encode(&to_sender), src, recv_port);
            io.send(&wire::encode(&to_pick), pick_ep, self.cfg.local_port);
        }
    }

    fn on_relay(&mut self, target: PeerId, content: serde_json::Value, io: &mut dyn Transport) {
        let Some(rec) = self.peers.get(&target) else {
            trace!(%target, "relay for unknown target dropped");
            return;
        };
        // Infallible: a JSON value always reserializes
        let payload =
            serde_json::to_vec(&content).expect("a decoded JSON value always reserializes");
        io.send(&payload, rec.endpoint(), self.cfg.local_port);
    }

    // ─── Hole punching ──────────────────────────────────────────────────────

    /// Easy side of the birthday strategy: spray pings at uniformly random,
    /// unique ports of the hard peer's public address until one lands.
    fn bdp_scan(&mut self, target: &PeerId, now: u64, io: &mut dyn Transport) {
        let Some(rec) = self.peers.get(target) else {
            return;
        };
        debug!(peer = %target, address = %rec.address, "starting birthday scan");
        self.scans.insert(
            target.clone(),
            BdpScan {
                started: now,
                address: rec.address,
                sent: 0,
                tried: BTreeSet::new(),
            },
        );
        self.bdp_probe(target, now, io);
    }

    fn bdp_probe(&mut self, target: &PeerId, now: u64, io: &mut dyn Transport) {
        let heard = self.peers.get(target).and_then(|r| r.last_recv);
        let ping = wire::encode(&self.ping_msg());
        let Some(scan) = self.scans.get_mut(target) else {
            return;
        };
        if heard.is_some_and(|t| t >= scan.started) {
            debug!(peer = %target, probes = scan.sent, "birthday scan confirmed");
            self.scans.remove(target);
            return;
        }
        if scan.sent >= BDP_MAX_PACKETS {
            warn!(peer = %target, probes = scan.sent, "birthday scan exhausted");
            self.scans.remove(target);
            return;
        }
        let port = loop {
            let candidate = self.rng.gen_range(PORT_FLOOR..=u16::MAX);
            if !crate::protocol::is_reserved_port(candidate) && scan.tried.insert(candidate) {
                break candidate;
            }
        };
        scan.sent += 1;
        let dest = SocketAddrV4::new(scan.address, port);
        io.send(&ping, dest, self.cfg.local_port);
        io.set_timer(Timer::BdpProbe(target.clone()), BDP_INTERVAL, 0);
    }

    /// Hard side of the birthday strategy: open a burst of fresh local
    /// ports, one ping each, so the NAT mints that many external mappings
    /// for the scanner to hit.
    fn bdp_burst(&mut self, target: &PeerId, _now: u64, io: &mut dyn Transport) {
        let Some(rec) = self.peers.get(target) else {
            return;
        };
        let dest = rec.endpoint();
        let ping = wire::encode(&self.ping_msg());
        let mut opened = 0usize;
        for _ in 0..BDP_SOCKETS {
            match io.bind(0) {
                Ok(port) => {
                    io.send(&ping, dest, port);
                    opened += 1;
                }
                Err(e) => {
                    warn!(error = %e, opened, "burst bind failed, stopping early");
                    break;
                }
            }
        }
        debug!(peer = %target, opened, "opened birthday burst ports");
    }

    // ─── Outbound helpers ───────────────────────────────────────────────────

    fn ping_msg(&self) -> Message {
        Message::Ping {
            id: self.cfg.id.clone(),
            nat: self.nat,
            restart: self.restart,
        }
    }

    /// Throttled ping: at most one per [`RETRY_PING_INTERVAL`] per peer.
    fn retry_ping(&mut self, id: &PeerId, now: u64, io: &mut dyn Transport) {
        let Some(rec) = self.peers.get(id) else {
            return;
        };
        if rec.last_sent != 0 && now.saturating_sub(rec.last_sent) < RETRY_PING_INTERVAL {
            return;
        }
        self.send_ping(id, now, io);
    }

    fn send_ping(&mut self, id: &PeerId, now: u64, io: &mut dyn Transport) {
        let ping = wire::encode(&self.ping_msg());
        let Some(rec) = self.peers.get_mut(id) else {
            return;
        };
        rec.last_sent = now;
        let from = rec.outport.unwrap_or(self.cfg.local_port);
        io.send(&ping, rec.endpoint(), from);
    }

    fn send_join(&self, swarm: &SwarmId, io: &mut dyn Transport) {
        let msg = Message::Join {
            id: self.cfg.id.clone(),
            swarm: swarm.clone(),
            nat: self.nat,
            peers: self.cfg.join_peers,
        };
        let encoded = wire::encode(&msg);
        for introducer in &self.cfg.introducers {
            io.send(&encoded, *introducer, self.cfg.local_port);
        }
    }

    fn is_introducer_src(&self, src: SocketAddrV4) -> bool {
        self.cfg.introducers.contains(&src)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
