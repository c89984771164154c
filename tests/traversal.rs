//! End-to-end traversal scenarios on the deterministic simulator.
//!
//! Topology for every test: two introducers on the public network,
//! `I0@1.0.0.1:3456` and `I1@1.0.0.2:3456`, plus peers placed behind
//! whatever NAT the scenario calls for.

use std::net::{Ipv4Addr, SocketAddrV4};

use gimlet::{
    config::Config,
    protocol::{KEEP_ALIVE_TIMEOUT, LOCAL_PORT},
    sim::{LinkOptions, NatProfile, NodeId, Simulator},
    types::{Liveness, NatKind, PeerId, SwarmId},
};

fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("test address is valid dotted decimal")
}

fn introducer_endpoints() -> Vec<SocketAddrV4> {
    vec![
        SocketAddrV4::new(ip("1.0.0.1"), LOCAL_PORT),
        SocketAddrV4::new(ip("1.0.0.2"), LOCAL_PORT),
    ]
}

fn world(seed: u64) -> Simulator {
    let mut sim = Simulator::new(seed);
    let root = sim.root();
    for (index, addr) in ["1.0.0.1", "1.0.0.2"].iter().enumerate() {
        let node = sim.add_host(root, ip(addr));
        let mut cfg = Config::new(PeerId::new(format!("I{index}")));
        cfg.introducer = true;
        cfg.seed = 100 + index as u64;
        sim.install_peer(node, cfg)
            .expect("introducer binds on a fresh host");
    }
    sim
}

fn peer_cfg(name: &str, seed: u64) -> Config {
    let mut cfg = Config::new(PeerId::new(name));
    cfg.introducers = introducer_endpoints();
    cfg.seed = seed;
    cfg
}

fn easy_peer(sim: &mut Simulator, public: &str, private: &str, name: &str, seed: u64) -> NodeId {
    let root = sim.root();
    let gw = sim.add_nat(root, ip(public), NatProfile::easy());
    let node = sim.add_host(gw, ip(private));
    sim.install_peer(node, peer_cfg(name, seed))
        .expect("peer binds on a fresh host");
    node
}

fn hard_peer(sim: &mut Simulator, public: &str, private: &str, name: &str, seed: u64) -> NodeId {
    let root = sim.root();
    let gw = sim.add_nat(root, ip(public), NatProfile::hard());
    let node = sim.add_host(gw, ip(private));
    sim.install_peer(node, peer_cfg(name, seed))
        .expect("peer binds on a fresh host");
    node
}

fn static_peer(sim: &mut Simulator, public: &str, name: &str, seed: u64) -> NodeId {
    let root = sim.root();
    let node = sim.add_host(root, ip(public));
    sim.install_peer(node, peer_cfg(name, seed))
        .expect("peer binds on a fresh host");
    node
}

fn classify(sim: &Simulator, node: NodeId, other: &PeerId) -> Option<Liveness> {
    sim.peer(node).classify(other, sim.now())
}

// ─── Scenario 1: Easy/Easy ──────────────────────────────────────────────────

#[test]
fn easy_easy_pair_connects_with_single_pings() {
    let mut sim = world(1);
    let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 11);
    let b = easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 12);
    sim.run_for(500);

    assert_eq!(sim.peer(a).nat(), NatKind::Easy);
    assert_eq!(sim.peer(b).nat(), NatKind::Easy);
    assert_eq!(
        sim.peer(a).public_endpoint().map(|e| *e.ip()),
        Some(ip("5.5.5.5"))
    );

    sim.peer_intro(a, PeerId::new("B"), None);
    sim.run_for(200);

    assert_eq!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));
}

#[test]
fn easy_nat_presents_one_external_port_to_both_introducers() {
    let mut sim = world(2);
    let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 21);
    sim.run_for(500);

    let peer = sim.peer(a);
    let echo_0 = peer
        .record(&PeerId::new("I0"))
        .and_then(|r| r.pong)
        .expect("I0 echoed our endpoint");
    let echo_1 = peer
        .record(&PeerId::new("I1"))
        .and_then(|r| r.pong)
        .expect("I1 echoed our endpoint");
    assert_eq!(echo_0.port, echo_1.port);
    assert_eq!(echo_0.address, ip("5.5.5.5"));
}

#[test]
fn hard_nat_presents_distinct_external_ports() {
    let mut sim = world(3);
    let a = hard_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 31);
    sim.run_for(500);

    assert_eq!(sim.peer(a).nat(), NatKind::Hard);
    let peer = sim.peer(a);
    let echo_0 = peer
        .record(&PeerId::new("I0"))
        .and_then(|r| r.pong)
        .expect("I0 echoed our endpoint");
    let echo_1 = peer
        .record(&PeerId::new("I1"))
        .and_then(|r| r.pong)
        .expect("I1 echoed our endpoint");
    assert_ne!(echo_0.port, echo_1.port);
}

// ─── Scenario 2: Static/Easy ────────────────────────────────────────────────

#[test]
fn static_endpoint_and_easy_peer_connect_directly() {
    let mut sim = world(4);
    let a = static_peer(&mut sim, "1.0.0.3", "A", 41);
    let b = easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 42);
    sim.run_for(500);

    assert_eq!(sim.peer(a).nat(), NatKind::Static);
    assert_eq!(sim.peer(b).nat(), NatKind::Easy);

    sim.peer_intro(b, PeerId::new("A"), None);
    sim.run_for(200);

    assert_eq!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));
}

// ─── Scenario 3: Easy/Hard birthday traversal ───────────────────────────────

#[test]
fn easy_hard_traversal_succeeds_for_nearly_all_seeds() {
    const TRIALS: u64 = 20;
    let mut successes = 0;
    for seed in 0..TRIALS {
        let mut sim = world(seed);
        let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 1000 + seed);
        let b = hard_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 2000 + seed);
        sim.run_for(500);
        assert_eq!(sim.peer(a).nat(), NatKind::Easy, "seed {seed}");
        assert_eq!(sim.peer(b).nat(), NatKind::Hard, "seed {seed}");

        sim.peer_intro(a, PeerId::new("B"), None);
        sim.run_for(15_000);

        let a_sees_b = classify(&sim, a, &PeerId::new("B")) == Some(Liveness::Active);
        let b_sees_a = classify(&sim, b, &PeerId::new("A")) == Some(Liveness::Active);
        if a_sees_b && b_sees_a {
            successes += 1;
        }
    }
    // The birthday bound is ≥ 0.97 per attempt; allow a sliver of slack.
    assert!(
        successes >= TRIALS - 2,
        "only {successes}/{TRIALS} traversals succeeded"
    );
}

// ─── Scenario 4: Hard/Hard ──────────────────────────────────────────────────

#[test]
fn hard_pair_fails_without_opening_ports() {
    let mut sim = world(5);
    let a = hard_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 51);
    let b = hard_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 52);
    sim.run_for(500);
    assert_eq!(sim.peer(a).nat(), NatKind::Hard);
    assert_eq!(sim.peer(b).nat(), NatKind::Hard);

    sim.peer_intro(a, PeerId::new("B"), None);
    sim.run_for(15_000);

    assert_ne!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));
    assert_ne!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));
    // Neither side opened a burst: just the two reserved ports each.
    assert_eq!(sim.bound_ports(a), 2);
    assert_eq!(sim.bound_ports(b), 2);
}

// ─── Scenario 5: Same NAT ───────────────────────────────────────────────────

#[test]
fn same_nat_pair_converges_on_local_endpoints() {
    let mut sim = world(6);
    let root = sim.root();
    let gw = sim.add_nat(root, ip("5.5.5.5"), NatProfile::easy());
    let a = sim.add_host(gw, ip("10.0.0.1"));
    let b = sim.add_host(gw, ip("10.0.0.2"));
    sim.install_peer(a, peer_cfg("A", 61))
        .expect("peer binds on a fresh host");
    sim.install_peer(b, peer_cfg("B", 62))
        .expect("peer binds on a fresh host");
    sim.run_for(500);

    assert_eq!(
        sim.peer(a).public_endpoint().map(|e| *e.ip()),
        Some(ip("5.5.5.5"))
    );
    assert_eq!(
        sim.peer(b).public_endpoint().map(|e| *e.ip()),
        Some(ip("5.5.5.5"))
    );

    sim.peer_intro(a, PeerId::new("B"), None);
    sim.run_for(1_000);

    let a_rec = sim
        .peer(a)
        .record(&PeerId::new("B"))
        .expect("A learned B");
    let b_rec = sim
        .peer(b)
        .record(&PeerId::new("A"))
        .expect("B learned A");
    assert_eq!(a_rec.address, ip("10.0.0.2"), "A should hold B's LAN address");
    assert_eq!(b_rec.address, ip("10.0.0.1"), "B should hold A's LAN address");
    assert_eq!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));
}

// ─── Scenario 6: Sleep and wake ─────────────────────────────────────────────

#[test]
fn sleeping_peer_decays_to_missing_and_recovers_on_wake() {
    let mut sim = world(7);
    let a = static_peer(&mut sim, "1.0.0.3", "A", 71);
    let b = static_peer(&mut sim, "1.0.0.4", "B", 72);
    sim.run_for(1_000);
    sim.peer_intro(a, PeerId::new("B"), None);
    sim.run_for(1_000);
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));

    sim.sleep(a);
    sim.run_for(3 * KEEP_ALIVE_TIMEOUT + 2_000);
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Missing));

    sim.wake(a);
    sim.run_for(2_000);
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));
    assert_eq!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));
}

// ─── Swarm membership ───────────────────────────────────────────────────────

#[test]
fn swarm_joiners_are_introduced_to_existing_members() {
    let mut sim = world(8);
    let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 81);
    let b = easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 82);
    let c = easy_peer(&mut sim, "5.5.7.7", "10.0.2.1", "C", 83);
    sim.run_for(500);

    let swarm = SwarmId::new("files");
    sim.peer_join(a, swarm.clone());
    sim.run_for(500);
    sim.peer_join(b, swarm.clone());
    sim.run_for(500);

    // Second joiner is cross-connected with the first.
    assert_eq!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));
    assert_eq!(classify(&sim, b, &PeerId::new("A")), Some(Liveness::Active));

    sim.peer_join(c, swarm);
    sim.run_for(1_000);

    // Third joiner reaches both existing members.
    assert_eq!(classify(&sim, c, &PeerId::new("A")), Some(Liveness::Active));
    assert_eq!(classify(&sim, c, &PeerId::new("B")), Some(Liveness::Active));
    assert_eq!(classify(&sim, a, &PeerId::new("C")), Some(Liveness::Active));
}

// ─── Cross-cutting properties ───────────────────────────────────────────────

#[test]
fn trace_timestamps_never_regress() {
    let mut sim = world(9);
    let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 91);
    easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 92);
    sim.run_for(500);
    sim.peer_intro(a, PeerId::new("B"), None);
    sim.run_for(2_000);

    let mut last = 0u64;
    for line in &sim.trace {
        let ts: u64 = line
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .expect("trace lines start with a timestamp");
        assert!(ts >= last, "timestamp regressed in {line:?}");
        last = ts;
    }
    assert!(last > 0, "scenario produced traffic");
}

#[test]
fn identical_seeds_replay_identical_traces() {
    let run = |seed: u64| {
        let mut sim = world(seed);
        let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 900);
        hard_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 901);
        sim.run_for(500);
        sim.peer_intro(a, PeerId::new("B"), None);
        sim.run_for(12_000);
        sim.trace
    };
    assert_eq!(run(10), run(10));
}

#[test]
fn easy_symmetry_holds_across_seeds() {
    for seed in 0..10u64 {
        let mut sim = world(seed);
        let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 300 + seed);
        let b = easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 400 + seed);
        sim.run_for(500);

        for (node, name) in [(a, "A"), (b, "B")] {
            let peer = sim.peer(node);
            assert_eq!(peer.nat(), NatKind::Easy, "seed {seed} peer {name}");
            let echo_0 = peer
                .record(&PeerId::new("I0"))
                .and_then(|r| r.pong)
                .unwrap_or_else(|| panic!("seed {seed}: I0 echoed {name}"));
            let echo_1 = peer
                .record(&PeerId::new("I1"))
                .and_then(|r| r.pong)
                .unwrap_or_else(|| panic!("seed {seed}: I1 echoed {name}"));
            assert_eq!(echo_0.port, echo_1.port, "seed {seed} peer {name}");
        }
    }
}

/// Extract the `target` field from a traced connect payload.
fn connect_target(line: &str) -> Option<&str> {
    let start = line.find("\"target\":\"")? + "\"target\":\"".len();
    let rest = &line[start..];
    Some(&rest[..rest.find('"')?])
}

#[test]
fn introduction_symmetry_holds_across_seeds() {
    for seed in 0..8u64 {
        let mut sim = world(seed);
        let peers = [
            (easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 500 + seed), "A"),
            (easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 600 + seed), "B"),
            (easy_peer(&mut sim, "5.5.7.7", "10.0.2.1", "C", 700 + seed), "C"),
        ];
        sim.run_for(500);
        let swarm = SwarmId::new("files");
        for (node, _) in peers {
            sim.peer_join(node, swarm.clone());
            sim.run_for(300);
        }
        sim.run_for(1_000);

        // Every connect delivered to X naming Y must be matched by one
        // delivered to Y naming X (lossless links here).
        let mut delivered = std::collections::BTreeSet::new();
        for line in &sim.trace {
            if !line.contains("\"type\":\"connect\"") {
                continue;
            }
            let receiver = peers
                .iter()
                .find(|(node, _)| line.contains(&format!(" node{} :", node.index())))
                .map(|(_, name)| *name);
            let target = connect_target(line);
            if let (Some(receiver), Some(target)) = (receiver, target) {
                delivered.insert((receiver.to_string(), target.to_string()));
            }
        }
        assert!(!delivered.is_empty(), "seed {seed}: no connects delivered");
        for (receiver, target) in &delivered {
            assert!(
                delivered.contains(&(target.clone(), receiver.clone())),
                "seed {seed}: connect {receiver}<-{target} has no mirror"
            );
        }
    }
}

#[test]
fn established_pair_survives_lossy_links() {
    let mut sim = world(11);
    let a = easy_peer(&mut sim, "5.5.5.5", "10.0.0.1", "A", 111);
    let b = easy_peer(&mut sim, "5.5.6.6", "10.0.1.1", "B", 112);
    sim.run_for(500);
    sim.peer_intro(a, PeerId::new("B"), None);
    sim.run_for(500);
    assert_eq!(classify(&sim, a, &PeerId::new("B")), Some(Liveness::Active));

    let established_at = sim.now();
    sim.set_link(LinkOptions {
        latency_min: 2,
        latency_max: 20,
        loss: 0.05,
    });
    sim.run_for(5 * KEEP_ALIVE_TIMEOUT);

    // Keepalive pings keep punching through; the pair never decays past the
    // occasional lost round.
    let b_rec = sim
        .peer(b)
        .record(&PeerId::new("A"))
        .expect("record persists");
    assert!(
        b_rec.last_recv.is_some_and(|t| t > established_at),
        "B kept hearing A through the lossy link"
    );
    assert!(classify(&sim, b, &PeerId::new("A")) <= Some(Liveness::Inactive));
}
