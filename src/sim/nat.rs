//! Port translation for simulated NAT gateways.
//!
//! The table keeps `map` (flow key → external port) and `unmap` (external
//! port → internal endpoint) as strict inverses. Entries are refreshed by use
//! in either direction and lazily expired once idle past the TTL.

use std::{
    collections::BTreeMap,
    net::{Ipv4Addr, SocketAddrV4},
};

use rand::Rng;

use crate::protocol::PORT_FLOOR;

/// What a flow key depends on. Source-only keying gives the endpoint-
/// independent mapping of an easy NAT; including the destination gives the
/// address-and-port-dependent mapping of a hard one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keying {
    SourceOnly,
    SourceAndDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAlloc {
    /// Uniform over free ports.
    Random,
    /// Ascending from the port floor, skipping taken ports.
    Sequential,
}

#[derive(Debug, Clone, Copy)]
pub struct NatProfile {
    pub keying: Keying,
    pub alloc: PortAlloc,
    /// Idle lifetime of a mapping, milliseconds.
    pub ttl: u64,
    pub hairpin: bool,
}

impl NatProfile {
    pub fn easy() -> Self {
        Self {
            keying: Keying::SourceOnly,
            alloc: PortAlloc::Random,
            ttl: 30_000,
            hairpin: false,
        }
    }

    pub fn hard() -> Self {
        Self {
            keying: Keying::SourceAndDestination,
            ..Self::easy()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FlowKey {
    src: (Ipv4Addr, u16),
    dst: Option<(Ipv4Addr, u16)>,
}

#[derive(Debug, Clone)]
struct Binding {
    key: FlowKey,
    internal: (Ipv4Addr, u16),
    last_used: u64,
}

pub struct NatTable {
    profile: NatProfile,
    map: BTreeMap<FlowKey, u16>,
    unmap: BTreeMap<u16, Binding>,
    next_port: u16,
}

impl NatTable {
    pub fn new(profile: NatProfile) -> Self {
        Self {
            profile,
            map: BTreeMap::new(),
            unmap: BTreeMap::new(),
            next_port: PORT_FLOOR,
        }
    }

    pub fn hairpin_enabled(&self) -> bool {
        self.profile.hairpin
    }

    pub fn len(&self) -> usize {
        self.unmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unmap.is_empty()
    }

    fn key_of(&self, dst: SocketAddrV4, src: (Ipv4Addr, u16)) -> FlowKey {
        FlowKey {
            src,
            dst: match self.profile.keying {
                Keying::SourceOnly => None,
                Keying::SourceAndDestination => Some((*dst.ip(), dst.port())),
            },
        }
    }

    /// Translate an outbound flow, reusing a live mapping or allocating a
    /// fresh external port. `None` when the port space is exhausted.
    pub fn outbound(
        &mut self,
        dst: SocketAddrV4,
        src: (Ipv4Addr, u16),
        now: u64,
        rng: &mut impl Rng,
    ) -> Option<u16> {
        let key = self.key_of(dst, src);
        if let Some(&port) = self.map.get(&key)
            && self.refresh(port, now)
        {
            return Some(port);
        }
        let port = self.allocate(rng)?;
        self.map.insert(key.clone(), port);
        self.unmap.insert(
            port,
            Binding {
                key,
                internal: src,
                last_used: now,
            },
        );
        Some(port)
    }

    /// Resolve an inbound packet on `ext_port` to the internal endpoint, or
    /// `None` when no live mapping exists.
    pub fn inbound(&mut self, ext_port: u16, now: u64) -> Option<(Ipv4Addr, u16)> {
        if !self.refresh(ext_port, now) {
            return None;
        }
        self.unmap.get(&ext_port).map(|b| b.internal)
    }

    /// Touch a mapping; expires and reports `false` if it idled past TTL.
    fn refresh(&mut self, port: u16, now: u64) -> bool {
        let Some(binding) = self.unmap.get_mut(&port) else {
            return false;
        };
        if now.saturating_sub(binding.last_used) > self.profile.ttl {
            let key = binding.key.clone();
            self.unmap.remove(&port);
            self.map.remove(&key);
            return false;
        }
        binding.last_used = now;
        true
    }

    fn allocate(&mut self, rng: &mut impl Rng) -> Option<u16> {
        match self.profile.alloc {
            PortAlloc::Random => {
                // Free ports stay dense in practice; bounded rejection
                // sampling keeps allocation deterministic-per-seed.
                for _ in 0..4096 {
                    let port = rng.gen_range(PORT_FLOOR..=u16::MAX);
                    if !self.unmap.contains_key(&port) {
                        return Some(port);
                    }
                }
                None
            }
            PortAlloc::Sequential => {
                for _ in PORT_FLOOR..=u16::MAX {
                    let port = self.next_port;
                    self.next_port = if port == u16::MAX {
                        PORT_FLOOR
                    } else {
                        port + 1
                    };
                    if !self.unmap.contains_key(&port) {
                        return Some(port);
                    }
                }
                None
            }
        }
    }

    /// `unmap[map[k]]` round-trips for every live entry.
    pub fn is_strict_inverse(&self) -> bool {
        self.map.len() == self.unmap.len()
            && self
                .map
                .iter()
                .all(|(key, port)| self.unmap.get(port).is_some_and(|b| b.key == *key))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn ep(s: &str) -> SocketAddrV4 {
        s.parse().expect("test endpoint is valid")
    }

    fn src() -> (Ipv4Addr, u16) {
        (Ipv4Addr::new(10, 0, 0, 1), 3456)
    }

    #[test]
    fn easy_reuses_one_port_across_destinations() {
        let mut table = NatTable::new(NatProfile::easy());
        let mut rng = StdRng::seed_from_u64(1);
        let p1 = table.outbound(ep("1.0.0.1:3456"), src(), 0, &mut rng);
        let p2 = table.outbound(ep("1.0.0.2:3456"), src(), 5, &mut rng);
        assert_eq!(p1, p2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn hard_allocates_per_destination() {
        let mut table = NatTable::new(NatProfile::hard());
        let mut rng = StdRng::seed_from_u64(1);
        let p1 = table.outbound(ep("1.0.0.1:3456"), src(), 0, &mut rng);
        let p2 = table.outbound(ep("1.0.0.2:3456"), src(), 5, &mut rng);
        assert_ne!(p1, p2);
        assert_eq!(table.len(), 2);
        // Same destination still reuses.
        let p3 = table.outbound(ep("1.0.0.1:3456"), src(), 10, &mut rng);
        assert_eq!(p1, p3);
    }

    #[test]
    fn inbound_resolves_the_internal_endpoint() {
        let mut table = NatTable::new(NatProfile::easy());
        let mut rng = StdRng::seed_from_u64(2);
        let port = table
            .outbound(ep("1.0.0.1:3456"), src(), 0, &mut rng)
            .expect("ports available");
        assert_eq!(table.inbound(port, 100), Some(src()));
        assert_eq!(table.inbound(port.wrapping_add(1), 100), None);
    }

    #[test]
    fn idle_mappings_expire_and_refresh_extends() {
        let ttl = NatProfile::easy().ttl;
        let mut table = NatTable::new(NatProfile::easy());
        let mut rng = StdRng::seed_from_u64(3);
        let port = table
            .outbound(ep("1.0.0.1:3456"), src(), 0, &mut rng)
            .expect("ports available");

        // Kept alive by inbound use just before the deadline.
        assert_eq!(table.inbound(port, ttl), Some(src()));
        assert_eq!(table.inbound(port, 2 * ttl), Some(src()));

        // Then left idle past the TTL: gone, in both directions.
        assert_eq!(table.inbound(port, 3 * ttl + 1), None);
        assert!(table.is_empty());
        let fresh = table.outbound(ep("1.0.0.1:3456"), src(), 3 * ttl + 2, &mut rng);
        assert!(fresh.is_some());
    }

    #[test]
    fn sequential_allocation_ascends_from_the_floor() {
        let mut profile = NatProfile::hard();
        profile.alloc = PortAlloc::Sequential;
        let mut table = NatTable::new(profile);
        let mut rng = StdRng::seed_from_u64(4);
        let p1 = table.outbound(ep("1.0.0.1:3456"), src(), 0, &mut rng);
        let p2 = table.outbound(ep("1.0.0.2:3456"), src(), 0, &mut rng);
        assert_eq!(p1, Some(PORT_FLOOR));
        assert_eq!(p2, Some(PORT_FLOOR + 1));
    }

    proptest! {
        #[test]
        fn map_and_unmap_stay_strict_inverses(
            seed in any::<u64>(),
            flows in prop::collection::vec((1u8..=250, 1024u16..65535, 1u8..=250), 1..60),
        ) {
            let mut table = NatTable::new(NatProfile::hard());
            let mut rng = StdRng::seed_from_u64(seed);
            for (i, (dst, dport, sport_salt)) in flows.iter().enumerate() {
                let dst = ep(&format!("1.0.0.{dst}:{dport}"));
                let src = (Ipv4Addr::new(10, 0, 0, 1), 3000 + *sport_salt as u16);
                table.outbound(dst, src, i as u64, &mut rng);
                prop_assert!(table.is_strict_inverse());
            }
        }

        #[test]
        fn external_ports_never_collide(seed in any::<u64>()) {
            let mut table = NatTable::new(NatProfile::hard());
            let mut rng = StdRng::seed_from_u64(seed);
            let mut seen = std::collections::BTreeSet::new();
            for i in 0..100u16 {
                let dst = ep(&format!("1.0.{}.{}:4000", i / 250 + 1, i % 250 + 1));
                let port = table
                    .outbound(dst, src(), 0, &mut rng)
                    .expect("far from exhaustion");
                prop_assert!(seen.insert(port), "port {port} reused");
            }
        }
    }
}
