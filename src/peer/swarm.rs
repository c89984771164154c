use std::{
    collections::{BTreeMap, BTreeSet},
    net::Ipv4Addr,
};

use rand::{Rng, seq::SliceRandom};

use crate::types::{NatKind, PeerId};

use super::record::PeerRecord;

/// One named set of peers that want to be mutually connected.
#[derive(Debug, Clone, Default)]
pub struct Swarm {
    pub members: BTreeSet<PeerId>,
    /// Last time any member spoke about this swarm.
    pub last_heard: u64,
    /// Whether this peer has itself joined (as opposed to merely serving
    /// the swarm as an introducer).
    pub joined: bool,
}

impl Swarm {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Pick the members a joining sender should be introduced to.
///
/// Candidates are the members other than the sender that have a record,
/// shuffled with `rng`. A hard sender is only offered candidates it can
/// actually traverse to: non-hard peers, plus hard peers sharing its public
/// address (reachable via their local endpoints). Candidates sharing the
/// sender's address rank first, then the shuffle order stands; the list is
/// truncated to `limit`.
pub fn select_introductions(
    members: &BTreeSet<PeerId>,
    sender: &PeerId,
    sender_nat: NatKind,
    sender_addr: Ipv4Addr,
    records: &BTreeMap<PeerId, PeerRecord>,
    limit: usize,
    rng: &mut impl Rng,
) -> Vec<PeerId> {
    let mut candidates: Vec<&PeerRecord> = members
        .iter()
        .filter(|m| *m != sender)
        .filter_map(|m| records.get(m))
        .collect();
    candidates.shuffle(rng);

    if sender_nat == NatKind::Hard {
        candidates.retain(|r| r.nat != NatKind::Hard || r.address == sender_addr);
    }

    let (same_addr, rest): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|r| r.address == sender_addr);

    same_addr
        .into_iter()
        .chain(rest)
        .take(limit)
        .map(|r| r.id.clone())
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
