use std::{fmt, str::FromStr, sync::Arc};

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::protocol::KEEP_ALIVE_TIMEOUT;

// ─── PeerId ─────────────────────────────────────────────────────────────────

/// Opaque peer identity. Generated ids are 32 random bytes, hex-encoded;
/// the wire carries the string form verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(Arc<str>);

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s.into()))
    }
}

impl PeerId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Draw a fresh high-entropy identity from `rng`.
    pub fn generate(rng: &mut impl Rng) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.is_empty() {
            true => Err(IdParseError),
            false => Ok(Self(s.into())),
        }
    }
}

#[derive(Debug, Error)]
#[error("id cannot be empty")]
pub struct IdParseError;

// ─── SwarmId ────────────────────────────────────────────────────────────────

/// Name of a set of peers that want to be mutually connected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwarmId(Arc<str>);

impl Serialize for SwarmId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SwarmId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s.into()))
    }
}

impl SwarmId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SwarmId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.is_empty() {
            true => Err(IdParseError),
            false => Ok(Self(s.into())),
        }
    }
}

// ─── NatKind ────────────────────────────────────────────────────────────────

/// NAT class of an endpoint, as observed through introducer responses.
///
/// `Static` is publicly reachable on any bound port. `Easy` maps one external
/// port per internal source regardless of destination. `Hard` allocates a
/// fresh external port per destination, so no two flows share one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NatKind {
    #[default]
    Unknown,
    Static,
    Easy,
    Hard,
}

impl NatKind {
    /// A single direct ping can reach this side without port scanning.
    pub fn is_open(self) -> bool {
        matches!(self, NatKind::Static | NatKind::Easy)
    }
}

// ─── Liveness ───────────────────────────────────────────────────────────────

/// Classification of a peer record by silence duration. Forgotten is a
/// classification, not a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum Liveness {
    Active,
    Inactive,
    Missing,
    Forgotten,
}

impl Liveness {
    /// Classify `delta` milliseconds of silence against a timeout `t`.
    ///
    /// Thresholds sit at 1.5·t, 3·t and 5·t.
    pub fn classify(delta: u64, t: u64) -> Self {
        if 2 * delta < 3 * t {
            Liveness::Active
        } else if delta < 3 * t {
            Liveness::Inactive
        } else if delta < 5 * t {
            Liveness::Missing
        } else {
            Liveness::Forgotten
        }
    }

    /// Classify against the protocol keepalive timeout.
    pub fn of_silence(delta: u64) -> Self {
        Self::classify(delta, KEEP_ALIVE_TIMEOUT)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn nat_kind_display_is_lowercase() {
        assert_eq!(NatKind::Unknown.to_string(), "unknown");
        assert_eq!(NatKind::Static.to_string(), "static");
        assert_eq!(NatKind::Easy.to_string(), "easy");
        assert_eq!(NatKind::Hard.to_string(), "hard");
    }

    #[test]
    fn nat_kind_wire_form_is_lowercase() {
        let json = serde_json::to_string(&NatKind::Hard).expect("serializing a unit enum");
        assert_eq!(json, "\"hard\"");
        let back: NatKind = serde_json::from_str("\"easy\"").expect("known variant");
        assert_eq!(back, NatKind::Easy);
    }

    #[test]
    fn open_kinds_are_static_and_easy() {
        assert!(NatKind::Static.is_open());
        assert!(NatKind::Easy.is_open());
        assert!(!NatKind::Hard.is_open());
        assert!(!NatKind::Unknown.is_open());
    }

    #[test]
    fn generated_ids_are_distinct() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);
        let a = PeerId::generate(&mut rng);
        let b = PeerId::generate(&mut rng);
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn empty_id_does_not_parse() {
        assert!("".parse::<PeerId>().is_err());
        assert!("".parse::<SwarmId>().is_err());
    }

    proptest! {
        #[test]
        fn liveness_boundaries(t in 1_000u64..100_000) {
            prop_assert_eq!(Liveness::classify(0, t), Liveness::Active);
            prop_assert_eq!(Liveness::classify(3 * t / 2 - 1, t), Liveness::Active);
            prop_assert_eq!(Liveness::classify(3 * t / 2 + 1, t), Liveness::Inactive);
            prop_assert_eq!(Liveness::classify(3 * t - 1, t), Liveness::Inactive);
            prop_assert_eq!(Liveness::classify(3 * t, t), Liveness::Missing);
            prop_assert_eq!(Liveness::classify(5 * t - 1, t), Liveness::Missing);
            prop_assert_eq!(Liveness::classify(5 * t, t), Liveness::Forgotten);
        }

        #[test]
        fn liveness_is_monotone_in_silence(
            t in 1_000u64..100_000,
            d1 in 0u64..600_000,
            d2 in 0u64..600_000,
        ) {
            let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
            prop_assert!(Liveness::classify(lo, t) <= Liveness::classify(hi, t));
        }

        #[test]
        fn peer_id_roundtrips_through_json(s in "[a-f0-9]{8,64}") {
            let id = PeerId::new(s.as_str());
            let json = serde_json::to_string(&id).expect("serializing a string id");
            let back: PeerId = serde_json::from_str(&json).expect("deserializing a string id");
            prop_assert_eq!(id, back);
        }
    }
}
