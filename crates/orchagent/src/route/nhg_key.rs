//! Next-hop group key: an ordered-by-content set of weighted next-hops.
//!
//! The canonical string encoding is stable and doubles as the state-bus key
//! for a group, so `encode(parse(s)) == s` must hold for canonical strings.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

use super::nexthop::NextHopKey;

/// Group members are joined by `,`, next-hop fields by `|`, label stacks by
/// `+`. Bit-exact with the bus schema.
pub const NHG_DELIMITER: char = ',';

/// Error raised when parsing a next-hop or group key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("empty next-hop key")]
    Empty,
    #[error("next-hop {0:?} does not match the group's encoding variant")]
    MixedVariant(String),
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: String, value: String },
    #[error("{nexthops} next-hops but {weights} weights")]
    WeightCountMismatch { nexthops: usize, weights: usize },
}

impl KeyParseError {
    pub(crate) fn empty() -> Self {
        KeyParseError::Empty
    }

    pub(crate) fn mixed_variant(s: &str) -> Self {
        KeyParseError::MixedVariant(s.to_string())
    }

    pub(crate) fn invalid_field(field: &str, value: &str) -> Self {
        KeyParseError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// A set of next-hops with variant flags.
///
/// Membership and ordering of the set use next-hop identity (weights
/// excluded); `==` and `<` between whole group keys additionally compare the
/// member weights in iteration order, so a weight-only update produces a key
/// that is unequal but contains the same members.
#[derive(Debug, Clone, Default)]
pub struct NextHopGroupKey {
    nexthops: BTreeSet<NextHopKey>,
    overlay_nexthops: bool,
    srv6_nexthops: bool,
    srv6_vpn: bool,
}

impl NextHopGroupKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(nh: NextHopKey) -> Self {
        let mut key = Self {
            overlay_nexthops: nh.is_overlay(),
            srv6_nexthops: nh.is_srv6(),
            srv6_vpn: nh.is_srv6_vpn(),
            ..Self::default()
        };
        key.nexthops.insert(nh);
        key
    }

    /// Parse one of the three encodings, selected by the variant flags.
    /// Weights are a parallel `,`-separated list; an empty weights string
    /// leaves every member unweighted, any other length mismatch fails.
    pub fn parse(
        nexthops: &str,
        weights: &str,
        overlay: bool,
        srv6: bool,
    ) -> Result<Self, KeyParseError> {
        let nh_tokens: Vec<&str> = nexthops
            .split(NHG_DELIMITER)
            .filter(|t| !t.trim().is_empty())
            .collect();
        if nh_tokens.is_empty() {
            return Err(KeyParseError::Empty);
        }

        let weight_tokens: Vec<&str> = if weights.trim().is_empty() {
            vec![]
        } else {
            weights.split(NHG_DELIMITER).collect()
        };
        if !weight_tokens.is_empty() && weight_tokens.len() != nh_tokens.len() {
            return Err(KeyParseError::WeightCountMismatch {
                nexthops: nh_tokens.len(),
                weights: weight_tokens.len(),
            });
        }

        let mut key = Self {
            overlay_nexthops: overlay,
            srv6_nexthops: srv6,
            srv6_vpn: false,
            ..Self::default()
        };

        for (i, tok) in nh_tokens.iter().enumerate() {
            let mut nh = if srv6 {
                NextHopKey::parse_srv6(tok)?
            } else if overlay {
                NextHopKey::parse_overlay(tok)?
            } else {
                NextHopKey::parse_plain(tok)?
            };
            if let Some(w) = weight_tokens.get(i) {
                nh.weight = w
                    .trim()
                    .parse()
                    .map_err(|_| KeyParseError::invalid_field("weight", w))?;
            }
            if nh.is_srv6_vpn() {
                key.srv6_vpn = true;
            }
            key.nexthops.insert(nh);
        }

        Ok(key)
    }

    pub fn parse_plain(nexthops: &str, weights: &str) -> Result<Self, KeyParseError> {
        Self::parse(nexthops, weights, false, false)
    }

    pub fn parse_overlay(nexthops: &str, weights: &str) -> Result<Self, KeyParseError> {
        Self::parse(nexthops, weights, true, false)
    }

    pub fn parse_srv6(nexthops: &str, weights: &str) -> Result<Self, KeyParseError> {
        Self::parse(nexthops, weights, false, true)
    }

    pub fn next_hops(&self) -> &BTreeSet<NextHopKey> {
        &self.nexthops
    }

    pub fn size(&self) -> usize {
        self.nexthops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nexthops.is_empty()
    }

    pub fn is_overlay_nexthop(&self) -> bool {
        self.overlay_nexthops
    }

    pub fn is_srv6_nexthop(&self) -> bool {
        self.srv6_nexthops
    }

    pub fn is_srv6_vpn(&self) -> bool {
        self.srv6_vpn
    }

    pub fn contains_nh(&self, nh: &NextHopKey) -> bool {
        self.nexthops.contains(nh)
    }

    /// Subset by member identity, ignoring weights.
    pub fn contains(&self, other: &NextHopGroupKey) -> bool {
        other.nexthops.iter().all(|nh| self.nexthops.contains(nh))
    }

    pub fn has_intf_next_hop(&self) -> bool {
        self.nexthops.iter().any(|nh| nh.is_intf_next_hop())
    }

    fn weights(&self) -> impl Iterator<Item = u32> + '_ {
        self.nexthops.iter().map(|nh| nh.weight)
    }

    /// Stable canonical encoding.
    pub fn encode(&self) -> String {
        self.nexthops
            .iter()
            .map(|nh| nh.encode(self.overlay_nexthops, self.srv6_nexthops))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialEq for NextHopGroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.nexthops == other.nexthops && self.weights().eq(other.weights())
    }
}

impl Eq for NextHopGroupKey {}

impl Hash for NextHopGroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for nh in &self.nexthops {
            nh.hash(state);
            nh.weight.hash(state);
        }
    }
}

impl Ord for NextHopGroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.nexthops.cmp(&other.nexthops) {
            Ordering::Equal => self.weights().cmp(other.weights()),
            ord => ord,
        }
    }
}

impl PartialOrd for NextHopGroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NextHopGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for NextHopGroupKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_plain(s, "")
    }
}
