//! Next-hop key: the canonical identity of a single forwarding destination.
//!
//! A next-hop is one of: plain IP (optionally labeled), interface-only,
//! overlay (EVPN VXLAN), or SRv6 (optionally VPN). Identity covers every
//! field except `weight`; weight only participates in the strict ordering of
//! whole group keys.

use fib_types::{IpAddress, MacAddress};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::nhg_key::KeyParseError;

/// MPLS label stack carried by a labeled next-hop, outermost first.
pub type LabelStack = Vec<u32>;

/// Runtime state bits for a next-hop, owned by the neighbor subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NextHopFlags(u32);

impl NextHopFlags {
    pub const NONE: Self = Self(0);
    /// The neighbor's interface is operationally down.
    pub const IF_DOWN: Self = Self(1 << 0);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

/// Identity of a single next-hop.
#[derive(Debug, Clone)]
pub struct NextHopKey {
    pub ip_address: IpAddress,
    pub alias: String,
    /// VNI for overlay next-hops, 0 otherwise.
    pub vni: u32,
    /// Inner router MAC for overlay next-hops.
    pub router_mac: Option<MacAddress>,
    pub label_stack: LabelStack,
    /// Secondary discriminator only; excluded from identity.
    pub weight: u32,
    /// SRv6 segment (SID list) name, empty when unset.
    pub srv6_segment: String,
    /// SRv6 encap source address string, empty when unset.
    pub srv6_source: String,
    /// SRv6 VPN SID, empty when unset.
    pub srv6_vpn_sid: String,
}

impl NextHopKey {
    pub fn new(ip_address: IpAddress, alias: impl Into<String>) -> Self {
        Self {
            ip_address,
            alias: alias.into(),
            vni: 0,
            router_mac: None,
            label_stack: Vec::new(),
            weight: 0,
            srv6_segment: String::new(),
            srv6_source: String::new(),
            srv6_vpn_sid: String::new(),
        }
    }

    pub fn interface_only(alias: impl Into<String>) -> Self {
        Self::new(IpAddress::unspecified_v4(), alias)
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// True when the next-hop is just an egress interface.
    pub fn is_intf_next_hop(&self) -> bool {
        self.ip_address.is_unspecified() && !self.is_srv6()
    }

    pub fn is_overlay(&self) -> bool {
        self.vni > 0
    }

    pub fn is_labeled(&self) -> bool {
        !self.label_stack.is_empty()
    }

    pub fn is_srv6(&self) -> bool {
        !self.srv6_source.is_empty()
    }

    pub fn is_srv6_vpn(&self) -> bool {
        !self.srv6_vpn_sid.is_empty()
    }

    fn identity(
        &self,
    ) -> (
        &IpAddress,
        &str,
        u32,
        &Option<MacAddress>,
        &[u32],
        &str,
        &str,
        &str,
    ) {
        (
            &self.ip_address,
            self.alias.as_str(),
            self.vni,
            &self.router_mac,
            self.label_stack.as_slice(),
            self.srv6_source.as_str(),
            self.srv6_vpn_sid.as_str(),
            self.srv6_segment.as_str(),
        )
    }

    fn labels_string(&self) -> String {
        self.label_stack
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Canonical encoding for the given group variant.
    pub fn encode(&self, overlay: bool, srv6: bool) -> String {
        if srv6 {
            format!(
                "{}|{}|{}|{}",
                self.ip_address, self.srv6_vpn_sid, self.srv6_source, self.srv6_segment
            )
        } else if overlay {
            let mac = self
                .router_mac
                .map(|m| m.to_string())
                .unwrap_or_default();
            format!("{}|{}|{}|{}", self.ip_address, self.alias, self.vni, mac)
        } else if self.is_labeled() {
            format!("{}+{}@{}", self.labels_string(), self.ip_address, self.alias)
        } else {
            format!("{}@{}", self.ip_address, self.alias)
        }
    }

    /// Parse the plain encoding: `[labels+]ip@alias`, or a bare interface
    /// alias.
    pub fn parse_plain(s: &str) -> Result<Self, KeyParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(KeyParseError::empty());
        }
        if s.contains('|') {
            return Err(KeyParseError::mixed_variant(s));
        }

        let (labels, rest) = match s.split_once('+') {
            Some((labels, rest)) => (Some(labels), rest),
            None => (None, s),
        };

        let mut label_stack = Vec::new();
        if let Some(labels) = labels {
            for tok in labels.split('/') {
                let label: u32 = tok
                    .parse()
                    .map_err(|_| KeyParseError::invalid_field("label", tok))?;
                label_stack.push(label);
            }
        }

        let key = match rest.split_once('@') {
            Some((ip_str, alias)) => {
                let ip: IpAddress = ip_str
                    .parse()
                    .map_err(|_| KeyParseError::invalid_field("ip", ip_str))?;
                NextHopKey::new(ip, alias)
            }
            None => {
                if label_stack.is_empty() {
                    NextHopKey::interface_only(rest)
                } else {
                    return Err(KeyParseError::invalid_field("nexthop", s));
                }
            }
        };

        Ok(NextHopKey {
            label_stack,
            ..key
        })
    }

    /// Parse the overlay encoding: `ip|alias|vni|rmac`.
    pub fn parse_overlay(s: &str) -> Result<Self, KeyParseError> {
        let fields: Vec<&str> = s.trim().split('|').collect();
        if fields.len() != 4 {
            return Err(KeyParseError::mixed_variant(s));
        }
        let ip: IpAddress = fields[0]
            .parse()
            .map_err(|_| KeyParseError::invalid_field("ip", fields[0]))?;
        let vni: u32 = fields[2]
            .parse()
            .map_err(|_| KeyParseError::invalid_field("vni", fields[2]))?;
        let router_mac = if fields[3].is_empty() {
            None
        } else {
            Some(
                fields[3]
                    .parse::<MacAddress>()
                    .map_err(|_| KeyParseError::invalid_field("router_mac", fields[3]))?,
            )
        };

        let mut key = NextHopKey::new(ip, fields[1]);
        key.vni = vni;
        key.router_mac = router_mac;
        Ok(key)
    }

    /// Parse the SRv6 encoding: `ip|vpn_sid|src|segment`.
    pub fn parse_srv6(s: &str) -> Result<Self, KeyParseError> {
        let fields: Vec<&str> = s.trim().split('|').collect();
        if fields.len() != 4 {
            return Err(KeyParseError::mixed_variant(s));
        }
        let ip: IpAddress = fields[0]
            .parse()
            .map_err(|_| KeyParseError::invalid_field("ip", fields[0]))?;
        if fields[2].is_empty() {
            return Err(KeyParseError::invalid_field("srv6_source", fields[2]));
        }

        let mut key = NextHopKey::new(ip, "");
        key.srv6_vpn_sid = fields[1].to_string();
        key.srv6_source = fields[2].to_string();
        key.srv6_segment = fields[3].to_string();
        Ok(key)
    }
}

impl PartialEq for NextHopKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for NextHopKey {}

impl Hash for NextHopKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Ord for NextHopKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl PartialOrd for NextHopKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NextHopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode(self.is_overlay(), self.is_srv6()))
    }
}
