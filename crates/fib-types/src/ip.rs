//! IP address and prefix types with safe parsing.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    pub const fn inner(&self) -> Ipv4Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

/// An IPv6 address wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv6Address(Ipv6Addr);

impl Ipv6Address {
    pub const UNSPECIFIED: Self = Ipv6Address(Ipv6Addr::UNSPECIFIED);

    pub const fn inner(&self) -> Ipv6Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 16] {
        self.0.octets()
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv6Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv6Addr>()
            .map(Ipv6Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv6Addr> for Ipv6Address {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Address(addr)
    }
}

/// Either an IPv4 or an IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddress {
    pub const fn is_v4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_v6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// True for `0.0.0.0` or `::`.
    pub fn is_unspecified(&self) -> bool {
        match self {
            IpAddress::V4(a) => *a == Ipv4Address::UNSPECIFIED,
            IpAddress::V6(a) => *a == Ipv6Address::UNSPECIFIED,
        }
    }

    /// The all-zero address of the same family.
    pub const fn unspecified_v4() -> Self {
        IpAddress::V4(Ipv4Address::UNSPECIFIED)
    }

    pub fn as_v6(&self) -> Option<Ipv6Address> {
        match self {
            IpAddress::V6(a) => Some(*a),
            IpAddress::V4(_) => None,
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(a) => a.fmt(f),
            IpAddress::V6(a) => a.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            s.parse::<Ipv6Address>().map(IpAddress::V6)
        } else {
            s.parse::<Ipv4Address>().map(IpAddress::V4)
        }
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Address> for IpAddress {
    fn from(addr: Ipv6Address) -> Self {
        IpAddress::V6(addr)
    }
}

/// An IP prefix: address plus mask length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpPrefix {
    addr: IpAddress,
    len: u8,
}

impl IpPrefix {
    pub fn new(addr: IpAddress, len: u8) -> Self {
        IpPrefix { addr, len }
    }

    pub const fn addr(&self) -> IpAddress {
        self.addr
    }

    pub const fn len(&self) -> u8 {
        self.len
    }

    pub const fn is_v4(&self) -> bool {
        self.addr.is_v4()
    }

    /// True when the prefix covers a single address (/32 or /128).
    pub fn is_full_length(&self) -> bool {
        match self.addr {
            IpAddress::V4(_) => self.len == 32,
            IpAddress::V6(_) => self.len == 128,
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;
        let addr: IpAddress = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        let len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        let max = if addr.is_v4() { 32 } else { 128 };
        if len > max {
            return Err(ParseError::InvalidIpPrefix(s.to_string()));
        }
        Ok(IpPrefix { addr, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_address_parse() {
        let v4: IpAddress = "192.168.1.1".parse().unwrap();
        assert!(v4.is_v4());
        assert_eq!(v4.to_string(), "192.168.1.1");

        let v6: IpAddress = "fc00:0:1:1::1".parse().unwrap();
        assert!(v6.is_v6());
        assert_eq!(v6.to_string(), "fc00:0:1:1::1");

        assert!("not-an-ip".parse::<IpAddress>().is_err());
    }

    #[test]
    fn test_unspecified() {
        let zero: IpAddress = "0.0.0.0".parse().unwrap();
        assert!(zero.is_unspecified());
        assert!(!"10.0.0.1".parse::<IpAddress>().unwrap().is_unspecified());
        assert!("::".parse::<IpAddress>().unwrap().is_unspecified());
    }

    #[test]
    fn test_prefix_parse() {
        let p: IpPrefix = "192.168.6.0/24".parse().unwrap();
        assert_eq!(p.len(), 24);
        assert_eq!(p.to_string(), "192.168.6.0/24");
        assert!(!p.is_full_length());

        let host: IpPrefix = "fc00:0:1:1::/128".parse().unwrap();
        assert!(host.is_full_length());

        assert!("10.0.0.0/33".parse::<IpPrefix>().is_err());
        assert!("10.0.0.0".parse::<IpPrefix>().is_err());
    }
}
