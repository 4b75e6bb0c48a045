//! Shared network value types for the fib control plane.
//!
//! These are thin, strongly-typed wrappers over the std network types with
//! the parsing and ordering behavior the orchestration layers rely on.

pub mod ip;
pub mod mac;

pub use ip::{IpAddress, IpPrefix, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;

use thiserror::Error;

/// Error raised when parsing any of the shared value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),
    #[error("invalid IP prefix: {0}")]
    InvalidIpPrefix(String),
    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),
}
