//! Nexthop identity types shared by the orchestrators.

pub mod nexthop;
pub mod nhg_key;

pub use nexthop::{LabelStack, NextHopFlags, NextHopKey};
pub use nhg_key::{KeyParseError, NextHopGroupKey};
