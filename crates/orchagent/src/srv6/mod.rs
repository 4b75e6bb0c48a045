//! SRv6 orchestration.

pub mod orch;
pub mod types;

use crate::route::NextHopKey;
use fib_asic::RawObjectId;

pub use orch::{SharedSrv6, Srv6Orch, Srv6OrchConfig, Srv6OrchStats, Srv6Services};
pub use types::{MySidEntry, PicContextEntry, SidListEntry, Srv6P2pTunnelEntry, Srv6TunnelEntry};

/// SRv6 next-hop creation surface offered to the group orchestrator.
///
/// Group members that carry SRv6 state resolve their underlying next-hop id
/// through the SRv6 orchestrator rather than the neighbor subsystem.
pub trait Srv6NexthopApi: Send + Sync {
    /// Ensure the tunnel and next-hop objects for this key exist; returns
    /// the next-hop id, or `None` when creation is not currently possible.
    fn create_srv6_nexthop_without_vpn(&self, nh: &NextHopKey) -> Option<RawObjectId>;

    /// Drop the next-hop when unreferenced, cascading to its tunnel.
    fn remove_srv6_nexthop_without_vpn(&self, nh: &NextHopKey) -> bool;
}
