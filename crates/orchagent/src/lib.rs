//! Orchestration daemon for IP + SRv6 forwarding.
//!
//! Consumes normalized records from the state bus and programs the ASIC
//! through the vendor-abstract API in `fib-asic`:
//!
//! ```text
//! [state bus] ──> NhgOrch  ──┐
//!             ──> Srv6Orch ──┼──> ASIC API
//!                            │
//!      neighbor events ──────┘
//! ```
//!
//! The two orchestrators own disjoint object families; everything else they
//! need (neighbors, VRFs, router interfaces, CRM counters, the route
//! orchestrator's group count) is reached through the contract traits in
//! [`neigh`], [`vrf`], [`intfs`] and [`crm`].

pub mod crm;
pub mod daemon;
pub mod intfs;
pub mod neigh;
pub mod nhg;
pub mod route;
pub mod srv6;
pub mod vrf;

pub use crm::{CrmApi, CrmCounters, CrmResourceType};
pub use intfs::{InterfaceApi, InterfaceRegistry};
pub use neigh::{NeighborApi, NeighborObserver, NeighborRegistry, NeighborUpdate};
pub use nhg::{NhgOrch, NhgOrchConfig, NhgOrchStats, RouteGroupsApi};
pub use route::{KeyParseError, NextHopFlags, NextHopGroupKey, NextHopKey};
pub use srv6::{SharedSrv6, Srv6NexthopApi, Srv6Orch, Srv6OrchConfig, Srv6OrchStats};
pub use vrf::{VrfApi, VrfRegistry};
