//! Nexthop group orchestration.

pub mod orch;
pub mod types;

pub use orch::{NhgOrch, NhgOrchConfig, NhgOrchStats, NhgServices, RouteGroupsApi, StaticRouteGroups};
pub use types::{NextHopGroup, NextHopGroupMember, NhgEntry};
