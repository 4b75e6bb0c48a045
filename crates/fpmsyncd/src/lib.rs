//! Route synchronizer.
//!
//! Sits between the routing daemon's FPM feed and the state bus: classifies
//! parsed route messages (standard, label, EVPN overlay, SRv6 steer, SRv6
//! local SID, kernel nexthop group), emits normalized records, and manages
//! route suppression with offload replies and warm-restart reconciliation.
//!
//! The FPM transport framing and the netlink wire parser are external
//! collaborators; this crate consumes already-parsed message structs.

pub mod error;
pub mod messages;
pub mod protocol;
pub mod routesync;
pub mod warm_restart;

pub use error::FpmSyncError;
pub use messages::{
    EvpnNextHop, LocalSidAction, LocalSidInfo, NexthopGroupMessage, RouteEncap, RouteMessage,
    RouteNextHopInfo, RouteOp,
};
pub use protocol::ProtocolDb;
pub use routesync::{FpmInterface, LinkResolver, RouteSync, RouteSyncTables, StaticLinkResolver};
pub use warm_restart::{DisabledWarmRestart, WarmRestartHelper};
