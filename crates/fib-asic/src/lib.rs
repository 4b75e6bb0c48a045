//! Vendor-abstract ASIC programming interface.
//!
//! The orchestrators never talk to a hardware SDK directly; they go through
//! the per-object-family traits defined here. A production build plugs in a
//! driver-backed implementation, tests and the daemons' simulation mode use
//! [`sim::SimAsic`].

pub mod api;
pub mod bulker;
pub mod error;
pub mod sim;
pub mod types;

pub use api::{
    BehaviorFlavor, EndpointBehavior, MySidEntryKey, MySidRequest, NextHopApi, NextHopGroupApi,
    NextHopGroupMemberRequest, SidListType, Srv6Api, Srv6NextHopRequest, TunnelApi,
    TunnelMapEntryRequest, TunnelRequest,
};
pub use bulker::MemberBulker;
pub use error::{AsicError, AsicResult, AsicStatus, StatusAction};
pub use sim::SimAsic;
pub use types::{RawObjectId, NULL_OBJECT_ID};
