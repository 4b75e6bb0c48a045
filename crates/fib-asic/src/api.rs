//! Per-object-family ASIC API traits and their request structs.
//!
//! Implementations must be cheap to call and non-blocking; the single
//! threaded orchestration loop serializes access.

use crate::error::AsicResult;
use crate::types::RawObjectId;
use fib_types::Ipv6Address;

/// SRv6 endpoint behavior programmed into a MY_SID entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointBehavior {
    End,
    EndX,
    EndT,
    EndDx4,
    EndDx6,
    EndDt4,
    EndDt6,
    EndDt46,
    EndB6Encaps,
    EndB6EncapsRed,
    EndB6Insert,
    EndB6InsertRed,
    Un,
    Ua,
}

/// Behavior flavor variant for MY_SID entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorFlavor {
    PspAndUsp,
    PspAndUsd,
}

/// Encapsulation mode of a SID list object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SidListType {
    Insert,
    InsertRed,
    Encaps,
    EncapsRed,
}

/// Member of an ECMP group, bulkable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopGroupMemberRequest {
    pub group_id: RawObjectId,
    pub next_hop_id: RawObjectId,
    /// Omitted for unweighted members.
    pub weight: Option<u32>,
}

/// SRv6 SID-list nexthop bound to a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srv6NextHopRequest {
    /// Null when the nexthop carries no segment list.
    pub sid_list_id: RawObjectId,
    pub tunnel_id: RawObjectId,
}

/// SRv6 tunnel, source-only or P2P.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub src_ip: Ipv6Address,
    pub underlay_rif: RawObjectId,
    /// Present for P2P tunnels only.
    pub dst_ip: Option<Ipv6Address>,
    /// Encap mapper attached to P2P tunnels for VPN steering.
    pub encap_mapper: Option<RawObjectId>,
}

/// VPN steering entry: aggregation id -> VPN SID under a tunnel map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelMapEntryRequest {
    pub tunnel_map_id: RawObjectId,
    pub prefix_agg_id: u32,
    pub vpn_sid: Ipv6Address,
}

/// Identity of a MY_SID entry. MY_SID entries are keyed, not id-addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MySidEntryKey {
    pub vr_id: RawObjectId,
    pub locator_block_len: u8,
    pub locator_node_len: u8,
    pub function_len: u8,
    pub args_len: u8,
    pub sid: Ipv6Address,
}

/// Full MY_SID programming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySidRequest {
    pub key: MySidEntryKey,
    pub behavior: EndpointBehavior,
    pub flavor: BehaviorFlavor,
    pub vrf_id: Option<RawObjectId>,
    pub next_hop_id: Option<RawObjectId>,
}

/// Plain and SRv6 nexthop objects.
pub trait NextHopApi: Send + Sync {
    fn create_srv6_next_hop(&self, req: &Srv6NextHopRequest) -> AsicResult<RawObjectId>;
    fn remove_next_hop(&self, next_hop_id: RawObjectId) -> AsicResult<()>;
}

/// ECMP group objects and their members.
pub trait NextHopGroupApi: Send + Sync {
    fn create_next_hop_group(&self) -> AsicResult<RawObjectId>;
    fn remove_next_hop_group(&self, group_id: RawObjectId) -> AsicResult<()>;
    fn create_group_member(&self, req: &NextHopGroupMemberRequest) -> AsicResult<RawObjectId>;
    fn remove_group_member(&self, member_id: RawObjectId) -> AsicResult<()>;
    fn set_group_member_weight(&self, member_id: RawObjectId, weight: u32) -> AsicResult<()>;
}

/// SRv6 tunnels, tunnel maps and VPN steering entries.
pub trait TunnelApi: Send + Sync {
    fn create_tunnel(&self, req: &TunnelRequest) -> AsicResult<RawObjectId>;
    fn remove_tunnel(&self, tunnel_id: RawObjectId) -> AsicResult<()>;
    fn create_tunnel_map(&self) -> AsicResult<RawObjectId>;
    fn remove_tunnel_map(&self, tunnel_map_id: RawObjectId) -> AsicResult<()>;
    fn create_tunnel_map_entry(&self, req: &TunnelMapEntryRequest) -> AsicResult<RawObjectId>;
    fn remove_tunnel_map_entry(&self, entry_id: RawObjectId) -> AsicResult<()>;
}

/// SID lists and MY_SID endpoint entries.
pub trait Srv6Api: Send + Sync {
    fn create_sid_list(
        &self,
        segments: &[Ipv6Address],
        list_type: SidListType,
    ) -> AsicResult<RawObjectId>;
    fn set_sid_list_segments(
        &self,
        sid_list_id: RawObjectId,
        segments: &[Ipv6Address],
    ) -> AsicResult<()>;
    fn remove_sid_list(&self, sid_list_id: RawObjectId) -> AsicResult<()>;
    fn create_my_sid(&self, req: &MySidRequest) -> AsicResult<()>;
    fn set_my_sid_vrf(&self, key: &MySidEntryKey, vrf_id: RawObjectId) -> AsicResult<()>;
    fn set_my_sid_next_hop(&self, key: &MySidEntryKey, next_hop_id: RawObjectId) -> AsicResult<()>;
    fn remove_my_sid(&self, key: &MySidEntryKey) -> AsicResult<()>;
}
