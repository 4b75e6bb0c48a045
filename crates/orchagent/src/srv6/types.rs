//! SRv6 table entries and the endpoint-behavior maps.

use crate::route::NextHopKey;
use fib_asic::api::{BehaviorFlavor, EndpointBehavior, MySidEntryKey, SidListType};
use fib_asic::RawObjectId;
use std::collections::BTreeSet;

/// Source tunnel: one per SRv6 encap source, refcounted by next-hops.
#[derive(Debug, Default)]
pub struct Srv6TunnelEntry {
    pub tunnel_id: RawObjectId,
    pub nexthops: BTreeSet<NextHopKey>,
}

/// Key of a VPN tunnel-map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelMapEntryKey {
    pub endpoint: String,
    pub vpn_sid: String,
    pub prefix_agg_id: u32,
}

#[derive(Debug)]
pub struct TunnelMapEntryValue {
    pub entry_id: RawObjectId,
    pub ref_count: u32,
}

/// P2P tunnel towards one endpoint, with its VPN tunnel map. Kept alive by
/// next-hops and tunnel-map entries.
#[derive(Debug, Default)]
pub struct Srv6P2pTunnelEntry {
    pub tunnel_id: RawObjectId,
    pub tunnel_map_id: RawObjectId,
    pub nexthops: BTreeSet<NextHopKey>,
    pub tunnel_map_entries: BTreeSet<TunnelMapEntryKey>,
}

/// SID-list object plus the next-hops referencing it.
#[derive(Debug, Default)]
pub struct SidListEntry {
    pub sid_object_id: RawObjectId,
    pub nexthops: BTreeSet<NextHopKey>,
}

/// Installed MY_SID entry.
#[derive(Debug, Clone)]
pub struct MySidEntry {
    pub entry_key: MySidEntryKey,
    pub behavior: EndpointBehavior,
    pub vrf: String,
    pub adj: String,
    pub ifname: String,
}

/// MY_SID record parked until its adjacency resolves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingMySid {
    pub key_string: String,
    pub vrf: String,
    pub adj: String,
    pub action: String,
    pub ifname: String,
}

/// Aggregation id and its referrer count.
#[derive(Debug)]
pub struct AggIdEntry {
    pub agg_id: u32,
    pub ref_count: u32,
}

/// PIC context: parallel (nexthop, vpn-sid) pairs behind one agg id.
#[derive(Debug, Clone)]
pub struct PicContextEntry {
    pub nexthops: Vec<String>,
    pub sids: Vec<String>,
    pub ref_count: u32,
}

/// Map an action string onto its endpoint behavior.
pub fn endpoint_behavior(action: &str) -> Option<EndpointBehavior> {
    let behavior = match action {
        "end" => EndpointBehavior::End,
        "end.x" => EndpointBehavior::EndX,
        "end.t" => EndpointBehavior::EndT,
        "end.dx6" | "udx6" => EndpointBehavior::EndDx6,
        "end.dx4" | "udx4" => EndpointBehavior::EndDx4,
        "end.dt4" | "udt4" => EndpointBehavior::EndDt4,
        "end.dt6" | "udt6" => EndpointBehavior::EndDt6,
        "end.dt46" | "udt46" => EndpointBehavior::EndDt46,
        "end.b6.encaps" => EndpointBehavior::EndB6Encaps,
        "end.b6.encaps.red" => EndpointBehavior::EndB6EncapsRed,
        "end.b6.insert" => EndpointBehavior::EndB6Insert,
        "end.b6.insert.red" => EndpointBehavior::EndB6InsertRed,
        "un" => EndpointBehavior::Un,
        "ua" => EndpointBehavior::Ua,
        _ => return None,
    };
    Some(behavior)
}

/// Canonical action string for an installed behavior.
pub fn behavior_action(behavior: EndpointBehavior) -> &'static str {
    match behavior {
        EndpointBehavior::End => "end",
        EndpointBehavior::EndX => "end.x",
        EndpointBehavior::EndT => "end.t",
        EndpointBehavior::EndDx6 => "end.dx6",
        EndpointBehavior::EndDx4 => "end.dx4",
        EndpointBehavior::EndDt4 => "end.dt4",
        EndpointBehavior::EndDt6 => "end.dt6",
        EndpointBehavior::EndDt46 => "end.dt46",
        EndpointBehavior::EndB6Encaps => "end.b6.encaps",
        EndpointBehavior::EndB6EncapsRed => "end.b6.encaps.red",
        EndpointBehavior::EndB6Insert => "end.b6.insert",
        EndpointBehavior::EndB6InsertRed => "end.b6.insert.red",
        EndpointBehavior::Un => "un",
        EndpointBehavior::Ua => "ua",
    }
}

/// Flavor for an action; everything outside the explicit map uses
/// PSP_AND_USD.
pub fn behavior_flavor(action: &str) -> BehaviorFlavor {
    match action {
        "end" | "end.x" => BehaviorFlavor::PspAndUsp,
        _ => BehaviorFlavor::PspAndUsd,
    }
}

/// SID-list encap type; unknown strings fall back to ENCAPS_RED.
pub fn sid_list_type(type_str: &str) -> SidListType {
    match type_str {
        "insert" => SidListType::Insert,
        "insert.red" => SidListType::InsertRed,
        "encaps" => SidListType::Encaps,
        _ => SidListType::EncapsRed,
    }
}

/// DT-family behaviors decapsulate into a VRF.
pub fn behavior_requires_vrf(behavior: EndpointBehavior) -> bool {
    matches!(
        behavior,
        EndpointBehavior::EndT
            | EndpointBehavior::EndDt4
            | EndpointBehavior::EndDt6
            | EndpointBehavior::EndDt46
    )
}

/// X/DX/B6/UA behaviors forward to an adjacency.
pub fn behavior_requires_next_hop(behavior: EndpointBehavior) -> bool {
    matches!(
        behavior,
        EndpointBehavior::EndX
            | EndpointBehavior::EndDx4
            | EndpointBehavior::EndDx6
            | EndpointBehavior::EndB6Encaps
            | EndpointBehavior::EndB6EncapsRed
            | EndpointBehavior::EndB6Insert
            | EndpointBehavior::EndB6InsertRed
            | EndpointBehavior::Ua
    )
}
