//! Parsed routing-daemon message model.
//!
//! These are the structs the external netlink parser hands over: standard
//! route attributes plus the two SRv6 extensions (steer-route encap and
//! local-SID messages) and kernel nexthop-group objects.

use crate::error::FpmSyncError;
use fib_types::{IpAddress, IpPrefix, Ipv6Address, MacAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOp {
    Add,
    Del,
}

/// One next-hop of a standard route.
#[derive(Debug, Clone)]
pub struct RouteNextHopInfo {
    pub gateway: Option<IpAddress>,
    pub ifindex: u32,
    /// Kernel weight, 0 when absent.
    pub weight: u8,
    /// MPLS label stack encoded `label[/label...]`, `None` for unlabeled.
    pub labels: Option<String>,
}

/// One next-hop of an EVPN VXLAN route.
#[derive(Debug, Clone)]
pub struct EvpnNextHop {
    pub gateway: IpAddress,
    pub vni: u32,
    pub router_mac: MacAddress,
    pub ifname: String,
}

/// Route encapsulation recognized by attribute type.
#[derive(Debug, Clone)]
pub enum RouteEncap {
    EvpnVxlan { nexthops: Vec<EvpnNextHop> },
    Srv6Steer { vpn_sid: Ipv6Address, src_addr: Ipv6Address },
}

/// Local-SID endpoint behaviors carried as action ids in the custom
/// netlink message.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSidAction {
    End = 1,
    EndX = 2,
    EndT = 3,
    EndDx6 = 4,
    EndDx4 = 5,
    EndDt6 = 6,
    EndDt4 = 7,
    EndDt46 = 8,
    EndB6Encaps = 9,
    EndB6EncapsRed = 10,
    EndB6Insert = 11,
    EndB6InsertRed = 12,
    Un = 13,
    Ua = 14,
    Udx6 = 15,
    Udx4 = 16,
    Udt6 = 17,
    Udt4 = 18,
    Udt46 = 19,
}

impl LocalSidAction {
    pub fn from_raw(action: u32) -> Result<Self, FpmSyncError> {
        let action = match action {
            1 => LocalSidAction::End,
            2 => LocalSidAction::EndX,
            3 => LocalSidAction::EndT,
            4 => LocalSidAction::EndDx6,
            5 => LocalSidAction::EndDx4,
            6 => LocalSidAction::EndDt6,
            7 => LocalSidAction::EndDt4,
            8 => LocalSidAction::EndDt46,
            9 => LocalSidAction::EndB6Encaps,
            10 => LocalSidAction::EndB6EncapsRed,
            11 => LocalSidAction::EndB6Insert,
            12 => LocalSidAction::EndB6InsertRed,
            13 => LocalSidAction::Un,
            14 => LocalSidAction::Ua,
            15 => LocalSidAction::Udx6,
            16 => LocalSidAction::Udx4,
            17 => LocalSidAction::Udt6,
            18 => LocalSidAction::Udt4,
            19 => LocalSidAction::Udt46,
            other => return Err(FpmSyncError::UnknownAction(other)),
        };
        Ok(action)
    }

    /// Action string written to the `SRV6_MY_SID` table.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalSidAction::End => "end",
            LocalSidAction::EndX => "end.x",
            LocalSidAction::EndT => "end.t",
            LocalSidAction::EndDx6 => "end.dx6",
            LocalSidAction::EndDx4 => "end.dx4",
            LocalSidAction::EndDt6 => "end.dt6",
            LocalSidAction::EndDt4 => "end.dt4",
            LocalSidAction::EndDt46 => "end.dt46",
            LocalSidAction::EndB6Encaps => "end.b6.encaps",
            LocalSidAction::EndB6EncapsRed => "end.b6.encaps.red",
            LocalSidAction::EndB6Insert => "end.b6.insert",
            LocalSidAction::EndB6InsertRed => "end.b6.insert.red",
            LocalSidAction::Un => "un",
            LocalSidAction::Ua => "ua",
            LocalSidAction::Udx6 => "udx6",
            LocalSidAction::Udx4 => "udx4",
            LocalSidAction::Udt6 => "udt6",
            LocalSidAction::Udt4 => "udt4",
            LocalSidAction::Udt46 => "udt46",
        }
    }
}

/// SRv6 local-SID format attribute plus top-level action fields.
#[derive(Debug, Clone)]
pub struct LocalSidInfo {
    pub block_len: u8,
    pub node_len: u8,
    pub func_len: u8,
    pub arg_len: u8,
    pub action: LocalSidAction,
    pub vrf: String,
    /// L3 adjacency for X/DX behaviors, empty otherwise.
    pub adj: String,
    pub ifname: String,
}

/// A parsed route message.
#[derive(Debug, Clone)]
pub struct RouteMessage {
    pub op: RouteOp,
    pub prefix: IpPrefix,
    /// VRF name resolved from the table/master device, empty for default.
    pub vrf: String,
    pub protocol: u8,
    pub nexthops: Vec<RouteNextHopInfo>,
    pub encap: Option<RouteEncap>,
    pub local_sid: Option<LocalSidInfo>,
    /// Kernel nexthop-group object id, when the route references one.
    pub nhg_id: Option<u32>,
    /// MPLS in-label for label routes; such routes go to the label route
    /// table instead of the IP route table.
    pub dst_label: Option<u32>,
}

impl RouteMessage {
    /// State-bus key: `[vrf:]prefix`.
    pub fn table_key(&self) -> String {
        if self.vrf.is_empty() {
            self.prefix.to_string()
        } else {
            format!("{}:{}", self.vrf, self.prefix)
        }
    }
}

/// A parsed kernel nexthop-group message: either a single nexthop object or
/// a group of member ids with weights.
#[derive(Debug, Clone)]
pub struct NexthopGroupMessage {
    pub op: RouteOp,
    pub id: u32,
    /// `(member id, weight)` pairs for group objects.
    pub group: Vec<(u32, u8)>,
    /// Single-nexthop form: gateway and interface index.
    pub nexthop: Option<(IpAddress, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        assert_eq!(LocalSidAction::from_raw(7).unwrap(), LocalSidAction::EndDt4);
        assert_eq!(LocalSidAction::EndDt4.as_str(), "end.dt4");
        assert_eq!(LocalSidAction::from_raw(19).unwrap().as_str(), "udt46");
        assert!(LocalSidAction::from_raw(99).is_err());
    }

    #[test]
    fn test_table_key() {
        let msg = RouteMessage {
            op: RouteOp::Add,
            prefix: "192.168.6.0/24".parse().unwrap(),
            vrf: "Vrf10".to_string(),
            protocol: 186,
            nexthops: vec![],
            encap: None,
            local_sid: None,
            nhg_id: None,
            dst_label: None,
        };
        assert_eq!(msg.table_key(), "Vrf10:192.168.6.0/24");

        let default_vrf = RouteMessage { vrf: String::new(), ..msg };
        assert_eq!(default_vrf.table_key(), "192.168.6.0/24");
    }
}
