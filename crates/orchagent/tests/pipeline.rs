//! End-to-end pipeline tests: parsed routing-daemon messages flow through
//! the route synchronizer onto the bus tables, get pumped into the
//! orchestrator consumers, and end up as objects on the simulated ASIC.

use fib_asic::SimAsic;
use fib_orch_common::{KeyOpFieldsValues, MemTable};
use orchagent::VrfApi;
use fpmsyncd::messages::{LocalSidAction, LocalSidInfo, RouteEncap, RouteMessage, RouteOp};
use fpmsyncd::protocol::ProtocolDb;
use fpmsyncd::routesync::{RouteSync, RouteSyncTables, StaticLinkResolver};
use fpmsyncd::warm_restart::DisabledWarmRestart;
use orchagent::nhg::{NhgOrch, NhgOrchConfig, NhgServices, StaticRouteGroups};
use orchagent::srv6::{SharedSrv6, Srv6Orch, Srv6OrchConfig, Srv6Services};
use orchagent::{CrmCounters, InterfaceRegistry, NeighborRegistry, VrfRegistry};
use std::sync::{Arc, Mutex};

type SharedTable = Arc<Mutex<MemTable>>;

struct Pipeline {
    sync: RouteSync,
    sid_list_table: SharedTable,
    my_sid_table: SharedTable,
    nhg_table: SharedTable,
    asic: Arc<SimAsic>,
    neigh: Arc<NeighborRegistry>,
    vrfs: Arc<VrfRegistry>,
    srv6: SharedSrv6,
    nhg_orch: NhgOrch,
}

fn shared(name: &str) -> SharedTable {
    Arc::new(Mutex::new(MemTable::new(name)))
}

fn pipeline() -> Pipeline {
    let route_table = shared("ROUTE");
    let label_table = shared("LABEL_ROUTE");
    let sid_list_table = shared("SRV6_SID_LIST");
    let my_sid_table = shared("SRV6_MY_SID");
    let nhg_table = shared("NEXTHOP_GROUP");

    let mut link = StaticLinkResolver::new();
    link.add_link(10, "Ethernet0");
    link.add_link(11, "Ethernet4");

    let sync = RouteSync::new(
        RouteSyncTables {
            route: Box::new(Arc::clone(&route_table)),
            label_route: Box::new(Arc::clone(&label_table)),
            srv6_sid_list: Box::new(Arc::clone(&sid_list_table)),
            srv6_my_sid: Box::new(Arc::clone(&my_sid_table)),
            nexthop_group: Box::new(Arc::clone(&nhg_table)),
        },
        Box::new(link),
        ProtocolDb::builtin(),
        Box::new(DisabledWarmRestart),
    );

    let asic = Arc::new(SimAsic::new());
    let neigh = Arc::new(NeighborRegistry::new());
    let intfs = Arc::new(InterfaceRegistry::new());
    let vrfs = Arc::new(VrfRegistry::new(0x1));
    let crm = Arc::new(CrmCounters::new());
    let route_groups = Arc::new(StaticRouteGroups::new(0));

    let srv6_orch = Srv6Orch::new(
        Srv6OrchConfig {
            default_vr_id: 0x1,
            underlay_rif_id: 0x2,
        },
        Srv6Services {
            tunnel: asic.clone(),
            srv6: asic.clone(),
            next_hop: asic.clone(),
            neigh: neigh.clone(),
            vrfs: vrfs.clone(),
            crm: crm.clone(),
        },
    );
    let srv6 = SharedSrv6(Arc::new(Mutex::new(srv6_orch)));

    let nhg_orch = NhgOrch::new(
        NhgOrchConfig::default(),
        NhgServices {
            asic: asic.clone(),
            neigh: neigh.clone(),
            intfs,
            crm,
            srv6: Arc::new(srv6.clone()),
            route_groups,
        },
    );

    Pipeline {
        sync,
        sid_list_table,
        my_sid_table,
        nhg_table,
        asic,
        neigh,
        vrfs,
        srv6,
        nhg_orch,
    }
}

/// Move pending ops from a bus table into a consumer.
fn pump(table: &SharedTable, feed: impl FnOnce(Vec<KeyOpFieldsValues>)) {
    let ops = table.lock().unwrap().drain_ops();
    feed(ops);
}

#[test]
fn srv6_vpn_route_programs_sid_list() {
    let mut p = pipeline();

    // BGP hands down an IPv4 VPN prefix steered over SRv6.
    p.sync.on_route_msg(&RouteMessage {
        op: RouteOp::Add,
        prefix: "192.168.6.0/24".parse().unwrap(),
        vrf: "Vrf10".to_string(),
        protocol: 186,
        nexthops: vec![],
        encap: Some(RouteEncap::Srv6Steer {
            vpn_sid: "fc00:0:2:1::".parse().unwrap(),
            src_addr: "fc00:0:1:1::1".parse().unwrap(),
        }),
        local_sid: None,
        nhg_id: None,
        dst_label: None,
    });

    assert_eq!(
        p.sid_list_table
            .lock()
            .unwrap()
            .get_field("Vrf10:192.168.6.0/24", "path"),
        Some("fc00:0:2:1::")
    );

    {
        let mut srv6 = p.srv6.0.lock().unwrap();
        pump(&p.sid_list_table, |ops| {
            srv6.sid_list_consumer_mut().add_to_sync(ops)
        });
        srv6.drain_tasks();
        assert_eq!(srv6.sid_list_count(), 1);
    }
    assert_eq!(p.asic.live_sid_list_count(), 1);
}

#[test]
fn local_sid_end_dt4_installs_my_sid() {
    let mut p = pipeline();
    p.vrfs.add_vrf("Vrf10", 0x2000);

    p.sync.on_route_msg(&RouteMessage {
        op: RouteOp::Add,
        prefix: "fc00:0:1:1::/128".parse().unwrap(),
        vrf: String::new(),
        protocol: 186,
        nexthops: vec![],
        encap: None,
        local_sid: Some(LocalSidInfo {
            block_len: 32,
            node_len: 16,
            func_len: 16,
            arg_len: 0,
            action: LocalSidAction::EndDt4,
            vrf: "Vrf10".to_string(),
            adj: String::new(),
            ifname: String::new(),
        }),
        nhg_id: None,
        dst_label: None,
    });

    assert_eq!(
        p.my_sid_table
            .lock()
            .unwrap()
            .get_field("32:16:16:0:fc00:0:1:1::", "action"),
        Some("end.dt4")
    );

    {
        let mut srv6 = p.srv6.0.lock().unwrap();
        pump(&p.my_sid_table, |ops| {
            srv6.my_sid_consumer_mut().add_to_sync(ops)
        });
        srv6.drain_tasks();
        assert!(srv6.my_sid_installed("32:16:16:0:fc00:0:1:1::"));
    }
    assert_eq!(p.asic.my_sid_count(), 1);
    assert_eq!(p.vrfs.vrf_ref_count("Vrf10"), 1);
}

#[test]
fn kernel_group_route_becomes_asic_group() {
    let mut p = pipeline();
    p.neigh.add_neighbor("10.0.0.1".parse().unwrap(), "Ethernet0");
    p.neigh.add_neighbor("10.0.0.2".parse().unwrap(), "Ethernet4");
    p.neigh.drain_updates();

    // Kernel nexthop objects and the group over them.
    use fpmsyncd::messages::NexthopGroupMessage;
    p.sync.on_nexthop_group_msg(&NexthopGroupMessage {
        op: RouteOp::Add,
        id: 1,
        group: vec![],
        nexthop: Some(("10.0.0.1".parse().unwrap(), 10)),
    });
    p.sync.on_nexthop_group_msg(&NexthopGroupMessage {
        op: RouteOp::Add,
        id: 2,
        group: vec![],
        nexthop: Some(("10.0.0.2".parse().unwrap(), 11)),
    });
    p.sync.on_nexthop_group_msg(&NexthopGroupMessage {
        op: RouteOp::Add,
        id: 100,
        group: vec![(1, 1), (2, 1)],
        nexthop: None,
    });

    pump(&p.nhg_table, |ops| {
        p.nhg_orch.consumer_mut().add_to_sync(ops)
    });
    p.nhg_orch.drain_tasks();

    let entry = p.nhg_orch.group("100").unwrap();
    assert!(entry.nhg.is_synced());
    assert_eq!(entry.nhg.synced_member_count(), 2);
    assert_eq!(p.asic.live_group_count(), 1);
    assert_eq!(p.asic.live_member_count(), 2);
}

#[test]
fn srv6_group_members_reach_asic_through_shared_handle() {
    let mut p = pipeline();

    p.nhg_orch
        .consumer_mut()
        .add_to_sync(vec![KeyOpFieldsValues::set(
            "sg1",
            fib_orch_common::fvs(&[
                ("nexthop", "2001:db8::7"),
                ("seg_src", "fc00:0:1:1::1"),
            ]),
        )]);
    p.nhg_orch.drain_tasks();

    let entry = p.nhg_orch.group("sg1").unwrap();
    assert!(entry.nhg.is_synced());
    // Single-member SRv6 group aliases to the SRv6 nexthop object; the P2P
    // tunnel towards the endpoint exists on the ASIC.
    assert_eq!(p.asic.live_group_count(), 0);
    assert_eq!(p.asic.live_tunnel_count(), 1);
    assert_eq!(p.asic.live_next_hop_count(), 1);
}
