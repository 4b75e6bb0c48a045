//! The route synchronizer proper.

use crate::messages::{
    NexthopGroupMessage, RouteEncap, RouteMessage, RouteOp, RouteNextHopInfo,
};
use crate::protocol::ProtocolDb;
use crate::warm_restart::WarmRestartHelper;
use fib_orch_common::{FieldValue, ProducerTable};
use fib_types::IpPrefix;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Interfaces the pipeline must never install routes over.
const SKIP_INSTALL_INTERFACES: [&str; 3] = ["eth0", "docker0", "lo"];

/// Interface-index to name resolution (the kernel link cache).
pub trait LinkResolver: Send {
    fn ifname(&self, ifindex: u32) -> Option<String>;
}

/// Static link table for tests and simulation.
#[derive(Default)]
pub struct StaticLinkResolver {
    links: HashMap<u32, String>,
}

impl StaticLinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&mut self, ifindex: u32, name: impl Into<String>) {
        self.links.insert(ifindex, name.into());
    }
}

impl LinkResolver for StaticLinkResolver {
    fn ifname(&self, ifindex: u32) -> Option<String> {
        self.links.get(&ifindex).cloned()
    }
}

/// Upstream reply channel towards the routing daemon.
pub trait FpmInterface: Send {
    /// Send the route back with the offload flag set.
    fn send_offload_reply(&mut self, vrf: &str, prefix: &IpPrefix) -> bool;
}

/// Producer tables the synchronizer publishes into.
pub struct RouteSyncTables {
    pub route: Box<dyn ProducerTable>,
    pub label_route: Box<dyn ProducerTable>,
    pub srv6_sid_list: Box<dyn ProducerTable>,
    pub srv6_my_sid: Box<dyn ProducerTable>,
    pub nexthop_group: Box<dyn ProducerTable>,
}

/// Kernel nexthop-group bookkeeping.
struct NextHopGroup {
    group: Vec<(u32, u8)>,
    nexthop: String,
    intf: String,
    ref_count: u32,
}

pub struct RouteSync {
    tables: RouteSyncTables,
    link: Box<dyn LinkResolver>,
    protocol_db: ProtocolDb,
    warm_restart: Box<dyn WarmRestartHelper>,
    fpm: Option<Box<dyn FpmInterface>>,
    suppression_enabled: bool,
    /// Routes awaiting offload confirmation, key -> (vrf, prefix).
    unacked: HashMap<String, (String, IpPrefix)>,
    /// Kernel nexthop groups by id.
    nh_groups: HashMap<u32, NextHopGroup>,
    /// Routes referencing a kernel nexthop group.
    nh_routes: HashMap<String, u32>,
}

impl RouteSync {
    pub fn new(
        tables: RouteSyncTables,
        link: Box<dyn LinkResolver>,
        protocol_db: ProtocolDb,
        warm_restart: Box<dyn WarmRestartHelper>,
    ) -> Self {
        Self {
            tables,
            link,
            protocol_db,
            warm_restart,
            fpm: None,
            suppression_enabled: false,
            unacked: HashMap::new(),
            nh_groups: HashMap::new(),
            nh_routes: HashMap::new(),
        }
    }

    /// Startup hook: arm the warm-restart reconciliation timer when a warm
    /// start is in progress.
    pub fn on_startup(&mut self) {
        if self.warm_restart.enabled() {
            info!("warm restart enabled, starting reconciliation timer");
            self.warm_restart.start_timer();
        }
    }

    pub fn on_fpm_connected(&mut self, fpm: Box<dyn FpmInterface>) {
        self.fpm = Some(fpm);
    }

    pub fn on_fpm_disconnected(&mut self) {
        self.fpm = None;
    }

    pub fn set_suppression_enabled(&mut self, enabled: bool) {
        info!(enabled, "route suppression");
        self.suppression_enabled = enabled;
        if !enabled {
            self.unacked.clear();
        }
    }

    pub fn is_suppression_enabled(&self) -> bool {
        self.suppression_enabled
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    /// Classify and publish one parsed route message.
    ///
    /// First match wins: local SID, SRv6 steer route, EVPN overlay,
    /// standard/label route.
    pub fn on_route_msg(&mut self, msg: &RouteMessage) {
        if msg.local_sid.is_some() {
            if msg.prefix.is_v4() || !msg.prefix.is_full_length() {
                warn!(prefix = %msg.prefix, "local SID must be a host-length IPv6 prefix");
                return;
            }
            self.on_local_sid_msg(msg);
            return;
        }

        if matches!(msg.encap, Some(RouteEncap::Srv6Steer { .. })) {
            self.on_srv6_steer_route_msg(msg);
            return;
        }

        if matches!(msg.encap, Some(RouteEncap::EvpnVxlan { .. })) {
            self.on_evpn_route_msg(msg);
            return;
        }

        if msg.dst_label.is_some() {
            self.on_label_route_msg(msg);
            return;
        }

        self.on_standard_route_msg(msg);
    }

    fn on_label_route_msg(&mut self, msg: &RouteMessage) {
        let Some(label) = msg.dst_label else { return };
        let key = label.to_string();

        match msg.op {
            RouteOp::Del => {
                self.tables.label_route.del(&key);
            }
            RouteOp::Add => {
                let Some((gateways, ifnames, weights, mpls)) =
                    self.collect_nexthops(&msg.nexthops)
                else {
                    return;
                };
                let mut fvs = vec![
                    ("nexthop".to_string(), gateways),
                    ("ifname".to_string(), ifnames),
                ];
                if !weights.is_empty() {
                    fvs.push(("weight".to_string(), weights));
                }
                if !mpls.is_empty() {
                    fvs.push(("mpls_nh".to_string(), mpls));
                }
                fvs.push((
                    "protocol".to_string(),
                    self.protocol_db.resolve(msg.protocol),
                ));
                debug!(%key, "publishing label route");
                self.tables.label_route.set(&key, fvs);
            }
        }
    }

    fn on_local_sid_msg(&mut self, msg: &RouteMessage) {
        let Some(sid) = &msg.local_sid else { return };
        let key = format!(
            "{}:{}:{}:{}:{}",
            sid.block_len,
            sid.node_len,
            sid.func_len,
            sid.arg_len,
            msg.prefix.addr()
        );

        match msg.op {
            RouteOp::Add => {
                let mut fvs: Vec<FieldValue> = vec![
                    ("action".to_string(), sid.action.as_str().to_string()),
                    ("vrf".to_string(), sid.vrf.clone()),
                ];
                if !sid.adj.is_empty() {
                    fvs.push(("adj".to_string(), sid.adj.clone()));
                }
                if !sid.ifname.is_empty() {
                    fvs.push(("ifname".to_string(), sid.ifname.clone()));
                }
                debug!(%key, action = sid.action.as_str(), "publishing local SID");
                self.tables.srv6_my_sid.set(&key, fvs);
            }
            RouteOp::Del => {
                self.tables.srv6_my_sid.del(&key);
            }
        }
    }

    fn on_srv6_steer_route_msg(&mut self, msg: &RouteMessage) {
        let Some(RouteEncap::Srv6Steer { vpn_sid, src_addr }) = &msg.encap else {
            return;
        };
        let key = msg.table_key();

        match msg.op {
            RouteOp::Add => {
                self.tables
                    .srv6_sid_list
                    .set(&key, vec![("path".to_string(), vpn_sid.to_string())]);
                let fvs = vec![
                    ("segment".to_string(), key.clone()),
                    ("seg_src".to_string(), src_addr.to_string()),
                    (
                        "protocol".to_string(),
                        self.protocol_db.resolve(msg.protocol),
                    ),
                ];
                debug!(%key, %vpn_sid, "publishing SRv6 steer route");
                self.tables.route.set(&key, fvs);
                self.note_route_installed(&key, msg);
            }
            RouteOp::Del => {
                self.tables.route.del(&key);
                self.tables.srv6_sid_list.del(&key);
                self.forget_route(&key);
            }
        }
    }

    fn on_evpn_route_msg(&mut self, msg: &RouteMessage) {
        let Some(RouteEncap::EvpnVxlan { nexthops }) = &msg.encap else {
            return;
        };
        let key = msg.table_key();

        match msg.op {
            RouteOp::Add => {
                if nexthops.is_empty() {
                    warn!(%key, "EVPN route without next hops");
                    return;
                }
                let join = |f: &dyn Fn(&crate::messages::EvpnNextHop) -> String| {
                    nexthops.iter().map(|nh| f(nh)).collect::<Vec<_>>().join(",")
                };
                let fvs = vec![
                    ("nexthop".to_string(), join(&|nh| nh.gateway.to_string())),
                    ("vni_label".to_string(), join(&|nh| nh.vni.to_string())),
                    (
                        "router_mac".to_string(),
                        join(&|nh| nh.router_mac.to_string()),
                    ),
                    ("ifname".to_string(), join(&|nh| nh.ifname.clone())),
                    (
                        "protocol".to_string(),
                        self.protocol_db.resolve(msg.protocol),
                    ),
                ];
                debug!(%key, "publishing EVPN overlay route");
                self.tables.route.set(&key, fvs);
                self.note_route_installed(&key, msg);
            }
            RouteOp::Del => {
                self.tables.route.del(&key);
                self.forget_route(&key);
            }
        }
    }

    fn on_standard_route_msg(&mut self, msg: &RouteMessage) {
        let key = msg.table_key();

        if msg.op == RouteOp::Del {
            self.tables.route.del(&key);
            self.forget_route(&key);
            return;
        }

        // Routes referencing a kernel nexthop-group object carry only the
        // group id; resolve it against the group map.
        if let Some(nhg_id) = msg.nhg_id {
            self.publish_group_route(&key, nhg_id, msg);
            return;
        }

        let Some((gateways, ifnames, weights, mpls)) = self.collect_nexthops(&msg.nexthops) else {
            return;
        };

        let mut fvs = vec![
            ("nexthop".to_string(), gateways),
            ("ifname".to_string(), ifnames),
        ];
        if !weights.is_empty() {
            fvs.push(("weight".to_string(), weights));
        }
        if !mpls.is_empty() {
            fvs.push(("mpls_nh".to_string(), mpls));
        }
        fvs.push((
            "protocol".to_string(),
            self.protocol_db.resolve(msg.protocol),
        ));

        debug!(%key, "publishing route");
        self.tables.route.set(&key, fvs);
        self.note_route_installed(&key, msg);
    }

    /// Resolve gateway/ifname/weight/label lists for a route. Returns `None`
    /// when the route must not be installed.
    fn collect_nexthops(
        &self,
        nexthops: &[RouteNextHopInfo],
    ) -> Option<(String, String, String, String)> {
        let mut gateways = Vec::new();
        let mut ifnames = Vec::new();
        let mut weights = Vec::new();
        let mut mpls = Vec::new();
        let mut any_weight = false;
        let mut any_label = false;

        for nh in nexthops {
            let ifname = match self.link.ifname(nh.ifindex) {
                Some(name) => name,
                None => {
                    warn!(ifindex = nh.ifindex, "unknown interface, skipping route");
                    return None;
                }
            };
            if SKIP_INSTALL_INTERFACES.contains(&ifname.as_str()) {
                debug!(%ifname, "management interface, skipping route");
                return None;
            }

            gateways.push(
                nh.gateway
                    .map(|gw| gw.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string()),
            );
            ifnames.push(ifname);
            if nh.weight > 0 {
                any_weight = true;
            }
            weights.push(nh.weight.to_string());
            match &nh.labels {
                Some(labels) => {
                    any_label = true;
                    mpls.push(labels.clone());
                }
                None => mpls.push("na".to_string()),
            }
        }

        Some((
            gateways.join(","),
            ifnames.join(","),
            if any_weight { weights.join(",") } else { String::new() },
            if any_label { mpls.join(",") } else { String::new() },
        ))
    }

    fn publish_group_route(&mut self, key: &str, nhg_id: u32, msg: &RouteMessage) {
        let Some(group) = self.nh_groups.get_mut(&nhg_id) else {
            error!(%key, nhg_id, "route references unknown nexthop group");
            return;
        };

        let mut fvs = Vec::new();
        if group.group.is_empty() {
            // Single-nexthop object: inline the nexthop instead of a group
            // reference.
            fvs.push(("nexthop".to_string(), group.nexthop.clone()));
            fvs.push(("ifname".to_string(), group.intf.clone()));
        } else {
            fvs.push(("nexthop_group".to_string(), nhg_id.to_string()));
            if self.nh_routes.get(key) != Some(&nhg_id) {
                group.ref_count += 1;
            }
        }
        fvs.push((
            "protocol".to_string(),
            self.protocol_db.resolve(msg.protocol),
        ));

        if let Some(previous) = self.nh_routes.insert(key.to_string(), nhg_id) {
            if previous != nhg_id {
                if let Some(old) = self.nh_groups.get_mut(&previous) {
                    old.ref_count = old.ref_count.saturating_sub(1);
                }
            }
        }

        debug!(%key, nhg_id, "publishing group route");
        self.tables.route.set(key, fvs);
        self.note_route_installed(key, msg);
    }

    /// Handle a kernel nexthop-group message.
    pub fn on_nexthop_group_msg(&mut self, msg: &NexthopGroupMessage) {
        match msg.op {
            RouteOp::Add => {
                let entry = if let Some((gateway, ifindex)) = &msg.nexthop {
                    let Some(intf) = self.link.ifname(*ifindex) else {
                        warn!(id = msg.id, ifindex, "unknown interface for nexthop object");
                        return;
                    };
                    NextHopGroup {
                        group: vec![],
                        nexthop: gateway.to_string(),
                        intf,
                        ref_count: 0,
                    }
                } else {
                    NextHopGroup {
                        group: msg.group.clone(),
                        nexthop: String::new(),
                        intf: String::new(),
                        ref_count: 0,
                    }
                };

                let ref_count = self
                    .nh_groups
                    .get(&msg.id)
                    .map(|g| g.ref_count)
                    .unwrap_or(0);
                self.nh_groups.insert(
                    msg.id,
                    NextHopGroup {
                        ref_count,
                        ..entry
                    },
                );
                self.update_next_hop_group_db(msg.id);
            }
            RouteOp::Del => {
                self.nh_groups.remove(&msg.id);
                self.tables.nexthop_group.del(&msg.id.to_string());
            }
        }
    }

    /// Publish (or republish) the table record for a group object.
    fn update_next_hop_group_db(&mut self, id: u32) {
        let Some((nexthops, ifnames, weights)) = self.next_hop_group_fields(id) else {
            return;
        };

        let mut fvs = vec![
            ("nexthop".to_string(), nexthops),
            ("ifname".to_string(), ifnames),
        ];
        if !weights.is_empty() {
            fvs.push(("weight".to_string(), weights));
        }
        self.tables.nexthop_group.set(&id.to_string(), fvs);
    }

    /// Resolve a group's member ids into parallel nexthop/ifname/weight
    /// lists. Single-nexthop objects are not published as groups.
    fn next_hop_group_fields(&self, id: u32) -> Option<(String, String, String)> {
        let group = self.nh_groups.get(&id)?;
        if group.group.is_empty() {
            return None;
        }

        let mut gateways = Vec::new();
        let mut ifnames = Vec::new();
        let mut weights = Vec::new();
        let mut any_weight = false;

        for (member_id, weight) in &group.group {
            let member = match self.nh_groups.get(member_id) {
                Some(m) if m.group.is_empty() => m,
                _ => {
                    warn!(id, member_id, "group member not resolvable yet");
                    return None;
                }
            };
            gateways.push(member.nexthop.clone());
            ifnames.push(member.intf.clone());
            if *weight > 0 {
                any_weight = true;
            }
            weights.push(weight.to_string());
        }

        Some((
            gateways.join(","),
            ifnames.join(","),
            if any_weight { weights.join(",") } else { String::new() },
        ))
    }

    fn note_route_installed(&mut self, key: &str, msg: &RouteMessage) {
        if self.suppression_enabled {
            self.unacked
                .insert(key.to_string(), (msg.vrf.clone(), msg.prefix));
        }
    }

    fn forget_route(&mut self, key: &str) {
        self.unacked.remove(key);
        if let Some(nhg_id) = self.nh_routes.remove(key) {
            if let Some(group) = self.nh_groups.get_mut(&nhg_id) {
                group.ref_count = group.ref_count.saturating_sub(1);
            }
        }
    }

    /// Downstream confirmation for a published route. A success reply for a
    /// route still awaiting acknowledgement triggers the upstream offload
    /// reply.
    pub fn on_route_response(&mut self, key: &str, fvs: &[FieldValue]) {
        let success = fvs
            .iter()
            .find(|(f, _)| f == "err_str")
            .map(|(_, v)| v == "SWSS_RC_SUCCESS")
            .unwrap_or(false);

        if !success {
            warn!(%key, "route programming failed downstream");
            return;
        }

        let Some((vrf, prefix)) = self.unacked.remove(key) else {
            return;
        };
        self.warm_restart.report_offloaded(key);
        if let Some(fpm) = self.fpm.as_mut() {
            if !fpm.send_offload_reply(&vrf, &prefix) {
                error!(%key, "failed to send offload reply");
            }
        }
    }

    /// Warm-restart end: replay the offload flag for every previously
    /// programmed route.
    pub fn on_warm_start_end(&mut self) {
        if !self.warm_restart.enabled() {
            return;
        }

        let routes = self.warm_restart.restore_routes();
        info!(count = routes.len(), "replaying offload flags after warm restart");
        let keys: Vec<String> = routes.into_iter().map(|(key, _)| key).collect();
        self.mark_routes_offloaded(&keys);
    }

    /// Send offload replies for the given route-table keys.
    pub fn mark_routes_offloaded(&mut self, keys: &[String]) {
        for key in keys {
            let Some((vrf, prefix)) = parse_route_key(key) else {
                warn!(%key, "not a route key, skipping offload replay");
                continue;
            };
            self.warm_restart.report_offloaded(key);
            if let Some(fpm) = self.fpm.as_mut() {
                if !fpm.send_offload_reply(&vrf, &prefix) {
                    error!(%key, "failed to send offload reply");
                }
            }
        }
    }
}

/// Split a `[vrf:]prefix` table key. IPv6 prefixes contain colons, so try
/// the whole key as a prefix before splitting off a VRF name.
pub fn parse_route_key(key: &str) -> Option<(String, IpPrefix)> {
    if let Ok(prefix) = key.parse::<IpPrefix>() {
        return Some((String::new(), prefix));
    }
    let (vrf, rest) = key.split_once(':')?;
    let prefix = rest.parse::<IpPrefix>().ok()?;
    Some((vrf.to_string(), prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{EvpnNextHop, LocalSidAction, LocalSidInfo};
    use crate::warm_restart::DisabledWarmRestart;
    use fib_orch_common::{fvs, MemTable};
    use std::sync::{Arc, Mutex};

    type SharedTable = Arc<Mutex<MemTable>>;

    struct Harness {
        sync: RouteSync,
        route: SharedTable,
        label_route: SharedTable,
        sid_list: SharedTable,
        my_sid: SharedTable,
        nexthop_group: SharedTable,
        replies: Arc<Mutex<Vec<(String, String)>>>,
    }

    struct TestFpm {
        replies: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FpmInterface for TestFpm {
        fn send_offload_reply(&mut self, vrf: &str, prefix: &IpPrefix) -> bool {
            self.replies
                .lock()
                .unwrap()
                .push((vrf.to_string(), prefix.to_string()));
            true
        }
    }

    struct TestWarmRestart {
        routes: Vec<(String, Vec<FieldValue>)>,
        offloaded: Arc<Mutex<Vec<String>>>,
    }

    impl WarmRestartHelper for TestWarmRestart {
        fn enabled(&self) -> bool {
            true
        }
        fn start_timer(&mut self) {}
        fn restore_routes(&mut self) -> Vec<(String, Vec<FieldValue>)> {
            self.routes.clone()
        }
        fn report_offloaded(&mut self, key: &str) {
            self.offloaded.lock().unwrap().push(key.to_string());
        }
    }

    fn shared(name: &str) -> SharedTable {
        Arc::new(Mutex::new(MemTable::new(name)))
    }

    fn harness_with_warm(warm: Box<dyn WarmRestartHelper>) -> Harness {
        let route = shared("ROUTE");
        let label_route = shared("LABEL_ROUTE");
        let sid_list = shared("SRV6_SID_LIST");
        let my_sid = shared("SRV6_MY_SID");
        let nexthop_group = shared("NEXTHOP_GROUP");

        let mut link = StaticLinkResolver::new();
        link.add_link(10, "Ethernet0");
        link.add_link(11, "Ethernet4");
        link.add_link(99, "docker0");

        let tables = RouteSyncTables {
            route: Box::new(Arc::clone(&route)),
            label_route: Box::new(Arc::clone(&label_route)),
            srv6_sid_list: Box::new(Arc::clone(&sid_list)),
            srv6_my_sid: Box::new(Arc::clone(&my_sid)),
            nexthop_group: Box::new(Arc::clone(&nexthop_group)),
        };

        let mut sync = RouteSync::new(tables, Box::new(link), ProtocolDb::builtin(), warm);
        let replies = Arc::new(Mutex::new(Vec::new()));
        sync.on_fpm_connected(Box::new(TestFpm {
            replies: Arc::clone(&replies),
        }));

        Harness {
            sync,
            route,
            label_route,
            sid_list,
            my_sid,
            nexthop_group,
            replies,
        }
    }

    fn harness() -> Harness {
        harness_with_warm(Box::new(DisabledWarmRestart))
    }

    fn route_msg(op: RouteOp, prefix: &str, vrf: &str) -> RouteMessage {
        RouteMessage {
            op,
            prefix: prefix.parse().unwrap(),
            vrf: vrf.to_string(),
            protocol: 186,
            nexthops: vec![],
            encap: None,
            local_sid: None,
            nhg_id: None,
            dst_label: None,
        }
    }

    fn nh(gateway: &str, ifindex: u32, weight: u8) -> RouteNextHopInfo {
        RouteNextHopInfo {
            gateway: Some(gateway.parse().unwrap()),
            ifindex,
            weight,
            labels: None,
        }
    }

    fn field(table: &SharedTable, key: &str, field: &str) -> Option<String> {
        table
            .lock()
            .unwrap()
            .get_field(key, field)
            .map(str::to_string)
    }

    #[test]
    fn test_srv6_vpn_route_emits_sid_list_and_route() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "192.168.6.0/24", "Vrf10");
        msg.encap = Some(RouteEncap::Srv6Steer {
            vpn_sid: "fc00:0:2:1::".parse().unwrap(),
            src_addr: "fc00:0:1:1::1".parse().unwrap(),
        });

        h.sync.on_route_msg(&msg);

        let key = "Vrf10:192.168.6.0/24";
        assert_eq!(field(&h.sid_list, key, "path").as_deref(), Some("fc00:0:2:1::"));
        assert_eq!(field(&h.route, key, "segment").as_deref(), Some(key));
        assert_eq!(
            field(&h.route, key, "seg_src").as_deref(),
            Some("fc00:0:1:1::1")
        );

        msg.op = RouteOp::Del;
        h.sync.on_route_msg(&msg);
        assert!(h.route.lock().unwrap().is_empty());
        assert!(h.sid_list.lock().unwrap().is_empty());
    }

    #[test]
    fn test_local_sid_end_dt4() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "fc00:0:1:1::/128", "");
        msg.local_sid = Some(LocalSidInfo {
            block_len: 32,
            node_len: 16,
            func_len: 16,
            arg_len: 0,
            action: LocalSidAction::EndDt4,
            vrf: "Vrf10".to_string(),
            adj: String::new(),
            ifname: String::new(),
        });

        h.sync.on_route_msg(&msg);

        let key = "32:16:16:0:fc00:0:1:1::";
        assert_eq!(field(&h.my_sid, key, "action").as_deref(), Some("end.dt4"));
        assert_eq!(field(&h.my_sid, key, "vrf").as_deref(), Some("Vrf10"));
        assert!(field(&h.my_sid, key, "adj").is_none());

        msg.op = RouteOp::Del;
        h.sync.on_route_msg(&msg);
        assert!(h.my_sid.lock().unwrap().is_empty());
    }

    #[test]
    fn test_local_sid_requires_host_length_v6() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "fc00:0:1::/64", "");
        msg.local_sid = Some(LocalSidInfo {
            block_len: 32,
            node_len: 16,
            func_len: 16,
            arg_len: 0,
            action: LocalSidAction::End,
            vrf: String::new(),
            adj: String::new(),
            ifname: String::new(),
        });
        h.sync.on_route_msg(&msg);
        assert!(h.my_sid.lock().unwrap().is_empty());
    }

    #[test]
    fn test_standard_route_fields() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "10.1.0.0/16", "");
        msg.nexthops = vec![nh("10.0.0.1", 10, 2), nh("10.0.0.2", 11, 1)];

        h.sync.on_route_msg(&msg);

        let key = "10.1.0.0/16";
        assert_eq!(
            field(&h.route, key, "nexthop").as_deref(),
            Some("10.0.0.1,10.0.0.2")
        );
        assert_eq!(
            field(&h.route, key, "ifname").as_deref(),
            Some("Ethernet0,Ethernet4")
        );
        assert_eq!(field(&h.route, key, "weight").as_deref(), Some("2,1"));
        assert_eq!(field(&h.route, key, "protocol").as_deref(), Some("bgp"));
        assert!(field(&h.route, key, "mpls_nh").is_none());
    }

    #[test]
    fn test_labeled_route_emits_mpls_field() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "10.2.0.0/16", "");
        let mut labeled = nh("10.0.0.1", 10, 0);
        labeled.labels = Some("100/200".to_string());
        msg.nexthops = vec![labeled, nh("10.0.0.2", 11, 0)];

        h.sync.on_route_msg(&msg);

        let key = "10.2.0.0/16";
        assert_eq!(field(&h.route, key, "mpls_nh").as_deref(), Some("100/200,na"));
        assert!(field(&h.route, key, "weight").is_none());
    }

    #[test]
    fn test_label_route_goes_to_label_table() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "0.0.0.0/0", "");
        msg.dst_label = Some(10100);
        msg.nexthops = vec![nh("10.0.0.1", 10, 0)];

        h.sync.on_route_msg(&msg);
        assert!(h.route.lock().unwrap().is_empty());
        assert_eq!(
            field(&h.label_route, "10100", "nexthop").as_deref(),
            Some("10.0.0.1")
        );

        msg.op = RouteOp::Del;
        h.sync.on_route_msg(&msg);
        assert!(h.label_route.lock().unwrap().is_empty());
    }

    #[test]
    fn test_routes_over_management_interfaces_are_skipped() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "10.3.0.0/16", "");
        msg.nexthops = vec![nh("10.0.0.1", 99, 0)];
        h.sync.on_route_msg(&msg);
        assert!(h.route.lock().unwrap().is_empty());

        // Unknown ifindex likewise.
        let mut msg = route_msg(RouteOp::Add, "10.4.0.0/16", "");
        msg.nexthops = vec![nh("10.0.0.1", 42, 0)];
        h.sync.on_route_msg(&msg);
        assert!(h.route.lock().unwrap().is_empty());
    }

    #[test]
    fn test_evpn_route_fields() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "10.5.0.0/16", "Vrf10");
        msg.encap = Some(RouteEncap::EvpnVxlan {
            nexthops: vec![EvpnNextHop {
                gateway: "192.168.1.1".parse().unwrap(),
                vni: 1000,
                router_mac: "00:11:22:33:44:55".parse().unwrap(),
                ifname: "Vlan100".to_string(),
            }],
        });

        h.sync.on_route_msg(&msg);

        let key = "Vrf10:10.5.0.0/16";
        assert_eq!(field(&h.route, key, "nexthop").as_deref(), Some("192.168.1.1"));
        assert_eq!(field(&h.route, key, "vni_label").as_deref(), Some("1000"));
        assert_eq!(
            field(&h.route, key, "router_mac").as_deref(),
            Some("00:11:22:33:44:55")
        );
        assert_eq!(field(&h.route, key, "ifname").as_deref(), Some("Vlan100"));
    }

    #[test]
    fn test_nexthop_group_messages() {
        let mut h = harness();

        // Two single-nexthop objects, then a group over them.
        h.sync.on_nexthop_group_msg(&NexthopGroupMessage {
            op: RouteOp::Add,
            id: 1,
            group: vec![],
            nexthop: Some(("10.0.0.1".parse().unwrap(), 10)),
        });
        h.sync.on_nexthop_group_msg(&NexthopGroupMessage {
            op: RouteOp::Add,
            id: 2,
            group: vec![],
            nexthop: Some(("10.0.0.2".parse().unwrap(), 11)),
        });
        h.sync.on_nexthop_group_msg(&NexthopGroupMessage {
            op: RouteOp::Add,
            id: 100,
            group: vec![(1, 1), (2, 2)],
            nexthop: None,
        });

        // Single-nexthop objects are not published as groups.
        assert!(!h.nexthop_group.lock().unwrap().contains_key("1"));
        assert_eq!(
            field(&h.nexthop_group, "100", "nexthop").as_deref(),
            Some("10.0.0.1,10.0.0.2")
        );
        assert_eq!(
            field(&h.nexthop_group, "100", "ifname").as_deref(),
            Some("Ethernet0,Ethernet4")
        );
        assert_eq!(field(&h.nexthop_group, "100", "weight").as_deref(), Some("1,2"));

        // A route referencing the group carries only the group id.
        let mut msg = route_msg(RouteOp::Add, "10.6.0.0/16", "");
        msg.nhg_id = Some(100);
        h.sync.on_route_msg(&msg);
        assert_eq!(
            field(&h.route, "10.6.0.0/16", "nexthop_group").as_deref(),
            Some("100")
        );

        // A route referencing a single-nexthop object gets inline fields.
        let mut msg = route_msg(RouteOp::Add, "10.7.0.0/16", "");
        msg.nhg_id = Some(1);
        h.sync.on_route_msg(&msg);
        assert_eq!(
            field(&h.route, "10.7.0.0/16", "nexthop").as_deref(),
            Some("10.0.0.1")
        );
        assert!(field(&h.route, "10.7.0.0/16", "nexthop_group").is_none());

        h.sync.on_nexthop_group_msg(&NexthopGroupMessage {
            op: RouteOp::Del,
            id: 100,
            group: vec![],
            nexthop: None,
        });
        assert!(!h.nexthop_group.lock().unwrap().contains_key("100"));
    }

    #[test]
    fn test_suppression_and_offload_reply() {
        let mut h = harness();
        h.sync.set_suppression_enabled(true);

        let mut msg = route_msg(RouteOp::Add, "10.1.0.0/16", "Vrf10");
        msg.nexthops = vec![nh("10.0.0.1", 10, 0)];
        h.sync.on_route_msg(&msg);
        assert_eq!(h.sync.unacked_count(), 1);
        assert!(h.replies.lock().unwrap().is_empty());

        // Failure response leaves the route unacknowledged.
        h.sync.on_route_response(
            "Vrf10:10.1.0.0/16",
            &fvs(&[("err_str", "SWSS_RC_UNAVAIL")]),
        );
        assert_eq!(h.sync.unacked_count(), 1);

        // Success response triggers exactly one reply.
        h.sync.on_route_response(
            "Vrf10:10.1.0.0/16",
            &fvs(&[("err_str", "SWSS_RC_SUCCESS")]),
        );
        assert_eq!(h.sync.unacked_count(), 0);
        let replies = h.replies.lock().unwrap().clone();
        assert_eq!(replies, vec![("Vrf10".to_string(), "10.1.0.0/16".to_string())]);

        // A response for an unknown key is ignored.
        h.sync
            .on_route_response("10.9.0.0/16", &fvs(&[("err_str", "SWSS_RC_SUCCESS")]));
        assert_eq!(h.replies.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_tracking_without_suppression() {
        let mut h = harness();
        let mut msg = route_msg(RouteOp::Add, "10.1.0.0/16", "");
        msg.nexthops = vec![nh("10.0.0.1", 10, 0)];
        h.sync.on_route_msg(&msg);
        assert_eq!(h.sync.unacked_count(), 0);
    }

    #[test]
    fn test_warm_restart_replays_offload_flags() {
        let offloaded = Arc::new(Mutex::new(Vec::new()));
        let warm = TestWarmRestart {
            routes: vec![
                ("Vrf10:192.168.6.0/24".to_string(), vec![]),
                ("fc00:0:8::/48".to_string(), vec![]),
            ],
            offloaded: Arc::clone(&offloaded),
        };
        let mut h = harness_with_warm(Box::new(warm));

        h.sync.on_warm_start_end();

        let replies = h.replies.lock().unwrap().clone();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], ("Vrf10".to_string(), "192.168.6.0/24".to_string()));
        assert_eq!(replies[1], ("".to_string(), "fc00:0:8::/48".to_string()));
        assert_eq!(offloaded.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_route_key() {
        let (vrf, prefix) = parse_route_key("Vrf10:192.168.6.0/24").unwrap();
        assert_eq!(vrf, "Vrf10");
        assert_eq!(prefix.to_string(), "192.168.6.0/24");

        let (vrf, prefix) = parse_route_key("fc00:0:8::/48").unwrap();
        assert!(vrf.is_empty());
        assert_eq!(prefix.to_string(), "fc00:0:8::/48");

        assert!(parse_route_key("32:16:16:0:fc00::").is_none());
    }
}
