//! SRv6 orchestrator.
//!
//! Owns SRv6 tunnels (source-only and P2P), SID lists, SRv6 next-hops,
//! MY_SID endpoint entries, VPN tunnel-map entries, PIC contexts and the
//! prefix-aggregation id space. Consumes the `SRV6_SID_LIST`,
//! `SRV6_MY_SID` and `PIC_CONTEXT` bus tables.

use crate::crm::{CrmApi, CrmResourceType};
use crate::neigh::{NeighborApi, NeighborObserver, NeighborUpdate};
use crate::route::{NextHopGroupKey, NextHopKey};
use crate::vrf::VrfApi;
use async_trait::async_trait;
use fib_asic::api::{
    MySidRequest, NextHopApi, Srv6Api, Srv6NextHopRequest, TunnelApi, TunnelMapEntryRequest,
    TunnelRequest,
};
use fib_asic::{RawObjectId, NULL_OBJECT_ID};
use fib_orch_common::{
    Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, Orch, TaskError, TaskResult,
};
use fib_types::{IpAddress, Ipv6Address};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use super::types::{
    behavior_action, behavior_flavor, behavior_requires_next_hop, behavior_requires_vrf,
    endpoint_behavior, sid_list_type, AggIdEntry, MySidEntry, PendingMySid, PicContextEntry,
    SidListEntry, Srv6P2pTunnelEntry, Srv6TunnelEntry, TunnelMapEntryKey, TunnelMapEntryValue,
};
use super::Srv6NexthopApi;

const SID_LIST_DELIMITER: char = ',';
const ADJ_DELIMITER: char = ',';

/// Collaborators the orchestrator programs against.
pub struct Srv6Services {
    pub tunnel: Arc<dyn TunnelApi>,
    pub srv6: Arc<dyn Srv6Api>,
    pub next_hop: Arc<dyn NextHopApi>,
    pub neigh: Arc<dyn NeighborApi>,
    pub vrfs: Arc<dyn VrfApi>,
    pub crm: Arc<dyn CrmApi>,
}

#[derive(Debug, Clone, Default)]
pub struct Srv6OrchConfig {
    /// Virtual router MY_SID entries are installed under.
    pub default_vr_id: RawObjectId,
    /// Underlay interface for SRv6 tunnels.
    pub underlay_rif_id: RawObjectId,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Srv6OrchStats {
    pub sid_lists_created: u64,
    pub sid_lists_removed: u64,
    pub my_sids_created: u64,
    pub my_sids_removed: u64,
    pub nexthops_created: u64,
    pub nexthops_removed: u64,
    pub tunnels_created: u64,
    pub vpn_entries_created: u64,
    pub pic_contexts_created: u64,
}

enum MySidOutcome {
    Installed,
    /// Adjacency not resolved yet; the record was parked.
    Parked,
}

pub struct Srv6Orch {
    config: Srv6OrchConfig,
    services: Srv6Services,
    sid_list_consumer: Consumer,
    my_sid_consumer: Consumer,
    pic_context_consumer: Consumer,
    /// Source tunnels keyed by encap source.
    tunnels: HashMap<String, Srv6TunnelEntry>,
    /// P2P tunnels keyed by endpoint.
    p2p_tunnels: HashMap<String, Srv6P2pTunnelEntry>,
    sid_lists: HashMap<String, SidListEntry>,
    nexthops: HashMap<NextHopKey, RawObjectId>,
    my_sids: HashMap<String, MySidEntry>,
    pending_my_sids: HashMap<NextHopKey, BTreeSet<PendingMySid>>,
    tunnel_map_entries: HashMap<TunnelMapEntryKey, TunnelMapEntryValue>,
    agg_ids_by_group: HashMap<NextHopGroupKey, AggIdEntry>,
    agg_ids_by_context: HashMap<String, AggIdEntry>,
    agg_id_used: BTreeSet<u32>,
    next_agg_id: u32,
    pic_contexts: HashMap<String, PicContextEntry>,
    stats: Srv6OrchStats,
}

impl Srv6Orch {
    pub const SID_LIST_TABLE: &'static str = "SRV6_SID_LIST";
    pub const MY_SID_TABLE: &'static str = "SRV6_MY_SID";
    pub const PIC_CONTEXT_TABLE: &'static str = "PIC_CONTEXT";

    pub fn new(config: Srv6OrchConfig, services: Srv6Services) -> Self {
        Self {
            config,
            services,
            sid_list_consumer: Consumer::new(
                ConsumerConfig::new(Self::SID_LIST_TABLE).with_priority(25),
            ),
            my_sid_consumer: Consumer::new(
                ConsumerConfig::new(Self::MY_SID_TABLE).with_priority(25),
            ),
            pic_context_consumer: Consumer::new(
                ConsumerConfig::new(Self::PIC_CONTEXT_TABLE).with_priority(25),
            ),
            tunnels: HashMap::new(),
            p2p_tunnels: HashMap::new(),
            sid_lists: HashMap::new(),
            nexthops: HashMap::new(),
            my_sids: HashMap::new(),
            pending_my_sids: HashMap::new(),
            tunnel_map_entries: HashMap::new(),
            agg_ids_by_group: HashMap::new(),
            agg_ids_by_context: HashMap::new(),
            agg_id_used: BTreeSet::new(),
            next_agg_id: 1,
            pic_contexts: HashMap::new(),
            stats: Srv6OrchStats::default(),
        }
    }

    pub fn stats(&self) -> &Srv6OrchStats {
        &self.stats
    }

    pub fn sid_list_consumer_mut(&mut self) -> &mut Consumer {
        &mut self.sid_list_consumer
    }

    pub fn my_sid_consumer_mut(&mut self) -> &mut Consumer {
        &mut self.my_sid_consumer
    }

    pub fn pic_context_consumer_mut(&mut self) -> &mut Consumer {
        &mut self.pic_context_consumer
    }

    pub fn sid_list_count(&self) -> usize {
        self.sid_lists.len()
    }

    pub fn my_sid_count(&self) -> usize {
        self.my_sids.len()
    }

    pub fn pending_my_sid_count(&self) -> usize {
        self.pending_my_sids.values().map(|s| s.len()).sum()
    }

    pub fn my_sid_installed(&self, key_string: &str) -> bool {
        self.my_sids.contains_key(key_string)
    }

    pub fn srv6_nexthop_exists(&self, nh: &NextHopKey) -> bool {
        self.nexthops.contains_key(nh)
    }

    pub fn context_id_exists(&self, context_id: &str) -> bool {
        self.pic_contexts.contains_key(context_id)
    }

    pub fn increase_pic_context_ref(&mut self, context_id: &str) {
        match self.pic_contexts.get_mut(context_id) {
            Some(entry) => entry.ref_count += 1,
            None => error!(%context_id, "refcount increase for unknown pic context"),
        }
    }

    pub fn decrease_pic_context_ref(&mut self, context_id: &str) {
        match self.pic_contexts.get_mut(context_id) {
            Some(entry) => entry.ref_count = entry.ref_count.saturating_sub(1),
            None => error!(%context_id, "refcount decrease for unknown pic context"),
        }
    }

    /// Process everything pending on the three SRv6 consumers.
    pub fn drain_tasks(&mut self) {
        for entry in self.sid_list_consumer.drain() {
            let result = match entry.op {
                Operation::Set => self.do_sid_list_set(&entry),
                Operation::Del => self.do_sid_list_del(&entry.key),
            };
            match result {
                Ok(()) => {}
                Err(TaskError::NeedRetry { reason }) => {
                    debug!(key = %entry.key, %reason, "sid list entry pending");
                    self.sid_list_consumer.retry(entry);
                }
                Err(e) => error!(key = %entry.key, error = %e, "failed to process sid list"),
            }
        }

        for entry in self.my_sid_consumer.drain() {
            let result = match entry.op {
                Operation::Set => self.do_my_sid_set(&entry).map(|_| ()),
                Operation::Del => self.do_my_sid_del(&entry.key),
            };
            match result {
                Ok(()) => {}
                Err(TaskError::NeedRetry { reason }) => {
                    debug!(key = %entry.key, %reason, "my_sid entry pending");
                    self.my_sid_consumer.retry(entry);
                }
                Err(TaskError::Ignored { .. }) => {}
                Err(e) => error!(key = %entry.key, error = %e, "failed to process my_sid"),
            }
        }

        for entry in self.pic_context_consumer.drain() {
            let result = match entry.op {
                Operation::Set => self.do_pic_context_set(&entry),
                Operation::Del => self.do_pic_context_del(&entry.key),
            };
            match result {
                Ok(()) => {}
                Err(TaskError::NeedRetry { reason }) => {
                    debug!(key = %entry.key, %reason, "pic context entry pending");
                    self.pic_context_consumer.retry(entry);
                }
                Err(TaskError::Ignored { reason } | TaskError::Duplicated { reason }) => {
                    debug!(key = %entry.key, %reason, "consuming pic context entry");
                }
                Err(e) => error!(key = %entry.key, error = %e, "failed to process pic context"),
            }
        }
    }

    // ------------------------------------------------------------------
    // SID lists
    // ------------------------------------------------------------------

    fn do_sid_list_set(&mut self, entry: &KeyOpFieldsValues) -> TaskResult<()> {
        let path = entry.field("path").unwrap_or("");
        let type_str = entry.field("type").unwrap_or("");
        self.create_update_sid_list(&entry.key, path, type_str)
    }

    fn do_sid_list_del(&mut self, name: &str) -> TaskResult<()> {
        self.delete_sid_list(name)
    }

    pub fn create_update_sid_list(
        &mut self,
        name: &str,
        raw_list: &str,
        type_str: &str,
    ) -> TaskResult<()> {
        let mut segments = Vec::new();
        for token in raw_list
            .split(SID_LIST_DELIMITER)
            .filter(|t| !t.trim().is_empty())
        {
            let segment: Ipv6Address = token.trim().parse().map_err(|_| {
                TaskError::invalid_entry(format!("invalid segment {token:?} in sid list {name}"))
            })?;
            segments.push(segment);
        }

        if segments.is_empty() {
            warn!(%name, "empty segment list, skipping");
            return Ok(());
        }

        match self.sid_lists.get(name) {
            Some(existing) => {
                self.services
                    .srv6
                    .set_sid_list_segments(existing.sid_object_id, &segments)
                    .map_err(|e| {
                        TaskError::asic_failure(format!("set segments of sid list {name}: {e}"))
                    })?;
            }
            None => {
                let list_type = sid_list_type(type_str);
                let sid_object_id = self
                    .services
                    .srv6
                    .create_sid_list(&segments, list_type)
                    .map_err(|e| {
                        TaskError::asic_failure(format!("create sid list {name}: {e}"))
                    })?;
                self.sid_lists.insert(
                    name.to_string(),
                    SidListEntry {
                        sid_object_id,
                        nexthops: BTreeSet::new(),
                    },
                );
                self.stats.sid_lists_created += 1;
            }
        }
        Ok(())
    }

    pub fn delete_sid_list(&mut self, name: &str) -> TaskResult<()> {
        let entry = self
            .sid_lists
            .get(name)
            .ok_or_else(|| TaskError::invalid_entry(format!("sid list {name} does not exist")))?;

        if entry.nexthops.len() > 1 {
            return Err(TaskError::need_retry(format!(
                "sid list {name} referenced by {} nexthops",
                entry.nexthops.len()
            )));
        }

        self.services
            .srv6
            .remove_sid_list(entry.sid_object_id)
            .map_err(|e| TaskError::asic_failure(format!("remove sid list {name}: {e}")))?;
        self.sid_lists.remove(name);
        self.stats.sid_lists_removed += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // MY_SID entries
    // ------------------------------------------------------------------

    fn do_my_sid_set(&mut self, entry: &KeyOpFieldsValues) -> TaskResult<MySidOutcome> {
        let action = entry.field("action").unwrap_or("").to_string();
        let vrf = entry.field("vrf").unwrap_or("").to_string();
        let adj = entry.field("adj").unwrap_or("").to_string();
        let ifname = entry.field("ifname").unwrap_or("").to_string();
        self.create_update_my_sid(&entry.key, &vrf, &adj, &action, &ifname)
    }

    fn do_my_sid_del(&mut self, key_string: &str) -> TaskResult<()> {
        self.delete_my_sid(key_string)
    }

    fn parse_my_sid_key(&self, key_string: &str) -> TaskResult<fib_asic::MySidEntryKey> {
        let parts: Vec<&str> = key_string.splitn(5, ':').collect();
        if parts.len() != 5 {
            return Err(TaskError::invalid_entry(format!(
                "malformed my_sid key {key_string:?}"
            )));
        }
        let lens: Vec<u8> = parts[..4]
            .iter()
            .map(|p| p.parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| {
                TaskError::invalid_entry(format!("malformed my_sid locator lengths in {key_string:?}"))
            })?;
        let sid: Ipv6Address = parts[4].parse().map_err(|_| {
            TaskError::invalid_entry(format!("malformed my_sid address in {key_string:?}"))
        })?;

        Ok(fib_asic::MySidEntryKey {
            vr_id: self.config.default_vr_id,
            locator_block_len: lens[0],
            locator_node_len: lens[1],
            function_len: lens[2],
            args_len: lens[3],
            sid,
        })
    }

    fn create_update_my_sid(
        &mut self,
        key_string: &str,
        vrf: &str,
        adj: &str,
        action: &str,
        ifname: &str,
    ) -> TaskResult<MySidOutcome> {
        let behavior = endpoint_behavior(action).ok_or_else(|| {
            TaskError::invalid_entry(format!("invalid my_sid action {action:?}"))
        })?;
        let flavor = behavior_flavor(action);

        let entry_key = match self.my_sids.get(key_string) {
            Some(existing) => existing.entry_key.clone(),
            None => self.parse_my_sid_key(key_string)?,
        };

        let mut vrf_id = None;
        if behavior_requires_vrf(behavior) {
            let id = if vrf == "default" || vrf.is_empty() {
                self.config.default_vr_id
            } else if self.services.vrfs.vrf_exists(vrf) {
                let id = self.services.vrfs.get_vrf_id(vrf);
                if id == NULL_OBJECT_ID {
                    return Err(TaskError::need_retry(format!(
                        "VRF {vrf} exists but has no router object yet"
                    )));
                }
                id
            } else {
                return Err(TaskError::need_retry(format!("VRF {vrf} not ready")));
            };
            vrf_id = Some(id);
        }

        let mut next_hop_id = None;
        let mut adjacency = None;
        if behavior_requires_next_hop(behavior) {
            let adjv: Vec<&str> = adj.split(ADJ_DELIMITER).filter(|t| !t.is_empty()).collect();
            let alsv: Vec<&str> = ifname
                .split(ADJ_DELIMITER)
                .filter(|t| !t.is_empty())
                .collect();
            if adjv.is_empty() || alsv.is_empty() {
                return Err(TaskError::invalid_entry(format!(
                    "my_sid {key_string} requires an adjacency and interface"
                )));
            }
            if adjv.len() != alsv.len() {
                return Err(TaskError::invalid_entry(format!(
                    "my_sid {key_string}: {} adjacencies but {} interfaces",
                    adjv.len(),
                    alsv.len()
                )));
            }
            if adjv.len() > 1 {
                return Err(TaskError::invalid_entry(format!(
                    "my_sid {key_string}: ECMP adjacency not supported"
                )));
            }

            let nexthop = NextHopKey::parse_plain(&format!("{}@{}", adjv[0], alsv[0]))
                .map_err(|e| TaskError::invalid_entry(e.to_string()))?;

            let id = if self.services.neigh.has_next_hop(&nexthop) {
                self.services.neigh.get_next_hop_id(&nexthop)
            } else {
                NULL_OBJECT_ID
            };

            if id == NULL_OBJECT_ID {
                info!(key = %key_string, adj = %adj, "adjacency not resolved, parking my_sid");
                self.pending_my_sids
                    .entry(nexthop)
                    .or_default()
                    .insert(PendingMySid {
                        key_string: key_string.to_string(),
                        vrf: vrf.to_string(),
                        adj: adj.to_string(),
                        action: action.to_string(),
                        ifname: ifname.to_string(),
                    });
                return Ok(MySidOutcome::Parked);
            }

            next_hop_id = Some(id);
            adjacency = Some(nexthop);
        }

        match self.my_sids.get(key_string) {
            None => {
                let request = MySidRequest {
                    key: entry_key.clone(),
                    behavior,
                    flavor,
                    vrf_id,
                    next_hop_id,
                };
                self.services.srv6.create_my_sid(&request).map_err(|e| {
                    TaskError::asic_failure(format!("create my_sid {key_string}: {e}"))
                })?;
                self.services.crm.inc_used(CrmResourceType::Srv6MySidEntry);

                if vrf_id.is_some() {
                    self.services.vrfs.increase_vrf_ref_count(vrf);
                }
                if let Some(nexthop) = &adjacency {
                    self.services.neigh.increase_next_hop_ref_count(nexthop);
                }

                self.my_sids.insert(
                    key_string.to_string(),
                    MySidEntry {
                        entry_key,
                        behavior,
                        vrf: if vrf_id.is_some() { vrf.to_string() } else { String::new() },
                        adj: if adjacency.is_some() { adj.to_string() } else { String::new() },
                        ifname: ifname.to_string(),
                    },
                );
                self.stats.my_sids_created += 1;
                debug!(key = %key_string, %action, "installed my_sid");
            }
            Some(existing) => {
                // Selectively update whichever of {vrf, nexthop} changed.
                let old_vrf = existing.vrf.clone();
                let old_adj = existing.adj.clone();
                let old_ifname = existing.ifname.clone();

                if let Some(id) = vrf_id {
                    if old_vrf != vrf {
                        self.services
                            .srv6
                            .set_my_sid_vrf(&entry_key, id)
                            .map_err(|e| {
                                TaskError::asic_failure(format!(
                                    "update VRF of my_sid {key_string}: {e}"
                                ))
                            })?;
                        self.services.vrfs.increase_vrf_ref_count(vrf);
                        if !old_vrf.is_empty() {
                            self.services.vrfs.decrease_vrf_ref_count(&old_vrf);
                        }
                    }
                }

                if let (Some(id), Some(nexthop)) = (next_hop_id, &adjacency) {
                    if old_adj != adj {
                        self.services
                            .srv6
                            .set_my_sid_next_hop(&entry_key, id)
                            .map_err(|e| {
                                TaskError::asic_failure(format!(
                                    "update nexthop of my_sid {key_string}: {e}"
                                ))
                            })?;
                        self.services.neigh.increase_next_hop_ref_count(nexthop);
                        if !old_adj.is_empty() {
                            if let Ok(old_nh) = NextHopKey::parse_plain(&format!(
                                "{}@{}",
                                old_adj, old_ifname
                            )) {
                                self.services.neigh.decrease_next_hop_ref_count(&old_nh);
                            }
                        }
                    }
                }

                if let Some(entry) = self.my_sids.get_mut(key_string) {
                    entry.behavior = behavior;
                    if vrf_id.is_some() {
                        entry.vrf = vrf.to_string();
                    }
                    if adjacency.is_some() {
                        entry.adj = adj.to_string();
                        entry.ifname = ifname.to_string();
                    }
                }
            }
        }

        Ok(MySidOutcome::Installed)
    }

    pub fn delete_my_sid(&mut self, key_string: &str) -> TaskResult<()> {
        let entry = match self.my_sids.get(key_string) {
            Some(entry) => entry.clone(),
            None => {
                // Possibly still parked; drop the pending record too.
                for pending in self.pending_my_sids.values_mut() {
                    pending.retain(|p| p.key_string != key_string);
                }
                self.pending_my_sids.retain(|_, s| !s.is_empty());
                return Err(TaskError::ignored(format!(
                    "my_sid {key_string} does not exist"
                )));
            }
        };

        self.services
            .srv6
            .remove_my_sid(&entry.entry_key)
            .map_err(|e| TaskError::asic_failure(format!("remove my_sid {key_string}: {e}")))?;
        self.services.crm.dec_used(CrmResourceType::Srv6MySidEntry);

        if behavior_requires_vrf(entry.behavior) && !entry.vrf.is_empty() {
            self.services.vrfs.decrease_vrf_ref_count(&entry.vrf);
        }
        if behavior_requires_next_hop(entry.behavior) && !entry.adj.is_empty() {
            if let Ok(nexthop) =
                NextHopKey::parse_plain(&format!("{}@{}", entry.adj, entry.ifname))
            {
                self.services.neigh.decrease_next_hop_ref_count(&nexthop);
            }
        }

        self.my_sids.remove(key_string);
        self.stats.my_sids_removed += 1;
        info!(key = %key_string, "removed my_sid");
        Ok(())
    }

    /// Neighbor event handler.
    ///
    /// On add, re-drive every MY_SID parked on this adjacency. On delete,
    /// uninstall installed MY_SIDs whose adjacency matches the neighbor and
    /// park them for re-installation.
    pub fn update_neighbor(&mut self, update: &NeighborUpdate) {
        let nexthop = update.next_hop();

        if update.add {
            let pending = match self.pending_my_sids.remove(&nexthop) {
                Some(pending) => pending,
                None => return,
            };

            for record in pending {
                debug!(key = %record.key_string, "re-driving parked my_sid");
                match self.create_update_my_sid(
                    &record.key_string,
                    &record.vrf,
                    &record.adj,
                    &record.action,
                    &record.ifname,
                ) {
                    Ok(MySidOutcome::Installed) => {
                        info!(key = %record.key_string, "installed pending my_sid");
                    }
                    Ok(MySidOutcome::Parked) => {}
                    Err(e) => {
                        error!(key = %record.key_string, error = %e,
                            "failed to install pending my_sid, keeping it parked");
                        self.pending_my_sids
                            .entry(nexthop.clone())
                            .or_default()
                            .insert(record);
                    }
                }
            }
        } else {
            let mut affected = Vec::new();
            for (key_string, entry) in &self.my_sids {
                if entry.adj.is_empty() {
                    continue;
                }
                let adj_ip = entry
                    .adj
                    .split(ADJ_DELIMITER)
                    .next()
                    .and_then(|s| s.parse::<IpAddress>().ok());
                match adj_ip {
                    Some(ip) if ip == update.ip_address => {
                        affected.push((key_string.clone(), entry.clone()));
                    }
                    _ => continue,
                }
            }

            for (key_string, entry) in affected {
                if self.delete_my_sid(&key_string).is_err() {
                    continue;
                }
                self.pending_my_sids
                    .entry(nexthop.clone())
                    .or_default()
                    .insert(PendingMySid {
                        key_string,
                        vrf: entry.vrf,
                        adj: entry.adj,
                        action: behavior_action(entry.behavior).to_string(),
                        ifname: entry.ifname,
                    });
            }
        }
    }

    // ------------------------------------------------------------------
    // Tunnels and SRv6 next-hops
    // ------------------------------------------------------------------

    fn create_srv6_tunnel(&mut self, srv6_source: &str) -> bool {
        if self.tunnels.contains_key(srv6_source) {
            return true;
        }

        let src_ip: Ipv6Address = match srv6_source.parse() {
            Ok(ip) => ip,
            Err(_) => {
                error!(source = %srv6_source, "invalid SRv6 source address");
                return false;
            }
        };

        let request = TunnelRequest {
            src_ip,
            underlay_rif: self.config.underlay_rif_id,
            dst_ip: None,
            encap_mapper: None,
        };
        let tunnel_id = match self.services.tunnel.create_tunnel(&request) {
            Ok(id) => id,
            Err(e) => {
                error!(source = %srv6_source, error = %e, "failed to create SRv6 tunnel");
                return false;
            }
        };

        self.tunnels.insert(
            srv6_source.to_string(),
            Srv6TunnelEntry {
                tunnel_id,
                nexthops: BTreeSet::new(),
            },
        );
        self.stats.tunnels_created += 1;
        true
    }

    fn create_srv6_p2p_tunnel(&mut self, src: &str, endpoint: &str) -> bool {
        if self.p2p_tunnels.contains_key(endpoint) {
            return true;
        }

        let (src_ip, dst_ip) = match (src.parse::<Ipv6Address>(), endpoint.parse::<Ipv6Address>())
        {
            (Ok(s), Ok(d)) => (s, d),
            _ => {
                error!(%src, %endpoint, "invalid SRv6 p2p tunnel addresses");
                return false;
            }
        };

        let tunnel_map_id = match self.services.tunnel.create_tunnel_map() {
            Ok(id) => id,
            Err(e) => {
                error!(%endpoint, error = %e, "failed to create SRv6 p2p tunnel map");
                return false;
            }
        };

        let request = TunnelRequest {
            src_ip,
            underlay_rif: self.config.underlay_rif_id,
            dst_ip: Some(dst_ip),
            encap_mapper: Some(tunnel_map_id),
        };
        let tunnel_id = match self.services.tunnel.create_tunnel(&request) {
            Ok(id) => id,
            Err(e) => {
                error!(%endpoint, error = %e, "failed to create SRv6 p2p tunnel");
                let _ = self.services.tunnel.remove_tunnel_map(tunnel_map_id);
                return false;
            }
        };

        self.p2p_tunnels.insert(
            endpoint.to_string(),
            Srv6P2pTunnelEntry {
                tunnel_id,
                tunnel_map_id,
                nexthops: BTreeSet::new(),
                tunnel_map_entries: BTreeSet::new(),
            },
        );
        self.stats.tunnels_created += 1;
        true
    }

    fn delete_srv6_p2p_tunnel(&mut self, endpoint: &str) -> bool {
        let (tunnel_id, tunnel_map_id) = match self.p2p_tunnels.get(endpoint) {
            None => return true,
            Some(entry) => {
                if !entry.nexthops.is_empty() || !entry.tunnel_map_entries.is_empty() {
                    debug!(%endpoint, "p2p tunnel still referenced");
                    return true;
                }
                (entry.tunnel_id, entry.tunnel_map_id)
            }
        };

        if let Err(e) = self.services.tunnel.remove_tunnel(tunnel_id) {
            error!(%endpoint, error = %e, "failed to remove SRv6 p2p tunnel");
            return false;
        }
        if let Err(e) = self.services.tunnel.remove_tunnel_map(tunnel_map_id) {
            error!(%endpoint, error = %e, "failed to remove SRv6 p2p tunnel map");
            return false;
        }
        self.p2p_tunnels.remove(endpoint);
        true
    }

    fn create_srv6_nexthop(&mut self, nh: &NextHopKey) -> bool {
        if self.srv6_nexthop_exists(nh) {
            return true;
        }

        let sid_list_id = if nh.srv6_segment.is_empty() {
            NULL_OBJECT_ID
        } else {
            match self.sid_lists.get(&nh.srv6_segment) {
                Some(entry) => entry.sid_object_id,
                None => {
                    warn!(segment = %nh.srv6_segment, "sid list not ready for nexthop");
                    return false;
                }
            }
        };

        let tunnel_id = if nh.ip_address.is_unspecified() {
            match self.tunnels.get(&nh.srv6_source) {
                Some(t) => t.tunnel_id,
                None => return false,
            }
        } else {
            match self.p2p_tunnels.get(&nh.ip_address.to_string()) {
                Some(t) => t.tunnel_id,
                None => return false,
            }
        };

        let request = Srv6NextHopRequest {
            sid_list_id,
            tunnel_id,
        };
        let nexthop_id = match self.services.next_hop.create_srv6_next_hop(&request) {
            Ok(id) => id,
            Err(e) => {
                error!(nexthop = %nh, error = %e, "failed to create SRv6 nexthop");
                return false;
            }
        };

        self.services.neigh.update_srv6_next_hop(nh, nexthop_id);
        self.nexthops.insert(nh.clone(), nexthop_id);
        self.services.crm.inc_used(CrmResourceType::Srv6Nexthop);
        self.stats.nexthops_created += 1;

        if !nh.srv6_segment.is_empty() {
            if let Some(entry) = self.sid_lists.get_mut(&nh.srv6_segment) {
                entry.nexthops.insert(nh.clone());
            }
        }

        if nh.ip_address.is_unspecified() {
            if let Some(tunnel) = self.tunnels.get_mut(&nh.srv6_source) {
                tunnel.nexthops.insert(nh.clone());
            }
        } else if let Some(tunnel) = self.p2p_tunnels.get_mut(&nh.ip_address.to_string()) {
            tunnel.nexthops.insert(nh.clone());
        }
        true
    }

    fn delete_srv6_nexthop(&mut self, nh: &NextHopKey) -> bool {
        if !self.srv6_nexthop_exists(nh) {
            return true;
        }
        if self.services.neigh.next_hop_ref_count(nh) != 0 {
            debug!(nexthop = %nh, "SRv6 nexthop still referenced");
            return true;
        }

        let nexthop_id = match self.nexthops.get(nh) {
            Some(id) => *id,
            None => return true,
        };
        if let Err(e) = self.services.next_hop.remove_next_hop(nexthop_id) {
            error!(nexthop = %nh, error = %e, "failed to remove SRv6 nexthop");
            return false;
        }

        if !nh.srv6_segment.is_empty() {
            if let Some(entry) = self.sid_lists.get_mut(&nh.srv6_segment) {
                entry.nexthops.remove(nh);
            }
        }
        self.services.neigh.update_srv6_next_hop(nh, NULL_OBJECT_ID);
        self.nexthops.remove(nh);
        self.services.crm.dec_used(CrmResourceType::Srv6Nexthop);
        self.stats.nexthops_removed += 1;

        if nh.ip_address.is_unspecified() {
            let mut drop_tunnel = None;
            if let Some(tunnel) = self.tunnels.get_mut(&nh.srv6_source) {
                tunnel.nexthops.remove(nh);
                if tunnel.nexthops.is_empty() {
                    drop_tunnel = Some(tunnel.tunnel_id);
                }
            }
            if let Some(tunnel_id) = drop_tunnel {
                if let Err(e) = self.services.tunnel.remove_tunnel(tunnel_id) {
                    error!(source = %nh.srv6_source, error = %e,
                        "failed to remove SRv6 tunnel");
                    return false;
                }
                self.tunnels.remove(&nh.srv6_source);
            }
        } else {
            let endpoint = nh.ip_address.to_string();
            if let Some(tunnel) = self.p2p_tunnels.get_mut(&endpoint) {
                tunnel.nexthops.remove(nh);
            }
            if !self.delete_srv6_p2p_tunnel(&endpoint) {
                return false;
            }
        }
        true
    }

    /// Create all next-hops of an SRv6 group, plus its VPN entries when the
    /// group carries VPN SIDs. Returns the next-hop id for single-member
    /// groups, null for larger groups.
    pub fn srv6_nexthops(&mut self, key: &NextHopGroupKey) -> Option<RawObjectId> {
        for nh in key.next_hops() {
            let nh = nh.clone();
            self.ensure_srv6_nexthop(&nh)?;
        }

        if key.is_srv6_vpn() {
            let agg_id = self.get_agg_id_for_group(key);
            let vpn_nexthops: Vec<NextHopKey> = key
                .next_hops()
                .iter()
                .filter(|nh| nh.is_srv6_vpn())
                .cloned()
                .collect();

            for (i, nh) in vpn_nexthops.iter().enumerate() {
                let endpoint = nh.ip_address.to_string();
                if !self.create_srv6_vpn(&endpoint, &nh.srv6_vpn_sid, agg_id) {
                    for done in &vpn_nexthops[..i] {
                        let endpoint = done.ip_address.to_string();
                        self.delete_srv6_vpn(&endpoint, &done.srv6_vpn_sid, agg_id);
                    }
                    self.delete_agg_id_for_group(key);
                    error!(group = %key, "failed to create SRv6 VPN entries");
                    return None;
                }
            }
            self.increase_agg_ref_for_group(key);
        }

        if key.size() == 1 {
            let nh = key.next_hops().iter().next()?;
            return self.nexthops.get(nh).copied();
        }
        Some(NULL_OBJECT_ID)
    }

    fn ensure_srv6_nexthop(&mut self, nh: &NextHopKey) -> Option<RawObjectId> {
        if nh.ip_address.is_unspecified() {
            if !self.create_srv6_tunnel(&nh.srv6_source.clone()) {
                return None;
            }
        } else if !self.create_srv6_p2p_tunnel(&nh.srv6_source.clone(), &nh.ip_address.to_string())
        {
            return None;
        }

        if !self.create_srv6_nexthop(nh) {
            return None;
        }
        self.nexthops.get(nh).copied()
    }

    /// Tear down the next-hops (and VPN entries) of removed SRv6 groups.
    pub fn remove_srv6_nexthops(&mut self, groups: &[NextHopGroupKey]) -> bool {
        // VPN entries go first so the tunnel-map references drain.
        for key in groups.iter().filter(|k| k.is_srv6_vpn()) {
            let agg_id = match self.agg_ids_by_group.get(key) {
                Some(entry) => entry.agg_id,
                None => continue,
            };
            for nh in key.next_hops().iter().filter(|nh| nh.is_srv6_vpn()) {
                let endpoint = nh.ip_address.to_string();
                if !self.delete_srv6_vpn(&endpoint, &nh.srv6_vpn_sid, agg_id) {
                    self.delete_agg_id_for_group(key);
                    error!(group = %key, "failed to delete SRv6 VPN entry");
                    return false;
                }
            }
            self.decrease_agg_ref_for_group(key);
            self.delete_agg_id_for_group(key);
        }

        for key in groups {
            for nh in key.next_hops() {
                if !self.delete_srv6_nexthop(nh) {
                    error!(nexthop = %nh, "failed to delete SRv6 nexthop");
                    return false;
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // VPN tunnel-map entries and aggregation ids
    // ------------------------------------------------------------------

    fn alloc_agg_id(&mut self) -> u32 {
        while self.next_agg_id == 0 || self.agg_id_used.contains(&self.next_agg_id) {
            self.next_agg_id = self.next_agg_id.wrapping_add(1);
        }
        let agg_id = self.next_agg_id;
        self.agg_id_used.insert(agg_id);
        agg_id
    }

    pub fn get_agg_id_for_group(&mut self, key: &NextHopGroupKey) -> u32 {
        if let Some(entry) = self.agg_ids_by_group.get(key) {
            return entry.agg_id;
        }
        let agg_id = self.alloc_agg_id();
        self.agg_ids_by_group.insert(
            key.clone(),
            AggIdEntry {
                agg_id,
                ref_count: 0,
            },
        );
        agg_id
    }

    pub fn get_agg_id_for_context(&mut self, context_id: &str) -> u32 {
        if let Some(entry) = self.agg_ids_by_context.get(context_id) {
            return entry.agg_id;
        }
        let agg_id = self.alloc_agg_id();
        self.agg_ids_by_context.insert(
            context_id.to_string(),
            AggIdEntry {
                agg_id,
                ref_count: 0,
            },
        );
        agg_id
    }

    fn delete_agg_id_for_group(&mut self, key: &NextHopGroupKey) {
        if let Some(entry) = self.agg_ids_by_group.get(key) {
            if entry.ref_count == 0 {
                let agg_id = entry.agg_id;
                self.agg_ids_by_group.remove(key);
                self.agg_id_used.remove(&agg_id);
            }
        }
    }

    fn delete_agg_id_for_context(&mut self, context_id: &str) {
        if let Some(entry) = self.agg_ids_by_context.get(context_id) {
            if entry.ref_count == 0 {
                let agg_id = entry.agg_id;
                self.agg_ids_by_context.remove(context_id);
                self.agg_id_used.remove(&agg_id);
            }
        }
    }

    fn increase_agg_ref_for_group(&mut self, key: &NextHopGroupKey) {
        match self.agg_ids_by_group.get_mut(key) {
            Some(entry) => entry.ref_count += 1,
            None => error!(group = %key, "agg-id refcount increase without allocation"),
        }
    }

    fn decrease_agg_ref_for_group(&mut self, key: &NextHopGroupKey) {
        match self.agg_ids_by_group.get_mut(key) {
            Some(entry) => entry.ref_count = entry.ref_count.saturating_sub(1),
            None => error!(group = %key, "agg-id refcount decrease without allocation"),
        }
    }

    fn increase_agg_ref_for_context(&mut self, context_id: &str) {
        match self.agg_ids_by_context.get_mut(context_id) {
            Some(entry) => entry.ref_count += 1,
            None => error!(%context_id, "agg-id refcount increase without allocation"),
        }
    }

    fn decrease_agg_ref_for_context(&mut self, context_id: &str) {
        match self.agg_ids_by_context.get_mut(context_id) {
            Some(entry) => entry.ref_count = entry.ref_count.saturating_sub(1),
            None => error!(%context_id, "agg-id refcount decrease without allocation"),
        }
    }

    pub fn agg_id_allocated(&self, agg_id: u32) -> bool {
        self.agg_id_used.contains(&agg_id)
    }

    fn create_srv6_vpn(&mut self, endpoint: &str, vpn_sid: &str, prefix_agg_id: u32) -> bool {
        let key = TunnelMapEntryKey {
            endpoint: endpoint.to_string(),
            vpn_sid: vpn_sid.to_string(),
            prefix_agg_id,
        };

        if let Some(value) = self.tunnel_map_entries.get_mut(&key) {
            value.ref_count += 1;
            return true;
        }

        let tunnel_map_id = match self.p2p_tunnels.get(endpoint) {
            Some(tunnel) => tunnel.tunnel_map_id,
            None => {
                warn!(%endpoint, "no tunnel map for endpoint");
                return false;
            }
        };

        let sid: Ipv6Address = match vpn_sid.parse() {
            Ok(sid) => sid,
            Err(_) => {
                error!(%vpn_sid, "invalid VPN SID");
                return false;
            }
        };

        let request = TunnelMapEntryRequest {
            tunnel_map_id,
            prefix_agg_id,
            vpn_sid: sid,
        };
        let entry_id = match self.services.tunnel.create_tunnel_map_entry(&request) {
            Ok(id) => id,
            Err(e) => {
                error!(%endpoint, %vpn_sid, error = %e, "failed to create VPN tunnel map entry");
                return false;
            }
        };

        self.tunnel_map_entries.insert(
            key.clone(),
            TunnelMapEntryValue {
                entry_id,
                ref_count: 1,
            },
        );
        if let Some(tunnel) = self.p2p_tunnels.get_mut(endpoint) {
            tunnel.tunnel_map_entries.insert(key);
        }
        self.stats.vpn_entries_created += 1;
        true
    }

    fn delete_srv6_vpn(&mut self, endpoint: &str, vpn_sid: &str, prefix_agg_id: u32) -> bool {
        let key = TunnelMapEntryKey {
            endpoint: endpoint.to_string(),
            vpn_sid: vpn_sid.to_string(),
            prefix_agg_id,
        };

        let remove = match self.tunnel_map_entries.get_mut(&key) {
            None => return true,
            Some(value) => {
                value.ref_count = value.ref_count.saturating_sub(1);
                value.ref_count == 0
            }
        };
        if !remove {
            return true;
        }

        let entry_id = match self.tunnel_map_entries.get(&key) {
            Some(value) => value.entry_id,
            None => return true,
        };
        if let Err(e) = self.services.tunnel.remove_tunnel_map_entry(entry_id) {
            error!(%endpoint, %vpn_sid, error = %e, "failed to remove VPN tunnel map entry");
            return false;
        }
        self.tunnel_map_entries.remove(&key);

        if let Some(tunnel) = self.p2p_tunnels.get_mut(endpoint) {
            tunnel.tunnel_map_entries.remove(&key);
        }
        self.delete_srv6_p2p_tunnel(endpoint)
    }

    // ------------------------------------------------------------------
    // PIC contexts
    // ------------------------------------------------------------------

    fn do_pic_context_set(&mut self, entry: &KeyOpFieldsValues) -> TaskResult<()> {
        if self.pic_contexts.contains_key(&entry.key) {
            return Err(TaskError::duplicated(format!(
                "update is not allowed for pic context {}",
                entry.key
            )));
        }

        let nexthops: Vec<String> = entry
            .field("nexthop")
            .unwrap_or("")
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let sids: Vec<String> = entry
            .field("vpn_sid")
            .unwrap_or("")
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        if nexthops.len() != sids.len() {
            return Err(TaskError::invalid_entry(format!(
                "pic context {}: {} endpoints but {} vpn sids",
                entry.key,
                nexthops.len(),
                sids.len()
            )));
        }

        let context = PicContextEntry {
            nexthops,
            sids,
            ref_count: 0,
        };
        if !self.create_srv6_vpns(&context, &entry.key) {
            return Err(TaskError::need_retry(format!(
                "failed to create SRv6 VPNs for pic context {}",
                entry.key
            )));
        }

        self.pic_contexts.insert(entry.key.clone(), context);
        self.stats.pic_contexts_created += 1;
        Ok(())
    }

    fn do_pic_context_del(&mut self, context_id: &str) -> TaskResult<()> {
        match self.pic_contexts.get(context_id) {
            None => Err(TaskError::ignored(format!(
                "pic context {context_id} does not exist"
            ))),
            Some(entry) if entry.ref_count != 0 => Err(TaskError::need_retry(format!(
                "pic context {context_id} referenced {} times",
                entry.ref_count
            ))),
            Some(_) => {
                if !self.delete_srv6_vpns(context_id) {
                    return Err(TaskError::need_retry(format!(
                        "failed to delete SRv6 VPNs for pic context {context_id}"
                    )));
                }
                self.pic_contexts.remove(context_id);
                Ok(())
            }
        }
    }

    fn create_srv6_vpns(&mut self, context: &PicContextEntry, context_id: &str) -> bool {
        let agg_id = self.get_agg_id_for_context(context_id);

        for i in 0..context.nexthops.len() {
            if !self.create_srv6_vpn(&context.nexthops[i], &context.sids[i], agg_id) {
                for j in 0..i {
                    self.delete_srv6_vpn(&context.nexthops[j], &context.sids[j], agg_id);
                }
                self.delete_agg_id_for_context(context_id);
                return false;
            }
        }

        self.increase_agg_ref_for_context(context_id);
        true
    }

    fn delete_srv6_vpns(&mut self, context_id: &str) -> bool {
        let context = match self.pic_contexts.get(context_id) {
            Some(context) => context.clone(),
            None => {
                error!(%context_id, "pic context missing during delete");
                return false;
            }
        };

        let agg_id = self.get_agg_id_for_context(context_id);
        let mut success = true;
        for i in 0..context.nexthops.len() {
            if !self.delete_srv6_vpn(&context.nexthops[i], &context.sids[i], agg_id) {
                success = false;
            }
        }

        if success {
            self.decrease_agg_ref_for_context(context_id);
        }
        self.delete_agg_id_for_context(context_id);
        success
    }
}

impl NeighborObserver for Srv6Orch {
    fn on_neighbor_update(&mut self, update: &NeighborUpdate) {
        self.update_neighbor(update);
    }
}

#[async_trait]
impl Orch for Srv6Orch {
    fn name(&self) -> &str {
        "Srv6Orch"
    }

    async fn do_task(&mut self) {
        self.drain_tasks();
    }

    fn priority(&self) -> i32 {
        self.sid_list_consumer.priority()
    }

    fn has_pending_tasks(&self) -> bool {
        self.sid_list_consumer.has_pending()
            || self.my_sid_consumer.has_pending()
            || self.pic_context_consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut tasks = self.sid_list_consumer.dump();
        tasks.extend(self.my_sid_consumer.dump());
        tasks.extend(self.pic_context_consumer.dump());
        tasks
    }
}

/// Shared handle letting the group orchestrator create SRv6 next-hops
/// through the single-threaded daemon's SRv6 orchestrator.
#[derive(Clone)]
pub struct SharedSrv6(pub Arc<Mutex<Srv6Orch>>);

impl Srv6NexthopApi for SharedSrv6 {
    fn create_srv6_nexthop_without_vpn(&self, nh: &NextHopKey) -> Option<RawObjectId> {
        self.0.lock().ok()?.ensure_srv6_nexthop(nh)
    }

    fn remove_srv6_nexthop_without_vpn(&self, nh: &NextHopKey) -> bool {
        match self.0.lock() {
            Ok(mut orch) => orch.delete_srv6_nexthop(nh),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmCounters;
    use crate::neigh::NeighborRegistry;
    use crate::vrf::VrfRegistry;
    use fib_asic::api::MySidEntryKey;
    use fib_asic::{AsicStatus, SimAsic};
    use fib_orch_common::fvs;

    struct Harness {
        orch: Srv6Orch,
        asic: Arc<SimAsic>,
        neigh: Arc<NeighborRegistry>,
        vrfs: Arc<VrfRegistry>,
    }

    const DEFAULT_VR: RawObjectId = 0x100;

    fn harness() -> Harness {
        let asic = Arc::new(SimAsic::new());
        let neigh = Arc::new(NeighborRegistry::new());
        let vrfs = Arc::new(VrfRegistry::new(DEFAULT_VR));
        let crm = Arc::new(CrmCounters::new());

        let services = Srv6Services {
            tunnel: Arc::clone(&asic) as Arc<dyn TunnelApi>,
            srv6: Arc::clone(&asic) as Arc<dyn Srv6Api>,
            next_hop: Arc::clone(&asic) as Arc<dyn NextHopApi>,
            neigh: Arc::clone(&neigh) as Arc<dyn NeighborApi>,
            vrfs: Arc::clone(&vrfs) as Arc<dyn VrfApi>,
            crm,
        };
        let config = Srv6OrchConfig {
            default_vr_id: DEFAULT_VR,
            underlay_rif_id: 0x200,
        };

        Harness {
            orch: Srv6Orch::new(config, services),
            asic,
            neigh,
            vrfs,
        }
    }

    fn source_nexthop(source: &str) -> NextHopKey {
        let mut nh = NextHopKey::new("0.0.0.0".parse().unwrap(), "");
        nh.srv6_source = source.to_string();
        nh
    }

    fn p2p_nexthop(endpoint: &str, source: &str, vpn_sid: &str) -> NextHopKey {
        let mut nh = NextHopKey::new(endpoint.parse().unwrap(), "");
        nh.srv6_source = source.to_string();
        nh.srv6_vpn_sid = vpn_sid.to_string();
        nh
    }

    fn push_sid_list(h: &mut Harness, name: &str, path: &str, type_str: &str) {
        h.orch.sid_list_consumer_mut().add_to_sync(vec![KeyOpFieldsValues::set(
            name,
            fvs(&[("path", path), ("type", type_str)]),
        )]);
    }

    fn push_my_sid(h: &mut Harness, key: &str, fields: &[(&str, &str)]) {
        h.orch
            .my_sid_consumer_mut()
            .add_to_sync(vec![KeyOpFieldsValues::set(key, fvs(fields))]);
    }

    fn dt4_key() -> MySidEntryKey {
        MySidEntryKey {
            vr_id: DEFAULT_VR,
            locator_block_len: 32,
            locator_node_len: 16,
            function_len: 16,
            args_len: 0,
            sid: "fc00:0:1:1::".parse().unwrap(),
        }
    }

    #[test]
    fn test_sid_list_create_replace_delete() {
        let mut h = harness();

        push_sid_list(&mut h, "Vrf10:192.168.6.0/24", "fc00:0:2:1::", "");
        h.orch.drain_tasks();
        assert_eq!(h.orch.sid_list_count(), 1);
        assert_eq!(h.asic.live_sid_list_count(), 1);

        // Replace updates the existing object in place.
        push_sid_list(&mut h, "Vrf10:192.168.6.0/24", "fc00:0:2:1::,fc00:0:2:2::", "");
        h.orch.drain_tasks();
        assert_eq!(h.orch.sid_list_count(), 1);
        assert_eq!(h.asic.live_sid_list_count(), 1);

        h.orch
            .sid_list_consumer_mut()
            .add_to_sync(vec![KeyOpFieldsValues::del("Vrf10:192.168.6.0/24")]);
        h.orch.drain_tasks();
        assert_eq!(h.orch.sid_list_count(), 0);
        assert_eq!(h.asic.live_sid_list_count(), 0);
    }

    #[test]
    fn test_empty_sid_list_is_noop() {
        let mut h = harness();
        push_sid_list(&mut h, "empty", "", "encaps.red");
        h.orch.drain_tasks();
        assert_eq!(h.orch.sid_list_count(), 0);
        assert!(!h.orch.sid_list_consumer_mut().has_pending());
    }

    #[test]
    fn test_my_sid_end_dt4_with_vrf() {
        let mut h = harness();
        h.vrfs.add_vrf("Vrf10", 0x2000);

        push_my_sid(
            &mut h,
            "32:16:16:0:fc00:0:1:1::",
            &[("action", "end.dt4"), ("vrf", "Vrf10")],
        );
        h.orch.drain_tasks();

        assert!(h.orch.my_sid_installed("32:16:16:0:fc00:0:1:1::"));
        assert!(h.asic.my_sid_installed(&dt4_key()));
        assert_eq!(h.vrfs.vrf_ref_count("Vrf10"), 1);
        assert_eq!(h.orch.stats().my_sids_created, 1);

        h.orch
            .my_sid_consumer_mut()
            .add_to_sync(vec![KeyOpFieldsValues::del("32:16:16:0:fc00:0:1:1::")]);
        h.orch.drain_tasks();
        assert!(!h.orch.my_sid_installed("32:16:16:0:fc00:0:1:1::"));
        assert!(!h.asic.my_sid_installed(&dt4_key()));
        assert_eq!(h.vrfs.vrf_ref_count("Vrf10"), 0);
    }

    #[test]
    fn test_my_sid_waits_for_vrf() {
        let mut h = harness();

        push_my_sid(
            &mut h,
            "32:16:16:0:fc00:0:1:1::",
            &[("action", "end.dt46"), ("vrf", "Vrf10")],
        );
        h.orch.drain_tasks();
        assert!(!h.orch.my_sid_installed("32:16:16:0:fc00:0:1:1::"));
        assert!(h.orch.my_sid_consumer_mut().has_pending());

        h.vrfs.add_vrf("Vrf10", 0x2000);
        h.orch.drain_tasks();
        assert!(h.orch.my_sid_installed("32:16:16:0:fc00:0:1:1::"));
        assert!(!h.orch.my_sid_consumer_mut().has_pending());
    }

    #[test]
    fn test_my_sid_end_x_parks_until_neighbor_resolves() {
        let mut h = harness();

        push_my_sid(
            &mut h,
            "32:16:16:0:fc00:0:1:2::",
            &[("action", "end.x"), ("adj", "2001:db8::1"), ("ifname", "Ethernet0")],
        );
        h.orch.drain_tasks();

        // Parked, consumed from the bus.
        assert!(!h.orch.my_sid_installed("32:16:16:0:fc00:0:1:2::"));
        assert_eq!(h.orch.pending_my_sid_count(), 1);
        assert!(!h.orch.my_sid_consumer_mut().has_pending());

        h.neigh.add_neighbor("2001:db8::1".parse().unwrap(), "Ethernet0");
        for update in h.neigh.drain_updates() {
            h.orch.update_neighbor(&update);
        }

        assert!(h.orch.my_sid_installed("32:16:16:0:fc00:0:1:2::"));
        assert_eq!(h.orch.pending_my_sid_count(), 0);
        let adj = NextHopKey::parse_plain("2001:db8::1@Ethernet0").unwrap();
        assert_eq!(h.neigh.next_hop_ref_count(&adj), 1);
    }

    #[test]
    fn test_neighbor_churn_reinstalls_my_sid() {
        let mut h = harness();
        h.neigh.add_neighbor("2001:db8::1".parse().unwrap(), "Ethernet0");
        h.neigh.drain_updates();

        push_my_sid(
            &mut h,
            "32:16:16:0:fc00:0:1:2::",
            &[("action", "end.x"), ("adj", "2001:db8::1"), ("ifname", "Ethernet0")],
        );
        h.orch.drain_tasks();
        assert!(h.orch.my_sid_installed("32:16:16:0:fc00:0:1:2::"));
        assert_eq!(h.orch.my_sid_count(), 1);

        // Neighbor goes away: the SID is uninstalled and parked.
        h.neigh.remove_neighbor("2001:db8::1".parse().unwrap(), "Ethernet0");
        for update in h.neigh.drain_updates() {
            h.orch.update_neighbor(&update);
        }
        assert!(!h.orch.my_sid_installed("32:16:16:0:fc00:0:1:2::"));
        assert_eq!(h.orch.pending_my_sid_count(), 1);

        // Neighbor comes back: same behavior is re-installed.
        h.neigh.add_neighbor("2001:db8::1".parse().unwrap(), "Ethernet0");
        for update in h.neigh.drain_updates() {
            h.orch.update_neighbor(&update);
        }
        assert!(h.orch.my_sid_installed("32:16:16:0:fc00:0:1:2::"));
        assert_eq!(h.orch.pending_my_sid_count(), 0);
    }

    #[test]
    fn test_my_sid_rejects_ecmp_adjacency() {
        let mut h = harness();
        push_my_sid(
            &mut h,
            "32:16:16:0:fc00:0:1:2::",
            &[
                ("action", "end.x"),
                ("adj", "2001:db8::1,2001:db8::2"),
                ("ifname", "Ethernet0,Ethernet4"),
            ],
        );
        h.orch.drain_tasks();
        assert!(!h.orch.my_sid_installed("32:16:16:0:fc00:0:1:2::"));
        assert_eq!(h.orch.pending_my_sid_count(), 0);
        assert!(!h.orch.my_sid_consumer_mut().has_pending());
    }

    #[test]
    fn test_my_sid_invalid_action_dropped() {
        let mut h = harness();
        push_my_sid(&mut h, "32:16:16:0:fc00:0:1:1::", &[("action", "end.psp")]);
        h.orch.drain_tasks();
        assert_eq!(h.orch.my_sid_count(), 0);
        assert!(!h.orch.my_sid_consumer_mut().has_pending());
    }

    #[test]
    fn test_source_tunnel_nexthop_cascade() {
        let mut h = harness();
        let nh = source_nexthop("fc00:0:1:1::1");

        let id = h.orch.ensure_srv6_nexthop(&nh).unwrap();
        assert_ne!(id, NULL_OBJECT_ID);
        assert!(h.orch.srv6_nexthop_exists(&nh));
        assert_eq!(h.asic.live_tunnel_count(), 1);
        assert!(h.neigh.has_next_hop(&nh));

        // Second nexthop on the same source shares the tunnel.
        let mut nh2 = source_nexthop("fc00:0:1:1::1");
        nh2.srv6_segment = "seg1".to_string();
        h.orch
            .create_update_sid_list("seg1", "fc00:0:2:1::", "")
            .unwrap();
        h.orch.ensure_srv6_nexthop(&nh2).unwrap();
        assert_eq!(h.asic.live_tunnel_count(), 1);
        assert_eq!(h.asic.live_next_hop_count(), 2);

        // Deleting cascades to the tunnel only when the last user is gone.
        assert!(h.orch.delete_srv6_nexthop(&nh));
        assert_eq!(h.asic.live_tunnel_count(), 1);
        assert!(h.orch.delete_srv6_nexthop(&nh2));
        assert_eq!(h.asic.live_tunnel_count(), 0);
        assert_eq!(h.asic.live_next_hop_count(), 0);
    }

    #[test]
    fn test_nexthop_waits_for_sid_list() {
        let mut h = harness();
        let mut nh = source_nexthop("fc00:0:1:1::1");
        nh.srv6_segment = "seg1".to_string();

        assert!(h.orch.ensure_srv6_nexthop(&nh).is_none());

        h.orch
            .create_update_sid_list("seg1", "fc00:0:2:1::", "")
            .unwrap();
        assert!(h.orch.ensure_srv6_nexthop(&nh).is_some());
    }

    #[test]
    fn test_referenced_nexthop_survives_delete() {
        let mut h = harness();
        let nh = source_nexthop("fc00:0:1:1::1");
        h.orch.ensure_srv6_nexthop(&nh).unwrap();

        h.neigh.increase_next_hop_ref_count(&nh);
        assert!(h.orch.delete_srv6_nexthop(&nh));
        assert!(h.orch.srv6_nexthop_exists(&nh));

        h.neigh.decrease_next_hop_ref_count(&nh);
        assert!(h.orch.delete_srv6_nexthop(&nh));
        assert!(!h.orch.srv6_nexthop_exists(&nh));
    }

    #[test]
    fn test_srv6_vpn_group_nexthops() {
        let mut h = harness();
        let key = NextHopGroupKey::parse_srv6(
            "2001:db8::1|fc00:0:2:1::|fc00:0:1:1::1|,2001:db8::2|fc00:0:2:2::|fc00:0:1:1::1|",
            "",
        )
        .unwrap();

        let id = h.orch.srv6_nexthops(&key).unwrap();
        assert_eq!(id, NULL_OBJECT_ID);
        // Two p2p tunnels, two VPN entries under one aggregation id.
        assert_eq!(h.asic.live_tunnel_count(), 2);
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 2);

        assert!(h.orch.remove_srv6_nexthops(std::slice::from_ref(&key)));
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 0);
        assert_eq!(h.asic.live_tunnel_count(), 0);
        assert_eq!(h.asic.live_next_hop_count(), 0);
    }

    #[test]
    fn test_pic_context_lifecycle() {
        let mut h = harness();
        // Bring up the p2p tunnels the VPN entries hang off.
        h.orch
            .ensure_srv6_nexthop(&p2p_nexthop("2001:db8::1", "fc00:0:1:1::1", ""))
            .unwrap();
        h.orch
            .ensure_srv6_nexthop(&p2p_nexthop("2001:db8::2", "fc00:0:1:1::1", ""))
            .unwrap();

        h.orch.pic_context_consumer_mut().add_to_sync(vec![KeyOpFieldsValues::set(
            "ctx1",
            fvs(&[
                ("nexthop", "2001:db8::1,2001:db8::2"),
                ("vpn_sid", "fc00:0:2:1::,fc00:0:2:2::"),
            ]),
        )]);
        h.orch.drain_tasks();

        assert!(h.orch.context_id_exists("ctx1"));
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 2);
        assert!(!h.orch.pic_context_consumer_mut().has_pending());

        // Update is rejected as a duplicate and consumed.
        h.orch.pic_context_consumer_mut().add_to_sync(vec![KeyOpFieldsValues::set(
            "ctx1",
            fvs(&[("nexthop", "2001:db8::1"), ("vpn_sid", "fc00:0:2:9::")]),
        )]);
        h.orch.drain_tasks();
        assert!(!h.orch.pic_context_consumer_mut().has_pending());
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 2);

        // Delete is refused while referenced.
        h.orch.increase_pic_context_ref("ctx1");
        h.orch
            .pic_context_consumer_mut()
            .add_to_sync(vec![KeyOpFieldsValues::del("ctx1")]);
        h.orch.drain_tasks();
        assert!(h.orch.context_id_exists("ctx1"));
        assert!(h.orch.pic_context_consumer_mut().has_pending());

        h.orch.decrease_pic_context_ref("ctx1");
        h.orch.drain_tasks();
        assert!(!h.orch.context_id_exists("ctx1"));
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 0);
    }

    #[test]
    fn test_pic_context_mismatched_vectors_dropped() {
        let mut h = harness();
        h.orch.pic_context_consumer_mut().add_to_sync(vec![KeyOpFieldsValues::set(
            "ctx1",
            fvs(&[("nexthop", "2001:db8::1,2001:db8::2"), ("vpn_sid", "fc00:0:2:1::")]),
        )]);
        h.orch.drain_tasks();
        assert!(!h.orch.context_id_exists("ctx1"));
        assert!(!h.orch.pic_context_consumer_mut().has_pending());
    }

    #[test]
    fn test_pic_context_unwinds_on_failure() {
        let mut h = harness();
        h.orch
            .ensure_srv6_nexthop(&p2p_nexthop("2001:db8::1", "fc00:0:1:1::1", ""))
            .unwrap();
        h.orch
            .ensure_srv6_nexthop(&p2p_nexthop("2001:db8::2", "fc00:0:1:1::1", ""))
            .unwrap();

        // First entry succeeds, second fails: everything is unwound and the
        // entry retried.
        h.asic
            .inject_failure("create_tunnel_map_entry", AsicStatus::TableFull);
        h.orch.pic_context_consumer_mut().add_to_sync(vec![KeyOpFieldsValues::set(
            "ctx1",
            fvs(&[
                ("nexthop", "2001:db8::1,2001:db8::2"),
                ("vpn_sid", "fc00:0:2:1::,fc00:0:2:2::"),
            ]),
        )]);
        // Injected failure hits the first create; order within the entry is
        // deterministic.
        h.orch.drain_tasks();

        assert!(!h.orch.context_id_exists("ctx1"));
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 0);
        assert!(h.orch.pic_context_consumer_mut().has_pending());

        // Next tick succeeds and the aggregation id is allocated once.
        h.orch.drain_tasks();
        assert!(h.orch.context_id_exists("ctx1"));
        assert_eq!(h.asic.live_tunnel_map_entry_count(), 2);
    }

    #[test]
    fn test_agg_id_reuse_after_release() {
        let mut h = harness();
        let agg1 = h.orch.get_agg_id_for_context("ctx1");
        assert!(h.orch.agg_id_allocated(agg1));
        let agg2 = h.orch.get_agg_id_for_context("ctx2");
        assert_ne!(agg1, agg2);

        h.orch.delete_agg_id_for_context("ctx1");
        assert!(!h.orch.agg_id_allocated(agg1));

        // Same context id gets a fresh allocation.
        let agg3 = h.orch.get_agg_id_for_context("ctx3");
        assert!(h.orch.agg_id_allocated(agg3));
    }

    #[test]
    fn test_sid_list_delete_refused_while_referenced() {
        let mut h = harness();
        h.orch
            .create_update_sid_list("seg1", "fc00:0:2:1::", "")
            .unwrap();

        let mut nh1 = source_nexthop("fc00:0:1:1::1");
        nh1.srv6_segment = "seg1".to_string();
        let mut nh2 = source_nexthop("fc00:0:1:1::2");
        nh2.srv6_segment = "seg1".to_string();
        h.orch.ensure_srv6_nexthop(&nh1).unwrap();
        h.orch.ensure_srv6_nexthop(&nh2).unwrap();

        assert!(matches!(
            h.orch.delete_sid_list("seg1"),
            Err(TaskError::NeedRetry { .. })
        ));

        h.orch.delete_srv6_nexthop(&nh2);
        assert!(h.orch.delete_sid_list("seg1").is_ok());
    }

    #[test]
    fn test_shared_handle_for_group_orchestrator() {
        let h = harness();
        let shared = SharedSrv6(Arc::new(Mutex::new(h.orch)));
        let nh = source_nexthop("fc00:0:1:1::1");

        let id = shared.create_srv6_nexthop_without_vpn(&nh).unwrap();
        assert_ne!(id, NULL_OBJECT_ID);
        // Idempotent.
        assert_eq!(shared.create_srv6_nexthop_without_vpn(&nh), Some(id));
        assert!(shared.remove_srv6_nexthop_without_vpn(&nh));
    }
}
