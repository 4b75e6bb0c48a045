//! Nexthop group orchestrator.
//!
//! Consumes `NEXTHOP_GROUP` records from the state bus and owns the group
//! lifecycle on the ASIC: real groups, temporary single-member stand-ins
//! under resource pressure and their later promotion, recursive groups
//! flattened at key-build time, and per-member validation on neighbor
//! events.

use crate::crm::{CrmApi, CrmResourceType};
use crate::intfs::InterfaceApi;
use crate::neigh::{NeighborApi, NeighborObserver, NeighborUpdate};
use crate::route::{KeyParseError, NextHopFlags, NextHopGroupKey, NextHopKey};
use crate::srv6::Srv6NexthopApi;
use async_trait::async_trait;
use fib_asic::error::{
    classify_create_error, classify_remove_status, classify_set_status, StatusAction,
};
use fib_asic::RawObjectId;
use fib_asic::{AsicError, MemberBulker, NextHopGroupApi, NextHopGroupMemberRequest, NULL_OBJECT_ID};
use fib_orch_common::{Consumer, ConsumerConfig, KeyOpFieldsValues, Orch, TaskError, TaskResult};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::types::{NextHopGroup, NextHopGroupMember, NhgEntry};

/// Group count owned by the route orchestrator, which shares the ASIC group
/// quota with this module.
pub trait RouteGroupsApi: Send + Sync {
    fn nhg_count(&self) -> u32;
}

/// Fixed route-orchestrator group count, settable for tests and simulation.
#[derive(Default)]
pub struct StaticRouteGroups(std::sync::atomic::AtomicU32);

impl StaticRouteGroups {
    pub fn new(count: u32) -> Self {
        Self(std::sync::atomic::AtomicU32::new(count))
    }

    pub fn set(&self, count: u32) {
        self.0.store(count, std::sync::atomic::Ordering::SeqCst);
    }
}

impl RouteGroupsApi for StaticRouteGroups {
    fn nhg_count(&self) -> u32 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Collaborators the orchestrator programs against.
pub struct NhgServices {
    pub asic: Arc<dyn NextHopGroupApi>,
    pub neigh: Arc<dyn NeighborApi>,
    pub intfs: Arc<dyn InterfaceApi>,
    pub crm: Arc<dyn CrmApi>,
    pub srv6: Arc<dyn Srv6NexthopApi>,
    pub route_groups: Arc<dyn RouteGroupsApi>,
}

#[derive(Debug, Clone)]
pub struct NhgOrchConfig {
    /// ASIC group quota shared with the route orchestrator.
    pub max_nhg_count: u32,
    pub max_bulk_size: usize,
}

impl Default for NhgOrchConfig {
    fn default() -> Self {
        Self {
            max_nhg_count: 512,
            max_bulk_size: 64,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct NhgOrchStats {
    pub groups_created: u64,
    pub groups_removed: u64,
    pub temp_groups_created: u64,
    pub temp_groups_reselected: u64,
    pub temp_groups_promoted: u64,
}

/// Index used to pick the representative member of a temporary group.
/// Injectable so tests can pin the otherwise uniform-random choice.
pub type MemberChooser = Box<dyn Fn(usize) -> usize + Send>;

struct SyncCtx<'a> {
    svc: &'a NhgServices,
    synced_count: &'a mut u32,
    max_bulk_size: usize,
}

pub struct NhgOrch {
    config: NhgOrchConfig,
    services: NhgServices,
    consumer: Consumer,
    groups: HashMap<String, NhgEntry<NextHopGroup>>,
    /// Real ASIC group objects created by this orchestrator.
    synced_count: u32,
    stats: NhgOrchStats,
    chooser: MemberChooser,
}

impl NhgOrch {
    pub const TABLE_NAME: &'static str = "NEXTHOP_GROUP";

    pub fn new(config: NhgOrchConfig, services: NhgServices) -> Self {
        Self {
            config,
            services,
            consumer: Consumer::new(ConsumerConfig::new(Self::TABLE_NAME).with_priority(20)),
            groups: HashMap::new(),
            synced_count: 0,
            stats: NhgOrchStats::default(),
            chooser: Box::new(|n| rand::rng().random_range(0..n)),
        }
    }

    pub fn set_member_chooser(&mut self, chooser: MemberChooser) {
        self.chooser = chooser;
    }

    pub fn set_max_nhg_count(&mut self, max: u32) {
        self.config.max_nhg_count = max;
    }

    pub fn consumer_mut(&mut self) -> &mut Consumer {
        &mut self.consumer
    }

    pub fn stats(&self) -> &NhgOrchStats {
        &self.stats
    }

    pub fn synced_group_count(&self) -> u32 {
        self.synced_count
    }

    pub fn group(&self, index: &str) -> Option<&NhgEntry<NextHopGroup>> {
        self.groups.get(index)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Called by route referrers when they start using a group.
    pub fn increment_group_ref(&mut self, index: &str) -> bool {
        match self.groups.get_mut(index) {
            Some(entry) => {
                entry.ref_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn decrement_group_ref(&mut self, index: &str) -> bool {
        match self.groups.get_mut(index) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    /// Process everything pending on the `NEXTHOP_GROUP` consumer.
    pub fn drain_tasks(&mut self) {
        let entries = self.consumer.drain();

        for i in 0..entries.len() {
            let entry = &entries[i];
            let result = match entry.op {
                fib_orch_common::Operation::Set => self.do_set(entry),
                fib_orch_common::Operation::Del => {
                    // A queued SET behind this DEL must win; consume the
                    // DEL so the update is observed instead.
                    let later_set = entries[i + 1..]
                        .iter()
                        .any(|e| e.key == entry.key && e.op.is_set());
                    if later_set {
                        Ok(())
                    } else {
                        self.do_del(&entry.key)
                    }
                }
            };

            match result {
                Ok(()) => {}
                Err(TaskError::NeedRetry { reason }) => {
                    debug!(key = %entry.key, %reason, "nexthop group entry pending");
                    self.consumer.retry(entry.clone());
                }
                Err(TaskError::Ignored { reason } | TaskError::Duplicated { reason }) => {
                    debug!(key = %entry.key, %reason, "consuming nexthop group entry");
                }
                Err(e) => {
                    error!(key = %entry.key, error = %e, "dropping nexthop group entry");
                }
            }
        }
    }

    fn do_set(&mut self, entry: &KeyOpFieldsValues) -> TaskResult<()> {
        let index = entry.key.clone();
        let ips = entry.field("nexthop").unwrap_or("");
        let aliases = entry.field("ifname").unwrap_or("");
        let weights = entry.field("weight").unwrap_or("");
        let mpls_nhs = entry.field("mpls_nh").unwrap_or("");
        let seg_src = entry.field("seg_src").unwrap_or("");
        let nhgs = entry.field("nexthop_group").unwrap_or("");

        let srv6_nh = !seg_src.is_empty();
        let is_recursive = !nhgs.is_empty();

        if is_recursive && (!ips.is_empty() || !aliases.is_empty()) {
            return Err(TaskError::invalid_entry(format!(
                "group {index} has both regular and recursive member fields"
            )));
        }

        let mut non_existent_member = false;

        let nhg_key = if is_recursive {
            self.build_recursive_key(&index, nhgs, weights, &mut non_existent_member)?
        } else if srv6_nh {
            Self::build_srv6_key(ips, seg_src, weights)?
        } else {
            Self::build_plain_key(ips, aliases, mpls_nhs, weights)?
        };

        let max_bulk_size = self.config.max_bulk_size;
        let mut ctx = SyncCtx {
            svc: &self.services,
            synced_count: &mut self.synced_count,
            max_bulk_size,
        };

        match self.groups.get_mut(&index) {
            None => {
                if self.services.route_groups.nhg_count() + *ctx.synced_count
                    >= self.config.max_nhg_count
                {
                    // Quota reached: fall back to a temporary single-member
                    // group and keep the entry pending for promotion.
                    if nhg_key.is_srv6_nexthop() {
                        return Err(TaskError::need_retry(format!(
                            "group quota reached; no temporary group for SRv6 group {index}"
                        )));
                    }

                    match create_temp_group(&nhg_key, ctx.svc, &self.chooser) {
                        Some(mut temp) => match sync_group(&mut temp, &mut ctx) {
                            Ok(()) => {
                                info!(%index, member = %temp.key(), "created temporary group");
                                self.groups.insert(index.clone(), NhgEntry::new(temp));
                                self.stats.temp_groups_created += 1;
                            }
                            Err(e) => {
                                warn!(%index, error = %e, "failed to sync temporary group");
                            }
                        },
                        None => {
                            debug!(%index, "no resolvable member for temporary group");
                        }
                    }

                    Err(TaskError::need_retry(format!(
                        "group {index} awaiting group resources"
                    )))
                } else {
                    let mut nhg = NextHopGroup::new(nhg_key, false);
                    nhg.set_recursive(is_recursive);

                    match sync_group(&mut nhg, &mut ctx) {
                        Ok(()) => {
                            debug!(%index, key = %nhg.key(), "created nexthop group");
                            self.groups.insert(index.clone(), NhgEntry::new(nhg));
                            self.stats.groups_created += 1;
                            if is_recursive && non_existent_member {
                                Err(TaskError::need_retry(format!(
                                    "recursive group {index} has unresolved members"
                                )))
                            } else {
                                Ok(())
                            }
                        }
                        Err(e @ TaskError::NeedRetry { .. }) => {
                            // Tear down whatever synced before the failure;
                            // the full creation is replayed next tick.
                            let _ = remove_group(&mut nhg, &mut ctx);
                            Err(e)
                        }
                        Err(e) => Err(e),
                    }
                }
            }
            Some(nhg_entry) => {
                let quota_reached = self.services.route_groups.nhg_count() + *ctx.synced_count
                    >= self.config.max_nhg_count;

                if nhg_entry.nhg.is_temp() && quota_reached {
                    // Still out of resources. Re-pick the representative if
                    // the update dropped the currently chosen member.
                    if !nhg_key.contains(nhg_entry.nhg.key()) {
                        if let Some(mut new_temp) =
                            create_temp_group(&nhg_key, ctx.svc, &self.chooser)
                        {
                            if sync_group(&mut new_temp, &mut ctx).is_ok() {
                                let mut old = std::mem::replace(&mut nhg_entry.nhg, new_temp);
                                let _ = remove_group(&mut old, &mut ctx);
                                self.stats.temp_groups_reselected += 1;
                            }
                        }
                    }
                    Err(TaskError::need_retry(format!(
                        "temporary group {index} awaiting promotion"
                    )))
                } else if nhg_entry.nhg.is_temp() {
                    // Resources freed up: promote by syncing the full group
                    // and swapping the payload so referrers are unaffected.
                    let mut real = NextHopGroup::new(nhg_key, false);
                    let result = sync_group(&mut real, &mut ctx);

                    if real.is_synced() {
                        let mut old = std::mem::replace(&mut nhg_entry.nhg, real);
                        let _ = remove_group(&mut old, &mut ctx);
                        self.stats.temp_groups_promoted += 1;
                        info!(%index, "promoted temporary group");
                    }

                    result
                } else {
                    let result = update_group(&mut nhg_entry.nhg, nhg_key, &mut ctx);
                    if result.is_ok() && is_recursive && non_existent_member {
                        return Err(TaskError::need_retry(format!(
                            "recursive group {index} has unresolved members"
                        )));
                    }
                    result
                }
            }
        }
    }

    fn do_del(&mut self, index: &str) -> TaskResult<()> {
        let max_bulk_size = self.config.max_bulk_size;

        match self.groups.get_mut(index) {
            None => {
                debug!(%index, "delete for unknown nexthop group");
                Err(TaskError::ignored("group does not exist"))
            }
            Some(entry) if entry.ref_count > 0 => Err(TaskError::need_retry(format!(
                "group {index} still referenced ({} refs)",
                entry.ref_count
            ))),
            Some(entry) => {
                let mut ctx = SyncCtx {
                    svc: &self.services,
                    synced_count: &mut self.synced_count,
                    max_bulk_size,
                };
                remove_group(&mut entry.nhg, &mut ctx)?;
                self.groups.remove(index);
                self.stats.groups_removed += 1;
                Ok(())
            }
        }
    }

    /// Flatten recursive member names into a combined key over the members'
    /// *current* keys. Unknown members are skipped but remembered so the
    /// entry stays pending; temp or recursive members are invalid.
    fn build_recursive_key(
        &self,
        index: &str,
        nhgs: &str,
        weights: &str,
        non_existent_member: &mut bool,
    ) -> TaskResult<NextHopGroupKey> {
        let mut member_strings = Vec::new();
        let mut srv6_nh = false;
        let mut overlay_nh = false;

        for name in nhgs.split(',').filter(|s| !s.trim().is_empty()) {
            match self.groups.get(name) {
                None => {
                    debug!(member = %name, parent = %index, "member group not ready");
                    *non_existent_member = true;
                }
                Some(member_entry) => {
                    let member_nhg = &member_entry.nhg;
                    if member_nhg.is_recursive() || member_nhg.is_temp() {
                        return Err(TaskError::invalid_entry(format!(
                            "invalid member group {name} in recursive group {index}"
                        )));
                    }

                    let key = member_nhg.key();
                    if member_strings.is_empty() {
                        srv6_nh = key.is_srv6_nexthop();
                        overlay_nh = key.is_overlay_nexthop();
                    } else if key.is_srv6_nexthop() != srv6_nh
                        || key.is_overlay_nexthop() != overlay_nh
                    {
                        return Err(TaskError::invalid_entry(format!(
                            "inconsistent member group types in recursive group {index}"
                        )));
                    }
                    member_strings.push(key.encode());
                }
            }
        }

        if member_strings.is_empty() {
            return Err(TaskError::need_retry(format!(
                "no member group of recursive group {index} is ready"
            )));
        }

        NextHopGroupKey::parse(&member_strings.join(","), weights, overlay_nh, srv6_nh)
            .map_err(key_parse_error)
    }

    fn build_srv6_key(ips: &str, seg_src: &str, weights: &str) -> TaskResult<NextHopGroupKey> {
        let ipv: Vec<&str> = ips.split(',').collect();
        let srcv: Vec<&str> = seg_src.split(',').collect();
        if ipv.len() != srcv.len() {
            return Err(TaskError::invalid_entry(format!(
                "{} endpoints but {} SRv6 sources",
                ipv.len(),
                srcv.len()
            )));
        }

        let nhg_str = ipv
            .iter()
            .zip(&srcv)
            .map(|(ip, src)| format!("{}||{}|", ip, src))
            .collect::<Vec<_>>()
            .join(",");

        NextHopGroupKey::parse_srv6(&nhg_str, weights).map_err(key_parse_error)
    }

    fn build_plain_key(
        ips: &str,
        aliases: &str,
        mpls_nhs: &str,
        weights: &str,
    ) -> TaskResult<NextHopGroupKey> {
        let ipv: Vec<&str> = ips.split(',').collect();
        let alsv: Vec<&str> = aliases.split(',').collect();
        if ipv.len() != alsv.len() {
            return Err(TaskError::invalid_entry(format!(
                "{} nexthops but {} interfaces",
                ipv.len(),
                alsv.len()
            )));
        }
        let mplsv: Vec<&str> = if mpls_nhs.trim().is_empty() {
            vec![]
        } else {
            mpls_nhs.split(',').collect()
        };

        let mut tokens = Vec::with_capacity(ipv.len());
        for (i, (ip, alias)) in ipv.iter().zip(&alsv).enumerate() {
            match mplsv.get(i) {
                Some(&mpls) if mpls != "na" => tokens.push(format!("{}+{}@{}", mpls, ip, alias)),
                _ => tokens.push(format!("{}@{}", ip, alias)),
            }
        }

        NextHopGroupKey::parse_plain(&tokens.join(","), weights).map_err(key_parse_error)
    }

    /// Re-sync a next-hop in every group that contains it.
    pub fn validate_next_hop(&mut self, nh: &NextHopKey) -> bool {
        let mut ctx = SyncCtx {
            svc: &self.services,
            synced_count: &mut self.synced_count,
            max_bulk_size: self.config.max_bulk_size,
        };

        for (index, entry) in self.groups.iter_mut() {
            if entry.nhg.has_member(nh) {
                if let Err(e) = validate_in_group(&mut entry.nhg, nh, &mut ctx) {
                    error!(group = %index, nexthop = %nh, error = %e,
                        "failed to validate next hop");
                    return false;
                }
            }
        }
        true
    }

    /// Remove a next-hop from the ASIC in every group that contains it,
    /// keeping it in the member sets.
    pub fn invalidate_next_hop(&mut self, nh: &NextHopKey) -> bool {
        let mut ctx = SyncCtx {
            svc: &self.services,
            synced_count: &mut self.synced_count,
            max_bulk_size: self.config.max_bulk_size,
        };

        for (index, entry) in self.groups.iter_mut() {
            if entry.nhg.has_member(nh) {
                if let Err(e) = invalidate_in_group(&mut entry.nhg, nh, &mut ctx) {
                    warn!(group = %index, nexthop = %nh, error = %e,
                        "failed to invalidate next hop");
                    return false;
                }
            }
        }
        true
    }
}

impl NeighborObserver for NhgOrch {
    fn on_neighbor_update(&mut self, update: &NeighborUpdate) {
        let nh = update.next_hop();
        if update.add {
            self.validate_next_hop(&nh);
        } else {
            self.invalidate_next_hop(&nh);
        }
    }
}

#[async_trait]
impl Orch for NhgOrch {
    fn name(&self) -> &str {
        "NhgOrch"
    }

    async fn do_task(&mut self) {
        self.drain_tasks();
    }

    fn priority(&self) -> i32 {
        self.consumer.priority()
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }
}

fn key_parse_error(e: KeyParseError) -> TaskError {
    TaskError::invalid_entry(e.to_string())
}

fn map_create_err(e: &AsicError, what: &str) -> TaskError {
    match classify_create_error(e) {
        StatusAction::Retry | StatusAction::Handled => {
            TaskError::need_retry(format!("{what}: {e}"))
        }
        StatusAction::Fatal => TaskError::asic_failure(format!("{what}: {e}")),
    }
}

fn map_remove_err(e: &AsicError, what: &str) -> TaskError {
    match e.status().map(classify_remove_status) {
        Some(StatusAction::Handled) => TaskError::ignored(format!("{what}: {e}")),
        Some(StatusAction::Retry) => TaskError::need_retry(format!("{what}: {e}")),
        _ => TaskError::asic_failure(format!("{what}: {e}")),
    }
}

/// Resolve the underlying ASIC next-hop id for a member.
///
/// Interface next-hops map to the router interface; SRv6 next-hops are
/// created on demand through the SRv6 orchestrator; labeled next-hops are
/// derived from their resolved IP neighbor. Anything unresolved kicks
/// neighbor resolution and reports null.
fn member_nh_id(key: &NextHopKey, svc: &NhgServices) -> RawObjectId {
    if key.is_intf_next_hop() {
        svc.intfs.get_router_intf_id(&key.alias)
    } else if svc.neigh.has_next_hop(key) {
        if key.is_srv6() {
            svc.srv6
                .create_srv6_nexthop_without_vpn(key)
                .unwrap_or(NULL_OBJECT_ID)
        } else {
            svc.neigh.get_next_hop_id(key)
        }
    } else if key.is_labeled() && svc.neigh.is_neighbor_resolved(key) {
        if svc.neigh.add_labeled_next_hop(key) {
            svc.neigh.get_next_hop_id(key)
        } else {
            NULL_OBJECT_ID
        }
    } else if key.is_srv6() {
        svc.srv6
            .create_srv6_nexthop_without_vpn(key)
            .unwrap_or(NULL_OBJECT_ID)
    } else {
        debug!(nexthop = %key, "next hop unresolved, kicking neighbor resolution");
        svc.neigh.resolve_neighbor(key);
        NULL_OBJECT_ID
    }
}

fn release_next_hop(key: &NextHopKey, svc: &NhgServices) {
    if key.is_intf_next_hop() {
        svc.intfs.decrease_router_intf_ref_count(&key.alias);
        return;
    }
    svc.neigh.decrease_next_hop_ref_count(key);
    if key.is_srv6() && svc.neigh.has_next_hop(key) && svc.neigh.next_hop_ref_count(key) == 0 {
        svc.srv6.remove_srv6_nexthop_without_vpn(key);
    }
}

fn mark_member_synced(member: &mut NextHopGroupMember, gm_id: RawObjectId, svc: &NhgServices) {
    member.gm_id = gm_id;
    svc.neigh.increase_next_hop_ref_count(&member.key);
    svc.crm.inc_used(CrmResourceType::NextHopGroupMember);
}

fn remove_member(member: &mut NextHopGroupMember, svc: &NhgServices) -> TaskResult<()> {
    if member.is_synced() {
        if let Err(e) = svc.asic.remove_group_member(member.gm_id) {
            let mapped = map_remove_err(&e, "remove group member");
            if !matches!(mapped, TaskError::Ignored { .. }) {
                return Err(mapped);
            }
        }
        member.gm_id = NULL_OBJECT_ID;
        svc.crm.dec_used(CrmResourceType::NextHopGroupMember);
        release_next_hop(&member.key, svc);
    }
    Ok(())
}

/// Sync the given members through the bulker. Members whose interface is
/// down are skipped; members whose next-hop id cannot be resolved leave the
/// group pending.
fn sync_members(
    group: &mut NextHopGroup,
    keys: &[NextHopKey],
    ctx: &mut SyncCtx<'_>,
) -> TaskResult<()> {
    let svc = ctx.svc;
    let mut bulker: MemberBulker<NextHopKey> = MemberBulker::new(ctx.max_bulk_size);
    let mut pending = false;
    let group_id = group.id();

    for key in keys {
        let member = match group.members().get(key) {
            Some(m) => m,
            None => continue,
        };
        if member.is_synced() {
            continue;
        }

        let nh_id = member_nh_id(&member.key, svc);
        if nh_id == NULL_OBJECT_ID {
            warn!(nexthop = %member.key, group = %group.key(), "next hop not available");
            pending = true;
            continue;
        }

        if svc.neigh.is_next_hop_flag_set(&member.key, NextHopFlags::IF_DOWN) {
            warn!(nexthop = %member.key, group = %group.key(),
                "skipping next hop, interface is down");
            continue;
        }

        let weight = member.weight();
        bulker.create_entry(
            member.key.clone(),
            NextHopGroupMemberRequest {
                group_id,
                next_hop_id: nh_id,
                weight: (weight != 0).then_some(weight),
            },
        );
    }

    for (key, gm_id) in bulker.flush(svc.asic.as_ref()) {
        if gm_id == NULL_OBJECT_ID {
            error!(nexthop = %key, group = %group.key(), "failed to create group member");
            pending = true;
        } else if let Some(member) = group.members_mut().get_mut(&key) {
            mark_member_synced(member, gm_id, svc);
        }
    }

    if pending {
        Err(TaskError::need_retry(format!(
            "group {} has unsynced members",
            group.key()
        )))
    } else {
        Ok(())
    }
}

/// Program a group on the ASIC.
///
/// Single-member non-recursive groups are aliased to the member's next-hop
/// id with no ASIC group object; everything else creates the group object
/// and bulks in the members.
fn sync_group(group: &mut NextHopGroup, ctx: &mut SyncCtx<'_>) -> TaskResult<()> {
    if group.is_synced() {
        return Ok(());
    }

    if group.is_aliased() {
        let member_key = match group.members().keys().next().cloned() {
            Some(k) => k,
            None => return Err(TaskError::invalid_entry("empty nexthop group")),
        };

        let nh_id = member_nh_id(&member_key, ctx.svc);
        if nh_id == NULL_OBJECT_ID {
            return Err(TaskError::need_retry(format!(
                "next hop {member_key} is not synced"
            )));
        }

        group.set_id(nh_id);
        if member_key.is_intf_next_hop() {
            ctx.svc.intfs.increase_router_intf_ref_count(&member_key.alias);
        } else {
            ctx.svc.neigh.increase_next_hop_ref_count(&member_key);
        }
        return Ok(());
    }

    let group_id = ctx
        .svc
        .asic
        .create_next_hop_group()
        .map_err(|e| map_create_err(&e, "create next hop group"))?;
    group.set_id(group_id);
    ctx.svc.crm.inc_used(CrmResourceType::NextHopGroup);
    *ctx.synced_count += 1;

    let keys: Vec<NextHopKey> = group.members().keys().cloned().collect();
    sync_members(group, &keys, ctx)
}

/// Tear a group down. Aliased and temporary groups only release refcounts;
/// real groups remove members then the group object.
fn remove_group(group: &mut NextHopGroup, ctx: &mut SyncCtx<'_>) -> TaskResult<()> {
    if !group.is_synced() {
        return Ok(());
    }

    if group.is_temp() || group.is_aliased() {
        if let Some(member_key) = group.members().keys().next().cloned() {
            release_next_hop(&member_key, ctx.svc);
        }
        group.set_id(NULL_OBJECT_ID);
        return Ok(());
    }

    let svc = ctx.svc;
    let keys: Vec<NextHopKey> = group.members().keys().cloned().collect();
    for key in &keys {
        if let Some(member) = group.members_mut().get_mut(key) {
            remove_member(member, svc)?;
        }
    }

    if let Err(e) = svc.asic.remove_next_hop_group(group.id()) {
        match map_remove_err(&e, "remove next hop group") {
            TaskError::Ignored { .. } => {}
            err => return Err(err),
        }
    }

    svc.crm.dec_used(CrmResourceType::NextHopGroup);
    *ctx.synced_count = ctx.synced_count.saturating_sub(1);
    group.set_id(NULL_OBJECT_ID);
    Ok(())
}

/// Apply a new key to a synced real group: update weights on retained
/// members, remove absent members first to free ASIC slots, add the new
/// ones, then sync everything to recover earlier failures.
fn update_group(
    group: &mut NextHopGroup,
    new_key: NextHopGroupKey,
    ctx: &mut SyncCtx<'_>,
) -> TaskResult<()> {
    if !group.is_synced()
        || (!group.is_recursive() && (group.members().len() == 1 || new_key.size() == 1))
    {
        // Shape change between aliased and real form: rebuild from scratch.
        let was_temp = group.is_temp();
        let was_recursive = group.is_recursive();
        remove_group(group, ctx)?;
        *group = NextHopGroup::new(new_key, false);
        group.set_recursive(was_recursive || was_temp);
        return sync_group(group, ctx);
    }

    group.set_key(new_key.clone());

    let mut removed_keys = Vec::new();
    let mut weight_updates = Vec::new();
    for member in group.members().values() {
        match new_key.next_hops().get(&member.key) {
            None => removed_keys.push(member.key.clone()),
            Some(new_nh) => {
                if new_nh.weight != 0 && member.weight() != new_nh.weight {
                    weight_updates.push((member.key.clone(), new_nh.weight));
                }
            }
        }
    }
    let added: Vec<NextHopKey> = new_key
        .next_hops()
        .iter()
        .filter(|nh| !group.has_member(nh))
        .cloned()
        .collect();

    for (key, weight) in weight_updates {
        if let Some(member) = group.members_mut().get_mut(&key) {
            if member.is_synced() {
                if let Err(e) = ctx.svc.asic.set_group_member_weight(member.gm_id, weight) {
                    let action = e
                        .status()
                        .map(classify_set_status)
                        .unwrap_or(StatusAction::Fatal);
                    let mapped = match action {
                        StatusAction::Handled => None,
                        StatusAction::Retry => {
                            Some(TaskError::need_retry(format!("set weight: {e}")))
                        }
                        StatusAction::Fatal => {
                            Some(TaskError::asic_failure(format!("set weight: {e}")))
                        }
                    };
                    if let Some(err) = mapped {
                        warn!(nexthop = %key, error = %err, "failed to update member weight");
                        return Err(err);
                    }
                }
            }
            member.key.weight = weight;
        }
    }

    for key in &removed_keys {
        if let Some(member) = group.members_mut().get_mut(key) {
            remove_member(member, ctx.svc)?;
        }
    }
    for key in &removed_keys {
        group.members_mut().remove(key);
    }

    for nh in added {
        group
            .members_mut()
            .insert(nh.clone(), NextHopGroupMember::new(nh));
    }

    let keys: Vec<NextHopKey> = group.members().keys().cloned().collect();
    sync_members(group, &keys, ctx)
}

fn validate_in_group(
    group: &mut NextHopGroup,
    nh: &NextHopKey,
    ctx: &mut SyncCtx<'_>,
) -> TaskResult<()> {
    if group.is_recursive() || group.members().len() > 1 {
        sync_members(group, std::slice::from_ref(nh), ctx)
    } else {
        Ok(())
    }
}

fn invalidate_in_group(
    group: &mut NextHopGroup,
    nh: &NextHopKey,
    ctx: &mut SyncCtx<'_>,
) -> TaskResult<()> {
    if group.is_recursive() || group.members().len() > 1 {
        if let Some(member) = group.members_mut().get_mut(nh) {
            remove_member(member, ctx.svc)?;
        }
    }
    Ok(())
}

/// Build a temporary group from one resolvable member of the key, chosen
/// uniformly at random. Returns `None` when no member is resolvable.
fn create_temp_group(
    nhg_key: &NextHopGroupKey,
    svc: &NhgServices,
    chooser: &MemberChooser,
) -> Option<NextHopGroup> {
    let valid: Vec<&NextHopKey> = nhg_key
        .next_hops()
        .iter()
        .filter(|nh| svc.neigh.is_neighbor_resolved(nh))
        .collect();
    if valid.is_empty() {
        return None;
    }

    let mut chosen = valid[chooser(valid.len()).min(valid.len() - 1)].clone();
    chosen.weight = 0;
    Some(NextHopGroup::new(NextHopGroupKey::single(chosen), true))
}
