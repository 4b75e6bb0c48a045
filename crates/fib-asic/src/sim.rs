//! In-process ASIC implementation.
//!
//! Backs the daemons' simulation mode and the orchestrator tests: allocates
//! monotonically increasing object ids, tracks live objects per family, and
//! supports one-shot failure injection per operation.

use crate::api::{
    MySidEntryKey, MySidRequest, NextHopApi, NextHopGroupApi, NextHopGroupMemberRequest,
    SidListType, Srv6Api, Srv6NextHopRequest, TunnelApi, TunnelMapEntryRequest, TunnelRequest,
};
use crate::error::{AsicError, AsicResult, AsicStatus};
use crate::types::RawObjectId;
use fib_types::Ipv6Address;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct SimState {
    next_id: RawObjectId,
    next_hops: HashSet<RawObjectId>,
    groups: HashSet<RawObjectId>,
    group_members: HashMap<RawObjectId, NextHopGroupMemberRequest>,
    tunnels: HashSet<RawObjectId>,
    tunnel_maps: HashSet<RawObjectId>,
    tunnel_map_entries: HashSet<RawObjectId>,
    sid_lists: HashMap<RawObjectId, Vec<Ipv6Address>>,
    my_sids: HashMap<MySidEntryKey, MySidRequest>,
    fail_next: HashMap<&'static str, AsicStatus>,
    weight_sets: u64,
}

/// Simulated ASIC. Interior-mutable so it can sit behind `Arc<dyn …Api>`.
pub struct SimAsic {
    state: Mutex<SimState>,
}

impl Default for SimAsic {
    fn default() -> Self {
        Self::new()
    }
}

impl SimAsic {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 0x1000,
                ..SimState::default()
            }),
        }
    }

    /// Arrange for the next call of `op` to fail with `status`.
    pub fn inject_failure(&self, op: &'static str, status: AsicStatus) {
        self.state.lock().unwrap().fail_next.insert(op, status);
    }

    fn check_fail(state: &mut SimState, op: &'static str) -> AsicResult<()> {
        if let Some(status) = state.fail_next.remove(op) {
            return Err(AsicError::Status { status });
        }
        Ok(())
    }

    fn alloc(state: &mut SimState) -> RawObjectId {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    pub fn live_group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    pub fn live_member_count(&self) -> usize {
        self.state.lock().unwrap().group_members.len()
    }

    pub fn live_tunnel_count(&self) -> usize {
        self.state.lock().unwrap().tunnels.len()
    }

    pub fn live_tunnel_map_entry_count(&self) -> usize {
        self.state.lock().unwrap().tunnel_map_entries.len()
    }

    pub fn live_sid_list_count(&self) -> usize {
        self.state.lock().unwrap().sid_lists.len()
    }

    pub fn live_next_hop_count(&self) -> usize {
        self.state.lock().unwrap().next_hops.len()
    }

    pub fn my_sid_installed(&self, key: &MySidEntryKey) -> bool {
        self.state.lock().unwrap().my_sids.contains_key(key)
    }

    pub fn my_sid_count(&self) -> usize {
        self.state.lock().unwrap().my_sids.len()
    }

    pub fn weight_set_count(&self) -> u64 {
        self.state.lock().unwrap().weight_sets
    }

    pub fn member_request(&self, member_id: RawObjectId) -> Option<NextHopGroupMemberRequest> {
        self.state.lock().unwrap().group_members.get(&member_id).cloned()
    }
}

impl NextHopApi for SimAsic {
    fn create_srv6_next_hop(&self, req: &Srv6NextHopRequest) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_srv6_next_hop")?;
        if req.tunnel_id == 0 || !state.tunnels.contains(&req.tunnel_id) {
            return Err(AsicError::invalid_object("tunnel"));
        }
        let id = Self::alloc(&mut state);
        state.next_hops.insert(id);
        Ok(id)
    }

    fn remove_next_hop(&self, next_hop_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_next_hop")?;
        if !state.next_hops.remove(&next_hop_id) {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }
}

impl NextHopGroupApi for SimAsic {
    fn create_next_hop_group(&self) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_next_hop_group")?;
        let id = Self::alloc(&mut state);
        state.groups.insert(id);
        Ok(id)
    }

    fn remove_next_hop_group(&self, group_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_next_hop_group")?;
        if !state.groups.remove(&group_id) {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }

    fn create_group_member(&self, req: &NextHopGroupMemberRequest) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_group_member")?;
        if !state.groups.contains(&req.group_id) {
            return Err(AsicError::invalid_object("next hop group"));
        }
        if req.next_hop_id == 0 {
            return Err(AsicError::invalid_object("next hop"));
        }
        let id = Self::alloc(&mut state);
        state.group_members.insert(id, req.clone());
        Ok(id)
    }

    fn remove_group_member(&self, member_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_group_member")?;
        if state.group_members.remove(&member_id).is_none() {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }

    fn set_group_member_weight(&self, member_id: RawObjectId, weight: u32) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "set_group_member_weight")?;
        match state.group_members.get_mut(&member_id) {
            Some(req) => {
                req.weight = Some(weight);
                state.weight_sets += 1;
                Ok(())
            }
            None => Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            }),
        }
    }
}

impl TunnelApi for SimAsic {
    fn create_tunnel(&self, req: &TunnelRequest) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_tunnel")?;
        if let Some(mapper) = req.encap_mapper {
            if !state.tunnel_maps.contains(&mapper) {
                return Err(AsicError::invalid_object("tunnel map"));
            }
        }
        let id = Self::alloc(&mut state);
        state.tunnels.insert(id);
        Ok(id)
    }

    fn remove_tunnel(&self, tunnel_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_tunnel")?;
        if !state.tunnels.remove(&tunnel_id) {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }

    fn create_tunnel_map(&self) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_tunnel_map")?;
        let id = Self::alloc(&mut state);
        state.tunnel_maps.insert(id);
        Ok(id)
    }

    fn remove_tunnel_map(&self, tunnel_map_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_tunnel_map")?;
        if !state.tunnel_maps.remove(&tunnel_map_id) {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }

    fn create_tunnel_map_entry(&self, req: &TunnelMapEntryRequest) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_tunnel_map_entry")?;
        if !state.tunnel_maps.contains(&req.tunnel_map_id) {
            return Err(AsicError::invalid_object("tunnel map"));
        }
        let id = Self::alloc(&mut state);
        state.tunnel_map_entries.insert(id);
        Ok(id)
    }

    fn remove_tunnel_map_entry(&self, entry_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_tunnel_map_entry")?;
        if !state.tunnel_map_entries.remove(&entry_id) {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }
}

impl Srv6Api for SimAsic {
    fn create_sid_list(
        &self,
        segments: &[Ipv6Address],
        _list_type: SidListType,
    ) -> AsicResult<RawObjectId> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_sid_list")?;
        let id = Self::alloc(&mut state);
        state.sid_lists.insert(id, segments.to_vec());
        Ok(id)
    }

    fn set_sid_list_segments(
        &self,
        sid_list_id: RawObjectId,
        segments: &[Ipv6Address],
    ) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "set_sid_list_segments")?;
        match state.sid_lists.get_mut(&sid_list_id) {
            Some(list) => {
                *list = segments.to_vec();
                Ok(())
            }
            None => Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            }),
        }
    }

    fn remove_sid_list(&self, sid_list_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_sid_list")?;
        if state.sid_lists.remove(&sid_list_id).is_none() {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }

    fn create_my_sid(&self, req: &MySidRequest) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "create_my_sid")?;
        if state.my_sids.contains_key(&req.key) {
            return Err(AsicError::Status {
                status: AsicStatus::ItemAlreadyExists,
            });
        }
        state.my_sids.insert(req.key.clone(), req.clone());
        Ok(())
    }

    fn set_my_sid_vrf(&self, key: &MySidEntryKey, vrf_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "set_my_sid_vrf")?;
        match state.my_sids.get_mut(key) {
            Some(entry) => {
                entry.vrf_id = Some(vrf_id);
                Ok(())
            }
            None => Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            }),
        }
    }

    fn set_my_sid_next_hop(&self, key: &MySidEntryKey, next_hop_id: RawObjectId) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "set_my_sid_next_hop")?;
        match state.my_sids.get_mut(key) {
            Some(entry) => {
                entry.next_hop_id = Some(next_hop_id);
                Ok(())
            }
            None => Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            }),
        }
    }

    fn remove_my_sid(&self, key: &MySidEntryKey) -> AsicResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fail(&mut state, "remove_my_sid")?;
        if state.my_sids.remove(key).is_none() {
            return Err(AsicError::Status {
                status: AsicStatus::ItemNotFound,
            });
        }
        Ok(())
    }
}
