//! Nexthop group state objects.

use crate::route::{NextHopGroupKey, NextHopKey};
use fib_asic::{RawObjectId, NULL_OBJECT_ID};
use std::collections::BTreeMap;

/// Refcounted wrapper around an owned group object.
///
/// Referrers (route entries, parent recursive groups) hold the entry, not
/// the payload, so the payload can be swapped during temporary-group
/// promotion without disturbing them.
#[derive(Debug)]
pub struct NhgEntry<T> {
    pub nhg: T,
    pub ref_count: u32,
}

impl<T> NhgEntry<T> {
    pub fn new(nhg: T) -> Self {
        Self { nhg, ref_count: 0 }
    }
}

/// One member of a group and its ASIC member object, when programmed.
#[derive(Debug, Clone)]
pub struct NextHopGroupMember {
    pub key: NextHopKey,
    /// Group-member object id; null while the member is not on the ASIC.
    pub gm_id: RawObjectId,
}

impl NextHopGroupMember {
    pub fn new(key: NextHopKey) -> Self {
        Self {
            key,
            gm_id: NULL_OBJECT_ID,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.gm_id != NULL_OBJECT_ID
    }

    pub fn weight(&self) -> u32 {
        self.key.weight
    }
}

/// A nexthop group and its ASIC state.
///
/// Invariants:
/// - `id != null` iff the group is programmed;
/// - a temporary group has exactly one (synced) member;
/// - a non-recursive single-member group is aliased: `id` is the member's
///   underlying next-hop id and no ASIC group object exists.
#[derive(Debug)]
pub struct NextHopGroup {
    key: NextHopGroupKey,
    id: RawObjectId,
    members: BTreeMap<NextHopKey, NextHopGroupMember>,
    is_temp: bool,
    is_recursive: bool,
}

impl NextHopGroup {
    pub fn new(key: NextHopGroupKey, is_temp: bool) -> Self {
        let members = key
            .next_hops()
            .iter()
            .map(|nh| (nh.clone(), NextHopGroupMember::new(nh.clone())))
            .collect();
        Self {
            key,
            id: NULL_OBJECT_ID,
            members,
            is_temp,
            is_recursive: false,
        }
    }

    pub fn key(&self) -> &NextHopGroupKey {
        &self.key
    }

    pub fn id(&self) -> RawObjectId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: RawObjectId) {
        self.id = id;
    }

    pub(crate) fn set_key(&mut self, key: NextHopGroupKey) {
        self.key = key;
    }

    pub fn is_synced(&self) -> bool {
        self.id != NULL_OBJECT_ID
    }

    pub fn is_temp(&self) -> bool {
        self.is_temp
    }

    pub fn is_recursive(&self) -> bool {
        self.is_recursive
    }

    pub fn set_recursive(&mut self, recursive: bool) {
        self.is_recursive = recursive;
    }

    pub fn has_member(&self, nh: &NextHopKey) -> bool {
        self.members.contains_key(nh)
    }

    pub fn members(&self) -> &BTreeMap<NextHopKey, NextHopGroupMember> {
        &self.members
    }

    pub(crate) fn members_mut(&mut self) -> &mut BTreeMap<NextHopKey, NextHopGroupMember> {
        &mut self.members
    }

    pub fn synced_member_count(&self) -> usize {
        self.members.values().filter(|m| m.is_synced()).count()
    }

    /// True when the group is aliased to its only member's next-hop id
    /// rather than backed by an ASIC group object.
    pub fn is_aliased(&self) -> bool {
        !self.is_recursive && self.members.len() == 1
    }
}
