//! Neighbor subsystem contract.
//!
//! The neighbor orchestrator proper lives outside this crate; these are the
//! calls the group and SRv6 orchestrators make against it, plus an in-memory
//! registry used by tests and the daemon's simulation mode. Neighbor events
//! are delivered synchronously by the daemon loop before the next bus entry
//! is processed.

use crate::route::{NextHopFlags, NextHopKey};
use fib_asic::{RawObjectId, NULL_OBJECT_ID};
use fib_types::IpAddress;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A neighbor add/delete event.
#[derive(Debug, Clone)]
pub struct NeighborUpdate {
    pub ip_address: IpAddress,
    pub alias: String,
    pub add: bool,
}

impl NeighborUpdate {
    /// The next-hop identity this neighbor resolves.
    pub fn next_hop(&self) -> NextHopKey {
        NextHopKey::new(self.ip_address, self.alias.clone())
    }
}

/// Observer half of the neighbor subject.
pub trait NeighborObserver {
    fn on_neighbor_update(&mut self, update: &NeighborUpdate);
}

/// Calls the orchestrators make against the neighbor subsystem.
pub trait NeighborApi: Send + Sync {
    /// True when a programmed next-hop object exists for this key.
    fn has_next_hop(&self, nh: &NextHopKey) -> bool;

    /// ASIC id of the next-hop object, null when absent.
    fn get_next_hop_id(&self, nh: &NextHopKey) -> RawObjectId;

    /// True when the underlying (ip, interface) neighbor is resolved, even
    /// if no labeled/SRv6 object has been derived from it yet.
    fn is_neighbor_resolved(&self, nh: &NextHopKey) -> bool;

    fn increase_next_hop_ref_count(&self, nh: &NextHopKey);
    fn decrease_next_hop_ref_count(&self, nh: &NextHopKey);
    fn next_hop_ref_count(&self, nh: &NextHopKey) -> u32;

    /// Register (non-null id) or deregister (null id) an SRv6 next-hop
    /// object created by the SRv6 orchestrator.
    fn update_srv6_next_hop(&self, nh: &NextHopKey, next_hop_id: RawObjectId);

    /// Derive a labeled next-hop object over an already-resolved neighbor.
    fn add_labeled_next_hop(&self, nh: &NextHopKey) -> bool;

    fn is_next_hop_flag_set(&self, nh: &NextHopKey, flag: NextHopFlags) -> bool;

    /// Kick ARP/NDP resolution for an unresolved neighbor.
    fn resolve_neighbor(&self, nh: &NextHopKey);
}

#[derive(Default)]
struct NeighborState {
    /// Programmed next-hop objects, including derived labeled/SRv6 ones.
    next_hops: HashMap<NextHopKey, RawObjectId>,
    ref_counts: HashMap<NextHopKey, u32>,
    /// Resolved (ip, interface) neighbors.
    resolved: HashMap<(IpAddress, String), RawObjectId>,
    flags: HashMap<NextHopKey, NextHopFlags>,
    pending_updates: VecDeque<NeighborUpdate>,
    next_id: RawObjectId,
}

/// In-memory neighbor registry.
pub struct NeighborRegistry {
    state: Mutex<NeighborState>,
}

impl Default for NeighborRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NeighborState {
                next_id: 0x30000,
                ..NeighborState::default()
            }),
        }
    }

    /// Resolve a neighbor and queue the add event.
    pub fn add_neighbor(&self, ip_address: IpAddress, alias: &str) -> RawObjectId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.resolved.insert((ip_address, alias.to_string()), id);
        let nh = NextHopKey::new(ip_address, alias);
        state.next_hops.insert(nh, id);
        state.pending_updates.push_back(NeighborUpdate {
            ip_address,
            alias: alias.to_string(),
            add: true,
        });
        id
    }

    /// Remove a neighbor and queue the delete event.
    pub fn remove_neighbor(&self, ip_address: IpAddress, alias: &str) {
        let mut state = self.state.lock().unwrap();
        state.resolved.remove(&(ip_address, alias.to_string()));
        let nh = NextHopKey::new(ip_address, alias);
        state.next_hops.remove(&nh);
        state.pending_updates.push_back(NeighborUpdate {
            ip_address,
            alias: alias.to_string(),
            add: false,
        });
    }

    /// Drain queued events for synchronous delivery to subscribers.
    pub fn drain_updates(&self) -> Vec<NeighborUpdate> {
        self.state.lock().unwrap().pending_updates.drain(..).collect()
    }

    pub fn set_flag(&self, nh: &NextHopKey, flag: NextHopFlags, set: bool) {
        let mut state = self.state.lock().unwrap();
        let entry = state.flags.entry(nh.clone()).or_default();
        if set {
            entry.insert(flag);
        } else {
            entry.remove(flag);
        }
    }
}

impl NeighborApi for NeighborRegistry {
    fn has_next_hop(&self, nh: &NextHopKey) -> bool {
        self.state.lock().unwrap().next_hops.contains_key(nh)
    }

    fn get_next_hop_id(&self, nh: &NextHopKey) -> RawObjectId {
        self.state
            .lock()
            .unwrap()
            .next_hops
            .get(nh)
            .copied()
            .unwrap_or(NULL_OBJECT_ID)
    }

    fn is_neighbor_resolved(&self, nh: &NextHopKey) -> bool {
        self.state
            .lock()
            .unwrap()
            .resolved
            .contains_key(&(nh.ip_address, nh.alias.clone()))
    }

    fn increase_next_hop_ref_count(&self, nh: &NextHopKey) {
        let mut state = self.state.lock().unwrap();
        *state.ref_counts.entry(nh.clone()).or_insert(0) += 1;
    }

    fn decrease_next_hop_ref_count(&self, nh: &NextHopKey) {
        let mut state = self.state.lock().unwrap();
        if let Some(count) = state.ref_counts.get_mut(nh) {
            *count = count.saturating_sub(1);
        }
    }

    fn next_hop_ref_count(&self, nh: &NextHopKey) -> u32 {
        self.state
            .lock()
            .unwrap()
            .ref_counts
            .get(nh)
            .copied()
            .unwrap_or(0)
    }

    fn update_srv6_next_hop(&self, nh: &NextHopKey, next_hop_id: RawObjectId) {
        let mut state = self.state.lock().unwrap();
        if next_hop_id == NULL_OBJECT_ID {
            state.next_hops.remove(nh);
        } else {
            state.next_hops.insert(nh.clone(), next_hop_id);
        }
    }

    fn add_labeled_next_hop(&self, nh: &NextHopKey) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state
            .resolved
            .contains_key(&(nh.ip_address, nh.alias.clone()))
        {
            return false;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.next_hops.insert(nh.clone(), id);
        true
    }

    fn is_next_hop_flag_set(&self, nh: &NextHopKey, flag: NextHopFlags) -> bool {
        self.state
            .lock()
            .unwrap()
            .flags
            .get(nh)
            .map(|f| f.contains(flag))
            .unwrap_or(false)
    }

    fn resolve_neighbor(&self, _nh: &NextHopKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nh(ip: &str, alias: &str) -> NextHopKey {
        NextHopKey::new(ip.parse().unwrap(), alias)
    }

    #[test]
    fn test_add_remove_neighbor() {
        let registry = NeighborRegistry::new();
        let key = nh("10.0.0.1", "Ethernet0");
        assert!(!registry.has_next_hop(&key));

        let id = registry.add_neighbor(key.ip_address, "Ethernet0");
        assert!(registry.has_next_hop(&key));
        assert!(registry.is_neighbor_resolved(&key));
        assert_eq!(registry.get_next_hop_id(&key), id);

        registry.remove_neighbor(key.ip_address, "Ethernet0");
        assert!(!registry.has_next_hop(&key));

        let updates = registry.drain_updates();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].add);
        assert!(!updates[1].add);
    }

    #[test]
    fn test_ref_counts() {
        let registry = NeighborRegistry::new();
        let key = nh("10.0.0.1", "Ethernet0");
        registry.increase_next_hop_ref_count(&key);
        registry.increase_next_hop_ref_count(&key);
        assert_eq!(registry.next_hop_ref_count(&key), 2);
        registry.decrease_next_hop_ref_count(&key);
        assert_eq!(registry.next_hop_ref_count(&key), 1);
    }

    #[test]
    fn test_ifdown_flag() {
        let registry = NeighborRegistry::new();
        let key = nh("10.0.0.1", "Ethernet0");
        assert!(!registry.is_next_hop_flag_set(&key, NextHopFlags::IF_DOWN));
        registry.set_flag(&key, NextHopFlags::IF_DOWN, true);
        assert!(registry.is_next_hop_flag_set(&key, NextHopFlags::IF_DOWN));
        registry.set_flag(&key, NextHopFlags::IF_DOWN, false);
        assert!(!registry.is_next_hop_flag_set(&key, NextHopFlags::IF_DOWN));
    }

    #[test]
    fn test_srv6_next_hop_registration() {
        let registry = NeighborRegistry::new();
        let mut key = nh("0.0.0.0", "");
        key.srv6_source = "fc00:0:1:1::1".to_string();

        registry.update_srv6_next_hop(&key, 0x999);
        assert!(registry.has_next_hop(&key));
        registry.update_srv6_next_hop(&key, NULL_OBJECT_ID);
        assert!(!registry.has_next_hop(&key));
    }
}
