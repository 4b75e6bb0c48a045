//! VRF subsystem contract.

use fib_asic::{RawObjectId, NULL_OBJECT_ID};
use std::collections::HashMap;
use std::sync::Mutex;

/// Calls the orchestrators make against the VRF subsystem.
pub trait VrfApi: Send + Sync {
    fn vrf_exists(&self, name: &str) -> bool;
    /// Virtual-router id; `"default"` maps to the global router.
    fn get_vrf_id(&self, name: &str) -> RawObjectId;
    fn increase_vrf_ref_count(&self, name: &str);
    fn decrease_vrf_ref_count(&self, name: &str);
    fn vrf_ref_count(&self, name: &str) -> u32;
}

struct VrfEntry {
    vrf_id: RawObjectId,
    ref_count: u32,
}

/// In-memory VRF registry.
pub struct VrfRegistry {
    default_vr_id: RawObjectId,
    vrfs: Mutex<HashMap<String, VrfEntry>>,
}

impl VrfRegistry {
    pub fn new(default_vr_id: RawObjectId) -> Self {
        Self {
            default_vr_id,
            vrfs: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_vrf(&self, name: &str, vrf_id: RawObjectId) {
        self.vrfs.lock().unwrap().insert(
            name.to_string(),
            VrfEntry {
                vrf_id,
                ref_count: 0,
            },
        );
    }

    pub fn remove_vrf(&self, name: &str) {
        self.vrfs.lock().unwrap().remove(name);
    }
}

impl VrfApi for VrfRegistry {
    fn vrf_exists(&self, name: &str) -> bool {
        self.vrfs.lock().unwrap().contains_key(name)
    }

    fn get_vrf_id(&self, name: &str) -> RawObjectId {
        if name.is_empty() || name == "default" {
            return self.default_vr_id;
        }
        self.vrfs
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.vrf_id)
            .unwrap_or(NULL_OBJECT_ID)
    }

    fn increase_vrf_ref_count(&self, name: &str) {
        if let Some(entry) = self.vrfs.lock().unwrap().get_mut(name) {
            entry.ref_count += 1;
        }
    }

    fn decrease_vrf_ref_count(&self, name: &str) {
        if let Some(entry) = self.vrfs.lock().unwrap().get_mut(name) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
    }

    fn vrf_ref_count(&self, name: &str) -> u32 {
        self.vrfs
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.ref_count)
            .unwrap_or(0)
    }
}
