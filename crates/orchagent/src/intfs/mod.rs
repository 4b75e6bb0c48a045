//! Router-interface subsystem contract.

use fib_asic::{RawObjectId, NULL_OBJECT_ID};
use std::collections::HashMap;
use std::sync::Mutex;

/// Calls the orchestrators make against the interface subsystem.
pub trait InterfaceApi: Send + Sync {
    /// Router-interface id for an interface alias, null when unknown.
    fn get_router_intf_id(&self, alias: &str) -> RawObjectId;
    fn increase_router_intf_ref_count(&self, alias: &str);
    fn decrease_router_intf_ref_count(&self, alias: &str);
    fn router_intf_ref_count(&self, alias: &str) -> u32;
}

struct RifEntry {
    rif_id: RawObjectId,
    ref_count: u32,
}

/// In-memory interface registry.
#[derive(Default)]
pub struct InterfaceRegistry {
    rifs: Mutex<HashMap<String, RifEntry>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_router_intf(&self, alias: &str, rif_id: RawObjectId) {
        self.rifs.lock().unwrap().insert(
            alias.to_string(),
            RifEntry {
                rif_id,
                ref_count: 0,
            },
        );
    }
}

impl InterfaceApi for InterfaceRegistry {
    fn get_router_intf_id(&self, alias: &str) -> RawObjectId {
        self.rifs
            .lock()
            .unwrap()
            .get(alias)
            .map(|e| e.rif_id)
            .unwrap_or(NULL_OBJECT_ID)
    }

    fn increase_router_intf_ref_count(&self, alias: &str) {
        if let Some(entry) = self.rifs.lock().unwrap().get_mut(alias) {
            entry.ref_count += 1;
        }
    }

    fn decrease_router_intf_ref_count(&self, alias: &str) {
        if let Some(entry) = self.rifs.lock().unwrap().get_mut(alias) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
    }

    fn router_intf_ref_count(&self, alias: &str) -> u32 {
        self.rifs
            .lock()
            .unwrap()
            .get(alias)
            .map(|e| e.ref_count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rif_lookup_and_refcount() {
        let registry = InterfaceRegistry::new();
        assert_eq!(registry.get_router_intf_id("Ethernet0"), NULL_OBJECT_ID);

        registry.add_router_intf("Ethernet0", 0x6000);
        assert_eq!(registry.get_router_intf_id("Ethernet0"), 0x6000);

        registry.increase_router_intf_ref_count("Ethernet0");
        assert_eq!(registry.router_intf_ref_count("Ethernet0"), 1);
        registry.decrease_router_intf_ref_count("Ethernet0");
        assert_eq!(registry.router_intf_ref_count("Ethernet0"), 0);
    }
}
