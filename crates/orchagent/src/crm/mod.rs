//! CRM (critical resource monitoring) contract.

use std::collections::HashMap;
use std::sync::Mutex;

/// ASIC resource classes the orchestrators account against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmResourceType {
    NextHopGroup,
    NextHopGroupMember,
    Srv6MySidEntry,
    Srv6Nexthop,
}

/// Resource-counter adjustments.
pub trait CrmApi: Send + Sync {
    fn inc_used(&self, resource: CrmResourceType);
    fn dec_used(&self, resource: CrmResourceType);
    fn used(&self, resource: CrmResourceType) -> u64;
}

/// In-memory CRM counters.
#[derive(Default)]
pub struct CrmCounters {
    used: Mutex<HashMap<CrmResourceType, u64>>,
}

impl CrmCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrmApi for CrmCounters {
    fn inc_used(&self, resource: CrmResourceType) {
        *self.used.lock().unwrap().entry(resource).or_insert(0) += 1;
    }

    fn dec_used(&self, resource: CrmResourceType) {
        let mut used = self.used.lock().unwrap();
        if let Some(count) = used.get_mut(&resource) {
            *count = count.saturating_sub(1);
        }
    }

    fn used(&self, resource: CrmResourceType) -> u64 {
        self.used
            .lock()
            .unwrap()
            .get(&resource)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let crm = CrmCounters::new();
        crm.inc_used(CrmResourceType::NextHopGroup);
        crm.inc_used(CrmResourceType::NextHopGroup);
        crm.dec_used(CrmResourceType::NextHopGroup);
        assert_eq!(crm.used(CrmResourceType::NextHopGroup), 1);
        assert_eq!(crm.used(CrmResourceType::Srv6MySidEntry), 0);

        crm.dec_used(CrmResourceType::Srv6Nexthop);
        assert_eq!(crm.used(CrmResourceType::Srv6Nexthop), 0);
    }
}
