//! Bulking front-end for group-member creation.
//!
//! Mirrors the driver-side object bulker: callers queue member requests
//! tagged with their own key, then flush once. Per-member failures come back
//! as a null id instead of aborting the whole batch.

use crate::api::{NextHopGroupApi, NextHopGroupMemberRequest};
use crate::types::{RawObjectId, NULL_OBJECT_ID};
use tracing::warn;

pub struct MemberBulker<K> {
    pending: Vec<(K, NextHopGroupMemberRequest)>,
    max_bulk_size: usize,
}

impl<K: Clone + std::fmt::Debug> MemberBulker<K> {
    pub fn new(max_bulk_size: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_bulk_size: max_bulk_size.max(1),
        }
    }

    pub fn create_entry(&mut self, key: K, req: NextHopGroupMemberRequest) {
        self.pending.push((key, req));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Issue every queued create in submission order, chunked to the bulk
    /// size. Returns `(key, member id)` pairs; a null id marks a per-member
    /// failure.
    pub fn flush(&mut self, api: &dyn NextHopGroupApi) -> Vec<(K, RawObjectId)> {
        let pending = std::mem::take(&mut self.pending);
        let mut results = Vec::with_capacity(pending.len());

        for chunk in pending.chunks(self.max_bulk_size) {
            for (key, req) in chunk {
                match api.create_group_member(req) {
                    Ok(id) => results.push((key.clone(), id)),
                    Err(e) => {
                        warn!(key = ?key, error = %e, "bulk member create failed");
                        results.push((key.clone(), NULL_OBJECT_ID));
                    }
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AsicError, AsicResult, AsicStatus};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingApi {
        next_id: AtomicU64,
        fail_on_nh: RawObjectId,
    }

    impl NextHopGroupApi for CountingApi {
        fn create_next_hop_group(&self) -> AsicResult<RawObjectId> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }
        fn remove_next_hop_group(&self, _: RawObjectId) -> AsicResult<()> {
            Ok(())
        }
        fn create_group_member(&self, req: &NextHopGroupMemberRequest) -> AsicResult<RawObjectId> {
            if req.next_hop_id == self.fail_on_nh {
                return Err(AsicError::Status {
                    status: AsicStatus::TableFull,
                });
            }
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }
        fn remove_group_member(&self, _: RawObjectId) -> AsicResult<()> {
            Ok(())
        }
        fn set_group_member_weight(&self, _: RawObjectId, _: u32) -> AsicResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_flush_returns_ids_in_order() {
        let api = CountingApi {
            next_id: AtomicU64::new(0x5000),
            fail_on_nh: 0,
        };
        let mut bulker: MemberBulker<u32> = MemberBulker::new(2);
        for i in 0..5u32 {
            bulker.create_entry(
                i,
                NextHopGroupMemberRequest {
                    group_id: 0x4000,
                    next_hop_id: 0x3000 + u64::from(i),
                    weight: None,
                },
            );
        }
        assert_eq!(bulker.pending_count(), 5);

        let results = bulker.flush(&api);
        assert_eq!(results.len(), 5);
        assert_eq!(bulker.pending_count(), 0);
        for (i, (key, id)) in results.iter().enumerate() {
            assert_eq!(*key, i as u32);
            assert_ne!(*id, NULL_OBJECT_ID);
        }
    }

    #[test]
    fn test_per_member_failure_is_null_id() {
        let api = CountingApi {
            next_id: AtomicU64::new(0x5000),
            fail_on_nh: 0x3001,
        };
        let mut bulker: MemberBulker<u32> = MemberBulker::new(8);
        for i in 0..3u32 {
            bulker.create_entry(
                i,
                NextHopGroupMemberRequest {
                    group_id: 0x4000,
                    next_hop_id: 0x3000 + u64::from(i),
                    weight: Some(1),
                },
            );
        }

        let results = bulker.flush(&api);
        assert_eq!(results.len(), 3);
        assert_ne!(results[0].1, NULL_OBJECT_ID);
        assert_eq!(results[1].1, NULL_OBJECT_ID);
        assert_ne!(results[2].1, NULL_OBJECT_ID);
    }
}
