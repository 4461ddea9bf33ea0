//! In-memory status cache.
//!
//! The set of targets is fixed at construction, so the key index never
//! changes and each record carries its own lock. Writers for different
//! targets never contend; a writer only excludes readers of its own record.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::db::{ServiceStatus, StatusRecord, Target};

/// Concurrent map of target ID to latest derived status.
pub struct StatusCache {
    index: HashMap<String, usize>,
    records: Vec<RwLock<StatusRecord>>,
}

impl StatusCache {
    /// Create a cache holding a neutral record for every target, in order.
    pub fn new(targets: &[Target]) -> Self {
        let mut index = HashMap::with_capacity(targets.len());
        let mut records = Vec::with_capacity(targets.len());

        for target in targets {
            if index.contains_key(&target.id) {
                continue;
            }
            index.insert(target.id.clone(), records.len());
            records.push(RwLock::new(StatusRecord::initial(target)));
        }

        Self { index, records }
    }

    /// Install the result of the latest check for one target.
    ///
    /// Returns the status the record held before the update, read under the
    /// same lock as the write, or `None` if the target is unknown.
    pub fn upsert(&self, target_id: &str, status: ServiceStatus, latency: Duration) -> Option<ServiceStatus> {
        let slot = self.records.get(*self.index.get(target_id)?)?;
        // Records are replaced field by field under the write lock and are
        // never left half-written, so a poisoned lock still holds valid data.
        let mut record = slot.write().unwrap_or_else(PoisonError::into_inner);

        let previous = record.status;
        record.status = status;
        record.latency = latency;
        Some(previous)
    }

    /// Copy of a single target's record.
    pub fn get(&self, target_id: &str) -> Option<StatusRecord> {
        let slot = self.records.get(*self.index.get(target_id)?)?;
        let record = slot.read().unwrap_or_else(PoisonError::into_inner);
        Some(record.clone())
    }

    /// Point-in-time copy of every record, in configuration order.
    ///
    /// All read locks are held together while copying so the result is one
    /// consistent cut. Writers only ever hold a single lock, so this cannot
    /// deadlock.
    pub fn snapshot_all(&self) -> Vec<StatusRecord> {
        let guards: Vec<_> = self
            .records
            .iter()
            .map(|slot| slot.read().unwrap_or_else(PoisonError::into_inner))
            .collect();
        guards.iter().map(|record| (**record).clone()).collect()
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.index.contains_key(target_id)
    }
}
