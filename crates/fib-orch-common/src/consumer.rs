//! Table consumer with per-key deduplication.

use std::collections::{BTreeMap, VecDeque};

/// Operation carried by a bus entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Set,
    Del,
}

impl Operation {
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair of a bus entry.
pub type FieldValue = (String, String);

/// The unit of data moved over the state bus: key, operation, fields.
#[derive(Debug, Clone)]
pub struct KeyOpFieldsValues {
    pub key: String,
    pub op: Operation,
    /// Empty for Del operations.
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Set,
            fvs,
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Del,
            fvs: vec![],
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Helper for building field-value vectors without repeating `.to_string()`.
pub fn fvs(pairs: &[(&str, &str)]) -> Vec<FieldValue> {
    pairs
        .iter()
        .map(|(f, v)| (f.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub table_name: String,
    /// Lower runs earlier in the daemon loop.
    pub priority: i32,
}

impl ConsumerConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Pending-entry queue for one bus table.
///
/// Entries are deduplicated per key while queued:
/// - SET after SET merges, newer field values win;
/// - DEL clears queued SETs for the key;
/// - SET after DEL keeps both, in order, so a handler that sees the DEL can
///   skip it and observe the SET (coalescing contract).
pub struct Consumer {
    config: ConsumerConfig,
    to_sync: BTreeMap<String, VecDeque<KeyOpFieldsValues>>,
    pending_count: usize,
}

impl Consumer {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    pub fn add_to_sync(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries {
            self.add_entry(entry);
        }
    }

    fn add_entry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                self.pending_count -= queue.len();
                queue.clear();
                queue.push_back(entry);
                self.pending_count += 1;
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op == Operation::Set {
                        for (field, value) in entry.fvs {
                            match last.fvs.iter_mut().find(|(f, _)| *f == field) {
                                Some(existing) => existing.1 = value,
                                None => last.fvs.push((field, value)),
                            }
                        }
                        return;
                    }
                }
                queue.push_back(entry);
                self.pending_count += 1;
            }
        }
    }

    /// Remove and return every queued entry, keyed order, queue order within
    /// a key.
    pub fn drain(&mut self) -> Vec<KeyOpFieldsValues> {
        let mut result = Vec::with_capacity(self.pending_count);
        for (_key, mut queue) in std::mem::take(&mut self.to_sync) {
            while let Some(entry) = queue.pop_front() {
                result.push(entry);
            }
        }
        self.pending_count = 0;
        result
    }

    /// Put a drained entry back at the head of its key's queue so it runs
    /// first on the next tick. This is the leave-to-retry half of the bus
    /// contract.
    pub fn retry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();
        queue.push_front(entry);
        self.pending_count += 1;
    }

    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue.iter().map(move |e| {
                    format!(
                        "{} {} {:?}",
                        if e.op.is_set() { "SET" } else { "DEL" },
                        key,
                        e.fvs
                    )
                })
            })
            .collect()
    }
}
