//! Producer-side bus contracts.
//!
//! The transport behind these traits is deployment-specific; the in-memory
//! implementations carry the daemons' simulation mode and the tests.

use crate::consumer::{FieldValue, KeyOpFieldsValues};
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Publisher half of a bus table.
pub trait ProducerTable: Send {
    fn set(&mut self, key: &str, fvs: Vec<FieldValue>);
    fn del(&mut self, key: &str);
}

/// A table shared between a producer and an observer (tests, the daemon's
/// consumer pump).
impl ProducerTable for Arc<Mutex<MemTable>> {
    fn set(&mut self, key: &str, fvs: Vec<FieldValue>) {
        if let Ok(mut table) = self.lock() {
            ProducerTable::set(&mut *table, key, fvs);
        }
    }

    fn del(&mut self, key: &str) {
        if let Ok(mut table) = self.lock() {
            ProducerTable::del(&mut *table, key);
        }
    }
}

/// Per-key response channel from the orchestrators back to a synchronizer.
pub trait ResponsePublisher: Send + Sync {
    fn publish(&self, table: &str, key: &str, success: bool);
}

/// In-memory producer table: applies operations to a map and records them in
/// an op log a consumer can drain.
pub struct MemTable {
    name: String,
    entries: BTreeMap<String, Vec<FieldValue>>,
    ops: VecDeque<KeyOpFieldsValues>,
}

impl MemTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
            ops: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Vec<FieldValue>> {
        self.entries.get(key)
    }

    pub fn get_field(&self, key: &str, field: &str) -> Option<&str> {
        self.entries
            .get(key)?
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain the op log, e.g. into a [`crate::Consumer`].
    pub fn drain_ops(&mut self) -> Vec<KeyOpFieldsValues> {
        self.ops.drain(..).collect()
    }
}

impl MemTable {
    pub fn table_name(&self) -> &str {
        &self.name
    }
}

impl ProducerTable for MemTable {
    fn set(&mut self, key: &str, fvs: Vec<FieldValue>) {
        self.entries.insert(key.to_string(), fvs.clone());
        self.ops.push_back(KeyOpFieldsValues::set(key, fvs));
    }

    fn del(&mut self, key: &str) {
        self.entries.remove(key);
        self.ops.push_back(KeyOpFieldsValues::del(key));
    }
}

/// In-memory response channel collecting published results.
#[derive(Default)]
pub struct MemResponseChannel {
    responses: Mutex<Vec<(String, String, bool)>>,
}

impl MemResponseChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(String, String, bool)> {
        std::mem::take(&mut self.responses.lock().unwrap())
    }
}

impl ResponsePublisher for MemResponseChannel {
    fn publish(&self, table: &str, key: &str, success: bool) {
        self.responses
            .lock()
            .unwrap()
            .push((table.to_string(), key.to_string(), success));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::fvs;

    #[test]
    fn test_mem_table_set_del() {
        let mut table = MemTable::new("ROUTE");
        table.set("Vrf10:192.168.6.0/24", fvs(&[("protocol", "bgp")]));
        assert_eq!(
            table.get_field("Vrf10:192.168.6.0/24", "protocol"),
            Some("bgp")
        );

        table.del("Vrf10:192.168.6.0/24");
        assert!(table.is_empty());

        let ops = table.drain_ops();
        assert_eq!(ops.len(), 2);
        assert!(ops[0].op.is_set());
        assert!(ops[1].op.is_del());
    }

    #[test]
    fn test_response_channel() {
        let chan = MemResponseChannel::new();
        chan.publish("ROUTE", "k1", true);
        chan.publish("ROUTE", "k2", false);
        let responses = chan.take();
        assert_eq!(responses.len(), 2);
        assert!(chan.take().is_empty());
    }
}
