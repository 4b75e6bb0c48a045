//! Routing protocol name database.
//!
//! Kernel route messages carry a numeric protocol; the table format follows
//! the iproute2 `rt_protos` file.

use std::collections::HashMap;
use std::path::Path;

/// Default path to the protocol name database provided by iproute2.
pub const DEFAULT_RT_PROTOS_PATH: &str = "/etc/iproute2/rt_protos";

pub struct ProtocolDb {
    names: HashMap<u8, String>,
}

impl ProtocolDb {
    /// The well-known iproute2 assignments.
    pub fn builtin() -> Self {
        let mut db = Self {
            names: HashMap::new(),
        };
        for (num, name) in [
            (0u8, "unspec"),
            (1, "redirect"),
            (2, "kernel"),
            (3, "boot"),
            (4, "static"),
            (8, "gated"),
            (9, "ra"),
            (10, "mrt"),
            (11, "zebra"),
            (12, "bird"),
            (13, "dnrouted"),
            (14, "xorp"),
            (15, "ntk"),
            (16, "dhcp"),
            (42, "babel"),
            (186, "bgp"),
            (187, "isis"),
            (188, "ospf"),
            (189, "rip"),
            (192, "eigrp"),
        ] {
            db.names.insert(num, name.to_string());
        }
        db
    }

    /// Parse `rt_protos` content: `<number> <name>` per line, `#` comments.
    /// Unparsable lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut db = Self {
            names: HashMap::new(),
        };
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(num), Some(name)) = (fields.next(), fields.next()) else {
                continue;
            };
            if let Ok(num) = num.parse::<u8>() {
                db.names.insert(num, name.to_string());
            }
        }
        db
    }

    /// Load from disk, falling back to the builtin table.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::builtin(),
        }
    }

    pub fn name(&self, protocol: u8) -> Option<&str> {
        self.names.get(&protocol).map(String::as_str)
    }

    /// Name if known, numeric string otherwise.
    pub fn resolve(&self, protocol: u8) -> String {
        match self.name(protocol) {
            Some(name) => name.to_string(),
            None => protocol.to_string(),
        }
    }
}
