//! Key-value state machine driven by committed log entries.
//!
//! The store is a plain in-memory map. It is mutated only by the applier,
//! which feeds it committed log entries in index order, so no locking or
//! versioning is needed: replicas that apply the same log prefix hold the
//! same map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Command payload carried inside a log entry.
///
/// The consensus core treats this as opaque; only the applier interprets
/// it. Commands other than `Set` leave the map untouched. Externally
/// tagged so that bincode, which is not self-describing, can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Store `value` under `key`, overwriting any previous value.
    Set { key: String, value: String },
    /// Reserved slot; applied as a no-op.
    Noop,
}

/// The replicated key-value map.
#[derive(Debug, Default)]
pub struct KvStore {
    pairs: HashMap<String, String>,
}

impl KvStore {
    pub fn new() -> Self {
        Self {
            pairs: HashMap::new(),
        }
    }

    /// Apply a committed command to the map.
    pub fn apply(&mut self, command: &Command) {
        match command {
            Command::Set { key, value } => {
                self.pairs.insert(key.clone(), value.clone());
            }
            Command::Noop => {}
        }
    }

    /// Read the current value for a key from the applied state.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_set() {
        let mut kv = KvStore::new();
        kv.apply(&Command::Set {
            key: "x".into(),
            value: "1".into(),
        });

        assert_eq!(kv.get("x"), Some("1"));
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_apply_overwrites() {
        let mut kv = KvStore::new();
        kv.apply(&Command::Set {
            key: "x".into(),
            value: "1".into(),
        });
        kv.apply(&Command::Set {
            key: "x".into(),
            value: "2".into(),
        });

        assert_eq!(kv.get("x"), Some("2"));
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_noop_leaves_map_untouched() {
        let mut kv = KvStore::new();
        kv.apply(&Command::Noop);

        assert!(kv.is_empty());
        assert_eq!(kv.get("x"), None);
    }

    #[test]
    fn test_command_roundtrips_through_bincode() {
        // Payloads must survive the trip through the wire frames and the
        // durable blob unchanged.
        let cmd = Command::Set {
            key: "k".into(),
            value: "v".into(),
        };
        let bytes = bincode::serialize(&cmd).unwrap();
        let back: Command = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, cmd);

        let noop = bincode::serialize(&Command::Noop).unwrap();
        assert_eq!(
            bincode::deserialize::<Command>(&noop).unwrap(),
            Command::Noop
        );
    }
}
