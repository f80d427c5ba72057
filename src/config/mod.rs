//! Configuration module for raftkv.

use crate::error::{KvError, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_election_timeout_min() -> u64 {
    150
}

fn default_election_timeout_max() -> u64 {
    300
}

fn default_heartbeat_ms() -> u64 {
    50
}

/// A peer entry in the cluster map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer node identifier.
    pub id: NodeId,
    /// Peer host name or address.
    pub host: String,
    /// Peer Raft port.
    pub port: u16,
}

impl PeerConfig {
    /// The peer's dialable address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Main configuration for a raftkv node. Static after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's unique identifier.
    pub id: NodeId,
    /// The other members of the cluster (not including this node).
    pub peers: Vec<PeerConfig>,
    /// Bind address for client traffic (set/get/echo).
    pub client_endpoint: String,
    /// Bind address for peer traffic (vote/append).
    pub peer_endpoint: String,
    /// Minimum election timeout in milliseconds.
    #[serde(default = "default_election_timeout_min")]
    pub election_timeout_ms_min: u64,
    /// Maximum election timeout in milliseconds.
    #[serde(default = "default_election_timeout_max")]
    pub election_timeout_ms_max: u64,
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Path of the durable state blob.
    pub storage_path: PathBuf,
}

impl NodeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KvError::Config(format!("failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| KvError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.peers.iter().any(|p| p.id == self.id) {
            return Err(KvError::InvalidConfig {
                field: "peers".to_string(),
                reason: format!("peer list must not contain this node's id ({})", self.id),
            });
        }

        if self.election_timeout_ms_min == 0
            || self.election_timeout_ms_min > self.election_timeout_ms_max
        {
            return Err(KvError::InvalidConfig {
                field: "election_timeout_ms_min".to_string(),
                reason: "must be nonzero and not above election_timeout_ms_max".to_string(),
            });
        }

        if self.heartbeat_ms == 0 {
            return Err(KvError::InvalidConfig {
                field: "heartbeat_ms".to_string(),
                reason: "heartbeat interval must be nonzero".to_string(),
            });
        }

        if self.heartbeat_ms >= self.election_timeout_ms_min {
            return Err(KvError::InvalidConfig {
                field: "heartbeat_ms".to_string(),
                reason: "heartbeat interval must be below the election timeout".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.id) {
                return Err(KvError::InvalidConfig {
                    field: "peers".to_string(),
                    reason: format!("duplicate peer id {}", peer.id),
                });
            }
        }

        Ok(())
    }

    /// Peer ids only, for the consensus core.
    pub fn peer_ids(&self) -> Vec<NodeId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    /// Peer id to address map, for the transport.
    pub fn peer_addrs(&self) -> HashMap<NodeId, String> {
        self.peers.iter().map(|p| (p.id, p.addr())).collect()
    }

    pub fn election_timeout_min(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms_min)
    }

    pub fn election_timeout_max(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms_max)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// A minimal single-node development configuration.
    pub fn development() -> Self {
        Self {
            id: 1,
            peers: vec![],
            client_endpoint: "127.0.0.1:7001".to_string(),
            peer_endpoint: "127.0.0.1:8001".to_string(),
            election_timeout_ms_min: default_election_timeout_min(),
            election_timeout_ms_max: default_election_timeout_max(),
            heartbeat_ms: default_heartbeat_ms(),
            storage_path: PathBuf::from("/tmp/raftkv/node-1.state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_node_config() -> NodeConfig {
        NodeConfig {
            id: 1,
            peers: vec![
                PeerConfig {
                    id: 2,
                    host: "127.0.0.1".into(),
                    port: 8002,
                },
                PeerConfig {
                    id: 3,
                    host: "127.0.0.1".into(),
                    port: 8003,
                },
            ],
            client_endpoint: "127.0.0.1:7001".into(),
            peer_endpoint: "127.0.0.1:8001".into(),
            election_timeout_ms_min: 150,
            election_timeout_ms_max: 300,
            heartbeat_ms: 50,
            storage_path: PathBuf::from("/tmp/raftkv/node-1.state"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(three_node_config().validate().is_ok());
    }

    #[test]
    fn test_self_in_peer_list_rejected() {
        let mut config = three_node_config();
        config.peers[0].id = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_peer_rejected() {
        let mut config = three_node_config();
        config.peers[1].id = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_timeout_range_rejected() {
        let mut config = three_node_config();
        config.election_timeout_ms_min = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_must_undercut_election_timeout() {
        let mut config = three_node_config();
        config.heartbeat_ms = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_default_when_absent() {
        let json = r#"{
            "id": 1,
            "peers": [],
            "client_endpoint": "127.0.0.1:7001",
            "peer_endpoint": "127.0.0.1:8001",
            "storage_path": "/tmp/raftkv/node-1.state"
        }"#;
        let config: NodeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.election_timeout_ms_min, 150);
        assert_eq!(config.election_timeout_ms_max, 300);
        assert_eq!(config.heartbeat_ms, 50);
    }

    #[test]
    fn test_peer_addrs() {
        let config = three_node_config();
        let addrs = config.peer_addrs();
        assert_eq!(addrs.get(&2).map(String::as_str), Some("127.0.0.1:8002"));
        assert_eq!(addrs.get(&3).map(String::as_str), Some("127.0.0.1:8003"));
    }
}
