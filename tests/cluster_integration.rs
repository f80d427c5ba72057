//! Cluster integration tests.
//!
//! Spins up full nodes (listeners, outbound workers, timers, consensus
//! cores) on localhost TCP and drives them through the client wire
//! protocol. Elections run on real randomized timers, so assertions poll
//! with generous deadlines instead of assuming a schedule.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use raftkv::config::{NodeConfig, PeerConfig};
use raftkv::net::client;
use raftkv::raft::{ClientRequest, ClientResponse};
use raftkv::types::NodeId;
use raftkv::Server;

// =============================================================================
// Harness
// =============================================================================

/// Overall deadline for cluster-level conditions (elections included).
const DEADLINE: Duration = Duration::from_secs(15);
const POLL: Duration = Duration::from_millis(50);

fn node_config(id: NodeId, ids: &[NodeId], base_port: u16, dir: &Path) -> NodeConfig {
    let peers = ids
        .iter()
        .filter(|&&p| p != id)
        .map(|&p| PeerConfig {
            id: p,
            host: "127.0.0.1".into(),
            port: base_port + p,
        })
        .collect();

    NodeConfig {
        id,
        peers,
        client_endpoint: format!("127.0.0.1:{}", base_port + 100 + id),
        peer_endpoint: format!("127.0.0.1:{}", base_port + id),
        election_timeout_ms_min: 150,
        election_timeout_ms_max: 300,
        heartbeat_ms: 50,
        storage_path: dir.join(format!("node-{}.state", id)),
    }
}

async fn start_cluster(ids: &[NodeId], base_port: u16, dir: &Path) -> Vec<Server> {
    let mut servers = Vec::new();
    for &id in ids {
        let config = node_config(id, ids, base_port, dir);
        servers.push(Server::start(config).await.unwrap());
    }
    servers
}

/// Wait until exactly one node reports leader and return its index.
async fn wait_for_leader(servers: &[Server]) -> usize {
    timeout(DEADLINE, async {
        loop {
            let mut leader = None;
            let mut leaders = 0;
            for (i, server) in servers.iter().enumerate() {
                let status = server.status().await.unwrap();
                if status.role == "leader" {
                    leaders += 1;
                    leader = Some(i);
                }
            }
            if leaders == 1 {
                return leader.unwrap();
            }
            sleep(POLL).await;
        }
    })
    .await
    .expect("cluster should elect a leader")
}

async fn set(addr: &str, key: &str, value: &str) -> (bool, Option<NodeId>) {
    let response = client::request(
        addr,
        &ClientRequest::Set {
            key: key.into(),
            value: value.into(),
        },
    )
    .await
    .unwrap();
    match response {
        ClientResponse::Set { ok, leader_id } => (ok, leader_id),
        other => panic!("unexpected response: {:?}", other),
    }
}

async fn get(addr: &str, key: &str) -> Option<String> {
    let response = client::request(addr, &ClientRequest::Get { key: key.into() })
        .await
        .unwrap();
    match response {
        ClientResponse::Get { value, .. } => value,
        other => panic!("unexpected response: {:?}", other),
    }
}

/// Poll a node until it serves `key == value` from its applied state.
async fn wait_for_value(addr: &str, key: &str, value: &str) {
    timeout(DEADLINE, async {
        loop {
            if get(addr, key).await.as_deref() == Some(value) {
                return;
            }
            sleep(POLL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never saw {}={}", addr, key, value));
}

/// Retry a write until a leader accepts it (elections may be in flight).
async fn set_until_ok(addr: &str, key: &str, value: &str) {
    timeout(DEADLINE, async {
        loop {
            if set(addr, key, value).await.0 {
                return;
            }
            sleep(POLL).await;
        }
    })
    .await
    .expect("write never succeeded");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_bootstrap_elects_single_leader() {
    let dir = TempDir::new().unwrap();
    let ids = [1, 2, 3];
    let servers = start_cluster(&ids, 21000, dir.path()).await;

    let leader = wait_for_leader(&servers).await;

    let leader_status = servers[leader].status().await.unwrap();
    assert!(leader_status.term >= 0);

    // Followers converge on the leader's term and identity.
    timeout(DEADLINE, async {
        'outer: loop {
            for (i, server) in servers.iter().enumerate() {
                if i == leader {
                    continue;
                }
                let status = server.status().await.unwrap();
                if status.role != "follower"
                    || status.term != leader_status.term
                    || status.leader_id != Some(leader_status.node_id)
                {
                    sleep(POLL).await;
                    continue 'outer;
                }
            }
            break;
        }
    })
    .await
    .expect("followers should adopt the leader");

    for server in servers {
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_write_replicates_to_all_nodes() {
    let dir = TempDir::new().unwrap();
    let ids = [1, 2, 3];
    let servers = start_cluster(&ids, 21200, dir.path()).await;

    let leader = wait_for_leader(&servers).await;
    let leader_addr = servers[leader].client_addr().to_string();

    set_until_ok(&leader_addr, "x", "1").await;

    // The committed write lands on every replica's state machine.
    for server in &servers {
        wait_for_value(server.client_addr(), "x", "1").await;
    }

    for server in &servers {
        let status = server.status().await.unwrap();
        assert_eq!(status.commit_index, 0);
        assert_eq!(status.last_applied, 0);
    }

    for server in servers {
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_set_on_follower_returns_leader_hint() {
    let dir = TempDir::new().unwrap();
    let ids = [1, 2, 3];
    let servers = start_cluster(&ids, 21400, dir.path()).await;

    let leader = wait_for_leader(&servers).await;
    let leader_id = servers[leader].status().await.unwrap().node_id;
    let follower = (leader + 1) % servers.len();

    // The follower may need a heartbeat before it learns the leader.
    let hint = timeout(DEADLINE, async {
        loop {
            let (ok, hint) = set(servers[follower].client_addr(), "x", "1").await;
            assert!(!ok);
            if let Some(hint) = hint {
                return hint;
            }
            sleep(POLL).await;
        }
    })
    .await
    .expect("follower should learn the leader");

    assert_eq!(hint, leader_id);

    for server in servers {
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_follower_restart_catches_up() {
    let dir = TempDir::new().unwrap();
    let ids = [1, 2, 3];
    let mut servers = start_cluster(&ids, 21600, dir.path()).await;

    let leader = wait_for_leader(&servers).await;
    let leader_addr = servers[leader].client_addr().to_string();

    set_until_ok(&leader_addr, "x", "1").await;

    // Take a follower down, write while it is gone, bring it back.
    let follower = (leader + 1) % servers.len();
    let follower_id = ids[follower];
    servers.remove(follower).stop().await.unwrap();

    set_until_ok(&leader_addr, "x", "2").await;
    set_until_ok(&leader_addr, "y", "3").await;

    let config = node_config(follower_id, &ids, 21600, dir.path());
    let restarted = Server::start(config).await.unwrap();

    wait_for_value(restarted.client_addr(), "x", "2").await;
    wait_for_value(restarted.client_addr(), "y", "3").await;

    restarted.stop().await.unwrap();
    for server in servers {
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_leader_failover_and_rejoin() {
    let dir = TempDir::new().unwrap();
    let ids = [1, 2, 3];
    let mut servers = start_cluster(&ids, 21800, dir.path()).await;

    let leader = wait_for_leader(&servers).await;
    let leader_addr = servers[leader].client_addr().to_string();
    let old_term = servers[leader].status().await.unwrap().term;

    set_until_ok(&leader_addr, "x", "1").await;
    let old_leader_id = ids[leader];
    servers.remove(leader).stop().await.unwrap();

    // The survivors elect a new leader in a higher term.
    let new_leader = wait_for_leader(&servers).await;
    let new_status = servers[new_leader].status().await.unwrap();
    assert!(new_status.term > old_term);

    let new_leader_addr = servers[new_leader].client_addr().to_string();
    set_until_ok(&new_leader_addr, "x", "2").await;

    // The old leader rejoins as a follower and catches up.
    let config = node_config(old_leader_id, &ids, 21800, dir.path());
    let rejoined = Server::start(config).await.unwrap();

    wait_for_value(rejoined.client_addr(), "x", "2").await;

    timeout(DEADLINE, async {
        loop {
            let status = rejoined.status().await.unwrap();
            if status.role == "follower" && status.term >= new_status.term {
                return;
            }
            sleep(POLL).await;
        }
    })
    .await
    .expect("old leader should step down after rejoining");

    rejoined.stop().await.unwrap();
    for server in servers {
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_echo_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let ids = [1];
    let servers = start_cluster(&ids, 22000, dir.path()).await;

    let response = client::request(
        servers[0].client_addr(),
        &ClientRequest::Echo {
            payload: "ping".into(),
        },
    )
    .await
    .unwrap();

    match response {
        ClientResponse::Echo { payload } => assert_eq!(payload, "ping"),
        other => panic!("unexpected response: {:?}", other),
    }

    for server in servers {
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_get_before_any_write() {
    let dir = TempDir::new().unwrap();
    let ids = [1];
    let servers = start_cluster(&ids, 22100, dir.path()).await;

    assert_eq!(get(servers[0].client_addr(), "missing").await, None);

    for server in servers {
        server.stop().await.unwrap();
    }
}
