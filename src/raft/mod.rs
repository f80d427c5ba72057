//! Raft consensus implementation for the raftkv cluster.
//!
//! This module implements the Raft consensus algorithm driving the
//! replicated key-value store: leader election, log replication, commit
//! tracking, and the bridge from committed entries to the state machine.

// Deny unsafe code patterns in this critical consensus module.
// unwrap() calls can cause panics that break consensus.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod log;
mod node;
pub mod rpc;
mod state;
mod storage;
mod timer;

pub use log::{LogEntry, RaftLog};
pub use node::{
    NodeStatus, OutboundRpc, RaftCommand, RaftConfig, RaftNode, SetOutcome,
};
pub use rpc::{
    AppendRequest, AppendResponse, ClientRequest, ClientResponse, InstallSnapshotRequest,
    InstallSnapshotResponse, PeerRequest, PeerResponse, VoteRequest, VoteResponse,
};
pub use state::{CandidateState, LeaderState, PersistentState, RaftState, Role};
pub use storage::RaftStorage;
pub use timer::{ElectionTimer, HeartbeatTimer};
