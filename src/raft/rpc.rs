//! Wire message definitions for peer and client traffic.

use super::LogEntry;
use crate::types::{LogIndex, NodeId, Term};
use serde::{Deserialize, Serialize};

/// RequestVote RPC arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Candidate's term.
    pub term: Term,
    /// Candidate requesting the vote.
    pub candidate_id: NodeId,
    /// Index of the candidate's last log entry (`-1` if its log is empty).
    pub last_log_index: LogIndex,
    /// Term of the candidate's last log entry (`-1` if its log is empty).
    pub last_log_term: Term,
}

/// RequestVote RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    /// Current term, for the candidate to update itself.
    pub term: Term,
    /// True if the candidate received the vote.
    pub granted: bool,
}

/// AppendEntries RPC arguments (also the heartbeat carrier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    /// Leader's term.
    pub term: Term,
    /// Leader's id, so followers can redirect clients.
    pub leader_id: NodeId,
    /// Index of the log entry immediately preceding the new ones (`-1`
    /// when sending from the start of the log).
    pub prev_log_index: LogIndex,
    /// Term of the `prev_log_index` entry.
    pub prev_log_term: Term,
    /// Entries to store; empty for a pure heartbeat.
    pub entries: Vec<LogEntry>,
    /// Leader's commit index.
    pub leader_commit: LogIndex,
}

/// AppendEntries RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    /// Current term, for the leader to update itself.
    pub term: Term,
    /// True if the follower held an entry matching
    /// `(prev_log_index, prev_log_term)` and accepted the entries.
    pub success: bool,
}

/// InstallSnapshot RPC arguments.
///
/// The envelope exists so the wire format is settled, but no transfer
/// protocol is wired to it; log compaction is not performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    /// Leader's term.
    pub term: Term,
    /// Leader's id.
    pub leader_id: NodeId,
    /// The snapshot replaces all entries up through this index.
    pub last_included_index: LogIndex,
    /// Term of `last_included_index`.
    pub last_included_term: Term,
    /// Byte offset of this chunk within the snapshot.
    pub offset: u64,
    /// Raw bytes of the snapshot chunk.
    pub data: Vec<u8>,
    /// True if this is the last chunk.
    pub done: bool,
}

/// InstallSnapshot RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    /// Current term.
    pub term: Term,
}

/// One framed request on the peer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerRequest {
    Vote(VoteRequest),
    Append(AppendRequest),
}

/// One framed response on the peer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerResponse {
    Vote(VoteResponse),
    Append(AppendResponse),
}

/// One framed request on the client endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientRequest {
    Set { key: String, value: String },
    Get { key: String },
    Echo { payload: String },
}

/// One framed response on the client endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientResponse {
    Set {
        ok: bool,
        leader_id: Option<NodeId>,
    },
    Get {
        ok: bool,
        value: Option<String>,
    },
    Echo {
        payload: String,
    },
}
