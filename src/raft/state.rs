//! Raft node state management.
//!
//! The role is a tagged variant: candidate vote tallies and leader
//! replication cursors live inside their role's variant, so "cleared on
//! role exit" holds structurally rather than by convention.

use crate::types::{LogIndex, NodeId, Term, NONE};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Persistent state that must survive restarts. The log rides alongside
/// in [`super::RaftStorage`]'s blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    /// Latest term this node has seen; `-1` before any election.
    pub current_term: Term,
    /// Candidate that received this node's vote in the current term.
    pub voted_for: Option<NodeId>,
}

impl PersistentState {
    pub fn new() -> Self {
        Self {
            current_term: NONE,
            voted_for: None,
        }
    }
}

impl Default for PersistentState {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate-only state: votes received this election, self included.
#[derive(Debug, Clone)]
pub struct CandidateState {
    pub votes: HashSet<NodeId>,
}

/// Leader-only state, reinitialized on every election win.
#[derive(Debug, Clone)]
pub struct LeaderState {
    /// For each peer, index of the next log entry to send.
    pub next_index: HashMap<NodeId, LogIndex>,
    /// For each peer, highest index known to be replicated there.
    pub match_index: HashMap<NodeId, LogIndex>,
}

impl LeaderState {
    pub fn new(peers: &[NodeId], last_log_index: LogIndex) -> Self {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();

        for &peer in peers {
            next_index.insert(peer, last_log_index + 1);
            match_index.insert(peer, NONE);
        }

        Self {
            next_index,
            match_index,
        }
    }

    /// Record a successful replication covering up to `ack_index`.
    pub fn record_ack(&mut self, peer: NodeId, ack_index: LogIndex) {
        let entry = self.match_index.entry(peer).or_insert(NONE);
        if ack_index > *entry {
            *entry = ack_index;
        }
        self.next_index.insert(peer, *entry + 1);
    }

    /// Back off one step after a failed consistency check, floored at 0.
    pub fn back_off(&mut self, peer: NodeId) {
        if let Some(next) = self.next_index.get_mut(&peer) {
            *next = (*next - 1).max(0);
        }
    }
}

/// The three roles of a node, each carrying its role-specific state.
#[derive(Debug, Clone)]
pub enum Role {
    Follower,
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader(_))
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self, Role::Candidate(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, Role::Follower)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate(_) => "candidate",
            Role::Leader(_) => "leader",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete volatile + persistent Raft state for one node.
#[derive(Debug)]
pub struct RaftState {
    /// This node's id.
    pub node_id: NodeId,
    /// The other cluster members.
    pub peers: Vec<NodeId>,
    /// Current role and its role-specific state.
    pub role: Role,
    /// Last leader this node heard from, for client redirects.
    pub leader_id: Option<NodeId>,
    /// Durable fields (the log lives in [`super::RaftLog`]).
    pub persistent: PersistentState,
    /// Highest index known replicated on a majority.
    pub commit_index: LogIndex,
    /// Highest index handed to the state machine.
    pub last_applied: LogIndex,
}

impl RaftState {
    pub fn new(node_id: NodeId, peers: Vec<NodeId>) -> Self {
        Self {
            node_id,
            peers,
            role: Role::Follower,
            leader_id: None,
            persistent: PersistentState::new(),
            commit_index: NONE,
            last_applied: NONE,
        }
    }

    pub fn current_term(&self) -> Term {
        self.persistent.current_term
    }

    pub fn is_leader(&self) -> bool {
        self.role.is_leader()
    }

    /// Majority size for this cluster (self included).
    pub fn quorum_size(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    /// Step down to follower. A higher `term` resets `voted_for`; the
    /// leader hint is replaced either way, stale hints included.
    pub fn become_follower(&mut self, term: Term, leader_id: Option<NodeId>) {
        if term > self.persistent.current_term {
            self.persistent.current_term = term;
            self.persistent.voted_for = None;
        }
        self.role = Role::Follower;
        self.leader_id = leader_id;

        tracing::info!(
            node_id = self.node_id,
            term = self.persistent.current_term,
            leader = ?self.leader_id,
            "became follower"
        );
    }

    /// Enter a new election: bump the term and vote for self.
    pub fn become_candidate(&mut self) {
        self.persistent.current_term += 1;
        self.persistent.voted_for = Some(self.node_id);
        self.leader_id = None;

        let mut votes = HashSet::new();
        votes.insert(self.node_id);
        self.role = Role::Candidate(CandidateState { votes });

        tracing::info!(
            node_id = self.node_id,
            term = self.persistent.current_term,
            "became candidate"
        );
    }

    /// Take leadership of the current term.
    pub fn become_leader(&mut self, last_log_index: LogIndex) {
        self.role = Role::Leader(LeaderState::new(&self.peers, last_log_index));
        self.leader_id = Some(self.node_id);

        tracing::info!(
            node_id = self.node_id,
            term = self.persistent.current_term,
            "became leader"
        );
    }

    /// Count of nodes (self included) whose match index reaches `index`.
    pub fn replication_count(&self, index: LogIndex, last_log_index: LogIndex) -> usize {
        let leader = match &self.role {
            Role::Leader(l) => l,
            _ => return 0,
        };
        let mut count = usize::from(last_log_index >= index);
        count += leader
            .match_index
            .values()
            .filter(|&&m| m >= index)
            .count();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = RaftState::new(1, vec![2, 3]);
        assert!(state.role.is_follower());
        assert_eq!(state.current_term(), -1);
        assert_eq!(state.commit_index, -1);
        assert_eq!(state.last_applied, -1);
        assert!(state.leader_id.is_none());
    }

    #[test]
    fn test_become_candidate_bumps_term_and_votes_self() {
        let mut state = RaftState::new(1, vec![2, 3]);
        state.become_candidate();

        assert!(state.role.is_candidate());
        assert_eq!(state.current_term(), 0);
        assert_eq!(state.persistent.voted_for, Some(1));
        match &state.role {
            Role::Candidate(c) => assert!(c.votes.contains(&1)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_become_leader_initializes_cursors() {
        let mut state = RaftState::new(1, vec![2, 3]);
        state.become_candidate();
        state.become_leader(4);

        let leader = match &state.role {
            Role::Leader(l) => l,
            _ => unreachable!(),
        };
        assert_eq!(leader.next_index.get(&2), Some(&5));
        assert_eq!(leader.match_index.get(&2), Some(&-1));
    }

    #[test]
    fn test_step_down_clears_leader_state() {
        let mut state = RaftState::new(1, vec![2, 3]);
        state.become_candidate();
        state.become_leader(0);
        state.become_follower(5, Some(2));

        assert!(state.role.is_follower());
        assert_eq!(state.current_term(), 5);
        assert_eq!(state.persistent.voted_for, None);
        assert_eq!(state.leader_id, Some(2));
    }

    #[test]
    fn test_same_term_step_down_keeps_vote() {
        let mut state = RaftState::new(1, vec![2, 3]);
        state.become_candidate();
        let term = state.current_term();

        // An append from a leader of our own term demotes us without
        // resetting the vote we cast for ourselves.
        state.become_follower(term, Some(3));
        assert_eq!(state.persistent.voted_for, Some(1));
        assert_eq!(state.current_term(), term);
    }

    #[test]
    fn test_quorum_size() {
        assert_eq!(RaftState::new(1, vec![2, 3]).quorum_size(), 2);
        assert_eq!(RaftState::new(1, vec![2, 3, 4, 5]).quorum_size(), 3);
        assert_eq!(RaftState::new(1, vec![]).quorum_size(), 1);
    }

    #[test]
    fn test_record_ack_is_monotonic() {
        let mut leader = LeaderState::new(&[2], 5);
        leader.record_ack(2, 3);
        assert_eq!(leader.match_index.get(&2), Some(&3));
        assert_eq!(leader.next_index.get(&2), Some(&4));

        // A late reply covering less ground must not move match backwards.
        leader.record_ack(2, 1);
        assert_eq!(leader.match_index.get(&2), Some(&3));
        assert_eq!(leader.next_index.get(&2), Some(&4));
    }

    #[test]
    fn test_back_off_floors_at_zero() {
        let mut leader = LeaderState::new(&[2], -1);
        assert_eq!(leader.next_index.get(&2), Some(&0));
        leader.back_off(2);
        assert_eq!(leader.next_index.get(&2), Some(&0));
    }

    #[test]
    fn test_replication_count() {
        let mut state = RaftState::new(1, vec![2, 3, 4, 5]);
        state.become_candidate();
        state.become_leader(9);

        if let Role::Leader(l) = &mut state.role {
            l.match_index.insert(2, 7);
            l.match_index.insert(3, 9);
            l.match_index.insert(4, 2);
            l.match_index.insert(5, -1);
        }

        // Self (at 9) + peers 2 and 3.
        assert_eq!(state.replication_count(7, 9), 3);
        assert_eq!(state.replication_count(9, 9), 2);
        assert_eq!(state.replication_count(0, 9), 4);
    }
}
