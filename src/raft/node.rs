//! Raft node implementation.
//!
//! The consensus core is the single consumer of the inbound command queue
//! and the only writer of node state. Transport listeners, timer tasks,
//! and outbound senders all talk to it exclusively by enqueueing
//! [`RaftCommand`]s; responses to our own RPCs come back the same way
//! (`VoteReply` / `AppendReply`), so the core never awaits the network.

use super::log::{LogEntry, RaftLog};
use super::rpc::{AppendRequest, AppendResponse, PeerRequest, VoteRequest, VoteResponse};
use super::state::{RaftState, Role};
use super::storage::RaftStorage;
use super::timer::{ElectionTimer, HeartbeatTimer};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::kv::{Command, KvStore};
use crate::types::{LogIndex, NodeId, Term};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Raft timing and membership configuration.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// This node's id.
    pub node_id: NodeId,
    /// The other cluster members.
    pub peers: Vec<NodeId>,
    /// Minimum election timeout.
    pub election_timeout_min: Duration,
    /// Maximum election timeout.
    pub election_timeout_max: Duration,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            peers: Vec::new(),
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
        }
    }
}

impl From<&NodeConfig> for RaftConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            node_id: config.id,
            peers: config.peer_ids(),
            election_timeout_min: config.election_timeout_min(),
            election_timeout_max: config.election_timeout_max(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

/// Outcome of a client `set`, delivered once the entry commits (or the
/// write is rejected or orphaned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    pub ok: bool,
    pub leader_id: Option<NodeId>,
}

/// Point-in-time view of the core, for the server and tests.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub role: &'static str,
    pub term: Term,
    pub leader_id: Option<NodeId>,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub last_log_index: LogIndex,
    pub keys: usize,
}

/// Everything the core consumes from the inbound queue: peer RPCs with
/// their reply handles, re-entered RPC responses, timer events, and the
/// client surface.
#[derive(Debug)]
pub enum RaftCommand {
    /// Election timer expired (stale generations are ignored).
    ElectionTimeout { generation: u64 },
    /// Heartbeat timer ticked (stale generations are ignored).
    HeartbeatTick { generation: u64 },
    /// Incoming RequestVote from a candidate.
    Vote {
        request: VoteRequest,
        reply: oneshot::Sender<VoteResponse>,
    },
    /// Incoming AppendEntries from a leader.
    Append {
        request: AppendRequest,
        reply: oneshot::Sender<AppendResponse>,
    },
    /// A peer answered one of our vote requests.
    VoteReply { from: NodeId, response: VoteResponse },
    /// A peer answered one of our append requests; `ack_index` is the
    /// highest index that send covered.
    AppendReply {
        from: NodeId,
        response: AppendResponse,
        ack_index: LogIndex,
    },
    /// Client write; answered after commit + apply.
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<SetOutcome>,
    },
    /// Client read from the local applied map.
    Get {
        key: String,
        reply: oneshot::Sender<Option<String>>,
    },
    /// Diagnostic echo.
    Echo {
        payload: String,
        reply: oneshot::Sender<String>,
    },
    /// In-process status query.
    Status { reply: oneshot::Sender<NodeStatus> },
    /// Stop consuming and exit the run loop.
    Shutdown,
}

/// An outbound peer RPC handed to the transport workers.
#[derive(Debug, Clone)]
pub struct OutboundRpc {
    pub target: NodeId,
    pub request: PeerRequest,
}

struct PendingSet {
    term: Term,
    reply: oneshot::Sender<SetOutcome>,
}

/// The consensus core for one node.
pub struct RaftNode {
    config: RaftConfig,
    state: RaftState,
    log: RaftLog,
    storage: RaftStorage,
    kv: KvStore,
    election: ElectionTimer,
    heartbeat: HeartbeatTimer,
    outbound: mpsc::UnboundedSender<OutboundRpc>,
    /// Client writes waiting for their log index to be applied.
    pending: HashMap<LogIndex, PendingSet>,
}

impl RaftNode {
    /// Create a node, reloading any durable state found in `storage`.
    ///
    /// `inbound_tx` is the queue the node itself will later consume; the
    /// timers hold clones of it so expiries arrive as ordinary commands.
    pub fn new(
        config: RaftConfig,
        storage: RaftStorage,
        inbound_tx: mpsc::UnboundedSender<RaftCommand>,
        outbound: mpsc::UnboundedSender<OutboundRpc>,
    ) -> Result<Self> {
        let mut state = RaftState::new(config.node_id, config.peers.clone());
        let mut log = RaftLog::new();

        if let Some((persistent, entries)) = storage.load()? {
            info!(
                node_id = config.node_id,
                term = persistent.current_term,
                entries = entries.len(),
                "recovered durable state"
            );
            state.persistent = persistent;
            log = RaftLog::from_entries(entries);
        }

        let election = ElectionTimer::new(
            inbound_tx.clone(),
            config.election_timeout_min,
            config.election_timeout_max,
        );
        let heartbeat = HeartbeatTimer::new(inbound_tx, config.heartbeat_interval);

        Ok(Self {
            config,
            state,
            log,
            storage,
            kv: KvStore::new(),
            election,
            heartbeat,
            outbound,
            pending: HashMap::new(),
        })
    }

    /// Consume the inbound queue until shutdown.
    ///
    /// Returns an error only on persistence failure; correctness forbids
    /// carrying on with an un-flushed vote or log.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<RaftCommand>) -> Result<()> {
        self.election.reset();
        info!(node_id = self.config.node_id, "node started");

        while let Some(command) = inbound.recv().await {
            match command {
                RaftCommand::ElectionTimeout { generation } => {
                    self.handle_election_timeout(generation)?;
                }
                RaftCommand::HeartbeatTick { generation } => {
                    self.handle_heartbeat_tick(generation);
                }
                RaftCommand::Vote { request, reply } => {
                    let response = self.handle_vote(request)?;
                    let _ = reply.send(response);
                }
                RaftCommand::Append { request, reply } => {
                    let response = self.handle_append(request)?;
                    let _ = reply.send(response);
                }
                RaftCommand::VoteReply { from, response } => {
                    self.handle_vote_reply(from, response)?;
                }
                RaftCommand::AppendReply {
                    from,
                    response,
                    ack_index,
                } => {
                    self.handle_append_reply(from, response, ack_index)?;
                }
                RaftCommand::Set { key, value, reply } => {
                    self.handle_set(key, value, reply)?;
                }
                RaftCommand::Get { key, reply } => {
                    let _ = reply.send(self.kv.get(&key).map(str::to_string));
                }
                RaftCommand::Echo { payload, reply } => {
                    let _ = reply.send(payload);
                }
                RaftCommand::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                RaftCommand::Shutdown => {
                    info!(node_id = self.config.node_id, "node shutting down");
                    break;
                }
            }
        }

        self.election.stop();
        self.heartbeat.stop();
        Ok(())
    }

    /// Universal rule, applied before role handling on every peer RPC and
    /// RPC reply: a higher term demotes us and resets our vote.
    fn observe_term(&mut self, term: Term) -> Result<()> {
        if term > self.state.current_term() {
            self.step_down(term, None);
            self.persist()?;
        }
        Ok(())
    }

    fn step_down(&mut self, term: Term, leader_id: Option<NodeId>) {
        let was_leader = self.state.is_leader();
        if was_leader {
            self.heartbeat.stop();
        }
        self.state.become_follower(term, leader_id);
        if was_leader {
            self.fail_pending();
        }
        self.election.reset();
    }

    /// Answer in-flight client writes that can no longer commit under us.
    fn fail_pending(&mut self) {
        let leader_id = self.state.leader_id;
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(SetOutcome {
                ok: false,
                leader_id,
            });
        }
    }

    fn handle_election_timeout(&mut self, generation: u64) -> Result<()> {
        if !self.election.is_current(generation) || self.state.is_leader() {
            return Ok(());
        }
        self.start_election()
    }

    fn start_election(&mut self) -> Result<()> {
        self.state.become_candidate();
        self.persist()?;
        self.election.reset();

        let request = VoteRequest {
            term: self.state.current_term(),
            candidate_id: self.config.node_id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };
        for &peer in &self.config.peers {
            self.send(peer, PeerRequest::Vote(request.clone()));
        }

        // A cluster of one wins on its own vote.
        self.try_win_election()
    }

    fn try_win_election(&mut self) -> Result<()> {
        let tally = match &self.state.role {
            Role::Candidate(c) => c.votes.len(),
            _ => return Ok(()),
        };
        if tally >= self.state.quorum_size() {
            self.state.become_leader(self.log.last_index());
            self.election.stop();
            self.heartbeat.start();
            self.broadcast_append();
        }
        Ok(())
    }

    fn handle_heartbeat_tick(&mut self, generation: u64) {
        if !self.heartbeat.is_current(generation) || !self.state.is_leader() {
            return;
        }
        self.broadcast_append();
    }

    /// Ship each peer everything from its `next_index` onward (empty for a
    /// caught-up peer: a pure heartbeat carrying `leader_commit`).
    fn broadcast_append(&self) {
        let leader = match &self.state.role {
            Role::Leader(l) => l,
            _ => return,
        };

        for &peer in &self.config.peers {
            let next = leader
                .next_index
                .get(&peer)
                .copied()
                .unwrap_or(self.log.last_index() + 1);
            let prev = next - 1;

            let request = AppendRequest {
                term: self.state.current_term(),
                leader_id: self.config.node_id,
                prev_log_index: prev,
                prev_log_term: self.log.term_at(prev),
                entries: self.log.entries_from(next),
                leader_commit: self.state.commit_index,
            };
            self.send(peer, PeerRequest::Append(request));
        }
    }

    fn handle_vote(&mut self, request: VoteRequest) -> Result<VoteResponse> {
        self.observe_term(request.term)?;
        let term = self.state.current_term();

        if request.term < term {
            return Ok(VoteResponse {
                term,
                granted: false,
            });
        }

        let up_to_date = self
            .log
            .is_up_to_date(request.last_log_index, request.last_log_term);
        let unspoken = self
            .state
            .persistent
            .voted_for
            .map_or(true, |v| v == request.candidate_id);

        if unspoken && up_to_date {
            self.state.persistent.voted_for = Some(request.candidate_id);
            self.persist()?;
            self.election.reset();
            debug!(
                node_id = self.config.node_id,
                candidate = request.candidate_id,
                term,
                "granted vote"
            );
            return Ok(VoteResponse {
                term,
                granted: true,
            });
        }

        debug!(
            node_id = self.config.node_id,
            candidate = request.candidate_id,
            term,
            up_to_date,
            voted_for = ?self.state.persistent.voted_for,
            "denied vote"
        );
        Ok(VoteResponse {
            term,
            granted: false,
        })
    }

    fn handle_append(&mut self, request: AppendRequest) -> Result<AppendResponse> {
        self.observe_term(request.term)?;
        let term = self.state.current_term();

        if request.term < term {
            return Ok(AppendResponse {
                term,
                success: false,
            });
        }

        // A live leader of our term: acknowledge it before checking logs.
        self.election.reset();
        self.state.leader_id = Some(request.leader_id);
        if !self.state.role.is_follower() {
            self.step_down(term, Some(request.leader_id));
        }

        if !self.log.matches(request.prev_log_index, request.prev_log_term) {
            debug!(
                node_id = self.config.node_id,
                prev_log_index = request.prev_log_index,
                prev_log_term = request.prev_log_term,
                last_index = self.log.last_index(),
                "append rejected: log mismatch"
            );
            return Ok(AppendResponse {
                term,
                success: false,
            });
        }

        let mut changed = false;
        for (i, entry) in request.entries.into_iter().enumerate() {
            let index = request.prev_log_index + 1 + i as LogIndex;
            if index <= self.log.last_index() {
                if self.log.term_at(index) != entry.term {
                    // Conflicting suffix: drop it and take the leader's.
                    self.log.truncate_from(index);
                    self.log.append(entry);
                    changed = true;
                }
            } else {
                self.log.append(entry);
                changed = true;
            }
        }
        if changed {
            self.persist()?;
        }

        if request.leader_commit > self.state.commit_index {
            self.state.commit_index = request.leader_commit.min(self.log.last_index());
            self.apply_committed();
        }

        Ok(AppendResponse {
            term,
            success: true,
        })
    }

    fn handle_vote_reply(&mut self, from: NodeId, response: VoteResponse) -> Result<()> {
        self.observe_term(response.term)?;

        if !response.granted || response.term != self.state.current_term() {
            return Ok(());
        }
        if let Role::Candidate(candidate) = &mut self.state.role {
            candidate.votes.insert(from);
            debug!(
                node_id = self.config.node_id,
                voter = from,
                votes = candidate.votes.len(),
                "received vote"
            );
        }
        self.try_win_election()
    }

    fn handle_append_reply(
        &mut self,
        from: NodeId,
        response: AppendResponse,
        ack_index: LogIndex,
    ) -> Result<()> {
        self.observe_term(response.term)?;

        if !self.state.is_leader() {
            return Ok(());
        }
        // A reply from an older leadership of ours carries that term; it
        // says nothing about the follower's log under this one.
        if response.term != self.state.current_term() {
            return Ok(());
        }

        if response.success {
            if let Role::Leader(leader) = &mut self.state.role {
                leader.record_ack(from, ack_index);
            }
            self.advance_commit();
        } else {
            // Consistency miss: step next_index back one and retry on the
            // next heartbeat tick.
            if let Role::Leader(leader) = &mut self.state.role {
                leader.back_off(from);
            }
        }
        Ok(())
    }

    /// Leader commit rule: the largest index replicated on a majority
    /// whose entry is from the current term. Prior-term entries ride
    /// along implicitly; they are never counted directly.
    fn advance_commit(&mut self) {
        let term = self.state.current_term();
        let last = self.log.last_index();
        let quorum = self.state.quorum_size();

        let mut candidate = last;
        while candidate > self.state.commit_index && self.log.term_at(candidate) == term {
            if self.state.replication_count(candidate, last) >= quorum {
                self.state.commit_index = candidate;
                debug!(
                    node_id = self.config.node_id,
                    commit_index = candidate,
                    "advanced commit index"
                );
                self.apply_committed();
                return;
            }
            candidate -= 1;
        }
    }

    /// Feed newly committed entries to the state machine in index order
    /// and settle any client writes parked on them.
    fn apply_committed(&mut self) {
        while self.state.last_applied < self.state.commit_index {
            let index = self.state.last_applied + 1;
            let entry = match self.log.get(index) {
                Some(e) => e.clone(),
                None => {
                    warn!(
                        node_id = self.config.node_id,
                        index, "commit index beyond log tail"
                    );
                    return;
                }
            };

            self.kv.apply(&entry.info);
            self.state.last_applied = index;

            if let Some(pending) = self.pending.remove(&index) {
                // The slot committed; it is ours only if the term matches.
                let ok = pending.term == entry.term;
                let _ = pending.reply.send(SetOutcome {
                    ok,
                    leader_id: self.state.leader_id,
                });
            }
        }
    }

    fn handle_set(
        &mut self,
        key: String,
        value: String,
        reply: oneshot::Sender<SetOutcome>,
    ) -> Result<()> {
        if !self.state.is_leader() {
            let _ = reply.send(SetOutcome {
                ok: false,
                leader_id: self.state.leader_id,
            });
            return Ok(());
        }

        let term = self.state.current_term();
        self.log.append(LogEntry::new(term, Command::Set { key, value }));
        self.persist()?;

        let index = self.log.last_index();
        self.pending.insert(index, PendingSet { term, reply });
        debug!(node_id = self.config.node_id, index, term, "appended client write");

        self.broadcast_append();
        // A cluster of one commits on its own ack.
        self.advance_commit();
        Ok(())
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.config.node_id,
            role: self.state.role.name(),
            term: self.state.current_term(),
            leader_id: self.state.leader_id,
            commit_index: self.state.commit_index,
            last_applied: self.state.last_applied,
            last_log_index: self.log.last_index(),
            keys: self.kv.len(),
        }
    }

    fn persist(&self) -> Result<()> {
        self.storage.save(&self.state.persistent, self.log.entries())
    }

    fn send(&self, target: NodeId, request: PeerRequest) {
        let _ = self.outbound.send(OutboundRpc { target, request });
    }
}
