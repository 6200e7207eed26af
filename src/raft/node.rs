use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{RaftError, Result};
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::raft::election::{apply_heartbeat_reply, apply_vote_reply, ReplyOutcome};
use crate::raft::persist::{decode_state, encode_state, Persister};
use crate::raft::rpc::{handle_append_entries, handle_request_vote};
use crate::raft::signal::Signal;
use crate::raft::state::{PersistentState, RaftRole, RaftState};
use crate::raft::timer::ElectionTimer;
use crate::transport::Transport;

/// A committed entry handed to the service above Raft.
///
/// The election core never produces these; the channel exists so a log
/// replication layer can deliver through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyMsg {
    pub index: u64,
    pub command: Vec<u8>,
}

/// Result of a command submitted to the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    pub term: u64,
    /// Log position the command will occupy once a log exists to hold it.
    pub index: Option<u64>,
}

/// Point-in-time view of a node for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub node_id: u64,
    pub role: RaftRole,
    pub current_term: u64,
    pub voted_for: Option<u64>,
    pub leader_id: Option<u64>,
}

/// A Raft peer: election, heartbeats and the RPC handlers that serve them.
///
/// All mutable state lives in `state` behind a single lock. The lock is never
/// held across an outbound RPC: the term is snapshotted, the call is made
/// unlocked, and the reply is applied only if that term is still current.
pub struct RaftNode {
    pub id: u64,
    pub state: Mutex<RaftState>,
    config: NodeConfig,
    transport: Arc<dyn Transport>,
    persister: Arc<dyn Persister>,
    apply_tx: mpsc::Sender<ApplyMsg>,
    /// Raised when this node grants a vote.
    vote_granted: Signal,
    /// Raised when this node accepts a heartbeat from a current leader.
    heartbeat: Signal,
    /// Raised when an RPC handler or reply moves this node to another role.
    role_changed: Signal,
}

impl RaftNode {
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        persister: Arc<dyn Persister>,
        apply_tx: mpsc::Sender<ApplyMsg>,
    ) -> Result<Self> {
        config.validate()?;

        let timer = match config.rng_seed {
            Some(seed) => ElectionTimer::with_seed(
                config.election_timeout_min_ms,
                config.election_timeout_max_ms,
                seed,
            ),
            None => ElectionTimer::new(
                config.election_timeout_min_ms,
                config.election_timeout_max_ms,
            ),
        };

        let mut state = RaftState::new(config.node_id, timer);
        if let Some(persisted) = Self::restore(config.node_id, persister.as_ref()) {
            tracing::info!(
                node_id = config.node_id,
                term = persisted.current_term,
                voted_for = ?persisted.voted_for,
                "Restored persisted state"
            );
            state.restore(persisted);
        }

        Ok(Self {
            id: config.node_id,
            state: Mutex::new(state),
            config,
            transport,
            persister,
            apply_tx,
            vote_granted: Signal::new(),
            heartbeat: Signal::new(),
            role_changed: Signal::new(),
        })
    }

    fn restore(node_id: u64, persister: &dyn Persister) -> Option<PersistentState> {
        let blob = match persister.read_state() {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(node_id, error = %e, "Failed to read persisted state, starting fresh");
                return None;
            }
        };

        match decode_state(&blob) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(node_id, error = %e, "Persisted state is corrupt, starting fresh");
                None
            }
        }
    }

    /// Save term and vote if they differ from `before`. Failures are logged.
    fn persist_if_changed(&self, before: PersistentState, state: &RaftState) {
        let now = state.persistent();
        if now == before {
            return;
        }

        let result = encode_state(&now).and_then(|blob| self.persister.save_state(&blob));
        if let Err(e) = result {
            tracing::warn!(node_id = self.id, term = now.current_term, error = %e, "Failed to persist state");
        }
    }

    /// Current term and whether this node believes it is the leader.
    pub async fn get_state(&self) -> (u64, bool) {
        let state = self.state.lock().await;
        (state.current_term, state.is_leader())
    }

    pub async fn status(&self) -> NodeStatus {
        let state = self.state.lock().await;
        NodeStatus {
            node_id: self.id,
            role: state.role,
            current_term: state.current_term,
            voted_for: state.voted_for,
            leader_id: state.leader_id,
        }
    }

    /// Check if this node is the leader
    pub async fn is_leader(&self) -> bool {
        self.state.lock().await.is_leader()
    }

    /// Submit a command for replication (leader only).
    pub async fn submit(&self, command: Vec<u8>) -> Result<Proposal> {
        let state = self.state.lock().await;
        if !state.is_leader() {
            return Err(RaftError::NotLeader {
                leader_id: state.leader_id,
            });
        }

        tracing::debug!(
            node_id = self.id,
            term = state.current_term,
            bytes = command.len(),
            "Accepted command proposal"
        );
        Ok(Proposal {
            term: state.current_term,
            index: None,
        })
    }

    /// Channel on which committed entries are delivered to the service.
    pub fn apply_sender(&self) -> mpsc::Sender<ApplyMsg> {
        self.apply_tx.clone()
    }

    /// Handle incoming RequestVote RPC
    pub async fn handle_request_vote(&self, req: VoteRequest) -> VoteResponse {
        let mut state = self.state.lock().await;
        let before = state.persistent();
        let role_before = state.role;

        let response = handle_request_vote(&mut state, &req);
        self.persist_if_changed(before, &state);

        if response.vote_granted {
            self.vote_granted.raise();
        }
        if state.role != role_before {
            self.role_changed.raise();
        }

        response
    }

    /// Handle incoming AppendEntries RPC
    pub async fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let mut state = self.state.lock().await;
        let before = state.persistent();
        let role_before = state.role;

        let response = handle_append_entries(&mut state, &req);
        self.persist_if_changed(before, &state);

        if response.success {
            self.heartbeat.raise();
        }
        if state.role != role_before {
            self.role_changed.raise();
        }

        response
    }

    /// Run the Raft node main loop until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            node_id = self.id,
            cluster_size = self.config.cluster_size(),
            "Starting Raft event loop"
        );

        while !shutdown.is_cancelled() {
            let role = self.state.lock().await.role;
            match role {
                RaftRole::Follower => self.follower_step(&shutdown).await,
                RaftRole::Candidate => self.candidate_step(&shutdown).await,
                RaftRole::Leader => self.leader_step(&shutdown).await,
            }
        }

        tracing::info!(node_id = self.id, "Raft event loop stopped");
    }

    /// Wait for a vote grant, a heartbeat, or the election deadline.
    async fn follower_step(self: &Arc<Self>, shutdown: &CancellationToken) {
        let deadline = self.state.lock().await.election_deadline;

        // The handlers that raise these signals already pushed the deadline
        // out; waking up just re-arms the wait against the new deadline.
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = self.vote_granted.wait() => {
                tracing::trace!(node_id = self.id, "Granted vote, election timer restarted");
            }
            _ = self.heartbeat.wait() => {
                tracing::trace!(node_id = self.id, "Heard from leader, election timer restarted");
            }
            _ = sleep_until(deadline) => {
                let mut state = self.state.lock().await;
                if state.role == RaftRole::Follower && Instant::now() >= state.election_deadline {
                    tracing::info!(
                        node_id = self.id,
                        term = state.current_term,
                        "Election timeout, starting election"
                    );
                    self.start_election(&mut state);
                }
            }
        }
    }

    /// Wait for the round to resolve: a reply or handler changes our role,
    /// or the deadline passes and a fresh round starts.
    async fn candidate_step(self: &Arc<Self>, shutdown: &CancellationToken) {
        let deadline = {
            let mut state = self.state.lock().await;
            if state.role != RaftRole::Candidate {
                return;
            }
            if state.has_majority(self.config.majority()) {
                state.transition_to(RaftRole::Leader);
                return;
            }
            state.election_deadline
        };

        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = self.role_changed.wait() => {}
            _ = sleep_until(deadline) => {
                let mut state = self.state.lock().await;
                if state.role == RaftRole::Candidate && Instant::now() >= state.election_deadline {
                    tracing::info!(
                        node_id = self.id,
                        term = state.current_term,
                        votes = state.votes_received,
                        "Election round timed out without a winner"
                    );
                    self.start_election(&mut state);
                }
            }
        }
    }

    /// Send one heartbeat round, then idle for the heartbeat interval.
    async fn leader_step(self: &Arc<Self>, shutdown: &CancellationToken) {
        self.broadcast_heartbeats().await;

        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = self.role_changed.wait() => {}
            _ = sleep(interval) => {}
        }
    }

    /// Open a new election round and request votes from every peer.
    ///
    /// Runs with the state lock held; the vote requests go out on spawned
    /// tasks that take the lock again only to apply their replies.
    fn start_election(self: &Arc<Self>, state: &mut RaftState) {
        let before = state.persistent();
        if !state.transition_to(RaftRole::Candidate) {
            return;
        }
        self.persist_if_changed(before, state);

        // Signals raised in the previous role say nothing about this round
        self.vote_granted.clear();
        self.heartbeat.clear();
        self.role_changed.clear();

        let term = state.current_term;
        tracing::info!(node_id = self.id, term, "Starting election");

        if state.has_majority(self.config.majority()) {
            // Single-node cluster
            state.transition_to(RaftRole::Leader);
            return;
        }

        for peer_id in self.config.other_peers() {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                node.request_vote_from(peer_id, term).await;
            });
        }
    }

    async fn request_vote_from(&self, peer_id: u64, term: u64) {
        {
            let state = self.state.lock().await;
            if state.role != RaftRole::Candidate || state.current_term != term {
                return;
            }
        }

        let req = VoteRequest {
            term,
            candidate_id: self.id,
        };

        match self.transport.request_vote(peer_id, req).await {
            Ok(resp) => {
                let mut state = self.state.lock().await;
                let before = state.persistent();
                let outcome = apply_vote_reply(&mut state, term, &resp, self.config.majority());
                self.persist_if_changed(before, &state);

                tracing::debug!(
                    node_id = self.id,
                    peer_id,
                    term,
                    granted = resp.vote_granted,
                    votes = state.votes_received,
                    ?outcome,
                    "Vote reply"
                );

                if outcome.changed_role() {
                    self.role_changed.raise();
                }
            }
            Err(e) => {
                tracing::debug!(node_id = self.id, peer_id, term, error = %e, "Vote request failed");
            }
        }
    }

    /// Send heartbeats to all followers (leader only)
    async fn broadcast_heartbeats(self: &Arc<Self>) {
        let term = {
            let state = self.state.lock().await;
            if state.role != RaftRole::Leader {
                return;
            }
            state.current_term
        };

        tracing::trace!(node_id = self.id, term, "Broadcasting heartbeats");

        for peer_id in self.config.other_peers() {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                node.send_heartbeat(peer_id, term).await;
            });
        }
    }

    async fn send_heartbeat(&self, peer_id: u64, term: u64) {
        let req = AppendEntriesRequest {
            term,
            leader_id: self.id,
        };

        match self.transport.append_entries(peer_id, req).await {
            Ok(resp) => {
                let mut state = self.state.lock().await;
                let before = state.persistent();
                let outcome = apply_heartbeat_reply(&mut state, term, &resp);
                self.persist_if_changed(before, &state);

                if outcome == ReplyOutcome::SteppedDown {
                    tracing::info!(
                        node_id = self.id,
                        peer_id,
                        new_term = resp.term,
                        "Heartbeat reply carried a newer term, stepping down"
                    );
                    self.role_changed.raise();
                }
            }
            Err(e) => {
                tracing::trace!(node_id = self.id, peer_id, error = %e, "AppendEntries failed");
            }
        }
    }
}
