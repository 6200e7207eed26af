use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::raft::timer::ElectionTimer;

/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// The part of `RaftState` that survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistentState {
    pub current_term: u64,
    pub voted_for: Option<u64>,
}

/// Term, role and vote bookkeeping for one node.
///
/// # Election Safety
///
/// At most one leader can be elected in a given term. Enforced by:
/// - `current_term` only moves forward (`adopt_term` ignores older terms)
/// - Each node votes for at most one candidate per term (`voted_for` is only
///   cleared when the term advances)
/// - `Leader` is only reachable from `Candidate`, and callers promote only
///   once `has_majority` holds for the round's term
///
/// Every field is guarded by the single lock the owning `RaftNode` holds
/// around the whole record.
#[derive(Debug)]
pub struct RaftState {
    pub node_id: u64,

    // Persistent state
    pub current_term: u64,
    pub voted_for: Option<u64>,

    // Current role
    pub role: RaftRole,

    // Known leader (if any)
    pub leader_id: Option<u64>,

    // Votes received in current election (for candidates)
    pub votes_received: u64,

    // When the event loop starts the next election if nothing intervenes
    pub election_deadline: Instant,

    timer: ElectionTimer,
}

impl RaftState {
    pub fn new(node_id: u64, mut timer: ElectionTimer) -> Self {
        let election_deadline = Instant::now() + timer.next_timeout();
        Self {
            node_id,
            current_term: 0,
            voted_for: None,
            role: RaftRole::Follower,
            leader_id: None,
            votes_received: 0,
            election_deadline,
            timer,
        }
    }

    /// Load term and vote recovered from stable storage.
    pub fn restore(&mut self, persisted: PersistentState) {
        self.current_term = persisted.current_term;
        self.voted_for = persisted.voted_for;
    }

    pub fn persistent(&self) -> PersistentState {
        PersistentState {
            current_term: self.current_term,
            voted_for: self.voted_for,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == RaftRole::Leader
    }

    /// Push the election deadline out by a freshly drawn timeout.
    pub fn reset_election_deadline(&mut self) {
        self.election_deadline = Instant::now() + self.timer.next_timeout();
    }

    /// Adopt a term seen in a message, reverting to follower if it is newer.
    ///
    /// Returns true when the term advanced. Older or equal terms are ignored.
    pub fn adopt_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }

        tracing::debug!(
            node_id = self.node_id,
            old_term = self.current_term,
            new_term = term,
            "Observed higher term"
        );
        self.current_term = term;
        self.voted_for = None;
        self.leader_id = None;
        if self.role != RaftRole::Follower {
            self.transition_to(RaftRole::Follower);
        }
        true
    }

    /// Move to `target`, applying the entry actions of that role.
    ///
    /// Entering `Candidate` (from follower, or again from candidate) opens a
    /// new election round. Transitions Raft never takes (follower straight to
    /// leader, leader back to candidate) are refused with a warning.
    /// Returns true when the state changed.
    pub fn transition_to(&mut self, target: RaftRole) -> bool {
        let from = self.role;
        match (from, target) {
            (RaftRole::Follower, RaftRole::Follower) | (RaftRole::Leader, RaftRole::Leader) => {
                return false;
            }
            (RaftRole::Follower, RaftRole::Leader) | (RaftRole::Leader, RaftRole::Candidate) => {
                tracing::warn!(
                    node_id = self.node_id,
                    term = self.current_term,
                    %from,
                    to = %target,
                    "Invalid role transition requested, ignoring"
                );
                return false;
            }
            (_, RaftRole::Follower) => {
                self.role = RaftRole::Follower;
                self.votes_received = 0;
                // A demoted node must not time out on a deadline armed in its old role
                self.reset_election_deadline();
            }
            (_, RaftRole::Candidate) => {
                self.role = RaftRole::Candidate;
                self.current_term += 1;
                self.voted_for = Some(self.node_id);
                self.votes_received = 1; // Vote for self
                self.leader_id = None;
                self.reset_election_deadline();
            }
            (RaftRole::Candidate, RaftRole::Leader) => {
                self.role = RaftRole::Leader;
                self.leader_id = Some(self.node_id);
            }
        }

        tracing::info!(
            node_id = self.node_id,
            term = self.current_term,
            %from,
            to = %target,
            "Role transition"
        );
        true
    }

    /// Whether the votes gathered so far reach the `majority` quorum.
    pub fn has_majority(&self, majority: usize) -> bool {
        self.votes_received >= majority as u64
    }
}
