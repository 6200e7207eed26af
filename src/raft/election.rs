//! Applying RPC replies to local state.
//!
//! Replies come back on spawned tasks, possibly long after the round that sent
//! them. Each function here runs under the state lock and first re-validates
//! that the round is still current, so late replies are no-ops.

use crate::proto::{AppendEntriesResponse, VoteResponse};
use crate::raft::state::{RaftRole, RaftState};

/// What a reply did to the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The round the reply belongs to is over; nothing changed.
    Stale,
    /// The peer declined at our term.
    Rejected,
    /// A granted vote was tallied but majority is not reached yet.
    VoteCounted,
    /// The tally reached a majority and this node became leader.
    Elected,
    /// The reply carried a newer term and this node reverted to follower.
    SteppedDown,
    /// A heartbeat reply at or below our term.
    Acknowledged,
}

impl ReplyOutcome {
    /// Whether the reply moved this node to a different role.
    pub fn changed_role(self) -> bool {
        matches!(self, ReplyOutcome::Elected | ReplyOutcome::SteppedDown)
    }
}

/// True while `state` is still in the `role` it held for the round at `round_term`.
pub fn round_is_current(state: &RaftState, role: RaftRole, round_term: u64) -> bool {
    state.role == role && state.current_term == round_term
}

/// Tally one RequestVote reply for the election round at `round_term`.
pub fn apply_vote_reply(
    state: &mut RaftState,
    round_term: u64,
    reply: &VoteResponse,
    majority: usize,
) -> ReplyOutcome {
    if state.adopt_term(reply.term) {
        return ReplyOutcome::SteppedDown;
    }

    if !round_is_current(state, RaftRole::Candidate, round_term) {
        return ReplyOutcome::Stale;
    }

    if !reply.vote_granted {
        return ReplyOutcome::Rejected;
    }

    state.votes_received += 1;
    if state.has_majority(majority) {
        tracing::info!(
            node_id = state.node_id,
            term = round_term,
            votes = state.votes_received,
            "Won election"
        );
        state.transition_to(RaftRole::Leader);
        ReplyOutcome::Elected
    } else {
        ReplyOutcome::VoteCounted
    }
}

/// Apply one heartbeat reply for the leadership round at `round_term`.
pub fn apply_heartbeat_reply(
    state: &mut RaftState,
    round_term: u64,
    reply: &AppendEntriesResponse,
) -> ReplyOutcome {
    if state.adopt_term(reply.term) {
        return ReplyOutcome::SteppedDown;
    }

    if !round_is_current(state, RaftRole::Leader, round_term) {
        return ReplyOutcome::Stale;
    }

    // Log matching and backoff on `success == false` belong to replication.
    ReplyOutcome::Acknowledged
}
