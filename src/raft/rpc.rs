use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::raft::state::{RaftRole, RaftState};

/// Handle RequestVote RPC
pub fn handle_request_vote(state: &mut RaftState, req: &VoteRequest) -> VoteResponse {
    let vote_granted = if req.term < state.current_term {
        // Reject if request term is less than our current term
        false
    } else if state.adopt_term(req.term) {
        // Newer term: we have not voted in it yet
        state.voted_for = Some(req.candidate_id);
        true
    } else if state.voted_for.is_none() || state.voted_for == Some(req.candidate_id) {
        state.voted_for = Some(req.candidate_id);
        true
    } else {
        // Already voted for someone else in this term
        false
    };

    if vote_granted {
        state.reset_election_deadline();
    }

    tracing::debug!(
        node_id = state.node_id,
        candidate = req.candidate_id,
        term = req.term,
        granted = vote_granted,
        "RequestVote response"
    );

    VoteResponse {
        term: state.current_term,
        vote_granted,
    }
}

/// Handle a heartbeat-only AppendEntries RPC
pub fn handle_append_entries(
    state: &mut RaftState,
    req: &AppendEntriesRequest,
) -> AppendEntriesResponse {
    // Reject if request term is less than our current term
    if req.term < state.current_term {
        tracing::debug!(
            node_id = state.node_id,
            leader = req.leader_id,
            term = req.term,
            current_term = state.current_term,
            "Rejecting AppendEntries from stale leader"
        );
        return AppendEntriesResponse {
            term: state.current_term,
            success: false,
        };
    }

    state.adopt_term(req.term);

    match state.role {
        RaftRole::Candidate => {
            // Another node already won this term
            state.transition_to(RaftRole::Follower);
        }
        RaftRole::Leader => {
            // Two leaders in one term means votes were lost or double-counted.
            // Yield so the cluster converges on the sender.
            tracing::warn!(
                node_id = state.node_id,
                other_leader = req.leader_id,
                term = state.current_term,
                "AppendEntries from another leader in our own term, stepping down"
            );
            state.transition_to(RaftRole::Follower);
        }
        RaftRole::Follower => {}
    }

    state.leader_id = Some(req.leader_id);
    state.reset_election_deadline();

    tracing::trace!(
        node_id = state.node_id,
        leader = req.leader_id,
        term = state.current_term,
        "Accepted heartbeat"
    );

    AppendEntriesResponse {
        term: state.current_term,
        success: true,
    }
}
