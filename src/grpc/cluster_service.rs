use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::proto::raft_service_server::RaftService;
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::raft::RaftNode;

/// Serves a peer's RequestVote and AppendEntries calls against the local
/// `RaftNode`. Protocol decisions never fail the call; a refusal travels
/// in the reply body alongside our term.
pub struct ClusterService {
    raft_node: Arc<RaftNode>,
}

impl ClusterService {
    pub fn new(raft_node: Arc<RaftNode>) -> Self {
        Self { raft_node }
    }
}

#[tonic::async_trait]
impl RaftService for ClusterService {
    async fn request_vote(
        &self,
        request: Request<VoteRequest>,
    ) -> Result<Response<VoteResponse>, Status> {
        let remote = request.remote_addr();
        let req = request.into_inner();

        let reply = self.raft_node.handle_request_vote(req.clone()).await;
        tracing::debug!(
            candidate = req.candidate_id,
            candidate_term = req.term,
            ?remote,
            granted = reply.vote_granted,
            our_term = reply.term,
            "Answered vote request"
        );

        Ok(Response::new(reply))
    }

    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        let req = request.into_inner();

        let reply = self.raft_node.handle_append_entries(req.clone()).await;
        if !reply.success {
            tracing::debug!(
                leader = req.leader_id,
                leader_term = req.term,
                our_term = reply.term,
                "Refused heartbeat from stale leader"
            );
        }

        Ok(Response::new(reply))
    }
}
