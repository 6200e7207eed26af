//! Point-to-point RPC delivery between Raft peers.
//!
//! A call either returns the peer's reply within a bounded time or fails.
//! Failure does not say why (peer down, request lost, reply lost); the
//! election core treats it as an abstention and never retries within a round.

pub mod grpc;
pub mod local;

use crate::error::Result;
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};

pub use grpc::GrpcTransport;
pub use local::{LocalNetwork, LocalTransport};

#[tonic::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request_vote(&self, peer_id: u64, req: VoteRequest) -> Result<VoteResponse>;

    async fn append_entries(
        &self,
        peer_id: u64,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;
}
