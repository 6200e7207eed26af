use std::collections::HashMap;
use std::time::Duration;

use tokio::time::timeout;
use tonic::transport::{Channel, Endpoint};

use crate::config::NodeConfig;
use crate::error::{RaftError, Result};
use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::transport::Transport;

/// Transport over tonic gRPC channels, one per peer.
///
/// Channels connect lazily, so a node can start before its peers are up.
pub struct GrpcTransport {
    clients: HashMap<u64, RaftServiceClient<Channel>>,
    rpc_timeout: Duration,
}

impl GrpcTransport {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let rpc_timeout = Duration::from_millis(config.rpc_timeout_ms);
        let mut clients = HashMap::new();

        for peer in config.peers.iter().filter(|p| p.node_id != config.node_id) {
            let addr = format!("http://{}", peer.addr);
            let channel = Endpoint::from_shared(addr.clone())?
                .connect_timeout(rpc_timeout)
                .connect_lazy();
            tracing::debug!(peer_id = peer.node_id, addr = %addr, "Configured peer channel");
            clients.insert(peer.node_id, RaftServiceClient::new(channel));
        }

        Ok(Self {
            clients,
            rpc_timeout,
        })
    }

    fn client(&self, peer_id: u64) -> Result<RaftServiceClient<Channel>> {
        self.clients
            .get(&peer_id)
            .cloned()
            .ok_or(RaftError::PeerUnreachable(peer_id))
    }
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    async fn request_vote(&self, peer_id: u64, req: VoteRequest) -> Result<VoteResponse> {
        let mut client = self.client(peer_id)?;
        match timeout(self.rpc_timeout, client.request_vote(req)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(RaftError::RpcTimeout(peer_id)),
        }
    }

    async fn append_entries(
        &self,
        peer_id: u64,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let mut client = self.client(peer_id)?;
        match timeout(self.rpc_timeout, client.append_entries(req)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(RaftError::RpcTimeout(peer_id)),
        }
    }
}
