use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{RaftError, Result};

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's index into `peers`.
    pub node_id: u64,
    pub listen_addr: SocketAddr,
    /// Every member of the cluster, this node included, ordered by id.
    pub peers: Vec<PeerConfig>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Upper bound on a single outbound RPC.
    pub rpc_timeout_ms: u64,
    /// Where `FilePersister` keeps its state. In-memory when unset.
    pub data_dir: Option<PathBuf>,
    /// Fixed seed for the election timer. Drawn from OS entropy when unset.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub node_id: u64,
    pub addr: String, // host:port format, supports both IP and hostnames
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:50051"
                .parse()
                .expect("default listen address is valid"),
            peers: Vec::new(),
            election_timeout_min_ms: 400,
            election_timeout_max_ms: 500,
            heartbeat_interval_ms: 100,
            rpc_timeout_ms: 100,
            data_dir: None,
            rng_seed: None,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: u64, listen_addr: SocketAddr) -> Self {
        Self {
            node_id,
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, node_id: u64, addr: String) -> Self {
        self.peers.push(PeerConfig { node_id, addr });
        self
    }

    /// Number of voting members, self included.
    pub fn cluster_size(&self) -> usize {
        self.peers.len()
    }

    /// Votes needed to win an election: a strict majority of the cluster.
    pub fn majority(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// Ids of every member except this node.
    pub fn other_peers(&self) -> Vec<u64> {
        self.peers
            .iter()
            .map(|p| p.node_id)
            .filter(|&id| id != self.node_id)
            .collect()
    }

    /// Check the assumptions the election core relies on.
    pub fn validate(&self) -> Result<()> {
        if self.peers.is_empty() {
            return Err(RaftError::Config("peer list is empty".to_string()));
        }

        for (position, peer) in self.peers.iter().enumerate() {
            if peer.node_id != position as u64 {
                return Err(RaftError::Config(format!(
                    "peer at position {} has id {}, ids must match their position",
                    position, peer.node_id
                )));
            }
        }

        if self.node_id as usize >= self.peers.len() {
            return Err(RaftError::Config(format!(
                "node id {} is not in the peer list of {} nodes",
                self.node_id,
                self.peers.len()
            )));
        }

        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(RaftError::Config(format!(
                "election timeout range {}..{}ms is empty",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }

        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err(RaftError::Config(format!(
                "heartbeat interval {}ms must be shorter than the minimum election timeout {}ms",
                self.heartbeat_interval_ms, self.election_timeout_min_ms
            )));
        }

        Ok(())
    }
}
