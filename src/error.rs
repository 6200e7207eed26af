use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Not the leader, current leader is node {leader_id:?}")]
    NotLeader { leader_id: Option<u64> },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Peer {0} unreachable")]
    PeerUnreachable(u64),

    #[error("RPC to peer {0} timed out")]
    RpcTimeout(u64),

    #[error("gRPC error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RaftError>;
