use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::raft::{ApplyMsg, FilePersister, MemoryPersister, Persister, RaftNode};
use crate::transport::GrpcTransport;

/// A Raft process: the election core served over gRPC, plus an optional
/// status endpoint.
pub struct Node {
    pub config: NodeConfig,
    pub raft_node: Arc<RaftNode>,
    pub dashboard_addr: Option<SocketAddr>,
}

impl Node {
    /// Build the node and the receiving end of its commit channel.
    pub fn new(
        config: NodeConfig,
        dashboard_addr: Option<SocketAddr>,
    ) -> Result<(Self, mpsc::Receiver<ApplyMsg>)> {
        let persister: Arc<dyn Persister> = match &config.data_dir {
            Some(dir) => Arc::new(FilePersister::new(dir)?),
            None => {
                tracing::warn!("No data directory configured, term and vote are kept in memory");
                Arc::new(MemoryPersister::new())
            }
        };
        let transport = Arc::new(GrpcTransport::new(&config)?);
        let (apply_tx, apply_rx) = mpsc::channel(100);

        let raft_node = RaftNode::new(config.clone(), transport, persister, apply_tx)?;

        let node = Self {
            config,
            raft_node: Arc::new(raft_node),
            dashboard_addr,
        };

        Ok((node, apply_rx))
    }

    /// Run the node with all components.
    ///
    /// Spawns the Raft event loop and, if configured, the dashboard, then
    /// serves gRPC until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails to start or encounters a fatal error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let raft_node = self.raft_node.clone();
        let raft_shutdown = shutdown.clone();
        let raft_handle = tokio::spawn(async move {
            raft_node.run(raft_shutdown).await;
        });

        if let Some(dashboard_addr) = self.dashboard_addr {
            let dashboard_state = DashboardState {
                raft_node: self.raft_node.clone(),
            };
            let dashboard_shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_dashboard(dashboard_addr, dashboard_state, dashboard_shutdown).await;
            });
        }

        let server = GrpcServer::new(self.config.listen_addr, self.raft_node.clone());
        let served = server.run(shutdown.clone()).await;

        // Stop the event loop too if the server exited on its own
        shutdown.cancel();
        if let Err(e) = raft_handle.await {
            tracing::error!(error = %e, "Raft event loop panicked");
        }

        served?;
        Ok(())
    }
}
