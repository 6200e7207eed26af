#![allow(dead_code)]

//! Test harness for multi-node Raft cluster integration tests.
//!
//! Runs every node in the test's runtime and wires them together with a
//! `LocalNetwork`, so partitions and crashes are simulated without sockets.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use raft_elect::config::NodeConfig;
use raft_elect::raft::{ApplyMsg, MemoryPersister, RaftNode, RaftRole};
use raft_elect::transport::LocalNetwork;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cluster configuration with shorter timeouts for faster tests
pub fn test_node_config(node_id: u64, num_nodes: usize) -> NodeConfig {
    let mut config = NodeConfig {
        node_id,
        // Shorter timeouts for faster tests
        election_timeout_min_ms: 150,
        election_timeout_max_ms: 300,
        heartbeat_interval_ms: 30,
        rpc_timeout_ms: 50,
        rng_seed: Some(1000 + node_id),
        ..NodeConfig::default()
    };
    for id in 0..num_nodes as u64 {
        config = config.with_peer(id, format!("local-{}", id));
    }
    config
}

/// Handle to a running test node
pub struct TestNode {
    pub node_id: u64,
    pub raft_node: Arc<RaftNode>,
    pub persister: Arc<MemoryPersister>,
    shutdown: CancellationToken,
    raft_handle: JoinHandle<()>,
    _apply_rx: mpsc::Receiver<ApplyMsg>,
}

impl TestNode {
    /// Check if this node is the leader
    pub async fn is_leader(&self) -> bool {
        self.raft_node.get_state().await.1
    }

    /// Get the current term
    pub async fn current_term(&self) -> u64 {
        self.raft_node.get_state().await.0
    }

    pub async fn role(&self) -> RaftRole {
        self.raft_node.state.lock().await.role
    }

    pub async fn voted_for(&self) -> Option<u64> {
        self.raft_node.state.lock().await.voted_for
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.raft_handle.abort();
    }
}

/// Test cluster managing multiple nodes
pub struct TestCluster {
    pub nodes: HashMap<u64, TestNode>,
    pub network: LocalNetwork,
    num_nodes: usize,
    configure: fn(u64, usize) -> NodeConfig,
}

impl TestCluster {
    /// Create and start a cluster with n nodes
    pub async fn new(num_nodes: usize) -> Self {
        Self::with_config(num_nodes, test_node_config).await
    }

    /// Create and start a cluster whose node configs come from `configure`
    pub async fn with_config(num_nodes: usize, configure: fn(u64, usize) -> NodeConfig) -> Self {
        let mut cluster = Self {
            nodes: HashMap::new(),
            network: LocalNetwork::new(),
            num_nodes,
            configure,
        };

        for node_id in 0..num_nodes as u64 {
            let test_node = cluster.start_node(node_id, Arc::new(MemoryPersister::new()));
            cluster.nodes.insert(node_id, test_node);
        }

        cluster
    }

    /// Start a single node on the cluster network
    fn start_node(&self, node_id: u64, persister: Arc<MemoryPersister>) -> TestNode {
        let config = (self.configure)(node_id, self.num_nodes);
        let transport = Arc::new(
            self.network
                .transport(node_id, Duration::from_millis(config.rpc_timeout_ms)),
        );
        let (apply_tx, apply_rx) = mpsc::channel(16);

        let raft_node = Arc::new(
            RaftNode::new(config, transport, persister.clone(), apply_tx)
                .expect("test config is valid"),
        );
        self.network.register(&raft_node);

        let shutdown = CancellationToken::new();
        let raft_node_clone = raft_node.clone();
        let raft_shutdown = shutdown.clone();
        let raft_handle = tokio::spawn(async move {
            raft_node_clone.run(raft_shutdown).await;
        });

        TestNode {
            node_id,
            raft_node,
            persister,
            shutdown,
            raft_handle,
            _apply_rx: apply_rx,
        }
    }

    /// Get a reference to a specific node
    pub fn get_node(&self, node_id: u64) -> Option<&TestNode> {
        self.nodes.get(&node_id)
    }

    /// Get IDs of all active nodes
    pub fn active_node_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Wait for leader election with timeout
    pub async fn wait_for_leader(&self, timeout_duration: Duration) -> Option<u64> {
        let group = self.active_node_ids();
        self.wait_for_leader_in_group(&group, timeout_duration).await
    }

    /// Wait for a leader to emerge within a specific group of nodes
    pub async fn wait_for_leader_in_group(
        &self,
        group: &[u64],
        timeout_duration: Duration,
    ) -> Option<u64> {
        let found = wait_for(
            || async move { self.leader_in_group(group).await.is_some() },
            timeout_duration,
            Duration::from_millis(10),
        )
        .await;

        if found {
            self.leader_in_group(group).await
        } else {
            None
        }
    }

    async fn leader_in_group(&self, group: &[u64]) -> Option<u64> {
        for &node_id in group {
            if let Some(node) = self.nodes.get(&node_id) {
                if node.is_leader().await {
                    return Some(node_id);
                }
            }
        }
        None
    }

    /// Wait for a new leader among remaining nodes (excluding a specific node)
    pub async fn wait_for_new_leader(
        &self,
        excluded_node: u64,
        timeout_duration: Duration,
    ) -> Option<u64> {
        let group: Vec<u64> = self
            .active_node_ids()
            .into_iter()
            .filter(|&id| id != excluded_node)
            .collect();
        self.wait_for_leader_in_group(&group, timeout_duration).await
    }

    /// Get current leader ID
    pub async fn get_leader_id(&self) -> Option<u64> {
        self.leader_in_group(&self.active_node_ids()).await
    }

    /// Count the number of leaders in the cluster
    pub async fn count_leaders(&self) -> usize {
        let mut count = 0;
        for node in self.nodes.values() {
            if node.is_leader().await {
                count += 1;
            }
        }
        count
    }

    /// Every (term, is_leader) pair, keyed by node id
    pub async fn sample_states(&self) -> HashMap<u64, (u64, bool)> {
        let mut states = HashMap::new();
        for (&node_id, node) in &self.nodes {
            states.insert(node_id, node.raft_node.get_state().await);
        }
        states
    }

    /// Isolate a node from all other nodes
    pub fn isolate_node(&self, node_id: u64) {
        self.network.isolate(node_id);
    }

    /// Heal an isolated node (reconnect to all others)
    pub fn heal_node(&self, node_id: u64) {
        self.network.heal(node_id);
    }

    /// Create a network partition: group_a can't communicate with group_b and vice versa
    pub fn create_partition(&self, group_a: &[u64], group_b: &[u64]) {
        self.network.partition(group_a, group_b);
    }

    pub fn heal_all(&self) {
        self.network.heal_all();
    }

    /// Shutdown a specific node (simulates crash)
    pub fn shutdown_node(&mut self, node_id: u64) -> bool {
        self.network.deregister(node_id);
        // Removing the node will drop it, aborting its event loop
        self.nodes.remove(&node_id).is_some()
    }

    /// Restart a crashed node on the storage it had before
    pub fn restart_node(&mut self, node_id: u64, persister: Arc<MemoryPersister>) {
        let test_node = self.start_node(node_id, persister);
        self.nodes.insert(node_id, test_node);
    }

    /// Shutdown all nodes (best effort cleanup)
    pub async fn shutdown(&mut self) {
        self.nodes.clear();
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
#[allow(dead_code)]
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}
