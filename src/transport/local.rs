//! In-process network for running whole clusters inside one runtime.
//!
//! Modeled on a lossy datagram network: links can be cut per direction,
//! whole nodes isolated, requests and replies dropped at random, and every
//! delivery delayed by a random latency. Used by the integration tests and
//! handy for simulations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};

use crate::error::{RaftError, Result};
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::raft::RaftNode;
use crate::transport::Transport;

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<u64, Weak<RaftNode>>,
    /// Nodes that neither send nor receive.
    isolated: HashSet<u64>,
    /// Directed links (from, to) that drop everything.
    cut_links: HashSet<(u64, u64)>,
    /// Probability of losing each request and each reply.
    drop_rate: f64,
    latency: (Duration, Duration),
}

/// Shared handle to the simulated network. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<RwLock<NetworkState>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` reachable under its id. Only a weak reference is kept.
    pub fn register(&self, node: &Arc<RaftNode>) {
        self.write().nodes.insert(node.id, Arc::downgrade(node));
    }

    /// Remove a node entirely, as if its process had exited.
    pub fn deregister(&self, node_id: u64) {
        self.write().nodes.remove(&node_id);
    }

    /// Transport endpoint for `node_id`, bounding each call by `rpc_timeout`.
    pub fn transport(&self, node_id: u64, rpc_timeout: Duration) -> LocalTransport {
        LocalTransport {
            network: self.clone(),
            node_id,
            rpc_timeout,
        }
    }

    /// Drop all traffic to and from `node_id`.
    pub fn isolate(&self, node_id: u64) {
        self.write().isolated.insert(node_id);
    }

    pub fn heal(&self, node_id: u64) {
        self.write().isolated.remove(&node_id);
    }

    /// Cut every link between the two groups, in both directions.
    pub fn partition(&self, group_a: &[u64], group_b: &[u64]) {
        let mut state = self.write();
        for &a in group_a {
            for &b in group_b {
                state.cut_links.insert((a, b));
                state.cut_links.insert((b, a));
            }
        }
    }

    /// Restore every link and un-isolate every node.
    pub fn heal_all(&self) {
        let mut state = self.write();
        state.cut_links.clear();
        state.isolated.clear();
    }

    pub fn set_drop_rate(&self, drop_rate: f64) {
        self.write().drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    pub fn set_latency(&self, min: Duration, max: Duration) {
        self.write().latency = (min, max.max(min));
    }

    /// Decide the fate of one message from `from` to `to`.
    ///
    /// Returns the target (when it is still alive) and how long delivery takes.
    fn route(&self, from: u64, to: u64) -> Result<(Option<Arc<RaftNode>>, Duration)> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        if state.isolated.contains(&from)
            || state.isolated.contains(&to)
            || state.cut_links.contains(&(from, to))
        {
            return Err(RaftError::PeerUnreachable(to));
        }

        let mut rng = rand::thread_rng();
        if state.drop_rate > 0.0 && rng.gen_bool(state.drop_rate) {
            tracing::trace!(from, to, "Dropping message");
            return Err(RaftError::PeerUnreachable(to));
        }

        let (min, max) = state.latency;
        let delay = if max > min {
            rng.gen_range(min..max)
        } else {
            min
        };

        let target = state.nodes.get(&to).and_then(Weak::upgrade);
        Ok((target, delay))
    }

    /// Carry a request to `to`. Fails when the link is down or the message is lost.
    async fn deliver(&self, from: u64, to: u64) -> Result<Arc<RaftNode>> {
        let (target, delay) = self.route(from, to)?;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        target.ok_or(RaftError::PeerUnreachable(to))
    }

    async fn deliver_reply(&self, from: u64, to: u64) -> Result<()> {
        // The reply travels the reverse link and can be lost after the handler ran.
        let (_, delay) = self.route(to, from)?;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, NetworkState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One node's view of a `LocalNetwork`.
#[derive(Clone)]
pub struct LocalTransport {
    network: LocalNetwork,
    node_id: u64,
    rpc_timeout: Duration,
}

#[tonic::async_trait]
impl Transport for LocalTransport {
    async fn request_vote(&self, peer_id: u64, req: VoteRequest) -> Result<VoteResponse> {
        let call = async {
            let target = self.network.deliver(self.node_id, peer_id).await?;
            let response = target.handle_request_vote(req).await;
            self.network.deliver_reply(self.node_id, peer_id).await?;
            Ok::<_, RaftError>(response)
        };
        timeout(self.rpc_timeout, call)
            .await
            .map_err(|_| RaftError::RpcTimeout(peer_id))?
    }

    async fn append_entries(
        &self,
        peer_id: u64,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let call = async {
            let target = self.network.deliver(self.node_id, peer_id).await?;
            let response = target.handle_append_entries(req).await;
            self.network.deliver_reply(self.node_id, peer_id).await?;
            Ok::<_, RaftError>(response)
        };
        timeout(self.rpc_timeout, call)
            .await
            .map_err(|_| RaftError::RpcTimeout(peer_id))?
    }
}
