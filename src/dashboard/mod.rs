use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::raft::{RaftNode, RaftRole};

#[derive(Clone)]
pub struct DashboardState {
    pub raft_node: Arc<RaftNode>,
}

#[derive(Serialize)]
struct NodeStateResponse {
    node_id: u64,
    role: RaftRole,
    current_term: u64,
    voted_for: Option<u64>,
    leader_id: Option<u64>,
    is_leader: bool,
}

/// Routes served by the status endpoint.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/state", get(node_state_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn node_state_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let status = state.raft_node.status().await;

    Json(NodeStateResponse {
        node_id: status.node_id,
        role: status.role,
        current_term: status.current_term,
        voted_for: status.voted_for,
        leader_id: status.leader_id,
        is_leader: status.role == RaftRole::Leader,
    })
}
