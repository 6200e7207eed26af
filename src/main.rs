use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use raft_elect::config::{NodeConfig, PeerConfig};
use raft_elect::node::Node;
use raft_elect::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "raft-elect")]
#[command(version)]
#[command(about = "Raft leader election over gRPC")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a cluster member
    Server(ServerArgs),
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Node ID (this node's position in --peers)
    #[arg(long, default_value = "0")]
    node_id: u64,

    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Port for the JSON status endpoint (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Every cluster member including this one (comma-separated, format: "id:host:port")
    /// Example: "0:127.0.0.1:50051,1:127.0.0.1:50052,2:127.0.0.1:50053"
    #[arg(long)]
    peers: String,

    /// Directory for persisted term and vote. In-memory when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Minimum election timeout in milliseconds
    #[arg(long, default_value = "400")]
    election_timeout_min_ms: u64,

    /// Maximum election timeout in milliseconds
    #[arg(long, default_value = "500")]
    election_timeout_max_ms: u64,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "100")]
    heartbeat_interval_ms: u64,

    /// Seed for the election timer, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_peers(peers_str: &str) -> Vec<PeerConfig> {
    if peers_str.is_empty() {
        return Vec::new();
    }

    let mut peers: Vec<PeerConfig> = peers_str
        .split(',')
        .filter_map(|peer| {
            let parts: Vec<&str> = peer.trim().split(':').collect();
            if parts.len() == 3 {
                let node_id: u64 = parts[0].parse().ok()?;
                let host = parts[1];
                let port = parts[2];
                let addr = format!("{}:{}", host, port);
                Some(PeerConfig { node_id, addr })
            } else {
                tracing::warn!(peer, "Invalid peer format, expected id:host:port");
                None
            }
        })
        .collect();

    peers.sort_by_key(|p| p.node_id);
    peers
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let dashboard_addr: Option<SocketAddr> = match args.dashboard_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };

    let config = NodeConfig {
        node_id: args.node_id,
        listen_addr,
        peers: parse_peers(&args.peers),
        election_timeout_min_ms: args.election_timeout_min_ms,
        election_timeout_max_ms: args.election_timeout_max_ms,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        data_dir: args.data_dir,
        rng_seed: args.seed,
        ..NodeConfig::default()
    };

    tracing::info!(
        node_id = config.node_id,
        cluster_size = config.cluster_size(),
        listen_addr = %config.listen_addr,
        "Starting raft-elect node"
    );

    let (node, mut apply_rx) = Node::new(config, dashboard_addr)?;

    // Nothing commits without a replication layer; drain so senders never block.
    tokio::spawn(async move {
        while let Some(msg) = apply_rx.recv().await {
            tracing::debug!(index = msg.index, "Committed entry");
        }
    });

    let shutdown = CancellationToken::new();
    install_shutdown_handler(shutdown.clone())?;

    node.run(shutdown).await?;
    tracing::info!("Node stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
    }
}
