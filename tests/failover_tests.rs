//! Failover tests for Raft leader failure and recovery.
//!
//! These tests verify cluster behavior when leaders are isolated or crash,
//! including new leader election, stale leader demotion and restarts.

mod test_harness;

use std::time::Duration;

use raft_elect::raft::RaftRole;
use test_harness::{assert_eventually, TestCluster};

/// New leader with a higher term is elected after the leader is isolated
#[tokio::test]
async fn test_new_leader_after_isolating_leader() {
    let mut cluster = TestCluster::new(3).await;

    let initial_leader = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("Initial leader should be elected");
    let initial_term = cluster
        .get_node(initial_leader)
        .unwrap()
        .current_term()
        .await;

    cluster.isolate_node(initial_leader);

    let new_leader = cluster
        .wait_for_new_leader(initial_leader, Duration::from_secs(3))
        .await
        .expect("Remaining majority should elect a new leader");
    assert_ne!(new_leader, initial_leader);

    let new_term = cluster.get_node(new_leader).unwrap().current_term().await;
    assert!(
        new_term > initial_term,
        "Term should increase after new election"
    );

    cluster.shutdown().await;
}

/// The isolated leader steps down once it hears the newer term
#[tokio::test]
async fn test_stale_leader_steps_down_after_heal() {
    let mut cluster = TestCluster::new(3).await;

    let old_leader = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("Initial leader should be elected");

    cluster.isolate_node(old_leader);
    let new_leader = cluster
        .wait_for_new_leader(old_leader, Duration::from_secs(3))
        .await
        .expect("New leader should be elected");
    let new_term = cluster.get_node(new_leader).unwrap().current_term().await;

    // Cut off, the old leader still believes it leads its older term
    assert!(cluster.get_node(old_leader).unwrap().is_leader().await);

    cluster.heal_node(old_leader);

    let cluster_ref = &cluster;
    assert_eventually(
        || async move {
            let node = cluster_ref.get_node(old_leader).unwrap();
            node.role().await == RaftRole::Follower && node.current_term().await >= new_term
        },
        Duration::from_secs(2),
        "Old leader should step down after healing",
    )
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cluster.count_leaders().await, 1, "Exactly one leader should exist");

    cluster.shutdown().await;
}

/// New leader is elected after leader shutdown
#[tokio::test]
async fn test_new_leader_election_after_shutdown() {
    let mut cluster = TestCluster::new(3).await;

    let initial_leader = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("Initial leader should be elected");
    let initial_term = cluster
        .get_node(initial_leader)
        .unwrap()
        .current_term()
        .await;

    assert!(
        cluster.shutdown_node(initial_leader),
        "Should successfully shutdown leader"
    );

    let new_leader = cluster
        .wait_for_new_leader(initial_leader, Duration::from_secs(3))
        .await
        .expect("New leader should be elected");
    let new_term = cluster.get_node(new_leader).unwrap().current_term().await;

    assert!(new_term > initial_term);
    assert_eq!(cluster.count_leaders().await, 1);

    cluster.shutdown().await;
}

/// A restarted node recovers its term and vote from the persister
#[tokio::test]
async fn test_restarted_node_restores_term() {
    let mut cluster = TestCluster::new(3).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("Leader should be elected");

    let follower = cluster
        .active_node_ids()
        .into_iter()
        .find(|&id| id != leader)
        .expect("Should have at least one follower");

    let cluster_ref = &cluster;
    let leader_term = cluster.get_node(leader).unwrap().current_term().await;
    assert_eventually(
        || async move {
            cluster_ref.get_node(follower).unwrap().current_term().await == leader_term
        },
        Duration::from_secs(1),
        "Follower should adopt the leader's term",
    )
    .await;

    let (persister, term_before, vote_before) = {
        let node = cluster.get_node(follower).unwrap();
        (
            node.persister.clone(),
            node.current_term().await,
            node.voted_for().await,
        )
    };

    cluster.shutdown_node(follower);
    cluster.restart_node(follower, persister);

    let restarted = cluster.get_node(follower).unwrap();
    let status = restarted.raft_node.status().await;
    assert!(status.current_term >= term_before, "Term must not go backwards");
    if status.current_term == term_before {
        assert_eq!(status.voted_for, vote_before);
    }

    let cluster_ref = &cluster;
    assert_eventually(
        || async move { cluster_ref.count_leaders().await == 1 },
        Duration::from_secs(3),
        "Cluster should keep exactly one leader after restart",
    )
    .await;

    cluster.shutdown().await;
}

/// Majority of a five-node cluster survives two crashed nodes
#[tokio::test]
async fn test_five_nodes_tolerate_two_failures() {
    let mut cluster = TestCluster::new(5).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("Leader should be elected");

    cluster.shutdown_node(leader);
    let second = cluster
        .wait_for_new_leader(leader, Duration::from_secs(3))
        .await
        .expect("Second leader should be elected");

    cluster.shutdown_node(second);
    let third = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("Three remaining nodes still form a majority");

    assert_ne!(third, leader);
    assert_ne!(third, second);

    cluster.shutdown().await;
}
