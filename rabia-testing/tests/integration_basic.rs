//! Basic multi-node consensus smoke tests: a small cluster proposes,
//! decides, and applies client commands through the deterministic
//! in-memory network.

use std::time::Duration;

use rabia_core::Command;
use rabia_engine::ProtocolConfig;
use rabia_testing::DeterministicCluster;
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn three_node_cluster_commits_a_unanimous_batch() {
    let cluster = DeterministicCluster::new(3, ProtocolConfig::default()).await;

    let result = timeout(
        Duration::from_secs(2),
        cluster.handle(0).apply(vec![Command::new("SET key1 value1")]),
    )
    .await
    .expect("decision should not time out")
    .expect("three healthy nodes should reach a fast-path decision");

    assert_eq!(result.len(), 1);

    sleep(Duration::from_millis(50)).await;
    let stats = cluster.statistics().await;
    assert_eq!(stats.len(), 3);
    assert!(stats.iter().all(|s| s.last_committed_phase.value() == 0));

    cluster.shutdown().await;
}

#[tokio::test]
async fn successive_batches_advance_the_phase_on_every_node() {
    let cluster = DeterministicCluster::new(3, ProtocolConfig::default()).await;

    for i in 0..3 {
        timeout(
            Duration::from_secs(2),
            cluster.handle(i % 3).apply(vec![Command::new(format!("SET k{i} v{i}"))]),
        )
        .await
        .expect("decision should not time out")
        .expect("decision should succeed");
    }

    sleep(Duration::from_millis(100)).await;
    let stats = cluster.statistics().await;
    let committed: Vec<u64> = stats.iter().map(|s| s.last_committed_phase.value()).collect();
    assert!(committed.iter().all(|&p| p == committed[0]));
    assert_eq!(committed[0], 2);

    cluster.shutdown().await;
}

#[tokio::test]
async fn five_node_cluster_tolerates_the_loss_of_two_nodes() {
    let cluster = DeterministicCluster::new(5, ProtocolConfig::default()).await;

    cluster.disconnect(3);
    cluster.disconnect(4);

    let result = timeout(
        Duration::from_secs(2),
        cluster.handle(0).apply(vec![Command::new("SET key value")]),
    )
    .await;
    assert!(result.is_ok(), "quorum=3 should still be reachable with 3 of 5 nodes up");

    cluster.shutdown().await;
}
