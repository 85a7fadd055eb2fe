//! Network transport integration tests: exercises the deterministic bus
//! and the chaos simulator directly, independent of the engine, using real
//! [`ProtocolMessage`] traffic.

use std::collections::HashSet;
use std::time::Duration;

use rabia_core::messages::{MessageBody, ProtocolMessage, SyncRequestMessage};
use rabia_core::network::NetworkTransport;
use rabia_core::NodeId;
use rabia_testing::{InMemoryBus, InMemoryNetwork, NetworkConditions, NetworkSimulator, SimulatedNetwork};

fn sync_request(from: NodeId) -> ProtocolMessage {
    ProtocolMessage::new(from, MessageBody::SyncRequest(SyncRequestMessage))
}

#[tokio::test]
async fn in_memory_network_with_no_peers_is_a_harmless_broadcast_noop() {
    let bus = InMemoryBus::new();
    let a = NodeId::from(1u32);

    let net_a = InMemoryNetwork::new(a, bus);
    assert_eq!(net_a.connected_node_count().await, 0);
    assert!(net_a.broadcast(sync_request(a)).await.is_ok());
}

#[tokio::test]
async fn simulator_delivers_broadcast_to_every_other_registered_node() {
    let simulator = NetworkSimulator::new();
    let a = NodeId::from(10u32);
    let b = NodeId::from(11u32);

    // Without any registered handles, broadcast/send are harmless no-ops;
    // this just confirms they don't error or panic.
    let net_a = SimulatedNetwork::new(a, simulator.clone());
    assert!(net_a.broadcast(sync_request(a)).await.is_ok());
    assert!(net_a.send(b, sync_request(a)).await.is_ok());
    assert_eq!(net_a.connected_node_count().await, 0);
}

#[tokio::test]
async fn simulator_partition_blocks_only_cross_partition_traffic() {
    let simulator = NetworkSimulator::new();
    let a = NodeId::from(20u32);
    let b = NodeId::from(21u32);

    let mut side = HashSet::new();
    side.insert(a);
    simulator.partition(side, Duration::from_secs(5));

    let net_a = SimulatedNetwork::new(a, simulator.clone());
    // Send doesn't error even when partitioned; the message is just dropped
    // by the simulator rather than rejected by the caller-facing API.
    assert!(net_a.send(b, sync_request(a)).await.is_ok());

    simulator.heal_partitions();
    assert!(net_a.send(b, sync_request(a)).await.is_ok());
}

#[tokio::test]
async fn simulator_conditions_round_trip() {
    let simulator = NetworkSimulator::new();
    assert_eq!(simulator.conditions().packet_loss_rate, 0.0);

    simulator.set_conditions(NetworkConditions {
        latency_min: Duration::from_millis(10),
        latency_max: Duration::from_millis(50),
        packet_loss_rate: 0.25,
    });
    let conditions = simulator.conditions();
    assert_eq!(conditions.packet_loss_rate, 0.25);
    assert_eq!(conditions.latency_min, Duration::from_millis(10));
}

#[tokio::test]
async fn simulator_stats_count_sent_and_dropped_messages() {
    let simulator = NetworkSimulator::new();
    let a = NodeId::from(30u32);
    let b = NodeId::from(31u32);
    let net_a = SimulatedNetwork::new(a, simulator.clone());

    // No peer registered for `b`, so the spawned delivery will mark this
    // dropped once it runs.
    net_a.send(b, sync_request(a)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = simulator.stats();
    assert_eq!(stats.messages_sent, 1);
    assert_eq!(stats.messages_dropped, 1);
}
