//! # Faulty Network Simulator
//!
//! A `NetworkTransport` double that layers configurable latency, packet
//! loss, and network partitions on top of the same registration model
//! [`crate::network::InMemoryBus`] uses. [`ConsensusTestHarness`]
//! (`rabia-testing::fault_injection`) drives chaos scenarios through this
//! simulator; scenarios needing fully deterministic ordering should use
//! [`crate::network::InMemoryNetwork`] instead.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rabia_core::messages::ProtocolMessage;
use rabia_core::network::NetworkTransport;
use rabia_core::{NodeId, Result};
use rabia_engine::EngineHandle;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct NetworkConditions {
    pub latency_min: Duration,
    pub latency_max: Duration,
    pub packet_loss_rate: f64,
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self {
            latency_min: Duration::ZERO,
            latency_max: Duration::ZERO,
            packet_loss_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Partition {
    nodes: HashSet<NodeId>,
    until: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkStats {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
}

/// Shared delivery substrate for a cluster of [`SimulatedNetwork`]s.
/// Conditions and partitions are process-wide for the simulator, mirroring
/// how the teacher's harness modeled a single shared "wire" all nodes sit
/// on.
#[derive(Default)]
pub struct NetworkSimulator {
    handles: DashMap<NodeId, EngineHandle>,
    conditions: RwLock<NetworkConditions>,
    partitions: RwLock<Vec<Partition>>,
    sent: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl NetworkSimulator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, node_id: NodeId, handle: EngineHandle) {
        self.handles.insert(node_id, handle);
    }

    pub fn unregister(&self, node_id: NodeId) {
        self.handles.remove(&node_id);
    }

    pub fn set_conditions(&self, conditions: NetworkConditions) {
        *self.conditions.write() = conditions;
    }

    pub fn conditions(&self) -> NetworkConditions {
        self.conditions.read().clone()
    }

    pub fn partition(&self, nodes: HashSet<NodeId>, duration: Duration) {
        debug!(?nodes, ?duration, "network partition injected");
        self.partitions.write().push(Partition {
            nodes,
            until: Instant::now() + duration,
        });
    }

    pub fn heal_partitions(&self) {
        self.partitions.write().clear();
    }

    fn is_partitioned(&self, a: NodeId, b: NodeId) -> bool {
        let now = Instant::now();
        self.partitions.read().iter().any(|p| {
            p.until > now && (p.nodes.contains(&a) != p.nodes.contains(&b))
        })
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_delivered: self.delivered.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn connected_node_count(&self, from: NodeId) -> usize {
        self.handles.len().saturating_sub(usize::from(self.handles.contains_key(&from)))
    }
}

fn spawn_delivery(simulator: Arc<NetworkSimulator>, from: NodeId, to: NodeId, message: ProtocolMessage) {
    simulator.sent.fetch_add(1, Ordering::Relaxed);

    if simulator.is_partitioned(from, to) {
        simulator.dropped.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let conditions = simulator.conditions();
    if conditions.packet_loss_rate > 0.0 && rand::thread_rng().gen::<f64>() < conditions.packet_loss_rate {
        simulator.dropped.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let latency = if conditions.latency_max > Duration::ZERO {
        let lo = conditions.latency_min.as_micros() as u64;
        let hi = conditions.latency_max.as_micros().max(lo as u128 + 1) as u64;
        Duration::from_micros(rand::thread_rng().gen_range(lo..=hi))
    } else {
        Duration::ZERO
    };

    tokio::spawn(async move {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match simulator.handles.get(&to) {
            Some(handle) if handle.deliver(message).is_ok() => {
                simulator.delivered.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                simulator.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
}

/// Per-node [`NetworkTransport`] over a shared [`NetworkSimulator`].
pub struct SimulatedNetwork {
    node_id: NodeId,
    simulator: Arc<NetworkSimulator>,
}

impl SimulatedNetwork {
    pub fn new(node_id: NodeId, simulator: Arc<NetworkSimulator>) -> Self {
        Self { node_id, simulator }
    }
}

#[async_trait]
impl NetworkTransport for SimulatedNetwork {
    async fn broadcast(&self, message: ProtocolMessage) -> Result<()> {
        let targets: Vec<NodeId> = self
            .simulator
            .handles
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| *id != self.node_id)
            .collect();
        for target in targets {
            spawn_delivery(self.simulator.clone(), self.node_id, target, message.clone());
        }
        Ok(())
    }

    async fn send(&self, target: NodeId, message: ProtocolMessage) -> Result<()> {
        spawn_delivery(self.simulator.clone(), self.node_id, target, message);
        Ok(())
    }

    async fn connected_node_count(&self) -> usize {
        self.simulator.connected_node_count(self.node_id)
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
