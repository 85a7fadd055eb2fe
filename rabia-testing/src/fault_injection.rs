//! # Consensus Test Harness and Chaos Scenarios
//!
//! Spins up a cluster of real [`RabiaEngine`] instances over a shared
//! [`NetworkSimulator`], submits commands, injects faults on a schedule, and
//! checks the cluster converges the way [`ExpectedOutcome`] says it should.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use rabia_core::metrics::EngineStatistics;
use rabia_core::state_machine::InMemoryStateMachine;
use rabia_core::{Command, NodeId};
use rabia_engine::{EngineHandle, ProtocolConfig, RabiaEngine};
use rabia_persistence::InMemoryPersistence;

use crate::network_sim::{NetworkConditions, NetworkSimulator, NetworkStats, SimulatedNetwork};
use crate::topology::FixedTopology;

#[derive(Debug, Clone)]
pub enum FaultType {
    /// Removes a node from the simulator and notifies it that quorum
    /// disappeared; re-registers and re-establishes it after `duration`.
    NodeCrash { node_index: usize, duration: Duration },
    NetworkPartition { node_indices: Vec<usize>, duration: Duration },
    PacketLoss { rate: f64, duration: Duration },
    HighLatency { min: Duration, max: Duration, duration: Duration },
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    pub node_count: usize,
    pub initial_commands: Vec<Command>,
    /// `(delay from scenario start, fault to inject)`, injected in order.
    pub faults: Vec<(Duration, FaultType)>,
    pub expected_outcome: ExpectedOutcome,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutcome {
    AllCommitted,
    PartialCommitment { min_committed: u64 },
    NoProgress,
    EventualConsistency,
}

struct ClusterNode {
    handle: EngineHandle,
    engine_task: tokio::task::JoinHandle<()>,
}

/// A running cluster of `node_count` engines wired to one shared
/// [`NetworkSimulator`], in node-creation order (fault indices address this
/// order).
pub struct ConsensusTestHarness {
    simulator: Arc<NetworkSimulator>,
    node_ids: Vec<NodeId>,
    nodes: HashMap<NodeId, ClusterNode>,
}

impl ConsensusTestHarness {
    pub async fn new(node_count: usize, config: ProtocolConfig) -> Self {
        let simulator = NetworkSimulator::new();
        let node_ids: Vec<NodeId> = (0..node_count).map(|_| NodeId::new()).collect();
        let mut nodes = HashMap::new();

        for &node_id in &node_ids {
            let topology = Arc::new(FixedTopology::new(node_id, node_ids.clone()));
            let network = Arc::new(SimulatedNetwork::new(node_id, simulator.clone()));
            let state_machine = InMemoryStateMachine::new();
            let persistence = Arc::new(InMemoryPersistence::new());

            let (engine, handle) =
                RabiaEngine::new(config.clone(), state_machine, network, topology, persistence);
            simulator.register(node_id, handle.clone());
            let engine_task = tokio::spawn(engine.run());

            nodes.insert(node_id, ClusterNode { handle, engine_task });
        }

        let harness = Self {
            simulator,
            node_ids,
            nodes,
        };
        harness.notify_all_established();
        harness
    }

    fn notify_all_established(&self) {
        for node in self.nodes.values() {
            let _ = node
                .handle
                .notify_quorum(rabia_core::messages::QuorumState::Established);
        }
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    fn handle_at(&self, index: usize) -> &EngineHandle {
        &self.nodes[&self.node_ids[index]].handle
    }

    /// Submits `commands` as one batch to node `index` and awaits the
    /// decided results.
    pub async fn apply_at(&self, index: usize, commands: Vec<Command>) -> rabia_core::Result<Vec<bytes::Bytes>> {
        self.handle_at(index).apply(commands).await
    }

    pub async fn statistics(&self) -> HashMap<NodeId, EngineStatistics> {
        let mut stats = HashMap::new();
        for (&node_id, node) in &self.nodes {
            if let Ok(s) = node.handle.statistics().await {
                stats.insert(node_id, s);
            }
        }
        stats
    }

    pub async fn run_scenario(&self, scenario: TestScenario) -> TestResult {
        info!(name = %scenario.name, "running chaos scenario");
        let start = Instant::now();

        for (i, command) in scenario.initial_commands.into_iter().enumerate() {
            let index = i % self.node_ids.len();
            if let Err(err) = self.handle_at(index).submit(vec![command]) {
                warn!(%err, index, "failed to submit initial command");
            }
        }

        for (delay, fault) in scenario.faults {
            sleep(delay).await;
            self.inject_fault(fault).await;
        }

        sleep(scenario.timeout).await;

        let stats = self.statistics().await;
        let network_stats = self.simulator.stats();
        let actual = ActualOutcome::from_statistics(&stats);
        let success = Self::check_expected_outcome(&scenario.expected_outcome, &actual);

        TestResult {
            scenario: scenario.name,
            success,
            duration: start.elapsed(),
            network_stats,
            actual_outcome: actual,
        }
    }

    async fn inject_fault(&self, fault: FaultType) {
        match fault {
            FaultType::NodeCrash { node_index, duration } => {
                let node_id = self.node_ids[node_index];
                info!(%node_id, ?duration, "injecting node crash");
                self.simulator.unregister(node_id);
                let _ = self
                    .handle_at(node_index)
                    .notify_quorum(rabia_core::messages::QuorumState::Disappeared);

                let simulator = self.simulator.clone();
                let handle = self.handle_at(node_index).clone();
                tokio::spawn(async move {
                    sleep(duration).await;
                    simulator.register(node_id, handle.clone());
                    let _ = handle.notify_quorum(rabia_core::messages::QuorumState::Established);
                    info!(%node_id, "node rejoined after simulated crash");
                });
            }
            FaultType::NetworkPartition { node_indices, duration } => {
                let nodes: HashSet<NodeId> = node_indices.into_iter().map(|i| self.node_ids[i]).collect();
                self.simulator.partition(nodes, duration);
            }
            FaultType::PacketLoss { rate, duration } => {
                self.simulator.set_conditions(NetworkConditions {
                    packet_loss_rate: rate,
                    ..Default::default()
                });
                let simulator = self.simulator.clone();
                tokio::spawn(async move {
                    sleep(duration).await;
                    simulator.set_conditions(NetworkConditions::default());
                });
            }
            FaultType::HighLatency { min, max, duration } => {
                self.simulator.set_conditions(NetworkConditions {
                    latency_min: min,
                    latency_max: max,
                    packet_loss_rate: 0.0,
                });
                let simulator = self.simulator.clone();
                tokio::spawn(async move {
                    sleep(duration).await;
                    simulator.set_conditions(NetworkConditions::default());
                });
            }
        }
    }

    fn check_expected_outcome(expected: &ExpectedOutcome, actual: &ActualOutcome) -> bool {
        match expected {
            ExpectedOutcome::AllCommitted => {
                actual.committed_phases.iter().all(|&p| p == actual.committed_phases[0]) && actual.committed_phases[0] > 0
            }
            ExpectedOutcome::PartialCommitment { min_committed } => {
                actual.committed_phases.iter().any(|&p| p >= *min_committed)
            }
            ExpectedOutcome::NoProgress => actual.committed_phases.iter().all(|&p| p == 0),
            ExpectedOutcome::EventualConsistency => {
                let max = actual.committed_phases.iter().max().copied().unwrap_or(0);
                let min = actual.committed_phases.iter().min().copied().unwrap_or(0);
                max.saturating_sub(min) <= 2
            }
        }
    }

    pub async fn shutdown(self) {
        for node in self.nodes.into_values() {
            node.handle.shutdown();
            let _ = node.engine_task.await;
        }
    }
}

#[derive(Debug)]
pub struct TestResult {
    pub scenario: String,
    pub success: bool,
    pub duration: Duration,
    pub network_stats: NetworkStats,
    pub actual_outcome: ActualOutcome,
}

#[derive(Debug, Clone)]
pub struct ActualOutcome {
    pub committed_phases: Vec<u64>,
    pub current_phases: Vec<u64>,
}

impl ActualOutcome {
    fn from_statistics(stats: &HashMap<NodeId, EngineStatistics>) -> Self {
        Self {
            committed_phases: stats.values().map(|s| s.last_committed_phase.value()).collect(),
            current_phases: stats.values().map(|s| s.current_phase.value()).collect(),
        }
    }
}

/// A small catalog of chaos scenarios exercising the fault types above,
/// mirroring the shape of the protocol's own seed scenarios (§8) but over
/// the noisy simulator rather than the deterministic one.
pub fn create_test_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario {
            name: "basic_consensus".to_string(),
            description: "normal operation with no faults".to_string(),
            node_count: 3,
            initial_commands: vec![
                Command::new("SET key1 value1"),
                Command::new("SET key2 value2"),
                Command::new("GET key1"),
            ],
            faults: vec![],
            expected_outcome: ExpectedOutcome::AllCommitted,
            timeout: Duration::from_secs(2),
        },
        TestScenario {
            name: "single_node_crash_and_rejoin".to_string(),
            description: "one node crashes mid-run and resynchronizes".to_string(),
            node_count: 3,
            initial_commands: vec![Command::new("SET key1 value1"), Command::new("SET key2 value2")],
            faults: vec![(
                Duration::from_millis(100),
                FaultType::NodeCrash { node_index: 2, duration: Duration::from_millis(500) },
            )],
            expected_outcome: ExpectedOutcome::EventualConsistency,
            timeout: Duration::from_secs(3),
        },
        TestScenario {
            name: "network_partition".to_string(),
            description: "cluster splits into a minority and a majority partition".to_string(),
            node_count: 5,
            initial_commands: vec![
                Command::new("SET key1 value1"),
                Command::new("SET key2 value2"),
                Command::new("SET key3 value3"),
            ],
            faults: vec![(
                Duration::from_millis(100),
                FaultType::NetworkPartition { node_indices: vec![3, 4], duration: Duration::from_secs(1) },
            )],
            expected_outcome: ExpectedOutcome::PartialCommitment { min_committed: 1 },
            timeout: Duration::from_secs(3),
        },
        TestScenario {
            name: "high_packet_loss".to_string(),
            description: "30% packet loss for part of the run".to_string(),
            node_count: 3,
            initial_commands: vec![Command::new("SET key1 value1"), Command::new("SET key2 value2")],
            faults: vec![(Duration::from_millis(50), FaultType::PacketLoss { rate: 0.3, duration: Duration::from_secs(1) })],
            expected_outcome: ExpectedOutcome::EventualConsistency,
            timeout: Duration::from_secs(3),
        },
        TestScenario {
            name: "high_latency".to_string(),
            description: "100-500ms induced latency for part of the run".to_string(),
            node_count: 3,
            initial_commands: vec![Command::new("SET key1 value1")],
            faults: vec![(
                Duration::from_millis(50),
                FaultType::HighLatency {
                    min: Duration::from_millis(100),
                    max: Duration::from_millis(500),
                    duration: Duration::from_secs(1),
                },
            )],
            expected_outcome: ExpectedOutcome::AllCommitted,
            timeout: Duration::from_secs(3),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn basic_consensus_scenario_converges() {
        let harness = ConsensusTestHarness::new(3, ProtocolConfig::default()).await;
        let scenario = TestScenario {
            name: "test_basic".to_string(),
            description: "basic test".to_string(),
            node_count: 3,
            initial_commands: vec![Command::new("SET test value")],
            faults: vec![],
            expected_outcome: ExpectedOutcome::AllCommitted,
            timeout: Duration::from_millis(500),
        };

        let result = timeout(Duration::from_secs(5), harness.run_scenario(scenario)).await;
        assert!(result.is_ok());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn packet_loss_scenario_eventually_converges() {
        let harness = ConsensusTestHarness::new(3, ProtocolConfig::default()).await;
        let scenario = TestScenario {
            name: "test_packet_loss".to_string(),
            description: "test with packet loss".to_string(),
            node_count: 3,
            initial_commands: vec![Command::new("SET test value")],
            faults: vec![(
                Duration::from_millis(50),
                FaultType::PacketLoss { rate: 0.2, duration: Duration::from_millis(300) },
            )],
            expected_outcome: ExpectedOutcome::EventualConsistency,
            timeout: Duration::from_secs(2),
        };

        let result = timeout(Duration::from_secs(5), harness.run_scenario(scenario)).await;
        assert!(result.is_ok());
        harness.shutdown().await;
    }
}
