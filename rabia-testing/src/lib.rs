//! Test doubles and harnesses for driving the protocol's engine without a
//! real network or disk: in-memory [`NetworkTransport`](rabia_core::network::NetworkTransport)
//! implementations (deterministic and chaos-injecting), a fixed
//! [`Topology`](rabia_core::network::Topology), a deterministic seed-scenario
//! cluster, and a fault-injecting chaos harness.

pub mod fault_injection;
pub mod network;
pub mod network_sim;
pub mod scenarios;
pub mod topology;

pub use fault_injection::{
    create_test_scenarios, ConsensusTestHarness, ExpectedOutcome, FaultType, TestResult, TestScenario,
};
pub use network::{InMemoryBus, InMemoryNetwork};
pub use network_sim::{NetworkConditions, NetworkSimulator, NetworkStats, SimulatedNetwork};
pub use scenarios::{all_committed_phases_agree, commit_is_monotone, reaper_bound_plausible, DeterministicCluster};
pub use topology::FixedTopology;
