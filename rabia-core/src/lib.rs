//! # Rabia Core
//!
//! Core types, traits, and pure algorithm pieces for the Rabia consensus
//! protocol: a leaderless, crash-fault-tolerant total-order broadcast over
//! `n = 2f + 1` replicas.
//!
//! ## Key Components
//!
//! - **Types**: `NodeId`, `PhaseId`, `BatchId`, `CorrelationId`, `StateValue`, `Batch`
//! - **Phase**: per-phase vote bookkeeping and the pure functions that turn
//!   collected votes into a vote or a decision
//! - **Messages**: the wire and local-control messages exchanged between replicas
//! - **Collaborator traits**: `NetworkTransport`, `Topology`, `StateMachine`, `PersistenceLayer`
//! - **Error handling**: `RabiaError` and the client-visible rejections
//! - **Validation**: structural checks applied to client-submitted batches
//! - **Metrics**: a no-op-acceptable hook for publishing engine statistics
//!
//! ## Example Usage
//!
//! ```rust
//! use rabia_core::{Command, Batch, CorrelationId, NodeId, PhaseId};
//!
//! let cmd1 = Command::new("SET key1 value1");
//! let cmd2 = Command::new("GET key1");
//!
//! let batch = Batch::new(CorrelationId::new(), 1, vec![cmd1, cmd2]);
//!
//! let node_id = NodeId::new();
//! let phase_id = PhaseId::new(1);
//! ```

pub mod error;
pub mod messages;
pub mod metrics;
pub mod network;
pub mod persistence;
pub mod phase;
pub mod state_machine;
pub mod types;
pub mod validation;

pub use error::*;
pub use types::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{InMemoryStateMachine, StateMachine};

    #[tokio::test]
    async fn state_machine_basic_operations() {
        let mut sm = InMemoryStateMachine::new();

        let results = sm
            .process(&[Command::new("SET key1 value1")])
            .await
            .unwrap();
        assert_eq!(results[0], bytes::Bytes::from("OK"));

        let results = sm.process(&[Command::new("GET key1")]).await.unwrap();
        assert_eq!(results[0], bytes::Bytes::from("value1"));

        let results = sm.process(&[Command::new("GET nonexistent")]).await.unwrap();
        assert_eq!(results[0], bytes::Bytes::from("NOT_FOUND"));
    }

    #[test]
    fn batch_checksum_is_nonzero_for_nonempty_batch() {
        let commands = vec![Command::new("SET key1 value1"), Command::new("SET key2 value2")];
        let batch = Batch::new(CorrelationId::new(), 1, commands.clone());
        assert_eq!(batch.commands, commands);
        assert!(batch.checksum() > 0);
    }

    #[test]
    fn phase_id_successor() {
        let phase1 = PhaseId::new(1);
        let phase2 = phase1.successor();

        assert_eq!(phase1.value(), 1);
        assert_eq!(phase2.value(), 2);
        assert!(phase2 > phase1);
    }

    #[test]
    fn error_retryability() {
        let error = RabiaError::network("test error");
        assert!(error.is_retryable());

        let error = RabiaError::ChecksumMismatch {
            expected: 123,
            actual: 456,
        };
        assert!(!error.is_retryable());
    }
}
