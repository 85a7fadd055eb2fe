//! # Error Types
//!
//! Comprehensive error handling for the Rabia consensus protocol.

use crate::{BatchId, NodeId, PhaseId};
use thiserror::Error;

/// Error types that can occur during Rabia consensus operations.
///
/// This enum covers all possible error conditions that can arise
/// during consensus protocol execution, from collaborator failures to
/// client-visible rejections. Each error includes context information
/// to aid in debugging and recovery.
///
/// # Error Categories
///
/// - **Network Errors**: Communication failures reported by the transport collaborator
/// - **Persistence Errors**: Storage and retrieval failures reported by the persistence collaborator
/// - **State Machine Errors**: Application-level execution failures
/// - **Consensus Errors**: Protocol-level violations or failures
/// - **Resource Errors**: Missing nodes, phases, or batches
/// - **Integrity Errors**: Checksum mismatches and corruption
/// - **Client-visible Errors**: Rejections returned directly to a `submit` caller
/// - **Timeout Errors**: Operations that exceed time limits
///
/// # Examples
///
/// ```rust
/// use rabia_core::RabiaError;
///
/// let error = RabiaError::network("Connection refused");
/// if error.is_retryable() {
///     println!("This error can be retried");
/// }
/// ```
#[derive(Error, Debug)]
pub enum RabiaError {
    /// Network transport collaborator failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// Persistence collaborator failure
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// State machine execution failure
    #[error("State machine error: {message}")]
    StateMachine { message: String },

    /// Consensus protocol violation or failure
    #[error("Consensus error: {message}")]
    Consensus { message: String },

    /// Referenced node was not found in the cluster
    #[error("Node {node_id} not found")]
    NodeNotFound { node_id: NodeId },

    /// Submission was rejected because the node is not an active cluster member
    ///
    /// Returned by `submit` when the node has not yet observed an active
    /// quorum (or has lost it) and therefore cannot meaningfully propose.
    #[error("Node {0} is not currently active in the cluster")]
    NodeInactive(NodeId),

    /// A client submitted a batch with zero commands
    #[error("Command batch must contain at least one command")]
    CommandBatchIsEmpty,

    /// Referenced consensus phase was not found
    #[error("Phase {phase_id} not found")]
    PhaseNotFound { phase_id: PhaseId },

    /// Referenced command batch was not found
    #[error("Batch {batch_id} not found")]
    BatchNotFound { batch_id: BatchId },

    /// Invalid state machine transition attempted
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Insufficient nodes available to form a quorum
    #[error("Quorum not available: {current}/{required} nodes")]
    QuorumNotAvailable { current: usize, required: usize },

    /// Data integrity check failed due to checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// State corruption detected in persistent storage
    #[error("State corruption detected: {details}")]
    StateCorruption { details: String },

    /// Incomplete write operation detected
    #[error("Partial write detected: {details}")]
    PartialWrite { details: String },

    /// Operation exceeded its timeout limit
    #[error("Timeout occurred: {operation}")]
    Timeout { operation: String },

    /// JSON serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system or network I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results in the Rabia consensus system.
///
/// # Examples
///
/// ```rust
/// use rabia_core::{Result, RabiaError};
///
/// fn consensus_operation() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, RabiaError>;

impl RabiaError {
    /// Creates a new network error with the given message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new persistence error with the given message.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Creates a new state machine error with the given message.
    pub fn state_machine(message: impl Into<String>) -> Self {
        Self::StateMachine {
            message: message.into(),
        }
    }

    /// Creates a new consensus error with the given message.
    pub fn consensus(message: impl Into<String>) -> Self {
        Self::Consensus {
            message: message.into(),
        }
    }

    /// Creates a new internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new serialization error with the given message.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Internal {
            message: format!("Serialization error: {}", message.into()),
        }
    }

    /// Determines if this error condition is potentially recoverable.
    ///
    /// Retryable errors are typically transient conditions that may
    /// resolve themselves with time or retry attempts. Client-visible
    /// rejections (empty batch, inactive node) and integrity failures are
    /// never retryable: resubmitting the same batch will fail the same way.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rabia_core::RabiaError;
    ///
    /// let network_error = RabiaError::network("Connection timeout");
    /// assert!(network_error.is_retryable());
    ///
    /// let corruption_error = RabiaError::ChecksumMismatch {
    ///     expected: 123,
    ///     actual: 456,
    /// };
    /// assert!(!corruption_error.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::QuorumNotAvailable { .. }
        )
    }
}
