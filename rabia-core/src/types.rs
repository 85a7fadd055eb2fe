//! # Core Types
//!
//! Fundamental types used throughout the Rabia consensus protocol.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node in the consensus cluster.
///
/// Each node participating in the Rabia consensus protocol has a unique identifier
/// that is generated when the node starts. This identifier is used for message
/// routing and membership management.
///
/// # Examples
///
/// ```rust
/// use rabia_core::NodeId;
///
/// let node_id = NodeId::new();
/// println!("Node ID: {}", node_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Creates a new random node identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u32> for NodeId {
    /// Creates a deterministic NodeId from a u32, for tests and examples.
    fn from(value: u32) -> Self {
        let bytes = [
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ];
        Self(Uuid::from_bytes(bytes))
    }
}

impl From<u64> for NodeId {
    /// Creates a deterministic NodeId from a u64, for tests and examples.
    fn from(value: u64) -> Self {
        let bytes = [
            (value >> 56) as u8,
            (value >> 48) as u8,
            (value >> 40) as u8,
            (value >> 32) as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
            (value >> 56) as u8,
            (value >> 48) as u8,
            (value >> 40) as u8,
            (value >> 32) as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ];
        Self(Uuid::from_bytes(bytes))
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        Self::from(value as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for consensus phases in the Rabia protocol.
///
/// Phase IDs are monotonically increasing and totally ordered; they index
/// the sequence of agreement rounds the protocol drives to completion.
///
/// # Examples
///
/// ```rust
/// use rabia_core::PhaseId;
///
/// let phase1 = PhaseId::new(1);
/// let phase2 = phase1.successor();
/// assert!(phase2 > phase1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct PhaseId(pub u64);

impl PhaseId {
    pub const ZERO: PhaseId = PhaseId(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the next phase in sequence.
    pub fn successor(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// `self - other`, saturating at zero. Used by far-future and reaper checks.
    pub fn distance_from(&self, other: PhaseId) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a command batch.
///
/// A distinguished [`BatchId::EMPTY`] value denotes "no batch" (paired with a `V0`
/// decision and with [`CorrelationId::EMPTY`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub const EMPTY: BatchId = BatchId(Uuid::nil());

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier correlating a client submission across replicas so the decided
/// result can be routed back to the submitter and duplicate proposals deduplicated.
///
/// A distinguished [`CorrelationId::EMPTY`] value pairs with the empty batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub const EMPTY: CorrelationId = CorrelationId(Uuid::nil());

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State values used in the Rabia consensus protocol's voting rounds.
///
/// Round 1 votes are restricted to `{V0, V1}`; round 2 votes may additionally
/// be `VQuestion` when round 1 did not settle on a quorum value. Decisions are
/// always `{V0, V1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateValue {
    /// No batch was agreed for this phase; the empty batch commits (a no-op).
    V0,
    /// A batch was agreed for this phase.
    V1,
    /// Round 1 was inconclusive; only valid as a round 2 vote.
    VQuestion,
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::V0 => write!(f, "V0"),
            StateValue::V1 => write!(f, "V1"),
            StateValue::VQuestion => write!(f, "V?"),
        }
    }
}

/// A command to be executed by the replicated state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Unique identifier for this command.
    pub id: Uuid,
    /// Command data to be interpreted by the state machine.
    pub data: bytes::Bytes,
}

impl Command {
    pub fn new(data: impl Into<bytes::Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: data.into(),
        }
    }
}

/// An ordered, immutable batch of client commands submitted for consensus.
///
/// Batches are totally ordered by `(timestamp, id, correlation_id)` so that
/// every replica picks the same "smallest pending batch" when entering a
/// phase (§4.4 of the spec) without exchanging any extra state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub correlation_id: CorrelationId,
    /// Monotonic nanosecond timestamp used purely for deterministic ordering,
    /// not wall-clock validation.
    pub timestamp: u64,
    pub commands: Vec<Command>,
}

impl Batch {
    pub fn new(correlation_id: CorrelationId, timestamp: u64, commands: Vec<Command>) -> Self {
        Self {
            id: BatchId::new(),
            correlation_id,
            timestamp,
            commands,
        }
    }

    /// The distinguished empty batch: carries no commands and is paired with
    /// the empty correlation id and `V0` decisions.
    pub fn empty() -> Self {
        Self {
            id: BatchId::EMPTY,
            correlation_id: CorrelationId::EMPTY,
            timestamp: 0,
            commands: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    pub fn checksum(&self) -> u32 {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        crc32fast::hash(&serialized)
    }
}

impl PartialOrd for Batch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Batch {
    /// Total order over batches: `(timestamp, id, correlation_id)`.
    ///
    /// Every replica observes the same pending set eventually, so this order
    /// gives every node the same answer for "smallest pending batch" and for
    /// `find_agreed_proposal`'s tie-break without any extra coordination.
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.0.cmp(&other.id.0))
            .then_with(|| self.correlation_id.0.cmp(&other.correlation_id.0))
    }
}

/// Monotonic nanosecond clock used for batch timestamps.
///
/// Not wall-clock time: only relied on for total ordering among batches
/// created by the same process, matching the `Batch` equality-by-`id` /
/// order-by-timestamp contract in the spec.
pub fn monotonic_nanos() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    use std::time::Instant;

    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let start = START.get_or_init(Instant::now);
    let elapsed = start.elapsed().as_nanos() as u64;
    // Guarantee strict monotonicity even when the clock doesn't advance
    // between two calls on a fast path (tests construct batches back to back).
    let prev = COUNTER.load(AtomicOrdering::Relaxed);
    let next = elapsed.max(prev + 1);
    COUNTER.store(next, AtomicOrdering::Relaxed);
    next
}
