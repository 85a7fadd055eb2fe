//! # Persistence Collaborator
//!
//! The durable state a node writes before going inactive and reads back
//! when resynchronizing (§4.10, §6). Deliberately minimal: a single saved
//! triple, not a write-ahead log — the protocol's own re-proposal behavior
//! is what makes the system self-correcting, not replayable history.

use crate::state_machine::Snapshot;
use crate::{Batch, PhaseId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque durable state: `(snapshot, lastCommittedPhase, pendingBatches)`.
///
/// Carries a CRC32 checksum over its own serialized contents so a
/// truncated or corrupted write is detected on load rather than silently
/// accepted (§9a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedState {
    pub snapshot: Snapshot,
    pub last_committed_phase: PhaseId,
    pub pending_batches: Vec<Batch>,
    checksum: u32,
}

impl SavedState {
    pub fn new(snapshot: Snapshot, last_committed_phase: PhaseId, pending_batches: Vec<Batch>) -> Self {
        let mut state = Self {
            snapshot,
            last_committed_phase,
            pending_batches,
            checksum: 0,
        };
        state.checksum = state.compute_checksum();
        state
    }

    /// "No prior state, activate from fresh": empty snapshot, phase zero, no
    /// pending batches.
    pub fn empty() -> Self {
        Self::new(Snapshot::empty(), PhaseId::ZERO, Vec::new())
    }

    fn compute_checksum(&self) -> u32 {
        let mut unchecksummed = self.clone();
        unchecksummed.checksum = 0;
        let serialized = serde_json::to_vec(&unchecksummed).unwrap_or_default();
        crc32fast::hash(&serialized)
    }

    pub fn verify_checksum(&self) -> bool {
        self.compute_checksum() == self.checksum
    }
}

/// Durable storage for a node's saved state, consulted only while the node
/// is inactive (loading on startup/resync) or transitioning to inactive
/// (saving on disconnect).
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    async fn save(&self, state: &SavedState) -> Result<()>;

    async fn load(&self) -> Result<Option<SavedState>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_detects_tampering() {
        let mut state = SavedState::new(Snapshot::new(b"hello".to_vec()), PhaseId::new(3), Vec::new());
        assert!(state.verify_checksum());
        state.last_committed_phase = PhaseId::new(4);
        assert!(!state.verify_checksum());
    }

    #[test]
    fn empty_state_denotes_fresh_activation() {
        let state = SavedState::empty();
        assert!(state.snapshot.is_empty());
        assert_eq!(state.last_committed_phase, PhaseId::ZERO);
        assert!(state.pending_batches.is_empty());
    }
}
