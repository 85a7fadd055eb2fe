//! # Rabia Persistence
//!
//! Durable storage for a node's saved state (§4.10, §6 of the protocol
//! design): a single `(snapshot, lastCommittedPhase, pendingBatches)` triple,
//! read back only while resynchronizing and written only when going
//! inactive. Not a write-ahead log — the protocol's own re-proposal
//! behavior is what makes the system self-correcting, not replayable
//! history.
//!
//! ## Implementations
//!
//! - [`InMemoryPersistence`] - process-local, lost on restart (tests, the simulator)
//! - [`FileSystemPersistence`] - a single checksummed JSON file, survives restarts
//!
//! ## Example
//!
//! ```rust
//! use rabia_persistence::InMemoryPersistence;
//! use rabia_core::persistence::{PersistenceLayer, SavedState};
//! use rabia_core::state_machine::Snapshot;
//! use rabia_core::PhaseId;
//!
//! # tokio_test::block_on(async {
//! let persistence = InMemoryPersistence::new();
//! let state = SavedState::new(Snapshot::new(b"hello".to_vec()), PhaseId::new(1), Vec::new());
//! persistence.save(&state).await.unwrap();
//! assert!(persistence.load().await.unwrap().is_some());
//! # });
//! ```

pub mod file_system;
pub mod in_memory;

pub use file_system::FileSystemPersistence;
pub use in_memory::InMemoryPersistence;
