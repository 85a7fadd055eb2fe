use async_trait::async_trait;
use parking_lot::RwLock;
use rabia_core::persistence::{PersistenceLayer, SavedState};
use rabia_core::Result;
use std::sync::Arc;

/// Keeps a node's saved state in a process-local `RwLock`. Lost on restart;
/// intended for tests and the deterministic simulator, not production use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    state: Arc<RwLock<Option<SavedState>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl PersistenceLayer for InMemoryPersistence {
    async fn save(&self, state: &SavedState) -> Result<()> {
        *self.state.write() = Some(state.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<SavedState>> {
        Ok(self.state.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rabia_core::state_machine::Snapshot;
    use rabia_core::PhaseId;

    #[tokio::test]
    async fn starts_with_no_saved_state() {
        let persistence = InMemoryPersistence::new();
        assert!(persistence.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let persistence = InMemoryPersistence::new();
        let state = SavedState::new(Snapshot::new(b"hello".to_vec()), PhaseId::new(7), Vec::new());
        persistence.save(&state).await.unwrap();

        let loaded = persistence.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_committed_phase, PhaseId::new(7));
        assert!(loaded.verify_checksum());
    }

    #[tokio::test]
    async fn save_overwrites_prior_state() {
        let persistence = InMemoryPersistence::new();
        persistence
            .save(&SavedState::new(Snapshot::new(b"a".to_vec()), PhaseId::new(1), Vec::new()))
            .await
            .unwrap();
        persistence
            .save(&SavedState::new(Snapshot::new(b"b".to_vec()), PhaseId::new(2), Vec::new()))
            .await
            .unwrap();

        let loaded = persistence.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_committed_phase, PhaseId::new(2));
    }
}
