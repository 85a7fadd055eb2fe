use async_trait::async_trait;
use rabia_core::persistence::{PersistenceLayer, SavedState};
use rabia_core::{RabiaError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores a node's saved state as a single JSON file on disk, surviving
/// process restarts. Writes go through a temp file and an atomic rename so a
/// crash mid-write never leaves a half-written state file behind.
#[derive(Debug, Clone)]
pub struct FileSystemPersistence {
    state_file_path: PathBuf,
}

impl FileSystemPersistence {
    /// Creates a new file-based persistence instance, creating `data_dir` if
    /// it doesn't already exist.
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        if !data_dir.exists() {
            fs::create_dir_all(data_dir)
                .await
                .map_err(|e| RabiaError::persistence(format!("failed to create data directory: {}", e)))?;
        }

        let state_file_path = data_dir.join("state.json");
        Ok(Self { state_file_path })
    }

    /// Synchronous convenience wrapper around `new`, for callers outside an
    /// async context.
    pub fn new_sync<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| RabiaError::internal(format!("failed to create runtime: {}", e)))?;
        runtime.block_on(Self::new(data_dir))
    }
}

#[async_trait]
impl PersistenceLayer for FileSystemPersistence {
    async fn save(&self, state: &SavedState) -> Result<()> {
        let serialized = serde_json::to_vec(state)?;
        let temp_file_path = self.state_file_path.with_extension("tmp");

        fs::write(&temp_file_path, &serialized)
            .await
            .map_err(|e| RabiaError::persistence(format!("failed to write state to temp file: {}", e)))?;

        fs::rename(&temp_file_path, &self.state_file_path)
            .await
            .map_err(|e| RabiaError::persistence(format!("failed to rename temp file to state file: {}", e)))?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<SavedState>> {
        let bytes = match fs::read(&self.state_file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RabiaError::persistence(format!("failed to read state file: {}", e))),
        };

        let state: SavedState = serde_json::from_slice(&bytes)?;
        if !state.verify_checksum() {
            return Err(RabiaError::StateCorruption {
                details: format!("checksum mismatch loading {}", self.state_file_path.display()),
            });
        }
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rabia_core::state_machine::Snapshot;
    use rabia_core::PhaseId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn starts_with_no_saved_state() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
        assert!(persistence.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_survives_a_new_handle() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
        let state = SavedState::new(Snapshot::new(b"persistent".to_vec()), PhaseId::new(3), Vec::new());
        persistence.save(&state).await.unwrap();

        let reopened = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_committed_phase, PhaseId::new(3));
        assert_eq!(loaded.snapshot.data, state.snapshot.data);
    }

    #[tokio::test]
    async fn save_overwrites_prior_state_atomically() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
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
