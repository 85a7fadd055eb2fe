//! # State Machine Collaborator
//!
//! The deterministic application the engine drives decided batches into
//! (§6). The engine never interprets command bytes itself.

use crate::{Command, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An opaque, checksum-guarded snapshot of state machine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: Bytes,
    pub checksum: u32,
}

impl Snapshot {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let checksum = crc32fast::hash(&data);
        Self { data, checksum }
    }

    /// The distinguished empty snapshot: "no prior state, activate fresh."
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            checksum: crc32fast::hash(&[]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn verify_checksum(&self) -> bool {
        crc32fast::hash(&self.data) == self.checksum
    }
}

/// Deterministic application driven by decided batches.
///
/// `process` must be a pure function of `(current state, commands)`: every
/// replica applies the same decided batch and must reach the same state and
/// the same results.
#[async_trait]
pub trait StateMachine: Send + Sync {
    /// Applies a decided batch's commands in order, returning one result per
    /// command.
    async fn process(&mut self, commands: &[Command]) -> Result<Vec<Bytes>>;

    /// Captures the current state as an opaque, transferable snapshot.
    async fn make_snapshot(&self) -> Result<Snapshot>;

    /// Replaces the current state with the one captured in `snapshot`.
    async fn restore_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Clears all state back to the initial, empty state (§4.11 disconnect
    /// path).
    async fn reset(&mut self);
}

/// A trivial key/value store used by tests and the deterministic simulator.
/// Commands are whitespace-separated ASCII: `SET key value`, `GET key`,
/// `DEL key`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateMachine {
    state: std::collections::HashMap<String, Bytes>,
}

impl InMemoryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateMachine for InMemoryStateMachine {
    async fn process(&mut self, commands: &[Command]) -> Result<Vec<Bytes>> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let command_str = String::from_utf8_lossy(&command.data);
            let parts: Vec<&str> = command_str.split_whitespace().collect();
            let result = match parts.as_slice() {
                ["SET", key, value] => {
                    self.state.insert(key.to_string(), Bytes::from(value.to_string()));
                    Bytes::from("OK")
                }
                ["GET", key] => self
                    .state
                    .get(*key)
                    .cloned()
                    .unwrap_or_else(|| Bytes::from("NOT_FOUND")),
                ["DEL", key] => match self.state.remove(*key) {
                    Some(_) => Bytes::from("OK"),
                    None => Bytes::from("NOT_FOUND"),
                },
                _ => Bytes::from("ERROR: invalid command"),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn make_snapshot(&self) -> Result<Snapshot> {
        let serialized = serde_json::to_vec(&self.state)?;
        Ok(Snapshot::new(serialized))
    }

    async fn restore_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.is_empty() {
            self.state.clear();
            return Ok(());
        }
        if !snapshot.verify_checksum() {
            return Err(crate::RabiaError::ChecksumMismatch {
                expected: snapshot.checksum,
                actual: crc32fast::hash(&snapshot.data),
            });
        }
        self.state = serde_json::from_slice(&snapshot.data)?;
        Ok(())
    }

    async fn reset(&mut self) {
        self.state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_del_round_trip() {
        let mut sm = InMemoryStateMachine::new();
        let results = sm
            .process(&[Command::new("SET key1 value1"), Command::new("GET key1")])
            .await
            .unwrap();
        assert_eq!(results[0], Bytes::from("OK"));
        assert_eq!(results[1], Bytes::from("value1"));

        let results = sm.process(&[Command::new("DEL key1")]).await.unwrap();
        assert_eq!(results[0], Bytes::from("OK"));

        let results = sm.process(&[Command::new("GET key1")]).await.unwrap();
        assert_eq!(results[0], Bytes::from("NOT_FOUND"));
    }

    #[tokio::test]
    async fn snapshot_round_trip_restores_state() {
        let mut sm = InMemoryStateMachine::new();
        sm.process(&[Command::new("SET a 1")]).await.unwrap();
        let snapshot = sm.make_snapshot().await.unwrap();

        let mut restored = InMemoryStateMachine::new();
        restored.restore_snapshot(&snapshot).await.unwrap();
        let results = restored.process(&[Command::new("GET a")]).await.unwrap();
        assert_eq!(results[0], Bytes::from("1"));
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let mut sm = InMemoryStateMachine::new();
        sm.process(&[Command::new("SET a 1")]).await.unwrap();
        sm.reset().await;
        let results = sm.process(&[Command::new("GET a")]).await.unwrap();
        assert_eq!(results[0], Bytes::from("NOT_FOUND"));
    }
}
