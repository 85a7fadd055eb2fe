//! # Structural Validation
//!
//! Cheap, synchronous sanity checks applied to client-submitted batches
//! before they enter the engine's pending set. Protocol-level rejections
//! (stale phase, far-future phase, inactive node) are handler logic, not
//! validation, and live in `rabia-engine`.

use crate::{Batch, RabiaError, Result};

pub trait Validator {
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_batch_size: usize,
    pub max_command_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_command_size: 1024 * 1024, // 1MB
        }
    }
}

impl Validator for Batch {
    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let config = ValidationConfig::default();

        if self.commands.is_empty() {
            return Err(RabiaError::CommandBatchIsEmpty);
        }

        if self.commands.len() > config.max_batch_size {
            return Err(RabiaError::internal(format!(
                "batch size {} exceeds maximum {}",
                self.commands.len(),
                config.max_batch_size
            )));
        }

        for command in &self.commands {
            if command.data.len() > config.max_command_size {
                return Err(RabiaError::internal(format!(
                    "command size {} exceeds maximum {}",
                    command.data.len(),
                    config.max_command_size
                )));
            }
        }

        Ok(())
    }
}
