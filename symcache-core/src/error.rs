//! Top-level pipeline error.

use thiserror::Error;

use crate::domain::IndexError;
use crate::factory::FactoryError;
use crate::handling::{Cause, Checkpoint, PolicyError};
use crate::settings::ConfigError;
use crate::storage::StorageError;
use crate::table::TableError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A checkpoint policy with `raise` set fired.
    #[error("{owner}: {checkpoint} escalated: {message}")]
    Escalated {
        checkpoint: Checkpoint,
        owner: String,
        message: String,
        #[source]
        cause: Cause,
    },

    /// Non-recoverable precondition, independent of any policy.
    #[error("symbol '{0}' has no feeds and cannot be cached")]
    NoFeeds(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl PipelineError {
    /// The checkpoint that escalated, if this is an escalation.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        match self {
            PipelineError::Escalated { checkpoint, .. } => Some(*checkpoint),
            _ => None,
        }
    }
}
