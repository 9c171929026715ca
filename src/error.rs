//! Error taxonomy for hierarchy operations.

use thiserror::Error;
use uuid::Uuid;

use crate::models::NodeKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input: a reorder list that is not a permutation, an attribute
    /// index past the tracked count, an empty name.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: NodeKind, id: Uuid },

    /// A storage call failed. Local state has already been restored.
    #[error("Storage request failed: {0}")]
    Transport(#[source] anyhow::Error),

    /// Missing or malformed configuration. Fatal at start-up.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn group_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: NodeKind::Group,
            id,
        }
    }

    pub fn entity_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: NodeKind::Entity,
            id,
        }
    }
}
