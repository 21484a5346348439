// src/error.rs
use thiserror::Error;

/// Failure raised by a [`DocumentStore`](crate::store::DocumentStore) call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    /// Failure reported by a store implementation that does not go through the driver.
    #[error("{0}")]
    Message(String),
}

/// Errors surfaced by the node. Display is always the underlying message, unmodified,
/// because it ends up verbatim in `{"error": ...}` records.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Credentials(String),

    #[error("{0}")]
    Config(String),
}

impl NodeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        NodeError::Validation(msg.into())
    }

    pub fn credentials(msg: impl Into<String>) -> Self {
        NodeError::Credentials(msg.into())
    }

    /// Malformed parameters and bulk-insert shape errors both count as validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, NodeError::Validation(_) | NodeError::InvalidJson(_))
    }
}

impl From<mongodb::error::Error> for NodeError {
    fn from(e: mongodb::error::Error) -> Self {
        NodeError::Store(StoreError::Driver(e))
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
