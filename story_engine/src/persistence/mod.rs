//! Persistence interface - opaque session blobs keyed by session id.
//!
//! Stores know nothing about graphs; they keep whatever
//! [`crate::Session::to_blob`] produced and hand it back unchanged.

mod file;
mod memory;

pub use file::*;
pub use memory::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use story_rules::Phase;
use thiserror::Error;

use crate::error::EngineError;
use crate::session::SessionId;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

/// Summary of a stored session, readable without decoding the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: SessionId,
    pub title: String,
    pub turn_count: u32,
    pub node_count: usize,
    /// Depth of the current node.
    pub depth: u32,
    pub phase: Phase,
    pub terminal: bool,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBlob {
    pub metadata: SessionMetadata,
    pub payload: serde_json::Value,
}

/// Storage interface for session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session.
    async fn save(&self, session_id: SessionId, blob: SessionBlob) -> StorageResult<()>;

    /// Load a session. Returns `Ok(None)` if it was never saved.
    async fn load(&self, session_id: SessionId) -> StorageResult<Option<SessionBlob>>;

    /// Metadata of every stored session, ordered by session id.
    async fn list(&self) -> StorageResult<Vec<SessionMetadata>>;

    /// Delete a session. Deleting an unknown session is not an error.
    async fn delete(&self, session_id: SessionId) -> StorageResult<()>;
}
