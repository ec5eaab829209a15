use thiserror::Error;

use crate::story_graph::{GraphError, NodeId};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the session engine.
///
/// `Clone` so that one generation outcome can be handed to every caller
/// waiting on the same branch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("generator failure: {0}")]
    GeneratorFailure(String),

    #[error("malformed generator output: {0}")]
    ParseFailure(String),

    #[error("graph integrity violation: {0}")]
    GraphIntegrity(#[from] GraphError),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("story already ended at node {0}")]
    SessionEnded(NodeId),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("corrupt session: {0}")]
    CorruptSession(String),

    #[error("session state lock poisoned")]
    LockPoisoned,

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::GeneratorFailure(_) | EngineError::ParseFailure(_) | EngineError::TaskFailed(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(EngineError::GeneratorFailure("quota".into()).is_retryable());
        assert!(EngineError::ParseFailure("no json".into()).is_retryable());
        assert!(!EngineError::NodeNotFound(NodeId::nil()).is_retryable());
        assert!(!EngineError::GraphIntegrity(GraphError::DuplicateId(NodeId::nil())).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = EngineError::GeneratorFailure("timeout".into());
        assert_eq!(err.to_string(), "generator failure: timeout");
    }
}
