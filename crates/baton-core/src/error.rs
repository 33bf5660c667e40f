use uuid::Uuid;

/// Top-level error type for the Baton orchestrator.
///
/// Only caller-facing failures live here. Brain (LLM gateway) failures are a
/// separate type in `baton-brain` because the orchestrator handles them as
/// values at the turn boundary rather than propagating them.
#[derive(Debug, thiserror::Error)]
pub enum BatonError {
    /// An operation referenced a task id that is neither cached nor persisted.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// A caller supplied an agent name absent from the team configuration.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The guardrail engine rejected an input prompt before a task started.
    #[error("Guardrail blocked input: {0}")]
    GuardrailBlocked(String),

    /// A persistence I/O failure. The in-memory task state stays consistent;
    /// the failed write does not partially apply.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An error in team or application configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`BatonError`].
pub type BatonResult<T> = Result<T, BatonError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BatonError::UnknownAgent("ghost".to_string());
        assert_eq!(err.to_string(), "Unknown agent: ghost");

        let id = Uuid::new_v4();
        let err = BatonError::TaskNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: BatonError = parse_err.into();
        assert!(matches!(err, BatonError::Json(_)));
    }
}
