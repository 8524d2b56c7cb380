//! Common error types for the quiz dataset tools

use thiserror::Error;

/// Common result type for quiz dataset operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the prebuild pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Data invariant violation (upstream data corruption, misuse of the store)
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// External service failure (LLM, translation provider) after retries
    #[error("External call failed: {0}")]
    External(String),

    /// Failure inside a pipeline stage, tagged with the entity being processed
    #[error("Stage '{stage}' failed on {entity}: {source}")]
    Stage {
        stage: String,
        entity: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tag an error with the stage and entity it was raised for.
    ///
    /// Errors that already carry a stage tag are returned unchanged so the
    /// innermost entity is the one reported.
    pub fn in_stage(self, stage: &str, entity: impl Into<String>) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage: stage.to_string(),
                entity: entity.into(),
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = Error::NotFound("question 7".to_string())
            .in_stage("translate", "question 7")
            .in_stage("outer", "ignored");

        match &err {
            Error::Stage { stage, entity, .. } => {
                assert_eq!(stage, "translate");
                assert_eq!(entity, "question 7");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "Stage 'translate' failed on question 7: Not found: question 7"
        );
    }
}
