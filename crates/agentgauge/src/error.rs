//! Unified error type for the evaluation engine.
//!
//! The engine distinguishes fatal conditions (malformed configuration, a
//! suite that cannot run at all) from non-fatal ones. Non-fatal conditions
//! never surface here: a scorer failure is recorded on its `TestResult`,
//! insufficient samples produce an inconclusive conclusion, and a generation
//! parse failure drops that one unit while the batch continues.

use thiserror::Error;

/// Unified error type for evaluation operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EvalError {
    /// Malformed configuration or suite definition. Rejected before
    /// execution, never silently defaulted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A scorer failed or returned an invalid value. Isolated to one
    /// (case, scorer) pair by the runner.
    #[error("Scorer '{scorer}' failed: {message}")]
    Scorer {
        /// Name of the scorer that failed
        scorer: String,
        /// What went wrong
        message: String,
    },

    /// A whole suite failed to run. Other suites in a batch still run.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// Shorthand for a scorer failure.
    pub fn scorer(scorer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scorer {
            scorer: scorer.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EvalError>;

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_error_display() {
        let err = EvalError::scorer("path_optimality", "trace missing");
        assert_eq!(
            err.to_string(),
            "Scorer 'path_optimality' failed: trace missing"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: EvalError = parse_err.into();
        assert!(matches!(err, EvalError::Serialization(_)));
    }
}
