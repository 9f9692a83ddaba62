// ⚠️ Error taxonomy for the analysis pipeline
// Schema errors abort a run; every other error is local to one stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using `AnalysisError`.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// A required field is structurally absent from the table. Fatal.
    #[error("Schema error: {0}")]
    Schema(String),

    /// An optional stage's input columns are absent. The stage is skipped.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Too few records or values to compute a statistic.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Too few time buckets for the requested seasonal period.
    #[error("Insufficient history: need {required} buckets, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// Numerical failure (singular regression, invalid edge weight, ...).
    #[error("Computation error: {0}")]
    Computation(String),

    /// Invalid pipeline configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Short machine-readable name, used in reports and the run history.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Schema(_) => ErrorKind::Schema,
            AnalysisError::MissingField(_) => ErrorKind::MissingField,
            AnalysisError::InsufficientData(_) => ErrorKind::InsufficientData,
            AnalysisError::InsufficientHistory { .. } => ErrorKind::InsufficientHistory,
            AnalysisError::Computation(_) => ErrorKind::Computation,
            AnalysisError::Config(_) => ErrorKind::Config,
        }
    }

    /// Schema errors on the shared table (and bad configuration) abort the
    /// whole run. Everything else stays local to its stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnalysisError::Schema(_) | AnalysisError::Config(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    MissingField,
    InsufficientData,
    InsufficientHistory,
    Computation,
    Config,
}

impl ErrorKind {
    pub fn name(&self) -> &str {
        match self {
            ErrorKind::Schema => "schema",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::InsufficientHistory => "insufficient_history",
            ErrorKind::Computation => "computation",
            ErrorKind::Config => "config",
        }
    }
}

// ============================================================================
// STAGE OUTCOME
// ============================================================================

/// What happened to one analysis stage.
///
/// A report never drops a stage silently: it either carries the stage's
/// result, or the reason it was skipped or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed { result: T },
    Skipped { reason: String },
    Failed { kind: ErrorKind, reason: String },
}

impl<T> StageOutcome<T> {
    /// Convert a stage result. Missing inputs mean "skipped"; any other
    /// stage-local error means "failed".
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(result) => StageOutcome::Completed { result },
            Err(AnalysisError::MissingField(reason)) => StageOutcome::Skipped { reason },
            Err(e) => StageOutcome::Failed {
                kind: e.kind(),
                reason: e.to_string(),
            },
        }
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }

    pub fn status(&self) -> &str {
        match self {
            StageOutcome::Completed { .. } => "completed",
            StageOutcome::Skipped { .. } => "skipped",
            StageOutcome::Failed { .. } => "failed",
        }
    }

    /// Reason string for skipped/failed stages, empty when completed.
    pub fn reason(&self) -> &str {
        match self {
            StageOutcome::Completed { .. } => "",
            StageOutcome::Skipped { reason } => reason,
            StageOutcome::Failed { reason, .. } => reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_becomes_skipped() {
        let outcome: StageOutcome<u32> =
            StageOutcome::from_result(Err(AnalysisError::MissingField("date".to_string())));

        assert_eq!(outcome.status(), "skipped");
        assert_eq!(outcome.reason(), "date");
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_insufficient_history_becomes_failed() {
        let outcome: StageOutcome<u32> = StageOutcome::from_result(Err(
            AnalysisError::InsufficientHistory {
                required: 24,
                available: 10,
            },
        ));

        match outcome {
            StageOutcome::Failed { kind, reason } => {
                assert_eq!(kind, ErrorKind::InsufficientHistory);
                assert!(reason.contains("24"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_only_schema_is_fatal() {
        assert!(AnalysisError::Schema("amount".into()).is_fatal());
        assert!(!AnalysisError::Computation("singular".into()).is_fatal());
        assert!(!AnalysisError::MissingField("vendor".into()).is_fatal());
    }
}
