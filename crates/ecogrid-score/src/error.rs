//! Error types for the scoring engine.

use thiserror::Error;

/// Result type alias for scoring operations.
pub type ScoreResult<T> = Result<T, ScoreError>;

/// Errors that can occur during analysis.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// Fewer retained samples than the configured minimum. Callers treat
    /// this as "skip this server this cycle", never as a fatal condition.
    #[error("insufficient data points for analysis: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },
}
