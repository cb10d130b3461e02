//! Error types for the forecaster.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Errors surfaced by the forecaster.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Fewer samples than the configured minimum; no model was fitted.
    #[error("insufficient data points to fit a model: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// No model has been fitted for this server.
    #[error("no model for server: {0}")]
    ModelNotFound(String),
}
