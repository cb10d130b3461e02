//! Error types for the eco-tag classifier.

use thiserror::Error;

/// Result type alias for classifier operations.
pub type TagResult<T> = Result<T, TagError>;

/// Errors surfaced by the classifier.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("profile not found for service: {0}")]
    ProfileNotFound(String),
}
