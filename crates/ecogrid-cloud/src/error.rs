//! Error types for cloud collaborator calls.

use thiserror::Error;

/// Result type alias for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors surfaced by a cloud provider. Always non-fatal to the owning
/// periodic task: the caller logs and moves to the next entity or cycle.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    // Field is `source_id`, not `source`: thiserror reserves the latter
    // for the error-source chain.
    #[error("relocation of {container} from {source_id} to {target_id} failed: {reason}")]
    Relocation {
        container: String,
        source_id: String,
        target_id: String,
        reason: String,
    },

    #[error("provider call failed: {0}")]
    Provider(String),
}
