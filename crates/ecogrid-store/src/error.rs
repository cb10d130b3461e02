//! Error types for the EcoGrid metric store.

use thiserror::Error;

/// Result type alias for metric store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during metric store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The ingestion buffer is at capacity. The sample was not enqueued;
    /// the producer decides whether to retry or drop.
    #[error("ingestion buffer full")]
    BufferFull,

    /// The intake worker has stopped and the channel is closed.
    #[error("ingestion pipeline closed")]
    Closed,

    /// No samples have ever been incorporated for this server.
    #[error("no metrics found for server: {0}")]
    NotFound(String),
}
