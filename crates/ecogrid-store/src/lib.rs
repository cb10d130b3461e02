//! ecogrid-store — in-memory metric store for the EcoGrid fleet.
//!
//! Holds a bounded, per-server time series of [`Sample`]s. Ingestion goes
//! through a bounded channel with explicit backpressure; a single consumer
//! task incorporates batches so all writes to a server's series flow through
//! one path. A periodic eviction sweep enforces the retention window.
//!
//! The [`MetricStore`] handle is `Clone` + `Send` + `Sync` and can be shared
//! across async tasks; readers take a defensive snapshot and must not assume
//! the series is stable across calls.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::{IntakeWorker, MetricStore, StoreConfig};
pub use types::*;
