//! ecogrid-score — the EcoGrid scoring engine.
//!
//! Pure functions over a server's retained sample window: statistical
//! descriptors of power draw, trend classification, z-score anomaly
//! detection, and the composite eco score in [0,100] that the autoscaler
//! and migration planner rank servers by.
//!
//! Nothing here is cached; every report is recomputed from the samples the
//! caller hands in.

pub mod analyzer;
pub mod error;

pub use analyzer::{Analyzer, AnalyzerConfig, Anomaly, AnomalyKind, ScoreReport, Trend};
pub use error::{ScoreError, ScoreResult};
