//! ecogrid-forecast — advisory power-draw forecasting.
//!
//! Fits a small per-server model (least-squares trend plus hour-of-day
//! seasonality offsets) over the retained power samples and extrapolates
//! forward. The output is advisory: the migration planner may consult it,
//! nothing requires it.
//!
//! Models are persisted as JSON, best-effort: load/save failures are
//! logged and skipped, never fatal.

pub mod error;
pub mod predictor;

pub use error::{ForecastError, ForecastResult};
pub use predictor::{Forecast, ForecastConfig, Predictor, SeriesModel};
