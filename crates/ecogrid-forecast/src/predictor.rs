//! Per-server trend models and the retraining loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use ecogrid_store::{epoch_secs, MetricStore, Sample, ServerId};

use crate::error::{ForecastError, ForecastResult};

/// Forecasts further out than the history window carry the floor
/// confidence rather than zero, to signal "a guess, not noise".
const MIN_CONFIDENCE: f64 = 0.2;

/// Tunables for the forecaster.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Minimum samples before a model is fitted.
    pub min_data_points: usize,
    /// Retraining tick interval in seconds.
    pub update_interval_secs: u64,
    /// History span the confidence estimate is scaled against.
    pub history_window_secs: u64,
    /// Where models are persisted; `None` disables persistence.
    pub model_path: Option<PathBuf>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_data_points: 10,
            update_interval_secs: 600,
            history_window_secs: 24 * 3600,
            model_path: None,
        }
    }
}

/// A fitted per-server model: linear trend over time plus hour-of-day
/// seasonal offsets computed from the residuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesModel {
    pub server_id: ServerId,
    /// Watts per second.
    pub slope: f64,
    /// Watts at `base_ts`.
    pub intercept: f64,
    /// Timestamp the trend is anchored to (first training sample).
    pub base_ts: u64,
    /// Mean residual per hour of day, watts.
    pub seasonal: Vec<f64>,
    pub trained_at: u64,
    pub samples_used: usize,
}

impl SeriesModel {
    /// Fit a model over the power draw of `samples`.
    pub fn fit(
        server_id: &str,
        samples: &[Sample],
        min_data_points: usize,
    ) -> ForecastResult<Self> {
        if samples.len() < min_data_points {
            return Err(ForecastError::InsufficientData {
                have: samples.len(),
                need: min_data_points,
            });
        }

        let base_ts = samples[0].timestamp;
        let n = samples.len() as f64;
        let xs: Vec<f64> = samples
            .iter()
            .map(|s| (s.timestamp - base_ts) as f64)
            .collect();
        let ys: Vec<f64> = samples.iter().map(|s| s.power_watts).collect();

        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let mut cov = 0.0;
        let mut var = 0.0;
        for (x, y) in xs.iter().zip(&ys) {
            cov += (x - mean_x) * (y - mean_y);
            var += (x - mean_x) * (x - mean_x);
        }
        // A single burst of identical timestamps has no usable trend.
        let slope = if var == 0.0 { 0.0 } else { cov / var };
        let intercept = mean_y - slope * mean_x;

        // Hour-of-day offsets from the trend residuals.
        let mut sums = vec![0.0f64; 24];
        let mut counts = vec![0usize; 24];
        for (s, x) in samples.iter().zip(&xs) {
            let hour = ((s.timestamp / 3600) % 24) as usize;
            sums[hour] += s.power_watts - (intercept + slope * x);
            counts[hour] += 1;
        }
        let seasonal = sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| if *count == 0 { 0.0 } else { sum / *count as f64 })
            .collect();

        Ok(Self {
            server_id: server_id.to_string(),
            slope,
            intercept,
            base_ts,
            seasonal,
            trained_at: epoch_secs(),
            samples_used: samples.len(),
        })
    }

    /// Expected power draw at `at_ts`, never negative.
    pub fn predict_at(&self, at_ts: u64) -> f64 {
        let x = at_ts.saturating_sub(self.base_ts) as f64;
        let hour = ((at_ts / 3600) % 24) as usize;
        // Persisted models may carry fewer than 24 offsets; missing hours
        // contribute no seasonal adjustment.
        let seasonal = self.seasonal.get(hour).copied().unwrap_or(0.0);
        (self.intercept + self.slope * x + seasonal).max(0.0)
    }
}

/// An advisory prediction for one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub server_id: ServerId,
    /// Timestamp the prediction is for.
    pub at: u64,
    pub power_watts: f64,
    /// 0–1, falling as the horizon stretches past the history window.
    pub confidence: f64,
}

/// The forecaster. Shareable via `Arc`.
pub struct Predictor {
    config: ForecastConfig,
    store: MetricStore,
    models: Arc<RwLock<HashMap<ServerId, SeriesModel>>>,
}

impl Predictor {
    pub fn new(config: ForecastConfig, store: MetricStore) -> Self {
        Self {
            config,
            store,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Refit models for every tracked server. Servers with too little
    /// data are skipped, keeping any previously fitted model.
    pub async fn retrain_all(&self) {
        for server_id in self.store.tracked_servers().await {
            let samples = match self.store.query(&server_id).await {
                Ok(s) => s,
                Err(_) => continue,
            };
            match SeriesModel::fit(&server_id, &samples, self.config.min_data_points) {
                Ok(model) => {
                    self.models.write().await.insert(server_id, model);
                }
                Err(e) => {
                    debug!(%server_id, error = %e, "skipping model refit");
                }
            }
        }
    }

    /// Predict a server's power draw `horizon_secs` from now.
    pub async fn forecast(&self, server_id: &str, horizon_secs: u64) -> ForecastResult<Forecast> {
        let models = self.models.read().await;
        let model = models
            .get(server_id)
            .ok_or_else(|| ForecastError::ModelNotFound(server_id.to_string()))?;

        let at = epoch_secs() + horizon_secs;
        let confidence = (1.0
            - horizon_secs as f64 / self.config.history_window_secs as f64)
            .max(MIN_CONFIDENCE);
        Ok(Forecast {
            server_id: server_id.to_string(),
            at,
            power_watts: model.predict_at(at),
            confidence,
        })
    }

    /// Load previously persisted models. Missing or unreadable files are
    /// logged and ignored.
    pub async fn load_models(&self) {
        let Some(path) = &self.config.model_path else {
            return;
        };
        let loaded: HashMap<ServerId, SeriesModel> = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(models) => models,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "model file unreadable, starting fresh");
                    return;
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no persisted models");
                return;
            }
        };
        let count = loaded.len();
        *self.models.write().await = loaded;
        info!(count, path = %path.display(), "forecast models loaded");
    }

    /// Persist the current models. Failures are logged and skipped.
    pub async fn save_models(&self) {
        let Some(path) = &self.config.model_path else {
            return;
        };
        let models = self.models.read().await;
        let bytes = match serde_json::to_vec(&*models) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "model serialization failed, skipping save");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, bytes) {
            warn!(path = %path.display(), error = %e, "model save failed, skipping");
        }
    }

    /// Run the retraining loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.load_models().await;
        info!(
            interval_secs = self.config.update_interval_secs,
            "forecaster started"
        );
        let interval = Duration::from_secs(self.config.update_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.retrain_all().await;
                    self.save_models().await;
                }
                _ = shutdown.changed() => {
                    self.save_models().await;
                    info!("forecaster shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecogrid_store::{IntakeWorker, StoreConfig};

    fn sample(server_id: &str, ts: u64, power: f64) -> Sample {
        Sample {
            server_id: server_id.to_string(),
            timestamp: ts,
            cpu_pct: 50.0,
            memory_pct: 40.0,
            power_watts: power,
            carbon_kg: 0.1,
        }
    }

    fn linear_series(server_id: &str, n: u64, base: f64, per_minute: f64) -> Vec<Sample> {
        (0..n)
            .map(|i| sample(server_id, i * 60, base + per_minute * i as f64))
            .collect()
    }

    #[test]
    fn fit_recovers_a_linear_trend() {
        // 100 W rising 2 W per minute.
        let samples = linear_series("srv", 30, 100.0, 2.0);
        let model = SeriesModel::fit("srv", &samples, 10).unwrap();

        // Slope is per second: 2 W / 60 s.
        assert!((model.slope - 2.0 / 60.0).abs() < 1e-9);
        assert!((model.intercept - 100.0).abs() < 1e-6);

        // Extrapolate to minute 40.
        let predicted = model.predict_at(40 * 60);
        assert!((predicted - 180.0).abs() < 1.0, "got {predicted}");
    }

    #[test]
    fn fit_requires_enough_samples() {
        let samples = linear_series("srv", 5, 100.0, 1.0);
        let err = SeriesModel::fit("srv", &samples, 10).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData { have: 5, need: 10 }
        ));
    }

    #[test]
    fn constant_series_predicts_itself_and_never_goes_negative() {
        let samples = linear_series("srv", 20, 250.0, 0.0);
        let model = SeriesModel::fit("srv", &samples, 10).unwrap();
        assert!((model.predict_at(10_000) - 250.0).abs() < 1e-6);

        let falling = linear_series("srv", 20, 50.0, -10.0);
        let model = SeriesModel::fit("srv", &falling, 10).unwrap();
        // Far enough out the trend crosses zero; the prediction clamps.
        assert_eq!(model.predict_at(1_000_000), 0.0);
    }

    #[tokio::test]
    async fn retrain_and_forecast_through_the_store() {
        let (store, mut worker) = MetricStore::new(StoreConfig::default());
        store
            .ingest_batch("srv".to_string(), linear_series("srv", 30, 100.0, 2.0))
            .unwrap();
        worker.drain_queued().await;

        let predictor = Predictor::new(ForecastConfig::default(), store);
        predictor.retrain_all().await;

        let forecast = predictor.forecast("srv", 600).await.unwrap();
        assert_eq!(forecast.server_id, "srv");
        assert!(forecast.power_watts > 0.0);
        assert!(forecast.confidence > 0.9);

        // Long horizons floor at the minimum confidence.
        let distant = predictor.forecast("srv", 10 * 24 * 3600).await.unwrap();
        assert_eq!(distant.confidence, MIN_CONFIDENCE);

        assert!(matches!(
            predictor.forecast("ghost", 60).await.unwrap_err(),
            ForecastError::ModelNotFound(_)
        ));
    }

    #[tokio::test]
    async fn models_survive_a_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");

        let (store, mut worker) = MetricStore::new(StoreConfig::default());
        store
            .ingest_batch("srv".to_string(), linear_series("srv", 30, 100.0, 2.0))
            .unwrap();
        worker.drain_queued().await;

        let config = ForecastConfig {
            model_path: Some(path.clone()),
            ..ForecastConfig::default()
        };
        let predictor = Predictor::new(config.clone(), store.clone());
        predictor.retrain_all().await;
        predictor.save_models().await;

        // A fresh predictor with no training loads the persisted model.
        let restored = Predictor::new(config, store);
        restored.load_models().await;
        let forecast = restored.forecast("srv", 60).await.unwrap();
        assert!(forecast.power_watts > 100.0);
    }

    #[tokio::test]
    async fn truncated_seasonal_table_forecasts_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");

        // A hand-edited or older model file may hold fewer than 24
        // seasonal offsets.
        let mut models: HashMap<ServerId, SeriesModel> = HashMap::new();
        models.insert(
            "srv".to_string(),
            SeriesModel {
                server_id: "srv".to_string(),
                slope: 0.0,
                intercept: 200.0,
                base_ts: 0,
                seasonal: vec![5.0; 3],
                trained_at: 0,
                samples_used: 30,
            },
        );
        std::fs::write(&path, serde_json::to_vec(&models).unwrap()).unwrap();

        let (store, _worker) = MetricStore::new(StoreConfig::default());
        let predictor = Predictor::new(
            ForecastConfig {
                model_path: Some(path),
                ..ForecastConfig::default()
            },
            store,
        );
        predictor.load_models().await;

        let forecast = predictor.forecast("srv", 60).await.unwrap();
        // Hours past the table carry no seasonal offset.
        assert!(forecast.power_watts >= 200.0);
    }

    #[tokio::test]
    async fn missing_or_corrupt_model_files_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");

        let (store, _worker) = MetricStore::new(StoreConfig::default());
        let config = ForecastConfig {
            model_path: Some(path.clone()),
            ..ForecastConfig::default()
        };

        let predictor = Predictor::new(config.clone(), store.clone());
        predictor.load_models().await; // File absent: fine.

        std::fs::write(&path, b"not json").unwrap();
        let predictor = Predictor::new(config, store);
        predictor.load_models().await; // Corrupt: logged, ignored.
        assert!(predictor.forecast("srv", 60).await.is_err());
    }
}
