//! Statistical analysis of a server's sample window.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ecogrid_store::Sample;

use crate::error::{ScoreError, ScoreResult};

/// Normalization baseline for the power component of the eco score.
const POWER_BASELINE_WATTS: f64 = 1000.0;

/// CPU utilization sweet spot; deviation either direction penalizes.
const CPU_TARGET: f64 = 0.7;

/// Tunables for the analyzer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Minimum retained samples before `analyze` produces a report.
    pub min_data_points: usize,
    /// Z-score magnitude above which a sample is flagged as an anomaly.
    pub anomaly_threshold: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_data_points: 10,
            anomaly_threshold: 2.5,
        }
    }
}

/// Direction of power-draw movement over the sample window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Direction of an anomalous sample relative to the window mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    Drop,
}

/// One sample flagged by z-score detection. Produced fresh per analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: u64,
    pub value: f64,
    pub kind: AnomalyKind,
    /// Z-score magnitude.
    pub severity: f64,
}

/// Derived view of one server's sample window. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub trend: Trend,
    pub anomalies: Vec<Anomaly>,
    /// Timestamp of the highest power draw in the window.
    pub peak_usage_at: u64,
    /// Composite eco score in [0,100].
    pub eco_score: f64,
}

/// The scoring engine. Cheap to clone; holds only configuration.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze a server's retained window into a full report.
    ///
    /// Fails with [`ScoreError::InsufficientData`] below the configured
    /// minimum, before any statistics are computed.
    pub fn analyze(&self, samples: &[Sample]) -> ScoreResult<ScoreReport> {
        if samples.len() < self.config.min_data_points {
            return Err(ScoreError::InsufficientData {
                have: samples.len(),
                need: self.config.min_data_points,
            });
        }

        let mean = mean_power(samples);
        let std_dev = std_dev_power(samples, mean);
        let (min, max) = min_max_power(samples);
        let report = ScoreReport {
            mean,
            median: median_power(samples),
            std_dev,
            min,
            max,
            trend: classify_trend(samples),
            anomalies: self.detect_anomalies(samples, mean, std_dev),
            peak_usage_at: peak_usage_time(samples),
            eco_score: self.eco_score(samples),
        };
        debug!(
            samples = samples.len(),
            mean = report.mean,
            eco_score = report.eco_score,
            anomalies = report.anomalies.len(),
            "window analyzed"
        );
        Ok(report)
    }

    /// Composite eco score in [0,100].
    ///
    /// Weighted blend of normalized power draw (0.4), CPU-utilization
    /// proximity to the 70% target (0.3), and carbon footprint (0.3).
    /// Empty input yields 0 rather than an error: the autoscaler and
    /// planner call this defensively on possibly-absent data.
    pub fn eco_score(&self, samples: &[Sample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }

        let power_score = (1.0 - mean_power(samples) / POWER_BASELINE_WATTS).max(0.0);

        let utilization_score = (samples
            .iter()
            .map(|s| 1.0 - (CPU_TARGET - s.cpu_pct / 100.0).abs())
            .sum::<f64>()
            / samples.len() as f64)
            .max(0.0);

        let mean_carbon =
            samples.iter().map(|s| s.carbon_kg).sum::<f64>() / samples.len() as f64;
        let carbon_score = (1.0 - mean_carbon).max(0.0);

        let score = 100.0 * (0.4 * power_score + 0.3 * utilization_score + 0.3 * carbon_score);
        score.clamp(0.0, 100.0)
    }

    /// Flag samples whose z-score exceeds the configured threshold.
    ///
    /// A zero standard deviation yields no anomalies; the division is
    /// guarded rather than propagated.
    fn detect_anomalies(&self, samples: &[Sample], mean: f64, std_dev: f64) -> Vec<Anomaly> {
        if std_dev == 0.0 {
            return Vec::new();
        }
        samples
            .iter()
            .filter_map(|s| {
                let z = (s.power_watts - mean).abs() / std_dev;
                (z > self.config.anomaly_threshold).then(|| Anomaly {
                    timestamp: s.timestamp,
                    value: s.power_watts,
                    kind: if s.power_watts > mean {
                        AnomalyKind::Spike
                    } else {
                        AnomalyKind::Drop
                    },
                    severity: z,
                })
            })
            .collect()
    }

    pub fn min_data_points(&self) -> usize {
        self.config.min_data_points
    }
}

fn mean_power(samples: &[Sample]) -> f64 {
    samples.iter().map(|s| s.power_watts).sum::<f64>() / samples.len() as f64
}

fn median_power(samples: &[Sample]) -> f64 {
    let mut values: Vec<f64> = samples.iter().map(|s| s.power_watts).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Population standard deviation of power draw.
fn std_dev_power(samples: &[Sample], mean: f64) -> f64 {
    let sum_squares: f64 = samples
        .iter()
        .map(|s| {
            let diff = s.power_watts - mean;
            diff * diff
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt()
}

fn min_max_power(samples: &[Sample]) -> (f64, f64) {
    let mut min = samples[0].power_watts;
    let mut max = samples[0].power_watts;
    for s in samples {
        min = min.min(s.power_watts);
        max = max.max(s.power_watts);
    }
    (min, max)
}

/// Compare first-half and second-half means (split by index order).
/// Movement beyond 10% of the first-half mean classifies the trend.
fn classify_trend(samples: &[Sample]) -> Trend {
    if samples.len() < 2 {
        return Trend::Stable;
    }
    let (first, second) = samples.split_at(samples.len() / 2);
    let first_mean = mean_power(first);
    let second_mean = mean_power(second);

    let diff = second_mean - first_mean;
    let threshold = 0.1 * first_mean;
    if diff > threshold {
        Trend::Increasing
    } else if diff < -threshold {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Timestamp of the sample with the highest power draw.
fn peak_usage_time(samples: &[Sample]) -> u64 {
    let mut peak_power = 0.0;
    let mut peak_at = 0;
    for s in samples {
        if s.power_watts > peak_power {
            peak_power = s.power_watts;
            peak_at = s.timestamp;
        }
    }
    peak_at
}
