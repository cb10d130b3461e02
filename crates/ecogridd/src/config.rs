//! Daemon configuration.
//!
//! One TOML file with a section per subsystem. Every section and every
//! field is optional; omissions fall back to the built-in defaults, so
//! an empty file (or no file at all) yields a working configuration.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use ecogrid_api::ApiConfig;
use ecogrid_autoscale::AutoscalerConfig;
use ecogrid_forecast::ForecastConfig;
use ecogrid_planner::PlannerConfig;
use ecogrid_score::AnalyzerConfig;
use ecogrid_store::StoreConfig;
use ecogrid_tags::TagManagerConfig;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EcoGridConfig {
    pub store: StoreConfig,
    pub analyzer: AnalyzerConfig,
    pub autoscaler: AutoscalerConfig,
    pub planner: PlannerConfig,
    pub tags: TagManagerConfig,
    pub forecast: ForecastConfig,
    pub api: ApiConfig,
}

impl EcoGridConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}
