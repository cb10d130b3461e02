//! Periodic classification of services into eco profiles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use ecogrid_cloud::CloudProvider;
use ecogrid_score::Analyzer;
use ecogrid_store::{epoch_secs, Container, MetricStore, Sample};

use crate::error::{TagError, TagResult};
use crate::rules::{builtin_rules, peak_hours_active, TagContext, TagRule};

/// Fallback profile score when no tag activates: neutral, and it keeps
/// the weighted average's denominator away from zero.
const NEUTRAL_SCORE: f64 = 50.0;

/// Tunables for the classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TagManagerConfig {
    /// Classification pass interval in seconds.
    pub update_interval_secs: u64,
    /// Minimum samples before a service can be profiled.
    pub min_data_points: usize,
}

impl Default for TagManagerConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 300,
            min_data_points: 10,
        }
    }
}

/// One service's energy profile. Fully replaced on each pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEcoProfile {
    pub service_name: String,
    pub tags: Vec<String>,
    /// Weighted average of the activated tags' contributions.
    pub eco_score: f64,
    pub avg_power_watts: f64,
    pub avg_carbon_kg: f64,
    pub last_update: u64,
}

/// The eco-tag classifier. Shareable via `Arc`; profiles live behind
/// their own lock.
pub struct TagManager {
    config: TagManagerConfig,
    store: MetricStore,
    analyzer: Analyzer,
    provider: Arc<dyn CloudProvider>,
    rules: Vec<TagRule>,
    profiles: Arc<RwLock<HashMap<String, ServiceEcoProfile>>>,
}

impl TagManager {
    pub fn new(
        config: TagManagerConfig,
        store: MetricStore,
        analyzer: Analyzer,
        provider: Arc<dyn CloudProvider>,
    ) -> Self {
        Self {
            config,
            store,
            analyzer,
            provider,
            rules: builtin_rules(),
            profiles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Profile for one service.
    pub async fn profile(&self, service_name: &str) -> TagResult<ServiceEcoProfile> {
        self.profiles
            .read()
            .await
            .get(service_name)
            .cloned()
            .ok_or_else(|| TagError::ProfileNotFound(service_name.to_string()))
    }

    /// Snapshot of all known profiles.
    pub async fn all_profiles(&self) -> Vec<ServiceEcoProfile> {
        self.profiles.read().await.values().cloned().collect()
    }

    /// One classification pass over every container in the fleet.
    /// Returns the number of profiles written.
    pub async fn update_profiles(&self) -> anyhow::Result<usize> {
        let servers = self.provider.list_servers().await?;
        let mut written = 0;

        for server in &servers {
            let containers = match self.provider.list_containers(&server.id).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(server_id = %server.id, error = %e, "classification: container enumeration failed");
                    continue;
                }
            };
            for container in &containers {
                if let Some(profile) = self.classify(container).await {
                    self.profiles
                        .write()
                        .await
                        .insert(profile.service_name.clone(), profile);
                    written += 1;
                }
            }
        }

        debug!(written, "classification pass completed");
        Ok(written)
    }

    /// Derive a fresh profile for one container's service, or nothing if
    /// too few samples are retained for its server.
    async fn classify(&self, container: &Container) -> Option<ServiceEcoProfile> {
        let samples = self.store.query(&container.server_id).await.ok()?;
        if samples.len() < self.config.min_data_points {
            return None;
        }

        let ctx = TagContext {
            eco_score: self.analyzer.eco_score(&samples),
            avg_power_watts: mean(&samples, |s| s.power_watts),
            avg_carbon_kg: mean(&samples, |s| s.carbon_kg),
            peak_hours_active: peak_hours_active(&samples),
        };

        let mut tags = Vec::new();
        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        for rule in &self.rules {
            if (rule.activates)(&rule.def, &ctx) {
                tags.push(rule.def.name.to_string());
                total_score += rule.def.score * rule.def.weight;
                total_weight += rule.def.weight;
            }
        }

        let eco_score = if total_weight == 0.0 {
            NEUTRAL_SCORE
        } else {
            total_score / total_weight
        };

        Some(ServiceEcoProfile {
            service_name: container.service_name.clone(),
            tags,
            eco_score,
            avg_power_watts: ctx.avg_power_watts,
            avg_carbon_kg: ctx.avg_carbon_kg,
            last_update: epoch_secs(),
        })
    }

    /// Run the classification loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.update_interval_secs,
            "eco-tag classifier started"
        );
        let interval = Duration::from_secs(self.config.update_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.update_profiles().await {
                        tracing::error!(error = %e, "classification pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("eco-tag classifier shutting down");
                    break;
                }
            }
        }
    }
}

fn mean(samples: &[Sample], f: impl Fn(&Sample) -> f64) -> f64 {
    samples.iter().map(f).sum::<f64>() / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecogrid_cloud::StaticProvider;
    use ecogrid_score::AnalyzerConfig;
    use ecogrid_store::{IntakeWorker, Server, StoreConfig};

    fn server(id: &str) -> Server {
        Server {
            id: id.to_string(),
            provider: "gcp".to_string(),
            region: "europe-north1".to_string(),
            instance_type: "e2-standard-4".to_string(),
        }
    }

    fn container(id: &str, server_id: &str, service: &str) -> Container {
        Container {
            id: id.to_string(),
            server_id: server_id.to_string(),
            service_name: service.to_string(),
            eco_tags: Vec::new(),
            power_watts: 150.0,
        }
    }

    fn sample(server_id: &str, ts: u64, cpu: f64, power: f64, carbon: f64) -> Sample {
        Sample {
            server_id: server_id.to_string(),
            timestamp: ts,
            cpu_pct: cpu,
            memory_pct: 40.0,
            power_watts: power,
            carbon_kg: carbon,
        }
    }

    async fn manager_with(
        samples_per_server: Vec<(&str, Vec<Sample>)>,
        containers: Vec<Container>,
    ) -> TagManager {
        let (store, mut worker) = MetricStore::new(StoreConfig::default());
        let provider = StaticProvider::new();
        for (id, samples) in samples_per_server {
            provider.add_server(server(id)).await;
            store.ingest_batch(id.to_string(), samples).unwrap();
        }
        worker.drain_queued().await;
        for c in containers {
            provider.add_container(c).await;
        }
        TagManager::new(
            TagManagerConfig::default(),
            store,
            Analyzer::new(AnalyzerConfig::default()),
            Arc::new(provider),
        )
    }

    fn off_peak_ts(i: u64) -> u64 {
        3 * 3600 + i // 03:00, outside peak hours
    }

    #[tokio::test]
    async fn green_service_gets_efficient_tags() {
        // Low power, cpu at target, negligible carbon.
        let samples = (0..12)
            .map(|i| sample("green", off_peak_ts(i), 70.0, 80.0, 0.02))
            .collect();
        let tm = manager_with(
            vec![("green", samples)],
            vec![container("c1", "green", "checkout")],
        )
        .await;

        assert_eq!(tm.update_profiles().await.unwrap(), 1);
        let profile = tm.profile("checkout").await.unwrap();
        assert!(profile.tags.contains(&"eco-efficient".to_string()));
        assert!(profile.tags.contains(&"carbon-neutral".to_string()));
        assert!(!profile.tags.contains(&"energy-intensive".to_string()));
        // eco-efficient (100×1.0) + carbon-neutral (100×1.5) → 100.
        assert!((profile.eco_score - 100.0).abs() < 1e-9);
        assert!((profile.avg_power_watts - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn energy_intensive_boundary_is_inclusive_at_500w() {
        let samples = (0..12)
            .map(|i| sample("hog", off_peak_ts(i), 50.0, 500.0, 0.5))
            .collect();
        let tm = manager_with(
            vec![("hog", samples)],
            vec![container("c1", "hog", "batch")],
        )
        .await;

        tm.update_profiles().await.unwrap();
        let profile = tm.profile("batch").await.unwrap();
        assert!(profile.tags.contains(&"energy-intensive".to_string()));
    }

    #[tokio::test]
    async fn tags_are_not_mutually_exclusive() {
        // Heavy draw during peak hours, poor eco score: three tags at once.
        let samples = (0..12)
            .map(|i| sample("busy", 10 * 3600 + i, 95.0, 900.0, 2.0))
            .collect();
        let tm = manager_with(
            vec![("busy", samples)],
            vec![container("c1", "busy", "render")],
        )
        .await;

        tm.update_profiles().await.unwrap();
        let profile = tm.profile("render").await.unwrap();
        assert!(profile.tags.contains(&"energy-intensive".to_string()));
        assert!(profile.tags.contains(&"optimizable".to_string()));
        assert!(profile.tags.contains(&"peak-hours".to_string()));
    }

    #[tokio::test]
    async fn no_activated_tag_defaults_to_neutral_score() {
        // Middling everything: score in (60, 80), power < 500, carbon > 0.1,
        // off-peak. No rule fires.
        let samples = (0..12)
            .map(|i| sample("mid", off_peak_ts(i), 60.0, 300.0, 0.5))
            .collect();
        let tm = manager_with(
            vec![("mid", samples)],
            vec![container("c1", "mid", "api")],
        )
        .await;

        tm.update_profiles().await.unwrap();
        let profile = tm.profile("api").await.unwrap();
        assert!(profile.tags.is_empty());
        assert_eq!(profile.eco_score, NEUTRAL_SCORE);
    }

    #[tokio::test]
    async fn short_windows_are_skipped() {
        let samples = (0..3)
            .map(|i| sample("sparse", off_peak_ts(i), 50.0, 100.0, 0.1))
            .collect();
        let tm = manager_with(
            vec![("sparse", samples)],
            vec![container("c1", "sparse", "cron")],
        )
        .await;

        assert_eq!(tm.update_profiles().await.unwrap(), 0);
        assert!(matches!(
            tm.profile("cron").await.unwrap_err(),
            TagError::ProfileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn profiles_are_replaced_not_merged() {
        let (store, mut worker) = MetricStore::new(StoreConfig::default());
        let provider = StaticProvider::new();
        provider.add_server(server("srv")).await;
        provider.add_container(container("c1", "srv", "web")).await;

        let heavy: Vec<Sample> = (0..12)
            .map(|i| sample("srv", off_peak_ts(i), 50.0, 900.0, 2.0))
            .collect();
        store.ingest_batch("srv".to_string(), heavy).unwrap();
        worker.drain_queued().await;

        let tm = TagManager::new(
            TagManagerConfig::default(),
            store.clone(),
            Analyzer::new(AnalyzerConfig::default()),
            Arc::new(provider),
        );
        tm.update_profiles().await.unwrap();
        assert!(tm
            .profile("web")
            .await
            .unwrap()
            .tags
            .contains(&"energy-intensive".to_string()));

        // Window turns green after eviction of the heavy samples.
        store.sweep(u64::MAX / 2).await; // Evict everything retained so far.
        let light: Vec<Sample> = (0..12)
            .map(|i| sample("srv", off_peak_ts(i), 70.0, 80.0, 0.02))
            .collect();
        store.ingest_batch("srv".to_string(), light).unwrap();
        worker.drain_queued().await;

        tm.update_profiles().await.unwrap();
        let profile = tm.profile("web").await.unwrap();
        assert!(!profile.tags.contains(&"energy-intensive".to_string()));
        assert!(profile.tags.contains(&"eco-efficient".to_string()));
    }
}
