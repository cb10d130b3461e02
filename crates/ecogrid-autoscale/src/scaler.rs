//! Autoscaler — evaluates the latest sample per server against thresholds.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ecogrid_cloud::CloudProvider;
use ecogrid_score::Analyzer;
use ecogrid_store::{epoch_secs, MetricStore, Server, ServerId};

/// A server scoring above this is left alone by scale-down; consolidating
/// an already-efficient server gains nothing.
const KEEP_EFFICIENT_SCORE: f64 = 80.0;

/// Tunables for the autoscaler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// CPU percent above which a server is evacuated.
    pub cpu_threshold_high: f64,
    /// CPU percent below which a server is consolidated.
    pub cpu_threshold_low: f64,
    /// Power draw (watts) above which a server is evacuated.
    pub power_threshold_high: f64,
    /// Minimum seconds between scale-up actions, fleet-wide.
    pub scale_up_cooldown_secs: u64,
    /// Minimum seconds between scale-down actions, fleet-wide.
    pub scale_down_cooldown_secs: u64,
    /// Evaluation tick interval in seconds.
    pub evaluation_interval_secs: u64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            cpu_threshold_high: 80.0,
            cpu_threshold_low: 20.0,
            power_threshold_high: 1000.0,
            scale_up_cooldown_secs: 300,
            scale_down_cooldown_secs: 900,
            evaluation_interval_secs: 60,
        }
    }
}

/// Direction of a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    /// Evacuate an overloaded server.
    Up,
    /// Consolidate an underused server.
    Down,
}

/// Per-server result of one evaluation pass, including partial failures,
/// so callers and tests can assert on best-effort outcomes.
#[derive(Debug, Clone)]
pub struct ScaleOutcome {
    pub server_id: ServerId,
    pub action: ScaleAction,
    pub target_id: ServerId,
    /// Containers successfully relocated.
    pub relocated: usize,
    /// Containers whose relocation failed.
    pub failed: usize,
    /// Scale-down only: the pass stopped at the first failure, leaving
    /// the remaining containers in place.
    pub aborted: bool,
}

/// The autoscaler. Cooldown timestamps are fleet-global: one server's
/// scale-up suppresses every other server's scale-up until the cooldown
/// elapses.
pub struct Autoscaler {
    config: AutoscalerConfig,
    store: MetricStore,
    analyzer: Analyzer,
    provider: Arc<dyn CloudProvider>,
    last_scale_up: u64,
    last_scale_down: u64,
}

impl Autoscaler {
    pub fn new(
        config: AutoscalerConfig,
        store: MetricStore,
        analyzer: Analyzer,
        provider: Arc<dyn CloudProvider>,
    ) -> Self {
        Self {
            config,
            store,
            analyzer,
            provider,
            last_scale_up: 0,
            last_scale_down: 0,
        }
    }

    /// Evaluate every server in the fleet once.
    ///
    /// Per-server errors are logged and skipped; only a failure to list
    /// the fleet itself surfaces to the caller (the run loop logs it and
    /// waits for the next tick).
    pub async fn evaluate_fleet(&mut self) -> anyhow::Result<Vec<ScaleOutcome>> {
        let servers = self.provider.list_servers().await?;
        let now = epoch_secs();
        let mut outcomes = Vec::new();

        for server in &servers {
            let samples = match self.store.query(&server.id).await {
                Ok(s) => s,
                Err(_) => continue, // Nothing observed yet.
            };
            let Some(latest) = samples.last() else {
                continue;
            };

            if self.should_scale_up(latest.cpu_pct, latest.power_watts, now) {
                if let Some(outcome) = self.scale_up(server, &servers, now).await {
                    outcomes.push(outcome);
                }
            } else if self.should_scale_down(latest.cpu_pct, now)
                && let Some(outcome) = self.scale_down(server, &servers, now).await
            {
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }

    fn should_scale_up(&self, cpu: f64, power: f64, now: u64) -> bool {
        if now.saturating_sub(self.last_scale_up) < self.config.scale_up_cooldown_secs {
            return false;
        }
        cpu > self.config.cpu_threshold_high || power > self.config.power_threshold_high
    }

    fn should_scale_down(&self, cpu: f64, now: u64) -> bool {
        if now.saturating_sub(self.last_scale_down) < self.config.scale_down_cooldown_secs {
            return false;
        }
        cpu < self.config.cpu_threshold_low
    }

    /// Evacuate an overloaded server, best-effort per container.
    ///
    /// The cooldown stamps once the pass completes, regardless of
    /// individual container failures.
    async fn scale_up(
        &mut self,
        server: &Server,
        fleet: &[Server],
        now: u64,
    ) -> Option<ScaleOutcome> {
        let Some((target, target_score)) = self.best_target(fleet, &server.id).await else {
            warn!(server_id = %server.id, "scale-up: no eco-efficient target available");
            return None;
        };

        let containers = match self.provider.list_containers(&server.id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(server_id = %server.id, error = %e, "scale-up: container enumeration failed");
                return None;
            }
        };

        info!(
            server_id = %server.id,
            target_id = %target.id,
            target_score,
            containers = containers.len(),
            "scaling up: evacuating overloaded server"
        );

        let mut relocated = 0;
        let mut failed = 0;
        for container in &containers {
            match self
                .provider
                .relocate(&container.id, &server.id, &target.id)
                .await
            {
                Ok(()) => relocated += 1,
                Err(e) => {
                    warn!(
                        container_id = %container.id,
                        error = %e,
                        "scale-up: relocation failed, continuing"
                    );
                    failed += 1;
                }
            }
        }

        self.last_scale_up = now;
        Some(ScaleOutcome {
            server_id: server.id.clone(),
            action: ScaleAction::Up,
            target_id: target.id.clone(),
            relocated,
            failed,
            aborted: false,
        })
    }

    /// Consolidate an underused server.
    ///
    /// Stricter than scale-up: the first relocation failure aborts the
    /// remaining containers for this server, and the cooldown only stamps
    /// on a clean pass.
    async fn scale_down(
        &mut self,
        server: &Server,
        fleet: &[Server],
        now: u64,
    ) -> Option<ScaleOutcome> {
        let own_score = self.server_eco_score(&server.id).await;
        if own_score > KEEP_EFFICIENT_SCORE {
            debug!(server_id = %server.id, own_score, "scale-down: server already efficient, keeping");
            return None;
        }

        let Some((target, target_score)) = self.best_target(fleet, &server.id).await else {
            warn!(server_id = %server.id, "scale-down: no eco-efficient target available");
            return None;
        };

        let containers = match self.provider.list_containers(&server.id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(server_id = %server.id, error = %e, "scale-down: container enumeration failed");
                return None;
            }
        };

        info!(
            server_id = %server.id,
            target_id = %target.id,
            target_score,
            containers = containers.len(),
            "scaling down: consolidating underused server"
        );

        let mut relocated = 0;
        let mut failed = 0;
        let mut aborted = false;
        for container in &containers {
            match self
                .provider
                .relocate(&container.id, &server.id, &target.id)
                .await
            {
                Ok(()) => relocated += 1,
                Err(e) => {
                    warn!(
                        container_id = %container.id,
                        error = %e,
                        "scale-down: relocation failed, aborting consolidation"
                    );
                    failed += 1;
                    aborted = true;
                    break;
                }
            }
        }

        if !aborted {
            self.last_scale_down = now;
        }
        Some(ScaleOutcome {
            server_id: server.id.clone(),
            action: ScaleAction::Down,
            target_id: target.id.clone(),
            relocated,
            failed,
            aborted,
        })
    }

    /// Highest-eco-score server in the fleet, excluding `exclude`.
    ///
    /// Servers with no retained metrics score 0 and are never selected.
    async fn best_target(&self, fleet: &[Server], exclude: &str) -> Option<(Server, f64)> {
        let mut best: Option<(Server, f64)> = None;
        for server in fleet {
            if server.id == exclude {
                continue;
            }
            let score = self.server_eco_score(&server.id).await;
            if score > best.as_ref().map_or(0.0, |(_, s)| *s) {
                best = Some((server.clone(), score));
            }
        }
        best
    }

    /// Defensive eco score: missing metrics count as 0.
    async fn server_eco_score(&self, server_id: &str) -> f64 {
        match self.store.query(server_id).await {
            Ok(samples) => self.analyzer.eco_score(&samples),
            Err(_) => 0.0,
        }
    }

    /// Run the evaluation loop until the shutdown signal flips.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.evaluation_interval_secs,
            "autoscaler started"
        );
        let interval = Duration::from_secs(self.config.evaluation_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.evaluate_fleet().await {
                        Ok(outcomes) if !outcomes.is_empty() => {
                            debug!(actions = outcomes.len(), "autoscaler pass completed");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "autoscaler evaluation failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecogrid_cloud::StaticProvider;
    use ecogrid_score::AnalyzerConfig;
    use ecogrid_store::{Container, IntakeWorker, Sample, StoreConfig};

    fn server(id: &str) -> Server {
        Server {
            id: id.to_string(),
            provider: "aws".to_string(),
            region: "eu-west-1".to_string(),
            instance_type: "m5.large".to_string(),
        }
    }

    fn container(id: &str, server_id: &str) -> Container {
        Container {
            id: id.to_string(),
            server_id: server_id.to_string(),
            service_name: "web".to_string(),
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

    async fn seed(
        store: &MetricStore,
        worker: &mut IntakeWorker,
        server_id: &str,
        samples: Vec<Sample>,
    ) {
        store.ingest_batch(server_id.to_string(), samples).unwrap();
        worker.drain_queued().await;
    }

    fn no_cooldown_config() -> AutoscalerConfig {
        AutoscalerConfig {
            scale_up_cooldown_secs: 0,
            scale_down_cooldown_secs: 0,
            ..AutoscalerConfig::default()
        }
    }

    /// Fleet with an efficient target "green" and a provider-side source.
    async fn fixture() -> (MetricStore, IntakeWorker, StaticProvider) {
        let (store, mut worker) = MetricStore::new(StoreConfig::default());
        let provider = StaticProvider::new();
        provider.add_server(server("green")).await;
        // Efficient: low power, cpu near target, low carbon.
        let samples = (0..5)
            .map(|i| sample("green", i * 60, 70.0, 100.0, 0.05))
            .collect();
        seed(&store, &mut worker, "green", samples).await;
        (store, worker, provider)
    }

    #[tokio::test]
    async fn hot_cpu_triggers_evacuation() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("hot")).await;
        provider.add_container(container("c1", "hot")).await;
        provider.add_container(container("c2", "hot")).await;
        seed(&store, &mut worker, "hot", vec![sample("hot", 0, 85.0, 400.0, 0.2)]).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler =
            Autoscaler::new(no_cooldown_config(), store, analyzer, Arc::new(provider.clone()));

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert_eq!(outcome.action, ScaleAction::Up);
        assert_eq!(outcome.server_id, "hot");
        assert_eq!(outcome.target_id, "green");
        assert_eq!(outcome.relocated, 2);
        assert_eq!(outcome.failed, 0);

        assert_eq!(provider.list_containers("green").await.unwrap().len(), 2);
        assert!(provider.list_containers("hot").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn high_power_triggers_evacuation_even_at_moderate_cpu() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("guzzler")).await;
        provider.add_container(container("c1", "guzzler")).await;
        seed(
            &store,
            &mut worker,
            "guzzler",
            vec![sample("guzzler", 0, 50.0, 1200.0, 0.4)],
        )
        .await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler =
            Autoscaler::new(no_cooldown_config(), store, analyzer, Arc::new(provider));

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].action, ScaleAction::Up);
    }

    #[tokio::test]
    async fn cooldown_suppresses_scale_up() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("hot")).await;
        provider.add_container(container("c1", "hot")).await;
        seed(&store, &mut worker, "hot", vec![sample("hot", 0, 85.0, 400.0, 0.2)]).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler = Autoscaler::new(
            AutoscalerConfig::default(), // 5 minute scale-up cooldown
            store,
            analyzer,
            Arc::new(provider.clone()),
        );
        scaler.last_scale_up = epoch_secs(); // A scale-up just happened.

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert!(outcomes.is_empty());
        assert!(provider.relocations().await.is_empty());
    }

    #[tokio::test]
    async fn scale_up_continues_past_failures_and_stamps_cooldown() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("hot")).await;
        provider.add_container(container("c1", "hot")).await;
        provider.add_container(container("c2", "hot")).await;
        provider.fail_relocations_for("c1").await;
        seed(&store, &mut worker, "hot", vec![sample("hot", 0, 90.0, 400.0, 0.2)]).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler = Autoscaler::new(
            AutoscalerConfig {
                scale_up_cooldown_secs: 3600,
                ..no_cooldown_config()
            },
            store,
            analyzer,
            Arc::new(provider.clone()),
        );

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].relocated, 1);
        assert_eq!(outcomes[0].failed, 1);
        assert!(!outcomes[0].aborted);

        // Cooldown stamped despite the partial failure: the next pass is
        // suppressed even though c1 is still on the hot server.
        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn idle_inefficient_server_is_consolidated() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("idle")).await;
        provider.add_container(container("c1", "idle")).await;
        // Underused and inefficient: barely any cpu, meaningful power draw.
        let samples = (0..5)
            .map(|i| sample("idle", i * 60, 5.0, 600.0, 0.8))
            .collect();
        seed(&store, &mut worker, "idle", samples).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler =
            Autoscaler::new(no_cooldown_config(), store, analyzer, Arc::new(provider.clone()));

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].action, ScaleAction::Down);
        assert_eq!(outcomes[0].relocated, 1);
        assert!(provider.list_containers("idle").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn efficient_idle_server_is_left_in_place() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("frugal")).await;
        provider.add_container(container("c1", "frugal")).await;
        // Idle but very efficient: tiny power and carbon, eco score > 80.
        let samples = (0..5)
            .map(|i| sample("frugal", i * 60, 15.0, 20.0, 0.0))
            .collect();
        seed(&store, &mut worker, "frugal", samples).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler =
            Autoscaler::new(no_cooldown_config(), store, analyzer, Arc::new(provider.clone()));

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(provider.list_containers("frugal").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scale_down_aborts_on_first_failure() {
        let (store, mut worker, provider) = fixture().await;
        provider.add_server(server("idle")).await;
        provider.add_container(container("c1", "idle")).await;
        provider.add_container(container("c2", "idle")).await;
        provider.fail_relocations_for("c1").await;
        let samples = (0..5)
            .map(|i| sample("idle", i * 60, 5.0, 600.0, 0.8))
            .collect();
        seed(&store, &mut worker, "idle", samples).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler =
            Autoscaler::new(no_cooldown_config(), store, analyzer, Arc::new(provider.clone()));

        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.aborted);
        assert_eq!(outcome.relocated, 0);
        assert_eq!(outcome.failed, 1);

        // c2 was never attempted and the cooldown was not stamped.
        assert_eq!(provider.list_containers("idle").await.unwrap().len(), 2);
        assert_eq!(scaler.last_scale_down, 0);
    }

    #[tokio::test]
    async fn no_action_without_an_eligible_target() {
        let (store, mut worker) = MetricStore::new(StoreConfig::default());
        let provider = StaticProvider::new();
        provider.add_server(server("hot")).await;
        provider.add_container(container("c1", "hot")).await;
        seed(&store, &mut worker, "hot", vec![sample("hot", 0, 95.0, 400.0, 0.2)]).await;

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let mut scaler =
            Autoscaler::new(no_cooldown_config(), store, analyzer, Arc::new(provider.clone()));

        // The only other candidate would be the source itself.
        let outcomes = scaler.evaluate_fleet().await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(provider.list_containers("hot").await.unwrap().len(), 1);
    }
}
