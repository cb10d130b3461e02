//! Migration planning and bounded-parallel execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{debug, info, warn};

use ecogrid_cloud::CloudProvider;
use ecogrid_score::Analyzer;
use ecogrid_store::{Container, ContainerId, MetricStore, Server, ServerId};

/// Servers scoring at or below this are candidates for workload migration.
const UNDERPERFORMING_SCORE: f64 = 70.0;

/// Structural downtime estimate: base cost of any relocation.
const BASE_DOWNTIME_SECS: u64 = 30;

/// Added when source and target sit in different regions.
const CROSS_REGION_PENALTY_SECS: u64 = 60;

/// Tunables for the migration planner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Minimum estimated saving (watts) for a plan to qualify.
    pub min_power_saving_watts: f64,
    /// Maximum tolerated downtime estimate in seconds.
    pub max_downtime_secs: u64,
    /// Planning tick interval in seconds.
    pub planning_interval_secs: u64,
    /// Hard ceiling on simultaneous in-flight relocations.
    pub concurrent_migrations: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_power_saving_watts: 100.0,
            max_downtime_secs: 120,
            planning_interval_secs: 300,
            concurrent_migrations: 3,
        }
    }
}

/// A proposed, not-yet-guaranteed relocation of one container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationPlan {
    pub container_id: ContainerId,
    pub source_id: ServerId,
    pub target_id: ServerId,
    /// 1–10, 10 = most urgent.
    pub priority: u8,
    /// Estimated saving in watts.
    pub power_saving_watts: f64,
    /// Estimated downtime in seconds.
    pub downtime_secs: u64,
}

/// Result of executing one plan, for callers and tests.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub container_id: ContainerId,
    pub success: bool,
}

/// The migration planner. Shareable via `Arc`; all mutable state sits
/// behind the active-plans lock, which is never held across a provider
/// call.
pub struct Planner {
    config: PlannerConfig,
    store: MetricStore,
    analyzer: Analyzer,
    provider: Arc<dyn CloudProvider>,
    /// Active plans keyed by container id: at most one per container.
    plans: Arc<RwLock<HashMap<ContainerId, MigrationPlan>>>,
    /// Bounds simultaneous in-flight relocations.
    gate: Arc<Semaphore>,
}

impl Planner {
    pub fn new(
        config: PlannerConfig,
        store: MetricStore,
        analyzer: Analyzer,
        provider: Arc<dyn CloudProvider>,
    ) -> Self {
        let gate = Arc::new(Semaphore::new(config.concurrent_migrations));
        Self {
            config,
            store,
            analyzer,
            provider,
            plans: Arc::new(RwLock::new(HashMap::new())),
            gate,
        }
    }

    /// Snapshot of the active plans.
    pub async fn active_plans(&self) -> Vec<MigrationPlan> {
        self.plans.read().await.values().cloned().collect()
    }

    /// One planning pass over the fleet. Returns the number of plans added.
    pub async fn plan_pass(&self) -> anyhow::Result<usize> {
        let servers = self.provider.list_servers().await?;

        // Score every server once, then rank the fleet best-first.
        let mut scored: Vec<(Server, f64)> = Vec::with_capacity(servers.len());
        for server in servers {
            let score = self.server_eco_score(&server.id).await;
            scored.push((server, score));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut added = 0;
        for (source, source_score) in &scored {
            if *source_score > UNDERPERFORMING_SCORE {
                continue; // Efficient enough to leave alone.
            }
            if *source_score <= 0.0 {
                // No usable rating; the saving estimate would divide by zero.
                continue;
            }

            let containers = match self.provider.list_containers(&source.id).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(server_id = %source.id, error = %e, "planning: container enumeration failed");
                    continue;
                }
            };

            for container in &containers {
                if self.plans.read().await.contains_key(&container.id) {
                    continue; // One active plan per container.
                }
                if let Some(plan) =
                    build_plan(&self.config, container, source, *source_score, &scored)
                {
                    debug!(
                        container_id = %plan.container_id,
                        source_id = %plan.source_id,
                        target_id = %plan.target_id,
                        priority = plan.priority,
                        saving_watts = plan.power_saving_watts,
                        "migration planned"
                    );
                    self.plans
                        .write()
                        .await
                        .insert(container.id.clone(), plan);
                    added += 1;
                }
            }
        }

        if added > 0 {
            info!(added, "planning pass recorded new migrations");
        }
        Ok(added)
    }

    /// Execute all active plans, highest priority first, under the
    /// concurrency cap. A successful relocation retires its plan; a failed
    /// one leaves it untouched for the next cycle.
    pub async fn execute_pass(&self) -> anyhow::Result<Vec<MigrationOutcome>> {
        let mut queue = self.active_plans().await;
        queue.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut handles = Vec::with_capacity(queue.len());
        for plan in queue {
            let permit = self.gate.clone().acquire_owned().await?;
            let provider = self.provider.clone();
            let registry = self.plans.clone();
            handles.push(tokio::spawn(async move {
                let result = provider
                    .relocate(&plan.container_id, &plan.source_id, &plan.target_id)
                    .await;
                drop(permit);
                match result {
                    Ok(()) => {
                        registry.write().await.remove(&plan.container_id);
                        info!(
                            container_id = %plan.container_id,
                            target_id = %plan.target_id,
                            "migration executed"
                        );
                        MigrationOutcome {
                            container_id: plan.container_id,
                            success: true,
                        }
                    }
                    Err(e) => {
                        warn!(
                            container_id = %plan.container_id,
                            error = %e,
                            "migration failed, plan retained for next cycle"
                        );
                        MigrationOutcome {
                            container_id: plan.container_id,
                            success: false,
                        }
                    }
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await?);
        }
        Ok(outcomes)
    }

    /// Defensive eco score: missing metrics count as 0.
    async fn server_eco_score(&self, server_id: &str) -> f64 {
        match self.store.query(server_id).await {
            Ok(samples) => self.analyzer.eco_score(&samples),
            Err(_) => 0.0,
        }
    }

    /// Run the plan-then-execute loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.planning_interval_secs,
            cap = self.config.concurrent_migrations,
            "migration planner started"
        );
        let interval = Duration::from_secs(self.config.planning_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.plan_pass().await {
                        tracing::error!(error = %e, "planning pass failed");
                        continue;
                    }
                    if let Err(e) = self.execute_pass().await {
                        tracing::error!(error = %e, "execution pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("migration planner shutting down");
                    break;
                }
            }
        }
    }
}

/// Find the best qualifying relocation for one container, or nothing.
///
/// Candidates must beat the minimum power saving and stay within the
/// downtime budget; among qualifiers the maximum saving wins. The saving
/// model estimates the target draw as the container's draw scaled by the
/// target/source score ratio; callers guarantee the source score is
/// positive, so the ratio is always defined.
fn build_plan(
    config: &PlannerConfig,
    container: &Container,
    source: &Server,
    source_score: f64,
    candidates: &[(Server, f64)],
) -> Option<MigrationPlan> {
    let mut best: Option<MigrationPlan> = None;

    for (target, target_score) in candidates {
        if target.id == source.id {
            continue;
        }

        let saving = container.power_watts * (1.0 - target_score / source_score);
        if saving < config.min_power_saving_watts {
            continue;
        }

        let downtime = estimate_downtime(source, target);
        if downtime > config.max_downtime_secs {
            continue;
        }

        if best
            .as_ref()
            .is_none_or(|b| saving > b.power_saving_watts)
        {
            best = Some(MigrationPlan {
                container_id: container.id.clone(),
                source_id: source.id.clone(),
                target_id: target.id.clone(),
                priority: plan_priority(config, saving, downtime),
                power_saving_watts: saving,
                downtime_secs: downtime,
            });
        }
    }

    best
}

/// Structural downtime estimate: fixed base cost plus a cross-region
/// penalty. Not measured.
fn estimate_downtime(source: &Server, target: &Server) -> u64 {
    let mut downtime = BASE_DOWNTIME_SECS;
    if source.region != target.region {
        downtime += CROSS_REGION_PENALTY_SECS;
    }
    downtime
}

/// Priority from saving relative to the qualifying minimum, docked when
/// downtime eats more than half the budget, clamped to 1–10.
fn plan_priority(config: &PlannerConfig, saving: f64, downtime_secs: u64) -> u8 {
    let mut priority = (saving / config.min_power_saving_watts * 10.0).round() as i64;
    if downtime_secs > config.max_downtime_secs / 2 {
        priority -= 2;
    }
    priority.clamp(1, 10) as u8
}
