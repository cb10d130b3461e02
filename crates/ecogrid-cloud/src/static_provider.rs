//! In-memory provider for standalone runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use ecogrid_store::{Container, Server};

use crate::error::{CloudError, CloudResult};
use crate::provider::{BoxFuture, CloudProvider};

/// A completed relocation, recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct RelocationRecord {
    pub container_id: String,
    pub source_id: String,
    pub target_id: String,
}

#[derive(Default)]
struct Fleet {
    servers: Vec<Server>,
    /// server_id → containers placed on it.
    placements: HashMap<String, Vec<Container>>,
    /// Latest power reading per server.
    power: HashMap<String, f64>,
    /// Container ids whose relocation is rigged to fail.
    failing: HashSet<String>,
    relocations: Vec<RelocationRecord>,
}

/// A fixed fleet held in memory. Placement mutates on `relocate`, so the
/// provider behaves like a (very small) orchestrator.
#[derive(Clone, Default)]
pub struct StaticProvider {
    fleet: Arc<RwLock<Fleet>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_server(&self, server: Server) {
        let mut fleet = self.fleet.write().await;
        fleet.placements.entry(server.id.clone()).or_default();
        fleet.servers.push(server);
    }

    pub async fn add_container(&self, container: Container) {
        let mut fleet = self.fleet.write().await;
        fleet
            .placements
            .entry(container.server_id.clone())
            .or_default()
            .push(container);
    }

    pub async fn set_power_usage(&self, server_id: &str, watts: f64) {
        let mut fleet = self.fleet.write().await;
        fleet.power.insert(server_id.to_string(), watts);
    }

    /// Rig relocation of a container to fail until cleared.
    pub async fn fail_relocations_for(&self, container_id: &str) {
        let mut fleet = self.fleet.write().await;
        fleet.failing.insert(container_id.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut fleet = self.fleet.write().await;
        fleet.failing.clear();
    }

    /// Relocations performed so far, in order.
    pub async fn relocations(&self) -> Vec<RelocationRecord> {
        self.fleet.read().await.relocations.clone()
    }
}

impl CloudProvider for StaticProvider {
    fn list_servers(&self) -> BoxFuture<'_, CloudResult<Vec<Server>>> {
        Box::pin(async move { Ok(self.fleet.read().await.servers.clone()) })
    }

    fn list_containers<'a>(
        &'a self,
        server_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<Vec<Container>>> {
        Box::pin(async move {
            let fleet = self.fleet.read().await;
            fleet
                .placements
                .get(server_id)
                .cloned()
                .ok_or_else(|| CloudError::ServerNotFound(server_id.to_string()))
        })
    }

    fn relocate<'a>(
        &'a self,
        container_id: &'a str,
        source_id: &'a str,
        target_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<()>> {
        Box::pin(async move {
            let mut fleet = self.fleet.write().await;

            if fleet.failing.contains(container_id) {
                warn!(%container_id, %source_id, %target_id, "relocation rigged to fail");
                return Err(CloudError::Relocation {
                    container: container_id.to_string(),
                    source_id: source_id.to_string(),
                    target_id: target_id.to_string(),
                    reason: "injected failure".to_string(),
                });
            }

            if !fleet.placements.contains_key(target_id) {
                return Err(CloudError::ServerNotFound(target_id.to_string()));
            }

            // Idempotent: a container already moved off the source is fine.
            let mut container = None;
            if let Some(source) = fleet.placements.get_mut(source_id) {
                if let Some(pos) = source.iter().position(|c| c.id == container_id) {
                    container = Some(source.remove(pos));
                }
            }

            if let Some(mut c) = container
                && let Some(target) = fleet.placements.get_mut(target_id)
            {
                c.server_id = target_id.to_string();
                target.push(c);
            }

            fleet.relocations.push(RelocationRecord {
                container_id: container_id.to_string(),
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
            });
            debug!(%container_id, %source_id, %target_id, "container relocated");
            Ok(())
        })
    }

    fn power_usage<'a>(&'a self, server_id: &'a str) -> BoxFuture<'a, CloudResult<f64>> {
        Box::pin(async move {
            let fleet = self.fleet.read().await;
            fleet
                .power
                .get(server_id)
                .copied()
                .ok_or_else(|| CloudError::ServerNotFound(server_id.to_string()))
        })
    }
}
