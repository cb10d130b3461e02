//! Domain types shared across the EcoGrid subsystems.
//!
//! These represent the observed fleet: servers, the containers running on
//! them, and the raw metric samples the control loops reason over. All types
//! are JSON-serializable for the REST surface and forecast persistence.

use serde::{Deserialize, Serialize};

/// Unique identifier for a server in the fleet.
pub type ServerId = String;

/// Unique identifier for a container.
pub type ContainerId = String;

/// One observation for a server. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub server_id: ServerId,
    /// Unix timestamp (seconds) when the observation was taken.
    pub timestamp: u64,
    /// CPU utilization in percent (0–100).
    pub cpu_pct: f64,
    /// Memory utilization in percent (0–100).
    pub memory_pct: f64,
    /// Power draw in watts.
    pub power_watts: f64,
    /// Carbon footprint in kg CO2 equivalent.
    pub carbon_kg: f64,
}

/// A compute server as reported by the fleet inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub id: ServerId,
    /// Provider tag ("aws", "gcp", "azure", ...).
    pub provider: String,
    pub region: String,
    pub instance_type: String,
}

/// A container running on a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    pub id: ContainerId,
    pub server_id: ServerId,
    pub service_name: String,
    /// Eco tags assigned by the classifier, if any.
    pub eco_tags: Vec<String>,
    /// Power attributed to this container in watts.
    pub power_watts: f64,
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
