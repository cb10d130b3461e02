//! The provider trait the control loops are written against.

use ecogrid_store::{Container, Server};

use crate::error::CloudResult;

/// Boxed future type for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Contract to the orchestration/provider layer.
///
/// Implementations must be safe to call concurrently from the autoscaler
/// and the planner. `relocate` carries at-least-once semantics: repeating
/// a call for the same container must not corrupt placement.
pub trait CloudProvider: Send + Sync {
    /// Enumerate every server in the fleet.
    fn list_servers(&self) -> BoxFuture<'_, CloudResult<Vec<Server>>>;

    /// Enumerate the containers currently running on a server.
    fn list_containers<'a>(
        &'a self,
        server_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<Vec<Container>>>;

    /// Move a container from `source_id` to `target_id`.
    fn relocate<'a>(
        &'a self,
        container_id: &'a str,
        source_id: &'a str,
        target_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<()>>;

    /// Most recent power draw reading for a server, in watts.
    fn power_usage<'a>(&'a self, server_id: &'a str) -> BoxFuture<'a, CloudResult<f64>>;
}
