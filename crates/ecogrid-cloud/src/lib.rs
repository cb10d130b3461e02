//! ecogrid-cloud — boundary contracts to the orchestration layer.
//!
//! The control loops never talk to a vendor SDK directly; they see the
//! [`CloudProvider`] trait: list servers, enumerate a server's containers,
//! relocate a container. Relocation must tolerate at-least-once calls —
//! the planner retries by leaving failed plans in place.
//!
//! [`StaticProvider`] is the in-memory implementation used by standalone
//! runs and by the control-loop tests; real AWS/GCP/Azure bindings plug in
//! behind the same trait.

pub mod error;
pub mod provider;
pub mod static_provider;

pub use error::{CloudError, CloudResult};
pub use provider::{BoxFuture, CloudProvider};
pub use static_provider::{RelocationRecord, StaticProvider};
