//! ecogrid-planner — fleet-wide migration planning and execution.
//!
//! Each planning pass ranks the fleet by eco score, generates per-container
//! relocation plans for underperforming servers, and records them in an
//! active-plans registry keyed by container id (at most one plan per
//! container). The execution pass runs plans by priority under a hard
//! concurrency cap; successful plans retire, failed plans stay put and are
//! reconsidered on the next cycle.

pub mod planner;

pub use planner::{MigrationOutcome, MigrationPlan, Planner, PlannerConfig};
