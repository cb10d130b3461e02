//! ecogrid-tags — rule-driven eco profiles for services.
//!
//! Each classification pass derives a [`ServiceEcoProfile`] per service
//! from its server's retained samples: average power, average carbon, and
//! a set of weighted descriptive tags. Tags come from a uniform rule
//! table — each rule is a definition plus a predicate over the computed
//! aggregates — so adding a tag means adding a table entry, not touching
//! the evaluation loop.

pub mod error;
pub mod manager;
pub mod rules;

pub use error::{TagError, TagResult};
pub use manager::{ServiceEcoProfile, TagManager, TagManagerConfig};
pub use rules::{builtin_rules, EcoTagDef, TagContext, TagRule};
