//! ecogrid-autoscale — threshold-driven scaling decisions.
//!
//! On a fixed tick the autoscaler looks at the single most recent sample
//! of every tracked server. Overloaded servers (cpu or power above the
//! high thresholds) are evacuated to the fleet's most eco-efficient
//! target; underused servers (cpu below the low threshold) are
//! consolidated the same way, unless their own eco score says they are
//! already worth keeping. Both directions are gated by independent,
//! fleet-global cooldowns.

pub mod scaler;

pub use scaler::{Autoscaler, AutoscalerConfig, ScaleAction, ScaleOutcome};
