//! The tag rule table.

use ecogrid_store::Sample;

/// Hours (local, 0–23) considered peak load.
const PEAK_HOURS: std::ops::RangeInclusive<u64> = 9..=17;

/// Fraction of peak-hour samples that must show activity for the
/// `peak-hours` tag.
const PEAK_ACTIVITY_RATIO: f64 = 0.8;

/// Static definition of one eco tag. Loaded once at startup.
#[derive(Debug, Clone)]
pub struct EcoTagDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Contribution to the profile score when active, 0–100.
    pub score: f64,
    /// Weight of that contribution.
    pub weight: f64,
    /// Activation threshold; meaning depends on the rule.
    pub threshold: f64,
}

/// Aggregates a rule predicate sees. Computed once per service per pass.
#[derive(Debug, Clone, Copy)]
pub struct TagContext {
    pub eco_score: f64,
    pub avg_power_watts: f64,
    pub avg_carbon_kg: f64,
    /// Whether the service shows sustained activity during peak hours.
    pub peak_hours_active: bool,
}

/// A definition paired with its activation predicate. Rules are evaluated
/// independently; a service may activate any subset, including none.
pub struct TagRule {
    pub def: EcoTagDef,
    pub activates: fn(&EcoTagDef, &TagContext) -> bool,
}

/// The five built-in tags.
pub fn builtin_rules() -> Vec<TagRule> {
    vec![
        TagRule {
            def: EcoTagDef {
                name: "eco-efficient",
                description: "service demonstrates high energy efficiency",
                score: 100.0,
                weight: 1.0,
                threshold: 80.0,
            },
            activates: |def, ctx| ctx.eco_score >= def.threshold,
        },
        TagRule {
            def: EcoTagDef {
                name: "energy-intensive",
                description: "service draws a significant amount of power",
                score: 20.0,
                weight: 1.0,
                threshold: 500.0, // watts
            },
            activates: |def, ctx| ctx.avg_power_watts >= def.threshold,
        },
        TagRule {
            def: EcoTagDef {
                name: "carbon-neutral",
                description: "service has a minimal carbon footprint",
                score: 100.0,
                weight: 1.5,
                threshold: 0.1, // kg CO2
            },
            activates: |def, ctx| ctx.avg_carbon_kg <= def.threshold,
        },
        TagRule {
            def: EcoTagDef {
                name: "optimizable",
                description: "service has room for efficiency gains",
                score: 50.0,
                weight: 0.8,
                threshold: 60.0,
            },
            activates: |def, ctx| ctx.eco_score < def.threshold,
        },
        TagRule {
            def: EcoTagDef {
                name: "peak-hours",
                description: "service is active during peak load hours",
                score: 30.0,
                weight: 0.7,
                threshold: PEAK_ACTIVITY_RATIO,
            },
            activates: |_, ctx| ctx.peak_hours_active,
        },
    ]
}

/// Whether the samples show sustained positive power draw during peak
/// hours: at least [`PEAK_ACTIVITY_RATIO`] of the peak-hour samples must
/// be active. No peak-hour samples means not active.
pub fn peak_hours_active(samples: &[Sample]) -> bool {
    let mut active = 0usize;
    let mut total = 0usize;
    for s in samples {
        let hour = (s.timestamp / 3600) % 24;
        if PEAK_HOURS.contains(&hour) {
            total += 1;
            if s.power_watts > 0.0 {
                active += 1;
            }
        }
    }
    total > 0 && active as f64 / total as f64 >= PEAK_ACTIVITY_RATIO
}
