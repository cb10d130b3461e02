//! Prometheus text exposition format.
//!
//! Renders the latest sample per server into the Prometheus text
//! exposition format for scraping by a Prometheus server or compatible
//! agent.

use ecogrid_store::Sample;

/// Render the latest per-server samples into Prometheus text format.
///
/// Produces GAUGE metrics with `server_id` labels.
pub fn render_prometheus(latest: &[Sample]) -> String {
    let mut out = String::new();

    // Help + type declarations.
    out.push_str("# HELP server_power_usage_watts Current power usage in watts.\n");
    out.push_str("# TYPE server_power_usage_watts gauge\n");
    for s in latest {
        out.push_str(&format!(
            "server_power_usage_watts{{server_id=\"{}\"}} {:.2}\n",
            s.server_id, s.power_watts
        ));
    }

    out.push_str("# HELP server_carbon_footprint_kg Carbon footprint in kilograms CO2.\n");
    out.push_str("# TYPE server_carbon_footprint_kg gauge\n");
    for s in latest {
        out.push_str(&format!(
            "server_carbon_footprint_kg{{server_id=\"{}\"}} {:.4}\n",
            s.server_id, s.carbon_kg
        ));
    }

    out.push_str("# HELP server_cpu_usage_percent CPU usage percentage.\n");
    out.push_str("# TYPE server_cpu_usage_percent gauge\n");
    for s in latest {
        out.push_str(&format!(
            "server_cpu_usage_percent{{server_id=\"{}\"}} {:.2}\n",
            s.server_id, s.cpu_pct
        ));
    }

    out.push_str("# HELP server_memory_usage_percent Memory usage percentage.\n");
    out.push_str("# TYPE server_memory_usage_percent gauge\n");
    for s in latest {
        out.push_str(&format!(
            "server_memory_usage_percent{{server_id=\"{}\"}} {:.2}\n",
            s.server_id, s.memory_pct
        ));
    }

    out
}
