//! Prometheus text exposition format.
//!
//! Renders per-node metrics into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::collections::BTreeMap;

use deskbroker_state::NodeMetrics;

/// Render node metrics and the live assignment count.
///
/// Per-node gauges carry a `server` label.
pub fn render_prometheus(nodes: &BTreeMap<String, NodeMetrics>, assignments: usize) -> String {
    let mut out = String::new();

    out.push_str("# HELP deskbroker_active_sessions Sessions currently assigned to a server.\n");
    out.push_str("# TYPE deskbroker_active_sessions gauge\n");
    for (host, m) in nodes {
        out.push_str(&format!(
            "deskbroker_active_sessions{{server=\"{host}\"}} {}\n",
            m.active_sessions
        ));
    }

    out.push_str("# HELP deskbroker_server_healthy Whether the last health probe succeeded (1/0).\n");
    out.push_str("# TYPE deskbroker_server_healthy gauge\n");
    for (host, m) in nodes {
        out.push_str(&format!(
            "deskbroker_server_healthy{{server=\"{host}\"}} {}\n",
            u8::from(m.healthy)
        ));
    }

    out.push_str("# HELP deskbroker_cpu_usage Last reported CPU usage.\n");
    out.push_str("# TYPE deskbroker_cpu_usage gauge\n");
    for (host, m) in nodes {
        out.push_str(&format!(
            "deskbroker_cpu_usage{{server=\"{host}\"}} {:.2}\n",
            m.cpu_usage
        ));
    }

    out.push_str("# HELP deskbroker_memory_usage Last reported memory usage.\n");
    out.push_str("# TYPE deskbroker_memory_usage gauge\n");
    for (host, m) in nodes {
        out.push_str(&format!(
            "deskbroker_memory_usage{{server=\"{host}\"}} {:.2}\n",
            m.memory_usage
        ));
    }

    out.push_str("# HELP deskbroker_assignments Live user assignments.\n");
    out.push_str("# TYPE deskbroker_assignments gauge\n");
    out.push_str(&format!("deskbroker_assignments {assignments}\n"));

    out
}
