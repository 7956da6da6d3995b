//! Least-loaded node selection.
//!
//! Candidates must be healthy and below capacity. Among those, the node
//! with the smallest `active_sessions / capacity` wins; equal ratios go to
//! the node that appears first in the registry. Ratios are compared by
//! cross-multiplication so that e.g. 1/2 and 2/4 tie exactly.

use deskbroker_core::{Node, NodeRegistry};
use deskbroker_state::NodeHealthTracker;

/// Pick the least-loaded eligible node, or `None` if every node is
/// unhealthy or full.
pub fn select_node<'a>(registry: &'a NodeRegistry, tracker: &NodeHealthTracker) -> Option<&'a Node> {
    let mut best: Option<(&Node, u64)> = None;

    for node in registry.nodes() {
        let Some(metrics) = tracker.get(&node.host) else {
            continue;
        };

        // Skip unhealthy nodes.
        if !metrics.healthy {
            continue;
        }

        // Skip nodes at capacity.
        let active = metrics.active_sessions;
        if active >= u64::from(node.capacity) {
            continue;
        }

        // Strictly lighter only, so the earlier node keeps a tie.
        let lighter = match best {
            None => true,
            Some((current, current_active)) => {
                lower_ratio((active, node.capacity), (current_active, current.capacity))
            }
        };
        if lighter {
            best = Some((node, active));
        }
    }

    best.map(|(node, _)| node)
}

/// `a.0 / a.1 < b.0 / b.1` without floating point.
fn lower_ratio(a: (u64, u32), b: (u64, u32)) -> bool {
    u128::from(a.0) * u128::from(b.1) < u128::from(b.0) * u128::from(a.1)
}
