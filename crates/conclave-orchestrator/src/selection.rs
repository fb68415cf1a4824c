//! Capability- and load-aware agent selection.

use crate::registry::AgentRegistry;
use crate::tracker::AgentTracker;
use conclave_core::{AgentId, Capability};
use std::collections::HashSet;
use tracing::debug;

/// Tunable knobs for the selection pass.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Agents at or above this load are not eligible.
    pub load_ceiling: f64,
    /// Maximum number of agents returned by one selection.
    pub max_selected: usize,
    /// Weight of the performance score in the ranking.
    pub performance_weight: f64,
    /// Weight of idleness (`1 - load`) in the ranking.
    pub idle_weight: f64,
    /// Weight of the trust score in the ranking.
    pub trust_weight: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            load_ceiling: 0.8,
            max_selected: 4,
            performance_weight: 0.4,
            idle_weight: 0.3,
            trust_weight: 0.3,
        }
    }
}

/// Picks agents for a collaboration.
///
/// Eligible agents are available, below the load ceiling, and declare every
/// required capability. Eligible agents are ranked by a weighted score and
/// the top `max_selected` are returned, registration order breaking ties.
/// An empty result is the normal "no eligible agent" outcome, not an error.
pub async fn select(
    registry: &AgentRegistry,
    tracker: &AgentTracker,
    required: &HashSet<Capability>,
    config: &SelectionConfig,
) -> Vec<AgentId> {
    let mut scored: Vec<(AgentId, f64)> = Vec::new();

    for &id in registry.ids() {
        let Some(descriptor) = registry.descriptor(id) else {
            continue;
        };
        if !required.iter().all(|cap| descriptor.has_capability(*cap)) {
            continue;
        }
        let Some(snap) = tracker.snapshot(id).await else {
            continue;
        };
        if !snap.available || snap.current_load >= config.load_ceiling {
            debug!(agent = %id, load = snap.current_load, "Skipping overloaded or unavailable agent");
            continue;
        }
        let score = config.performance_weight * snap.performance_score
            + config.idle_weight * (1.0 - snap.current_load)
            + config.trust_weight * snap.trust_score;
        scored.push((id, score));
    }

    // Stable sort keeps registration order among equal scores.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(config.max_selected);

    let selected: Vec<AgentId> = scored.iter().map(|(id, _)| *id).collect();
    debug!(?selected, "Selection complete");
    selected
}
