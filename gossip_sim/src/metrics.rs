use bevy::prelude::*;
use serde::Serialize;

use crate::{engine::GossipEngine, phase::ABANDONED_PHASE, systems::LatestTickReport};

#[derive(Resource, Default, Debug, Clone, PartialEq, Serialize)]
pub struct GossipMetrics {
    pub tick: u64,
    pub active: usize,
    pub resolved_total: usize,
    pub abandoned_total: usize,
    pub exposures_last_tick: u32,
    /// Believers summed across active instances.
    pub believers_total: usize,
    pub new_instances_last_tick: usize,
}

pub fn collect_metrics(
    engine: Res<GossipEngine>,
    latest: Res<LatestTickReport>,
    mut metrics: ResMut<GossipMetrics>,
) {
    let abandoned_total = engine
        .history()
        .iter()
        .filter(|resolved| resolved.final_phase == ABANDONED_PHASE)
        .count();

    metrics.tick = engine.current_tick();
    metrics.active = engine.active_len();
    metrics.resolved_total = engine.history().len() - abandoned_total;
    metrics.abandoned_total = abandoned_total;
    metrics.exposures_last_tick = latest.0.exposures;
    metrics.believers_total = engine
        .active()
        .map(|instance| instance.believers().len())
        .sum();
    metrics.new_instances_last_tick = latest.0.created.len();
}
