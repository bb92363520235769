use bevy::prelude::*;

use crate::{
    archetype_config::ArchetypeCatalogHandle,
    crew::CrewRoster,
    effects::EffectLedger,
    engine::{GossipEngine, TickReport},
    resources::SimulationTick,
};

/// Report from the most recent engine tick.
#[derive(Resource, Debug, Clone, Default)]
pub struct LatestTickReport(pub TickReport);

/// Run one engine tick against the roster resource.
pub fn advance_gossip_system(
    mut engine: ResMut<GossipEngine>,
    catalog: Res<ArchetypeCatalogHandle>,
    roster: Res<CrewRoster>,
    mut effects: ResMut<EffectLedger>,
    mut tick: ResMut<SimulationTick>,
    mut latest: ResMut<LatestTickReport>,
) {
    let handle = catalog.get();
    if !std::ptr::eq(engine.catalog(), handle.as_ref()) {
        engine.reload_catalog(handle);
    }

    let report = engine.tick(&*roster, &mut *effects);
    tick.0 = report.tick;
    latest.0 = report;
}
