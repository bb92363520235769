//! Gossip propagation and lifecycle engine for a simulated ship's crew.
//!
//! Rumours are instantiated from a data-driven archetype catalog, walk a
//! per-archetype phase graph, diffuse across the crew's social network and
//! feed stat effects back to the crew simulation. [`GossipEngine`] owns all
//! of the mutable state; [`build_headless_app`] wires it into a Bevy schedule.

pub mod archetype_config;
pub mod crew;
pub mod effects;
pub mod engine;
pub mod hashing;
pub mod instance;
pub mod metrics;
pub mod narrative;
pub mod phase;
mod resources;
pub mod social;
pub mod spread;
mod systems;
pub mod triggers;

use std::sync::Arc;

use bevy::prelude::*;

pub use archetype_config::{
    load_gossip_archetypes_from_env, Archetype, ArchetypeCatalog, ArchetypeCatalogError,
    ArchetypeCatalogHandle, ArchetypeCatalogMetadata,
};
pub use crew::{CrewId, CrewRecord, CrewRepository, CrewRoster};
pub use effects::{EffectBucket, EffectKey, EffectLedger, EffectMap, EffectSink, EffectValue};
pub use engine::{GossipEngine, GossipError, GossipSummary, TickReport};
pub use instance::{GossipId, GossipInstance, ResolvedGossip, SpreadEvent};
pub use metrics::GossipMetrics;
pub use narrative::{narrator_for, NarrativeClient, NarrativeError, Narrator, TemplateNarrator};
pub use resources::{
    load_gossip_config_from_env, GossipConfig, GossipConfigError, GossipConfigMetadata,
    SimulationTick,
};
pub use systems::{advance_gossip_system, LatestTickReport};

/// Construct a Bevy [`App`] with config and catalog loaded from the
/// environment (or the builtin defaults) and an empty crew roster.
pub fn build_headless_app() -> App {
    let (config, config_metadata) = load_gossip_config_from_env();
    let (catalog, catalog_metadata) = load_gossip_archetypes_from_env();

    let mut app = build_app(config.as_ref().clone(), catalog);
    app.insert_resource(config_metadata)
        .insert_resource(catalog_metadata);
    app
}

/// Construct a Bevy [`App`] around an explicit config and catalog.
pub fn build_app(config: GossipConfig, catalog: Arc<ArchetypeCatalog>) -> App {
    let mut app = App::new();

    let engine = GossipEngine::new(Arc::clone(&catalog), config.clone());

    app.insert_resource(config)
        .insert_resource(ArchetypeCatalogHandle::new(catalog))
        .insert_resource(engine)
        .insert_resource(CrewRoster::default())
        .insert_resource(EffectLedger::default())
        .insert_resource(SimulationTick::default())
        .insert_resource(LatestTickReport::default())
        .insert_resource(GossipMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (advance_gossip_system, metrics::collect_metrics).chain(),
        );

    app
}

/// Execute a single gossip tick.
///
/// Each call runs the chained systems configured in [`build_app`]
/// (engine tick → metrics).
pub fn run_tick(app: &mut App) {
    app.update();
}
