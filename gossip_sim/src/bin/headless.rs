use serde::Serialize;
use tracing::{info, warn};

use gossip_sim::{
    build_headless_app, run_tick, CrewRecord, CrewRoster, GossipEngine, GossipMetrics,
    GossipSummary,
};

const DEFAULT_TICKS: u64 = 60;

#[derive(Serialize)]
struct RunSummary {
    metrics: GossipMetrics,
    active: Vec<GossipSummary>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ticks = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u64>().unwrap_or_else(|err| {
            warn!(
                target: "gossip_sim::headless",
                %arg,
                error = %err,
                "ticks.invalid=using_default"
            );
            DEFAULT_TICKS
        }),
        None => DEFAULT_TICKS,
    };

    let mut app = build_headless_app();
    app.insert_resource(demo_crew());
    info!(target: "gossip_sim::headless", ticks, "gossip headless run starting");

    for _ in 0..ticks {
        run_tick(&mut app);
    }

    let summary = RunSummary {
        metrics: app.world.resource::<GossipMetrics>().clone(),
        active: app.world.resource::<GossipEngine>().gossip_summary(),
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(target: "gossip_sim::headless", error = %err, "summary.encode_failed"),
    }
}

fn demo_crew() -> CrewRoster {
    let mut veteran = CrewRecord::new(1, "Hal Okafor")
        .with_department("engineering")
        .with_shift("alpha")
        .with_role("supervisor")
        .with_relationship(2, 0.6)
        .with_relationship(3, -0.5);
    veteran.age = 61;
    veteran.performance_trend = -0.3;

    let mut overworked = CrewRecord::new(2, "Mira Sato")
        .with_department("engineering")
        .with_shift("alpha")
        .with_trait("gossip")
        .with_relationship(4, 0.8)
        .with_relationship(1, 0.6);
    overworked.stress = 0.85;
    overworked.recent_failures = 3;

    let mut careless = CrewRecord::new(3, "Dov Brandt")
        .with_department("engineering")
        .with_shift("beta")
        .with_relationship(1, -0.5)
        .with_relationship(5, 0.3);
    careless.recent_failures = 2;
    careless.performance_trend = -0.4;
    careless.stress = 0.65;

    let smitten = CrewRecord::new(4, "Tomas Vey")
        .with_department("medical")
        .with_shift("alpha")
        .with_role("medic")
        .with_relationship(2, 0.9)
        .with_relationship(6, 0.5);

    let quiet = CrewRecord::new(5, "Ines Park")
        .with_department("navigation")
        .with_shift("beta")
        .with_trait("discrete")
        .with_relationship(3, 0.45);

    let chatter = CrewRecord::new(6, "Ruth Calder")
        .with_department("medical")
        .with_shift("beta")
        .with_trait("gossip")
        .with_relationship(4, 0.5)
        .with_relationship(7, 0.7);

    let pilot = CrewRecord::new(7, "Sami Noor")
        .with_department("navigation")
        .with_shift("alpha")
        .with_relationship(6, 0.7)
        .with_relationship(8, -0.4);

    let mut inspector = CrewRecord::new(8, "Lena Fisk")
        .with_department("navigation")
        .with_shift("gamma")
        .with_role("inspector")
        .with_relationship(7, -0.4);
    inspector.stress = 0.7;

    CrewRoster::new([
        veteran, overworked, careless, smitten, quiet, chatter, pilot, inspector,
    ])
}
