#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use gossip_sim::{ArchetypeCatalog, CrewRecord, CrewRoster, GossipConfig};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_gossip_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test gossip config at {}",
            config_path.display()
        );

        std::env::set_var("GOSSIP_CONFIG_PATH", &config_path);
    });
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Single-archetype catalog with an adjustable initial phase and effect table.
pub fn rumour_catalog(initial_phase: &str, effects: &str) -> anyhow::Result<Arc<ArchetypeCatalog>> {
    let json = format!(
        r#"{{
            "version": 1,
            "archetypes": [{{
                "id": "rumour",
                "name": "Rumour",
                "template": "{{subject}} is being talked about",
                "subject_roles": ["subject"],
                "phase_graph": [
                    {{"phase": "{initial_phase}", "duration": 10, "next": "RESOLVED"}},
                    {{"phase": "RESOLVED"}}
                ],
                "spread_mechanics": {{ "base_spread_chance": 0.7 }},
                "gameplay_effects": {effects}
            }}]
        }}"#
    );
    Ok(Arc::new(ArchetypeCatalog::from_json_str(&json)?))
}

pub fn quiet_config(seed: u64) -> GossipConfig {
    GossipConfig {
        seed,
        triggers_enabled: false,
        ..GossipConfig::default()
    }
}

/// Twelve crew across three departments with a mix of relationships and
/// trigger-prone state.
pub fn busy_crew() -> CrewRoster {
    const DEPARTMENTS: [&str; 3] = ["engineering", "medical", "navigation"];
    CrewRoster::new((1..=12u32).map(|id| {
        let mut record = CrewRecord::new(id, format!("crew {id}"))
            .with_department(DEPARTMENTS[(id % 3) as usize])
            .with_shift(if id % 2 == 0 { "alpha" } else { "beta" })
            .with_relationship(id % 12 + 1, 0.75)
            .with_relationship((id + 5) % 12 + 1, -0.6);
        if id % 4 == 0 {
            record = record.with_trait("gossip");
        }
        if id == 3 {
            record = record.with_role("supervisor");
        }
        record.stress = 0.5 + (id % 5) as f32 / 10.0;
        record.recent_failures = id % 4;
        record.performance_trend = if id % 3 == 0 { -0.3 } else { 0.1 };
        record.age = 30 + id * 3;
        record
    }))
}
