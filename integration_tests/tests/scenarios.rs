mod common;

use std::collections::BTreeSet;

use gossip_sim::{
    effects::spread_scaling, phase::is_terminal, ArchetypeCatalog, CrewId, CrewRecord,
    CrewRoster, EffectKey, EffectLedger, GossipConfig, GossipEngine, GossipError,
};

#[test]
fn crush_transitions_to_obvious_exactly_at_tick_seven() -> anyhow::Result<()> {
    let crew = CrewRoster::new([
        CrewRecord::new(1, "Mira").with_department("engineering"),
        CrewRecord::new(2, "Tomas").with_department("medical"),
    ]);
    let mut engine = GossipEngine::new(ArchetypeCatalog::builtin(), common::quiet_config(1));
    let mut sink = EffectLedger::default();
    let id = engine.create_gossip("secret_crush", [("subject_a", CrewId(1)), ("subject_b", CrewId(2))])?;

    let mut phases = Vec::new();
    for _ in 0..8 {
        engine.tick(&crew, &mut sink);
        let instance = engine.instance(id).expect("crush stays active");
        phases.push((engine.current_tick(), instance.phase.clone()));
    }
    assert_eq!(phases[5], (6, "CRUSH".to_string()));
    assert_eq!(phases[6], (7, "OBVIOUS".to_string()));
    assert_eq!(phases[7], (8, "OBVIOUS".to_string()));
    Ok(())
}

#[test]
fn exposure_rate_matches_computed_chance() -> anyhow::Result<()> {
    let catalog = common::rumour_catalog("WHISPER", "{}")?;
    let crew = CrewRoster::new([
        CrewRecord::new(1, "Ada")
            .with_department("engineering")
            .with_trait("gossip")
            .with_relationship(2, 0.8),
        CrewRecord::new(2, "Bo").with_department("engineering"),
    ]);

    let trials = 1000u64;
    let mut exposed = 0u64;
    for seed in 0..trials {
        let mut engine = GossipEngine::new(catalog.clone(), common::quiet_config(seed));
        let mut sink = EffectLedger::default();
        let id = engine.create_gossip("rumour", [("subject", CrewId(1))])?;
        let report = engine.tick(&crew, &mut sink);
        let instance = engine.instance(id).expect("rumour stays active");
        assert_eq!(report.exposures as usize, instance.spread_log().len());
        if instance.has_reacted(CrewId(2)) {
            exposed += 1;
        }
    }

    let rate = exposed as f64 / trials as f64;
    assert!((rate - 0.72).abs() < 0.05, "empirical exposure rate {rate}");
    Ok(())
}

#[test]
fn half_penetration_scales_negative_effects() -> anyhow::Result<()> {
    let catalog = common::rumour_catalog("OBVIOUS", r#"{"negative": {"stress": 0.4}}"#)?;
    // different departments and no relationships: no edge, no spread
    let crew = CrewRoster::new([
        CrewRecord::new(1, "Ada").with_department("engineering"),
        CrewRecord::new(2, "Bo").with_department("medical"),
    ]);
    let mut engine = GossipEngine::new(catalog, common::quiet_config(3));
    let mut sink = EffectLedger::default();
    let id = engine.create_gossip("rumour", [("subject", CrewId(1))])?;

    engine.tick(&crew, &mut sink);

    assert_eq!(engine.instance(id).map(|instance| instance.believers().len()), Some(1));
    let stress = sink
        .totals(CrewId(1))
        .and_then(|totals| totals.number(EffectKey::Stress))
        .expect("subject received stress");
    assert!((stress - 0.30).abs() < 1e-6, "stress delta {stress}");
    assert!(sink.totals(CrewId(2)).is_none());
    Ok(())
}

#[test]
fn effect_scaling_floor_and_monotonicity() {
    assert!((spread_scaling(0, 10, 0.5) - 0.5).abs() < 1e-6);
    let samples: Vec<f32> = (0..=10).map(|believers| spread_scaling(believers, 10, 0.5)).collect();
    assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn unknown_archetype_is_rejected_without_side_effects() {
    let mut engine = GossipEngine::new(ArchetypeCatalog::builtin(), common::quiet_config(1));
    let before = engine.gossip_summary();
    let err = engine
        .create_gossip("NOT_A_REAL_ARCHETYPE", [("subject", CrewId(1))])
        .unwrap_err();
    assert!(matches!(err, GossipError::Configuration { .. }));
    assert_eq!(engine.gossip_summary(), before);
    assert_eq!(engine.active_len(), 0);
}

#[test]
fn invariants_hold_at_every_tick_boundary() {
    let crew = common::busy_crew();
    let config = GossipConfig {
        seed: 99,
        ..GossipConfig::default()
    };
    let catalog = ArchetypeCatalog::builtin();
    let mut engine = GossipEngine::new(catalog.clone(), config);
    let mut sink = EffectLedger::default();
    let mut seen_transitions = 0;

    for _ in 0..250 {
        let report = engine.tick(&crew, &mut sink);
        seen_transitions += report.transitions;

        let mut keys = BTreeSet::new();
        for instance in engine.active() {
            let archetype = catalog
                .archetype(&instance.archetype_id)
                .expect("active instance archetype resolves");
            assert!(
                archetype.has_phase(&instance.phase),
                "{} is not a phase of {}",
                instance.phase,
                archetype.id
            );
            assert!(!is_terminal(&instance.phase), "terminal {} left active", instance.id);
            assert!(instance.believers().is_disjoint(instance.deniers()));
            assert!(
                keys.insert((instance.archetype_id.clone(), instance.primary_subject)),
                "duplicate active instance for {}",
                instance.primary_subject
            );
            let duration = archetype
                .phase(&instance.phase)
                .map(|entry| entry.duration)
                .unwrap_or_default();
            assert!(instance.phase_elapsed_ticks < duration);
        }
        assert!(engine.active_len() <= engine.config().max_active_instances);
    }

    assert!(seen_transitions > 0);
    assert!(engine
        .history()
        .iter()
        .all(|resolved| is_terminal(&resolved.final_phase)));
}

#[test]
fn summary_serializes_for_display() -> anyhow::Result<()> {
    let crew = CrewRoster::new([
        CrewRecord::new(1, "Mira").with_department("engineering"),
        CrewRecord::new(2, "Tomas").with_department("engineering"),
    ]);
    let mut engine = GossipEngine::new(ArchetypeCatalog::builtin(), common::quiet_config(5));
    let mut sink = EffectLedger::default();
    engine.create_gossip("secret_crush", [("subject_a", CrewId(1)), ("subject_b", CrewId(2))])?;
    engine.tick(&crew, &mut sink);

    let value = serde_json::to_value(engine.gossip_summary())?;
    let entry = &value[0];
    assert_eq!(entry["id"], 1);
    assert_eq!(entry["archetype_name"], "Secret Crush");
    assert_eq!(entry["phase"], "CRUSH");
    assert_eq!(entry["subjects"]["subject_a"], 1);
    assert!(entry["narrative"].as_str().unwrap_or_default().starts_with("Mira has a crush on Tomas"));
    Ok(())
}
