use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use gossip_sim::{build_app, run_tick, ArchetypeCatalog, CrewRecord, CrewRoster, GossipConfig};

const DEPARTMENTS: [&str; 4] = ["engineering", "medical", "navigation", "security"];

fn crew(size: u32) -> CrewRoster {
    CrewRoster::new((1..=size).map(|id| {
        let mut record = CrewRecord::new(id, format!("crew {id}"))
            .with_department(DEPARTMENTS[(id % 4) as usize])
            .with_relationship(id % size + 1, 0.6)
            .with_relationship((id + 7) % size + 1, -0.5);
        record.stress = (id % 10) as f32 / 10.0;
        record.recent_failures = id % 4;
        record.age = 25 + id % 40;
        record
    }))
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for size in [16u32, 64, 128, 256] {
        group.bench_with_input(BenchmarkId::new("crew", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut app = build_app(GossipConfig::default(), ArchetypeCatalog::builtin());
                    app.insert_resource(crew(size));
                    for _ in 0..20 {
                        run_tick(&mut app);
                    }
                    app
                },
                |mut app| {
                    run_tick(&mut app);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(tick_benches, bench_tick);
criterion_main!(tick_benches);
