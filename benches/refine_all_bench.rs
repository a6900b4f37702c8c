use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;

use spectral_amr::prelude::*;

fn square(levels: u8) -> ElementArena<2> {
    let layout = DomainLayout::new(vec![[4, 4], [4, 4]])
        .with_initial_levels(0, [levels, levels])
        .expect("valid levels")
        .with_initial_levels(1, [levels, levels])
        .expect("valid levels")
        .connect(0, Direction::upper(0), 1, OrientationMap::aligned())
        .expect("valid connection");
    ElementArena::new(Arc::new(layout), Basis::Legendre, Quadrature::GaussLobatto)
        .expect("initial arena")
}

fn drive_to(extent: usize, level: u8) -> AmrConfig<2> {
    AmrConfig::new(
        vec![
            DriveToTarget::new([extent, extent], [level, level])
                .expect("valid target")
                .into(),
        ],
        Policies::default(),
        HRefinementRules {
            mode: RefinementMode::HAndP,
            basis: Basis::Legendre,
            quadrature: Quadrature::GaussLobatto,
        },
    )
    .expect("valid configuration")
}

fn bench_refine_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("refine_all");

    for &levels in &[2u8, 3u8] {
        let arena = square(levels);

        let p_only = drive_to(5, levels);
        group.bench_with_input(BenchmarkId::new("increase_resolution", levels), &levels, |b, _| {
            b.iter_batched(
                || arena.clone(),
                |mut arena| black_box(arena.refine_all(&p_only).expect("round")),
                BatchSize::LargeInput,
            );
        });

        let split = drive_to(4, levels + 1);
        group.bench_with_input(BenchmarkId::new("split_all", levels), &levels, |b, _| {
            b.iter_batched(
                || arena.clone(),
                |mut arena| black_box(arena.refine_all(&split).expect("round")),
                BatchSize::LargeInput,
            );
        });

        let join = drive_to(4, levels - 1);
        group.bench_with_input(BenchmarkId::new("join_all", levels), &levels, |b, _| {
            b.iter_batched(
                || arena.clone(),
                |mut arena| black_box(arena.refine_all(&join).expect("round")),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_refine_all);
criterion_main!(benches);
