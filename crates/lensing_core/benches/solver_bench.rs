use criterion::{criterion_group, criterion_main, Criterion};
use lensing_core::mass_profiles::Isothermal;
use lensing_core::ray_tracing::trace_grid;
use lensing_core::{Coordinate, FlatLambdaCdm, Galaxy, Grid2D, PositionsSolver, SolverConfig, Tracer};
use std::hint::black_box;

fn sie_tracer() -> Tracer {
    let galaxies = vec![
        Galaxy::new(0.5).with_profile(Isothermal::ellipse(Coordinate::origin(), 1.2, 0.8, 45.0)),
        Galaxy::new(1.0),
    ];
    Tracer::from_galaxies(galaxies, &FlatLambdaCdm::planck15()).expect("tracer should build")
}

fn bench_four_image_solve(c: &mut Criterion) {
    let tracer = sie_tracer();
    let mut group = c.benchmark_group("sie_four_images_50x50");
    group.sample_size(20);

    for parallel in [false, true] {
        let config = SolverConfig {
            parallel,
            ..SolverConfig::default()
        };
        let grid = Grid2D::uniform((50, 50), 0.1).expect("grid should build");
        let solver = PositionsSolver::new(grid, config).expect("solver should build");
        let name = if parallel { "parallel" } else { "serial" };
        group.bench_function(name, |b| {
            b.iter(|| {
                let images = solver
                    .solve(&tracer, black_box(Coordinate::new(0.05, 0.05)), 1)
                    .expect("solve should succeed");
                black_box(images.len());
            })
        });
    }

    group.finish();
}

fn bench_trace_grid(c: &mut Criterion) {
    let tracer = sie_tracer();
    let grid = Grid2D::uniform((200, 200), 0.025).expect("grid should build");

    c.bench_function("trace_grid_200x200", |b| {
        b.iter(|| {
            let traced = trace_grid(&tracer, &grid, 1, true).expect("trace should succeed");
            black_box(traced[0]);
        })
    });
}

criterion_group!(benches, bench_four_image_solve, bench_trace_grid);
criterion_main!(benches);
