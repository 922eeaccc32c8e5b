use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use pacer::config::{LinearConfig, LogisticConfig};
use pacer::data::Dataset;
use pacer::linear::SelfPacedLinearRegressor;
use pacer::logistic::SelfPacedLogisticRegressor;
use pacer::spld::spld_select;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Noisy line with every tenth row pushed far off it.
fn linear_dataset(rows: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(0x5EED_0001 + rows as u64);
    let mut table = Array2::<f64>::zeros((rows, 2));
    for (i, mut row) in table.rows_mut().into_iter().enumerate() {
        let x: f64 = rng.gen_range(-10.0..10.0);
        let outlier = if i % 10 == 0 { 25.0 } else { 0.0 };
        row[0] = x;
        row[1] = 1.0 + 0.5 * x + rng.gen_range(-0.1..0.1) + outlier;
    }
    Dataset::from_table(table.view()).expect("finite table")
}

fn logistic_dataset(rows: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(0x5EED_0002 + rows as u64);
    let mut table = Array2::<f64>::zeros((rows, 3));
    for mut row in table.rows_mut() {
        let x1: f64 = rng.gen_range(-3.0..3.0);
        let x2: f64 = rng.gen_range(-3.0..3.0);
        row[0] = x1;
        row[1] = x2;
        row[2] = if x1 - x2 + rng.gen_range(-0.5..0.5) > 0.0 { 1.0 } else { 0.0 };
    }
    Dataset::from_table(table.view()).expect("finite table")
}

fn benchmark_curricula(c: &mut Criterion) {
    let sizes = [200_usize, 1_000];

    let mut group = c.benchmark_group("linear_curriculum");
    for &size in &sizes {
        let dataset = linear_dataset(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &dataset, |b, input| {
            b.iter(|| {
                let mut regressor =
                    SelfPacedLinearRegressor::new(input.clone(), LinearConfig::default());
                regressor
                    .randomize_training_testing(0.6, &mut StdRng::seed_from_u64(1))
                    .expect("split");
                black_box(regressor.train().expect("training"));
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("logistic_curriculum");
    group.sample_size(10);
    for &size in &sizes {
        let dataset = logistic_dataset(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &dataset, |b, input| {
            b.iter(|| {
                let mut regressor =
                    SelfPacedLogisticRegressor::new(input.clone(), LogisticConfig::default());
                regressor
                    .randomize_training_testing(0.6, &mut StdRng::seed_from_u64(1))
                    .expect("split");
                black_box(regressor.train().expect("training"));
            });
        });
    }
    group.finish();
}

fn benchmark_spld(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5EED_0003);
    let losses: Vec<f64> = (0..10_000).map(|_| rng.gen_range(0.0..1.0)).collect();
    let groups: Vec<i64> = (0..10_000).map(|_| rng.gen_range(0..50)).collect();

    c.bench_function("spld_select_10k", |b| {
        b.iter(|| {
            let selection = spld_select(black_box(&losses), black_box(&groups), 0.05, 0.2)
                .expect("finite losses");
            black_box(selection);
        });
    });
}

criterion_group!(benches, benchmark_curricula, benchmark_spld);
criterion_main!(benches);
