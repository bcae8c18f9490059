//! Criterion benchmarks for the brute-force search kernel.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::SmallRng};

use ringknn_core::{Matrix, knn_search};

fn random_matrix(rng: &mut SmallRng, rows: usize, cols: usize) -> Matrix {
    let cells: Vec<f64> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Matrix::from_vec(rows, cols, cells).expect("shape matches")
}

fn bench_knn_search(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let mut group = c.benchmark_group("knn_search");

    for &(rows, cols, k) in &[(1_000, 16, 8), (1_000, 64, 8), (4_000, 16, 32)] {
        let data = random_matrix(&mut rng, rows, cols);
        let queries = random_matrix(&mut rng, 128, cols);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{rows}x{cols}/k{k}")),
            &(data, queries),
            |b, (data, queries)| {
                b.iter(|| knn_search(data, queries, k).expect("arguments are valid"));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_knn_search);
criterion_main!(benches);
