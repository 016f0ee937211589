use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shoebox_cluster::{ClusterConfig, Clusterer, Method};

fn random_unit_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32) - 0.5);
    }
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let s = (1.0 / norm) as f32;
        for x in &mut v {
            *x *= s;
        }
    }
    v
}

fn make_blob(centroid: &[f32], n: usize, noise: f32, base_seed: u64) -> Vec<Vec<f32>> {
    let dim = centroid.len();
    (0..n)
        .map(|i| {
            let rvec = random_unit_vec(dim, base_seed.wrapping_add(i as u64 * 997));
            centroid
                .iter()
                .zip(&rvec)
                .map(|(c, r)| c + r * noise)
                .collect()
        })
        .collect()
}

fn dataset(dim: usize, per_blob: usize) -> Vec<Vec<f32>> {
    let mut points = Vec::new();
    for b in 0..4u64 {
        let center = random_unit_vec(dim, b + 1);
        points.extend(make_blob(&center, per_blob, 0.05, b * 1000 + 7));
    }
    points
}

fn bench_hdbscan(c: &mut Criterion) {
    let points = dataset(512, 25);
    let clusterer = Clusterer::new(ClusterConfig::default());

    c.bench_function("hdbscan_100x512", |b| {
        b.iter(|| black_box(clusterer.cluster(black_box(&points))))
    });
}

fn bench_kmeans(c: &mut Criterion) {
    let points = dataset(512, 25);
    let clusterer = Clusterer::new(ClusterConfig {
        method: Method::Kmeans,
        n_clusters: 4,
        ..ClusterConfig::default()
    });

    c.bench_function("kmeans_100x512", |b| {
        b.iter(|| black_box(clusterer.cluster(black_box(&points))))
    });
}

criterion_group!(benches, bench_hdbscan, bench_kmeans);
criterion_main!(benches);
