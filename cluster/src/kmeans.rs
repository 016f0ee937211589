//! Mini-batch k-means with a fixed target cluster count.
//!
//! Centers are refined on random mini-batches with per-center learning
//! rates, then every point receives a final full assignment pass. Unlike
//! the density strategy there is no noise: each point belongs to exactly
//! one cluster. Centers that end up with no members after the final pass
//! are dropped and the labels compacted, so `centroids[l]` always matches
//! label `l`.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

const MAX_ITERS: usize = 100;
const SHIFT_TOL: f32 = 1e-6;

pub(crate) fn minibatch_kmeans(
    points: &[Vec<f32>],
    n_clusters: usize,
    batch_size: usize,
    seed: u64,
) -> (Vec<i32>, Vec<Vec<f32>>) {
    let n = points.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }

    let k = n_clusters.clamp(1, n);
    let dim = points[0].len();
    let mut rng = StdRng::seed_from_u64(seed);

    // Initialize centers from k distinct points.
    let mut centers: Vec<Vec<f32>> = sample(&mut rng, n, k)
        .into_iter()
        .map(|i| points[i].clone())
        .collect();
    let mut counts = vec![0usize; k];

    let batch = batch_size.min(n).max(1);
    for _ in 0..MAX_ITERS {
        let mut max_shift = 0.0f32;

        for _ in 0..batch {
            let p = &points[rng.gen_range(0..n)];
            let c = nearest(p, &centers);
            counts[c] += 1;

            // Per-center learning rate 1/count moves each center toward the
            // running mean of the points assigned to it.
            let eta = 1.0 / counts[c] as f32;
            let mut shift = 0.0f32;
            for d in 0..dim {
                let step = eta * (p[d] - centers[c][d]);
                centers[c][d] += step;
                shift += step * step;
            }
            max_shift = max_shift.max(shift);
        }

        if max_shift < SHIFT_TOL {
            break;
        }
    }

    // Full assignment pass.
    let raw: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();

    // Drop empty centers; relabel so label l always indexes centroids[l].
    let mut members = vec![0usize; k];
    for &c in &raw {
        members[c] += 1;
    }
    let mut remap = vec![-1i32; k];
    let mut kept: Vec<Vec<f32>> = Vec::new();
    for (c, center) in centers.into_iter().enumerate() {
        if members[c] > 0 {
            remap[c] = kept.len() as i32;
            kept.push(center);
        }
    }

    let labels = raw.into_iter().map(|c| remap[c]).collect();
    (labels, kept)
}

/// Index of the closest center by squared Euclidean distance; ties resolve
/// to the lowest index.
fn nearest(point: &[f32], centers: &[Vec<f32>]) -> usize {
    let mut best = 0usize;
    let mut best_d = f32::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d: f32 = point
            .iter()
            .zip(center)
            .map(|(a, b)| {
                let diff = a - b;
                diff * diff
            })
            .sum();
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let (labels, centers) = minibatch_kmeans(&[], 4, 64, 42);
        assert!(labels.is_empty());
        assert!(centers.is_empty());
    }

    #[test]
    fn separates_two_obvious_groups() {
        let mut points: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32 * 0.01, 0.0]).collect();
        points.extend((0..6).map(|i| vec![20.0 + i as f32 * 0.01, 0.0]));

        let (labels, centers) = minibatch_kmeans(&points, 2, 64, 42);

        assert_eq!(centers.len(), 2);
        assert!(labels[..6].iter().all(|&l| l == labels[0]));
        assert!(labels[6..].iter().all(|&l| l == labels[6]));
        assert_ne!(labels[0], labels[6]);
    }

    #[test]
    fn k_clamped_to_point_count() {
        let points = vec![vec![0.0], vec![5.0], vec![10.0]];
        let (labels, centers) = minibatch_kmeans(&points, 10, 64, 42);
        assert!(centers.len() <= 3);
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let points: Vec<Vec<f32>> = (0..20)
            .map(|i| vec![(i % 4) as f32 * 5.0, (i / 4) as f32])
            .collect();

        let (l1, c1) = minibatch_kmeans(&points, 3, 8, 7);
        let (l2, c2) = minibatch_kmeans(&points, 3, 8, 7);

        assert_eq!(l1, l2);
        assert_eq!(c1, c2);
    }

    #[test]
    fn every_label_has_a_centroid() {
        let points: Vec<Vec<f32>> = (0..15).map(|i| vec![i as f32, (i * i) as f32]).collect();
        let (labels, centers) = minibatch_kmeans(&points, 5, 4, 42);

        for &l in &labels {
            assert!(l >= 0);
            assert!((l as usize) < centers.len(), "label {l} has no centroid");
        }
        // Every centroid has at least one member.
        for c in 0..centers.len() as i32 {
            assert!(labels.contains(&c), "centroid {c} is empty");
        }
    }

    #[test]
    fn identical_points_single_cluster_behavior() {
        let points = vec![vec![2.0, 2.0]; 5];
        let (labels, centers) = minibatch_kmeans(&points, 3, 4, 42);

        // All points coincide, so they all land on one center.
        assert!(labels.iter().all(|&l| l == labels[0]));
        assert_eq!(centers.len(), 1);
        assert!((centers[0][0] - 2.0).abs() < 1e-6);
    }
}
