//! Seeded k-means with restarts, used only by `ClusterIndex::fit`.
//!
//! Deliberately hand-rolled rather than pulled from a crate: the spec
//! requires a specific, auditable determinism contract (fixed seed 42, 10
//! restarts, lowest-inertia winner) that's easier to guarantee end-to-end
//! with an explicit small implementation than to coax out of a generic
//! clustering crate's RNG plumbing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct KMeansResult {
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub inertia: f64,
}

/// Fit k-means with `k` clusters, `seed`, and `restarts` independent
/// initializations; returns the lowest-inertia result. `rows` must be
/// non-empty and `k >= 1`.
pub fn fit(rows: &[Vec<f64>], k: usize, seed: u64, restarts: u32) -> KMeansResult {
    assert!(!rows.is_empty());
    assert!(k >= 1);
    let dim = rows[0].len();

    let mut best: Option<KMeansResult> = None;
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..restarts.max(1) {
        let result = run_once(rows, k, dim, &mut rng);
        if best.as_ref().map(|b| result.inertia < b.inertia).unwrap_or(true) {
            best = Some(result);
        }
    }
    best.unwrap()
}

fn run_once(rows: &[Vec<f64>], k: usize, dim: usize, rng: &mut StdRng) -> KMeansResult {
    let n = rows.len();
    let k = k.min(n).max(1);

    // k-means++-style seeding, deterministic given `rng`'s current state.
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    let first = rng.gen_range(0..n);
    centroids.push(rows[first].clone());
    while centroids.len() < k {
        let mut dist_sq: Vec<f64> = Vec::with_capacity(n);
        for row in rows {
            let d = centroids
                .iter()
                .map(|c| sq_dist(row, c))
                .fold(f64::INFINITY, f64::min);
            dist_sq.push(d);
        }
        let total: f64 = dist_sq.iter().sum();
        if total <= 0.0 {
            centroids.push(rows[rng.gen_range(0..n)].clone());
            continue;
        }
        let mut target = rng.gen_range(0.0..total);
        let mut chosen = n - 1;
        for (i, d) in dist_sq.iter().enumerate() {
            if target <= *d {
                chosen = i;
                break;
            }
            target -= d;
        }
        centroids.push(rows[chosen].clone());
    }

    let mut labels = vec![0usize; n];
    const MAX_ITERS: usize = 100;
    for _ in 0..MAX_ITERS {
        let mut changed = false;
        for (i, row) in rows.iter().enumerate() {
            let mut best_c = 0usize;
            let mut best_d = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = sq_dist(row, centroid);
                if d < best_d {
                    best_d = d;
                    best_c = c;
                }
            }
            if labels[i] != best_c {
                labels[i] = best_c;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (row, &label) in rows.iter().zip(labels.iter()) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(row.iter()) {
                *s += v;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            for (centroid_v, sum_v) in centroids[c].iter_mut().zip(sums[c].iter()) {
                *centroid_v = sum_v / counts[c] as f64;
            }
        }

        if !changed {
            break;
        }
    }

    let inertia: f64 = rows
        .iter()
        .zip(labels.iter())
        .map(|(row, &label)| sq_dist(row, &centroids[label]))
        .sum();

    KMeansResult {
        centroids,
        labels,
        inertia,
    }
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
