//! Coarse IVF partitioning for large stores.
//!
//! Centroids are seeded from evenly spaced entries in id order and refined
//! with a few Lloyd rounds, so the same entry set always yields the same
//! partitioning and searches stay deterministic.

use std::collections::BTreeMap;

use docshelf_core::types::Metric;

const LLOYD_ROUNDS: usize = 4;

pub struct IvfIndex {
    metric: Metric,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<u64>>,
}

impl IvfIndex {
    pub fn build(entries: &BTreeMap<u64, Vec<f32>>, metric: Metric) -> Self {
        let n = entries.len();
        let nlist = ((n as f64).sqrt().ceil() as usize).max(1);
        let ids: Vec<u64> = entries.keys().copied().collect();
        let vectors: Vec<&Vec<f32>> = entries.values().collect();

        // Evenly spaced seeds in id order.
        let step = (n / nlist).max(1);
        let mut centroids: Vec<Vec<f32>> =
            (0..nlist).map(|i| vectors[(i * step).min(n - 1)].clone()).collect();

        let mut assignment = vec![0usize; n];
        for _ in 0..LLOYD_ROUNDS {
            for (i, vector) in vectors.iter().enumerate() {
                assignment[i] = nearest_centroid(&centroids, vector, metric);
            }
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&Vec<f32>> = vectors
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| assignment[*i] == c)
                    .map(|(_, v)| *v)
                    .collect();
                // An empty cluster keeps its previous centroid.
                if let Some(mean) = mean_of(&members) {
                    *centroid = mean;
                }
            }
        }

        let mut lists = vec![Vec::new(); nlist];
        for (i, vector) in vectors.iter().enumerate() {
            lists[nearest_centroid(&centroids, vector, metric)].push(ids[i]);
        }
        Self { metric, centroids, lists }
    }

    /// Ids in the `nprobe` lists whose centroids sit closest to the query.
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Vec<u64> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, distance(self.metric, c, query)))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });
        ranked
            .into_iter()
            .take(nprobe.max(1))
            .flat_map(|(i, _)| self.lists[i].iter().copied())
            .collect()
    }

    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], vector: &[f32], metric: Metric) -> usize {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let d = distance(metric, centroid, vector);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

fn mean_of(members: &[&Vec<f32>]) -> Option<Vec<f32>> {
    let first = members.first()?;
    let mut mean = vec![0.0f32; first.len()];
    for member in members {
        for (m, value) in mean.iter_mut().zip(member.iter()) {
            *m += value;
        }
    }
    let count = members.len() as f32;
    for m in &mut mean {
        *m /= count;
    }
    Some(mean)
}

pub(crate) fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        // Entries are L2-normalized on insert, so the dot product is the
        // cosine similarity.
        Metric::Cosine => 1.0 - dot(a, b),
        Metric::L2 => a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum(),
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
