//! In-process HNSW index.
//!
//! Layered navigable small-world graph: greedy zoom from the top layer,
//! beam search at the base layer. Removal is a soft delete — tombstoned
//! entries still route traffic but never appear in results.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use ordered_float::OrderedFloat;
use plexus_core::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{check_dim, AnnIndex, Metric};

const MAX_LAYERS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswOptions {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswOptions {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 64,
            ef_search: 64,
        }
    }
}

impl HnswOptions {
    pub fn from_json(options: &serde_json::Value) -> Result<Self> {
        let mut out = Self::default();
        if let Some(map) = options.as_object() {
            if let Some(m) = map.get("m") {
                out.m = as_usize(m, "m")?;
            }
            if let Some(ef) = map.get("ef_construction") {
                out.ef_construction = as_usize(ef, "ef_construction")?;
            }
            if let Some(ef) = map.get("ef_search") {
                out.ef_search = as_usize(ef, "ef_search")?;
            }
        }
        if out.m < 2 {
            return Err(Error::TypeError("hnsw option m must be >= 2".to_string()));
        }
        Ok(out)
    }
}

fn as_usize(value: &serde_json::Value, key: &str) -> Result<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| Error::TypeError(format!("hnsw option {key} must be a positive integer")))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HnswIndex {
    dim: usize,
    metric: Metric,
    options: HnswOptions,
    vectors: HashMap<u64, Vec<f32>>,
    /// Adjacency per layer; index 0 is the base layer.
    layers: Vec<HashMap<u64, Vec<u64>>>,
    entry_point: Option<u64>,
    max_layer: u8,
    deleted: HashSet<u64>,
}

impl HnswIndex {
    pub fn new(dim: usize, metric: Metric, options: HnswOptions) -> Self {
        Self {
            dim,
            metric,
            options,
            vectors: HashMap::new(),
            layers: Vec::new(),
            entry_point: None,
            max_layer: 0,
            deleted: HashSet::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Io(format!("corrupt hnsw index at {}: {e}", path.display())))
    }

    fn distance(&self, a: u64, query: &[f32]) -> f32 {
        match self.vectors.get(&a) {
            Some(vec) => self.metric.distance(query, vec),
            None => f32::INFINITY,
        }
    }

    fn neighbors(&self, layer: u8, id: u64) -> &[u64] {
        self.layers
            .get(layer as usize)
            .and_then(|l| l.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn set_neighbors(&mut self, layer: u8, id: u64, neighbors: Vec<u64>) {
        while self.layers.len() <= layer as usize {
            self.layers.push(HashMap::new());
        }
        self.layers[layer as usize].insert(id, neighbors);
    }

    fn random_level(&self) -> u8 {
        let mut rng = rand::thread_rng();
        let ml = 1.0 / (self.options.m as f64).ln();
        let r: f64 = rng.gen();
        ((-r.ln() * ml).floor() as u8).min(MAX_LAYERS)
    }

    /// Beam search inside one layer; returns a min-heap of (distance, id).
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u64],
        ef: usize,
        layer: u8,
    ) -> BinaryHeap<Reverse<(OrderedFloat<f32>, u64)>> {
        let mut visited = HashSet::new();
        let mut candidates = BinaryHeap::new();
        let mut nearest: BinaryHeap<(OrderedFloat<f32>, u64)> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let dist = OrderedFloat(self.distance(ep, query));
                candidates.push(Reverse((dist, ep)));
                nearest.push((dist, ep));
            }
        }

        while let Some(Reverse((dist, current))) = candidates.pop() {
            if let Some(&(furthest, _)) = nearest.peek() {
                if dist > furthest && nearest.len() >= ef {
                    break;
                }
            }

            let neighbor_ids: Vec<u64> = self.neighbors(layer, current).to_vec();
            for n in neighbor_ids {
                if !visited.insert(n) {
                    continue;
                }
                let dist_n = OrderedFloat(self.distance(n, query));
                let admit = nearest.len() < ef
                    || nearest.peek().map(|&(d, _)| dist_n < d).unwrap_or(true);
                if admit {
                    candidates.push(Reverse((dist_n, n)));
                    nearest.push((dist_n, n));
                    if nearest.len() > ef {
                        nearest.pop();
                    }
                }
            }
        }

        nearest.into_iter().map(Reverse).collect()
    }

    /// Greedy descent from `max_layer` down to `stop_layer + 1`.
    fn zoom_down(&self, query: &[f32], mut current: u64, stop_layer: u8) -> u64 {
        let mut current_dist = OrderedFloat(self.distance(current, query));
        let mut layer = self.max_layer;
        while layer > stop_layer {
            let mut changed = true;
            while changed {
                changed = false;
                for &n in self.neighbors(layer, current) {
                    let dist = OrderedFloat(self.distance(n, query));
                    if dist < current_dist {
                        current_dist = dist;
                        current = n;
                        changed = true;
                    }
                }
            }
            layer -= 1;
        }
        current
    }

    fn insert_linked(&mut self, id: u64, vector: &[f32]) {
        let level = self.random_level();

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_layer = level;
            for l in 0..=level {
                self.set_neighbors(l, id, Vec::new());
            }
            return;
        };

        let mut ep_candidates = vec![self.zoom_down(vector, entry, level.min(self.max_layer))];

        let top = level.min(self.max_layer);
        for l in (0..=top).rev() {
            let found = self.search_layer(vector, &ep_candidates, self.options.ef_construction, l);
            let selected: Vec<u64> = {
                let mut heap = found.clone();
                let mut out = Vec::with_capacity(self.options.m);
                while let Some(Reverse((_, n))) = heap.pop() {
                    out.push(n);
                    if out.len() >= self.options.m {
                        break;
                    }
                }
                out
            };

            self.set_neighbors(l, id, selected.clone());
            for n in selected {
                let mut links = self.neighbors(l, n).to_vec();
                if !links.contains(&id) {
                    links.push(id);
                    if links.len() > self.options.m * 2 {
                        links.truncate(self.options.m);
                    }
                    self.set_neighbors(l, n, links);
                }
            }

            ep_candidates = found.into_iter().map(|Reverse((_, n))| n).collect();
        }

        // Layers above the previous maximum start out empty.
        for l in (self.max_layer + 1)..=level {
            self.set_neighbors(l, id, Vec::new());
        }
        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(id);
        }
    }
}

impl AnnIndex for HnswIndex {
    fn method(&self) -> &'static str {
        "hnsw"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn len(&self) -> usize {
        self.vectors.len() - self.deleted.len()
    }

    fn add(&mut self, node_id: u64, vector: &[f32]) -> Result<()> {
        check_dim(self.dim, vector)?;
        if self.vectors.contains_key(&node_id) {
            // Upsert: replace the stored vector in place. The existing links
            // stay valid; they were built for a nearby point and the graph
            // remains navigable.
            self.vectors.insert(node_id, vector.to_vec());
            self.deleted.remove(&node_id);
            return Ok(());
        }
        self.vectors.insert(node_id, vector.to_vec());
        self.insert_linked(node_id, vector);
        Ok(())
    }

    fn remove(&mut self, node_id: u64) -> Result<()> {
        if self.vectors.contains_key(&node_id) {
            self.deleted.insert(node_id);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        check_dim(self.dim, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let start = self.zoom_down(query, entry, 0);
        let ef = self.options.ef_search.max(k);
        let mut found = self.search_layer(query, &[start], ef, 0);

        let mut hits: Vec<(u64, f32)> = Vec::with_capacity(k);
        while let Some(Reverse((dist, id))) = found.pop() {
            if self.deleted.contains(&id) {
                continue;
            }
            hits.push((id, self.metric.score(dist.into_inner())));
            if hits.len() >= k {
                break;
            }
        }
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        Ok(hits)
    }

    fn vector(&self, node_id: u64) -> Option<Vec<f32>> {
        if self.deleted.contains(&node_id) {
            return None;
        }
        self.vectors.get(&node_id).cloned()
    }

    fn persist(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> HnswIndex {
        let mut index = HnswIndex::new(2, Metric::L2, HnswOptions::default());
        for i in 0..50u64 {
            let angle = i as f32 * 0.13;
            index.add(i, &[angle.cos(), angle.sin()]).unwrap();
        }
        index
    }

    #[test]
    fn finds_the_exact_nearest_on_small_data() {
        let index = sample_index();
        let query = [0.13f32.cos(), 0.13f32.sin()];
        let hits = index.search(&query, 3).unwrap();
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn matches_flat_results_on_small_fixture() {
        let index = sample_index();
        let mut flat = crate::FlatIndex::new(2, Metric::L2);
        for i in 0..50u64 {
            flat.add(i, &index.vector(i).unwrap()).unwrap();
        }
        let query = [0.2, 0.9];
        let approx: Vec<u64> = index.search(&query, 5).unwrap().iter().map(|h| h.0).collect();
        let exact: Vec<u64> = flat.search(&query, 5).unwrap().iter().map(|h| h.0).collect();
        let overlap = approx.iter().filter(|id| exact.contains(id)).count();
        assert!(overlap >= 4, "approx {approx:?} vs exact {exact:?}");
    }

    #[test]
    fn removed_entries_never_surface() {
        let mut index = sample_index();
        let query = [1.0, 0.0];
        let top = index.search(&query, 1).unwrap()[0].0;
        index.remove(top).unwrap();
        let hits = index.search(&query, 5).unwrap();
        assert!(hits.iter().all(|h| h.0 != top));
    }

    #[test]
    fn upsert_keeps_one_entry_per_id() {
        let mut index = HnswIndex::new(2, Metric::L2, HnswOptions::default());
        index.add(1, &[0.0, 1.0]).unwrap();
        index.add(1, &[1.0, 0.0]).unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.hnsw");
        let index = sample_index();
        index.persist(&path).unwrap();

        let loaded = HnswIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 50);
        let a = index.search(&[0.5, 0.5], 3).unwrap();
        let b = loaded.search(&[0.5, 0.5], 3).unwrap();
        assert_eq!(a, b);
    }
}
