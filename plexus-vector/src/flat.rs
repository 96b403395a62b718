//! Exact scan index. Slow and always right; also the reranking oracle.

use std::collections::BTreeMap;
use std::path::Path;

use plexus_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::{check_dim, AnnIndex, Metric};

#[derive(Debug, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    metric: Metric,
    entries: BTreeMap<u64, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            entries: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Io(format!("corrupt flat index at {}: {e}", path.display())))
    }
}

impl AnnIndex for FlatIndex {
    fn method(&self) -> &'static str {
        "flat"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, node_id: u64, vector: &[f32]) -> Result<()> {
        check_dim(self.dim, vector)?;
        self.entries.insert(node_id, vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, node_id: u64) -> Result<()> {
        self.entries.remove(&node_id);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        check_dim(self.dim, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(u64, f32)> = self
            .entries
            .iter()
            .map(|(id, vec)| (*id, self.metric.score(self.metric.distance(query, vec))))
            .collect();
        // Best first; equal scores break ties by ascending id.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn vector(&self, node_id: u64) -> Option<Vec<f32>> {
        self.entries.get(&node_id).cloned()
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

    #[test]
    fn returns_true_nearest_under_l2() {
        let mut index = FlatIndex::new(3, Metric::L2);
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0]).unwrap();
        index.add(3, &[0.0, 0.0, 1.0]).unwrap();

        let hits = index.search(&[0.9, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 2);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn upsert_replaces_previous_vector() {
        let mut index = FlatIndex::new(2, Metric::L2);
        index.add(7, &[0.0, 1.0]).unwrap();
        index.add(7, &[1.0, 0.0]).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, 7);
        assert_eq!(hits[0].1, 1.0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = FlatIndex::new(3, Metric::Cosine);
        assert!(matches!(
            index.add(1, &[1.0, 2.0]),
            Err(Error::TypeError(_))
        ));
    }

    #[test]
    fn equal_scores_break_ties_by_id() {
        let mut index = FlatIndex::new(2, Metric::L2);
        index.add(9, &[1.0, 0.0]).unwrap();
        index.add(4, &[0.0, 1.0]).unwrap();
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, 4);
        assert_eq!(hits[1].0, 9);
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.flat");

        let mut index = FlatIndex::new(2, Metric::Ip);
        index.add(1, &[0.5, 0.5]).unwrap();
        index.persist(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.vector(1), Some(vec![0.5, 0.5]));
    }
}
