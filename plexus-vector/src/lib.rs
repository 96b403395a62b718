//! Vector index backends.
//!
//! [`AnnIndex`] is a capability interface, not a class hierarchy: the
//! storage engine's vector registry talks to boxed handles and never cares
//! which backend is behind them. Two in-process backends ship here — an
//! exact [`FlatIndex`] scan and an [`HnswIndex`] graph — and both persist to
//! a sidecar file on request.

mod flat;
mod hnsw;

use std::path::Path;

use plexus_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswOptions};

/// Distance metric for a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    L2,
    Ip,
    Cosine,
}

impl Metric {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Metric::L2),
            "ip" | "dot" => Ok(Metric::Ip),
            "cosine" | "cos" => Ok(Metric::Cosine),
            other => Err(Error::TypeError(format!("unknown metric: {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::Ip => "ip",
            Metric::Cosine => "cosine",
        }
    }

    /// Internal distance, lower is better.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Metric::Ip => -dot(a, b),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }

    /// Maps an internal distance to the user-facing score, higher is better.
    /// L2 folds into `1 / (1 + d)`; ip and cosine report similarity directly.
    pub fn score(self, distance: f32) -> f32 {
        match self {
            Metric::L2 => 1.0 / (1.0 + distance),
            Metric::Ip => -distance,
            Metric::Cosine => 1.0 - distance,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Capability interface every vector backend implements.
pub trait AnnIndex: Send + std::fmt::Debug {
    fn method(&self) -> &'static str;
    fn dim(&self) -> usize;
    fn metric(&self) -> Metric;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idempotent upsert. Rejects vectors whose dimension differs from the
    /// index dimension.
    fn add(&mut self, node_id: u64, vector: &[f32]) -> Result<()>;

    /// Best-effort removal; backends may defer physical cleanup.
    fn remove(&mut self, node_id: u64) -> Result<()>;

    /// Top-k `(node_id, score)` pairs, best first. Equal scores break ties
    /// by ascending node id.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>>;

    /// Raw stored vector, if this backend keeps one.
    fn vector(&self, node_id: u64) -> Option<Vec<f32>>;

    fn persist(&self, path: &Path) -> Result<()>;
}

/// Creates an index handle for `method`, failing loudly when the backend is
/// unknown rather than at search time.
pub fn create_index(
    method: &str,
    dim: usize,
    metric: Metric,
    options: &serde_json::Value,
) -> Result<Box<dyn AnnIndex>> {
    match method {
        "flat" => Ok(Box::new(FlatIndex::new(dim, metric))),
        "hnsw" => {
            let opts = HnswOptions::from_json(options)?;
            Ok(Box::new(HnswIndex::new(dim, metric, opts)))
        }
        other => Err(Error::BackendUnavailable(format!(
            "no vector backend named '{other}' (available: flat, hnsw)"
        ))),
    }
}

/// Loads a previously persisted index of the given method.
pub fn load_index(method: &str, path: &Path) -> Result<Box<dyn AnnIndex>> {
    match method {
        "flat" => Ok(Box::new(FlatIndex::load(path)?)),
        "hnsw" => Ok(Box::new(HnswIndex::load(path)?)),
        other => Err(Error::BackendUnavailable(format!(
            "no vector backend named '{other}'"
        ))),
    }
}

pub(crate) fn check_dim(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::TypeError(format!(
            "dimension mismatch: index expects {expected}, got {}",
            vector.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_parse_aliases() {
        assert_eq!(Metric::parse("L2").unwrap(), Metric::L2);
        assert_eq!(Metric::parse("cos").unwrap(), Metric::Cosine);
        assert!(Metric::parse("hamming").is_err());
    }

    #[test]
    fn l2_score_folds_distance() {
        assert_eq!(Metric::L2.score(0.0), 1.0);
        assert!(Metric::L2.score(3.0) < Metric::L2.score(1.0));
    }

    #[test]
    fn unknown_backend_fails_at_create() {
        let err = create_index("annoy", 4, Metric::L2, &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }
}
