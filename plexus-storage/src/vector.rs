//! Vector index registry and semantic search.
//!
//! Descriptors live in `vector_indexes`; per-node raw vectors live in
//! `vector_entries` unless the index opts out with `store_vectors=false`.
//! ANN handles are process-local and rebuilt lazily from the entries (or a
//! sidecar file) on first use after reopen, so a crash can never leave the
//! relational state and the ANN state permanently out of sync.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use rusqlite::params;
use rusqlite::Connection;

use plexus_core::{is_valid_symbol, Error, IndexDescriptor, IndexKind, Node, NodeId, Result, Value};
use plexus_vector::{AnnIndex, Metric};

use crate::{sql_err, GraphStore};

/// Bound on repeat-pull expansion when structural filters reject candidates.
const FILTER_EXPANSION_CAP: usize = 4;

#[derive(Debug, Clone)]
pub struct VectorIndexMeta {
    pub name: String,
    pub dim: usize,
    pub metric: Metric,
    pub method: String,
    /// Keep raw vectors in `vector_entries` so the index can rebuild and
    /// rerank. On by default.
    pub store_vectors: bool,
    /// Sidecar file for serialized ANN state, if requested.
    pub index_path: Option<PathBuf>,
    pub options: serde_json::Value,
}

impl VectorIndexMeta {
    fn from_row(name: String, dim: usize, metric: &str, method: String, options: &str) -> Result<Self> {
        let options: serde_json::Value = serde_json::from_str(options)?;
        let store_vectors = options
            .get("store_vectors")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let index_path = options
            .get("index_path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from);
        Ok(Self {
            name,
            dim,
            metric: Metric::parse(metric)?,
            method,
            store_vectors,
            index_path,
            options,
        })
    }
}

#[derive(Default)]
pub(crate) struct VectorRegistry {
    metas: HashMap<String, VectorIndexMeta>,
    handles: HashMap<String, Box<dyn AnnIndex>>,
    dirty: HashSet<String>,
}

impl VectorRegistry {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn
            .prepare("SELECT name, dim, metric, method, options FROM vector_indexes")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(sql_err)?;
        let mut metas = HashMap::new();
        for row in rows {
            let (name, dim, metric, method, options) = row.map_err(sql_err)?;
            let meta = VectorIndexMeta::from_row(name.clone(), dim as usize, &metric, method, &options)?;
            metas.insert(name, meta);
        }
        Ok(Self {
            metas,
            handles: HashMap::new(),
            dirty: HashSet::new(),
        })
    }
}

/// Structural filter applied to ANN candidates.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.properties.is_empty()
    }

    fn admits(&self, node: &Node) -> bool {
        self.labels.iter().all(|l| node.has_label(l))
            && self
                .properties
                .iter()
                .all(|(k, v)| node.properties.get(k) == Some(v))
    }
}

#[derive(Debug, Clone)]
pub struct SemanticSearchOptions {
    pub filter: SearchFilter,
    /// Recompute exact distances over stored raw vectors and re-sort.
    pub rerank: bool,
    /// Over-fetch factor before filtering; at least 1.
    pub candidate_multiplier: usize,
}

impl Default for SemanticSearchOptions {
    fn default() -> Self {
        Self {
            filter: SearchFilter::default(),
            rerank: false,
            candidate_multiplier: 1,
        }
    }
}

impl GraphStore {
    pub fn create_vector_index(
        &mut self,
        name: &str,
        dim: usize,
        metric: &str,
        method: &str,
        options: serde_json::Value,
    ) -> Result<VectorIndexMeta> {
        self.with_write(|store| store.create_vector_index_in_txn(name, dim, metric, method, options))
    }

    fn create_vector_index_in_txn(
        &mut self,
        name: &str,
        dim: usize,
        metric: &str,
        method: &str,
        options: serde_json::Value,
    ) -> Result<VectorIndexMeta> {
        if !is_valid_symbol(name) {
            return Err(Error::TypeError(format!("invalid index name: '{name}'")));
        }
        if dim == 0 {
            return Err(Error::TypeError("vector dimension must be positive".to_string()));
        }
        if self.vectors.metas.contains_key(name) || self.index_descriptor(name)?.is_some() {
            return Err(Error::constraint(
                "index",
                format!("an index named '{name}' already exists"),
            ));
        }
        let parsed_metric = Metric::parse(metric)?;
        // Missing backends fail here, never at search time.
        let handle = plexus_vector::create_index(method, dim, parsed_metric, &options)?;

        let options_text = serde_json::to_string(&options)?;
        self.conn
            .execute(
                "INSERT INTO vector_indexes (name, dim, metric, method, options)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, dim as i64, parsed_metric.name(), method, options_text],
            )
            .map_err(sql_err)?;

        let meta =
            VectorIndexMeta::from_row(name.to_string(), dim, metric, method.to_string(), &options_text)?;
        self.vectors.metas.insert(name.to_string(), meta.clone());
        self.vectors.handles.insert(name.to_string(), handle);
        Ok(meta)
    }

    pub(crate) fn drop_vector_index_in_txn(&mut self, name: &str) -> Result<bool> {
        let dropped = self
            .conn
            .execute("DELETE FROM vector_indexes WHERE name = ?1", [name])
            .map_err(sql_err)?;
        if dropped == 0 {
            return Ok(false);
        }
        self.conn
            .execute("DELETE FROM vector_entries WHERE index_name = ?1", [name])
            .map_err(sql_err)?;
        if let Some(meta) = self.vectors.metas.remove(name) {
            if let Some(path) = meta.index_path {
                let _ = std::fs::remove_file(path);
            }
        }
        self.vectors.handles.remove(name);
        self.vectors.dirty.remove(name);
        Ok(true)
    }

    pub fn drop_vector_index(&mut self, name: &str) -> Result<()> {
        self.with_write(|store| {
            if store.drop_vector_index_in_txn(name)? {
                Ok(())
            } else {
                Err(Error::NotFound(format!("vector index '{name}'")))
            }
        })
    }

    pub fn list_vector_indexes(&self) -> Vec<VectorIndexMeta> {
        let mut out: Vec<VectorIndexMeta> = self.vectors.metas.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub(crate) fn list_vector_descriptors(&self) -> Result<Vec<IndexDescriptor>> {
        Ok(self
            .list_vector_indexes()
            .into_iter()
            .map(|meta| {
                let mut options = BTreeMap::new();
                options.insert("dim".to_string(), serde_json::json!(meta.dim));
                options.insert("metric".to_string(), serde_json::json!(meta.metric.name()));
                options.insert("method".to_string(), serde_json::json!(meta.method));
                IndexDescriptor {
                    name: meta.name,
                    kind: IndexKind::Vector,
                    label: String::new(),
                    properties: Vec::new(),
                    options,
                }
            })
            .collect())
    }

    pub fn upsert_embedding(&mut self, index: &str, node_id: NodeId, vector: &[f32]) -> Result<()> {
        self.with_write(|store| store.upsert_embedding_in_txn(index, node_id, vector))
    }

    pub fn upsert_embeddings(&mut self, index: &str, batch: &[(NodeId, Vec<f32>)]) -> Result<()> {
        self.with_write(|store| {
            for (node_id, vector) in batch {
                store.upsert_embedding_in_txn(index, *node_id, vector)?;
            }
            Ok(())
        })
    }

    pub(crate) fn upsert_embedding_in_txn(
        &mut self,
        index: &str,
        node_id: NodeId,
        vector: &[f32],
    ) -> Result<()> {
        let meta = self
            .vectors
            .metas
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("vector index '{index}'")))?
            .clone();
        if vector.len() != meta.dim {
            return Err(Error::TypeError(format!(
                "dimension mismatch: index '{index}' expects {}, got {}",
                meta.dim,
                vector.len()
            )));
        }
        if !self.node_exists(node_id)? {
            return Err(Error::node_not_found(node_id));
        }

        let blob: Option<Vec<u8>> = meta.store_vectors.then(|| vector_to_blob(vector));
        self.conn
            .execute(
                "INSERT INTO vector_entries (index_name, node_id, vector) VALUES (?1, ?2, ?3)
                 ON CONFLICT(index_name, node_id) DO UPDATE SET vector = excluded.vector",
                params![index, node_id as i64, blob],
            )
            .map_err(sql_err)?;

        self.ensure_handle(index)?;
        if let Some(handle) = self.vectors.handles.get_mut(index) {
            handle.add(node_id, vector)?;
        }
        self.vectors.dirty.insert(index.to_string());
        Ok(())
    }

    /// Cascade hook: a dying node leaves every vector index.
    pub(crate) fn remove_vector_entries(&mut self, node_id: NodeId) -> Result<()> {
        self.conn
            .execute("DELETE FROM vector_entries WHERE node_id = ?1", [node_id as i64])
            .map_err(sql_err)?;
        let names: Vec<String> = self.vectors.handles.keys().cloned().collect();
        for name in names {
            if let Some(handle) = self.vectors.handles.get_mut(&name) {
                handle.remove(node_id)?;
            }
            self.vectors.dirty.insert(name);
        }
        Ok(())
    }

    /// Stored raw vector for a node, if the index keeps them.
    pub fn raw_vector(&self, index: &str, node_id: NodeId) -> Result<Option<Vec<f32>>> {
        let blob: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT vector FROM vector_entries WHERE index_name = ?1 AND node_id = ?2",
                params![index, node_id as i64],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;
        Ok(blob.flatten().map(|b| blob_to_vector(&b)))
    }

    pub fn vector_index_meta(&self, index: &str) -> Result<VectorIndexMeta> {
        self.vectors
            .metas
            .get(index)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vector index '{index}'")))
    }

    /// Top-k nodes by vector similarity, with structural filtering and
    /// optional exact reranking. Scores are higher-is-better; equal scores
    /// break ties by ascending node id.
    pub fn semantic_search(
        &mut self,
        index: &str,
        query: &[f32],
        k: usize,
        opts: &SemanticSearchOptions,
    ) -> Result<Vec<(Node, f32)>> {
        let meta = self.vector_index_meta(index)?;
        if query.len() != meta.dim {
            return Err(Error::TypeError(format!(
                "dimension mismatch: index '{index}' expects {}, got {}",
                meta.dim,
                query.len()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let multiplier = opts.candidate_multiplier.max(1);
        let base_fetch = k.saturating_mul(multiplier);
        let mut fetch = base_fetch;
        let mut filtered: Vec<(NodeId, f32)>;
        loop {
            let candidates = self.handle_search(index, query, fetch)?;
            let exhausted = candidates.len() < fetch;
            filtered = Vec::new();
            for (node_id, score) in &candidates {
                if !self.node_exists(*node_id)? {
                    continue;
                }
                if opts.filter.is_empty() {
                    filtered.push((*node_id, *score));
                    continue;
                }
                let node = self.get_node(*node_id)?;
                if opts.filter.admits(&node) {
                    filtered.push((*node_id, *score));
                }
            }
            if filtered.len() >= k || exhausted || fetch >= base_fetch * FILTER_EXPANSION_CAP {
                break;
            }
            fetch = (fetch * 2).min(base_fetch * FILTER_EXPANSION_CAP);
        }

        if opts.rerank {
            let mut reranked = Vec::with_capacity(filtered.len());
            for (node_id, approx_score) in filtered {
                let exact = match self.raw_vector(index, node_id)? {
                    Some(raw) => meta.metric.score(meta.metric.distance(query, &raw)),
                    None => approx_score,
                };
                reranked.push((node_id, exact));
            }
            filtered = reranked;
            filtered.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
        }

        filtered.truncate(k);
        filtered
            .into_iter()
            .map(|(node_id, score)| Ok((self.get_node(node_id)?, score)))
            .collect()
    }

    fn handle_search(&mut self, index: &str, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        self.ensure_handle(index)?;
        let handle = self
            .vectors
            .handles
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("vector index '{index}'")))?;
        handle.search(query, k)
    }

    /// Loads or rebuilds the ANN handle for `index`.
    fn ensure_handle(&mut self, index: &str) -> Result<()> {
        if self.vectors.handles.contains_key(index) {
            return Ok(());
        }
        let meta = self.vector_index_meta(index)?;

        if let Some(path) = &meta.index_path {
            if path.exists() {
                let handle = plexus_vector::load_index(&meta.method, path)?;
                self.vectors.handles.insert(index.to_string(), handle);
                return Ok(());
            }
        }

        let mut handle = plexus_vector::create_index(&meta.method, meta.dim, meta.metric, &meta.options)?;
        let mut stmt = self
            .conn
            .prepare("SELECT node_id, vector FROM vector_entries WHERE index_name = ?1")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([index], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
            })
            .map_err(sql_err)?;
        let mut entries = 0usize;
        let mut rebuilt = 0usize;
        for row in rows {
            let (node_id, blob) = row.map_err(sql_err)?;
            entries += 1;
            if let Some(blob) = blob {
                handle.add(node_id as u64, &blob_to_vector(&blob))?;
                rebuilt += 1;
            }
        }
        drop(stmt);
        if rebuilt < entries {
            return Err(Error::BackendUnavailable(format!(
                "vector index '{index}' needs reindex: raw vectors were not stored"
            )));
        }
        self.vectors.handles.insert(index.to_string(), handle);
        Ok(())
    }

    /// Writes dirty sidecar-backed handles out. Called on close.
    pub(crate) fn persist_vector_handles(&mut self) -> Result<()> {
        let dirty: Vec<String> = self.vectors.dirty.drain().collect();
        for name in dirty {
            let Some(meta) = self.vectors.metas.get(&name) else {
                continue;
            };
            if let Some(path) = meta.index_path.clone() {
                if let Some(handle) = self.vectors.handles.get(&name) {
                    handle.persist(&path)?;
                }
            }
        }
        Ok(())
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
