//! # Plexus
//!
//! An embeddable property graph database: multi-labeled nodes, typed
//! directed relationships and JSON-valued properties on a single-file
//! SQLite substrate, queried through a Cypher dialect, with pluggable
//! vector search.
//!
//! Everything runs in-process; there is no server and no network surface.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use plexus::{Database, Params};
//!
//! fn main() -> plexus::Result<()> {
//!     let db = Database::open(":memory:")?;
//!     db.execute("CREATE (:Person {name: 'Alice', age: 30})", &Params::new())?;
//!     let result = db.execute("MATCH (p:Person) RETURN p.name", &Params::new())?;
//!     assert_eq!(result.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! `Database` is safe to share across threads: a single writer mutex
//! serializes access to the store, and long statements can be canceled from
//! another thread through [`Database::canceler`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use plexus_storage::{GraphStore, StoreOptions, TxnStatus};

pub use plexus_core::{
    CalendarDuration, ConstraintDescriptor, ConstraintKind, Direction, Error, IndexDescriptor,
    IndexKind, Node, NodeId, PathValue, Relationship, RelationshipId, Result, Value,
};
pub use plexus_query::{Params, Procedure, ProcedureRegistry, QueryResult, Row};
pub use plexus_storage::{
    PatchMode, SearchFilter, SemanticSearchOptions, VectorIndexMeta,
};

/// A caller-supplied `text -> vector` function attached to a vector index.
pub type Embedder = Arc<dyn Fn(&str) -> Result<Vec<f32>> + Send + Sync>;

/// A caller-supplied hook that reorders `(node, score)` candidates.
pub type Reranker = Arc<dyn Fn(&[f32], &mut Vec<(Node, f32)>) + Send + Sync>;

/// Tuning knobs for [`Database::open_with`].
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Hop cap for unbounded variable-length expansion and path searches.
    /// Defaults to 8.
    pub max_traversal_depth: Option<usize>,
}

/// Query input for [`Database::semantic_search`].
pub enum SearchQuery<'a> {
    Vector(Vec<f32>),
    /// Embedded through the index's registered embedder.
    Text(&'a str),
}

impl From<Vec<f32>> for SearchQuery<'_> {
    fn from(vector: Vec<f32>) -> Self {
        SearchQuery::Vector(vector)
    }
}

impl<'a> From<&'a str> for SearchQuery<'a> {
    fn from(text: &'a str) -> Self {
        SearchQuery::Text(text)
    }
}

/// Sets the cancellation flag of in-flight statements.
#[derive(Clone)]
pub struct Canceler(Arc<AtomicBool>);

impl Canceler {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// The database handle.
///
/// One writer at a time; reads ride the same lock. Dropping the handle
/// abandons any open transaction (the substrate rolls it back).
pub struct Database {
    store: Mutex<GraphStore>,
    procedures: RwLock<ProcedureRegistry>,
    embedders: RwLock<BTreeMap<String, Embedder>>,
    rerankers: RwLock<BTreeMap<String, Reranker>>,
    cancel: Arc<AtomicBool>,
}

impl Database {
    /// Opens a database at `path`, or a private in-memory database when
    /// `path` is `":memory:"`.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(path, DatabaseOptions::default())
    }

    pub fn open_with(path: &str, options: DatabaseOptions) -> Result<Self> {
        let mut store_options = StoreOptions::default();
        if let Some(depth) = options.max_traversal_depth {
            store_options.max_traversal_depth = depth;
        }
        let store = if path == ":memory:" {
            GraphStore::open_in_memory_with(store_options)?
        } else {
            GraphStore::open_with(Path::new(path), store_options)?
        };
        Ok(Self {
            store: Mutex::new(store),
            procedures: RwLock::new(ProcedureRegistry::with_builtins()),
            embedders: RwLock::new(BTreeMap::new()),
            rerankers: RwLock::new(BTreeMap::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flushes vector sidecars and closes the substrate.
    pub fn close(self) -> Result<()> {
        let store = self
            .store
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        store.close()
    }

    fn lock(&self) -> MutexGuard<'_, GraphStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A handle other threads can use to cancel the running statement.
    pub fn canceler(&self) -> Canceler {
        Canceler(Arc::clone(&self.cancel))
    }

    // ---- Cypher ----

    /// Runs one Cypher statement. Auto-commits unless a transaction is
    /// open; inside a transaction, a failed statement aborts it.
    pub fn execute(&self, query: &str, params: &Params) -> Result<QueryResult> {
        self.cancel.store(false, Ordering::Relaxed);
        let mut store = self.lock();
        let procedures = self
            .procedures
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let auto_commit = store.txn_status() == TxnStatus::Idle;
        if auto_commit {
            store.begin()?;
        }
        let result = plexus_query::execute(&mut store, &procedures, query, params, &self.cancel);
        if auto_commit {
            match &result {
                Ok(_) => store.commit()?,
                Err(_) => {
                    let _ = store.rollback();
                }
            }
        } else if result.is_err() {
            store.abort();
        }
        result
    }

    /// Registers a procedure callable as `CALL name(...)`.
    pub fn register_procedure(&self, procedure: Arc<dyn Procedure>) {
        self.procedures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(procedure);
    }

    // ---- transactions ----

    pub fn begin(&self) -> Result<()> {
        self.lock().begin()
    }

    pub fn commit(&self) -> Result<()> {
        self.lock().commit()
    }

    pub fn rollback(&self) -> Result<()> {
        self.lock().rollback()
    }

    /// Scoped transaction: the closure's success commits, any error (or an
    /// early `?`) rolls back. The writer is held for the whole scope and
    /// released on every exit path.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut store = self.lock();
        store.begin()?;
        let mut txn = Transaction {
            store,
            cancel: self.cancel.as_ref(),
            procedures: &self.procedures,
        };
        match f(&mut txn) {
            Ok(value) => {
                txn.store.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = txn.store.rollback();
                Err(err)
            }
        }
    }

    // ---- node CRUD ----

    pub fn create_node(
        &self,
        labels: &[&str],
        properties: BTreeMap<String, Value>,
    ) -> Result<Node> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.lock().create_node(&labels, properties)
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node> {
        self.lock().get_node(id)
    }

    pub fn match_nodes(
        &self,
        labels: &[&str],
        properties: &BTreeMap<String, Value>,
    ) -> Result<Vec<Node>> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.lock().match_nodes(&labels, properties)
    }

    pub fn update_node_properties(
        &self,
        id: NodeId,
        patch: BTreeMap<String, Value>,
        mode: PatchMode,
    ) -> Result<Node> {
        self.lock().update_node_properties(id, patch, mode)
    }

    pub fn add_labels(&self, id: NodeId, labels: &[&str]) -> Result<Node> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.lock().add_labels(id, &labels)
    }

    pub fn remove_labels(&self, id: NodeId, labels: &[&str]) -> Result<Node> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.lock().remove_labels(id, &labels)
    }

    /// Deletes a node. Without `detach` the node must have no incident
    /// relationships.
    pub fn delete_node(&self, id: NodeId, detach: bool) -> Result<()> {
        self.lock().delete_node(id, detach)
    }

    // ---- relationship CRUD ----

    pub fn create_relationship(
        &self,
        source: NodeId,
        target: NodeId,
        rel_type: &str,
        properties: BTreeMap<String, Value>,
    ) -> Result<Relationship> {
        self.lock()
            .create_relationship(source, target, rel_type, properties)
    }

    pub fn get_relationship(&self, id: RelationshipId) -> Result<Relationship> {
        self.lock().get_relationship(id)
    }

    pub fn match_relationships(
        &self,
        rel_type: Option<&str>,
        properties: &BTreeMap<String, Value>,
    ) -> Result<Vec<Relationship>> {
        self.lock().match_relationships(rel_type, properties)
    }

    pub fn update_relationship_properties(
        &self,
        id: RelationshipId,
        patch: BTreeMap<String, Value>,
        mode: PatchMode,
    ) -> Result<Relationship> {
        self.lock().update_relationship_properties(id, patch, mode)
    }

    pub fn delete_relationship(&self, id: RelationshipId) -> Result<()> {
        self.lock().delete_relationship(id)
    }

    // ---- traversal ----

    pub fn get_neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<(Relationship, Node)>> {
        self.lock().neighbors(id, direction, rel_type)
    }

    /// Shortest directed path by hop count (breadth-first).
    pub fn find_shortest_path(
        &self,
        source: NodeId,
        target: NodeId,
        max_depth: Option<usize>,
    ) -> Result<Option<PathValue>> {
        self.lock().find_shortest_path(source, target, max_depth)
    }

    /// Any directed path within `max_depth` hops (bounded depth-first).
    pub fn find_path(
        &self,
        source: NodeId,
        target: NodeId,
        max_depth: usize,
    ) -> Result<Option<PathValue>> {
        self.lock().find_path(source, target, max_depth)
    }

    // ---- schema ----

    pub fn create_node_index(&self, label: &str, property: &str) -> Result<IndexDescriptor> {
        self.lock().create_property_index(None, label, property)
    }

    pub fn create_fulltext_index(
        &self,
        name: &str,
        label: &str,
        properties: &[&str],
    ) -> Result<IndexDescriptor> {
        let properties: Vec<String> = properties.iter().map(|p| p.to_string()).collect();
        self.lock()
            .create_fulltext_index(Some(name), label, &properties)
    }

    pub fn create_constraint(
        &self,
        kind: ConstraintKind,
        label: &str,
        property: &str,
        value_kind: Option<&str>,
    ) -> Result<ConstraintDescriptor> {
        self.lock()
            .create_constraint(None, kind, label, property, value_kind)
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        self.lock().list_indexes()
    }

    pub fn list_constraints(&self) -> Result<Vec<ConstraintDescriptor>> {
        self.lock().list_constraints()
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.lock().drop_index(name)
    }

    // ---- vector search ----

    /// Creates a vector index. `method` is `"flat"` or `"hnsw"`; unknown
    /// backends fail here, never at search time.
    pub fn create_vector_index(
        &self,
        name: &str,
        dim: usize,
        metric: &str,
        method: &str,
        options: serde_json::Value,
    ) -> Result<VectorIndexMeta> {
        self.lock()
            .create_vector_index(name, dim, metric, method, options)
    }

    pub fn upsert_embedding(&self, index: &str, node_id: NodeId, vector: &[f32]) -> Result<()> {
        self.lock().upsert_embedding(index, node_id, vector)
    }

    pub fn upsert_embeddings(&self, index: &str, batch: &[(NodeId, Vec<f32>)]) -> Result<()> {
        self.lock().upsert_embeddings(index, batch)
    }

    pub fn list_vector_indexes(&self) -> Vec<VectorIndexMeta> {
        self.lock().list_vector_indexes()
    }

    pub fn drop_vector_index(&self, name: &str) -> Result<()> {
        self.lock().drop_vector_index(name)
    }

    /// Attaches a `text -> vector` embedder so string queries work against
    /// this index.
    pub fn register_embedder(&self, index: &str, embedder: Embedder) {
        self.embedders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index.to_string(), embedder);
    }

    /// Attaches a custom reranking hook, applied to the candidate list when
    /// a search over this index asks for reranking.
    pub fn register_reranker(&self, index: &str, reranker: Reranker) {
        self.rerankers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index.to_string(), reranker);
    }

    /// Top-k nodes by vector similarity. Scores are higher-is-better; the
    /// structural filter in `options` is applied against the store, pulling
    /// more candidates when needed.
    pub fn semantic_search(
        &self,
        index: &str,
        query: SearchQuery<'_>,
        k: usize,
        options: &SemanticSearchOptions,
    ) -> Result<Vec<(Node, f32)>> {
        let vector = match query {
            SearchQuery::Vector(vector) => vector,
            SearchQuery::Text(text) => {
                let embedders = self
                    .embedders
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                let embedder = embedders.get(index).ok_or_else(|| {
                    Error::BackendUnavailable(format!(
                        "no embedder registered for vector index '{index}'"
                    ))
                })?;
                embedder(text)?
            }
        };

        let custom = if options.rerank {
            self.rerankers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(index)
                .cloned()
        } else {
            None
        };

        let mut hits = self.lock().semantic_search(index, &vector, k, options)?;
        if let Some(reranker) = custom {
            reranker(&vector, &mut hits);
            hits.truncate(k);
        }
        Ok(hits)
    }

    // ---- full-text search ----

    /// BM25-ranked full-text search over one index. Higher score is better.
    pub fn text_search(&self, index: &str, query: &str, k: usize) -> Result<Vec<(Node, f32)>> {
        self.lock().text_search(index, query, k)
    }

    pub fn has_fts5(&self) -> bool {
        self.lock().has_fts5()
    }

    // ---- introspection ----

    pub fn get_node_count(&self) -> Result<u64> {
        self.lock().get_node_count()
    }

    pub fn get_relationship_count(&self) -> Result<u64> {
        self.lock().get_relationship_count()
    }

    pub fn get_all_labels(&self) -> Vec<String> {
        self.lock().get_all_labels()
    }

    pub fn get_all_relationship_types(&self) -> Vec<String> {
        self.lock().get_all_relationship_types()
    }

    pub fn get_all_property_keys(&self) -> Result<Vec<String>> {
        self.lock().get_all_property_keys()
    }
}

/// A scoped transaction created by [`Database::with_transaction`].
///
/// Holds the writer for its whole lifetime; every operation inside the
/// scope sees earlier writes of the same scope.
pub struct Transaction<'a> {
    store: MutexGuard<'a, GraphStore>,
    cancel: &'a AtomicBool,
    procedures: &'a RwLock<ProcedureRegistry>,
}

impl Transaction<'_> {
    pub fn execute(&mut self, query: &str, params: &Params) -> Result<QueryResult> {
        let procedures = self
            .procedures
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let result =
            plexus_query::execute(&mut self.store, &procedures, query, params, self.cancel);
        if result.is_err() {
            self.store.abort();
        }
        result
    }

    pub fn create_node(
        &mut self,
        labels: &[&str],
        properties: BTreeMap<String, Value>,
    ) -> Result<Node> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.store.create_node(&labels, properties)
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node> {
        self.store.get_node(id)
    }

    pub fn create_relationship(
        &mut self,
        source: NodeId,
        target: NodeId,
        rel_type: &str,
        properties: BTreeMap<String, Value>,
    ) -> Result<Relationship> {
        self.store
            .create_relationship(source, target, rel_type, properties)
    }

    pub fn delete_node(&mut self, id: NodeId, detach: bool) -> Result<()> {
        self.store.delete_node(id, detach)
    }

    pub fn upsert_embedding(&mut self, index: &str, node_id: NodeId, vector: &[f32]) -> Result<()> {
        self.store.upsert_embedding(index, node_id, vector)
    }
}
