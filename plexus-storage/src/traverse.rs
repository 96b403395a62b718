//! Path search over the adjacency tables.

use std::collections::{HashMap, HashSet, VecDeque};

use plexus_core::{Direction, Error, NodeId, PathValue, RelationshipId, Result};

use crate::GraphStore;

impl GraphStore {
    /// Shortest directed path from `src` to `dst` by hop count (BFS).
    /// Depth defaults to the store's traversal cap.
    pub fn find_shortest_path(
        &self,
        src: NodeId,
        dst: NodeId,
        max_depth: Option<usize>,
    ) -> Result<Option<PathValue>> {
        let max_depth = max_depth.unwrap_or(self.options().max_traversal_depth);
        if !self.node_exists(src)? {
            return Err(Error::node_not_found(src));
        }
        if !self.node_exists(dst)? {
            return Err(Error::node_not_found(dst));
        }
        if src == dst {
            return Ok(Some(PathValue::single(self.get_node(src)?)));
        }

        let mut parents: HashMap<NodeId, (NodeId, RelationshipId)> = HashMap::new();
        let mut visited: HashSet<NodeId> = HashSet::from([src]);
        let mut frontier: VecDeque<(NodeId, usize)> = VecDeque::from([(src, 0)]);

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for rel in self.incident_relationships(current, Direction::Outgoing, None)? {
                let next = rel.target_id;
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, (current, rel.id));
                if next == dst {
                    return Ok(Some(self.materialize_path(src, dst, &parents)?));
                }
                frontier.push_back((next, depth + 1));
            }
        }
        Ok(None)
    }

    /// Any directed path from `src` to `dst` within `max_depth` hops,
    /// found by depth-first search. Not necessarily the shortest.
    pub fn find_path(&self, src: NodeId, dst: NodeId, max_depth: usize) -> Result<Option<PathValue>> {
        if !self.node_exists(src)? {
            return Err(Error::node_not_found(src));
        }
        if !self.node_exists(dst)? {
            return Err(Error::node_not_found(dst));
        }
        let mut on_path: Vec<(NodeId, Option<RelationshipId>)> = vec![(src, None)];
        let mut visited: HashSet<NodeId> = HashSet::from([src]);
        if self.dfs_path(src, dst, max_depth, &mut on_path, &mut visited)? {
            let mut path = PathValue::single(self.get_node(src)?);
            for (node_id, rel_id) in &on_path[1..] {
                path.relationships
                    .push(self.get_relationship(rel_id.expect("non-root path step"))?);
                path.nodes.push(self.get_node(*node_id)?);
            }
            return Ok(Some(path));
        }
        Ok(None)
    }

    fn dfs_path(
        &self,
        current: NodeId,
        dst: NodeId,
        remaining: usize,
        on_path: &mut Vec<(NodeId, Option<RelationshipId>)>,
        visited: &mut HashSet<NodeId>,
    ) -> Result<bool> {
        if current == dst {
            return Ok(true);
        }
        if remaining == 0 {
            return Ok(false);
        }
        for rel in self.incident_relationships(current, Direction::Outgoing, None)? {
            let next = rel.target_id;
            if !visited.insert(next) {
                continue;
            }
            on_path.push((next, Some(rel.id)));
            if self.dfs_path(next, dst, remaining - 1, on_path, visited)? {
                return Ok(true);
            }
            on_path.pop();
        }
        Ok(false)
    }

    fn materialize_path(
        &self,
        src: NodeId,
        dst: NodeId,
        parents: &HashMap<NodeId, (NodeId, RelationshipId)>,
    ) -> Result<PathValue> {
        let mut rel_ids = Vec::new();
        let mut node_ids = vec![dst];
        let mut cursor = dst;
        while cursor != src {
            let (parent, rel_id) = parents[&cursor];
            rel_ids.push(rel_id);
            node_ids.push(parent);
            cursor = parent;
        }
        node_ids.reverse();
        rel_ids.reverse();

        let mut path = PathValue::default();
        for id in node_ids {
            path.nodes.push(self.get_node(id)?);
        }
        for id in rel_ids {
            path.relationships.push(self.get_relationship(id)?);
        }
        Ok(path)
    }
}
