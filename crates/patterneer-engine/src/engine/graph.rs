use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::RwLock;
use patterneer_common::{BlockId, EntityId, NodeKind, PatternNode};
use rustc_hash::{FxHashMap, FxHashSet};

/// Dense internal vertex handle. Never leaves this module: the public API
/// speaks `EntityId` only.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
struct VertexHandle(u32);

impl VertexHandle {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Slot {
    node: PatternNode,
    successors: Vec<VertexHandle>,
    predecessors: Vec<VertexHandle>,
}

impl Slot {
    fn new(node: PatternNode) -> Self {
        Slot {
            node,
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct GraphInner {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,

    // Mutually inverse id mappings, kept consistent on every insert/remove.
    id_to_handle: FxHashMap<EntityId, VertexHandle>,
    handle_to_id: FxHashMap<VertexHandle, EntityId>,

    edge_count: usize,
}

impl GraphInner {
    #[inline]
    fn slot(&self, handle: VertexHandle) -> Option<&Slot> {
        self.slots.get(handle.index()).and_then(|s| s.as_ref())
    }

    #[inline]
    fn slot_mut(&mut self, handle: VertexHandle) -> Option<&mut Slot> {
        self.slots.get_mut(handle.index()).and_then(|s| s.as_mut())
    }

    fn add_node(&mut self, node: PatternNode) -> bool {
        if self.id_to_handle.contains_key(&node.id) {
            return false;
        }

        let handle = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(Slot::new(node));
                VertexHandle(index)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(Slot::new(node)));
                VertexHandle(index)
            }
        };

        self.id_to_handle.insert(node.id, handle);
        self.handle_to_id.insert(handle, node.id);
        true
    }

    fn add_edge(&mut self, from: EntityId, to: EntityId) -> bool {
        if from == to {
            return false;
        }
        let (Some(&from_handle), Some(&to_handle)) =
            (self.id_to_handle.get(&from), self.id_to_handle.get(&to))
        else {
            return false;
        };

        let already = match self.slot(from_handle) {
            Some(slot) => slot.successors.contains(&to_handle),
            None => return false,
        };
        if !already {
            if let Some(slot) = self.slot_mut(from_handle) {
                slot.successors.push(to_handle);
            }
            if let Some(slot) = self.slot_mut(to_handle) {
                slot.predecessors.push(from_handle);
            }
            self.edge_count += 1;
        }
        true
    }

    fn remove_vertex(&mut self, id: EntityId) -> bool {
        let Some(&handle) = self.id_to_handle.get(&id) else {
            return false;
        };
        let Some(slot) = self.slots.get_mut(handle.index()).and_then(|s| s.take()) else {
            return false;
        };

        for succ in &slot.successors {
            if let Some(other) = self.slot_mut(*succ) {
                other.predecessors.retain(|&h| h != handle);
            }
            self.edge_count -= 1;
        }
        for pred in &slot.predecessors {
            if let Some(other) = self.slot_mut(*pred) {
                other.successors.retain(|&h| h != handle);
            }
            self.edge_count -= 1;
        }

        self.id_to_handle.remove(&id);
        self.handle_to_id.remove(&handle);
        self.free.push(handle.0);
        true
    }

    fn remove_edge(&mut self, from: EntityId, to: EntityId) -> bool {
        let (Some(&from_handle), Some(&to_handle)) =
            (self.id_to_handle.get(&from), self.id_to_handle.get(&to))
        else {
            return false;
        };

        let existed = match self.slot_mut(from_handle) {
            Some(slot) => {
                let before = slot.successors.len();
                slot.successors.retain(|&h| h != to_handle);
                before != slot.successors.len()
            }
            None => false,
        };
        if !existed {
            return false;
        }

        if let Some(slot) = self.slot_mut(to_handle) {
            slot.predecessors.retain(|&h| h != from_handle);
        }
        self.edge_count -= 1;
        true
    }

    fn remove_incoming_edges(&mut self, id: EntityId) -> usize {
        let Some(&handle) = self.id_to_handle.get(&id) else {
            return 0;
        };

        let predecessors = match self.slot_mut(handle) {
            Some(slot) => std::mem::take(&mut slot.predecessors),
            None => return 0,
        };

        for pred in &predecessors {
            if let Some(other) = self.slot_mut(*pred) {
                other.successors.retain(|&h| h != handle);
            }
        }

        let removed = predecessors.len();
        self.edge_count -= removed;
        removed
    }

    fn has_vertex(&self, id: EntityId) -> bool {
        self.id_to_handle.contains_key(&id)
    }

    fn has_edge(&self, from: EntityId, to: EntityId) -> bool {
        let (Some(&from_handle), Some(&to_handle)) =
            (self.id_to_handle.get(&from), self.id_to_handle.get(&to))
        else {
            return false;
        };
        self.slot(from_handle)
            .is_some_and(|slot| slot.successors.contains(&to_handle))
    }

    fn vertex(&self, id: EntityId) -> Option<PatternNode> {
        let &handle = self.id_to_handle.get(&id)?;
        self.slot(handle).map(|slot| slot.node)
    }

    fn vertices(&self) -> Vec<EntityId> {
        self.id_to_handle.keys().copied().collect()
    }

    fn vertex_count(&self) -> usize {
        self.id_to_handle.len()
    }

    fn neighbors(&self, id: EntityId) -> Vec<EntityId> {
        match self.id_to_handle.get(&id).and_then(|&h| self.slot(h)) {
            Some(slot) => self.resolve_handles(&slot.successors),
            None => Vec::new(),
        }
    }

    fn predecessors(&self, id: EntityId) -> Vec<EntityId> {
        match self.id_to_handle.get(&id).and_then(|&h| self.slot(h)) {
            Some(slot) => self.resolve_handles(&slot.predecessors),
            None => Vec::new(),
        }
    }

    fn resolve_handles(&self, handles: &[VertexHandle]) -> Vec<EntityId> {
        handles
            .iter()
            .filter_map(|h| self.handle_to_id.get(h).copied())
            .collect()
    }

    fn vertices_by_kind(&self, kind: NodeKind) -> Vec<EntityId> {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.node.kind == kind)
            .map(|slot| slot.node.id)
            .collect()
    }

    fn degree(&self, id: EntityId) -> usize {
        self.in_degree(id) + self.out_degree(id)
    }

    fn in_degree(&self, id: EntityId) -> usize {
        self.id_to_handle
            .get(&id)
            .and_then(|&h| self.slot(h))
            .map_or(0, |slot| slot.predecessors.len())
    }

    fn out_degree(&self, id: EntityId) -> usize {
        self.id_to_handle
            .get(&id)
            .and_then(|&h| self.slot(h))
            .map_or(0, |slot| slot.successors.len())
    }

    /// Breadth-first walk over successors, excluding the start vertex. The
    /// filter selects what lands in the result; it never prunes traversal.
    fn dependent_nodes_where(
        &self,
        id: EntityId,
        filter: &dyn Fn(&PatternNode) -> bool,
    ) -> Vec<PatternNode> {
        let Some(&start) = self.id_to_handle.get(&id) else {
            return Vec::new();
        };

        let mut visited: FxHashSet<VertexHandle> = FxHashSet::default();
        visited.insert(start);

        let mut queue: VecDeque<VertexHandle> = VecDeque::new();
        if let Some(slot) = self.slot(start) {
            queue.extend(slot.successors.iter().copied());
        }

        let mut result = Vec::new();
        while let Some(handle) = queue.pop_front() {
            if !visited.insert(handle) {
                continue;
            }
            if let Some(slot) = self.slot(handle) {
                if filter(&slot.node) {
                    result.push(slot.node);
                }
                queue.extend(slot.successors.iter().copied());
            }
        }
        result
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.id_to_handle.clear();
        self.handle_to_id.clear();
        self.edge_count = 0;
    }
}

/// Thread-safe directed dependency graph over construction entities.
///
/// Edge `(a, b)` means "b was constructed using a". One reader/writer lock
/// guards the vertices, edges and both id mappings; every public operation
/// acquires it internally, so `&self` is enough for mutation. Acyclicity is
/// the caller's obligation: edges are expected to point from older entities
/// to newer ones and the graph does not validate it.
///
/// The blocking operations wait for the lock indefinitely. Latency-sensitive
/// callers use the bounded tier ([`DependencyGraph::try_with_read_lock`],
/// [`DependencyGraph::try_with_write_lock`],
/// [`DependencyGraph::try_dependent_nodes_where`]), where `None` means the
/// lock was not acquired in time: indeterminate, not "empty".
#[derive(Default)]
pub struct DependencyGraph {
    inner: RwLock<GraphInner>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Insert a vertex. Fails if the id is already present.
    pub fn add_vertex(&self, id: EntityId, kind: NodeKind, block: BlockId) -> bool {
        self.add_node(PatternNode::new(id, kind, block))
    }

    pub fn add_node(&self, node: PatternNode) -> bool {
        self.inner.write().add_node(node)
    }

    /// Insert the edge `(from, to)`. Fails if either endpoint is absent or
    /// the edge would be a self-loop; inserting an existing edge is a no-op
    /// success.
    pub fn add_edge(&self, from: EntityId, to: EntityId) -> bool {
        self.inner.write().add_edge(from, to)
    }

    /// Remove a vertex together with both mapping entries and every edge
    /// touching it.
    pub fn remove_vertex(&self, id: EntityId) -> bool {
        self.inner.write().remove_vertex(id)
    }

    pub fn remove_edge(&self, from: EntityId, to: EntityId) -> bool {
        self.inner.write().remove_edge(from, to)
    }

    /// Bulk-remove all edges ending at `id`; returns how many were removed.
    /// Used when an entity's dependency list is replaced wholesale.
    pub fn remove_incoming_edges(&self, id: EntityId) -> usize {
        self.inner.write().remove_incoming_edges(id)
    }

    pub fn has_vertex(&self, id: EntityId) -> bool {
        self.inner.read().has_vertex(id)
    }

    pub fn has_edge(&self, from: EntityId, to: EntityId) -> bool {
        self.inner.read().has_edge(from, to)
    }

    pub fn vertex(&self, id: EntityId) -> Option<PatternNode> {
        self.inner.read().vertex(id)
    }

    /// All vertex ids; order is not significant.
    pub fn vertices(&self) -> Vec<EntityId> {
        self.inner.read().vertices()
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.read().vertex_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().edge_count
    }

    /// Direct successors: what depends on `id`, one hop.
    pub fn neighbors(&self, id: EntityId) -> Vec<EntityId> {
        self.inner.read().neighbors(id)
    }

    /// Direct predecessors: what `id` depends on, one hop.
    pub fn predecessors(&self, id: EntityId) -> Vec<EntityId> {
        self.inner.read().predecessors(id)
    }

    pub fn vertices_by_kind(&self, kind: NodeKind) -> Vec<EntityId> {
        self.inner.read().vertices_by_kind(kind)
    }

    pub fn degree(&self, id: EntityId) -> usize {
        self.inner.read().degree(id)
    }

    pub fn in_degree(&self, id: EntityId) -> usize {
        self.inner.read().in_degree(id)
    }

    pub fn out_degree(&self, id: EntityId) -> usize {
        self.inner.read().out_degree(id)
    }

    /// Every node transitively reachable from `id` along successor edges,
    /// excluding `id` itself. Treat the result as a set: traversal is
    /// breadth-first but the order is not part of the contract.
    pub fn dependent_nodes(&self, id: EntityId) -> Vec<PatternNode> {
        self.dependent_nodes_where(id, |_| true)
    }

    pub fn dependent_nodes_where(
        &self,
        id: EntityId,
        filter: impl Fn(&PatternNode) -> bool,
    ) -> Vec<PatternNode> {
        self.inner.read().dependent_nodes_where(id, &filter)
    }

    /// Bounded-wait variant of [`DependencyGraph::dependent_nodes_where`].
    /// `None` means the lock could not be acquired within `timeout`; an
    /// absent `id` or one without dependents yields `Some(vec![])`.
    pub fn try_dependent_nodes_where(
        &self,
        id: EntityId,
        timeout: Duration,
        filter: impl Fn(&PatternNode) -> bool,
    ) -> Option<Vec<PatternNode>> {
        let guard = self.inner.try_read_for(timeout)?;
        Some(guard.dependent_nodes_where(id, &filter))
    }

    /// Run `f` under the read lock if it can be acquired within `timeout`.
    pub fn try_with_read_lock<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(GraphReadView<'_>) -> R,
    ) -> Option<R> {
        let guard = self.inner.try_read_for(timeout)?;
        Some(f(GraphReadView { inner: &*guard }))
    }

    /// Run `f` under the write lock if it can be acquired within `timeout`.
    pub fn try_with_write_lock<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(GraphWriteView<'_>) -> R,
    ) -> Option<R> {
        let mut guard = self.inner.try_write_for(timeout)?;
        Some(f(GraphWriteView { inner: &mut *guard }))
    }

    /// Drop all vertices, edges and mappings.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

/// Read-only graph queries, borrowed from a held read lock.
pub struct GraphReadView<'a> {
    inner: &'a GraphInner,
}

impl GraphReadView<'_> {
    pub fn has_vertex(&self, id: EntityId) -> bool {
        self.inner.has_vertex(id)
    }

    pub fn has_edge(&self, from: EntityId, to: EntityId) -> bool {
        self.inner.has_edge(from, to)
    }

    pub fn vertex(&self, id: EntityId) -> Option<PatternNode> {
        self.inner.vertex(id)
    }

    pub fn vertices(&self) -> Vec<EntityId> {
        self.inner.vertices()
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.vertex_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count
    }

    pub fn neighbors(&self, id: EntityId) -> Vec<EntityId> {
        self.inner.neighbors(id)
    }

    pub fn predecessors(&self, id: EntityId) -> Vec<EntityId> {
        self.inner.predecessors(id)
    }

    pub fn vertices_by_kind(&self, kind: NodeKind) -> Vec<EntityId> {
        self.inner.vertices_by_kind(kind)
    }

    pub fn degree(&self, id: EntityId) -> usize {
        self.inner.degree(id)
    }

    pub fn in_degree(&self, id: EntityId) -> usize {
        self.inner.in_degree(id)
    }

    pub fn out_degree(&self, id: EntityId) -> usize {
        self.inner.out_degree(id)
    }

    pub fn dependent_nodes(&self, id: EntityId) -> Vec<PatternNode> {
        self.inner.dependent_nodes_where(id, &|_| true)
    }

    pub fn dependent_nodes_where(
        &self,
        id: EntityId,
        filter: impl Fn(&PatternNode) -> bool,
    ) -> Vec<PatternNode> {
        self.inner.dependent_nodes_where(id, &filter)
    }
}

/// Full graph access, borrowed from a held write lock.
pub struct GraphWriteView<'a> {
    inner: &'a mut GraphInner,
}

impl GraphWriteView<'_> {
    pub fn add_vertex(&mut self, id: EntityId, kind: NodeKind, block: BlockId) -> bool {
        self.inner.add_node(PatternNode::new(id, kind, block))
    }

    pub fn add_node(&mut self, node: PatternNode) -> bool {
        self.inner.add_node(node)
    }

    pub fn add_edge(&mut self, from: EntityId, to: EntityId) -> bool {
        self.inner.add_edge(from, to)
    }

    pub fn remove_vertex(&mut self, id: EntityId) -> bool {
        self.inner.remove_vertex(id)
    }

    pub fn remove_edge(&mut self, from: EntityId, to: EntityId) -> bool {
        self.inner.remove_edge(from, to)
    }

    pub fn remove_incoming_edges(&mut self, id: EntityId) -> usize {
        self.inner.remove_incoming_edges(id)
    }

    pub fn has_vertex(&self, id: EntityId) -> bool {
        self.inner.has_vertex(id)
    }

    pub fn has_edge(&self, from: EntityId, to: EntityId) -> bool {
        self.inner.has_edge(from, to)
    }

    pub fn vertex(&self, id: EntityId) -> Option<PatternNode> {
        self.inner.vertex(id)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn add_vertex_rejects_duplicates() {
        let graph = DependencyGraph::new();
        assert!(graph.add_vertex(id(1), NodeKind::Tool, 0));
        assert!(!graph.add_vertex(id(1), NodeKind::Object, 0));
        assert_eq!(graph.vertex_count(), 1);
    }

    #[test]
    fn add_edge_requires_both_endpoints() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        assert!(!graph.add_edge(id(1), id(2)));
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        assert!(graph.add_edge(id(1), id(2)));
        assert!(graph.has_edge(id(1), id(2)));
        assert!(!graph.has_edge(id(2), id(1)));
    }

    #[test]
    fn self_loops_are_rejected() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        assert!(!graph.add_edge(id(1), id(1)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn duplicate_edge_is_not_stored_twice() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        assert!(graph.add_edge(id(1), id(2)));
        assert!(graph.add_edge(id(1), id(2)));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.out_degree(id(1)), 1);
    }

    #[test]
    fn remove_vertex_drops_incident_edges_and_mappings() {
        let graph = DependencyGraph::new();
        for raw in 1..=3 {
            graph.add_vertex(id(raw), NodeKind::Tool, 0);
        }
        graph.add_edge(id(1), id(2));
        graph.add_edge(id(2), id(3));

        assert!(graph.remove_vertex(id(2)));
        assert!(!graph.has_vertex(id(2)));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.neighbors(id(1)).is_empty());
        assert!(graph.predecessors(id(3)).is_empty());
        assert!(!graph.remove_vertex(id(2)));
    }

    #[test]
    fn handle_reuse_keeps_mappings_consistent() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        graph.remove_vertex(id(1));
        // New vertex reuses the freed slot; id lookups must not cross wires.
        graph.add_vertex(id(9), NodeKind::Object, 1);

        assert_eq!(graph.vertex(id(9)).unwrap().kind, NodeKind::Object);
        assert!(graph.vertex(id(1)).is_none());
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn remove_incoming_edges_counts() {
        let graph = DependencyGraph::new();
        for raw in 1..=4 {
            graph.add_vertex(id(raw), NodeKind::Tool, 0);
        }
        graph.add_edge(id(1), id(4));
        graph.add_edge(id(2), id(4));
        graph.add_edge(id(4), id(3));

        assert_eq!(graph.remove_incoming_edges(id(4)), 2);
        assert_eq!(graph.in_degree(id(4)), 0);
        assert_eq!(graph.out_degree(id(4)), 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.remove_incoming_edges(id(4)), 0);
    }

    #[test]
    fn dependent_nodes_excludes_self_and_spans_hops() {
        let graph = DependencyGraph::new();
        for raw in 1..=4 {
            graph.add_vertex(id(raw), NodeKind::Tool, 0);
        }
        graph.add_edge(id(1), id(2));
        graph.add_edge(id(2), id(3));
        graph.add_edge(id(1), id(4));

        let dependents: FxHashSet<EntityId> = graph
            .dependent_nodes(id(1))
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(
            dependents,
            [id(2), id(3), id(4)].into_iter().collect::<FxHashSet<_>>()
        );
        assert!(graph.dependent_nodes(id(3)).is_empty());
        assert!(graph.dependent_nodes(id(99)).is_empty());
    }

    #[test]
    fn dependent_nodes_filter_selects_but_does_not_prune() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Object, 0);
        graph.add_vertex(id(3), NodeKind::Tool, 0);
        // The only path to 3 runs through the filtered-out object 2.
        graph.add_edge(id(1), id(2));
        graph.add_edge(id(2), id(3));

        let dependents = graph.dependent_nodes_where(id(1), |n| n.kind != NodeKind::Object);
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, id(3));
    }

    #[test]
    fn vertices_by_kind_filters() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Object, 0);
        graph.add_vertex(id(3), NodeKind::Piece, 0);

        assert_eq!(graph.vertices_by_kind(NodeKind::Object), vec![id(2)]);
        assert!(graph.vertices_by_kind(NodeKind::ModelingTool).is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        graph.add_edge(id(1), id(2));

        graph.clear();
        assert_eq!(graph.vertex_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.vertices().is_empty());
        assert!(graph.add_vertex(id(1), NodeKind::Tool, 0));
    }

    #[test]
    fn try_read_while_write_held_reports_no_value() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);

        let outcome = graph.try_with_write_lock(Duration::from_millis(10), |_view| {
            // Write lock is held here; a zero-budget read must time out
            // rather than return an empty success.
            graph.try_dependent_nodes_where(id(1), Duration::ZERO, |_| true)
        });
        assert_eq!(outcome, Some(None));
    }
}
