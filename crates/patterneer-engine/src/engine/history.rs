use patterneer_common::{
    BlockId, EntityId, HistoryVisibility, NodeKind, ToolRecord, history_visibility,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::graph::DependencyGraph;

/// Resolves an `Object`-kind graph node to the tool that created it.
///
/// The document's geometry container implements this. A `None` answer drops
/// the object from the move filter; it never aborts a query.
pub trait GeometryStore {
    fn owning_tool(&self, object: EntityId) -> Option<EntityId>;
}

impl GeometryStore for FxHashMap<EntityId, EntityId> {
    fn owning_tool(&self, object: EntityId) -> Option<EntityId> {
        self.get(&object).copied()
    }
}

/// Computes how far a construction step may legally move in the visible
/// step list without creating a forward reference.
///
/// Short-lived: build one per UI query from the document's record list, the
/// graph and the active block, use it, drop it. The visible sequence is
/// derived in full at construction (or [`HistoryNavigator::rebuild_index`])
/// and never patched incrementally.
pub struct HistoryNavigator<'a> {
    graph: &'a DependencyGraph,
    geometry: &'a dyn GeometryStore,
    active_block: BlockId,
    objects: Vec<EntityId>,
    id_to_index: FxHashMap<EntityId, usize>,
}

impl<'a> HistoryNavigator<'a> {
    pub fn new(
        records: &[ToolRecord],
        graph: &'a DependencyGraph,
        geometry: &'a dyn GeometryStore,
        active_block: BlockId,
    ) -> Self {
        let mut navigator = HistoryNavigator {
            graph,
            geometry,
            active_block,
            objects: Vec::new(),
            id_to_index: FxHashMap::default(),
        };
        navigator.rebuild_index(records);
        navigator
    }

    /// Refilter the record list into the visible sequence and rebuild the
    /// position index.
    ///
    /// # Panics
    ///
    /// On a record whose tag can never occur in a finished history
    /// (marker/alias tags). Continuing would desynchronize every position
    /// computed afterwards, so this is treated as a hard caller bug.
    pub fn rebuild_index(&mut self, records: &[ToolRecord]) {
        self.objects.clear();
        self.objects.reserve(records.len());

        for record in records {
            match history_visibility(record.tag) {
                HistoryVisibility::Visible => self.objects.push(record.id),
                // The document keeps piece/path/grouping records so it can
                // restore per-block state; they are not steps a user sees.
                HistoryVisibility::Bookkeeping => {}
                HistoryVisibility::Unreachable => panic!(
                    "record {} carries marker tag {:?}, which cannot occur in a finished history",
                    record.id, record.tag
                ),
            }
        }

        self.id_to_index.clear();
        for (index, &id) in self.objects.iter().enumerate() {
            self.id_to_index.insert(id, index);
        }
    }

    /// The visible sequence, in order.
    pub fn visible_sequence(&self) -> &[EntityId] {
        &self.objects
    }

    pub fn can_move_up(&self, id: EntityId) -> bool {
        self.max_up_steps(id) > 0
    }

    pub fn can_move_down(&self, id: EntityId) -> bool {
        self.max_down_steps(id) > 0
    }

    /// How many visible positions `id` may move up. The step must land
    /// strictly after its deepest predecessor; a step with no predecessors
    /// may travel all the way to position 0.
    pub fn max_up_steps(&self, id: EntityId) -> usize {
        if id.is_null() {
            return 0;
        }
        let Some(current) = self.index_of(id) else {
            return 0;
        };
        if current == 0 || !self.in_active_block(id) {
            return 0;
        }

        let predecessors = self.predecessor_tools(id);
        if predecessors.is_empty() {
            return current;
        }

        // Must land after the last dependency.
        let top = predecessors
            .iter()
            .filter_map(|&dep| self.index_of(dep))
            .max()
            .map(|index| index + 1)
            .unwrap_or(0);

        current.saturating_sub(top)
    }

    /// How many visible positions `id` may move down. The step must land
    /// strictly before its shallowest dependent. A step at position 0 never
    /// moves down, even without dependents.
    pub fn max_down_steps(&self, id: EntityId) -> usize {
        if id.is_null() {
            return 0;
        }
        let Some(current) = self.index_of(id) else {
            return 0;
        };
        let last = self.objects.len() - 1;
        if current == 0 || current == last || !self.in_active_block(id) {
            return 0;
        }

        let dependents = self.dependent_tools(id);
        if dependents.is_empty() {
            return last - current;
        }

        // Must land before the first dependent.
        let bottom = match dependents
            .iter()
            .filter_map(|&dep| self.index_of(dep))
            .min()
        {
            Some(index) => match index.checked_sub(1) {
                Some(bottom) => bottom,
                None => return 0,
            },
            None => return last - current,
        };

        bottom.saturating_sub(current)
    }

    /// Entity after which `id` lands when moved up by `steps`, or
    /// [`EntityId::NULL`] when the move is illegal or has no anchor above.
    pub fn up_id(&self, id: EntityId, steps: usize) -> EntityId {
        if steps == 0 {
            return EntityId::NULL;
        }
        let Some(current) = self.index_of(id) else {
            return EntityId::NULL;
        };
        let max = self.max_up_steps(id);
        if max == 0 || steps > max {
            return EntityId::NULL;
        }

        match current.checked_sub(steps + 1) {
            Some(index) => self.objects[index],
            None => EntityId::NULL,
        }
    }

    /// Entity before which `id` lands when moved down by `steps`, or
    /// [`EntityId::NULL`] when the move is illegal or has no anchor below.
    pub fn down_id(&self, id: EntityId, steps: usize) -> EntityId {
        if steps == 0 {
            return EntityId::NULL;
        }
        let Some(current) = self.index_of(id) else {
            return EntityId::NULL;
        };
        let max = self.max_down_steps(id);
        if max == 0 || steps > max {
            return EntityId::NULL;
        }

        let index = current + steps + 1;
        if index >= self.objects.len() {
            return EntityId::NULL;
        }
        self.objects[index]
    }

    pub fn top_id(&self, id: EntityId) -> EntityId {
        let Some(current) = self.index_of(id) else {
            return EntityId::NULL;
        };
        let max = self.max_up_steps(id);
        if max == 0 {
            return EntityId::NULL;
        }

        match current.checked_sub(max + 1) {
            Some(index) => self.objects[index],
            None => EntityId::NULL,
        }
    }

    pub fn bottom_id(&self, id: EntityId) -> EntityId {
        let Some(current) = self.index_of(id) else {
            return EntityId::NULL;
        };
        let max = self.max_down_steps(id);
        if max == 0 {
            return EntityId::NULL;
        }

        let index = current + max + 1;
        if index >= self.objects.len() {
            return EntityId::NULL;
        }
        self.objects[index]
    }

    fn index_of(&self, id: EntityId) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    fn in_active_block(&self, id: EntityId) -> bool {
        self.graph
            .vertex(id)
            .is_some_and(|node| node.block == self.active_block)
    }

    fn predecessor_tools(&self, id: EntityId) -> Vec<EntityId> {
        self.filter_nodes(self.graph.predecessors(id))
    }

    fn dependent_tools(&self, id: EntityId) -> Vec<EntityId> {
        self.filter_nodes(self.graph.neighbors(id))
    }

    /// Keep tool-kind nodes of the active block; resolve object-kind nodes
    /// to their owning tool, dropping any that fail resolution.
    fn filter_nodes(&self, nodes: Vec<EntityId>) -> Vec<EntityId> {
        let mut tools: FxHashSet<EntityId> = FxHashSet::default();

        for node_id in nodes {
            let Some(node) = self.graph.vertex(node_id) else {
                continue;
            };
            if node.block != self.active_block {
                continue;
            }

            match node.kind {
                NodeKind::Tool => {
                    tools.insert(node_id);
                }
                NodeKind::Object => match self.geometry.owning_tool(node_id) {
                    Some(tool) => {
                        tools.insert(tool);
                    }
                    None => {
                        tracing::debug!(
                            object = %node_id,
                            "object has no owning tool, dropped from move filter"
                        );
                    }
                },
                NodeKind::ModelingTool | NodeKind::ModelingObject | NodeKind::Piece => {}
            }
        }

        tools.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patterneer_common::ToolTag;

    fn id(raw: u32) -> EntityId {
        EntityId::new(raw)
    }

    fn record(raw: u32, tag: ToolTag) -> ToolRecord {
        ToolRecord::new(id(raw), tag)
    }

    /// P1, P2 (dep P1), L1 (dep P1, P2) in one block.
    fn chain() -> (DependencyGraph, Vec<ToolRecord>) {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        graph.add_vertex(id(3), NodeKind::Tool, 0);
        graph.add_edge(id(1), id(2));
        graph.add_edge(id(1), id(3));
        graph.add_edge(id(2), id(3));

        let records = vec![
            record(1, ToolTag::BasePoint),
            record(2, ToolTag::EndLine),
            record(3, ToolTag::Line),
        ];
        (graph, records)
    }

    #[test]
    fn blocked_by_adjacent_predecessor() {
        let (graph, records) = chain();
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        assert_eq!(nav.max_up_steps(id(3)), 0);
        assert!(!nav.can_move_up(id(3)));
        assert_eq!(nav.max_down_steps(id(1)), 0);
        assert_eq!(nav.max_down_steps(id(2)), 0);
    }

    #[test]
    fn unrelated_step_travels_to_the_front() {
        let (graph, mut records) = chain();
        graph.add_vertex(id(4), NodeKind::Tool, 0);
        records.push(record(4, ToolTag::BasePoint));
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        assert_eq!(nav.max_up_steps(id(4)), 3);
        assert_eq!(nav.max_down_steps(id(1)), 0);
        // Last entry cannot move further down.
        assert_eq!(nav.max_down_steps(id(4)), 0);
    }

    #[test]
    fn position_zero_never_moves_down() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        let records = vec![
            record(1, ToolTag::BasePoint),
            record(2, ToolTag::BasePoint),
        ];
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        // No dependents at all, yet the first step stays put.
        assert_eq!(nav.max_down_steps(id(1)), 0);
        assert_eq!(nav.max_up_steps(id(2)), 1);
    }

    #[test]
    fn bookkeeping_records_are_invisible() {
        let (graph, mut records) = chain();
        records.insert(1, record(30, ToolTag::Piece));
        records.insert(2, record(31, ToolTag::NodePoint));
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        assert_eq!(nav.visible_sequence(), &[id(1), id(2), id(3)]);
    }

    #[test]
    #[should_panic(expected = "marker tag")]
    fn marker_record_is_a_contract_violation() {
        let (graph, mut records) = chain();
        records.push(record(40, ToolTag::Arrow));
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let _ = HistoryNavigator::new(&records, &graph, &geometry, 0);
    }

    #[test]
    fn cross_block_steps_do_not_move() {
        let (graph, mut records) = chain();
        graph.add_vertex(id(5), NodeKind::Tool, 1);
        records.push(record(5, ToolTag::BasePoint));
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        assert_eq!(nav.max_up_steps(id(5)), 0);
        assert_eq!(nav.max_down_steps(id(5)), 0);
    }

    #[test]
    fn null_and_unknown_ids_are_no_ops() {
        let (graph, records) = chain();
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        assert_eq!(nav.max_up_steps(EntityId::NULL), 0);
        assert_eq!(nav.max_down_steps(EntityId::NULL), 0);
        assert_eq!(nav.max_up_steps(id(99)), 0);
        assert_eq!(nav.up_id(id(99), 1), EntityId::NULL);
        assert_eq!(nav.top_id(id(99)), EntityId::NULL);
    }

    #[test]
    fn object_predecessors_resolve_to_their_tool() {
        let graph = DependencyGraph::new();
        graph.add_vertex(id(1), NodeKind::Tool, 0);
        graph.add_vertex(id(2), NodeKind::Tool, 0);
        graph.add_vertex(id(10), NodeKind::Object, 0);
        graph.add_vertex(id(3), NodeKind::Tool, 0);
        graph.add_edge(id(1), id(2));
        graph.add_edge(id(1), id(3));
        graph.add_edge(id(10), id(3));

        let records = vec![
            record(1, ToolTag::BasePoint),
            record(2, ToolTag::EndLine),
            record(3, ToolTag::Line),
        ];

        // The object belongs to tool 2, so it blocks 3 right where it is.
        let mut geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        geometry.insert(id(10), id(2));
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);
        assert_eq!(nav.max_up_steps(id(3)), 0);

        // Without the resolution the object is dropped and only tool 1
        // constrains the move.
        let empty: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &empty, 0);
        assert_eq!(nav.max_up_steps(id(3)), 1);
    }

    #[test]
    fn up_and_down_ids_skip_one_slot() {
        let graph = DependencyGraph::new();
        for raw in 1..=4 {
            graph.add_vertex(id(raw), NodeKind::Tool, 0);
        }
        let records = vec![
            record(1, ToolTag::BasePoint),
            record(2, ToolTag::BasePoint),
            record(3, ToolTag::BasePoint),
            record(4, ToolTag::BasePoint),
        ];
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        // Moving 4 up one step lands it after entity 2.
        assert_eq!(nav.up_id(id(4), 1), id(2));
        assert_eq!(nav.up_id(id(4), 2), id(1));
        // Moving past every entity leaves no anchor above.
        assert_eq!(nav.up_id(id(4), 3), EntityId::NULL);
        assert_eq!(nav.up_id(id(4), 4), EntityId::NULL);

        assert_eq!(nav.down_id(id(2), 1), id(4));
        assert_eq!(nav.down_id(id(2), 2), EntityId::NULL);

        assert_eq!(nav.top_id(id(3)), EntityId::NULL);
        assert_eq!(nav.bottom_id(id(2)), EntityId::NULL);
    }

    #[test]
    fn bounded_moves_have_anchors() {
        let graph = DependencyGraph::new();
        for raw in 1..=4 {
            graph.add_vertex(id(raw), NodeKind::Tool, 0);
        }
        graph.add_edge(id(1), id(4));
        graph.add_edge(id(2), id(4));
        let records = vec![
            record(1, ToolTag::BasePoint),
            record(2, ToolTag::BasePoint),
            record(3, ToolTag::BasePoint),
            record(4, ToolTag::Line),
        ];
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        // 4 depends on 2 (position 1): it may climb to position 2, landing
        // after its deepest predecessor.
        assert_eq!(nav.max_up_steps(id(4)), 1);
        assert_eq!(nav.top_id(id(4)), id(2));

        // 2 is blocked from below by its dependent 4 at the end.
        assert_eq!(nav.max_down_steps(id(2)), 1);
        assert_eq!(nav.bottom_id(id(2)), id(4));
    }
}
