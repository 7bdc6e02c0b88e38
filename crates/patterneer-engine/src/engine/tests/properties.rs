use patterneer_common::{EntityId, NodeKind, ToolRecord, ToolTag};
use proptest::prelude::*;
use rustc_hash::FxHashMap;

use crate::engine::grammar::rewrite_label_token;
use crate::engine::graph::DependencyGraph;
use crate::engine::history::HistoryNavigator;

proptest! {
    #[test]
    fn label_rewrite_round_trips(
        old in "[A-Z][a-z]{0,3}",
        new in "[A-Z][a-z]{0,3}",
        other in "[A-Z][a-z]{0,3}",
    ) {
        prop_assume!(old != new && other != old && other != new);

        for token in [
            format!("Line_{old}_{other}"),
            format!("Spl_{other}_{old}_3"),
            format!("RadiusArc_{old}_12"),
            format!("Angle1SplPath_{old}_{other}"),
        ] {
            let forward = rewrite_label_token(&token, &old, &new);
            prop_assert!(forward.is_some(), "token {} must reference {}", token, old);
            let forward = forward.unwrap();
            let back = rewrite_label_token(&forward, &new, &old);
            prop_assert_eq!(back.as_deref(), Some(token.as_str()));
        }
    }

    #[test]
    fn unreferenced_tokens_stay_untouched(
        old in "[A-Z][a-z]{1,3}",
        new in "[A-Z][a-z]{1,3}",
        a in "[A-Z][a-z]{1,3}",
        b in "[A-Z][a-z]{1,3}",
    ) {
        prop_assume!(a != old && b != old);
        let line_token = format!("Line_{}_{}", a, b);
        let arc_token = format!("Arc_{}_12", a);
        prop_assert!(rewrite_label_token(&line_token, &old, &new).is_none());
        prop_assert!(rewrite_label_token(&arc_token, &old, &new).is_none());
    }

    #[test]
    fn reachability_is_antisymmetric(
        edges in proptest::collection::vec((0u32..20, 0u32..20), 0..60),
    ) {
        let graph = DependencyGraph::new();
        for raw in 1..=20 {
            graph.add_vertex(EntityId::new(raw), NodeKind::Tool, 0);
        }
        // Edges only run from older to newer ids, as the document layer
        // guarantees, so the graph stays acyclic.
        for (a, b) in edges {
            let (lo, hi) = (a.min(b) + 1, a.max(b) + 1);
            if lo != hi {
                graph.add_edge(EntityId::new(lo), EntityId::new(hi));
            }
        }

        for raw in 1..=20 {
            let id = EntityId::new(raw);
            let dependents = graph.dependent_nodes(id);
            prop_assert!(dependents.iter().all(|n| n.id != id));
            for dependent in dependents {
                let back = graph.dependent_nodes(dependent.id);
                prop_assert!(back.iter().all(|n| n.id != id));
            }
        }
    }

    #[test]
    fn moving_up_never_overtakes_a_predecessor(
        edge_bits in proptest::collection::vec(any::<bool>(), 45),
    ) {
        let n = 10u32;
        let graph = DependencyGraph::new();
        for raw in 1..=n {
            graph.add_vertex(EntityId::new(raw), NodeKind::Tool, 0);
        }
        let mut bits = edge_bits.iter();
        for i in 1..=n {
            for j in (i + 1)..=n {
                if *bits.next().unwrap() {
                    graph.add_edge(EntityId::new(i), EntityId::new(j));
                }
            }
        }

        let records: Vec<ToolRecord> = (1..=n)
            .map(|raw| ToolRecord::new(EntityId::new(raw), ToolTag::BasePoint))
            .collect();
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        for raw in 1..=n {
            let id = EntityId::new(raw);
            let max = nav.max_up_steps(id);
            if max == 0 {
                continue;
            }

            // Simulate the farthest allowed move and check no predecessor
            // ends up at or below the new position.
            let mut order: Vec<EntityId> = records.iter().map(|r| r.id).collect();
            let current = order.iter().position(|&x| x == id).unwrap();
            prop_assert!(max <= current);
            order.remove(current);
            let new_position = current - max;
            order.insert(new_position, id);

            for predecessor in graph.predecessors(id) {
                if let Some(position) = order.iter().position(|&x| x == predecessor) {
                    prop_assert!(position < new_position);
                }
            }
        }
    }

    #[test]
    fn moving_down_never_overtakes_a_dependent(
        edge_bits in proptest::collection::vec(any::<bool>(), 45),
    ) {
        let n = 10u32;
        let graph = DependencyGraph::new();
        for raw in 1..=n {
            graph.add_vertex(EntityId::new(raw), NodeKind::Tool, 0);
        }
        let mut bits = edge_bits.iter();
        for i in 1..=n {
            for j in (i + 1)..=n {
                if *bits.next().unwrap() {
                    graph.add_edge(EntityId::new(i), EntityId::new(j));
                }
            }
        }

        let records: Vec<ToolRecord> = (1..=n)
            .map(|raw| ToolRecord::new(EntityId::new(raw), ToolTag::BasePoint))
            .collect();
        let geometry: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let nav = HistoryNavigator::new(&records, &graph, &geometry, 0);

        for raw in 1..=n {
            let id = EntityId::new(raw);
            let max = nav.max_down_steps(id);
            prop_assert_eq!(nav.can_move_down(id), max > 0);
            if max == 0 {
                continue;
            }

            let mut order: Vec<EntityId> = records.iter().map(|r| r.id).collect();
            let current = order.iter().position(|&x| x == id).unwrap();
            order.remove(current);
            let new_position = current + max;
            order.insert(new_position, id);

            for dependent in graph.neighbors(id) {
                if let Some(position) = order.iter().position(|&x| x == dependent) {
                    prop_assert!(position > new_position);
                }
            }
        }
    }
}
