//! Ego-network filtering: narrow a full graph to the neighborhood within a
//! bounded hop distance of one character.

use crate::graph::GraphData;
use std::collections::HashSet;

/// Filter a graph to the nodes within `depth` hops of the node named
/// `center_name`, plus the edges among them.
///
/// An unknown center returns the input unchanged; callers treat that as
/// "show everything", not as an error. Edges are traversed in both
/// directions. Node and edge order of the input is preserved.
pub fn filter_by_center(graph: &GraphData, center_name: &str, depth: usize) -> GraphData {
    let center = match graph.nodes.iter().find(|n| n.name == center_name) {
        Some(node) => node.id,
        None => {
            log::debug!(
                "Center '{}' not present in graph; returning it unfiltered",
                center_name
            );
            return graph.clone();
        }
    };

    let mut visited: HashSet<i64> = HashSet::new();
    visited.insert(center);
    let mut frontier: HashSet<i64> = visited.clone();

    for _ in 0..depth {
        let mut next: HashSet<i64> = HashSet::new();
        for e in &graph.edges {
            if frontier.contains(&e.source_id) && !visited.contains(&e.target_id) {
                next.insert(e.target_id);
            }
            if frontier.contains(&e.target_id) && !visited.contains(&e.source_id) {
                next.insert(e.source_id);
            }
        }
        if next.is_empty() {
            break;
        }
        visited.extend(next.iter().copied());
        frontier = next;
    }

    GraphData {
        nodes: graph
            .nodes
            .iter()
            .filter(|n| visited.contains(&n.id))
            .cloned()
            .collect(),
        edges: graph
            .edges
            .iter()
            .filter(|e| visited.contains(&e.source_id) && visited.contains(&e.target_id))
            .cloned()
            .collect(),
    }
}
