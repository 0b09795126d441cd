//! Cycle detection.

use super::{Graph, NodeId};
use std::collections::{BTreeSet, VecDeque};

/// Shortest path from `start` back to itself inside `members`.
fn shortest_loop(graph: &Graph, start: NodeId, members: &BTreeSet<NodeId>) -> Option<Vec<NodeId>> {
    let mut parent: Vec<Option<NodeId>> = vec![None; graph.len()];
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(v) = queue.pop_front() {
        for w in graph.dependents(v) {
            if w == start {
                let mut path = vec![v];
                let mut cur = v;
                while let Some(p) = parent[cur] {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            if members.contains(&w) && seen.insert(w) {
                parent[w] = Some(v);
                queue.push_back(w);
            }
        }
    }
    None
}

/// One cycle per strongly connected component that has one.
///
/// Each cycle is the shortest one in its component, rotated so its
/// smallest node comes first; ties go to the lexicographically smallest.
#[must_use]
pub fn find_cycles(graph: &Graph) -> Vec<Vec<NodeId>> {
    let mut cycles = Vec::new();
    for component in graph.strongly_connected() {
        let self_loop = component.len() == 1 && graph.has_edge(component[0], component[0]);
        if component.len() < 2 && !self_loop {
            continue;
        }
        let members: BTreeSet<NodeId> = component.iter().copied().collect();
        let best = component
            .iter()
            .filter_map(|&start| shortest_loop(graph, start, &members))
            .map(|mut cycle| {
                if let Some(pos) = cycle.iter().enumerate().min_by_key(|(_, id)| **id).map(|(i, _)| i) {
                    cycle.rotate_left(pos);
                }
                cycle
            })
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        if let Some(cycle) = best {
            cycles.push(cycle);
        }
    }
    cycles
}
