use std::collections::{HashMap, HashSet, VecDeque};

use crate::edge::Edge;

/// Every node from which `target_id` is reachable along forward edges.
///
/// Walks the edges backwards breadth-first. Each node is expanded at most
/// once, so cycles terminate; the target itself is only part of the result
/// when some cycle actually leads back to it.
pub fn predecessors(target_id: &str, edges: &[Edge]) -> HashSet<String> {
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        incoming
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }

    let mut result = HashSet::new();
    let mut expanded: HashSet<&str> = HashSet::from([target_id]);
    let mut queue: VecDeque<&str> = VecDeque::from([target_id]);

    while let Some(current) = queue.pop_front() {
        let Some(sources) = incoming.get(current) else {
            continue;
        };
        for &source in sources {
            result.insert(source.to_string());
            if expanded.insert(source) {
                queue.push_back(source);
            }
        }
    }

    result
}
