//! Graph Traversal
//!
//! Breadth-first traversals over the logical edge list (plain edges plus
//! synthesized structured relationships). Edges with a detached endpoint are
//! not traversable.

use crate::db::TxContext;
use crate::models::{Edge, Node};
use crate::services::entity_repository as repo;
use crate::services::structured;
use crate::services::GraphError;
use std::collections::{HashMap, HashSet, VecDeque};

async fn ensure_node(ctx: &TxContext, id: &str) -> Result<(), GraphError> {
    match repo::get_node(ctx, id).await? {
        Some(_) => Ok(()),
        None => Err(GraphError::node_not_found(id)),
    }
}

/// First shortest directed path from `start_id` to `end_id`
///
/// Returns the ordered edges of the path, or an empty list when
/// `start_id == end_id` or no path exists within `max_depth` edges.
pub(crate) async fn find_path(
    ctx: &TxContext,
    start_id: &str,
    end_id: &str,
    max_depth: usize,
) -> Result<Vec<Edge>, GraphError> {
    ensure_node(ctx, start_id).await?;
    ensure_node(ctx, end_id).await?;
    if start_id == end_id || max_depth == 0 {
        return Ok(Vec::new());
    }

    let edges = structured::decode_all(ctx).await?;
    Ok(shortest_path(&edges, start_id, end_id, max_depth))
}

fn shortest_path(edges: &[Edge], start_id: &str, end_id: &str, max_depth: usize) -> Vec<Edge> {
    let mut outgoing: HashMap<&str, Vec<(&str, usize)>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        if let (Some(source), Some(target)) = (edge.source_id.as_deref(), edge.target_id.as_deref())
        {
            outgoing.entry(source).or_default().push((target, idx));
        }
    }

    // node -> (previous node, edge index used to reach it)
    let mut came_from: HashMap<&str, (&str, usize)> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::from([start_id]);
    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(start_id, 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(neighbors) = outgoing.get(current) else {
            continue;
        };
        for &(next, edge_idx) in neighbors {
            if !visited.insert(next) {
                continue;
            }
            came_from.insert(next, (current, edge_idx));
            if next == end_id {
                return rebuild_path(edges, &came_from, start_id, end_id);
            }
            queue.push_back((next, depth + 1));
        }
    }

    Vec::new()
}

fn rebuild_path<'a>(
    edges: &[Edge],
    came_from: &HashMap<&'a str, (&'a str, usize)>,
    start_id: &str,
    end_id: &'a str,
) -> Vec<Edge> {
    let mut path = Vec::new();
    let mut current = end_id;
    while current != start_id {
        let Some(&(previous, edge_idx)) = came_from.get(current) else {
            break;
        };
        path.push(edges[edge_idx].clone());
        current = previous;
    }
    path.reverse();
    path
}

/// Nodes reachable from `node_id` within `depth` hops, ignoring direction
///
/// The start node is excluded; nodes are returned in discovery order.
pub(crate) async fn find_connected_nodes(
    ctx: &TxContext,
    node_id: &str,
    depth: usize,
) -> Result<Vec<Node>, GraphError> {
    ensure_node(ctx, node_id).await?;
    if depth == 0 {
        return Ok(Vec::new());
    }

    let edges = structured::decode_all(ctx).await?;
    let discovered = connected_ids(&edges, node_id, depth);

    let mut nodes: HashMap<String, Node> = repo::fetch_visible_nodes(ctx)
        .await?
        .into_iter()
        .map(|n| (n.id.clone(), n))
        .collect();
    Ok(discovered
        .into_iter()
        .filter_map(|id| nodes.remove(id))
        .collect())
}

fn connected_ids<'a>(edges: &'a [Edge], start_id: &'a str, depth: usize) -> Vec<&'a str> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        if let (Some(source), Some(target)) = (edge.source_id.as_deref(), edge.target_id.as_deref())
        {
            adjacency.entry(source).or_default().push(target);
            adjacency.entry(target).or_default().push(source);
        }
    }

    let mut visited: HashSet<&str> = HashSet::from([start_id]);
    let mut discovered = Vec::new();
    let mut frontier = vec![start_id];

    for _ in 0..depth {
        let mut next_frontier = Vec::new();
        for current in frontier {
            for &neighbor in adjacency.get(current).into_iter().flatten() {
                if visited.insert(neighbor) {
                    discovered.push(neighbor);
                    next_frontier.push(neighbor);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    discovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeEncoding, Properties};
    use chrono::Utc;

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.into(),
            source_id: Some(source.into()),
            target_id: Some(target.into()),
            edge_type: "NEXT".into(),
            properties: Properties::new(),
            created_at: Utc::now(),
            encoding: EdgeEncoding::Plain,
        }
    }

    fn ids(path: &[Edge]) -> Vec<&str> {
        path.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_shortest_path_respects_depth() {
        let edges = vec![edge("ab", "a", "b"), edge("bc", "b", "c")];

        assert_eq!(ids(&shortest_path(&edges, "a", "c", 2)), vec!["ab", "bc"]);
        assert!(shortest_path(&edges, "a", "c", 1).is_empty());
    }

    #[test]
    fn test_shortest_path_is_directed() {
        let edges = vec![edge("ab", "a", "b")];
        assert!(shortest_path(&edges, "b", "a", 5).is_empty());
    }

    #[test]
    fn test_shortest_path_prefers_fewer_hops() {
        let edges = vec![
            edge("ab", "a", "b"),
            edge("bc", "b", "c"),
            edge("cd", "c", "d"),
            edge("ad", "a", "d"),
        ];
        assert_eq!(ids(&shortest_path(&edges, "a", "d", 5)), vec!["ad"]);
    }

    #[test]
    fn test_connected_ids_by_level_ignoring_direction() {
        let edges = vec![
            edge("ab", "a", "b"),
            edge("ca", "c", "a"),
            edge("bd", "b", "d"),
            edge("de", "d", "e"),
        ];

        assert_eq!(connected_ids(&edges, "a", 1), vec!["b", "c"]);
        assert_eq!(connected_ids(&edges, "a", 2), vec!["b", "c", "d"]);
        assert_eq!(connected_ids(&edges, "d", 10), vec!["b", "e", "a", "c"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let edges = vec![edge("ab", "a", "b"), edge("ba", "b", "a")];
        assert_eq!(connected_ids(&edges, "a", 5), vec!["b"]);
        assert!(shortest_path(&edges, "a", "z", 5).is_empty());
    }
}
