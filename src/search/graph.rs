//! Graph reachability index.
//!
//! A lightweight adjacency mirror of the link records: every
//! `link(from, rel, to)` contributes the directed edge `from → to`.
//! Scoring is bounded-frontier BFS: nodes within `max_hops` of any
//! starting node get score `1 / (1 + distance)`, everything else scores
//! zero. The hybrid engine treats the graph weight as zero when a query
//! supplies no starting nodes.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed adjacency over link edges.
#[derive(Debug, Default)]
pub struct GraphIndex {
    /// node → outgoing neighbors (relation-agnostic)
    edges: DashMap<String, HashSet<String>>,
    /// Number of distinct directed edges
    edge_count: std::sync::atomic::AtomicUsize,
}

impl GraphIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the directed edge `from → to`. Idempotent.
    pub fn add_edge(&self, from: impl Into<String>, to: impl Into<String>) {
        let inserted = self.edges.entry(from.into()).or_default().insert(to.into());
        if inserted {
            self.edge_count
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    /// Number of distinct directed edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Outgoing neighbors of a node, sorted.
    pub fn neighbors(&self, node: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .edges
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Breadth-first frontier expansion from `starting` nodes, bounded at
    /// `max_hops`. Returns hop distances; starting nodes appear at
    /// distance 0.
    pub fn reachability(&self, starting: &[String], max_hops: usize) -> HashMap<String, usize> {
        let mut distances: HashMap<String, usize> = HashMap::new();
        let mut frontier: VecDeque<(String, usize)> = VecDeque::new();

        for node in starting {
            if !distances.contains_key(node) {
                distances.insert(node.clone(), 0);
                frontier.push_back((node.clone(), 0));
            }
        }

        while let Some((node, dist)) = frontier.pop_front() {
            if dist >= max_hops {
                continue;
            }
            if let Some(neighbors) = self.edges.get(&node) {
                for next in neighbors.iter() {
                    if !distances.contains_key(next) {
                        distances.insert(next.clone(), dist + 1);
                        frontier.push_back((next.clone(), dist + 1));
                    }
                }
            }
        }

        distances
    }

    /// Reachability score for a hop distance: `1 / (1 + distance)`.
    pub fn score(distance: usize) -> f32 {
        1.0 / (1.0 + distance as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge_idempotent() {
        let graph = GraphIndex::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors("a"), vec!["b"]);
    }

    #[test]
    fn test_reachability_distances() {
        let graph = GraphIndex::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "d");

        let distances = graph.reachability(&["a".to_string()], 2);
        assert_eq!(distances.get("a"), Some(&0));
        assert_eq!(distances.get("b"), Some(&1));
        assert_eq!(distances.get("c"), Some(&2));
        // Beyond the hop bound
        assert_eq!(distances.get("d"), None);
    }

    #[test]
    fn test_edges_are_directed() {
        let graph = GraphIndex::new();
        graph.add_edge("a", "b");

        let from_b = graph.reachability(&["b".to_string()], 3);
        assert_eq!(from_b.get("a"), None);
    }

    #[test]
    fn test_multiple_starting_nodes_take_min_distance() {
        let graph = GraphIndex::new();
        graph.add_edge("a", "x");
        graph.add_edge("b", "x");
        graph.add_edge("x", "y");

        let distances = graph.reachability(&["a".to_string(), "b".to_string()], 3);
        assert_eq!(distances.get("x"), Some(&1));
        assert_eq!(distances.get("y"), Some(&2));
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = GraphIndex::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");

        let distances = graph.reachability(&["a".to_string()], 10);
        assert_eq!(distances.len(), 2);
    }

    #[test]
    fn test_score_decays_with_distance() {
        assert_eq!(GraphIndex::score(0), 1.0);
        assert_eq!(GraphIndex::score(1), 0.5);
        assert!(GraphIndex::score(2) > GraphIndex::score(3));
    }

    #[test]
    fn test_empty_starting_set() {
        let graph = GraphIndex::new();
        graph.add_edge("a", "b");
        assert!(graph.reachability(&[], 3).is_empty());
    }
}
