// 📈 Graph Analyzer - degree and betweenness centrality
// Degree: distinct neighbours / (N - 1).
// Betweenness: Brandes over Dijkstra (edge weight = distance), undirected,
// normalized within each connected component.

use crate::config::NetworkConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{AnalysisError, Result};
use crate::graph::RelationshipGraph;
use crate::record::Column;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityScore {
    pub node: String,
    pub kind: Column,
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    /// One score per node, in node insertion order.
    pub scores: Vec<CentralityScore>,
    pub top_degree: Vec<CentralityScore>,
    pub top_betweenness: Vec<CentralityScore>,
    pub node_count: usize,
    pub edge_count: usize,
    pub component_count: usize,
    pub density: f64,
}

impl NetworkAnalysis {
    pub fn score(&self, node: &str) -> Option<&CentralityScore> {
        self.scores.iter().find(|s| s.node == node)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} nodes, {} edges, {} component(s); top degree: {}; top betweenness: {}",
            self.node_count,
            self.edge_count,
            self.component_count,
            self.top_degree.first().map_or("-", |s| s.node.as_str()),
            self.top_betweenness.first().map_or("-", |s| s.node.as_str()),
        )
    }
}

/// Highest `k` by `key`, ties broken by node name ascending.
pub fn top_k(
    scores: &[CentralityScore],
    k: usize,
    key: impl Fn(&CentralityScore) -> f64,
) -> Vec<CentralityScore> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)).then_with(|| a.node.cmp(&b.node)));
    sorted.truncate(k);
    sorted
}

pub struct GraphAnalyzer {
    top_k: usize,
}

impl GraphAnalyzer {
    pub fn new(top_k: usize) -> Self {
        GraphAnalyzer { top_k }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.top_k)
    }

    pub fn analyze(&self, graph: &RelationshipGraph, diag: &mut Diagnostics) -> Result<NetworkAnalysis> {
        if let Some(bad) = graph
            .edges()
            .iter()
            .find(|e| !e.weight.is_finite() || e.weight < 0.0)
        {
            return Err(AnalysisError::Computation(format!(
                "edge weight {} cannot be used as a path distance",
                bad.weight
            )));
        }

        // Work in node-name order so equal-distance paths (zero-amount edges
        // in particular) are explored the same way whatever the row order.
        let (order, adjacency) = canonical_adjacency(graph);
        let components = connected_components(&adjacency);
        let component_count = components.iter().copied().max().map_or(0, |c| c + 1);

        let mut degree = vec![0.0; order.len()];
        let mut betweenness = vec![0.0; order.len()];
        for (rank, (d, b)) in degree_centrality(&adjacency)
            .into_iter()
            .zip(betweenness_centrality(&adjacency, &components))
            .enumerate()
        {
            degree[order[rank]] = d;
            betweenness[order[rank]] = b;
        }

        let scores: Vec<CentralityScore> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| CentralityScore {
                node: node.name.clone(),
                kind: node.kind,
                degree_centrality: degree[i],
                betweenness_centrality: betweenness[i],
            })
            .collect();

        let analysis = NetworkAnalysis {
            top_degree: top_k(&scores, self.top_k, |s| s.degree_centrality),
            top_betweenness: top_k(&scores, self.top_k, |s| s.betweenness_centrality),
            scores,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            component_count,
            density: graph.density(),
        };

        diag.info(format!("centrality computed: {}", analysis.summary()));
        Ok(analysis)
    }
}

impl Default for GraphAnalyzer {
    fn default() -> Self {
        Self::new(5)
    }
}

// ============================================================================
// ALGORITHMS
// ============================================================================

/// Adjacency relabelled so that index `r` is the `r`-th node by name, with
/// every neighbour list sorted. Returns `order[r]` = graph node index.
fn canonical_adjacency(graph: &RelationshipGraph) -> (Vec<usize>, Vec<Vec<(usize, f64)>>) {
    let nodes = graph.nodes();
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| nodes[a].name.cmp(&nodes[b].name));

    let mut rank = vec![0; nodes.len()];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }

    let original = graph.adjacency();
    let adjacency = order
        .iter()
        .map(|&i| {
            let mut nbrs: Vec<(usize, f64)> = original[i].iter().map(|&(w, weight)| (rank[w], weight)).collect();
            nbrs.sort_by_key(|&(w, _)| w);
            nbrs
        })
        .collect();

    (order, adjacency)
}

fn degree_centrality(adjacency: &[Vec<(usize, f64)>]) -> Vec<f64> {
    let n = adjacency.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    adjacency.iter().map(|nbrs| nbrs.len() as f64 * scale).collect()
}

/// Component label per node, labels numbered in order of first node.
fn connected_components(adjacency: &[Vec<(usize, f64)>]) -> Vec<usize> {
    let n = adjacency.len();
    let mut label = vec![usize::MAX; n];
    let mut next = 0;

    for start in 0..n {
        if label[start] != usize::MAX {
            continue;
        }
        label[start] = next;
        let mut queue = VecDeque::from([start]);
        while let Some(v) = queue.pop_front() {
            for &(w, _) in &adjacency[v] {
                if label[w] == usize::MAX {
                    label[w] = next;
                    queue.push_back(w);
                }
            }
        }
        next += 1;
    }

    label
}

/// Min-heap entry for Dijkstra.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist: f64,
    node: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn betweenness_centrality(adjacency: &[Vec<(usize, f64)>], components: &[usize]) -> Vec<f64> {
    let n = adjacency.len();
    let mut centrality = vec![0.0f64; n];

    for s in 0..n {
        let mut stack: Vec<usize> = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![f64::INFINITY; n];
        let mut settled = vec![false; n];

        sigma[s] = 1.0;
        dist[s] = 0.0;

        let mut heap = BinaryHeap::new();
        heap.push(Candidate { dist: 0.0, node: s });

        // Forward Dijkstra, counting shortest paths
        while let Some(Candidate { dist: d, node: v }) = heap.pop() {
            if settled[v] {
                continue;
            }
            settled[v] = true;
            stack.push(v);

            for &(w, weight) in &adjacency[v] {
                if settled[w] {
                    continue;
                }
                let candidate = d + weight;
                if candidate < dist[w] {
                    dist[w] = candidate;
                    sigma[w] = sigma[v];
                    predecessors[w] = vec![v];
                    heap.push(Candidate {
                        dist: candidate,
                        node: w,
                    });
                } else if candidate == dist[w] {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        // Backward pass - accumulate dependencies
        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    // Every undirected pair was counted from both ends: halve, then apply
    // 2/((Nc-1)(Nc-2)). Together that is 1/((Nc-1)(Nc-2)).
    let mut sizes = vec![0usize; n];
    for &c in components {
        sizes[c] += 1;
    }
    for (v, c) in centrality.iter_mut().enumerate() {
        let nc = sizes[components[v]];
        *c = if nc > 2 {
            *c / ((nc - 1) * (nc - 2)) as f64
        } else {
            0.0
        };
    }

    centrality
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_from(edges: &[(&str, &str, f64)]) -> RelationshipGraph {
        let mut graph = RelationshipGraph::new();
        for (a, b, w) in edges {
            graph.add_transaction((*a, Column::Department), (*b, Column::Vendor), *w);
        }
        graph
    }

    fn analyze(graph: &RelationshipGraph) -> NetworkAnalysis {
        GraphAnalyzer::default()
            .analyze(graph, &mut Diagnostics::new())
            .unwrap()
    }

    #[test]
    fn test_line_graph() {
        let analysis = analyze(&graph_from(&[("A", "B", 1.0), ("B", "C", 1.0)]));

        let b = analysis.score("B").unwrap();
        assert_eq!(b.degree_centrality, 1.0);
        assert!((b.betweenness_centrality - 1.0).abs() < 1e-12);

        let a = analysis.score("A").unwrap();
        assert_eq!(a.degree_centrality, 0.5);
        assert_eq!(a.betweenness_centrality, 0.0);
        assert_eq!(analysis.top_betweenness[0].node, "B");
    }

    #[test]
    fn test_weights_are_distances_and_ties_split() {
        // A-B-C is short (2); A-D-C is long (10). B-D ties via A and C.
        let analysis = analyze(&graph_from(&[
            ("A", "B", 1.0),
            ("B", "C", 1.0),
            ("A", "D", 5.0),
            ("D", "C", 5.0),
        ]));

        let bc = |n: &str| analysis.score(n).unwrap().betweenness_centrality;
        assert!((bc("B") - 1.0 / 3.0).abs() < 1e-12);
        assert!((bc("A") - 1.0 / 6.0).abs() < 1e-12);
        assert!((bc("C") - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(bc("D"), 0.0);
    }

    #[test]
    fn test_scores_bounded() {
        let analysis = analyze(&graph_from(&[
            ("Roads", "Acme", 10.0),
            ("Roads", "Bolt", 3.0),
            ("Parks", "Acme", 7.0),
            ("Parks", "GreenCo", 1.0),
            ("Water", "Bolt", 2.0),
            ("Water", "Water", 4.0),
        ]));

        let n = analysis.node_count as f64;
        let degree_sum: f64 = analysis.scores.iter().map(|s| s.degree_centrality).sum();
        assert!(degree_sum <= n);
        for s in &analysis.scores {
            assert!((0.0..=1.0).contains(&s.degree_centrality), "{:?}", s);
            assert!((0.0..=1.0).contains(&s.betweenness_centrality), "{:?}", s);
        }
    }

    #[test]
    fn test_unrelated_component_does_not_change_betweenness() {
        let path = [("A", "B", 1.0), ("B", "C", 2.0), ("C", "D", 1.0)];
        let alone = analyze(&graph_from(&path));

        let mut with_other = path.to_vec();
        with_other.extend([("P", "Q", 1.0), ("Q", "R", 1.0), ("R", "P", 1.0)]);
        let combined = analyze(&graph_from(&with_other));

        assert_eq!(combined.component_count, 2);
        for name in ["A", "B", "C", "D"] {
            assert_eq!(
                alone.score(name).unwrap().betweenness_centrality,
                combined.score(name).unwrap().betweenness_centrality
            );
        }
    }

    #[test]
    fn test_top_k_ties_break_by_name() {
        let analysis = analyze(&graph_from(&[
            ("hub", "c", 1.0),
            ("hub", "a", 1.0),
            ("hub", "b", 1.0),
            ("hub", "e", 1.0),
            ("hub", "d", 1.0),
            ("hub", "f", 1.0),
        ]));

        let names: Vec<&str> = analysis.top_degree.iter().map(|s| s.node.as_str()).collect();
        assert_eq!(names, vec!["hub", "a", "b", "c", "d"]);

        // All leaves have zero betweenness; ordering still deterministic.
        let names: Vec<&str> = analysis
            .top_betweenness
            .iter()
            .map(|s| s.node.as_str())
            .collect();
        assert_eq!(names, vec!["hub", "a", "b", "c", "d"]);
    }

    #[test]
    fn test_small_graphs_are_zero() {
        let analysis = analyze(&graph_from(&[("A", "A", 1.0)]));
        assert_eq!(analysis.scores[0].degree_centrality, 0.0);
        assert_eq!(analysis.scores[0].betweenness_centrality, 0.0);

        let analysis = analyze(&graph_from(&[("A", "B", 1.0)]));
        assert!(analysis.scores.iter().all(|s| s.betweenness_centrality == 0.0));
    }

    #[test]
    fn test_row_order_does_not_change_scores() {
        // Zero-amount payments give zero-distance edges, so many paths tie.
        let forward = [
            ("A", "B", 0.0),
            ("B", "C", 0.0),
            ("C", "A", 0.0),
            ("C", "D", 2.0),
            ("D", "E", 0.0),
            ("B", "E", 2.0),
        ];
        let mut backward = forward.to_vec();
        backward.reverse();
        let backward: Vec<(&str, &str, f64)> = backward.into_iter().map(|(a, b, w)| (b, a, w)).collect();

        let first = analyze(&graph_from(&forward));
        let second = analyze(&graph_from(&backward));

        for s in &first.scores {
            let other = second.score(&s.node).unwrap();
            println!("{}: {} / {}", s.node, s.betweenness_centrality, other.betweenness_centrality);
            assert_eq!(s.degree_centrality, other.degree_centrality);
            assert_eq!(s.betweenness_centrality, other.betweenness_centrality);
            assert!((0.0..=1.0).contains(&s.betweenness_centrality));
        }
        let names = |a: &NetworkAnalysis| -> Vec<String> {
            a.top_betweenness.iter().map(|s| s.node.clone()).collect()
        };
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn test_zero_weight_triangle_ignores_insertion_order() {
        let abc = analyze(&graph_from(&[("A", "B", 0.0), ("B", "C", 0.0), ("C", "A", 0.0)]));
        let cba = analyze(&graph_from(&[("C", "B", 0.0), ("B", "A", 0.0), ("A", "C", 0.0)]));

        for name in ["A", "B", "C"] {
            assert_eq!(
                abc.score(name).unwrap().betweenness_centrality,
                cba.score(name).unwrap().betweenness_centrality
            );
        }
    }

    #[test]
    fn test_negative_weight_is_computation_error() {
        let graph = graph_from(&[("A", "B", 1.0), ("B", "C", -4.0)]);
        let err = GraphAnalyzer::default()
            .analyze(&graph, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Computation(_)));
    }
}
