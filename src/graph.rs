// 🕸️ Relationship Graph - who pays whom, and how much
// Undirected, weighted, one edge per endpoint pair (no parallel edges).
// Nodes are keyed by name; an entity only exists once it has a transaction.

use crate::config::NetworkConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::record::{Column, RecordTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Column the name was first seen in (department, vendor, ...).
    pub kind: Column,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Node indices, `source <= target`.
    pub source: usize,
    pub target: usize,
    /// Summed amount over every transaction on this pair.
    pub weight: f64,
    pub transactions: usize,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationshipGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(skip)]
    node_index: HashMap<String, usize>,
    #[serde(skip)]
    edge_index: HashMap<(usize, usize), usize>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_id(&mut self, name: &str, kind: Column) -> usize {
        if let Some(&id) = self.node_index.get(name) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
        });
        self.node_index.insert(name.to_string(), id);
        id
    }

    /// Add one transaction, creating nodes and the edge on first sight.
    pub fn add_transaction(
        &mut self,
        source: (&str, Column),
        target: (&str, Column),
        amount: f64,
    ) {
        let a = self.node_id(source.0, source.1);
        let b = self.node_id(target.0, target.1);
        let key = (a.min(b), a.max(b));

        match self.edge_index.get(&key) {
            Some(&i) => {
                let edge = &mut self.edges[i];
                edge.weight += amount;
                edge.transactions += 1;
            }
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(Edge {
                    source: key.0,
                    target: key.1,
                    weight: amount,
                    transactions: 1,
                });
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.node_index.get(name).copied()
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&Edge> {
        let (a, b) = (self.find(a)?, self.find(b)?);
        self.edge_index
            .get(&(a.min(b), a.max(b)))
            .map(|&i| &self.edges[i])
    }

    /// Weighted neighbour lists, self-loops left out.
    pub fn adjacency(&self) -> Vec<Vec<(usize, f64)>> {
        let mut adj = vec![Vec::new(); self.nodes.len()];
        for edge in self.edges.iter().filter(|e| !e.is_self_loop()) {
            adj[edge.source].push((edge.target, edge.weight));
            adj[edge.target].push((edge.source, edge.weight));
        }
        adj
    }

    /// Edges over the maximum possible for a simple undirected graph.
    pub fn density(&self) -> f64 {
        let n = self.nodes.len();
        if n <= 1 {
            return 0.0;
        }
        let simple = self.edges.iter().filter(|e| !e.is_self_loop()).count();
        2.0 * simple as f64 / (n * (n - 1)) as f64
    }

    pub fn summary(&self) -> String {
        format!(
            "{} nodes, {} edges ({} self-loops), density {:.4}",
            self.node_count(),
            self.edge_count(),
            self.edges.iter().filter(|e| e.is_self_loop()).count(),
            self.density()
        )
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct GraphBuilder {
    source: Column,
    target: Column,
}

impl GraphBuilder {
    pub fn new(source: Column, target: Column) -> Self {
        GraphBuilder { source, target }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.source, config.target)
    }

    /// One edge per endpoint pair, weight = summed amount.
    ///
    /// Records missing either endpoint or the amount are skipped and counted.
    pub fn build(&self, table: &RecordTable, diag: &mut Diagnostics) -> Result<RelationshipGraph> {
        table.require_columns(&[self.source, self.target, Column::Amount])?;

        let mut graph = RelationshipGraph::new();
        let mut skipped = 0;

        for record in table.records() {
            match (
                record.text(self.source),
                record.text(self.target),
                record.numeric(Column::Amount),
            ) {
                (Some(a), Some(b), Some(amount)) => {
                    graph.add_transaction((a, self.source), (b, self.target), amount)
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            diag.warn(format!(
                "skipped {} record(s) without {}, {} or amount",
                skipped, self.source, self.target
            ));
        }
        diag.info(format!("graph built: {}", graph.summary()));

        Ok(graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}
