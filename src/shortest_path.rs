//! Single-origin shortest-path trees (Dijkstra, binary heap).
//!
//! Labels start at [`INFINITE`], predecessors and connectors at
//! [`NULL_INDEX`]. A node whose predecessor is still `NULL_INDEX` after the
//! search is either the origin or unreachable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::constants::{ix, Float, Index, INFINITE, NULL_INDEX};
use crate::graph::Graph;
use crate::model::{NodeId, Path};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    cost: Float,
    node: Index,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed: BinaryHeap is a max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Shortest-path tree rooted at one origin.
#[derive(Debug, Clone)]
pub struct ShortestPathResult {
    pub origin: NodeId,
    origin_index: Index,
    /// Label per node position.
    pub cost: Vec<Float>,
    /// Previous node on the shortest path, or `NULL_INDEX`.
    pub predecessors: Vec<Index>,
    /// Edge used to reach each node, or `NULL_INDEX`.
    pub connectors: Vec<Index>,
    /// Node positions in the order they were settled.
    pub settled: Vec<Index>,
    /// Accumulated skim values, one column per graph skim field.
    pub skims: Vec<Vec<Float>>,
}

impl ShortestPathResult {
    pub fn compute(graph: &Graph, origin: NodeId) -> Result<Self> {
        let origin_index = graph.node_index(origin).ok_or(Error::NodeNotFound(origin))?;
        if graph.cost().len() != graph.num_edges() {
            return Err(Error::MissingParameter(vec!["cost field".to_string()]));
        }

        let n = graph.num_nodes();
        let mut res = Self {
            origin,
            origin_index,
            cost: vec![INFINITE; n],
            predecessors: vec![NULL_INDEX; n],
            connectors: vec![NULL_INDEX; n],
            settled: Vec::with_capacity(n),
            skims: Vec::new(),
        };
        res.run(graph);
        res.accumulate_skims(graph);
        Ok(res)
    }

    fn run(&mut self, graph: &Graph) {
        let costs = graph.cost();
        let blocked = graph.blocked_centroid_flows();
        let mut done = vec![false; self.cost.len()];
        let mut heap = BinaryHeap::new();

        self.cost[ix(self.origin_index)] = 0.0;
        heap.push(HeapEntry { cost: 0.0, node: self.origin_index });

        while let Some(HeapEntry { cost, node }) = heap.pop() {
            let u = ix(node);
            if done[u] {
                continue;
            }
            done[u] = true;
            self.settled.push(node);

            if blocked && node != self.origin_index && graph.is_centroid(node) {
                continue;
            }

            for e in graph.outgoing(node) {
                let Some(edge) = graph.edge(e) else { continue };
                let v = ix(edge.head);
                if done[v] {
                    continue;
                }
                let candidate = cost + costs[e];
                if candidate < self.cost[v] {
                    self.cost[v] = candidate;
                    self.predecessors[v] = node;
                    self.connectors[v] = e as Index;
                    heap.push(HeapEntry { cost: candidate, node: edge.head });
                }
            }
        }
    }

    fn accumulate_skims(&mut self, graph: &Graph) {
        let n = self.cost.len();
        self.skims = graph
            .skim_columns()
            .iter()
            .map(|column| {
                let mut acc = vec![INFINITE; n];
                for &node in &self.settled {
                    let u = ix(node);
                    let conn = self.connectors[u];
                    acc[u] = if conn == NULL_INDEX {
                        0.0
                    } else {
                        acc[ix(self.predecessors[u])] + column[ix(conn)]
                    };
                }
                acc
            })
            .collect();
    }

    pub fn origin_index(&self) -> Index {
        self.origin_index
    }

    pub fn is_reachable(&self, graph: &Graph, node: NodeId) -> bool {
        self.cost_to(graph, node).is_some()
    }

    pub fn cost_to(&self, graph: &Graph, node: NodeId) -> Option<Float> {
        let i = ix(graph.node_index(node)?);
        (self.cost[i] < INFINITE).then_some(self.cost[i])
    }

    /// Rebuild the path from the origin to `destination`.
    pub fn path_to(&self, graph: &Graph, destination: NodeId) -> Option<Path> {
        let dest = graph.node_index(destination)?;
        if self.cost[ix(dest)] >= INFINITE {
            return None;
        }

        let mut steps = Vec::new();
        let mut node = dest;
        while self.connectors[ix(node)] != NULL_INDEX {
            steps.push((self.connectors[ix(node)], node));
            node = self.predecessors[ix(node)];
        }

        let mut path = Path::single(self.origin);
        for (conn, node) in steps.into_iter().rev() {
            let edge = graph.edge(ix(conn))?;
            path.append(edge.link_id, edge.direction, graph.node_id(node)?, self.cost[ix(node)]);
        }
        Some(path)
    }
}
