//! Path: a sequence of alternating nodes and directed links.

use serde::{Deserialize, Serialize};
use super::{Direction, LinkId, NodeId};
use crate::constants::Float;

/// A shortest path: node -[link]-> node -[link]-> node ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub origin: NodeId,
    pub destination: NodeId,
    /// Nodes along the path. Always has one more element than `links`.
    pub nodes: Vec<NodeId>,
    /// Links traversed, with the direction they were traversed in.
    pub links: Vec<(LinkId, Direction)>,
    /// Cumulative cost at each entry of `nodes`.
    pub milepost: Vec<Float>,
}

impl Path {
    pub fn single(node: NodeId) -> Self {
        Self {
            origin: node,
            destination: node,
            nodes: vec![node],
            links: Vec::new(),
            milepost: vec![0.0],
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn total_cost(&self) -> Float {
        self.milepost.last().copied().unwrap_or(0.0)
    }

    /// Extend the path with a link and the node it leads to.
    pub fn append(&mut self, link: LinkId, direction: Direction, node: NodeId, cost: Float) {
        self.links.push((link, direction));
        self.nodes.push(node);
        self.milepost.push(cost);
        self.destination = node;
    }
}
