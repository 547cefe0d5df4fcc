//! # Compiled Graph
//!
//! A directed forward-star graph compiled from network links for one mode.
//!
//! ```text
//! Links ──GraphBuilder──▶ Graph { fs, edges, field columns }
//!                           │
//!                           ├─ set_graph("free_flow_time")  → cost column
//!                           └─ set_skimming(["distance"])   → skim columns
//! ```
//!
//! Node positions are compact: centroids occupy `0..num_zones` in the order
//! they were given, then every other node touched by a kept link follows in
//! ascending id order. Edges leaving node `i` are `fs[i]..fs[i + 1]`.

use std::ops::Range;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::constants::{ix, Float, Index};
use crate::model::{Direction, Link, LinkId, NodeId};
use crate::{Error, Result};

/// One directed edge of the compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub tail: Index,
    pub head: Index,
    pub link_id: LinkId,
    /// `AB` or `BA`: which side of the network link this edge represents.
    pub direction: Direction,
}

// ============================================================================
// GraphBuilder
// ============================================================================

/// Compiles network links into a [`Graph`].
pub struct GraphBuilder<'a> {
    links: &'a [Link],
    centroids: Vec<NodeId>,
    mode: Option<char>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(links: &'a [Link]) -> Self {
        Self { links, centroids: Vec::new(), mode: None }
    }

    /// Zones of the graph, in the order demand matrices will use.
    pub fn centroids(mut self, centroids: &[NodeId]) -> Self {
        self.centroids = centroids.to_vec();
        self
    }

    /// Keep only links that allow this mode.
    pub fn mode(mut self, mode: char) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn build(self) -> Result<Graph> {
        let kept: Vec<&Link> = self.links
            .iter()
            .filter(|l| self.mode.is_none_or(|m| l.allows_mode(m)))
            .collect();

        if kept.is_empty() {
            return Err(Error::InvalidNetwork("no links available for the requested mode".into()));
        }

        let mut seen_links = HashSet::with_capacity(kept.len());
        for link in &kept {
            if !seen_links.insert(link.id) {
                return Err(Error::InvalidNetwork(format!("duplicate link id {}", link.id)));
            }
        }

        // Field columns: union of names, every kept link must carry all of them.
        let mut field_names: Vec<String> = kept
            .iter()
            .flat_map(|l| l.fields.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        field_names.sort();

        for link in &kept {
            for name in &field_names {
                if !link.fields.contains_key(name) {
                    return Err(Error::InvalidNetwork(format!("link {} has no value for field '{name}'", link.id)));
                }
            }
        }

        // Node numbering: centroids first, then the rest ascending.
        let mut node_index: HashMap<NodeId, Index> = HashMap::new();
        let mut nodes: Vec<NodeId> = Vec::new();
        for &c in &self.centroids {
            if node_index.insert(c, nodes.len() as Index).is_some() {
                return Err(Error::InvalidNetwork(format!("centroid {c} listed twice")));
            }
            nodes.push(c);
        }
        let mut others: Vec<NodeId> = kept
            .iter()
            .flat_map(|l| [l.a_node, l.b_node])
            .filter(|n| !node_index.contains_key(n))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        others.sort();
        for n in others {
            node_index.insert(n, nodes.len() as Index);
            nodes.push(n);
        }

        // Directed edges with their field values.
        let mut directed: Vec<(Edge, Vec<Float>)> = Vec::with_capacity(kept.len() * 2);
        for link in &kept {
            let a = node_index[&link.a_node];
            let b = node_index[&link.b_node];
            if matches!(link.direction, Direction::AB | Direction::Both) {
                let values = field_names.iter().map(|f| link.fields[f].ab).collect();
                directed.push((Edge { tail: a, head: b, link_id: link.id, direction: Direction::AB }, values));
            }
            if matches!(link.direction, Direction::BA | Direction::Both) {
                let values = field_names.iter().map(|f| link.fields[f].ba).collect();
                directed.push((Edge { tail: b, head: a, link_id: link.id, direction: Direction::BA }, values));
            }
        }
        directed.sort_by_key(|(e, _)| (e.tail, e.link_id, i8::from(e.direction)));

        let mut fs = vec![0 as Index; nodes.len() + 1];
        for (e, _) in &directed {
            fs[ix(e.tail) + 1] += 1;
        }
        for i in 0..nodes.len() {
            fs[i + 1] += fs[i];
        }

        let mut fields: HashMap<String, Vec<Float>> = field_names
            .iter()
            .map(|f| (f.clone(), Vec::with_capacity(directed.len())))
            .collect();
        let mut edges = Vec::with_capacity(directed.len());
        for (edge, values) in directed {
            for (name, v) in field_names.iter().zip(values) {
                if let Some(col) = fields.get_mut(name) {
                    col.push(v);
                }
            }
            edges.push(edge);
        }

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            zones = self.centroids.len(),
            mode = ?self.mode,
            "graph compiled"
        );

        Ok(Graph {
            mode: self.mode,
            nodes,
            node_index,
            centroids: self.centroids,
            fs,
            edges,
            field_names,
            fields,
            cost: Vec::new(),
            cost_field: None,
            skim_fields: Vec::new(),
            skims: Vec::new(),
            blocked_centroid_flows: true,
        })
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Forward-star graph ready for shortest-path computation.
#[derive(Debug, Clone)]
pub struct Graph {
    mode: Option<char>,
    nodes: Vec<NodeId>,
    node_index: HashMap<NodeId, Index>,
    centroids: Vec<NodeId>,
    fs: Vec<Index>,
    edges: Vec<Edge>,
    field_names: Vec<String>,
    fields: HashMap<String, Vec<Float>>,
    cost: Vec<Float>,
    cost_field: Option<String>,
    skim_fields: Vec<String>,
    /// One column per entry of `skim_fields`.
    skims: Vec<Vec<Float>>,
    blocked_centroid_flows: bool,
}

impl Graph {
    /// Use `field` as the routing cost.
    pub fn set_graph(&mut self, field: &str) -> Result<()> {
        let column = self.fields
            .get(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;
        validate_costs(field, column)?;
        self.cost = column.clone();
        self.cost_field = Some(field.to_string());
        Ok(())
    }

    /// Fields accumulated along every shortest path.
    pub fn set_skimming<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let mut names = Vec::with_capacity(fields.len());
        let mut columns = Vec::with_capacity(fields.len());
        for f in fields {
            let f = f.as_ref();
            let column = self.fields.get(f).ok_or_else(|| Error::UnknownField(f.to_string()))?;
            names.push(f.to_string());
            columns.push(column.clone());
        }
        self.skim_fields = names;
        self.skims = columns;
        Ok(())
    }

    pub fn set_blocked_centroid_flows(&mut self, blocked: bool) {
        self.blocked_centroid_flows = blocked;
    }

    /// Replace routing costs (congested times during assignment).
    pub fn set_cost(&mut self, costs: &[Float]) -> Result<()> {
        self.check_edge_len(costs.len())?;
        validate_costs("cost", costs)?;
        self.cost.clear();
        self.cost.extend_from_slice(costs);
        Ok(())
    }

    /// Replace the skim column of `field`, if it is being skimmed.
    pub fn set_skim_field(&mut self, field: &str, values: &[Float]) -> Result<()> {
        self.check_edge_len(values.len())?;
        let pos = self.skim_fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;
        self.skims[pos].clear();
        self.skims[pos].extend_from_slice(values);
        Ok(())
    }

    fn check_edge_len(&self, len: usize) -> Result<()> {
        if len != self.edges.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} edge values", self.edges.len()),
                got: len.to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn mode(&self) -> Option<char> { self.mode }
    pub fn num_nodes(&self) -> usize { self.nodes.len() }
    pub fn num_edges(&self) -> usize { self.edges.len() }
    pub fn num_zones(&self) -> usize { self.centroids.len() }
    pub fn centroids(&self) -> &[NodeId] { &self.centroids }
    pub fn cost(&self) -> &[Float] { &self.cost }
    pub fn cost_field(&self) -> Option<&str> { self.cost_field.as_deref() }
    pub fn field_names(&self) -> &[String] { &self.field_names }
    pub fn skim_fields(&self) -> &[String] { &self.skim_fields }
    pub fn skim_columns(&self) -> &[Vec<Float>] { &self.skims }
    pub fn blocked_centroid_flows(&self) -> bool { self.blocked_centroid_flows }
    pub fn edges(&self) -> &[Edge] { &self.edges }

    pub fn field(&self, name: &str) -> Option<&[Float]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn node_index(&self, id: NodeId) -> Option<Index> {
        self.node_index.get(&id).copied()
    }

    pub fn node_id(&self, index: Index) -> Option<NodeId> {
        self.nodes.get(ix(index)).copied()
    }

    pub fn edge(&self, e: usize) -> Option<&Edge> {
        self.edges.get(e)
    }

    /// Positions of the edges leaving `node`.
    pub fn outgoing(&self, node: Index) -> Range<usize> {
        let n = ix(node);
        ix(self.fs[n])..ix(self.fs[n + 1])
    }

    pub fn is_centroid(&self, node: Index) -> bool {
        ix(node) < self.centroids.len()
    }
}

fn validate_costs(field: &str, values: &[Float]) -> Result<()> {
    if let Some((edge, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite() || **v < 0.0) {
        return Err(Error::InvalidCost { field: field.to_string(), edge, value });
    }
    Ok(())
}
