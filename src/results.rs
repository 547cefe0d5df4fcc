//! Link loads and skims produced by loading one traffic class.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::Float;
use crate::graph::Graph;
use crate::matrix::{DemandMatrix, SkimMatrix};
use crate::model::{Direction, LinkId, NodeId};

/// Loads on one network link, per matrix core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkLoad {
    pub link_id: LinkId,
    pub ab: Vec<Float>,
    pub ba: Vec<Float>,
    pub tot: Vec<Float>,
}

/// Per-edge loads (and optional skims) for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResults {
    pub cores: Vec<String>,
    num_edges: usize,
    /// `num_edges x num_cores`, row-major.
    pub link_loads: Vec<Float>,
    /// Sum over cores, one value per edge.
    pub total_link_loads: Vec<Float>,
    pub skims: Option<SkimMatrix>,
    /// OD pairs with demand but no path in the last load.
    pub no_path: Vec<(NodeId, NodeId)>,
}

impl AssignmentResults {
    /// Size result arrays for `graph` and `matrix`.
    pub fn prepare(graph: &Graph, matrix: &DemandMatrix) -> Self {
        let num_edges = graph.num_edges();
        let num_cores = matrix.num_cores();
        let skims = (!graph.skim_fields().is_empty())
            .then(|| SkimMatrix::new(matrix.zones().to_vec(), graph.skim_fields().to_vec()));
        Self {
            cores: matrix.cores().to_vec(),
            num_edges,
            link_loads: vec![0.0; num_edges * num_cores],
            total_link_loads: vec![0.0; num_edges],
            skims,
            no_path: Vec::new(),
        }
    }

    pub fn num_edges(&self) -> usize { self.num_edges }
    pub fn num_cores(&self) -> usize { self.cores.len() }

    /// Load of one core on one edge; `None` when either is out of range.
    pub fn load(&self, edge: usize, core: usize) -> Option<Float> {
        if edge >= self.num_edges || core >= self.cores.len() {
            return None;
        }
        self.link_loads.get(edge * self.cores.len() + core).copied()
    }

    pub fn reset(&mut self) {
        self.link_loads.fill(0.0);
        self.total_link_loads.fill(0.0);
        if let Some(skims) = self.skims.as_mut() {
            skims.data.fill(0.0);
        }
        self.no_path.clear();
    }

    /// Recompute `total_link_loads` from `link_loads`.
    pub fn total_flows(&mut self) {
        let k = self.cores.len();
        for (total, row) in self.total_link_loads.iter_mut().zip(self.link_loads.chunks_exact(k)) {
            *total = row.iter().sum();
        }
    }

    pub fn copy_from(&mut self, other: &Self) {
        self.link_loads.copy_from_slice(&other.link_loads);
        self.total_link_loads.copy_from_slice(&other.total_link_loads);
        if let (Some(mine), Some(theirs)) = (self.skims.as_mut(), other.skims.as_ref()) {
            mine.data.copy_from_slice(&theirs.data);
        }
    }

    /// `self = t * self + (1 - t) * other`, loads and skims alike.
    pub fn linear_combination(&mut self, other: &Self, t: Float) {
        combine(&mut self.link_loads, &other.link_loads, t);
        if let (Some(mine), Some(theirs)) = (self.skims.as_mut(), other.skims.as_ref()) {
            combine(&mut mine.data, &theirs.data, t);
        }
        self.total_flows();
    }

    /// `self = b0 * first + b1 * self + b2 * third`, loads and skims alike.
    pub fn triple_linear_combination(&mut self, first: &Self, third: &Self, betas: [Float; 3]) {
        combine3(&mut self.link_loads, &first.link_loads, &third.link_loads, betas);
        if let (Some(mine), Some(a), Some(c)) = (self.skims.as_mut(), first.skims.as_ref(), third.skims.as_ref()) {
            combine3(&mut mine.data, &a.data, &c.data, betas);
        }
        self.total_flows();
    }

    /// Loads aggregated onto network links, sorted by link id.
    pub fn link_results(&self, graph: &Graph) -> Vec<LinkLoad> {
        let k = self.cores.len();
        let mut by_link: BTreeMap<LinkId, LinkLoad> = BTreeMap::new();
        for (e, edge) in graph.edges().iter().enumerate() {
            let entry = by_link.entry(edge.link_id).or_insert_with(|| LinkLoad {
                link_id: edge.link_id,
                ab: vec![0.0; k],
                ba: vec![0.0; k],
                tot: vec![0.0; k],
            });
            for c in 0..k {
                let v = self.load(e, c).unwrap_or(0.0);
                match edge.direction {
                    Direction::BA => entry.ba[c] += v,
                    _ => entry.ab[c] += v,
                }
                entry.tot[c] += v;
            }
        }
        by_link.into_values().collect()
    }
}

fn combine(out: &mut [Float], other: &[Float], t: Float) {
    for (x, &y) in out.iter_mut().zip(other) {
        *x = t * *x + (1.0 - t) * y;
    }
}

fn combine3(out: &mut [Float], first: &[Float], third: &[Float], betas: [Float; 3]) {
    for ((x, &a), &c) in out.iter_mut().zip(first).zip(third) {
        *x = betas[0] * a + betas[1] * *x + betas[2] * c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::model::Link;
    use pretty_assertions::assert_eq;

    fn fixture() -> (Graph, DemandMatrix) {
        let links = vec![
            Link::new(LinkId(7), NodeId(1), NodeId(2))
                .with_direction(Direction::Both)
                .with_symmetric_field("t", 1.0),
        ];
        let g = GraphBuilder::new(&links).centroids(&[NodeId(1), NodeId(2)]).build().unwrap();
        let m = DemandMatrix::new(vec![NodeId(1), NodeId(2)], vec!["a".into(), "b".into()]).unwrap();
        (g, m)
    }

    #[test]
    fn totals_sum_over_cores() {
        let (g, m) = fixture();
        let mut r = AssignmentResults::prepare(&g, &m);
        r.link_loads.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        r.total_flows();
        assert_eq!(r.total_link_loads, vec![3.0, 7.0]);
        r.reset();
        assert_eq!(r.total_link_loads, vec![0.0, 0.0]);
    }

    #[test]
    fn load_is_none_out_of_range() {
        let (g, m) = fixture();
        let mut r = AssignmentResults::prepare(&g, &m);
        r.link_loads.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.load(1, 0), Some(3.0));
        assert_eq!(r.load(1, 1), Some(4.0));
        assert_eq!(r.load(2, 0), None);
        assert_eq!(r.load(0, 2), None);
    }

    #[test]
    fn combinations_weight_each_operand() {
        let (g, m) = fixture();
        let mut x = AssignmentResults::prepare(&g, &m);
        let mut y = AssignmentResults::prepare(&g, &m);
        let mut z = AssignmentResults::prepare(&g, &m);
        x.link_loads.fill(10.0);
        y.link_loads.fill(20.0);
        z.link_loads.fill(40.0);

        x.linear_combination(&y, 0.25);
        assert_eq!(x.link_loads, vec![17.5; 4]);

        x.link_loads.fill(10.0);
        x.triple_linear_combination(&y, &z, [0.5, 0.25, 0.25]);
        assert_eq!(x.link_loads, vec![22.5; 4]);
        assert_eq!(x.total_link_loads, vec![45.0, 45.0]);
    }

    #[test]
    fn link_results_split_directions() {
        let (g, m) = fixture();
        let mut r = AssignmentResults::prepare(&g, &m);
        for (e, edge) in g.edges().iter().enumerate() {
            let v = if edge.direction == Direction::AB { 5.0 } else { 2.0 };
            r.link_loads[e * 2] = v;
        }
        let loads = r.link_results(&g);
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].ab, vec![5.0, 0.0]);
        assert_eq!(loads[0].ba, vec![2.0, 0.0]);
        assert_eq!(loads[0].tot, vec![7.0, 0.0]);
    }
}
