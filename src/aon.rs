//! All-or-nothing loading.
//!
//! Every origin's demand goes entirely onto its shortest-path tree. Loads are
//! pushed back through the tree in reverse settle order, so each origin costs
//! one Dijkstra run plus one pass over its settled nodes, whatever the number
//! of destinations.

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, warn};

use crate::constants::{ix, Float, NULL_INDEX};
use crate::graph::Graph;
use crate::matrix::DemandMatrix;
use crate::model::NodeId;
use crate::results::AssignmentResults;
use crate::shortest_path::ShortestPathResult;
use crate::{Error, Result};

/// Load `matrix` onto `graph` with current costs, using `cores` threads.
///
/// `results` is reset first.
pub fn all_or_nothing(
    graph: &Graph,
    matrix: &DemandMatrix,
    results: &mut AssignmentResults,
    cores: usize,
) -> Result<()> {
    let pool = build_pool(cores)?;
    load(&pool, graph, matrix, results)
}

pub(crate) fn build_pool(cores: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(cores.max(1))
        .build()
        .map_err(|e| Error::Config(format!("could not start worker pool: {e}")))
}

/// Per-worker accumulator.
struct Partial {
    loads: Vec<Float>,
    no_path: Vec<(NodeId, NodeId)>,
    skim_rows: Vec<(usize, Vec<Float>)>,
}

impl Partial {
    fn new(size: usize) -> Self {
        Self { loads: vec![0.0; size], no_path: Vec::new(), skim_rows: Vec::new() }
    }

    fn merge(mut self, other: Partial) -> Self {
        for (a, b) in self.loads.iter_mut().zip(other.loads) {
            *a += b;
        }
        self.no_path.extend(other.no_path);
        self.skim_rows.extend(other.skim_rows);
        self
    }

    fn add_origin(&mut self, graph: &Graph, matrix: &DemandMatrix, origin: usize) -> Result<()> {
        let zones = matrix.zones();
        let sp = ShortestPathResult::compute(graph, zones[origin])?;
        let k = matrix.num_cores();
        let n = graph.num_nodes();

        let mut node_load = vec![0.0; n * k];
        for d in 0..zones.len() {
            let demand_present = (0..k).any(|c| matrix.row(c, origin)[d] > 0.0);
            if !demand_present || d == origin {
                continue;
            }
            // Zone positions coincide with graph node positions.
            if sp.predecessors[d] == NULL_INDEX {
                self.no_path.push((zones[origin], zones[d]));
                continue;
            }
            for c in 0..k {
                node_load[d * k + c] += matrix.row(c, origin)[d];
            }
        }

        for &node in sp.settled.iter().rev() {
            let u = ix(node);
            let conn = sp.connectors[u];
            if conn == NULL_INDEX {
                continue;
            }
            let pred = ix(sp.predecessors[u]);
            for c in 0..k {
                let v = node_load[u * k + c];
                if v == 0.0 {
                    continue;
                }
                self.loads[ix(conn) * k + c] += v;
                node_load[pred * k + c] += v;
            }
        }

        if !graph.skim_fields().is_empty() {
            let f = graph.skim_fields().len();
            let mut row = vec![0.0; zones.len() * f];
            for d in 0..zones.len() {
                for (fi, column) in sp.skims.iter().enumerate() {
                    row[d * f + fi] = column[d];
                }
            }
            self.skim_rows.push((origin, row));
        }
        Ok(())
    }
}

pub(crate) fn load(
    pool: &ThreadPool,
    graph: &Graph,
    matrix: &DemandMatrix,
    results: &mut AssignmentResults,
) -> Result<()> {
    if matrix.zones() != graph.centroids() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} graph centroids", graph.num_zones()),
            got: format!("{} matrix zones in a different order or set", matrix.num_zones()),
        });
    }
    if results.num_edges() != graph.num_edges() || results.num_cores() != matrix.num_cores() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} edges x {} cores", graph.num_edges(), matrix.num_cores()),
            got: format!("{} edges x {} cores", results.num_edges(), results.num_cores()),
        });
    }

    let skimming = !graph.skim_fields().is_empty();
    let origins: Vec<usize> = (0..matrix.num_zones())
        .filter(|&o| skimming || matrix.has_demand_from(o))
        .collect();
    let size = graph.num_edges() * matrix.num_cores();

    let partial = pool.install(|| {
        origins
            .par_iter()
            .try_fold(
                || Partial::new(size),
                |mut acc, &o| {
                    acc.add_origin(graph, matrix, o)?;
                    Ok::<_, Error>(acc)
                },
            )
            .try_reduce(|| Partial::new(size), |a, b| Ok(a.merge(b)))
    })?;

    results.reset();
    results.link_loads.copy_from_slice(&partial.loads);
    results.total_flows();
    if let Some(skims) = results.skims.as_mut() {
        for (o, row) in partial.skim_rows {
            skims.origin_block_mut(o).copy_from_slice(&row);
        }
    }

    let mut no_path = partial.no_path;
    no_path.sort();
    if !no_path.is_empty() {
        warn!(pairs = no_path.len(), "demand between disconnected zones was not assigned");
    }
    results.no_path = no_path;

    debug!(origins = origins.len(), threads = pool.current_num_threads(), "all-or-nothing load finished");
    Ok(())
}
