//! A traffic class: one mode's graph plus the demand that travels on it.

use crate::constants::Float;
use crate::graph::Graph;
use crate::matrix::DemandMatrix;
use crate::results::AssignmentResults;
use crate::{Error, Result};

/// Demand of one user class and the graph it is loaded onto.
#[derive(Debug, Clone)]
pub struct TrafficClass {
    pub name: String,
    pub graph: Graph,
    pub matrix: DemandMatrix,
    /// Passenger-car equivalent of one unit of this class's demand.
    pub pce: Float,
    /// Equilibrium loads, filled by the assignment.
    pub results: AssignmentResults,
    pub(crate) aon_results: AssignmentResults,
}

impl TrafficClass {
    pub fn new(name: impl Into<String>, graph: Graph, matrix: DemandMatrix) -> Result<Self> {
        if matrix.zones() != graph.centroids() {
            return Err(Error::DimensionMismatch {
                expected: format!("matrix zones equal to the {} graph centroids", graph.num_zones()),
                got: format!("{} matrix zones", matrix.num_zones()),
            });
        }
        let results = AssignmentResults::prepare(&graph, &matrix);
        let aon_results = results.clone();
        Ok(Self { name: name.into(), graph, matrix, pce: 1.0, results, aon_results })
    }

    pub fn with_pce(mut self, pce: Float) -> Result<Self> {
        if !pce.is_finite() || pce <= 0.0 {
            return Err(Error::Config(format!("PCE for class '{}' must be positive, got {pce}", self.name)));
        }
        self.pce = pce;
        Ok(self)
    }

    /// Loads of the last all-or-nothing run.
    pub fn aon_results(&self) -> &AssignmentResults {
        &self.aon_results
    }

    /// Re-size both result sets, e.g. after changing skim fields.
    pub(crate) fn prepare_results(&mut self) {
        self.results = AssignmentResults::prepare(&self.graph, &self.matrix);
        self.aon_results = self.results.clone();
    }
}
