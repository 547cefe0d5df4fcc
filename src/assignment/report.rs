//! Convergence bookkeeping returned by an assignment run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::SmallVec;

use super::Algorithm;
use crate::constants::Float;

/// One row of the convergence table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub rgap: Float,
    /// Step size applied in this iteration.
    pub alpha: Float,
    pub warnings: SmallVec<[String; 2]>,
    /// Biconjugate weights, recorded for BFW only.
    pub betas: Option<[Float; 3]>,
}

/// Iteration-by-iteration history of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub rows: Vec<IterationRecord>,
}

impl ConvergenceReport {
    pub fn push(&mut self, record: IterationRecord) {
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.rows.last()
    }

    /// True when any iteration recorded BFW weights.
    pub fn has_betas(&self) -> bool {
        self.rows.iter().any(|r| r.betas.is_some())
    }
}

/// Outcome of [`TrafficAssignment::execute`](super::TrafficAssignment::execute).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentReport {
    pub algorithm: Algorithm,
    pub iterations: usize,
    pub rgap: Float,
    pub rgap_target: Float,
    pub converged: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub convergence: ConvergenceReport,
}

impl AssignmentReport {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
