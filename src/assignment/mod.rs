//! # Static Traffic Assignment
//!
//! Loads the demand of one or more traffic classes onto their graphs until
//! no traveller can reduce their travel time by switching path.
//!
//! ```text
//! TrafficAssignment ── validate ──▶ LinearApproximation
//!        │                               │  per iteration:
//!        │ classes (graph + matrix)      │   AoN → direction → step → loads
//!        │ vdf + parameters              │   rgap, VDF update
//!        ▼                               ▼
//!   TrafficClass.results           AssignmentReport
//! ```

mod linear_approximation;
pub mod observer;
pub mod report;
pub mod traffic_class;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::AssignmentConfig;
use crate::constants::Float;
use crate::results::LinkLoad;
use crate::vdf::{ResolvedParameters, Vdf, VdfParameter};
use crate::{Error, Result};
use linear_approximation::LinearApproximation;

pub use observer::{AssignmentEvent, AssignmentObserver, ProgressLog};
pub use report::{AssignmentReport, ConvergenceReport, IterationRecord};
pub use traffic_class::TrafficClass;

// ============================================================================
// Algorithm
// ============================================================================

/// Equilibrium algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    AllOrNothing,
    Msa,
    FrankWolfe,
    Cfw,
    Bfw,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all-or-nothing" => Ok(Algorithm::AllOrNothing),
            "msa" => Ok(Algorithm::Msa),
            "frank-wolfe" | "fw" => Ok(Algorithm::FrankWolfe),
            "cfw" => Ok(Algorithm::Cfw),
            "bfw" => Ok(Algorithm::Bfw),
            _ => Err(Error::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Algorithm> for String {
    fn from(a: Algorithm) -> String {
        a.to_string()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::AllOrNothing => "all-or-nothing",
            Algorithm::Msa => "msa",
            Algorithm::FrankWolfe => "frank-wolfe",
            Algorithm::Cfw => "cfw",
            Algorithm::Bfw => "bfw",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TrafficAssignment
// ============================================================================

pub const DEFAULT_MAX_ITER: usize = 250;
pub const DEFAULT_RGAP_TARGET: Float = 1e-4;

/// Configures and runs an equilibrium assignment.
pub struct TrafficAssignment {
    classes: Vec<TrafficClass>,
    vdf: Option<Vdf>,
    vdf_parameters: Option<HashMap<String, VdfParameter>>,
    capacity_field: Option<String>,
    time_field: Option<String>,
    algorithm: Option<Algorithm>,
    max_iter: usize,
    rgap_target: Float,
    cores: usize,
    steps_below_needed_to_terminate: usize,
    observer: Option<Arc<dyn AssignmentObserver>>,
    congested_time: Vec<Float>,
    total_flow: Vec<Float>,
}

impl Default for TrafficAssignment {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficAssignment {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            vdf: None,
            vdf_parameters: None,
            capacity_field: None,
            time_field: None,
            algorithm: None,
            max_iter: DEFAULT_MAX_ITER,
            rgap_target: DEFAULT_RGAP_TARGET,
            cores: crate::config::default_cores(),
            steps_below_needed_to_terminate: 1,
            observer: None,
            congested_time: Vec::new(),
            total_flow: Vec::new(),
        }
    }

    /// Apply everything in `config`. Classes are still added separately.
    pub fn from_config(config: AssignmentConfig) -> Self {
        let mut ta = Self::new();
        ta.set_algorithm(config.algorithm);
        ta.set_vdf(config.vdf);
        ta.set_vdf_parameters(config.vdf_parameters);
        ta.set_capacity_field(config.capacity_field);
        ta.set_time_field(config.time_field);
        ta.set_max_iter(config.max_iter);
        ta.set_rgap_target(config.rgap_target);
        ta.set_cores(config.cores);
        ta.set_steps_below_needed_to_terminate(config.steps_below_needed_to_terminate);
        ta
    }

    pub fn add_class(&mut self, class: TrafficClass) {
        self.classes.push(class);
    }

    pub fn set_vdf(&mut self, vdf: Vdf) {
        self.vdf = Some(vdf);
    }

    pub fn set_vdf_parameters<K, P>(&mut self, params: impl IntoIterator<Item = (K, P)>)
    where
        K: Into<String>,
        P: Into<VdfParameter>,
    {
        self.vdf_parameters = Some(params.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
    }

    pub fn set_capacity_field(&mut self, field: impl Into<String>) {
        self.capacity_field = Some(field.into());
    }

    pub fn set_time_field(&mut self, field: impl Into<String>) {
        self.time_field = Some(field.into());
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = Some(algorithm);
    }

    pub fn set_max_iter(&mut self, max_iter: usize) {
        self.max_iter = max_iter;
    }

    pub fn set_rgap_target(&mut self, rgap_target: Float) {
        self.rgap_target = rgap_target;
    }

    pub fn set_cores(&mut self, cores: usize) {
        self.cores = cores;
    }

    /// How many times the gap must be under target before stopping.
    pub fn set_steps_below_needed_to_terminate(&mut self, steps: usize) {
        self.steps_below_needed_to_terminate = steps;
    }

    pub fn set_observer(&mut self, observer: Arc<dyn AssignmentObserver>) {
        self.observer = Some(observer);
    }

    pub fn classes(&self) -> &[TrafficClass] {
        &self.classes
    }

    pub fn class(&self, name: &str) -> Option<&TrafficClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Edge travel times at the final flows.
    pub fn congested_time(&self) -> &[Float] {
        &self.congested_time
    }

    /// PCE-weighted flow over all classes, per edge.
    pub fn total_flow(&self) -> &[Float] {
        &self.total_flow
    }

    /// Per-link loads of one class.
    pub fn link_results(&self, class: &str) -> Option<Vec<LinkLoad>> {
        self.class(class).map(|c| c.results.link_results(&c.graph))
    }

    fn missing_parameters(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.classes.is_empty() { missing.push("traffic classes".to_string()); }
        if self.vdf.is_none() { missing.push("VDF".to_string()); }
        if self.vdf_parameters.is_none() { missing.push("VDF parameters".to_string()); }
        if self.capacity_field.is_none() { missing.push("capacity field".to_string()); }
        if self.time_field.is_none() { missing.push("time field".to_string()); }
        if self.algorithm.is_none() { missing.push("algorithm".to_string()); }
        missing
    }

    /// Validate the setup and run the assignment to equilibrium.
    pub fn execute(&mut self) -> Result<AssignmentReport> {
        let missing = self.missing_parameters();
        let (Some(vdf), Some(params), Some(cap_field), Some(time_field), Some(algorithm)) = (
            self.vdf,
            self.vdf_parameters.as_ref(),
            self.capacity_field.clone(),
            self.time_field.clone(),
            self.algorithm,
        ) else {
            return Err(Error::MissingParameter(missing));
        };
        if !missing.is_empty() {
            return Err(Error::MissingParameter(missing));
        }

        if self.max_iter == 0 {
            return Err(Error::Config("max_iter must be at least 1".into()));
        }
        if !(self.rgap_target > 0.0) {
            return Err(Error::Config(format!("rgap_target must be positive, got {}", self.rgap_target)));
        }
        if self.cores == 0 {
            return Err(Error::Config("cores must be at least 1".into()));
        }

        let num_edges = self.classes[0].graph.num_edges();
        if let Some(c) = self.classes.iter().find(|c| c.graph.num_edges() != num_edges) {
            return Err(Error::DimensionMismatch {
                expected: format!("{num_edges} edges in every class graph"),
                got: format!("{} edges in class '{}'", c.graph.num_edges(), c.name),
            });
        }

        let reference = &self.classes[0].graph;
        let capacity = reference
            .field(&cap_field)
            .ok_or_else(|| Error::UnknownField(cap_field.clone()))?
            .to_vec();
        let free_flow_tt = reference
            .field(&time_field)
            .ok_or_else(|| Error::UnknownField(time_field.clone()))?
            .to_vec();
        if let Some((e, &v)) = capacity.iter().enumerate().find(|(_, v)| !v.is_finite() || **v <= 0.0) {
            return Err(Error::InvalidCost { field: cap_field, edge: e, value: v });
        }
        if let Some((e, &v)) = free_flow_tt.iter().enumerate().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(Error::InvalidCost { field: time_field, edge: e, value: v });
        }

        let mut resolved = Vec::with_capacity(2);
        for name in vdf.parameter_names() {
            let param = params
                .get(*name)
                .ok_or_else(|| Error::MissingParameter(vec![format!("VDF parameter '{name}'")]))?;
            resolved.push(param.resolve(reference)?);
        }
        let beta = resolved.pop().unwrap_or_default();
        let alpha = resolved.pop().unwrap_or_default();
        let resolved = ResolvedParameters { alpha, beta };

        for class in &mut self.classes {
            class.graph.set_graph(&time_field)?;
            // Skim columns may hold congested times from an earlier run.
            let skim_fields = class.graph.skim_fields().to_vec();
            class.graph.set_skimming(&skim_fields)?;
            class.prepare_results();
        }

        let max_iter = if algorithm == Algorithm::AllOrNothing { 1 } else { self.max_iter };
        let started_at = Utc::now();
        info!(%algorithm, classes = self.classes.len(), edges = num_edges, "assignment started");

        let mut la = LinearApproximation::new(
            algorithm,
            vdf,
            &resolved,
            &capacity,
            &free_flow_tt,
            &time_field,
            &self.classes,
            self.cores,
        )?;
        la.max_iter = max_iter;
        la.rgap_target = self.rgap_target;
        la.steps_below_needed_to_terminate = self.steps_below_needed_to_terminate;
        la.observer = self.observer.as_deref();

        let convergence = la.execute(&mut self.classes)?;
        let (iterations, rgap) = (la.iter, la.rgap);
        let (congested_time, total_flow) = la.into_flows();
        self.congested_time = congested_time;
        self.total_flow = total_flow;

        let converged = rgap <= self.rgap_target;
        if !converged && algorithm != Algorithm::AllOrNothing {
            error!(target_rgap = self.rgap_target, rgap, "desired relative gap was NOT reached");
        }
        info!(%algorithm, iterations, rgap, "assignment finished");
        if let Some(obs) = &self.observer {
            obs.on_event(AssignmentEvent::RelativeGap(rgap));
            obs.on_event(AssignmentEvent::Iteration(iterations));
            obs.on_event(AssignmentEvent::Finished);
        }

        Ok(AssignmentReport {
            algorithm,
            iterations,
            rgap,
            rgap_target: self.rgap_target,
            converged,
            started_at,
            finished_at: Utc::now(),
            convergence,
        })
    }
}
