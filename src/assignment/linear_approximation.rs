//! Linear-approximation equilibrium solvers: MSA, Frank-Wolfe, conjugate and
//! biconjugate Frank-Wolfe.
//!
//! All four share one loop. They differ only in how the step direction is
//! built from the all-or-nothing solution and in how far to move along it.

use rayon::ThreadPool;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use super::observer::{AssignmentEvent, AssignmentObserver};
use super::report::{ConvergenceReport, IterationRecord};
use super::{Algorithm, TrafficClass};
use crate::aon;
use crate::constants::{Float, EPSILON, INFINITE};
use crate::results::AssignmentResults;
use crate::vdf::{ResolvedParameters, Vdf};
use crate::Result;

/// Upper bound of the conjugate weight; at 1.0 the direction would never change.
const CONJUGATE_DIRECTION_MAX: Float = 0.99999;

const LINE_SEARCH_TOLERANCE: Float = 2e-12;
const LINE_SEARCH_MAX_ITER: usize = 200;

const BAD_CONJUGATE_STEP: &str = "Found bad conjugate direction step. Performing FW search";

/// Step directions kept per class.
struct Directions {
    step: AssignmentResults,
    previous: AssignmentResults,
    pre_previous: AssignmentResults,
}

pub(super) struct LinearApproximation<'a> {
    algorithm: Algorithm,
    vdf: Vdf,
    params: &'a ResolvedParameters,
    capacity: &'a [Float],
    free_flow_tt: &'a [Float],
    time_field: &'a str,
    pool: ThreadPool,
    pub(super) observer: Option<&'a dyn AssignmentObserver>,

    pub(super) max_iter: usize,
    pub(super) rgap_target: Float,
    pub(super) steps_below_needed_to_terminate: usize,

    pub(super) iter: usize,
    pub(super) rgap: Float,
    stepsize: Float,
    conjugate_stepsize: Float,
    betas: [Float; 3],
    steps_below: usize,
    do_fw_step: bool,
    do_conjugate_step: bool,
    conjugate_failed: bool,
    iteration_issue: SmallVec<[String; 2]>,

    directions: Vec<Directions>,
    fw_total_flow: Vec<Float>,
    aon_total_flow: Vec<Float>,
    step_direction_flow: Vec<Float>,
    congested_time: Vec<Float>,
    congested_value: Vec<Float>,
    vdf_der: Vec<Float>,
}

impl<'a> LinearApproximation<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        algorithm: Algorithm,
        vdf: Vdf,
        params: &'a ResolvedParameters,
        capacity: &'a [Float],
        free_flow_tt: &'a [Float],
        time_field: &'a str,
        classes: &[TrafficClass],
        cores: usize,
    ) -> Result<Self> {
        let n = capacity.len();
        let directions = classes
            .iter()
            .map(|c| Directions {
                step: c.results.clone(),
                previous: c.results.clone(),
                pre_previous: c.results.clone(),
            })
            .collect();

        Ok(Self {
            algorithm,
            vdf,
            params,
            capacity,
            free_flow_tt,
            time_field,
            pool: aon::build_pool(cores)?,
            observer: None,
            max_iter: super::DEFAULT_MAX_ITER,
            rgap_target: super::DEFAULT_RGAP_TARGET,
            steps_below_needed_to_terminate: 1,
            iter: 0,
            rgap: INFINITE,
            stepsize: 1.0,
            conjugate_stepsize: 0.0,
            betas: [1.0, 0.0, 0.0],
            steps_below: 0,
            do_fw_step: false,
            do_conjugate_step: false,
            conjugate_failed: false,
            iteration_issue: SmallVec::new(),
            directions,
            fw_total_flow: vec![0.0; n],
            aon_total_flow: vec![0.0; n],
            step_direction_flow: vec![0.0; n],
            congested_time: free_flow_tt.to_vec(),
            congested_value: vec![0.0; n],
            vdf_der: vec![0.0; n],
        })
    }

    /// Final congested times and total flows.
    pub(super) fn into_flows(self) -> (Vec<Float>, Vec<Float>) {
        (self.congested_time, self.fw_total_flow)
    }

    fn notify(&self, event: AssignmentEvent) {
        if let Some(obs) = self.observer {
            obs.on_event(event);
        }
    }

    pub(super) fn execute(&mut self, classes: &mut [TrafficClass]) -> Result<ConvergenceReport> {
        let mut report = ConvergenceReport::default();
        info!(algorithm = %self.algorithm, "iteration, relative gap, stepsize");

        for iter in 1..=self.max_iter {
            self.iter = iter;
            self.iteration_issue.clear();
            self.notify(AssignmentEvent::RelativeGap(self.rgap));
            self.notify(AssignmentEvent::Iteration(iter));

            self.aon_total_flow.fill(0.0);
            for class in classes.iter_mut() {
                aon::load(&self.pool, &class.graph, &class.matrix, &mut class.aon_results)?;
                add_scaled(&mut self.aon_total_flow, &class.aon_results.total_link_loads, class.pce);
            }

            if iter == 1 {
                for class in classes.iter_mut() {
                    class.results.copy_from(&class.aon_results);
                }
            } else {
                self.calculate_step_direction(classes)?;
                self.calculate_stepsize(classes)?;
                for (class, dirs) in classes.iter_mut().zip(&self.directions) {
                    class.results.linear_combination(&dirs.step, 1.0 - self.stepsize);
                }
            }

            self.fw_total_flow.fill(0.0);
            for class in classes.iter() {
                add_scaled(&mut self.fw_total_flow, &class.results.total_link_loads, class.pce);
            }

            // Gap uses the costs the AoN just saw, not the updated ones.
            let converged = iter > 1 && self.check_convergence();

            report.push(IterationRecord {
                iteration: iter,
                rgap: self.rgap,
                alpha: self.stepsize,
                warnings: self.iteration_issue.clone(),
                betas: (self.algorithm == Algorithm::Bfw).then_some(self.betas),
            });
            info!(iteration = iter, rgap = self.rgap, stepsize = self.stepsize);

            if converged {
                if self.steps_below >= self.steps_below_needed_to_terminate {
                    break;
                }
                self.steps_below += 1;
            }

            self.update_costs(classes)?;
        }

        self.update_costs(classes)?;
        Ok(report)
    }

    /// Push congested times from the current total flow into every class graph.
    fn update_costs(&mut self, classes: &mut [TrafficClass]) -> Result<()> {
        self.vdf.apply_vdf(
            &mut self.congested_time,
            &self.fw_total_flow,
            self.capacity,
            self.free_flow_tt,
            self.params,
        )?;
        for class in classes.iter_mut() {
            class.graph.set_cost(&self.congested_time)?;
            if class.graph.skim_fields().iter().any(|f| f == self.time_field) {
                class.graph.set_skim_field(self.time_field, &self.congested_time)?;
            }
        }
        Ok(())
    }

    fn check_convergence(&mut self) -> bool {
        let aon_cost = dot(&self.congested_time, &self.aon_total_flow);
        let current_cost = dot(&self.congested_time, &self.fw_total_flow);
        self.rgap = if current_cost <= EPSILON {
            0.0
        } else {
            (current_cost - aon_cost).abs() / current_cost
        };
        self.rgap_target >= self.rgap
    }

    // ========================================================================
    // Step direction
    // ========================================================================

    fn calculate_step_direction(&mut self, classes: &[TrafficClass]) -> Result<()> {
        let fw_step = self.iter == 2
            || self.stepsize == 1.0
            || self.do_fw_step
            || matches!(self.algorithm, Algorithm::FrankWolfe | Algorithm::Msa);

        if fw_step {
            // A full step replaced the solution: start the conjugate sequence anew.
            self.do_fw_step = false;
            self.do_conjugate_step = true;
            self.conjugate_stepsize = 0.0;
            for (class, dirs) in classes.iter().zip(self.directions.iter_mut()) {
                dirs.step.copy_from(&class.aon_results);
            }
        } else if self.iter == 3 || self.do_conjugate_step || self.algorithm == Algorithm::Cfw {
            self.do_conjugate_step = false;
            self.calculate_conjugate_stepsize(classes)?;
            for (class, dirs) in classes.iter().zip(self.directions.iter_mut()) {
                dirs.previous.copy_from(&dirs.step);
                dirs.step.linear_combination(&class.aon_results, self.conjugate_stepsize);
            }
        } else {
            self.calculate_biconjugate_direction(classes)?;
            for (class, dirs) in classes.iter().zip(self.directions.iter_mut()) {
                dirs.pre_previous.copy_from(&dirs.step);
                dirs.step.triple_linear_combination(&class.aon_results, &dirs.previous, self.betas);
                dirs.previous.copy_from(&dirs.pre_previous);
            }
        }

        self.step_direction_flow.fill(0.0);
        for (class, dirs) in classes.iter().zip(&self.directions) {
            add_scaled(&mut self.step_direction_flow, &dirs.step.total_link_loads, class.pce);
        }
        Ok(())
    }

    fn pce_weighted(&self, classes: &[TrafficClass], pick: impl Fn(&Directions) -> &AssignmentResults) -> Vec<Float> {
        let mut out = vec![0.0; self.capacity.len()];
        for (class, dirs) in classes.iter().zip(&self.directions) {
            add_scaled(&mut out, &pick(dirs).total_link_loads, class.pce);
        }
        out
    }

    fn refresh_derivative(&mut self) -> Result<()> {
        self.vdf.apply_derivative(
            &mut self.vdf_der,
            &self.fw_total_flow,
            self.capacity,
            self.free_flow_tt,
            self.params,
        )
    }

    fn calculate_conjugate_stepsize(&mut self, classes: &[TrafficClass]) -> Result<()> {
        self.refresh_derivative()?;
        let sd = self.pce_weighted(classes, |d| &d.step);
        let x = &self.fw_total_flow;
        let aon = &self.aon_total_flow;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for e in 0..x.len() {
            let sd_minus_x = sd[e] - x[e];
            numerator += self.vdf_der[e] * sd_minus_x * (aon[e] - x[e]);
            denominator += self.vdf_der[e] * sd_minus_x * (aon[e] - sd[e]);
        }

        let alpha = finite_or_zero(numerator / denominator);
        self.conjugate_stepsize = alpha.clamp(0.0, CONJUGATE_DIRECTION_MAX);
        debug!(conjugate_stepsize = self.conjugate_stepsize, "conjugate direction");
        Ok(())
    }

    fn calculate_biconjugate_direction(&mut self, classes: &[TrafficClass]) -> Result<()> {
        self.refresh_derivative()?;
        let sd = self.pce_weighted(classes, |d| &d.step);
        let prev = self.pce_weighted(classes, |d| &d.previous);
        let x = &self.fw_total_flow;
        let aon = &self.aon_total_flow;
        let tau = self.stepsize;

        let (mut mu_num, mut mu_den, mut nu_num, mut nu_den) = (0.0, 0.0, 0.0, 0.0);
        for e in 0..x.len() {
            let d = self.vdf_der[e];
            let x_ = tau * sd[e] + (1.0 - tau) * prev[e] - x[e];
            let y_ = aon[e] - x[e];
            let z_ = sd[e] - x[e];
            mu_num += d * x_ * y_;
            mu_den += d * x_ * (prev[e] - sd[e]);
            nu_num += d * z_ * y_;
            nu_den += d * z_ * z_;
        }

        let mu = finite_or_zero(-mu_num / mu_den).max(0.0);
        let nu = finite_or_zero(-(nu_num / nu_den) + mu * tau / (1.0 - tau)).max(0.0);

        self.betas[0] = 1.0 / (1.0 + nu + mu);
        self.betas[1] = nu * self.betas[0];
        self.betas[2] = mu * self.betas[0];
        debug!(beta0 = self.betas[0], beta1 = self.betas[1], beta2 = self.betas[2], "biconjugate direction");
        Ok(())
    }

    // ========================================================================
    // Step size
    // ========================================================================

    /// Derivative of the Beckmann objective along the step direction at `tau`.
    fn derivative_of_objective(&mut self, tau: Float) -> Result<Float> {
        let n = self.fw_total_flow.len();
        let x: Vec<Float> = (0..n)
            .map(|e| self.fw_total_flow[e] + tau * (self.step_direction_flow[e] - self.fw_total_flow[e]))
            .collect();
        self.vdf.apply_vdf(&mut self.congested_value, &x, self.capacity, self.free_flow_tt, self.params)?;
        Ok((0..n)
            .map(|e| self.congested_value[e] * (self.step_direction_flow[e] - self.fw_total_flow[e]))
            .sum())
    }

    fn calculate_stepsize(&mut self, classes: &[TrafficClass]) -> Result<()> {
        if self.algorithm == Algorithm::Msa {
            self.stepsize = 1.0 / self.iter as Float;
            return Ok(());
        }

        let f0 = self.derivative_of_objective(0.0)?;
        let f1 = self.derivative_of_objective(1.0)?;

        match bracketed_root(f0, f1, |t| self.derivative_of_objective(t))? {
            Some((root, converged)) => {
                if !converged {
                    warn!("descent direction stepsize finder did not converge");
                }
                self.stepsize = root;
                self.conjugate_failed = false;
            }
            None => {
                // No sign change on [0, 1]: the objective is monotone along the direction.
                if self.algorithm == Algorithm::Bfw {
                    self.betas = [-1.0; 3];
                }
                match no_bracket_step(f0, f1, self.algorithm, self.conjugate_failed) {
                    NoBracketStep::Full => self.stepsize = 1.0,
                    NoBracketStep::Msa => {
                        let msa_step = 1.0 / self.iter as Float;
                        warn!(msa_step, "adding MSA step to keep the stepsize non-zero");
                        self.stepsize = msa_step;
                    }
                    NoBracketStep::ResetToFw => {
                        self.stepsize = 0.0;
                        self.do_fw_step = true;
                        self.conjugate_failed = true;
                        self.iteration_issue.push(BAD_CONJUGATE_STEP.to_string());
                        // Same AoN, plain FW direction.
                        self.calculate_step_direction(classes)?;
                        return self.calculate_stepsize(classes);
                    }
                }
            }
        }

        debug_assert!((0.0..=1.0).contains(&self.stepsize));
        self.stepsize = self.stepsize.clamp(0.0, 1.0);
        Ok(())
    }
}

/// Step taken when the objective derivative keeps one sign on `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoBracketStep {
    Full,
    Msa,
    ResetToFw,
}

/// A derivative that does not grow along the direction means the objective
/// is flat or decreasing up to `tau = 1`; otherwise the direction is suspect.
fn no_bracket_step(f0: Float, f1: Float, algorithm: Algorithm, conjugate_failed: bool) -> NoBracketStep {
    if f0 >= f1 {
        NoBracketStep::Full
    } else if algorithm == Algorithm::FrankWolfe || conjugate_failed {
        NoBracketStep::Msa
    } else {
        NoBracketStep::ResetToFw
    }
}

/// Bisection for the root of an increasing function on `[0, 1]`.
///
/// Returns `None` when `f(0)` and `f(1)` share a sign, otherwise the root
/// and whether the tolerance was met.
fn bracketed_root<F>(f0: Float, f1: Float, mut f: F) -> Result<Option<(Float, bool)>>
where
    F: FnMut(Float) -> Result<Float>,
{
    if f0 == 0.0 {
        return Ok(Some((0.0, true)));
    }
    if f1 == 0.0 {
        return Ok(Some((1.0, true)));
    }
    if f0.signum() == f1.signum() {
        return Ok(None);
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    let lo_negative = f0 < 0.0;
    for _ in 0..LINE_SEARCH_MAX_ITER {
        let mid = 0.5 * (lo + hi);
        let fm = f(mid)?;
        if fm == 0.0 {
            return Ok(Some((mid, true)));
        }
        if (fm < 0.0) == lo_negative {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < LINE_SEARCH_TOLERANCE {
            return Ok(Some((0.5 * (lo + hi), true)));
        }
    }
    Ok(Some((0.5 * (lo + hi), false)))
}

/// Degenerate conjugate terms (zero denominators, infinite VDF slopes at
/// zero flow) fall back to a plain direction.
fn finite_or_zero(v: Float) -> Float {
    if v.is_finite() { v } else { 0.0 }
}

fn add_scaled(out: &mut [Float], values: &[Float], scale: Float) {
    for (o, v) in out.iter_mut().zip(values) {
        *o += v * scale;
    }
}

fn dot(a: &[Float], b: &[Float]) -> Float {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
