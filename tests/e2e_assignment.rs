//! End-to-end tests for equilibrium assignment.
//!
//! Each test builds a small network, loads demand, runs an algorithm through
//! `TrafficAssignment::execute`, and checks the equilibrium conditions.

use std::sync::Arc;

use aeq_paths::export::{export_convergence_report, export_link_loads, report_to_json};
use aeq_paths::{
    Algorithm, AssignmentConfig, AssignmentEvent, DemandMatrix, Error, Float, GraphBuilder,
    Link, LinkId, NodeId, ProgressLog, TrafficAssignment, TrafficClass, Vdf, VdfParameter,
    INFINITE,
};

// ============================================================================
// Helper: two parallel roads between zone 1 and zone 2.
//
//   link 1: free-flow 10, capacity 200
//   link 2: free-flow 15, capacity 300
// ============================================================================

fn two_route_links() -> Vec<Link> {
    vec![
        Link::new(LinkId(1), NodeId(1), NodeId(2))
            .with_symmetric_field("free_flow_time", 10.0)
            .with_symmetric_field("capacity", 200.0),
        Link::new(LinkId(2), NodeId(1), NodeId(2))
            .with_symmetric_field("free_flow_time", 15.0)
            .with_symmetric_field("capacity", 300.0),
    ]
}

fn class_with_demand(name: &str, demand: Float) -> TrafficClass {
    let links = two_route_links();
    let zones = [NodeId(1), NodeId(2)];
    let graph = GraphBuilder::new(&links).centroids(&zones).build().unwrap();
    let mut matrix = DemandMatrix::new(zones.to_vec(), vec!["demand".into()]).unwrap();
    matrix.set("demand", NodeId(1), NodeId(2), demand).unwrap();
    TrafficClass::new(name, graph, matrix).unwrap()
}

fn configured(algorithm: Algorithm) -> TrafficAssignment {
    let mut ta = TrafficAssignment::new();
    ta.set_vdf(Vdf::Bpr);
    ta.set_vdf_parameters([
        ("alpha", VdfParameter::Value(0.15)),
        ("beta", VdfParameter::Value(4.0)),
    ]);
    ta.set_capacity_field("capacity");
    ta.set_time_field("free_flow_time");
    ta.set_algorithm(algorithm);
    ta.set_cores(2);
    ta
}

fn bpr(fftt: Float, cap: Float, flow: Float) -> Float {
    fftt * (1.0 + 0.15 * (flow / cap).powi(4))
}

/// (flow on link 1, flow on link 2) summed over cores for one class.
fn route_flows(ta: &TrafficAssignment, class: &str) -> (Float, Float) {
    let loads = ta.link_results(class).unwrap();
    (loads[0].tot.iter().sum(), loads[1].tot.iter().sum())
}

fn assert_equilibrium(x1: Float, x2: Float) {
    let t1 = bpr(10.0, 200.0, x1);
    let t2 = bpr(15.0, 300.0, x2);
    assert!(
        (t1 - t2).abs() / t1 < 1e-3,
        "route times should be equal at equilibrium: t1 = {t1}, t2 = {t2} (x1 = {x1}, x2 = {x2})",
    );
}

// ============================================================================
// 1. Line-search algorithms reach user equilibrium
// ============================================================================

#[test]
fn test_frank_wolfe_equalises_route_times() {
    let mut ta = configured(Algorithm::FrankWolfe);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_rgap_target(1e-6);
    ta.set_max_iter(200);

    let report = ta.execute().unwrap();
    assert!(report.converged, "rgap {} after {} iterations", report.rgap, report.iterations);

    let (x1, x2) = route_flows(&ta, "car");
    assert!((x1 + x2 - 1000.0).abs() < 1e-6);
    assert!(x1 > 0.0 && x2 > 0.0);
    assert_equilibrium(x1, x2);
}

#[test]
fn test_conjugate_frank_wolfe_equalises_route_times() {
    let mut ta = configured(Algorithm::Cfw);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_rgap_target(1e-6);
    ta.set_max_iter(200);

    let report = ta.execute().unwrap();
    assert!(report.converged);
    let (x1, x2) = route_flows(&ta, "car");
    assert_equilibrium(x1, x2);
}

#[test]
fn test_biconjugate_frank_wolfe_records_betas() {
    let mut ta = configured(Algorithm::Bfw);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_rgap_target(1e-6);
    ta.set_max_iter(200);

    let report = ta.execute().unwrap();
    assert!(report.converged);
    assert!(report.convergence.rows.iter().all(|r| r.betas.is_some()));

    let (x1, x2) = route_flows(&ta, "car");
    assert_equilibrium(x1, x2);
}

// ============================================================================
// 2. MSA uses the predetermined 1/k step
// ============================================================================

#[test]
fn test_msa_steps_are_one_over_k() {
    let mut ta = configured(Algorithm::Msa);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_rgap_target(1e-12);
    ta.set_max_iter(10);

    let report = ta.execute().unwrap();
    assert_eq!(report.iterations, 10);
    for row in report.convergence.rows.iter().skip(1) {
        let expected = 1.0 / row.iteration as Float;
        assert!((row.alpha - expected).abs() < 1e-15, "iteration {} alpha {}", row.iteration, row.alpha);
        assert!(row.betas.is_none());
    }
    let (x1, x2) = route_flows(&ta, "car");
    assert!((x1 + x2 - 1000.0).abs() < 1e-6);
}

// ============================================================================
// 3. All-or-nothing runs once and puts everything on the free-flow route
// ============================================================================

#[test]
fn test_all_or_nothing_single_iteration() {
    let mut ta = configured(Algorithm::AllOrNothing);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_max_iter(50);

    let report = ta.execute().unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.rgap, INFINITE);
    assert!(!report.converged);

    let (x1, x2) = route_flows(&ta, "car");
    assert_eq!((x1, x2), (1000.0, 0.0));
    // Congested times reflect the final flows.
    let t = ta.congested_time();
    assert!((t[0] - bpr(10.0, 200.0, 1000.0)).abs() < 1e-9);
    assert!((t[1] - 15.0).abs() < 1e-12);
}

// ============================================================================
// 4. Multi-class assignment weights flows by PCE
// ============================================================================

#[test]
fn test_multi_class_pce_weighting() {
    let mut ta = configured(Algorithm::Bfw);
    ta.add_class(class_with_demand("car", 600.0));
    ta.add_class(class_with_demand("truck", 200.0).with_pce(2.0).unwrap());
    ta.set_rgap_target(1e-6);
    ta.set_max_iter(300);

    let report = ta.execute().unwrap();
    assert!(report.converged, "rgap {}", report.rgap);

    let (c1, c2) = route_flows(&ta, "car");
    let (k1, k2) = route_flows(&ta, "truck");
    assert!((c1 + c2 - 600.0).abs() < 1e-6);
    assert!((k1 + k2 - 200.0).abs() < 1e-6);

    let total = ta.total_flow();
    assert!((total[0] + total[1] - 1000.0).abs() < 1e-6);
    assert_equilibrium(total[0], total[1]);
}

// ============================================================================
// 5. Observer receives progress events
// ============================================================================

#[test]
fn test_observer_sees_every_iteration() {
    let log = ProgressLog::new();
    let mut ta = configured(Algorithm::FrankWolfe);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_observer(Arc::new(log.clone()));

    let report = ta.execute().unwrap();
    let events = log.events();
    assert_eq!(events.first(), Some(&AssignmentEvent::RelativeGap(INFINITE)));
    assert!(events.contains(&AssignmentEvent::Iteration(1)));
    assert!(log.is_finished());
    assert_eq!(log.last_iteration(), Some(report.iterations));
}

// ============================================================================
// 6. Validation errors
// ============================================================================

#[test]
fn test_missing_time_field_is_reported() {
    let mut ta = TrafficAssignment::new();
    ta.add_class(class_with_demand("car", 10.0));
    ta.set_vdf(Vdf::Bpr);
    ta.set_vdf_parameters([("alpha", 0.15), ("beta", 4.0)]);
    ta.set_capacity_field("capacity");
    ta.set_algorithm(Algorithm::Msa);

    match ta.execute() {
        Err(Error::MissingParameter(missing)) => assert_eq!(missing, vec!["time field".to_string()]),
        other => panic!("expected MissingParameter, got {other:?}"),
    }
}

#[test]
fn test_missing_vdf_parameter_is_reported() {
    let mut ta = configured(Algorithm::Msa);
    ta.set_vdf_parameters([("alpha", 0.15)]);
    ta.add_class(class_with_demand("car", 10.0));
    assert!(matches!(ta.execute(), Err(Error::MissingParameter(_))));
}

#[test]
fn test_zero_capacity_is_rejected() {
    let links = vec![
        Link::new(LinkId(1), NodeId(1), NodeId(2))
            .with_symmetric_field("free_flow_time", 10.0)
            .with_symmetric_field("capacity", 0.0),
    ];
    let zones = [NodeId(1), NodeId(2)];
    let graph = GraphBuilder::new(&links).centroids(&zones).build().unwrap();
    let matrix = DemandMatrix::new(zones.to_vec(), vec!["demand".into()]).unwrap();

    let mut ta = configured(Algorithm::Bfw);
    ta.add_class(TrafficClass::new("car", graph, matrix).unwrap());
    assert!(matches!(ta.execute(), Err(Error::InvalidCost { .. })));
}

#[test]
fn test_unknown_parameter_field_is_rejected() {
    let mut ta = configured(Algorithm::Bfw);
    ta.set_vdf_parameters([("alpha", VdfParameter::from("no_such_field")), ("beta", VdfParameter::from(4.0))]);
    ta.add_class(class_with_demand("car", 10.0));
    assert!(matches!(ta.execute(), Err(Error::UnknownField(f)) if f == "no_such_field"));
}

#[test]
fn test_invalid_run_settings_are_rejected() {
    let mut ta = configured(Algorithm::Bfw);
    ta.add_class(class_with_demand("car", 10.0));
    ta.set_max_iter(0);
    assert!(matches!(ta.execute(), Err(Error::Config(_))));
    ta.set_max_iter(5);
    ta.set_rgap_target(0.0);
    assert!(matches!(ta.execute(), Err(Error::Config(_))));
}

// ============================================================================
// 7. Per-link VDF parameters from a field
// ============================================================================

#[test]
fn test_parameters_from_link_fields() {
    let links: Vec<Link> = two_route_links()
        .into_iter()
        .map(|l| l.with_symmetric_field("b", 4.0))
        .collect();
    let zones = [NodeId(1), NodeId(2)];
    let graph = GraphBuilder::new(&links).centroids(&zones).build().unwrap();
    let mut matrix = DemandMatrix::new(zones.to_vec(), vec!["demand".into()]).unwrap();
    matrix.set("demand", NodeId(1), NodeId(2), 1000.0).unwrap();

    let mut ta = configured(Algorithm::FrankWolfe);
    ta.set_vdf_parameters([("alpha", VdfParameter::from(0.15)), ("beta", VdfParameter::from("b"))]);
    ta.add_class(TrafficClass::new("car", graph, matrix).unwrap());
    ta.set_rgap_target(1e-6);
    ta.execute().unwrap();

    let (x1, x2) = route_flows(&ta, "car");
    assert_equilibrium(x1, x2);
}

// ============================================================================
// 8. Configuration-driven run and export
// ============================================================================

#[test]
fn test_config_driven_run_and_exports() {
    let cfg = AssignmentConfig::from_json_str(r#"{
        "algorithm": "bfw",
        "vdf": "BPR",
        "vdf_parameters": {"alpha": 0.15, "beta": 4},
        "capacity_field": "capacity",
        "time_field": "free_flow_time",
        "max_iter": 100,
        "rgap_target": 1e-5,
        "cores": 1
    }"#).unwrap();

    let mut ta = TrafficAssignment::from_config(cfg);
    ta.add_class(class_with_demand("car", 1000.0));
    let report = ta.execute().unwrap();
    assert_eq!(report.algorithm, Algorithm::Bfw);

    let mut loads = Vec::new();
    export_link_loads(&ta.classes()[0], &mut loads).unwrap();
    let loads = String::from_utf8(loads).unwrap();
    let lines: Vec<&str> = loads.lines().collect();
    assert_eq!(lines[0], "link_id,demand_ab,demand_ba,demand_tot,PCE_AB,PCE_BA,PCE_tot");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("1,"));
    assert!(lines[2].starts_with("2,"));

    let mut history = Vec::new();
    export_convergence_report(&report, &mut history).unwrap();
    let history = String::from_utf8(history).unwrap();
    assert!(history.starts_with("iteration,rgap,alpha,warnings,beta0,beta1,beta2\n"));
    assert_eq!(history.lines().count(), report.iterations + 1);

    let json = report_to_json(&report).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["algorithm"], "bfw");
    assert_eq!(parsed["convergence"]["rows"].as_array().unwrap().len(), report.iterations);
}

// ============================================================================
// 9. BPR with beta < 1 (infinite slope at zero flow)
// ============================================================================

fn three_route_class() -> TrafficClass {
    let mut links = two_route_links();
    // Never competitive: free-flow time above the others' congested times.
    links.push(
        Link::new(LinkId(3), NodeId(1), NodeId(2))
            .with_symmetric_field("free_flow_time", 100.0)
            .with_symmetric_field("capacity", 100.0),
    );
    let zones = [NodeId(1), NodeId(2)];
    let graph = GraphBuilder::new(&links).centroids(&zones).build().unwrap();
    let mut matrix = DemandMatrix::new(zones.to_vec(), vec!["demand".into()]).unwrap();
    matrix.set("demand", NodeId(1), NodeId(2), 1000.0).unwrap();
    TrafficClass::new("car", graph, matrix).unwrap()
}

#[test]
fn test_conjugate_methods_survive_unloaded_links_with_concave_bpr() {
    for algorithm in [Algorithm::Cfw, Algorithm::Bfw] {
        let mut ta = configured(algorithm);
        ta.set_vdf_parameters([("alpha", 0.15), ("beta", 0.5)]);
        ta.add_class(three_route_class());
        ta.set_max_iter(30);

        let report = ta.execute().unwrap_or_else(|e| panic!("{algorithm}: {e}"));
        assert!(report.convergence.rows.iter().all(|r| r.alpha.is_finite()));
        assert!(ta.congested_time().iter().all(|t| t.is_finite()), "{algorithm}: {:?}", ta.congested_time());

        let loads = ta.link_results("car").unwrap();
        let flows: Vec<Float> = loads.iter().map(|l| l.tot.iter().sum()).collect();
        assert!(flows.iter().all(|f| f.is_finite()));
        assert!((flows.iter().sum::<Float>() - 1000.0).abs() < 1e-6);
        assert_eq!(flows[2], 0.0);
    }
}

// ============================================================================
// 10. Termination needs the configured number of converged checks
// ============================================================================

#[test]
fn test_steps_below_extends_the_run() {
    let target = 1e-4;
    let run = |steps: usize| {
        let mut ta = configured(Algorithm::FrankWolfe);
        ta.add_class(class_with_demand("car", 1000.0));
        ta.set_rgap_target(target);
        ta.set_max_iter(100);
        ta.set_steps_below_needed_to_terminate(steps);
        ta.execute().unwrap()
    };

    let once = run(1);
    let thrice = run(3);
    assert!(once.converged && thrice.converged);

    let below = |r: &aeq_paths::AssignmentReport| {
        r.convergence.rows.iter().skip(1).filter(|row| row.rgap <= target).count()
    };
    assert_eq!(below(&once), 2);
    assert_eq!(below(&thrice), 4);
    assert!(thrice.iterations >= once.iterations + 2);
}

// ============================================================================
// 11. A skimmed time field follows the congested times
// ============================================================================

#[test]
fn test_time_skim_is_refreshed_with_congested_times() {
    let mut class = class_with_demand("car", 1000.0);
    class.graph.set_skimming(&["free_flow_time"]).unwrap();

    let mut ta = configured(Algorithm::Bfw);
    ta.add_class(class);
    ta.set_rgap_target(1e-6);
    ta.execute().unwrap();

    let class = &ta.classes()[0];
    assert_eq!(class.graph.skim_columns()[0].as_slice(), ta.congested_time());
    // The network field itself keeps free-flow times.
    assert_eq!(class.graph.field("free_flow_time"), Some(&[10.0, 15.0][..]));

    let skims = class.results.skims.as_ref().unwrap();
    let skim = skims.get("free_flow_time", NodeId(1), NodeId(2)).unwrap();
    assert!(skim > 10.0, "skim {skim} should include congestion");
}

// ============================================================================
// 12. Running twice gives the same answer
// ============================================================================

#[test]
fn test_execute_twice_is_repeatable() {
    let mut class = class_with_demand("car", 1000.0);
    class.graph.set_skimming(&["free_flow_time"]).unwrap();
    let mut ta = configured(Algorithm::Bfw);
    ta.add_class(class);
    ta.set_rgap_target(1e-6);

    let first = ta.execute().unwrap();
    let first_flows = route_flows(&ta, "car");
    let first_times = ta.congested_time().to_vec();
    let first_skims = ta.classes()[0].results.skims.clone();

    let second = ta.execute().unwrap();
    assert_eq!(second.iterations, first.iterations);
    assert_eq!(second.rgap, first.rgap);
    assert_eq!(route_flows(&ta, "car"), first_flows);
    assert_eq!(ta.congested_time(), first_times.as_slice());
    assert_eq!(ta.classes()[0].results.skims, first_skims);
}

// ============================================================================
// 13. Conical volume-delay function
// ============================================================================

fn conical(fftt: Float, cap: Float, flow: Float) -> Float {
    let (a, b): (Float, Float) = (4.0, 7.0 / 6.0);
    let y = 1.0 - flow / cap;
    fftt * (2.0 + (a * a * y * y + b * b).sqrt() - a * y - b)
}

#[test]
fn test_conical_vdf_reaches_equilibrium() {
    let mut ta = configured(Algorithm::FrankWolfe);
    ta.set_vdf(Vdf::Conical);
    ta.set_vdf_parameters([("alpha", 4.0), ("beta", 7.0 / 6.0)]);
    ta.add_class(class_with_demand("car", 1000.0));
    ta.set_rgap_target(1e-6);
    ta.set_max_iter(100);

    let report = ta.execute().unwrap();
    assert!(report.converged, "rgap {}", report.rgap);

    let (x1, x2) = route_flows(&ta, "car");
    assert!((x1 + x2 - 1000.0).abs() < 1e-6);
    let (t1, t2) = (conical(10.0, 200.0, x1), conical(15.0, 300.0, x2));
    assert!((t1 - t2).abs() / t1 < 1e-3, "t1 = {t1}, t2 = {t2}");
    assert!((ta.congested_time()[0] - t1).abs() < 1e-9);
}
