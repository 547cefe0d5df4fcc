//! # aeq-paths: Shortest Paths and Static Traffic Assignment
//!
//! Compiles a road network into a forward-star graph, answers shortest-path
//! queries on it, and loads origin-destination demand onto it until the
//! network reaches user equilibrium.
//!
//! ## Design Principles
//!
//! 1. **Plain network DTOs**: `Link`, `NodeId`, `Path` cross every boundary
//! 2. **Compiled graph**: one `Graph` per mode, edges sorted by tail node
//! 3. **Sentinels over options in hot arrays**: `INFINITE` and `NULL_INDEX`
//! 4. **Algorithm state stays inside the assignment**: callers only see results
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aeq_paths::{
//!     Algorithm, DemandMatrix, GraphBuilder, Link, LinkId, NodeId,
//!     TrafficAssignment, TrafficClass, Vdf, VdfParameter,
//! };
//!
//! # fn example() -> aeq_paths::Result<()> {
//! let links = vec![
//!     Link::new(LinkId(1), NodeId(1), NodeId(2))
//!         .with_symmetric_field("free_flow_time", 10.0)
//!         .with_symmetric_field("capacity", 500.0),
//! ];
//! let mut graph = GraphBuilder::new(&links).centroids(&[NodeId(1), NodeId(2)]).build()?;
//! graph.set_graph("free_flow_time")?;
//!
//! let mut demand = DemandMatrix::new(vec![NodeId(1), NodeId(2)], vec!["cars".into()])?;
//! demand.set("cars", NodeId(1), NodeId(2), 300.0)?;
//!
//! let mut assignment = TrafficAssignment::new();
//! assignment.add_class(TrafficClass::new("car", graph, demand)?);
//! assignment.set_vdf(Vdf::Bpr);
//! assignment.set_vdf_parameters([
//!     ("alpha", VdfParameter::Value(0.15)),
//!     ("beta", VdfParameter::Value(4.0)),
//! ]);
//! assignment.set_capacity_field("capacity");
//! assignment.set_time_field("free_flow_time");
//! assignment.set_algorithm(Algorithm::Bfw);
//!
//! let report = assignment.execute()?;
//! println!("{} iterations, gap {}", report.iterations, report.rgap);
//! # Ok(())
//! # }
//! ```
//!
//! ## Algorithms
//!
//! | Algorithm | Name | Step direction |
//! |-----------|------|----------------|
//! | All-or-nothing | `all-or-nothing` | single AoN load |
//! | MSA | `msa` | AoN, step `1/k` |
//! | Frank-Wolfe | `frank-wolfe` / `fw` | AoN, line search |
//! | Conjugate FW | `cfw` | conjugate to previous direction |
//! | Biconjugate FW | `bfw` | conjugate to two previous directions |

// ============================================================================
// Modules
// ============================================================================

pub mod constants;
pub mod model;
pub mod graph;
pub mod shortest_path;
pub mod matrix;
pub mod results;
pub mod aon;
pub mod vdf;
pub mod assignment;
pub mod config;
pub mod export;

// ============================================================================
// Re-exports: Constants and Model (the DTOs)
// ============================================================================

pub use constants::{Float, Index, EPSILON, INFINITE, NULL_INDEX, RELEASE_NAME, VERSION};

pub use model::{Direction, FieldValue, Link, LinkId, NodeId, Path};

// ============================================================================
// Re-exports: Graph and paths
// ============================================================================

pub use graph::{Edge, Graph, GraphBuilder};
pub use shortest_path::ShortestPathResult;
pub use matrix::{DemandMatrix, SkimMatrix};

// ============================================================================
// Re-exports: Assignment
// ============================================================================

pub use results::{AssignmentResults, LinkLoad};
pub use aon::all_or_nothing;
pub use vdf::{Vdf, VdfParameter};
pub use assignment::{
    Algorithm, AssignmentEvent, AssignmentObserver, AssignmentReport,
    ConvergenceReport, IterationRecord, ProgressLog, TrafficAssignment, TrafficClass,
};
pub use config::AssignmentConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parameter missing. Setting the algorithm is the last thing to do when assigning. Missing: {}", .0.join(", "))]
    MissingParameter(Vec<String>),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid cost in field '{field}' at edge {edge}: {value}")]
    InvalidCost { field: String, edge: usize, value: Float },

    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid demand: {0}")]
    InvalidDemand(String),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Unknown volume-delay function: {0}")]
    UnknownVdf(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
